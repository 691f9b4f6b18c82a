pub mod pnl;
pub mod revenue;
