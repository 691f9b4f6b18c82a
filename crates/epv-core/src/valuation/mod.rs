pub mod drivers;
pub mod epv;
pub mod maintenance_capex;
pub mod net_debt;
pub mod wacc;
