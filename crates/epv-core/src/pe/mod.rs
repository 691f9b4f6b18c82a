pub mod consideration;
pub mod debt_schedule;
pub mod lbo;
pub mod sources_uses;
