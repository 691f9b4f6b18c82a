pub mod case;
pub mod pe;
pub mod risk;
pub mod scenarios;
pub mod valuation;
