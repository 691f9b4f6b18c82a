use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::valuation::maintenance_capex::MaintenanceCapexModel;
use crate::EngineResult;

/// The value drivers every valuation view perturbs.
///
/// Base EPV, scenarios, Monte Carlo trials and sensitivity grid points all
/// build one of these and hand it to [`evaluate`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValuationDrivers {
    pub revenue: Money,
    pub ebit: Money,
    pub wacc: Rate,
    pub tax_rate: Rate,
    #[serde(default)]
    pub depreciation_amortization: Money,
    #[serde(default)]
    pub maintenance_capex: MaintenanceCapexModel,
    #[serde(default = "default_locations")]
    pub locations: u32,
    #[serde(default)]
    pub cash: Money,
    #[serde(default)]
    pub debt: Money,
}

fn default_locations() -> u32 {
    1
}

/// Single-period valuation at a given set of drivers.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ValuationResult {
    pub enterprise_value: Money,
    pub equity_value: Money,
    pub nopat: Money,
    pub owner_earnings: Money,
    pub wacc_used: Rate,
}

/// A driver that sensitivity and simulation can vary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Driver {
    Revenue,
    EbitMargin,
    Wacc,
    TaxRate,
}

impl Driver {
    /// Application order. Revenue precedes margin so that a sampled margin
    /// applies to the sampled revenue.
    pub const ALL: [Driver; 4] = [
        Driver::Revenue,
        Driver::EbitMargin,
        Driver::Wacc,
        Driver::TaxRate,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Driver::Revenue => "revenue",
            Driver::EbitMargin => "ebit_margin",
            Driver::Wacc => "wacc",
            Driver::TaxRate => "tax_rate",
        }
    }

    /// Physical bounds that simulated draws are clamped to.
    pub fn simulation_bounds(&self) -> (f64, f64) {
        match self {
            Driver::Revenue => (0.0, f64::INFINITY),
            Driver::EbitMargin => (0.05, 0.50),
            Driver::Wacc => (0.05, 0.30),
            Driver::TaxRate => (0.0, 0.60),
        }
    }

    /// Reject values outside the driver's domain before anything is evaluated.
    pub fn validate_value(&self, value: Decimal) -> EngineResult<()> {
        let ok = match self {
            Driver::Revenue => value >= Decimal::ZERO,
            Driver::EbitMargin => value >= dec!(-1) && value <= Decimal::ONE,
            Driver::Wacc => value > Decimal::ZERO,
            Driver::TaxRate => value >= Decimal::ZERO && value < Decimal::ONE,
        };
        if ok {
            Ok(())
        } else {
            Err(ValuationError::invalid(
                self.name(),
                format!("Value {value} is outside the domain of {}", self.name()),
            ))
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl ValuationDrivers {
    /// EBIT / revenue, `None` when revenue is zero.
    pub fn ebit_margin(&self) -> Option<Rate> {
        if self.revenue.is_zero() {
            None
        } else {
            Some(self.ebit / self.revenue)
        }
    }

    pub fn get(&self, driver: Driver) -> Option<Decimal> {
        match driver {
            Driver::Revenue => Some(self.revenue),
            Driver::EbitMargin => self.ebit_margin(),
            Driver::Wacc => Some(self.wacc),
            Driver::TaxRate => Some(self.tax_rate),
        }
    }

    /// Copy with one driver replaced. Changing revenue keeps the EBIT margin.
    pub fn with_driver(&self, driver: Driver, value: Decimal) -> Self {
        let mut next = self.clone();
        match driver {
            Driver::Revenue => {
                next.ebit = match self.ebit_margin() {
                    Some(margin) => value * margin,
                    None => self.ebit,
                };
                next.revenue = value;
            }
            Driver::EbitMargin => next.ebit = self.revenue * value,
            Driver::Wacc => next.wacc = value,
            Driver::TaxRate => next.tax_rate = value,
        }
        next
    }
}

/// Zero-growth earnings power valuation.
///
/// NOPAT = EBIT * (1 - t)
/// Owner earnings = NOPAT + D&A - maintenance capex
/// EV = owner earnings / WACC
/// Equity = EV + cash - debt
pub fn evaluate(drivers: &ValuationDrivers) -> EngineResult<ValuationResult> {
    if drivers.wacc <= Decimal::ZERO {
        return Err(ValuationError::invalid(
            "wacc",
            format!("WACC of {} is not positive", drivers.wacc),
        ));
    }
    if drivers.tax_rate < Decimal::ZERO || drivers.tax_rate >= Decimal::ONE {
        return Err(ValuationError::invalid(
            "tax_rate",
            "Tax rate must be within [0, 1)",
        ));
    }

    let nopat = drivers.ebit * (Decimal::ONE - drivers.tax_rate);
    let maintenance_capex =
        drivers
            .maintenance_capex
            .annual_amount(drivers.revenue, nopat, drivers.locations);
    let owner_earnings = nopat + drivers.depreciation_amortization - maintenance_capex;
    let enterprise_value = owner_earnings / drivers.wacc;
    let equity_value = enterprise_value + drivers.cash - drivers.debt;

    Ok(ValuationResult {
        enterprise_value,
        equity_value,
        nopat,
        owner_earnings,
        wacc_used: drivers.wacc,
    })
}
