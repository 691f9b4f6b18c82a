use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::EngineResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AssetCategory {
    Equipment,
    Buildout,
    FurnitureFixtures,
    MinorMaintenance,
}

/// An asset class replaced on a fixed cycle. Cost is per location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReplacementAsset {
    pub category: AssetCategory,
    pub replacement_cost: Money,
    pub useful_life_years: Decimal,
}

/// How sustaining (maintenance) capital expenditure is estimated.
///
/// All variants feed the same owner-earnings formula; switching model never
/// changes how EPV is computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum MaintenanceCapexModel {
    /// Fraction of revenue
    PercentOfRevenue { pct: Rate },
    /// Flat annual amount per location
    FixedPerLocation { amount_per_location: Money },
    /// Σ replacement cost ÷ useful life, per location
    AssetReplacementCycle { assets: Vec<ReplacementAsset> },
    /// Fraction of NOPAT retained to sustain the business
    ReinvestmentRate { rate: Rate },
}

impl Default for MaintenanceCapexModel {
    fn default() -> Self {
        MaintenanceCapexModel::PercentOfRevenue { pct: Decimal::ZERO }
    }
}

impl MaintenanceCapexModel {
    /// Annual maintenance capex for the whole business.
    pub fn annual_amount(&self, revenue: Money, nopat: Money, locations: u32) -> Money {
        let locations = Decimal::from(locations);
        match self {
            MaintenanceCapexModel::PercentOfRevenue { pct } => revenue * pct,
            MaintenanceCapexModel::FixedPerLocation {
                amount_per_location,
            } => amount_per_location * locations,
            MaintenanceCapexModel::AssetReplacementCycle { assets } => {
                let per_location: Money = assets
                    .iter()
                    .map(|a| a.replacement_cost / a.useful_life_years)
                    .sum();
                per_location * locations
            }
            MaintenanceCapexModel::ReinvestmentRate { rate } => {
                nopat.max(Decimal::ZERO) * rate
            }
        }
    }

    pub fn validate(&self) -> EngineResult<()> {
        match self {
            MaintenanceCapexModel::PercentOfRevenue { pct } => {
                if *pct < Decimal::ZERO || *pct > Decimal::ONE {
                    return Err(ValuationError::invalid(
                        "maintenance_capex.pct",
                        "Capex percentage must be between 0 and 1",
                    ));
                }
            }
            MaintenanceCapexModel::FixedPerLocation {
                amount_per_location,
            } => {
                if *amount_per_location < Decimal::ZERO {
                    return Err(ValuationError::invalid(
                        "maintenance_capex.amount_per_location",
                        "Capex cannot be negative",
                    ));
                }
            }
            MaintenanceCapexModel::AssetReplacementCycle { assets } => {
                for (i, asset) in assets.iter().enumerate() {
                    if asset.replacement_cost < Decimal::ZERO {
                        return Err(ValuationError::invalid(
                            format!("maintenance_capex.assets[{i}].replacement_cost"),
                            "Replacement cost cannot be negative",
                        ));
                    }
                    if asset.useful_life_years <= Decimal::ZERO {
                        return Err(ValuationError::invalid(
                            format!("maintenance_capex.assets[{i}].useful_life_years"),
                            "Useful life must be positive",
                        ));
                    }
                }
            }
            MaintenanceCapexModel::ReinvestmentRate { rate } => {
                if *rate < Decimal::ZERO || *rate > Decimal::ONE {
                    return Err(ValuationError::invalid(
                        "maintenance_capex.rate",
                        "Reinvestment rate must be between 0 and 1",
                    ));
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_percent_of_revenue() {
        let m = MaintenanceCapexModel::PercentOfRevenue { pct: dec!(0.02) };
        assert_eq!(m.annual_amount(dec!(1000000), dec!(0), 3), dec!(20000));
    }

    #[test]
    fn test_fixed_per_location() {
        let m = MaintenanceCapexModel::FixedPerLocation {
            amount_per_location: dec!(25000),
        };
        assert_eq!(m.annual_amount(dec!(1000000), dec!(0), 3), dec!(75000));
    }

    #[test]
    fn test_asset_replacement_cycle() {
        let m = MaintenanceCapexModel::AssetReplacementCycle {
            assets: vec![
                ReplacementAsset {
                    category: AssetCategory::Equipment,
                    replacement_cost: dec!(250000),
                    useful_life_years: dec!(5),
                },
                ReplacementAsset {
                    category: AssetCategory::Buildout,
                    replacement_cost: dec!(300000),
                    useful_life_years: dec!(10),
                },
                ReplacementAsset {
                    category: AssetCategory::FurnitureFixtures,
                    replacement_cost: dec!(40000),
                    useful_life_years: dec!(7),
                },
                ReplacementAsset {
                    category: AssetCategory::MinorMaintenance,
                    replacement_cost: dec!(8000),
                    useful_life_years: dec!(1),
                },
            ],
        };
        // 50,000 + 30,000 + 5,714.28… + 8,000 per location
        let amount = m.annual_amount(dec!(0), dec!(0), 2);
        assert!((amount - dec!(187428.57)).abs() < dec!(0.01), "got {amount}");
    }

    #[test]
    fn test_reinvestment_rate_ignores_losses() {
        let m = MaintenanceCapexModel::ReinvestmentRate { rate: dec!(0.25) };
        assert_eq!(m.annual_amount(dec!(0), dec!(400), 1), dec!(100));
        assert_eq!(m.annual_amount(dec!(0), dec!(-400), 1), Decimal::ZERO);
    }

    #[test]
    fn test_zero_useful_life_rejected() {
        let m = MaintenanceCapexModel::AssetReplacementCycle {
            assets: vec![ReplacementAsset {
                category: AssetCategory::Equipment,
                replacement_cost: dec!(1),
                useful_life_years: Decimal::ZERO,
            }],
        };
        assert!(m.validate().is_err());
    }
}
