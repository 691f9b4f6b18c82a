use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::EngineResult;

use super::revenue::{build_revenue, CapacityConfig, RevenueInput, RevenueOutput, ServiceLine};

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Revenue base a variable cost percentage is applied against.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum CostBase {
    #[default]
    TotalRevenue,
    /// Service + membership revenue (excludes retail)
    ServiceRevenue,
}

/// A variable cost line expressed as a percentage of revenue.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableCost {
    pub pct: Rate,
    #[serde(default)]
    pub base: CostBase,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FixedCostKind {
    Rent,
    Insurance,
    Utilities,
    Other,
}

/// Annual fixed cost per location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FixedCost {
    pub label: String,
    pub annual_amount: Money,
    pub kind: FixedCostKind,
}

/// Operating cost structure of one location, replicated across locations.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CostStructure {
    #[serde(default)]
    pub clinical_labor: VariableCost,
    #[serde(default)]
    pub marketing: VariableCost,
    #[serde(default)]
    pub admin: VariableCost,
    #[serde(default)]
    pub other_opex: VariableCost,
    #[serde(default)]
    pub fixed_costs: Vec<FixedCost>,
    /// Owner compensation booked above EBITDA (total, all locations)
    #[serde(default)]
    pub owner_compensation: Money,
    /// Interest expense booked inside operating expenses (total)
    #[serde(default)]
    pub interest_in_opex: Money,
    /// Depreciation & amortisation (total, below EBITDA)
    #[serde(default)]
    pub depreciation_amortization: Money,
}

/// Operating model: service-line economics plus cost structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingModel {
    pub service_lines: Vec<ServiceLine>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacityConfig>,
    #[serde(default)]
    pub costs: CostStructure,
}

/// Reported P&L lines, as taken from the financial statements.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportedPnl {
    pub revenue: Money,
    #[serde(default)]
    pub cogs: Money,
    pub ebitda: Money,
    #[serde(default)]
    pub marketing_spend: Money,
    #[serde(default)]
    pub interest_in_opex: Money,
    #[serde(default)]
    pub owner_compensation: Money,
    #[serde(default)]
    pub rent_expense: Money,
    #[serde(default)]
    pub depreciation_amortization: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpenseLine {
    pub label: String,
    pub amount: Money,
}

/// The P&L every downstream component reads. Built either from an
/// operating model or from reported lines.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PnlLines {
    pub revenue: Money,
    pub cogs: Money,
    pub gross_profit: Money,
    pub operating_expenses: Vec<ExpenseLine>,
    pub total_operating_expenses: Money,
    pub ebitda: Money,
    pub marketing_spend: Money,
    pub interest_in_opex: Money,
    pub owner_compensation: Money,
    pub rent_expense: Money,
    pub depreciation_amortization: Money,
}

/// Output of the operating P&L build.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OperatingPnlOutput {
    pub revenue: RevenueOutput,
    pub pnl: PnlLines,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build the operating P&L for `locations` identical locations: revenue model,
/// variable costs against total or service revenue, fixed costs per location.
pub fn build_operating_pnl(
    model: &OperatingModel,
    locations: u32,
) -> EngineResult<ComputationOutput<OperatingPnlOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_cost_structure(&model.costs)?;

    let revenue_out = build_revenue(&RevenueInput {
        service_lines: model.service_lines.clone(),
        locations,
        capacity: model.capacity.clone(),
    })?;
    warnings.extend(revenue_out.warnings);
    let revenue = revenue_out.result;

    let costs = &model.costs;
    let base_amount = |base: CostBase| match base {
        CostBase::TotalRevenue => revenue.total_revenue,
        CostBase::ServiceRevenue => revenue.service_revenue(),
    };

    let mut operating_expenses = vec![
        ExpenseLine {
            label: "Clinical labor".into(),
            amount: costs.clinical_labor.pct * base_amount(costs.clinical_labor.base),
        },
        ExpenseLine {
            label: "Marketing".into(),
            amount: costs.marketing.pct * base_amount(costs.marketing.base),
        },
        ExpenseLine {
            label: "Admin".into(),
            amount: costs.admin.pct * base_amount(costs.admin.base),
        },
        ExpenseLine {
            label: "Other opex".into(),
            amount: costs.other_opex.pct * base_amount(costs.other_opex.base),
        },
    ];
    let marketing_spend = operating_expenses[1].amount;

    let locations_dec = Decimal::from(locations);
    let mut rent_expense = Decimal::ZERO;
    for fixed in &costs.fixed_costs {
        let amount = fixed.annual_amount * locations_dec;
        if fixed.kind == FixedCostKind::Rent {
            rent_expense += amount;
        }
        operating_expenses.push(ExpenseLine {
            label: fixed.label.clone(),
            amount,
        });
    }

    if !costs.owner_compensation.is_zero() {
        operating_expenses.push(ExpenseLine {
            label: "Owner compensation".into(),
            amount: costs.owner_compensation,
        });
    }
    if !costs.interest_in_opex.is_zero() {
        operating_expenses.push(ExpenseLine {
            label: "Interest expense".into(),
            amount: costs.interest_in_opex,
        });
    }

    let total_operating_expenses: Money = operating_expenses.iter().map(|e| e.amount).sum();
    let ebitda = revenue.gross_profit - total_operating_expenses;
    if ebitda < Decimal::ZERO {
        warnings.push(format!("Operating model produces negative EBITDA of {ebitda}"));
    }

    let pnl = PnlLines {
        revenue: revenue.total_revenue,
        cogs: revenue.total_cogs,
        gross_profit: revenue.gross_profit,
        operating_expenses,
        total_operating_expenses,
        ebitda,
        marketing_spend,
        interest_in_opex: costs.interest_in_opex,
        owner_compensation: costs.owner_compensation,
        rent_expense,
        depreciation_amortization: costs.depreciation_amortization,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Operating P&L from service lines and cost structure",
        &serde_json::json!({
            "locations": locations,
            "fixed_cost_lines": costs.fixed_costs.len(),
        }),
        warnings,
        elapsed,
        OperatingPnlOutput {
            revenue,
            pnl,
        },
    ))
}

impl ReportedPnl {
    /// Lift reported lines into the common P&L shape.
    pub fn to_pnl_lines(&self) -> EngineResult<PnlLines> {
        if self.revenue < Decimal::ZERO {
            return Err(ValuationError::invalid("reported.revenue", "Revenue cannot be negative"));
        }
        let non_negative = [
            ("reported.cogs", self.cogs),
            ("reported.marketing_spend", self.marketing_spend),
            ("reported.interest_in_opex", self.interest_in_opex),
            ("reported.owner_compensation", self.owner_compensation),
            ("reported.rent_expense", self.rent_expense),
            ("reported.depreciation_amortization", self.depreciation_amortization),
        ];
        for (field, value) in non_negative {
            if value < Decimal::ZERO {
                return Err(ValuationError::invalid(field, "Expense lines are entered as positive amounts"));
            }
        }

        let gross_profit = self.revenue - self.cogs;
        Ok(PnlLines {
            revenue: self.revenue,
            cogs: self.cogs,
            gross_profit,
            operating_expenses: Vec::new(),
            total_operating_expenses: gross_profit - self.ebitda,
            ebitda: self.ebitda,
            marketing_spend: self.marketing_spend,
            interest_in_opex: self.interest_in_opex,
            owner_compensation: self.owner_compensation,
            rent_expense: self.rent_expense,
            depreciation_amortization: self.depreciation_amortization,
        })
    }
}

fn validate_cost_structure(costs: &CostStructure) -> EngineResult<()> {
    let pcts = [
        ("costs.clinical_labor.pct", costs.clinical_labor.pct),
        ("costs.marketing.pct", costs.marketing.pct),
        ("costs.admin.pct", costs.admin.pct),
        ("costs.other_opex.pct", costs.other_opex.pct),
    ];
    for (field, pct) in pcts {
        if pct < Decimal::ZERO || pct > Decimal::ONE {
            return Err(ValuationError::invalid(field, "Cost percentage must be between 0 and 1"));
        }
    }
    for fixed in &costs.fixed_costs {
        if fixed.annual_amount < Decimal::ZERO {
            return Err(ValuationError::invalid(
                format!("costs.fixed_costs[{}]", fixed.label),
                "Fixed cost cannot be negative",
            ));
        }
    }
    let totals = [
        ("costs.owner_compensation", costs.owner_compensation),
        ("costs.interest_in_opex", costs.interest_in_opex),
        ("costs.depreciation_amortization", costs.depreciation_amortization),
    ];
    for (field, value) in totals {
        if value < Decimal::ZERO {
            return Err(ValuationError::invalid(field, "Amount cannot be negative"));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operations::revenue::ServiceKind;
    use rust_decimal_macros::dec;

    fn model() -> OperatingModel {
        OperatingModel {
            service_lines: vec![
                ServiceLine {
                    id: "tox".into(),
                    name: "Neurotoxin".into(),
                    unit_price: dec!(500),
                    volume: dec!(2000),
                    cogs_pct: dec!(0.25),
                    kind: ServiceKind::Service,
                    visit_units_per_sale: dec!(1),
                },
                ServiceLine {
                    id: "skin".into(),
                    name: "Skincare".into(),
                    unit_price: dec!(100),
                    volume: dec!(1000),
                    cogs_pct: dec!(0.50),
                    kind: ServiceKind::Retail,
                    visit_units_per_sale: Decimal::ZERO,
                },
            ],
            capacity: None,
            costs: CostStructure {
                clinical_labor: VariableCost {
                    pct: dec!(0.20),
                    base: CostBase::ServiceRevenue,
                },
                marketing: VariableCost {
                    pct: dec!(0.05),
                    base: CostBase::TotalRevenue,
                },
                admin: VariableCost {
                    pct: dec!(0.04),
                    base: CostBase::TotalRevenue,
                },
                other_opex: VariableCost::default(),
                fixed_costs: vec![
                    FixedCost {
                        label: "Rent".into(),
                        annual_amount: dec!(60000),
                        kind: FixedCostKind::Rent,
                    },
                    FixedCost {
                        label: "Insurance".into(),
                        annual_amount: dec!(10000),
                        kind: FixedCostKind::Insurance,
                    },
                ],
                owner_compensation: dec!(150000),
                interest_in_opex: dec!(20000),
                depreciation_amortization: dec!(30000),
            },
        }
    }

    #[test]
    fn test_operating_pnl_two_locations() {
        let out = build_operating_pnl(&model(), 2).unwrap().result;
        let pnl = &out.pnl;
        // Revenue: service 500×2000×2 = 2,000,000; retail 100×1000×2 = 200,000
        assert_eq!(pnl.revenue, dec!(2200000));
        // COGS: 500,000 + 100,000
        assert_eq!(pnl.cogs, dec!(600000));
        // Labor 20% of service (400,000); marketing 110,000; admin 88,000
        assert_eq!(pnl.operating_expenses[0].amount, dec!(400000));
        assert_eq!(pnl.marketing_spend, dec!(110000));
        assert_eq!(pnl.rent_expense, dec!(120000));
        // Opex: 400k + 110k + 88k + 0 + 120k + 20k + 150k + 20k = 908k
        assert_eq!(pnl.total_operating_expenses, dec!(908000));
        assert_eq!(pnl.ebitda, dec!(692000));
    }

    #[test]
    fn test_reported_pnl_lifts_lines() {
        let reported = ReportedPnl {
            revenue: dec!(1000),
            cogs: dec!(300),
            ebitda: dec!(200),
            marketing_spend: dec!(10),
            interest_in_opex: Decimal::ZERO,
            owner_compensation: Decimal::ZERO,
            rent_expense: Decimal::ZERO,
            depreciation_amortization: dec!(15),
        };
        let pnl = reported.to_pnl_lines().unwrap();
        assert_eq!(pnl.gross_profit, dec!(700));
        assert_eq!(pnl.total_operating_expenses, dec!(500));
    }

    #[test]
    fn test_cost_pct_out_of_range_rejected() {
        let mut m = model();
        m.costs.admin.pct = dec!(1.5);
        assert!(build_operating_pnl(&m, 1).is_err());
    }
}
