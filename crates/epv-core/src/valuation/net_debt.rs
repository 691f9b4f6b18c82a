use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::EngineResult;

/// How the debt and cash that bridge EV to equity are obtained.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "method")]
pub enum NetDebtMethod {
    /// Balances taken from the balance sheet
    Explicit { cash: Money, debt: Money },
    /// Debt inferred from interest expense at an assumed borrowing rate
    /// (debt = interest ÷ rate). A modeling convenience, not an identity.
    InterestImplied {
        interest_expense: Money,
        assumed_rate: Rate,
        #[serde(default)]
        cash: Money,
    },
}

impl Default for NetDebtMethod {
    fn default() -> Self {
        NetDebtMethod::Explicit {
            cash: Decimal::ZERO,
            debt: Decimal::ZERO,
        }
    }
}

/// Resolved balances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NetDebt {
    pub cash: Money,
    pub debt: Money,
    pub net_debt: Money,
}

impl NetDebtMethod {
    /// Resolve to cash and debt. Interest-implied debt with a zero rate is a
    /// division by zero and is reported as such.
    pub fn resolve(&self, warnings: &mut Vec<String>) -> EngineResult<NetDebt> {
        let (cash, debt) = match self {
            NetDebtMethod::Explicit { cash, debt } => (*cash, *debt),
            NetDebtMethod::InterestImplied {
                interest_expense,
                assumed_rate,
                cash,
            } => {
                if *interest_expense < Decimal::ZERO {
                    return Err(ValuationError::invalid(
                        "net_debt.interest_expense",
                        "Interest expense cannot be negative",
                    ));
                }
                if assumed_rate.is_zero() {
                    return Err(ValuationError::DivisionByZero {
                        context: "interest-implied net debt (assumed_rate is zero)".into(),
                    });
                }
                if *assumed_rate < Decimal::ZERO {
                    return Err(ValuationError::invalid(
                        "net_debt.assumed_rate",
                        "Assumed borrowing rate must be positive",
                    ));
                }
                if interest_expense.is_zero() {
                    warnings.push(
                        "Interest-implied net debt: zero interest expense implies zero debt".into(),
                    );
                }
                (*cash, interest_expense / assumed_rate)
            }
        };

        if cash < Decimal::ZERO {
            return Err(ValuationError::invalid("net_debt.cash", "Cash cannot be negative"));
        }
        if debt < Decimal::ZERO {
            return Err(ValuationError::invalid("net_debt.debt", "Debt cannot be negative"));
        }

        Ok(NetDebt {
            cash,
            debt,
            net_debt: debt - cash,
        })
    }
}
