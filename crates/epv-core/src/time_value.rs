use rust_decimal::Decimal;
use rust_decimal::MathematicalOps;
use rust_decimal_macros::dec;

use crate::error::ValuationError;
use crate::types::{Money, Rate};
use crate::EngineResult;

const CONVERGENCE_THRESHOLD: Decimal = dec!(0.0000001);
const MAX_IRR_ITERATIONS: u32 = 100;
const MAX_BISECTION_ITERATIONS: u32 = 200;
const IRR_LOWER_BOUND: Decimal = dec!(-0.99);
const IRR_UPPER_BOUND: Decimal = dec!(10.0);
const MAX_BOUND_HALVINGS: u32 = 16;

/// Net Present Value of a series of cash flows (index 0 undiscounted).
pub fn npv(rate: Rate, cash_flows: &[Money]) -> EngineResult<Money> {
    if rate <= dec!(-1) {
        return Err(ValuationError::invalid(
            "rate",
            "Discount rate must be greater than -100%",
        ));
    }

    match discounted(rate, cash_flows) {
        Some((value, _)) => Ok(value),
        None => Err(ValuationError::invalid(
            "rate",
            format!(
                "Discount factor leaves decimal range over {} periods",
                cash_flows.len()
            ),
        )),
    }
}

/// NPV and its derivative with respect to the rate, in checked arithmetic.
/// `None` when a discount factor underflows to zero or a term overflows.
fn discounted(rate: Rate, cash_flows: &[Money]) -> Option<(Money, Decimal)> {
    let one_plus_r = Decimal::ONE + rate;
    if one_plus_r <= Decimal::ZERO {
        return None;
    }

    let mut value = Decimal::ZERO;
    let mut derivative = Decimal::ZERO;
    let mut discount = Decimal::ONE;
    for (t, cf) in cash_flows.iter().enumerate() {
        if t > 0 {
            discount = discount.checked_mul(one_plus_r)?;
        }
        if discount.is_zero() {
            return None;
        }
        let pv = cf.checked_div(discount)?;
        value = value.checked_add(pv)?;
        if t > 0 {
            // d/dr [cf / (1+r)^t] = -t * pv / (1+r)
            let term = Decimal::from(t as u64)
                .checked_mul(pv)?
                .checked_div(one_plus_r)?;
            derivative = derivative.checked_sub(term)?;
        }
    }
    Some((value, derivative))
}

/// Internal Rate of Return.
///
/// Newton-Raphson from `guess`; if the derivative vanishes, a step leaves
/// decimal range or the iteration stalls, falls back to bisection on
/// [-99%, 1000%]. Returns `NumericDivergence` when neither method brackets
/// a root.
pub fn irr(cash_flows: &[Money], guess: Rate) -> EngineResult<Rate> {
    if cash_flows.len() < 2 {
        return Err(ValuationError::InsufficientData(
            "IRR requires at least 2 cash flows".into(),
        ));
    }
    let has_negative = cash_flows.iter().any(|cf| cf.is_sign_negative() && !cf.is_zero());
    let has_positive = cash_flows.iter().any(|cf| cf.is_sign_positive() && !cf.is_zero());
    if !has_negative || !has_positive {
        return Err(ValuationError::invalid(
            "cash_flows",
            "IRR requires at least one negative and one positive cash flow",
        ));
    }

    match newton_irr(cash_flows, guess.clamp(IRR_LOWER_BOUND, IRR_UPPER_BOUND)) {
        Ok(rate) => Ok(rate),
        Err(_) => bisection_irr(cash_flows),
    }
}

fn newton_irr(cash_flows: &[Money], guess: Rate) -> EngineResult<Rate> {
    let mut rate = guess;
    let mut last_npv = Decimal::MAX;

    for i in 0..MAX_IRR_ITERATIONS {
        let Some((npv_val, dnpv)) = discounted(rate, cash_flows) else {
            return Err(ValuationError::NumericDivergence {
                function: "IRR (Newton)".into(),
                iterations: i,
                last_delta: last_npv,
            });
        };
        last_npv = npv_val;

        if npv_val.abs() < CONVERGENCE_THRESHOLD {
            return Ok(rate);
        }

        let step = match npv_val.checked_div(dnpv) {
            Some(step) if !dnpv.is_zero() => step,
            _ => {
                return Err(ValuationError::NumericDivergence {
                    function: "IRR (Newton)".into(),
                    iterations: i,
                    last_delta: npv_val,
                })
            }
        };

        rate = match rate.checked_sub(step) {
            Some(next) => next.clamp(IRR_LOWER_BOUND, IRR_UPPER_BOUND),
            None => {
                return Err(ValuationError::NumericDivergence {
                    function: "IRR (Newton)".into(),
                    iterations: i,
                    last_delta: npv_val,
                })
            }
        };
    }

    Err(ValuationError::NumericDivergence {
        function: "IRR (Newton)".into(),
        iterations: MAX_IRR_ITERATIONS,
        last_delta: last_npv,
    })
}

/// Pull `bound` toward zero until the NPV at it is representable.
fn representable_bound(bound: Rate, cash_flows: &[Money]) -> Option<(Rate, Money)> {
    let mut rate = bound;
    for _ in 0..MAX_BOUND_HALVINGS {
        if let Some((value, _)) = discounted(rate, cash_flows) {
            return Some((rate, value));
        }
        rate /= dec!(2);
    }
    None
}

fn bisection_irr(cash_flows: &[Money]) -> EngineResult<Rate> {
    let divergence = |iterations: u32, last_delta: Decimal| ValuationError::NumericDivergence {
        function: "IRR (bisection)".into(),
        iterations,
        last_delta,
    };

    let (mut lo, mut f_lo) =
        representable_bound(IRR_LOWER_BOUND, cash_flows).ok_or_else(|| divergence(0, Decimal::MAX))?;
    let (mut hi, f_hi) =
        representable_bound(IRR_UPPER_BOUND, cash_flows).ok_or_else(|| divergence(0, Decimal::MAX))?;

    if f_lo.is_sign_positive() == f_hi.is_sign_positive() {
        return Err(divergence(0, f_lo));
    }

    let mut f_mid = f_lo;
    for _ in 0..MAX_BISECTION_ITERATIONS {
        let mid = (lo + hi) / dec!(2);
        f_mid = match discounted(mid, cash_flows) {
            Some((value, _)) => value,
            None => return Err(divergence(0, f_mid)),
        };
        if f_mid.abs() < CONVERGENCE_THRESHOLD || (hi - lo) < CONVERGENCE_THRESHOLD {
            return Ok(mid);
        }
        if f_mid.is_sign_positive() == f_lo.is_sign_positive() {
            lo = mid;
            f_lo = f_mid;
        } else {
            hi = mid;
        }
    }

    Err(divergence(MAX_BISECTION_ITERATIONS, f_mid))
}

/// Closed-form IRR for a single investment returned in one exit payment:
/// `entry = exit / (1 + irr)^years`.
///
/// A zero exit is a total loss (-100%). A negative exit has no real root.
pub fn single_flow_irr(entry: Money, exit: Money, years: u32) -> EngineResult<Rate> {
    if entry <= Decimal::ZERO {
        return Err(ValuationError::invalid("entry", "Invested amount must be positive"));
    }
    if years == 0 {
        return Err(ValuationError::invalid("years", "Holding period must be at least 1 year"));
    }
    if exit.is_zero() {
        return Ok(dec!(-1));
    }
    if exit < Decimal::ZERO {
        return Err(ValuationError::NumericDivergence {
            function: "IRR (closed form)".into(),
            iterations: 0,
            last_delta: exit,
        });
    }

    let multiple = exit / entry;
    if years == 1 {
        return Ok(multiple - Decimal::ONE);
    }
    let exponent = Decimal::ONE / Decimal::from(years);
    Ok(multiple.powd(exponent) - Decimal::ONE)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_npv_basic() {
        let cfs = vec![dec!(-1000), dec!(300), dec!(400), dec!(500)];
        let result = npv(dec!(0.10), &cfs).unwrap();
        // -1000 + 300/1.1 + 400/1.21 + 500/1.331 ≈ -21.04
        assert!((result - dec!(-21.04)).abs() < dec!(1.0));
    }

    #[test]
    fn test_npv_zero_rate() {
        let cfs = vec![dec!(-100), dec!(50), dec!(50), dec!(50)];
        let result = npv(dec!(0.0), &cfs).unwrap();
        assert_eq!(result, dec!(50));
    }

    #[test]
    fn test_irr_basic() {
        let cfs = vec![dec!(-1000), dec!(400), dec!(400), dec!(400)];
        let result = irr(&cfs, dec!(0.10)).unwrap();
        assert!((result - dec!(0.097)).abs() < dec!(0.01));
    }

    #[test]
    fn test_irr_requires_sign_change() {
        let cfs = vec![dec!(100), dec!(50)];
        assert!(irr(&cfs, dec!(0.10)).is_err());
    }

    #[test]
    fn test_irr_bisection_fallback_from_bad_guess() {
        // Large multiple over a short hold: Newton from a far guess still lands.
        let cfs = vec![dec!(-100), dec!(0), dec!(400)];
        let result = irr(&cfs, dec!(9.5)).unwrap();
        assert!((result - dec!(1.0)).abs() < dec!(0.0001), "got {result}");
    }

    #[test]
    fn test_single_flow_irr_doubling_in_five_years() {
        let r = single_flow_irr(dec!(100), dec!(200), 5).unwrap();
        // 2^(1/5) - 1 ≈ 0.1487
        assert!((r - dec!(0.1487)).abs() < dec!(0.0001), "got {r}");
    }

    #[test]
    fn test_single_flow_irr_matches_root_finder() {
        let closed = single_flow_irr(dec!(1000), dec!(2500), 4).unwrap();
        let solved = irr(&[dec!(-1000), dec!(0), dec!(0), dec!(0), dec!(2500)], dec!(0.1)).unwrap();
        assert!((closed - solved).abs() < dec!(0.00001));
    }

    #[test]
    fn test_single_flow_irr_total_loss() {
        assert_eq!(single_flow_irr(dec!(100), Decimal::ZERO, 3).unwrap(), dec!(-1));
        assert!(matches!(
            single_flow_irr(dec!(100), dec!(-10), 3),
            Err(ValuationError::NumericDivergence { .. })
        ));
    }

    #[test]
    fn test_irr_long_horizon_small_recovery() {
        // Newton is pushed to the -99% floor where 0.01^19 underflows; the
        // bracket is pulled in until it is representable.
        let mut cfs = vec![dec!(-1000)];
        cfs.extend(std::iter::repeat(Decimal::ZERO).take(18));
        cfs.push(dec!(10));
        let r = irr(&cfs, dec!(0.15)).unwrap();
        // 0.01^(1/19) - 1
        assert!((r - dec!(-0.21524)).abs() < dec!(0.001), "got {r}");
    }

    #[test]
    fn test_irr_without_root_is_divergence_not_panic() {
        // Negative at both ends of the bracket over a 30-period horizon
        let mut cfs = vec![dec!(-1000)];
        cfs.extend(std::iter::repeat(dec!(10)).take(28));
        cfs.push(dec!(-500));
        assert!(matches!(
            irr(&cfs, dec!(0.15)),
            Err(ValuationError::NumericDivergence { .. })
        ));
    }

    #[test]
    fn test_npv_out_of_range_is_an_error() {
        let mut cfs = vec![dec!(-1000)];
        cfs.extend(std::iter::repeat(Decimal::ZERO).take(14));
        cfs.push(dec!(1000));
        let err = npv(dec!(-0.99), &cfs).unwrap_err();
        assert_eq!(err.field(), Some("rate"));
    }
}
