use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

#[cfg(feature = "parallel")]
use rayon::prelude::*;

use crate::error::ValuationError;
use crate::types::*;
use crate::valuation::drivers::{evaluate, Driver, ValuationDrivers};
use crate::EngineResult;

/// Most whole steps a single sweep axis may span.
const MAX_SWEEP_POINTS: u32 = 10_000;
/// Most cells a two-way grid may hold.
const MAX_GRID_CELLS: usize = 1_000_000;

/// A driver swept from `min` to `max` in steps of `step`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityVariable {
    pub driver: Driver,
    pub min: Decimal,
    pub max: Decimal,
    pub step: Decimal,
}

// ---------------------------------------------------------------------------
// One-way
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneWayInput {
    pub base: ValuationDrivers,
    pub variable: SensitivityVariable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensitivityPoint {
    pub value: Decimal,
    pub enterprise_value: Money,
    pub equity_value: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OneWayOutput {
    pub driver: Driver,
    pub points: Vec<SensitivityPoint>,
    pub base_enterprise_value: Money,
}

/// Vary one driver over its grid with all others held at base.
pub fn one_way_sensitivity(input: &OneWayInput) -> EngineResult<ComputationOutput<OneWayOutput>> {
    let start = Instant::now();
    let warnings: Vec<String> = Vec::new();

    let values = generate_sweep_values(&input.variable)?;
    let base_enterprise_value = evaluate(&input.base)?.enterprise_value;

    let points = values
        .iter()
        .map(|v| {
            let r = evaluate(&input.base.with_driver(input.variable.driver, *v))?;
            Ok(SensitivityPoint {
                value: *v,
                enterprise_value: r.enterprise_value,
                equity_value: r.equity_value,
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    let output = OneWayOutput {
        driver: input.variable.driver,
        points,
        base_enterprise_value,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "One-Way Sensitivity (EPV)",
        &serde_json::json!({ "driver": input.variable.driver.name() }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Two-way
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoWayInput {
    pub base: ValuationDrivers,
    pub variable_1: SensitivityVariable,
    pub variable_2: SensitivityVariable,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TwoWayOutput {
    pub driver_1: Driver,
    pub driver_2: Driver,
    pub variable_1_values: Vec<Decimal>,
    pub variable_2_values: Vec<Decimal>,
    /// Matrix[i][j] = EV when driver_1 = variable_1_values[i], driver_2 = variable_2_values[j]
    pub matrix: Vec<Vec<Money>>,
    pub base_case_value: Money,
    /// Grid cell closest to the base drivers (row, col)
    pub base_case_position: (usize, usize),
}

/// Cartesian grid of two drivers. Rows are evaluated in parallel when the
/// `parallel` feature is enabled.
pub fn two_way_sensitivity(input: &TwoWayInput) -> EngineResult<ComputationOutput<TwoWayOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let d1 = input.variable_1.driver;
    let d2 = input.variable_2.driver;
    if d1 == d2 {
        return Err(ValuationError::invalid(
            "variable_2.driver",
            "Two-way sensitivity needs two different drivers",
        ));
    }

    let v1_values = generate_sweep_values(&input.variable_1)?;
    let v2_values = generate_sweep_values(&input.variable_2)?;

    let cells = v1_values.len() * v2_values.len();
    if cells > MAX_GRID_CELLS {
        return Err(ValuationError::invalid(
            "variable_2.step",
            format!("Two-way grid of {cells} cells exceeds {MAX_GRID_CELLS}"),
        ));
    }
    if cells > 10_000 {
        warnings.push(format!("Large sensitivity grid ({cells} cells)"));
    }

    let row = |v1: &Decimal| -> EngineResult<Vec<Money>> {
        let shifted = input.base.with_driver(d1, *v1);
        v2_values
            .iter()
            .map(|v2| Ok(evaluate(&shifted.with_driver(d2, *v2))?.enterprise_value))
            .collect()
    };

    #[cfg(feature = "parallel")]
    let matrix = v1_values
        .par_iter()
        .map(row)
        .collect::<EngineResult<Vec<_>>>()?;
    #[cfg(not(feature = "parallel"))]
    let matrix = v1_values
        .iter()
        .map(row)
        .collect::<EngineResult<Vec<_>>>()?;

    let base_row = input
        .base
        .get(d1)
        .map(|b| closest_index(&v1_values, b))
        .unwrap_or(0);
    let base_col = input
        .base
        .get(d2)
        .map(|b| closest_index(&v2_values, b))
        .unwrap_or(0);
    let base_case_value = evaluate(&input.base)?.enterprise_value;

    let output = TwoWayOutput {
        driver_1: d1,
        driver_2: d2,
        variable_1_values: v1_values,
        variable_2_values: v2_values,
        matrix,
        base_case_value,
        base_case_position: (base_row, base_col),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "2-Way Sensitivity Analysis (EPV)",
        &serde_json::json!({
            "variable_1": d1.name(),
            "variable_2": d2.name(),
            "output_metric": "enterprise_value",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tornado
// ---------------------------------------------------------------------------

fn default_swing() -> Rate {
    dec!(0.10)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoInput {
    pub base: ValuationDrivers,
    /// Relative shock applied to each driver (0.10 = ±10%)
    #[serde(default = "default_swing")]
    pub swing_pct: Rate,
    /// Drivers to shock; empty means all
    #[serde(default)]
    pub drivers: Vec<Driver>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoBar {
    pub driver: Driver,
    pub low_value: Decimal,
    pub high_value: Decimal,
    pub ev_at_low: Money,
    pub ev_at_high: Money,
    /// |EV(high) - EV(low)|
    pub swing: Money,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TornadoOutput {
    pub base_enterprise_value: Money,
    pub swing_pct: Rate,
    /// Sorted by swing, largest first
    pub bars: Vec<TornadoBar>,
}

/// Shock each driver by ±swing and rank drivers by the EV range they produce.
pub fn tornado(input: &TornadoInput) -> EngineResult<ComputationOutput<TornadoOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if input.swing_pct <= Decimal::ZERO || input.swing_pct >= Decimal::ONE {
        return Err(ValuationError::invalid(
            "swing_pct",
            "Swing must be within (0, 1)",
        ));
    }

    let drivers: Vec<Driver> = if input.drivers.is_empty() {
        Driver::ALL.to_vec()
    } else {
        input.drivers.clone()
    };

    // Resolve and validate every shocked value before evaluating any of them.
    let mut shocks = Vec::with_capacity(drivers.len());
    for driver in drivers {
        let Some(base_value) = input.base.get(driver) else {
            warnings.push(format!("{driver} is undefined at base; skipped"));
            continue;
        };
        let low = base_value * (Decimal::ONE - input.swing_pct);
        let high = base_value * (Decimal::ONE + input.swing_pct);
        driver.validate_value(low)?;
        driver.validate_value(high)?;
        shocks.push((driver, low, high));
    }

    let base_enterprise_value = evaluate(&input.base)?.enterprise_value;

    let mut bars = shocks
        .into_iter()
        .map(|(driver, low, high)| {
            let ev_at_low = evaluate(&input.base.with_driver(driver, low))?.enterprise_value;
            let ev_at_high = evaluate(&input.base.with_driver(driver, high))?.enterprise_value;
            Ok(TornadoBar {
                driver,
                low_value: low,
                high_value: high,
                ev_at_low,
                ev_at_high,
                swing: (ev_at_high - ev_at_low).abs(),
            })
        })
        .collect::<EngineResult<Vec<_>>>()?;

    bars.sort_by(|a, b| b.swing.cmp(&a.swing));

    let output = TornadoOutput {
        base_enterprise_value,
        swing_pct: input.swing_pct,
        bars,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Tornado ranking of EPV drivers",
        &serde_json::json!({ "swing_pct": input.swing_pct.to_string() }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Grid helpers
// ---------------------------------------------------------------------------

/// Sweep values from min to max with step. Max is appended when the step
/// does not land on it. Every value must lie in the driver's domain.
pub(crate) fn generate_sweep_values(var: &SensitivityVariable) -> EngineResult<Vec<Decimal>> {
    let field = format!("variable:{}", var.driver);
    if var.step <= Decimal::ZERO {
        return Err(ValuationError::invalid(field, "Step must be positive"));
    }
    if var.min > var.max {
        return Err(ValuationError::invalid(field, "Min must be <= max"));
    }
    let steps = (var.max - var.min)
        .checked_div(var.step)
        .map(|n| n.floor());
    match steps {
        Some(n) if n < Decimal::from(MAX_SWEEP_POINTS) => {}
        _ => {
            return Err(ValuationError::invalid(
                field,
                format!("Sweep exceeds {MAX_SWEEP_POINTS} points; widen the step"),
            ))
        }
    }

    let mut values = Vec::new();
    let mut current = var.min;
    while current <= var.max {
        values.push(current);
        current += var.step;
    }
    if let Some(&last) = values.last() {
        if last < var.max {
            values.push(var.max);
        }
    }

    for v in &values {
        var.driver.validate_value(*v)?;
    }

    Ok(values)
}

/// Index of the value closest to `target`.
fn closest_index(values: &[Decimal], target: Decimal) -> usize {
    values
        .iter()
        .enumerate()
        .min_by_key(|(_, v)| (**v - target).abs())
        .map(|(i, _)| i)
        .unwrap_or(0)
}
