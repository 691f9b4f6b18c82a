use rand::Rng;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Normal, Triangular, Uniform};
use statrs::statistics::Distribution;
use std::f64::consts::PI;

use crate::error::ValuationError;
use crate::EngineResult;

/// Probability distribution for one simulated driver.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DistributionSpec {
    /// Normal, optionally truncated by clamping to [min, max]
    Normal {
        mean: f64,
        std_dev: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        max: Option<f64>,
    },
    Triangular { min: f64, mode: f64, max: f64 },
    Uniform { min: f64, max: f64 },
}

impl DistributionSpec {
    /// Reject malformed parameters before any draw is made.
    pub fn validate(&self, field: &str) -> EngineResult<()> {
        let invalid = |reason: String| ValuationError::invalid(field, reason);

        match self {
            DistributionSpec::Normal {
                mean,
                std_dev,
                min,
                max,
            } => {
                if !std_dev.is_finite() || *std_dev <= 0.0 {
                    return Err(invalid(format!(
                        "Normal std_dev must be positive (got {std_dev})"
                    )));
                }
                Normal::new(*mean, *std_dev)
                    .map_err(|e| invalid(format!("Invalid Normal parameters: {e}")))?;
                if let (Some(lo), Some(hi)) = (min, max) {
                    if hi <= lo {
                        return Err(invalid(format!(
                            "Normal truncation max ({hi}) must exceed min ({lo})"
                        )));
                    }
                }
            }
            DistributionSpec::Triangular { min, mode, max } => {
                if max <= min {
                    return Err(invalid(format!(
                        "Triangular max ({max}) must exceed min ({min})"
                    )));
                }
                if mode < min || mode > max {
                    return Err(invalid(format!(
                        "Triangular mode ({mode}) must lie within [{min}, {max}]"
                    )));
                }
                Triangular::new(*min, *max, *mode)
                    .map_err(|e| invalid(format!("Invalid Triangular parameters: {e}")))?;
            }
            DistributionSpec::Uniform { min, max } => {
                if max <= min {
                    return Err(invalid(format!(
                        "Uniform max ({max}) must exceed min ({min})"
                    )));
                }
                Uniform::new(*min, *max)
                    .map_err(|e| invalid(format!("Invalid Uniform parameters: {e}")))?;
            }
        }
        Ok(())
    }

    /// Draw one value. Parameters are assumed validated.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            DistributionSpec::Normal {
                mean,
                std_dev,
                min,
                max,
            } => {
                let mut x = mean + std_dev * box_muller(rng);
                if let Some(lo) = min {
                    x = x.max(*lo);
                }
                if let Some(hi) = max {
                    x = x.min(*hi);
                }
                x
            }
            DistributionSpec::Triangular { min, mode, max } => {
                triangular_inverse_cdf(rng.gen::<f64>(), *min, *mode, *max)
            }
            DistributionSpec::Uniform { min, max } => min + rng.gen::<f64>() * (max - min),
        }
    }

    /// Mean of the untruncated distribution.
    pub fn theoretical_mean(&self) -> Option<f64> {
        match self {
            DistributionSpec::Normal { mean, std_dev, .. } => {
                Normal::new(*mean, *std_dev).ok()?.mean()
            }
            DistributionSpec::Triangular { min, mode, max } => {
                Triangular::new(*min, *max, *mode).ok()?.mean()
            }
            DistributionSpec::Uniform { min, max } => Uniform::new(*min, *max).ok()?.mean(),
        }
    }
}

/// Standard normal draw via the Box–Muller transform.
fn box_muller<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    // u1 in (0, 1] keeps ln finite
    let u1 = 1.0 - rng.gen::<f64>();
    let u2 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * PI * u2).cos()
}

/// Inverse CDF of the triangular distribution at `u` in [0, 1).
fn triangular_inverse_cdf(u: f64, min: f64, mode: f64, max: f64) -> f64 {
    let range = max - min;
    let c = (mode - min) / range;
    if u < c {
        min + (u * range * (mode - min)).sqrt()
    } else {
        max - ((1.0 - u) * range * (max - mode)).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    const SEED: u64 = 42;

    fn sample_mean(spec: &DistributionSpec, n: usize) -> f64 {
        let mut rng = StdRng::seed_from_u64(SEED);
        (0..n).map(|_| spec.sample(&mut rng)).sum::<f64>() / n as f64
    }

    #[test]
    fn test_triangular_mean_within_one_percent() {
        let spec = DistributionSpec::Triangular {
            min: 100.0,
            mode: 120.0,
            max: 140.0,
        };
        let expected = spec.theoretical_mean().unwrap();
        let mean = sample_mean(&spec, 10_000);
        assert!(
            ((mean - expected) / expected).abs() < 0.01,
            "mean={mean}, expected={expected}"
        );
    }

    #[test]
    fn test_normal_mean_within_one_percent() {
        let spec = DistributionSpec::Normal {
            mean: 100.0,
            std_dev: 5.0,
            min: None,
            max: None,
        };
        let expected = spec.theoretical_mean().unwrap();
        let mean = sample_mean(&spec, 1_000);
        assert!(
            ((mean - expected) / expected).abs() < 0.01,
            "mean={mean}, expected={expected}"
        );
    }

    #[test]
    fn test_uniform_mean() {
        let spec = DistributionSpec::Uniform {
            min: 0.03,
            max: 0.07,
        };
        let mean = sample_mean(&spec, 10_000);
        assert!((mean - 0.05).abs() < 0.001, "mean={mean}");
    }

    #[test]
    fn test_triangular_inverse_cdf_endpoints() {
        assert_eq!(triangular_inverse_cdf(0.0, 1.0, 2.0, 4.0), 1.0);
        // u = c lands on the mode
        let c = (2.0 - 1.0) / (4.0 - 1.0);
        assert!((triangular_inverse_cdf(c, 1.0, 2.0, 4.0) - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_normal_truncation_clamps() {
        let spec = DistributionSpec::Normal {
            mean: 0.0,
            std_dev: 10.0,
            min: Some(-1.0),
            max: Some(1.0),
        };
        let mut rng = StdRng::seed_from_u64(SEED);
        for _ in 0..1_000 {
            let x = spec.sample(&mut rng);
            assert!((-1.0..=1.0).contains(&x));
        }
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        let bad = [
            DistributionSpec::Normal {
                mean: 0.1,
                std_dev: 0.0,
                min: None,
                max: None,
            },
            DistributionSpec::Triangular {
                min: 0.1,
                mode: 0.3,
                max: 0.2,
            },
            DistributionSpec::Triangular {
                min: 0.2,
                mode: 0.2,
                max: 0.2,
            },
            DistributionSpec::Uniform { min: 1.0, max: 1.0 },
        ];
        for spec in &bad {
            let err = spec.validate("wacc").unwrap_err();
            assert_eq!(err.field(), Some("wacc"));
        }
    }
}
