use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::time::Instant;

use crate::error::ValuationError;
use crate::types::{with_metadata, ComputationOutput, Money, Rate};
use crate::EngineResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// What a service line sells. Drives how revenue is annualised and which
/// revenue bucket it lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServiceKind {
    /// Treatments and procedures delivered in an appointment slot.
    Service,
    /// Products sold over the counter.
    Retail,
    /// Recurring memberships; `volume` is the member count and `unit_price`
    /// the price per billing period.
    Membership {
        #[serde(default = "default_billing_periods")]
        billing_periods_per_year: u32,
    },
}

fn default_billing_periods() -> u32 {
    1
}

impl ServiceKind {
    /// Number of times `unit_price` is charged per unit of volume per year.
    pub fn billing_periods(&self) -> Decimal {
        match self {
            ServiceKind::Service | ServiceKind::Retail => Decimal::ONE,
            ServiceKind::Membership {
                billing_periods_per_year,
            } => Decimal::from(*billing_periods_per_year),
        }
    }

    /// Whether revenue of this kind counts as service revenue when costs are
    /// applied against service revenue only.
    pub fn is_service_revenue(&self) -> bool {
        match self {
            ServiceKind::Service | ServiceKind::Membership { .. } => true,
            ServiceKind::Retail => false,
        }
    }
}

/// A single priced offering. Volume is annual, per location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLine {
    pub id: String,
    pub name: String,
    pub unit_price: Money,
    pub volume: Decimal,
    /// Cost of goods sold as a fraction of revenue, within [0, 1]
    pub cogs_pct: Rate,
    pub kind: ServiceKind,
    /// Appointment slots consumed per unit of volume
    #[serde(default)]
    pub visit_units_per_sale: Decimal,
}

/// A pool of schedulable capacity: providers (count = FTE) or treatment
/// rooms (count = rooms).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityPool {
    pub count: Decimal,
    pub hours_per_week: Decimal,
    pub appts_per_hour: Decimal,
    /// Fraction of scheduled hours actually bookable, within [0, 1]
    pub utilization: Rate,
}

impl CapacityPool {
    /// Annual slots = count × hours × weeks × utilization × appts/hour
    pub fn annual_slots(&self, weeks_per_year: Decimal) -> Decimal {
        self.count * self.hours_per_week * weeks_per_year * self.utilization * self.appts_per_hour
    }

    fn validate(&self, pool: &str) -> Result<(), (String, String)> {
        let checks = [
            ("count", self.count),
            ("hours_per_week", self.hours_per_week),
            ("appts_per_hour", self.appts_per_hour),
        ];
        for (name, value) in checks {
            if value < Decimal::ZERO {
                return Err((format!("{pool}.{name}"), format!("{name} cannot be negative")));
            }
        }
        if self.utilization < Decimal::ZERO || self.utilization > Decimal::ONE {
            return Err((
                format!("{pool}.utilization"),
                "Utilization must be between 0 and 1".into(),
            ));
        }
        Ok(())
    }
}

/// Per-location capacity configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityConfig {
    pub providers: CapacityPool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rooms: Option<CapacityPool>,
    #[serde(default = "default_weeks_per_year")]
    pub weeks_per_year: Decimal,
}

fn default_weeks_per_year() -> Decimal {
    dec!(52)
}

/// Input for the revenue & capacity model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueInput {
    pub service_lines: Vec<ServiceLine>,
    pub locations: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacityConfig>,
}

/// Revenue result for one service line after any capacity scaling.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceLineResult {
    pub id: String,
    pub name: String,
    pub kind: ServiceKind,
    /// Per-location annual volume after capacity scaling
    pub effective_volume: Decimal,
    pub revenue: Money,
    pub cogs: Money,
    pub gross_profit: Money,
}

/// Revenue split by service kind.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RevenueByKind {
    pub service: Money,
    pub retail: Money,
    pub membership: Money,
}

/// Demand vs capacity, per location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapacityAnalysis {
    pub provider_slots: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub room_slots: Option<Decimal>,
    pub effective_capacity: Decimal,
    /// Slots demanded by the unconstrained volumes
    pub demand: Decimal,
    /// Volume multiplier applied to every line (1 when unconstrained)
    pub scale_factor: Decimal,
}

/// Output of the revenue & capacity model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevenueOutput {
    pub lines: Vec<ServiceLineResult>,
    pub revenue_by_kind: RevenueByKind,
    pub total_revenue: Money,
    pub total_cogs: Money,
    pub gross_profit: Money,
    pub gross_margin: Rate,
    /// min(1, demand / capacity); absent when no usable capacity was given
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity_utilization: Option<Rate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub capacity: Option<CapacityAnalysis>,
    /// Volumes were scaled down to fit capacity
    pub constrained: bool,
    /// Capacity was configured but works out to zero slots; revenue is
    /// reported unconstrained
    pub capacity_infeasible: bool,
}

impl RevenueOutput {
    /// Revenue that cost lines applied "against service revenue" use.
    pub fn service_revenue(&self) -> Money {
        self.revenue_by_kind.service + self.revenue_by_kind.membership
    }
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Build gross revenue and gross profit from service-line economics,
/// clamping volumes to provider/room capacity when configured.
///
/// When demand exceeds effective capacity every line's volume is scaled by
/// `capacity / demand` before revenue is computed, so constrained demand
/// equals capacity exactly. Zero capacity (no providers or no rooms) is an
/// explicit branch: no constraint is applied and `capacity_infeasible` is set.
pub fn build_revenue(input: &RevenueInput) -> EngineResult<ComputationOutput<RevenueOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_revenue_input(input)?;

    let demand: Decimal = input
        .service_lines
        .iter()
        .map(|l| l.visit_units_per_sale * l.volume)
        .sum();

    let mut scale_factor = Decimal::ONE;
    let mut constrained = false;
    let mut capacity_infeasible = false;
    let mut capacity_utilization = None;
    let mut capacity_analysis = None;

    if let Some(cap) = &input.capacity {
        if let Err((field, reason)) = validate_capacity(cap) {
            if demand > Decimal::ZERO {
                return Err(ValuationError::InfeasibleCapacity { field, reason });
            }
            warnings.push(format!("Capacity config ignored ({field}: {reason}); no demand"));
        } else {
            let provider_slots = cap.providers.annual_slots(cap.weeks_per_year);
            let room_slots = cap.rooms.as_ref().map(|r| r.annual_slots(cap.weeks_per_year));
            let effective_capacity = match room_slots {
                Some(rooms) => provider_slots.min(rooms),
                None => provider_slots,
            };

            if effective_capacity.is_zero() {
                capacity_infeasible = true;
                warnings.push(
                    "Effective capacity is zero (no providers or rooms); revenue reported unconstrained"
                        .into(),
                );
            } else {
                let utilization = (demand / effective_capacity).min(Decimal::ONE);
                capacity_utilization = Some(utilization);
                if demand > effective_capacity {
                    scale_factor = effective_capacity / demand;
                    constrained = true;
                    warnings.push(format!(
                        "Demand of {demand} slots exceeds capacity of {effective_capacity}; volumes scaled by {}",
                        scale_factor.round_dp(6)
                    ));
                } else if utilization > dec!(0.90) {
                    warnings.push(format!(
                        "Capacity utilization of {} is above 90%",
                        utilization.round_dp(4)
                    ));
                }
            }

            capacity_analysis = Some(CapacityAnalysis {
                provider_slots,
                room_slots,
                effective_capacity,
                demand,
                scale_factor,
            });
        }
    }

    let locations = Decimal::from(input.locations);
    let mut lines = Vec::with_capacity(input.service_lines.len());
    let mut by_kind = RevenueByKind::default();

    for line in &input.service_lines {
        let effective_volume = line.volume * scale_factor;
        let revenue = line.unit_price * effective_volume * line.kind.billing_periods() * locations;
        let cogs = revenue * line.cogs_pct;

        match line.kind {
            ServiceKind::Service => by_kind.service += revenue,
            ServiceKind::Retail => by_kind.retail += revenue,
            ServiceKind::Membership { .. } => by_kind.membership += revenue,
        }

        lines.push(ServiceLineResult {
            id: line.id.clone(),
            name: line.name.clone(),
            kind: line.kind,
            effective_volume,
            revenue,
            cogs,
            gross_profit: revenue - cogs,
        });
    }

    let total_revenue: Money = lines.iter().map(|l| l.revenue).sum();
    let total_cogs: Money = lines.iter().map(|l| l.cogs).sum();
    let gross_profit = total_revenue - total_cogs;
    let gross_margin = if total_revenue.is_zero() {
        Decimal::ZERO
    } else {
        gross_profit / total_revenue
    };

    let output = RevenueOutput {
        lines,
        revenue_by_kind: by_kind,
        total_revenue,
        total_cogs,
        gross_profit,
        gross_margin,
        capacity_utilization,
        capacity: capacity_analysis,
        constrained,
        capacity_infeasible,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Service-line revenue with provider/room capacity clamp",
        &serde_json::json!({
            "service_lines": input.service_lines.len(),
            "locations": input.locations,
            "capacity_configured": input.capacity.is_some(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Validation
// ---------------------------------------------------------------------------

fn validate_revenue_input(input: &RevenueInput) -> EngineResult<()> {
    if input.service_lines.is_empty() {
        return Err(ValuationError::InsufficientData(
            "At least one service line is required".into(),
        ));
    }
    if input.locations == 0 {
        return Err(ValuationError::invalid(
            "locations",
            "Location count must be at least 1",
        ));
    }
    for line in &input.service_lines {
        validate_service_line(line)?;
    }
    Ok(())
}

pub(crate) fn validate_service_line(line: &ServiceLine) -> EngineResult<()> {
    if line.unit_price < Decimal::ZERO {
        return Err(ValuationError::invalid(
            format!("service_lines[{}].unit_price", line.id),
            "Unit price cannot be negative",
        ));
    }
    if line.volume < Decimal::ZERO {
        return Err(ValuationError::invalid(
            format!("service_lines[{}].volume", line.id),
            "Volume cannot be negative",
        ));
    }
    if line.cogs_pct < Decimal::ZERO || line.cogs_pct > Decimal::ONE {
        return Err(ValuationError::invalid(
            format!("service_lines[{}].cogs_pct", line.id),
            "COGS percentage must be between 0 and 1",
        ));
    }
    if line.visit_units_per_sale < Decimal::ZERO {
        return Err(ValuationError::invalid(
            format!("service_lines[{}].visit_units_per_sale", line.id),
            "Visit units per sale cannot be negative",
        ));
    }
    if let ServiceKind::Membership {
        billing_periods_per_year: 0,
    } = line.kind
    {
        return Err(ValuationError::invalid(
            format!("service_lines[{}].kind.billing_periods_per_year", line.id),
            "Membership must bill at least once per year",
        ));
    }
    Ok(())
}

fn validate_capacity(cap: &CapacityConfig) -> Result<(), (String, String)> {
    if cap.weeks_per_year <= Decimal::ZERO {
        return Err((
            "capacity.weeks_per_year".into(),
            "Weeks per year must be positive".into(),
        ));
    }
    cap.providers.validate("capacity.providers")?;
    if let Some(rooms) = &cap.rooms {
        rooms.validate("capacity.rooms")?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn line(id: &str, price: Decimal, volume: Decimal, visits: Decimal) -> ServiceLine {
        ServiceLine {
            id: id.into(),
            name: id.to_uppercase(),
            unit_price: price,
            volume,
            cogs_pct: dec!(0.20),
            kind: ServiceKind::Service,
            visit_units_per_sale: visits,
        }
    }

    fn providers(count: Decimal) -> CapacityPool {
        CapacityPool {
            count,
            hours_per_week: dec!(40),
            appts_per_hour: dec!(2),
            utilization: dec!(0.86),
        }
    }

    #[test]
    fn test_revenue_scales_with_locations() {
        let input = RevenueInput {
            service_lines: vec![line("botox", dec!(450), dec!(1000), dec!(1))],
            locations: 3,
            capacity: None,
        };
        let out = build_revenue(&input).unwrap().result;
        assert_eq!(out.total_revenue, dec!(1350000));
        assert_eq!(out.total_cogs, dec!(270000));
        assert_eq!(out.gross_profit, dec!(1080000));
        assert!(!out.constrained);
        assert!(out.capacity_utilization.is_none());
    }

    #[test]
    fn test_membership_annualises_billing_periods() {
        let mut member = line("club", dec!(99), dec!(200), dec!(0));
        member.kind = ServiceKind::Membership {
            billing_periods_per_year: 12,
        };
        let mut retail = line("serum", dec!(80), dec!(500), dec!(0));
        retail.kind = ServiceKind::Retail;
        let input = RevenueInput {
            service_lines: vec![member, retail],
            locations: 1,
            capacity: None,
        };
        let out = build_revenue(&input).unwrap().result;
        assert_eq!(out.revenue_by_kind.membership, dec!(237600));
        assert_eq!(out.revenue_by_kind.retail, dec!(40000));
        assert_eq!(out.service_revenue(), dec!(237600));
    }

    #[test]
    fn test_low_demand_is_unconstrained() {
        // 1 FTE × 40h × 52w × 0.86 × 2/h = 3577.6 slots
        let input = RevenueInput {
            service_lines: vec![line("filler", dec!(700), dec!(400), dec!(1))],
            locations: 1,
            capacity: Some(CapacityConfig {
                providers: providers(dec!(1)),
                rooms: None,
                weeks_per_year: dec!(52),
            }),
        };
        let out = build_revenue(&input).unwrap().result;
        let cap = out.capacity.as_ref().unwrap();
        assert_eq!(cap.provider_slots, dec!(3577.6));
        assert!(!out.constrained);
        assert_eq!(cap.scale_factor, Decimal::ONE);
        assert!(out.capacity_utilization.unwrap() < dec!(0.12));
    }

    #[test]
    fn test_excess_demand_scales_every_line_to_capacity() {
        let input = RevenueInput {
            service_lines: vec![
                line("a", dec!(100), dec!(3000), dec!(1)),
                line("b", dec!(200), dec!(1000), dec!(2)),
            ],
            locations: 1,
            capacity: Some(CapacityConfig {
                providers: providers(dec!(1)),
                rooms: None,
                weeks_per_year: dec!(52),
            }),
        };
        let out = build_revenue(&input).unwrap().result;
        assert!(out.constrained);
        assert_eq!(out.capacity_utilization, Some(Decimal::ONE));

        let cap = out.capacity.as_ref().unwrap();
        let scaled_demand = out.lines[0].effective_volume + out.lines[1].effective_volume * dec!(2);
        assert!((scaled_demand - cap.effective_capacity).abs() < dec!(0.000001));
        // Proportional: both lines shrink by the same factor
        let ratio_a = out.lines[0].effective_volume / dec!(3000);
        let ratio_b = out.lines[1].effective_volume / dec!(1000);
        assert!((ratio_a - ratio_b).abs() < dec!(0.0000001));
    }

    #[test]
    fn test_rooms_bind_before_providers() {
        let input = RevenueInput {
            service_lines: vec![line("a", dec!(100), dec!(3000), dec!(1))],
            locations: 1,
            capacity: Some(CapacityConfig {
                providers: providers(dec!(3)),
                rooms: Some(CapacityPool {
                    count: dec!(1),
                    hours_per_week: dec!(50),
                    appts_per_hour: dec!(1),
                    utilization: dec!(1),
                }),
                weeks_per_year: dec!(52),
            }),
        };
        let out = build_revenue(&input).unwrap().result;
        let cap = out.capacity.unwrap();
        assert_eq!(cap.effective_capacity, dec!(2600));
        assert!(out.constrained);
    }

    #[test]
    fn test_zero_providers_is_flagged_not_divided() {
        let input = RevenueInput {
            service_lines: vec![line("a", dec!(100), dec!(500), dec!(1))],
            locations: 1,
            capacity: Some(CapacityConfig {
                providers: providers(Decimal::ZERO),
                rooms: None,
                weeks_per_year: dec!(52),
            }),
        };
        let result = build_revenue(&input).unwrap();
        assert!(result.result.capacity_infeasible);
        assert!(!result.result.constrained);
        assert_eq!(result.result.total_revenue, dec!(50000));
        assert!(result.warnings.iter().any(|w| w.contains("zero")));
    }

    #[test]
    fn test_malformed_capacity_with_demand_is_infeasible() {
        let mut pool = providers(dec!(1));
        pool.utilization = dec!(1.5);
        let input = RevenueInput {
            service_lines: vec![line("a", dec!(100), dec!(500), dec!(1))],
            locations: 1,
            capacity: Some(CapacityConfig {
                providers: pool,
                rooms: None,
                weeks_per_year: dec!(52),
            }),
        };
        match build_revenue(&input).unwrap_err() {
            ValuationError::InfeasibleCapacity { field, .. } => {
                assert_eq!(field, "capacity.providers.utilization")
            }
            e => panic!("Expected InfeasibleCapacity, got {e:?}"),
        }
    }

    #[test]
    fn test_cogs_pct_out_of_range_rejected() {
        let mut bad = line("a", dec!(100), dec!(10), dec!(1));
        bad.cogs_pct = dec!(1.2);
        let input = RevenueInput {
            service_lines: vec![bad],
            locations: 1,
            capacity: None,
        };
        match build_revenue(&input).unwrap_err() {
            ValuationError::InvalidInput { field, .. } => assert!(field.contains("cogs_pct")),
            e => panic!("Expected InvalidInput, got {e:?}"),
        }
    }

    #[test]
    fn test_negative_volume_rejected() {
        let input = RevenueInput {
            service_lines: vec![line("a", dec!(100), dec!(-1), dec!(1))],
            locations: 1,
            capacity: None,
        };
        assert!(build_revenue(&input).is_err());
    }
}
