//! Decision engine — forecast set to candidate replica target.

use std::collections::BTreeMap;

use tracing::debug;

use predscale_core::{Horizon, HorizonConfig, HorizonSet, PlanError, SloConstraints};

use crate::ceil_replicas;

/// Unstabilized target produced from one tick's forecasts.
#[derive(Debug, Clone, PartialEq)]
pub struct Candidate {
    /// Requirement clipped into `[min_replicas, max_replicas]`.
    pub target: u32,
    /// Combined requirement before clipping.
    pub requirement: u32,
    /// Requirement of every configured horizon that had a forecast.
    pub per_horizon: BTreeMap<Horizon, u32>,
    /// Widest `(upper - lower) / point` among the horizons that shaped
    /// the requirement.
    pub relative_width: f64,
    /// Whether the long horizon pulled the requirement down.
    pub blended: bool,
}

/// Replicas needed to serve `upper` at the target utilization with `margin`.
pub fn replica_requirement(
    upper: f64,
    slo: &SloConstraints,
    margin: f64,
) -> Result<u32, PlanError> {
    let per_replica = slo.per_replica_capacity * slo.target_utilization;
    let raw = upper * margin / per_replica;
    if !raw.is_finite() || raw < 0.0 {
        return Err(PlanError::ConstraintViolation(format!(
            "replica requirement is not a finite non-negative number (upper={upper}, \
             margin={margin}, per_replica={per_replica})"
        )));
    }
    Ok(ceil_replicas(raw))
}

/// Combine the tick's forecasts into a candidate target.
///
/// Short and medium horizons are required (at least one of them); the long
/// horizon only ever relaxes the target.
pub fn decide(
    forecasts: &HorizonSet,
    slo: &SloConstraints,
    horizons: &HorizonConfig,
) -> Result<Candidate, PlanError> {
    if slo.min_replicas > slo.max_replicas {
        return Err(PlanError::ConstraintViolation(format!(
            "min_replicas ({}) > max_replicas ({})",
            slo.min_replicas, slo.max_replicas
        )));
    }

    let configured = [Some(horizons.short()), Some(horizons.medium()), horizons.long()];
    let mut per_horizon = BTreeMap::new();
    for horizon in configured.into_iter().flatten() {
        if let Some(forecast) = forecasts.get(&horizon) {
            let needed = replica_requirement(forecast.upper, slo, slo.safety_margin)?;
            per_horizon.insert(horizon, needed);
        }
    }

    let near_horizons = [horizons.short(), horizons.medium()];
    let near = near_horizons
        .iter()
        .filter_map(|h| per_horizon.get(h))
        .max()
        .copied()
        .ok_or(PlanError::ForecastMissing)?;
    let mut relative_width = near_horizons
        .iter()
        .filter_map(|h| forecasts.get(h))
        .map(|f| f.relative_width())
        .fold(0.0, f64::max);

    let mut requirement = near;
    let mut blended = false;
    if let Some(long_horizon) = horizons.long()
        && let Some(&long) = per_horizon.get(&long_horizon)
        && near > 0
    {
        let shortfall = (near as f64 - long as f64) / near as f64;
        if shortfall > horizons.relaxation_threshold {
            let w = horizons.blend_weight;
            requirement = ceil_replicas(near as f64 * (1.0 - w) + long as f64 * w);
            blended = true;
            if let Some(f) = forecasts.get(&long_horizon) {
                relative_width = relative_width.max(f.relative_width());
            }
            debug!(near, long, requirement, shortfall, "blended toward long horizon");
        }
    }

    Ok(Candidate {
        target: slo.clamp(requirement),
        requirement,
        per_horizon,
        relative_width,
        blended,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use predscale_core::{Forecast, ResourceProfile};
    use std::time::Duration;

    pub(crate) fn slo() -> SloConstraints {
        SloConstraints {
            min_replicas: 2,
            max_replicas: 10,
            per_replica_capacity: 50.0,
            target_utilization: 0.8,
            safety_margin: 1.1,
            max_scale_up_step: 2,
            max_scale_down_step: 1,
            scale_up_cooldown: Duration::from_secs(60),
            scale_down_cooldown: Duration::from_secs(300),
            emergency_multiple: 2.0,
            confidence_width_ratio: 0.5,
            confidence_margin_boost: 1.25,
            resources: ResourceProfile::default(),
        }
    }

    pub(crate) fn forecast(horizon: u32, point: f64, lower: f64, upper: f64) -> Forecast {
        Forecast {
            metric: "rps".to_string(),
            horizon: Horizon(horizon),
            point,
            lower,
            upper,
            generated_at: 1000,
        }
    }

    fn set(forecasts: Vec<Forecast>) -> HorizonSet {
        forecasts.into_iter().map(|f| (f.horizon, f)).collect()
    }

    #[test]
    fn requirement_matches_worked_example() {
        // ceil(120 * 1.1 / (50 * 0.8)) = ceil(3.3) = 4
        assert_eq!(replica_requirement(120.0, &slo(), 1.1).unwrap(), 4);
    }

    #[test]
    fn requirement_exact_multiple_does_not_round_up() {
        // 160 * 1.0 / 40 = 4 exactly.
        assert_eq!(replica_requirement(160.0, &slo(), 1.0).unwrap(), 4);
    }

    #[test]
    fn single_short_horizon_candidate() {
        let c = decide(
            &set(vec![forecast(5, 100.0, 90.0, 120.0)]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        assert_eq!(c.target, 4);
        assert!(!c.blended);
    }

    #[test]
    fn takes_max_of_short_and_medium() {
        let c = decide(
            &set(vec![
                forecast(5, 100.0, 90.0, 120.0),   // 4
                forecast(15, 200.0, 180.0, 250.0), // ceil(6.875) = 7
            ]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        assert_eq!(c.target, 7);
        assert_eq!(c.per_horizon[&Horizon(5)], 4);
    }

    #[test]
    fn long_horizon_blends_when_much_lower() {
        let c = decide(
            &set(vec![
                forecast(5, 280.0, 260.0, 290.0),  // ceil(7.975) = 8
                forecast(15, 200.0, 180.0, 210.0), // ceil(5.775) = 6
                forecast(30, 60.0, 50.0, 70.0),    // ceil(1.925) = 2
            ]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        // shortfall (8 - 2) / 8 = 0.75 > 0.3 → ceil(8 * 0.5 + 2 * 0.5) = 5
        assert!(c.blended);
        assert_eq!(c.requirement, 5);
        assert_eq!(c.target, 5);
    }

    #[test]
    fn long_horizon_within_threshold_is_ignored() {
        let c = decide(
            &set(vec![
                forecast(5, 100.0, 90.0, 120.0),  // 4
                forecast(30, 100.0, 90.0, 110.0), // ceil(3.025) = 4
            ]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        assert!(!c.blended);
        assert_eq!(c.target, 4);
    }

    #[test]
    fn higher_long_horizon_never_raises_target() {
        let c = decide(
            &set(vec![
                forecast(5, 100.0, 90.0, 120.0),  // 4
                forecast(30, 350.0, 300.0, 400.0), // 11
            ]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        assert_eq!(c.target, 4);
    }

    #[test]
    fn clips_into_bounds() {
        let huge = decide(
            &set(vec![forecast(5, 5000.0, 4000.0, 6000.0)]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        assert_eq!(huge.target, 10);
        assert!(huge.requirement > 10);

        let idle = decide(
            &set(vec![forecast(5, 0.0, 0.0, 0.0)]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        assert_eq!(idle.target, 2);
    }

    #[test]
    fn missing_required_horizons() {
        let err = decide(
            &set(vec![forecast(30, 100.0, 90.0, 110.0)]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap_err();
        assert_eq!(err, PlanError::ForecastMissing);

        assert_eq!(
            decide(&HorizonSet::new(), &slo(), &HorizonConfig::default()).unwrap_err(),
            PlanError::ForecastMissing
        );
    }

    #[test]
    fn reports_widest_interval() {
        let c = decide(
            &set(vec![
                forecast(5, 100.0, 90.0, 110.0),  // 0.2
                forecast(15, 100.0, 40.0, 120.0), // 0.8
            ]),
            &slo(),
            &HorizonConfig::default(),
        )
        .unwrap();
        assert!((c.relative_width - 0.8).abs() < 1e-9);
    }

    #[test]
    fn inverted_bounds_are_a_constraint_violation() {
        let mut bad = slo();
        bad.min_replicas = 11;
        assert!(matches!(
            decide(
                &set(vec![forecast(5, 100.0, 90.0, 120.0)]),
                &bad,
                &HorizonConfig::default()
            ),
            Err(PlanError::ConstraintViolation(_))
        ));
    }

    #[test]
    fn zero_capacity_is_a_constraint_violation() {
        let mut bad = slo();
        bad.per_replica_capacity = 0.0;
        assert!(matches!(
            replica_requirement(100.0, &bad, 1.1),
            Err(PlanError::ConstraintViolation(_))
        ));
    }
}
