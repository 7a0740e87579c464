//! Forecast ingestor — turns raw records into validated forecasts.
//!
//! Pure function of its inputs plus the tick time. It never picks a winning
//! horizon; the decision engine does that.

use std::time::Duration;

use tracing::debug;

use predscale_core::{EpochSecs, Forecast, ForecastError, HorizonSet, LoopConfig, RawForecast};

/// Validated forecasts for one tick plus what was thrown away.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IngestReport {
    pub accepted: HorizonSet,
    pub rejected: Vec<ForecastError>,
}

impl IngestReport {
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Validates forecast records against the configured metric and freshness.
#[derive(Debug, Clone)]
pub struct Ingestor {
    metric: String,
    /// One tick interval plus the staleness tolerance.
    max_age: Duration,
    /// How far in the future `generated_at` may be (clock skew).
    max_skew: Duration,
}

impl Ingestor {
    pub fn new(metric: &str, max_age: Duration, max_skew: Duration) -> Self {
        Self {
            metric: metric.to_string(),
            max_age,
            max_skew,
        }
    }

    /// Build an ingestor from the loop settings.
    pub fn from_config(metric: &str, tick: &LoopConfig) -> Self {
        Self::new(metric, tick.max_forecast_age(), tick.staleness_tolerance)
    }

    /// Validate one record at tick time `now`.
    pub fn ingest(&self, raw: &RawForecast, now: EpochSecs) -> Result<Forecast, ForecastError> {
        check_shape(raw)?;
        let horizon = raw.horizon();

        if raw.metric != self.metric {
            return Err(ForecastError::Invalid {
                horizon,
                reason: format!("metric {:?}, expected {:?}", raw.metric, self.metric),
            });
        }

        if raw.generated_at > now.saturating_add(self.max_skew.as_secs()) {
            return Err(ForecastError::Invalid {
                horizon,
                reason: format!("generated_at {} is in the future", raw.generated_at),
            });
        }

        let age = now.saturating_sub(raw.generated_at);
        if age > self.max_age.as_secs() {
            return Err(ForecastError::Stale {
                horizon,
                age_secs: age,
                max_age_secs: self.max_age.as_secs(),
            });
        }

        Ok(Forecast {
            metric: raw.metric.clone(),
            horizon,
            point: raw.point,
            lower: raw.lower,
            upper: raw.upper,
            generated_at: raw.generated_at,
        })
    }

    /// Validate every record of a tick. When a horizon appears more than
    /// once, the newest valid record wins.
    pub fn ingest_batch(&self, raws: &[RawForecast], now: EpochSecs) -> IngestReport {
        let mut report = IngestReport::default();
        for raw in raws {
            match self.ingest(raw, now) {
                Ok(forecast) => {
                    let newer = report
                        .accepted
                        .get(&forecast.horizon)
                        .is_none_or(|existing| existing.generated_at <= forecast.generated_at);
                    if newer {
                        report.accepted.insert(forecast.horizon, forecast);
                    }
                }
                Err(e) => {
                    debug!(error = %e, "forecast rejected");
                    report.rejected.push(e);
                }
            }
        }
        report
    }
}

/// Checks that do not depend on time: finite, non-negative, ordered bounds.
pub(crate) fn check_shape(raw: &RawForecast) -> Result<(), ForecastError> {
    let horizon = raw.horizon();
    let invalid = |reason: &str| {
        Err(ForecastError::Invalid {
            horizon,
            reason: reason.to_string(),
        })
    };

    if raw.horizon_minutes == 0 {
        return invalid("horizon must be at least one minute");
    }
    if ![raw.point, raw.lower, raw.upper].iter().all(|v| v.is_finite()) {
        return invalid("non-finite value");
    }
    if raw.lower < 0.0 || raw.point < 0.0 || raw.upper < 0.0 {
        return invalid("negative rate");
    }
    if !(raw.lower <= raw.point && raw.point <= raw.upper) {
        return invalid("bounds out of order (need lower <= point <= upper)");
    }
    Ok(())
}
