//! Latest-value feeds shared between producers and the planning loop.
//!
//! Producers may publish at any time; the loop copies the current value
//! once at the start of a tick, so an update that lands mid-tick only
//! affects the next one.

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::watch;
use tracing::debug;

use predscale_core::{EpochSecs, ForecastError, Horizon, RawForecast, UtilizationSample};

use crate::ingestor::check_shape;

/// Errors for observations that can never be used.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeedError {
    #[error("invalid utilization {0}: must be a finite, non-negative fraction")]
    InvalidUtilization(f64),
}

/// What a publish call stored and what it refused.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PublishReport {
    pub stored: usize,
    pub rejected: Vec<ForecastError>,
}

/// Latest raw forecast per horizon for one metric.
#[derive(Clone)]
pub struct ForecastFeed {
    metric: Arc<str>,
    tx: Arc<watch::Sender<BTreeMap<Horizon, RawForecast>>>,
}

impl ForecastFeed {
    /// Feed that only stores records for `metric`.
    pub fn new(metric: &str) -> Self {
        let (tx, _rx) = watch::channel(BTreeMap::new());
        Self {
            metric: Arc::from(metric),
            tx: Arc::new(tx),
        }
    }

    /// Store a batch of records. Structurally invalid records and records
    /// for another metric are refused; an older record never replaces a
    /// newer one for the same horizon.
    pub fn publish(&self, batch: Vec<RawForecast>) -> PublishReport {
        let mut report = PublishReport::default();
        let mut accepted = Vec::with_capacity(batch.len());
        for raw in batch {
            match self.check(&raw) {
                Ok(()) => accepted.push(raw),
                Err(e) => report.rejected.push(e),
            }
        }

        self.tx.send_modify(|latest| {
            for raw in accepted {
                let horizon = raw.horizon();
                let newer = latest
                    .get(&horizon)
                    .is_none_or(|existing| existing.generated_at <= raw.generated_at);
                if newer {
                    latest.insert(horizon, raw);
                    report.stored += 1;
                }
            }
        });

        debug!(
            stored = report.stored,
            rejected = report.rejected.len(),
            "forecast batch published"
        );
        report
    }

    fn check(&self, raw: &RawForecast) -> Result<(), ForecastError> {
        check_shape(raw)?;
        if raw.metric != *self.metric {
            return Err(ForecastError::Invalid {
                horizon: raw.horizon(),
                reason: format!("metric {:?}, expected {:?}", raw.metric, self.metric),
            });
        }
        Ok(())
    }

    /// Drop records older than `max_age_secs` at time `now`. Returns how
    /// many were removed.
    pub fn prune_stale(&self, now: EpochSecs, max_age_secs: u64) -> usize {
        let mut removed = 0;
        self.tx.send_if_modified(|latest| {
            let before = latest.len();
            latest.retain(|_, raw| now.saturating_sub(raw.generated_at) <= max_age_secs);
            removed = before - latest.len();
            removed > 0
        });
        removed
    }

    /// Copy of the current records, one per horizon.
    pub fn snapshot(&self) -> Vec<RawForecast> {
        self.tx.borrow().values().cloned().collect()
    }

    /// Receiver that is notified whenever new forecasts arrive.
    pub fn subscribe(&self) -> watch::Receiver<BTreeMap<Horizon, RawForecast>> {
        self.tx.subscribe()
    }
}

/// Latest observed utilization of the workload.
#[derive(Clone)]
pub struct UtilizationFeed {
    tx: Arc<watch::Sender<Option<UtilizationSample>>>,
}

impl Default for UtilizationFeed {
    fn default() -> Self {
        Self::new()
    }
}

impl UtilizationFeed {
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Replace the latest sample unless it is older than the current one.
    pub fn publish(&self, sample: UtilizationSample) -> Result<(), FeedError> {
        if !sample.utilization.is_finite() || sample.utilization < 0.0 {
            return Err(FeedError::InvalidUtilization(sample.utilization));
        }
        self.tx.send_if_modified(|latest| match latest {
            Some(current) if current.observed_at > sample.observed_at => false,
            _ => {
                *latest = Some(sample);
                true
            }
        });
        Ok(())
    }

    /// Latest sample no older than `max_age_secs` at time `now`.
    pub fn latest_fresh(&self, now: EpochSecs, max_age_secs: u64) -> Option<UtilizationSample> {
        let sample = (*self.tx.borrow())?;
        (now.saturating_sub(sample.observed_at) <= max_age_secs).then_some(sample)
    }

    pub fn latest(&self) -> Option<UtilizationSample> {
        *self.tx.borrow()
    }
}
