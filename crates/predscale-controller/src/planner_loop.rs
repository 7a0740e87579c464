//! Planning loop — owns `PlannerState` and drives one tick per interval.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use predscale_core::{
    DecisionRationale, EpochSecs, ExecutionResult, PlannerConfig, PlannerState, ScaleDirection,
    ScalingDecision, ScalingMode, epoch_secs,
};
use predscale_executor::{ControlPlane, ExecutionAdapter};
use predscale_ingest::{ForecastFeed, Ingestor, UtilizationFeed};
use predscale_metrics::PlannerMetrics;
use predscale_planner::{
    FallbackMonitor, ModeUpdate, TickOutcome, decide, hold, reactive_decision, reactive_desired,
    stabilize,
};
use predscale_state::StateStore;

/// Everything one tick produced.
#[derive(Debug, Clone)]
pub struct TickReport {
    pub decision: ScalingDecision,
    pub result: ExecutionResult,
    pub mode_update: ModeUpdate,
    /// Forecast records dropped by the ingestor this tick.
    pub rejected_forecasts: usize,
}

/// The single writer of a workload's `PlannerState`.
pub struct PlannerLoop<C> {
    config: PlannerConfig,
    state: PlannerState,
    ingestor: Ingestor,
    monitor: FallbackMonitor,
    adapter: ExecutionAdapter<C>,
    forecasts: ForecastFeed,
    utilization: UtilizationFeed,
    store: StateStore,
    metrics: Arc<PlannerMetrics>,
}

impl<C: ControlPlane> PlannerLoop<C> {
    /// Resume from the persisted state of the configured workload, or start
    /// fresh at the initial replica count.
    pub fn new(
        config: PlannerConfig,
        store: StateStore,
        forecasts: ForecastFeed,
        utilization: UtilizationFeed,
        metrics: Arc<PlannerMetrics>,
        transport: C,
        now: EpochSecs,
    ) -> anyhow::Result<Self> {
        config.validate().context("invalid planner configuration")?;

        let workload = config.workload.name.clone();
        let state = match store
            .get_planner_state(&workload)
            .context("failed to load planner state")?
        {
            Some(state) => {
                info!(
                    %workload,
                    replicas = state.current_replicas,
                    mode = %state.mode,
                    "resuming planner state"
                );
                state
            }
            None => {
                let replicas = config.initial_replicas();
                info!(%workload, replicas, "no persisted state, starting fresh");
                PlannerState::initial(&workload, replicas)
            }
        };

        let ingestor = Ingestor::from_config(&config.workload.metric, &config.tick);
        let monitor = FallbackMonitor::resume(config.fallback.clone(), &state, now);
        let adapter = ExecutionAdapter::new(transport, &config.executor);
        metrics.record_resumed(&state);

        Ok(Self {
            config,
            state,
            ingestor,
            monitor,
            adapter,
            forecasts,
            utilization,
            store,
            metrics,
        })
    }

    pub fn state(&self) -> &PlannerState {
        &self.state
    }

    pub fn adapter(&self) -> &ExecutionAdapter<C> {
        &self.adapter
    }

    /// Run one planning tick at time `now`.
    pub async fn tick(&mut self, now: EpochSecs) -> TickReport {
        let slo = &self.config.slo;
        let workload = self.state.workload.clone();

        // Inputs are copied once; later publishes only affect the next tick.
        let raws = self.forecasts.snapshot();
        let ingested = self.ingestor.ingest_batch(&raws, now);
        for e in &ingested.rejected {
            warn!(%workload, kind = e.kind(), error = %e, "forecast rejected");
        }
        self.metrics.record_rejected_forecasts(ingested.rejected.len());
        let max_age_secs = self.config.tick.max_forecast_age().as_secs();
        // Stale records are reported once, then leave the feed.
        let pruned = self.forecasts.prune_stale(now, max_age_secs);
        if pruned > 0 {
            debug!(%workload, pruned, "stale forecasts dropped from feed");
        }
        let sample = self.utilization.latest_fresh(now, max_age_secs);

        let planned = decide(&ingested.accepted, slo, &self.config.horizons);
        if let Err(e) = &planned {
            warn!(%workload, mode = %self.state.mode, error = %e, "no predictive candidate");
        }

        let mut agreement = None;
        let decision = match self.state.mode {
            ScalingMode::Predictive | ScalingMode::Degraded => match &planned {
                Ok(candidate) => stabilize(candidate, &self.state, slo, now),
                Err(_) => hold(&self.state, slo, DecisionRationale::ForecastUnavailable, now),
            },
            ScalingMode::Fallback => reactive_decision(sample, &self.state, slo, now),
            ScalingMode::Recovering => {
                if let (Ok(candidate), Some(sample)) = (&planned, sample) {
                    let reactive =
                        reactive_desired(sample.utilization, self.state.current_replicas, slo);
                    let agrees = candidate.target.abs_diff(reactive)
                        <= self.config.fallback.agreement_tolerance;
                    debug!(
                        %workload,
                        predictive = candidate.target,
                        reactive,
                        agrees,
                        "shadow comparison"
                    );
                    agreement = Some(agrees);
                }
                reactive_decision(sample, &self.state, slo, now)
            }
        };
        self.metrics.record_decision(&decision);

        let previous = self.state.current_replicas;
        let result = self.adapter.apply(&decision, previous).await;
        self.metrics.record_execution(&result);
        if result.success {
            let direction = ScaleDirection::between(previous, result.applied_replicas);
            if direction != ScaleDirection::Steady {
                self.state.last_decision_at = Some(now);
                self.state.last_direction = direction;
            }
            self.state.current_replicas = result.applied_replicas;
        }

        let outcome = TickOutcome {
            forecast_ok: planned.is_ok(),
            execution: result.error.map_or(Ok(()), Err),
            agreement,
            at: now,
        };
        let mode_update = self.monitor.observe(&mut self.state, &outcome);
        self.metrics.record_mode(
            mode_update.to,
            mode_update.consecutive_failures,
            mode_update.changed(),
        );
        self.state.updated_at = now;
        self.persist(&decision);

        info!(
            %workload,
            mode = %decision.mode,
            rationale = %decision.rationale,
            from = previous,
            target = decision.target_replicas,
            applied = result.applied_replicas,
            success = result.success,
            next_mode = %mode_update.to,
            "tick complete"
        );

        TickReport {
            decision,
            result,
            mode_update,
            rejected_forecasts: ingested.rejected.len(),
        }
    }

    /// Tick on the configured interval until `shutdown` flips.
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) {
        let period = self.config.tick.tick_interval;
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            workload = %self.state.workload,
            interval_secs = period.as_secs(),
            "planner loop started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let started = Instant::now();
                    self.tick(epoch_secs()).await;
                    self.check_overrun(started.elapsed(), period);
                }
                _ = shutdown.changed() => {
                    info!(workload = %self.state.workload, "planner loop shutting down");
                    break;
                }
            }
        }
    }

    fn check_overrun(&self, elapsed: Duration, period: Duration) {
        if elapsed > period {
            self.metrics.record_overrun();
            warn!(
                workload = %self.state.workload,
                elapsed_ms = elapsed.as_millis() as u64,
                period_ms = period.as_millis() as u64,
                "tick overran its interval, next tick skipped"
            );
        }
    }

    /// Store errors are logged; the in-memory state stays authoritative.
    fn persist(&self, decision: &ScalingDecision) {
        if let Err(e) = self.store.put_planner_state(&self.state) {
            warn!(workload = %self.state.workload, error = %e, "failed to persist planner state");
        }
        if let Err(e) = self.store.append_decision(decision) {
            warn!(workload = %self.state.workload, error = %e, "failed to record decision");
        }
        if let Err(e) = self
            .store
            .prune_decisions(&self.state.workload, self.config.tick.history_limit)
        {
            warn!(workload = %self.state.workload, error = %e, "failed to prune decision history");
        }
    }
}
