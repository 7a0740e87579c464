//! Execution adapter — idempotent apply with bounded retries.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, info, warn};

use predscale_core::{
    ExecutionResult, ExecutorConfig, ExecutorError, RetryPolicy, ScaleCommand, ScalingDecision,
};

use crate::ControlPlane;

/// Sends decisions to a control plane, retrying transient failures within a
/// fixed time budget.
pub struct ExecutionAdapter<C> {
    transport: C,
    policy: RetryPolicy,
    call_timeout: Duration,
    budget: Duration,
    /// Command the control plane confirmed in full on the last call.
    last_applied: Option<ScaleCommand>,
}

impl<C: ControlPlane> ExecutionAdapter<C> {
    pub fn new(transport: C, config: &ExecutorConfig) -> Self {
        Self {
            transport,
            policy: config.retry.clone(),
            call_timeout: config.call_timeout,
            budget: config.retry_budget,
            last_applied: None,
        }
    }

    pub fn transport(&self) -> &C {
        &self.transport
    }

    pub fn last_applied(&self) -> Option<ScaleCommand> {
        self.last_applied
    }

    /// Apply one decision. `previous_replicas` is reported back as the
    /// replica count in force if the decision cannot be applied.
    pub async fn apply(
        &mut self,
        decision: &ScalingDecision,
        previous_replicas: u32,
    ) -> ExecutionResult {
        let command = decision.command();
        let started = Instant::now();

        if let Some(last) = &self.last_applied
            && last.same_target(&command)
        {
            debug!(
                workload = %decision.workload,
                target = command.target_replicas,
                "command already applied, skipping call"
            );
            return ExecutionResult {
                success: true,
                applied_replicas: command.target_replicas,
                error: None,
                latency_ms: 0,
                attempts: 0,
                changed: false,
            };
        }

        let deadline = started + self.budget;
        let mut attempts = 0u32;
        let failure = loop {
            attempts += 1;
            let per_call = self
                .call_timeout
                .min(deadline.saturating_duration_since(Instant::now()));
            let outcome = match tokio::time::timeout(
                per_call,
                self.transport.apply(&decision.workload, &command),
            )
            .await
            {
                Ok(outcome) => outcome,
                Err(_) => Err(ExecutorError::Timeout(per_call)),
            };

            let error = match outcome {
                Ok(ack) => {
                    let applied = ack.applied_replicas.unwrap_or(command.target_replicas);
                    let latency_ms = started.elapsed().as_millis() as u64;
                    // A partial ack leaves the target unconfirmed; resend next tick.
                    self.last_applied = (applied == command.target_replicas).then_some(command);
                    info!(
                        workload = %decision.workload,
                        from = previous_replicas,
                        to = applied,
                        attempts,
                        latency_ms,
                        "scale command applied"
                    );
                    return ExecutionResult {
                        success: true,
                        applied_replicas: applied,
                        error: None,
                        latency_ms,
                        attempts,
                        changed: true,
                    };
                }
                Err(e) => e,
            };

            let kind = error.kind();
            if !kind.is_retryable() || attempts >= self.policy.max_attempts {
                break error;
            }
            let delay = self.policy.delay_for(attempts);
            if Instant::now() + delay >= deadline {
                debug!(workload = %decision.workload, attempts, "retry budget exhausted");
                break error;
            }
            warn!(
                workload = %decision.workload,
                error = %error,
                attempt = attempts,
                retry_in_ms = delay.as_millis() as u64,
                "scale command failed, retrying"
            );
            tokio::time::sleep(delay).await;
        };

        // Unknown outcome on the control plane side: resend next time.
        self.last_applied = None;
        let latency_ms = started.elapsed().as_millis() as u64;
        warn!(
            workload = %decision.workload,
            error = %failure,
            kind = %failure.kind(),
            attempts,
            latency_ms,
            "scale command failed"
        );
        ExecutionResult {
            success: false,
            applied_replicas: previous_replicas,
            error: Some(failure.kind()),
            latency_ms,
            attempts,
            changed: false,
        }
    }
}
