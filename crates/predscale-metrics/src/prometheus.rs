//! Prometheus text exposition format.
//!
//! Renders a planner metrics snapshot for scraping by a Prometheus server
//! or compatible agent. Every sample carries a `workload` label.

use predscale_core::ScalingMode;

use crate::collector::MetricsSnapshot;

/// Render one workload's snapshot into Prometheus text format.
pub fn render_prometheus(workload: &str, s: &MetricsSnapshot) -> String {
    let mut out = String::new();
    let w = escape_label(workload);

    out.push_str("# HELP predscale_decisions_total Scaling decisions produced, by rationale.\n");
    out.push_str("# TYPE predscale_decisions_total counter\n");
    for (rationale, count) in &s.decisions_by_rationale {
        out.push_str(&format!(
            "predscale_decisions_total{{workload=\"{w}\",rationale=\"{rationale}\"}} {count}\n"
        ));
    }

    out.push_str(
        "# HELP predscale_mode Planner mode (0=predictive, 1=degraded, 2=fallback, 3=recovering).\n",
    );
    out.push_str("# TYPE predscale_mode gauge\n");
    out.push_str(&format!(
        "predscale_mode{{workload=\"{w}\"}} {}\n",
        s.mode.gauge_value()
    ));

    out.push_str("# HELP predscale_mode_active Whether the planner is in the labelled mode.\n");
    out.push_str("# TYPE predscale_mode_active gauge\n");
    for mode in ScalingMode::ALL {
        out.push_str(&format!(
            "predscale_mode_active{{workload=\"{w}\",mode=\"{mode}\"}} {}\n",
            u8::from(mode == s.mode)
        ));
    }

    out.push_str("# HELP predscale_consecutive_failures Current failure streak.\n");
    out.push_str("# TYPE predscale_consecutive_failures gauge\n");
    out.push_str(&format!(
        "predscale_consecutive_failures{{workload=\"{w}\"}} {}\n",
        s.consecutive_failures
    ));

    out.push_str("# HELP predscale_target_replicas Replica target of the last decision.\n");
    out.push_str("# TYPE predscale_target_replicas gauge\n");
    out.push_str(&format!(
        "predscale_target_replicas{{workload=\"{w}\"}} {}\n",
        s.last_target_replicas
    ));

    out.push_str("# HELP predscale_last_applied_replicas Replica count in force after the last execution.\n");
    out.push_str("# TYPE predscale_last_applied_replicas gauge\n");
    out.push_str(&format!(
        "predscale_last_applied_replicas{{workload=\"{w}\"}} {}\n",
        s.last_applied_replicas
    ));

    out.push_str("# HELP predscale_executions_total Decisions handed to the execution adapter.\n");
    out.push_str("# TYPE predscale_executions_total counter\n");
    out.push_str(&format!(
        "predscale_executions_total{{workload=\"{w}\"}} {}\n",
        s.executions_total
    ));

    out.push_str("# HELP predscale_execution_failures_total Failed executions, by error kind.\n");
    out.push_str("# TYPE predscale_execution_failures_total counter\n");
    for (kind, count) in &s.execution_failures {
        out.push_str(&format!(
            "predscale_execution_failures_total{{workload=\"{w}\",kind=\"{kind}\"}} {count}\n"
        ));
    }

    out.push_str("# HELP predscale_execution_latency_ms Latency of the last execution in milliseconds.\n");
    out.push_str("# TYPE predscale_execution_latency_ms gauge\n");
    out.push_str(&format!(
        "predscale_execution_latency_ms{{workload=\"{w}\"}} {}\n",
        s.last_execution_latency_ms
    ));

    out.push_str("# HELP predscale_forecasts_rejected_total Forecast records dropped as invalid or stale.\n");
    out.push_str("# TYPE predscale_forecasts_rejected_total counter\n");
    out.push_str(&format!(
        "predscale_forecasts_rejected_total{{workload=\"{w}\"}} {}\n",
        s.forecasts_rejected_total
    ));

    out.push_str("# HELP predscale_mode_transitions_total Planner mode changes.\n");
    out.push_str("# TYPE predscale_mode_transitions_total counter\n");
    out.push_str(&format!(
        "predscale_mode_transitions_total{{workload=\"{w}\"}} {}\n",
        s.mode_transitions_total
    ));

    out.push_str("# HELP predscale_tick_overruns_total Ticks skipped because the previous tick ran late.\n");
    out.push_str("# TYPE predscale_tick_overruns_total counter\n");
    out.push_str(&format!(
        "predscale_tick_overruns_total{{workload=\"{w}\"}} {}\n",
        s.tick_overruns_total
    ));

    out.push_str("# HELP predscale_last_tick_timestamp_seconds Unix time of the last decision.\n");
    out.push_str("# TYPE predscale_last_tick_timestamp_seconds gauge\n");
    out.push_str(&format!(
        "predscale_last_tick_timestamp_seconds{{workload=\"{w}\"}} {}\n",
        s.last_tick_at
    ));

    out
}

fn escape_label(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collector::PlannerMetrics;
    use predscale_core::{
        DecisionRationale, ExecutionResult, ExecutorErrorKind, Ramp, ResourceProfile,
        ScalingDecision,
    };

    fn test_snapshot() -> MetricsSnapshot {
        let m = PlannerMetrics::new(ScalingMode::Predictive, 3);
        m.record_decision(&ScalingDecision {
            workload: "default/api".to_string(),
            target_replicas: 5,
            resources: ResourceProfile::default(),
            ramp: Ramp::Gradual,
            rationale: DecisionRationale::RateLimited,
            mode: ScalingMode::Predictive,
            decided_at: 1_700_000_000,
        });
        m.record_execution(&ExecutionResult {
            success: false,
            applied_replicas: 3,
            error: Some(ExecutorErrorKind::Timeout),
            latency_ms: 10_000,
            attempts: 4,
            changed: false,
        });
        m.record_mode(ScalingMode::Degraded, 1, true);
        m.snapshot()
    }

    #[test]
    fn render_single_workload() {
        let output = render_prometheus("default/api", &test_snapshot());

        assert!(output.contains(
            "predscale_decisions_total{workload=\"default/api\",rationale=\"rate_limited\"} 1"
        ));
        assert!(output.contains("predscale_mode{workload=\"default/api\"} 1"));
        assert!(output.contains("predscale_mode_active{workload=\"default/api\",mode=\"degraded\"} 1"));
        assert!(output.contains("predscale_mode_active{workload=\"default/api\",mode=\"predictive\"} 0"));
        assert!(output.contains("predscale_consecutive_failures{workload=\"default/api\"} 1"));
        assert!(output.contains("predscale_target_replicas{workload=\"default/api\"} 5"));
        assert!(output.contains("predscale_last_applied_replicas{workload=\"default/api\"} 3"));
        assert!(output.contains(
            "predscale_execution_failures_total{workload=\"default/api\",kind=\"timeout\"} 1"
        ));
        assert!(output.contains("predscale_mode_transitions_total{workload=\"default/api\"} 1"));
    }

    #[test]
    fn render_fresh_metrics() {
        let output = render_prometheus("w", &PlannerMetrics::default().snapshot());
        assert!(output.contains("# TYPE predscale_decisions_total counter"));
        assert!(output.contains("predscale_tick_overruns_total{workload=\"w\"} 0"));
    }

    #[test]
    fn escapes_label_values() {
        let output = render_prometheus("we\"ird", &PlannerMetrics::default().snapshot());
        assert!(output.contains("workload=\"we\\\"ird\""));
    }

    #[test]
    fn render_format_is_prometheus_compatible() {
        let output = render_prometheus("test", &test_snapshot());

        // Every non-empty, non-comment line should match: metric_name{labels} value
        for line in output.lines() {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            assert!(
                line.contains('{') && line.contains('}'),
                "line should have labels: {line}"
            );
            let value = line.rsplit(' ').next().unwrap();
            assert!(value.parse::<f64>().is_ok(), "bad value in {line}");
        }
    }
}
