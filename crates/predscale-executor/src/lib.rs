//! predscale-executor — applies scaling decisions to the control plane.
//!
//! The adapter is the only place the planner touches live infrastructure.
//! Every tick hands it exactly one decision; it either confirms the command
//! or reports a classified failure, never both.
//!
//! # Architecture
//!
//! ```text
//! ExecutionAdapter<C: ControlPlane>
//!   ├── idempotency: same command as last success → no call
//!   ├── per-call timeout (tokio::time::timeout)
//!   ├── retry with exponential backoff, bounded by the tick budget
//!   └── C::apply(workload, command)
//!         ├── HttpControlPlane  — JSON POST over hyper
//!         └── FakeControlPlane  — scripted responses for tests
//! ```
//!
//! Rejections (4xx other than 408/429) are final and are not retried.

pub mod adapter;
pub mod client;
pub mod fake;

use std::future::Future;

use serde::{Deserialize, Serialize};

use predscale_core::{ExecutorError, ScaleCommand};

pub use adapter::ExecutionAdapter;
pub use client::{EndpointError, HttpControlPlane};
pub use fake::{FakeControlPlane, FakeResponse};

/// Confirmation returned by the control plane.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlPlaneAck {
    /// Replica count the control plane reports in force, if it says.
    #[serde(default)]
    pub applied_replicas: Option<u32>,
}

/// A system that can apply scale commands to a workload.
pub trait ControlPlane: Send + Sync {
    fn apply(
        &self,
        workload: &str,
        command: &ScaleCommand,
    ) -> impl Future<Output = Result<ControlPlaneAck, ExecutorError>> + Send;
}
