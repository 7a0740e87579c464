//! In-process control plane with scripted responses.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};

use predscale_core::{ExecutorError, ScaleCommand};

use crate::{ControlPlane, ControlPlaneAck};

/// One scripted reply. Once the script runs out every call succeeds.
#[derive(Debug, Clone)]
pub enum FakeResponse {
    Ok,
    Ack(ControlPlaneAck),
    Fail(ExecutorError),
    /// Never answers; the caller's timeout fires.
    Hang,
}

#[derive(Default)]
struct Inner {
    script: VecDeque<FakeResponse>,
    calls: Vec<ScaleCommand>,
}

/// Records every command it receives. Clones share the same script and log.
#[derive(Clone, Default)]
pub struct FakeControlPlane {
    inner: Arc<Mutex<Inner>>,
}

impl FakeControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scripted(responses: Vec<FakeResponse>) -> Self {
        let fake = Self::new();
        fake.push(responses);
        fake
    }

    /// Queue more replies behind the current script.
    pub fn push(&self, responses: impl IntoIterator<Item = FakeResponse>) {
        self.lock().script.extend(responses);
    }

    /// Every command received so far, oldest first.
    pub fn calls(&self) -> Vec<ScaleCommand> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl ControlPlane for FakeControlPlane {
    async fn apply(
        &self,
        _workload: &str,
        command: &ScaleCommand,
    ) -> Result<ControlPlaneAck, ExecutorError> {
        let response = {
            let mut inner = self.lock();
            inner.calls.push(*command);
            inner.script.pop_front().unwrap_or(FakeResponse::Ok)
        };
        match response {
            FakeResponse::Ok => Ok(ControlPlaneAck::default()),
            FakeResponse::Ack(ack) => Ok(ack),
            FakeResponse::Fail(e) => Err(e),
            FakeResponse::Hang => std::future::pending().await,
        }
    }
}
