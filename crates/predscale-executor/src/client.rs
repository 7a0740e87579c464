//! HTTP control plane.
//!
//! POSTs `{"workload": ..., "command": {...}}` as JSON to a fixed endpoint.
//! 2xx is success (an optional JSON body may report `applied_replicas`),
//! 408/429/5xx and connection errors are transient, any other 4xx is a
//! rejection.

use bytes::Bytes;
use http::header::{CONTENT_TYPE, HOST, USER_AGENT};
use http::{Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::rt::TokioIo;
use serde::Serialize;
use thiserror::Error;
use tracing::debug;

use predscale_core::{ExecutorError, ScaleCommand};

use crate::{ControlPlane, ControlPlaneAck};

#[derive(Debug, Error)]
pub enum EndpointError {
    #[error("invalid control plane endpoint {endpoint:?}: {reason}")]
    Invalid { endpoint: String, reason: String },
}

#[derive(Serialize)]
struct ScaleRequest<'a> {
    workload: &'a str,
    command: &'a ScaleCommand,
}

/// Control plane reached over plain HTTP/1.1.
#[derive(Debug, Clone)]
pub struct HttpControlPlane {
    /// `host:port` to connect to.
    authority: String,
    /// Origin-form request target.
    path: String,
}

impl HttpControlPlane {
    /// Parse an `http://host:port/path` endpoint.
    pub fn new(endpoint: &str) -> Result<Self, EndpointError> {
        let invalid = |reason: &str| EndpointError::Invalid {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        };
        let uri: Uri = endpoint
            .parse()
            .map_err(|e: http::uri::InvalidUri| invalid(&e.to_string()))?;
        if uri.scheme_str() != Some("http") {
            return Err(invalid("only http:// endpoints are supported"));
        }
        let authority = uri.authority().ok_or_else(|| invalid("missing host"))?;
        let port = authority.port_u16().unwrap_or(80);
        let path = uri
            .path_and_query()
            .map(|p| p.as_str().to_string())
            .unwrap_or_else(|| "/".to_string());
        Ok(Self {
            authority: format!("{}:{port}", authority.host()),
            path,
        })
    }

    pub fn authority(&self) -> &str {
        &self.authority
    }
}

impl ControlPlane for HttpControlPlane {
    async fn apply(
        &self,
        workload: &str,
        command: &ScaleCommand,
    ) -> Result<ControlPlaneAck, ExecutorError> {
        let body = serde_json::to_vec(&ScaleRequest { workload, command })
            .map_err(|e| ExecutorError::Rejected(format!("encode command: {e}")))?;

        let stream = tokio::net::TcpStream::connect(&self.authority)
            .await
            .map_err(|e| transient("connect", e))?;
        let io = TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| transient("handshake", e))?;

        // Drive the connection in the background.
        let authority = self.authority.clone();
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, %authority, "control plane connection closed");
            }
        });

        let req = http::Request::builder()
            .method(Method::POST)
            .uri(self.path.as_str())
            .header(HOST, self.authority.as_str())
            .header(CONTENT_TYPE, "application/json")
            .header(USER_AGENT, "predscale/0.1")
            .body(Full::new(Bytes::from(body)))
            .map_err(|e| ExecutorError::Rejected(format!("build request: {e}")))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| transient("request", e))?;
        let status = resp.status();
        let bytes = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| transient("read body", e))?
            .to_bytes();

        debug!(%status, workload, target = command.target_replicas, "control plane replied");
        classify(status, &bytes)
    }
}

fn transient(stage: &str, e: impl std::fmt::Display) -> ExecutorError {
    ExecutorError::Transient(format!("{stage}: {e}"))
}

fn classify(status: StatusCode, body: &[u8]) -> Result<ControlPlaneAck, ExecutorError> {
    if status.is_success() {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(ControlPlaneAck::default());
        }
        return Ok(serde_json::from_slice(body).unwrap_or_else(|e| {
            debug!(error = %e, "unrecognised acknowledgement body");
            ControlPlaneAck::default()
        }));
    }

    let detail = format!("{status}: {}", String::from_utf8_lossy(body).trim());
    match status {
        StatusCode::REQUEST_TIMEOUT | StatusCode::TOO_MANY_REQUESTS => {
            Err(ExecutorError::Transient(detail))
        }
        s if s.is_client_error() => Err(ExecutorError::Rejected(detail)),
        _ => Err(ExecutorError::Transient(detail)),
    }
}
