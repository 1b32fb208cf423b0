//! Remote oracle clients
//!
//! Two request/reply services drive the pipeline: the refinement oracle
//! nudges a target's coordinate toward the visual center of the capture, and
//! the segmentation oracle returns pixel polygons for a capture.
//!
//! Every call runs under a watchdog. A hung request is dropped and becomes
//! [`OracleError::Timeout`]; nothing is retried here.

pub mod refinement;
pub mod segmentation;

pub use refinement::{
    HttpRefinementClient, RefinementOracle, RefinementRequest, RefinementResponse, RefinementStep,
    StepVerdict, CONVERGENCE_DISTANCE_PX,
};
pub use segmentation::{
    HttpSegmentationClient, SegmentationOracle, SegmentationRequest, SegmentationResponse,
};

use crate::error::OracleError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

const USER_AGENT: &str = concat!("footprint-harvest/", env!("CARGO_PKG_VERSION"));

/// Default per-call watchdog
pub const DEFAULT_ORACLE_TIMEOUT: Duration = Duration::from_secs(60);

/// Run `call`, converting an overrun of `limit` into a timeout error
///
/// Dropping the future on expiry cancels the in-flight request.
pub async fn with_watchdog<T, F>(limit: Duration, call: F) -> Result<T, OracleError>
where
    F: Future<Output = Result<T, OracleError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(OracleError::Timeout(limit)),
    }
}

/// One JSON-over-HTTP oracle endpoint
#[derive(Debug, Clone)]
pub struct HttpEndpoint {
    http_client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpEndpoint {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        // The watchdog owns the deadline; the client itself never times out first
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        Ok(Self {
            http_client,
            url: url.into(),
            timeout,
        })
    }

    /// POST `body` as JSON and decode the reply under the watchdog
    pub async fn post_json<Req, Resp>(&self, body: &Req) -> Result<Resp, OracleError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        with_watchdog(self.timeout, self.post_json_unguarded(body)).await
    }

    async fn post_json_unguarded<Req, Resp>(&self, body: &Req) -> Result<Resp, OracleError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let response = self
            .http_client
            .post(self.url.as_str())
            .json(body)
            .send()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        let status = response.status();
        let bytes = response
            .bytes()
            .await
            .map_err(|e| OracleError::Transport(e.to_string()))?;

        debug!(url = %self.url, status = status.as_u16(), bytes = bytes.len(), "Oracle replied");

        if !status.is_success() {
            return Err(OracleError::Protocol {
                status: Some(status.as_u16()),
                detail: error_detail(&bytes).unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            });
        }

        serde_json::from_slice(&bytes).map_err(|e| OracleError::Protocol {
            status: Some(status.as_u16()),
            detail: format!("malformed response body: {}", e),
        })
    }
}

/// `detail` field of an error body, if it has one
fn error_detail(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    match value.get("detail")? {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Null => None,
        other => Some(other.to_string()),
    }
}
