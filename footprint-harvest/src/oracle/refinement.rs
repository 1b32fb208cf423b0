//! Coordinate refinement oracle

use super::HttpEndpoint;
use crate::error::OracleError;
use async_trait::async_trait;
use footprint_common::LatLng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Distance under which a step counts as converged when `done` is absent
pub const CONVERGENCE_DISTANCE_PX: f64 = 20.0;

/// Refinement request body
///
/// `lat`/`lng` are left out of the body on the first step of a loop; the
/// oracle resolves the starting point from `id` itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefinementRequest {
    pub id: String,
    pub zoom: f64,
    pub crop_size: u32,
    /// Data URL of the encoded capture
    pub image: String,
    pub bearing: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lat: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lng: Option<f64>,
}

/// Refinement response as sent on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefinementResponse {
    pub new_lat: Option<f64>,
    pub new_lng: Option<f64>,
    pub done: Option<bool>,
    pub final_distance_px: Option<f64>,
    pub density_score: Option<f64>,
    pub iterations: Option<u32>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepVerdict {
    Converged,
    Continue,
}

impl StepVerdict {
    /// `done` wins when present; otherwise converged iff the reported
    /// distance is finite and under [`CONVERGENCE_DISTANCE_PX`]
    pub fn from_wire(done: Option<bool>, final_distance_px: Option<f64>) -> Self {
        let converged = match done {
            Some(done) => done,
            None => final_distance_px
                .map(|d| d.is_finite() && d < CONVERGENCE_DISTANCE_PX)
                .unwrap_or(false),
        };
        if converged {
            StepVerdict::Converged
        } else {
            StepVerdict::Continue
        }
    }
}

/// Normalized refinement result
#[derive(Debug, Clone, PartialEq)]
pub struct RefinementStep {
    pub position: LatLng,
    pub verdict: StepVerdict,
    pub final_distance_px: Option<f64>,
    pub density_score: Option<f64>,
    /// Oracle-side iteration count, informational
    pub iterations: Option<u32>,
    pub message: Option<String>,
}

impl RefinementStep {
    pub fn is_converged(&self) -> bool {
        self.verdict == StepVerdict::Converged
    }
}

impl TryFrom<RefinementResponse> for RefinementStep {
    type Error = OracleError;

    fn try_from(wire: RefinementResponse) -> Result<Self, Self::Error> {
        let (lat, lng) = match (wire.new_lat, wire.new_lng) {
            (Some(lat), Some(lng)) if lat.is_finite() && lng.is_finite() => (lat, lng),
            _ => {
                return Err(OracleError::protocol(
                    "response is missing a finite new_lat/new_lng pair",
                ))
            }
        };

        Ok(Self {
            position: LatLng::new(lat, lng),
            verdict: StepVerdict::from_wire(wire.done, wire.final_distance_px),
            final_distance_px: wire.final_distance_px,
            density_score: wire.density_score,
            iterations: wire.iterations,
            message: wire.message,
        })
    }
}

#[async_trait]
pub trait RefinementOracle: Send + Sync {
    async fn refine(&self, request: &RefinementRequest) -> Result<RefinementStep, OracleError>;
}

/// HTTP client for the refinement oracle
#[derive(Debug, Clone)]
pub struct HttpRefinementClient {
    endpoint: HttpEndpoint,
}

impl HttpRefinementClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(url, timeout)?,
        })
    }
}

#[async_trait]
impl RefinementOracle for HttpRefinementClient {
    async fn refine(&self, request: &RefinementRequest) -> Result<RefinementStep, OracleError> {
        tracing::debug!(
            target_id = %request.id,
            with_position = request.lat.is_some(),
            "Refinement request"
        );
        let wire: RefinementResponse = self.endpoint.post_json(request).await?;
        RefinementStep::try_from(wire)
    }
}
