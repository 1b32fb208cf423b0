//! Polygon segmentation oracle

use super::HttpEndpoint;
use crate::error::OracleError;
use crate::models::{CaptureResult, PixelPolygon};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Segmentation request body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationRequest {
    /// Data URL of the encoded capture
    pub image: String,
    pub lat: f64,
    pub lng: f64,
    pub crop_width: u32,
    pub crop_height: u32,
    pub zoom: f64,
}

impl SegmentationRequest {
    /// Request for a final capture; position and zoom come from the capture
    pub fn from_capture(capture: &CaptureResult) -> Self {
        Self {
            image: capture.image.to_data_url(),
            lat: capture.center.lat,
            lng: capture.center.lng,
            crop_width: capture.crop_size_px,
            crop_height: capture.crop_size_px,
            zoom: capture.zoom,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationResponse {
    #[serde(rename = "poligoni")]
    pub polygons: Option<Vec<PixelPolygon>>,
}

#[async_trait]
pub trait SegmentationOracle: Send + Sync {
    async fn segment(&self, request: &SegmentationRequest) -> Result<Vec<PixelPolygon>, OracleError>;
}

/// HTTP client for the segmentation oracle
#[derive(Debug, Clone)]
pub struct HttpSegmentationClient {
    endpoint: HttpEndpoint,
}

impl HttpSegmentationClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, OracleError> {
        Ok(Self {
            endpoint: HttpEndpoint::new(url, timeout)?,
        })
    }
}

#[async_trait]
impl SegmentationOracle for HttpSegmentationClient {
    async fn segment(&self, request: &SegmentationRequest) -> Result<Vec<PixelPolygon>, OracleError> {
        let response: SegmentationResponse = self.endpoint.post_json(request).await?;
        let polygons = response
            .polygons
            .ok_or_else(|| OracleError::protocol("response has no poligoni field"))?;

        tracing::debug!(polygons = polygons.len(), "Segmentation reply");
        Ok(polygons)
    }
}
