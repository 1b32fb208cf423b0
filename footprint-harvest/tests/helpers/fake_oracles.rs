//! Scripted oracles
//!
//! Each fake answers through a closure and records every request it saw.

use async_trait::async_trait;
use footprint_harvest::error::OracleError;
use footprint_harvest::models::PixelPolygon;
use footprint_harvest::oracle::{
    RefinementOracle, RefinementRequest, RefinementResponse, RefinementStep, SegmentationOracle,
    SegmentationRequest,
};
use std::sync::Mutex;

type RefineFn = dyn Fn(&RefinementRequest, usize) -> Result<RefinementResponse, OracleError> + Send + Sync;
type SegmentFn = dyn Fn(&SegmentationRequest) -> Result<Vec<PixelPolygon>, OracleError> + Send + Sync;

/// Wire response that converges immediately at `(lat, lng)`
pub fn converged_at(lat: f64, lng: f64) -> RefinementResponse {
    RefinementResponse {
        new_lat: Some(lat),
        new_lng: Some(lng),
        done: Some(true),
        final_distance_px: Some(0.0),
        density_score: Some(1.0),
        iterations: None,
        message: None,
    }
}

pub struct ScriptedRefinement {
    handler: Box<RefineFn>,
    requests: Mutex<Vec<RefinementRequest>>,
}

impl ScriptedRefinement {
    /// `handler` gets the request and its zero-based call index
    pub fn new(
        handler: impl Fn(&RefinementRequest, usize) -> Result<RefinementResponse, OracleError>
            + Send
            + Sync
            + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Oracle that moves each target by a fixed offset and converges
    pub fn shifting(offset_lat: f64, offset_lng: f64, origin: impl Fn(&str) -> (f64, f64) + Send + Sync + 'static) -> Self {
        Self::new(move |request, _| {
            let (lat, lng) = match (request.lat, request.lng) {
                (Some(lat), Some(lng)) => (lat, lng),
                _ => origin(&request.id),
            };
            Ok(converged_at(lat + offset_lat, lng + offset_lng))
        })
    }

    pub fn requests(&self) -> Vec<RefinementRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RefinementOracle for ScriptedRefinement {
    async fn refine(&self, request: &RefinementRequest) -> Result<RefinementStep, OracleError> {
        let index = {
            let mut requests = self.requests.lock().unwrap();
            requests.push(request.clone());
            requests.len() - 1
        };
        let wire = (self.handler)(request, index)?;
        RefinementStep::try_from(wire)
    }
}

pub struct ScriptedSegmentation {
    handler: Box<SegmentFn>,
    requests: Mutex<Vec<SegmentationRequest>>,
}

impl ScriptedSegmentation {
    pub fn new(
        handler: impl Fn(&SegmentationRequest) -> Result<Vec<PixelPolygon>, OracleError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            handler: Box::new(handler),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Always returns the same polygons
    pub fn fixed(polygons: Vec<PixelPolygon>) -> Self {
        Self::new(move |_| Ok(polygons.clone()))
    }

    pub fn requests(&self) -> Vec<SegmentationRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl SegmentationOracle for ScriptedSegmentation {
    async fn segment(&self, request: &SegmentationRequest) -> Result<Vec<PixelPolygon>, OracleError> {
        self.requests.lock().unwrap().push(request.clone());
        (self.handler)(request)
    }
}

/// Axis-aligned square polygon centered in a 500 px crop
pub fn square(label: &str, half_side: f64) -> PixelPolygon {
    let (lo, hi) = (250.0 - half_side, 250.0 + half_side);
    PixelPolygon {
        points: vec![(lo, lo), (hi, lo), (hi, hi), (lo, hi)],
        label: label.to_string(),
        color: None,
        kind: Some("building".to_string()),
    }
}
