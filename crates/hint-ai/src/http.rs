//! HTTP hint service client.
//!
//! Wire format (JSON, camelCase):
//! - `POST /api/detect-barbell` `{ image, width, height }` →
//!   `{ found, boundingBox?: { x, y, width, height }, confidence?, description? }`
//! - `POST /api/detect-calibration` `{ image, width, height }` →
//!   `{ found, pixelsPerMm?, confidence?, referenceObjects?, method?, description? }`
//! - `GET /api/ai-status` → 2xx when the service is usable
//!
//! Coordinates in responses refer to the uploaded (possibly downscaled)
//! image and are mapped back to the original frame here.

use std::time::Duration;

use async_trait::async_trait;
use barpath_common::config::HintServiceConfig;
use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::{CalibrationHint, Region, RegionHint, RgbaFrame};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::encode::{encode_frame, EncodedFrame};
use crate::provider::HintProvider;

#[derive(Debug, Serialize)]
struct DetectRequest<'a> {
    image: &'a str,
    width: u32,
    height: u32,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct BarbellResponse {
    found: bool,
    bounding_box: Option<BoundingBox>,
    confidence: Option<f64>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct BoundingBox {
    x: f64,
    y: f64,
    width: f64,
    height: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct CalibrationResponse {
    found: bool,
    pixels_per_mm: Option<f64>,
    confidence: Option<f64>,
    reference_objects: Vec<ReferenceObject>,
    method: Option<String>,
    description: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ReferenceObject {
    #[serde(rename = "type")]
    kind: String,
    /// Physical size in millimeters.
    real_world_size: f64,
    detected_pixel_size: f64,
    confidence: f64,
}

/// Hint provider backed by the remote detection service.
pub struct HttpHintProvider {
    http: Client,
    base_url: String,
    max_dimension: u32,
}

impl HttpHintProvider {
    /// Build a client from the hint service settings. Fails when no
    /// endpoint is configured.
    pub fn new(config: &HintServiceConfig) -> BarpathResult<Self> {
        let endpoint = config
            .endpoint
            .as_deref()
            .filter(|e| !e.trim().is_empty())
            .ok_or_else(|| BarpathError::config("hint service endpoint is not set"))?;

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs.max(1)))
            .build()
            .map_err(|e| BarpathError::hint(format!("Failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: endpoint.trim_end_matches('/').to_string(),
            max_dimension: config.max_dimension,
        })
    }

    async fn post<T: DeserializeOwned>(&self, route: &str, frame: &EncodedFrame) -> BarpathResult<T> {
        let url = format!("{}{}", self.base_url, route);
        tracing::debug!(%url, width = frame.width, height = frame.height, "Requesting hint");

        let response = self
            .http
            .post(&url)
            .json(&DetectRequest {
                image: &frame.image,
                width: frame.width,
                height: frame.height,
            })
            .send()
            .await
            .map_err(|e| BarpathError::hint(format!("Request to {url} failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(BarpathError::hint(format!(
                "Hint service returned {status}: {}",
                body.trim()
            )));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| BarpathError::hint(format!("Malformed hint response: {e}")))
    }
}

#[async_trait]
impl HintProvider for HttpHintProvider {
    async fn detect_region(&self, frame: &RgbaFrame) -> BarpathResult<Option<RegionHint>> {
        let encoded = encode_frame(frame, self.max_dimension)?;
        let response: BarbellResponse = self.post("/api/detect-barbell", &encoded).await?;
        let hint = region_from_response(response, &encoded, frame.width(), frame.height());
        match &hint {
            Some(h) => tracing::info!(
                x = h.region.x,
                y = h.region.y,
                width = h.region.width,
                height = h.region.height,
                confidence = h.confidence,
                "Region hint received"
            ),
            None => tracing::info!("Hint service found no barbell"),
        }
        Ok(hint)
    }

    async fn detect_calibration(
        &self,
        frame: &RgbaFrame,
    ) -> BarpathResult<Option<CalibrationHint>> {
        let encoded = encode_frame(frame, self.max_dimension)?;
        let response: CalibrationResponse = self.post("/api/detect-calibration", &encoded).await?;
        let hint = calibration_from_response(response, &encoded);
        if let Some(h) = &hint {
            tracing::info!(
                pixels_per_mm = ?h.pixels_per_mm,
                confidence = h.confidence,
                "Calibration hint received"
            );
        }
        Ok(hint)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/ai-status", self.base_url);
        match self.http.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::warn!(error = %e, "Hint service unreachable");
                false
            }
        }
    }

    fn name(&self) -> &str {
        "http"
    }
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}

fn region_from_response(
    response: BarbellResponse,
    encoded: &EncodedFrame,
    frame_width: u32,
    frame_height: u32,
) -> Option<RegionHint> {
    if !response.found {
        return None;
    }
    let bbox = response.bounding_box?;
    let region = Region::new(
        finite_or_zero(bbox.x),
        finite_or_zero(bbox.y),
        finite_or_zero(bbox.width),
        finite_or_zero(bbox.height),
    )
    .clamp_to(encoded.width, encoded.height)
    .scale(1.0 / encoded.scale)
    .clamp_to(frame_width, frame_height);

    if region.is_empty() {
        return None;
    }
    if let Some(description) = &response.description {
        tracing::debug!(%description, "Region hint description");
    }
    Some(RegionHint::new(region, response.confidence.unwrap_or(0.0)))
}

fn calibration_from_response(
    response: CalibrationResponse,
    encoded: &EncodedFrame,
) -> Option<CalibrationHint> {
    if !response.found {
        return None;
    }
    let confidence = response.confidence.unwrap_or(0.0);

    // Scales measured on the downscaled upload shrink with it.
    let direct = response
        .pixels_per_mm
        .filter(|s| s.is_finite() && *s > 0.0)
        .map(|s| s / encoded.scale);
    let from_reference = || {
        response
            .reference_objects
            .iter()
            .filter(|r| r.detected_pixel_size > 0.0 && r.real_world_size > 0.0)
            .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
            .map(|r| {
                tracing::debug!(kind = %r.kind, "Calibration from reference object");
                r.detected_pixel_size / encoded.scale / r.real_world_size
            })
            .filter(|s| s.is_finite())
    };
    let pixels_per_mm = direct.or_else(from_reference)?;

    let mut hint = CalibrationHint::from_scale(pixels_per_mm, confidence);
    hint.description = match (response.method, response.description) {
        (Some(m), Some(d)) => Some(format!("{m}: {d}")),
        (m, d) => d.or(m),
    };
    Some(hint)
}
