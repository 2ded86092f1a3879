use poem_openapi::{ApiResponse, Object, payload::Json};
use serde::{Deserialize, Serialize};

use super::common::{ErrorResponse, InternalServerErrorResponse, MetricsBody};
use crate::core::fit::FitPolicy;

#[derive(Object, Deserialize, Clone, Debug, Default)]
pub struct BackgroundColor {
    /// Red channel, clamped to 0-255
    pub r: Option<i64>,
    /// Green channel, clamped to 0-255
    pub g: Option<i64>,
    /// Blue channel, clamped to 0-255
    pub b: Option<i64>,
}

#[derive(Object, Deserialize, Clone, Debug, Default)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct ImageRequest {
    /// Base64 image, optionally prefixed with `data:<mime>;base64,`
    pub image: Option<String>,

    /// Target box width in pixels
    pub width: Option<u32>,

    /// Target box height in pixels
    pub height: Option<u32>,

    /// JPEG quality as a fraction in (0, 1]
    pub quality: Option<f64>,

    /// True size of the file before any client-side shrinking
    pub actual_original_size: Option<u64>,

    /// Letterbox / transparency fill. Default: white
    pub background: Option<BackgroundColor>,

    /// Fit policy. Default comes from server configuration
    pub fit: Option<FitPolicy>,

    /// Named size preset used when width/height are absent
    pub preset: Option<String>,
}

#[derive(Object, Serialize, Debug)]
pub struct ProcessImageBody {
    pub success: bool,

    /// `data:image/jpeg;base64,...`
    pub image: String,

    pub metrics: MetricsBody,

    /// Output width in pixels
    pub width: u32,

    /// Output height in pixels
    pub height: u32,
}

#[derive(ApiResponse)]
#[oai(bad_request_handler = "process_bad_request")]
pub enum ProcessImageResponse {
    #[oai(status = 200)]
    Ok(Json<ProcessImageBody>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),

    #[oai(status = 500)]
    InternalServerError(Json<InternalServerErrorResponse>),
}

fn process_bad_request(err: poem::Error) -> ProcessImageResponse {
    ProcessImageResponse::BadRequest(Json(ErrorResponse::new(format!(
        "Invalid request body: {}",
        err
    ))))
}

#[derive(Object, Serialize, Debug)]
pub struct PresetBody {
    pub name: String,
    pub label: String,
    pub width: u32,
    pub height: u32,
}

#[derive(Object, Serialize, Debug)]
pub struct SlotStatus {
    pub available: u32,
    pub capacity: u32,
    pub utilization_pct: f64,
}

#[derive(Object, Serialize, Debug)]
pub struct HealthBody {
    pub status: String,
    pub encoder: String,
    pub processing_slots: SlotStatus,
}
