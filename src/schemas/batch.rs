use poem_openapi::{ApiResponse, Object, payload::Json};
use serde::{Deserialize, Serialize};

use super::common::{ErrorResponse, MetricsBody};
use super::process::BackgroundColor;
use crate::core::fit::FitPolicy;

#[derive(Object, Deserialize, Clone, Debug)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct BatchImage {
    /// Original file name, used to name the output
    pub name: String,

    /// Base64 image, optionally prefixed with `data:<mime>;base64,`
    pub image: String,

    /// True file size; defaults to the decoded upload length
    pub actual_original_size: Option<u64>,
}

#[derive(Object, Deserialize, Clone, Debug)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub images: Vec<BatchImage>,

    pub width: Option<u32>,

    pub height: Option<u32>,

    pub preset: Option<String>,

    /// JPEG quality as a fraction in (0, 1]
    pub quality: Option<f64>,

    pub background: Option<BackgroundColor>,

    pub fit: Option<FitPolicy>,

    /// Bundle successful outputs into a ZIP archive
    pub archive: Option<bool>,
}

#[derive(Object, Serialize, Debug)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct BatchEntryBody {
    pub name: String,

    /// `{stem}_resized.jpg`
    pub file_name: String,

    pub success: bool,

    #[oai(skip_serializing_if_is_none)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<MetricsBody>,

    #[oai(skip_serializing_if_is_none)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Object, Serialize, Debug)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct BatchTotalsBody {
    pub original_size: u64,
    pub compressed_size: u64,
    pub saved_bytes: i64,
    /// Percent saved across successful images, one decimal
    pub savings_percent: f64,
}

#[derive(Object, Serialize, Debug)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct BatchBody {
    pub success: bool,
    pub results: Vec<BatchEntryBody>,
    pub totals: BatchTotalsBody,
    pub completed: u32,
    pub failed: u32,

    /// `data:application/zip;base64,...`
    #[oai(skip_serializing_if_is_none)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive: Option<String>,

    #[oai(skip_serializing_if_is_none)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub archive_name: Option<String>,
}

#[derive(ApiResponse)]
#[oai(bad_request_handler = "batch_bad_request")]
pub enum BatchResponse {
    #[oai(status = 200)]
    Ok(Json<BatchBody>),

    #[oai(status = 400)]
    BadRequest(Json<ErrorResponse>),
}

fn batch_bad_request(err: poem::Error) -> BatchResponse {
    BatchResponse::BadRequest(Json(ErrorResponse::new(format!(
        "Invalid request body: {}",
        err
    ))))
}
