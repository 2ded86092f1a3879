use poem_openapi::Object;
use serde::Serialize;

use crate::core::error::ProcessError;

/// `{"error": "..."}` body used by 400 and 405 responses.
#[derive(Object, Serialize, Debug)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }
}

impl From<&ProcessError> for ErrorResponse {
    fn from(err: &ProcessError) -> Self {
        Self::new(err.to_string())
    }
}

#[derive(Object, Serialize, Debug)]
pub struct InternalServerErrorResponse {
    pub error: String,
    pub details: String,
}

impl InternalServerErrorResponse {
    pub fn new(filepath: &str, function: &str, err: &ProcessError) -> Self {
        tracing::error!(
            "error: on {}::{} error: {}",
            filepath,
            function,
            err
        );
        Self {
            error: "Failed to process image".to_string(),
            details: err.details(),
        }
    }
}

#[derive(Object, Serialize, Debug, Clone)]
#[oai(rename_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub struct MetricsBody {
    pub original_size: u64,
    pub new_size: u64,
    /// "N% smaller", "N% larger" or "Same size"
    pub reduction: String,
    /// originalSize - newSize; positive means bytes were saved
    pub reduction_bytes: i64,
}

impl From<&crate::core::metrics::SizeMetrics> for MetricsBody {
    fn from(m: &crate::core::metrics::SizeMetrics) -> Self {
        Self {
            original_size: m.original_size,
            new_size: m.new_size,
            reduction: m.reduction_label.clone(),
            reduction_bytes: m.reduction_bytes,
        }
    }
}
