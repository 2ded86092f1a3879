use std::time::Duration;

use thiserror::Error;

const FRIENDLY_FORMAT_MESSAGE: &str =
    "Cannot process this image format. Please try converting to JPEG or PNG first.";

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Missing required fields: image, width, height, quality")]
    MissingFields,

    #[error("Unknown preset: {0}")]
    UnknownPreset(String),

    #[error("No images provided")]
    EmptyBatch,

    #[error("Requested size {width}x{height} is too large")]
    OutputTooLarge { width: u32, height: u32 },

    #[error("Invalid base64 format")]
    InvalidBase64,

    #[error("Image data too small or corrupted")]
    PayloadTooSmall,

    #[error("Unable to read image format. Please try a different image.")]
    UnreadableImage(String),

    #[error("{0}")]
    Processing(String),

    /// Decoding would need more memory than the decoder limits allow.
    #[error("image exceeds decoder limits: {0}")]
    DecoderLimits(String),

    #[error("image processing timed out after {0:?}")]
    Timeout(Duration),

    #[error("processing task failed: {0}")]
    Worker(String),
}

impl ProcessError {
    /// Validation errors are caller mistakes and map to 400.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            ProcessError::MissingFields
                | ProcessError::UnknownPreset(_)
                | ProcessError::EmptyBatch
                | ProcessError::OutputTooLarge { .. }
                | ProcessError::InvalidBase64
                | ProcessError::PayloadTooSmall
                | ProcessError::UnreadableImage(_)
        )
    }

    /// Detail string for a 500 response. Decoder messages about truncated or
    /// unsupported input are swapped for a message a user can act on.
    pub fn details(&self) -> String {
        let message = self.to_string();
        if let ProcessError::Processing(_) = self {
            let lowered = message.to_lowercase();
            let looks_like_format_problem = ["input buffer", "unexpected end", "unsupported", "format"]
                .iter()
                .any(|needle| lowered.contains(needle));
            if looks_like_format_problem {
                return FRIENDLY_FORMAT_MESSAGE.to_string();
            }
        }
        message
    }
}

impl From<image::ImageError> for ProcessError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::Limits(_) => ProcessError::DecoderLimits(err.to_string()),
            _ => ProcessError::Processing(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ProcessError {
    fn from(err: tokio::task::JoinError) -> Self {
        ProcessError::Worker(err.to_string())
    }
}
