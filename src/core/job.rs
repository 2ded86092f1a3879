//! Request validation: turns loosely-typed request bodies into jobs the
//! pipeline can run.

use crate::core::{
    encoder::quality_from_fraction,
    error::ProcessError,
    fit::{Background, FitPolicy},
    payload::{DecodedPayload, decode_image_payload},
    registry,
};
use crate::schemas::process::{BackgroundColor, ImageRequest};

/// Largest side a baseline JPEG can carry.
pub const JPEG_MAX_DIMENSION: u32 = 65535;
pub const DEFAULT_MAX_OUTPUT_DIMENSION: u32 = 8192;
pub const DEFAULT_MAX_OUTPUT_PIXELS: u64 = 40_000_000;

/// Server-side pipeline switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineOptions {
    /// Used when a request does not name a fit policy.
    pub fit: FitPolicy,
    pub auto_rotate: bool,
    /// Honour the caller's `actualOriginalSize` in metrics.
    pub use_actual_size: bool,
    /// Largest accepted box side, never above `JPEG_MAX_DIMENSION`.
    pub max_output_dimension: u32,
    /// Largest accepted box area in pixels.
    pub max_output_pixels: u64,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            fit: FitPolicy::Contain,
            auto_rotate: true,
            use_actual_size: true,
            max_output_dimension: DEFAULT_MAX_OUTPUT_DIMENSION,
            max_output_pixels: DEFAULT_MAX_OUTPUT_PIXELS,
        }
    }
}

/// Output parameters shared by every image of a request.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetParams {
    pub width: u32,
    pub height: u32,
    /// Encoder quality, 1..=100
    pub quality: u8,
    pub fit: FitPolicy,
    pub background: Background,
}

impl TargetParams {
    /// Zero and empty values count as missing, like absent ones.
    pub fn resolve(
        width: Option<u32>,
        height: Option<u32>,
        preset: Option<&str>,
        quality: Option<f64>,
        fit: Option<FitPolicy>,
        background: Option<&BackgroundColor>,
        options: &PipelineOptions,
    ) -> Result<Self, ProcessError> {
        let (width, height) = match (width.filter(|w| *w > 0), height.filter(|h| *h > 0)) {
            (Some(w), Some(h)) => (w, h),
            (w, h) => match preset.filter(|p| !p.is_empty()) {
                Some(name) => {
                    let preset = registry::lookup(name)
                        .ok_or_else(|| ProcessError::UnknownPreset(name.to_string()))?;
                    (w.unwrap_or(preset.width), h.unwrap_or(preset.height))
                }
                None => return Err(ProcessError::MissingFields),
            },
        };

        let quality = quality
            .filter(|q| q.is_finite() && *q != 0.0)
            .ok_or(ProcessError::MissingFields)?;

        // contain and cover allocate the whole box
        let max_side = options.max_output_dimension.min(JPEG_MAX_DIMENSION);
        if width > max_side
            || height > max_side
            || width as u64 * height as u64 > options.max_output_pixels
        {
            return Err(ProcessError::OutputTooLarge { width, height });
        }

        Ok(Self {
            width,
            height,
            quality: quality_from_fraction(quality),
            fit: fit.unwrap_or(options.fit),
            background: background_from(background),
        })
    }
}

pub fn background_from(color: Option<&BackgroundColor>) -> Background {
    match color {
        Some(c) => Background::clamped(
            c.r.unwrap_or(255),
            c.g.unwrap_or(255),
            c.b.unwrap_or(255),
        ),
        None => Background::default(),
    }
}

/// A fully validated resize request.
#[derive(Debug, Clone)]
pub struct ResizeJob {
    pub payload: DecodedPayload,
    pub params: TargetParams,
    pub actual_original_size: Option<u64>,
    /// Sources longer than this on either side are shrunk before fitting.
    pub max_source_dimension: Option<u32>,
}

impl ResizeJob {
    pub fn from_request(
        request: ImageRequest,
        options: &PipelineOptions,
    ) -> Result<Self, ProcessError> {
        let image = request
            .image
            .filter(|s| !s.is_empty())
            .ok_or(ProcessError::MissingFields)?;

        let params = TargetParams::resolve(
            request.width,
            request.height,
            request.preset.as_deref(),
            request.quality,
            request.fit,
            request.background.as_ref(),
            options,
        )?;

        let payload = decode_image_payload(&image)?;

        Ok(Self {
            payload,
            params,
            actual_original_size: request.actual_original_size,
            max_source_dimension: None,
        })
    }

    /// Size the metrics are measured against.
    pub fn original_size(&self, options: &PipelineOptions) -> u64 {
        let reported = self
            .actual_original_size
            .filter(|size| options.use_actual_size && *size > 0);
        reported.unwrap_or(self.payload.bytes.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{Engine as _, engine::general_purpose};

    fn request() -> ImageRequest {
        ImageRequest {
            image: Some(general_purpose::STANDARD.encode(vec![1u8; 200])),
            width: Some(1080),
            height: Some(1080),
            quality: Some(0.8),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request() {
        let job = ResizeJob::from_request(request(), &PipelineOptions::default()).unwrap();
        assert_eq!(job.params.width, 1080);
        assert_eq!(job.params.quality, 80);
        assert_eq!(job.params.fit, FitPolicy::Contain);
        assert_eq!(job.params.background, Background::WHITE);
        assert_eq!(job.payload.bytes.len(), 200);
    }

    #[test]
    fn test_missing_fields() {
        let mut req = request();
        req.height = None;
        assert!(matches!(
            ResizeJob::from_request(req, &PipelineOptions::default()),
            Err(ProcessError::MissingFields)
        ));

        let mut req = request();
        req.quality = Some(0.0);
        assert!(matches!(
            ResizeJob::from_request(req, &PipelineOptions::default()),
            Err(ProcessError::MissingFields)
        ));

        let mut req = request();
        req.image = Some(String::new());
        assert!(matches!(
            ResizeJob::from_request(req, &PipelineOptions::default()),
            Err(ProcessError::MissingFields)
        ));
    }

    #[test]
    fn test_missing_fields_checked_before_base64() {
        let mut req = request();
        req.image = Some("***".to_string());
        req.width = None;
        assert!(matches!(
            ResizeJob::from_request(req, &PipelineOptions::default()),
            Err(ProcessError::MissingFields)
        ));
    }

    #[test]
    fn test_preset_fills_box() {
        let mut req = request();
        req.width = None;
        req.height = None;
        req.preset = Some("twitter".to_string());
        let job = ResizeJob::from_request(req, &PipelineOptions::default()).unwrap();
        assert_eq!((job.params.width, job.params.height), (1200, 675));

        let mut req = request();
        req.width = None;
        req.preset = Some("nope".to_string());
        assert!(matches!(
            ResizeJob::from_request(req, &PipelineOptions::default()),
            Err(ProcessError::UnknownPreset(_))
        ));
    }

    #[test]
    fn test_background_clamped() {
        let mut req = request();
        req.background = Some(BackgroundColor {
            r: Some(10),
            g: Some(20),
            b: Some(300),
        });
        let job = ResizeJob::from_request(req, &PipelineOptions::default()).unwrap();
        assert_eq!(job.params.background, Background { r: 10, g: 20, b: 255 });
    }

    #[test]
    fn test_original_size_override() {
        let mut req = request();
        req.actual_original_size = Some(5_000_000);
        let job = ResizeJob::from_request(req, &PipelineOptions::default()).unwrap();
        assert_eq!(job.original_size(&PipelineOptions::default()), 5_000_000);

        let ignore = PipelineOptions {
            use_actual_size: false,
            ..Default::default()
        };
        assert_eq!(job.original_size(&ignore), 200);

        let mut req = request();
        req.actual_original_size = Some(0);
        let job = ResizeJob::from_request(req, &PipelineOptions::default()).unwrap();
        assert_eq!(job.original_size(&PipelineOptions::default()), 200);
    }

    #[test]
    fn test_oversized_box_rejected() {
        let mut req = request();
        req.width = Some(60000);
        req.height = Some(60000);
        assert!(matches!(
            ResizeJob::from_request(req, &PipelineOptions::default()),
            Err(ProcessError::OutputTooLarge {
                width: 60000,
                height: 60000
            })
        ));

        // each side fits, the area does not
        let mut req = request();
        req.width = Some(8000);
        req.height = Some(8000);
        assert!(matches!(
            ResizeJob::from_request(req, &PipelineOptions::default()),
            Err(ProcessError::OutputTooLarge { .. })
        ));

        // JPEG's own ceiling wins over a larger configured side
        let wide_open = PipelineOptions {
            max_output_dimension: 100_000,
            max_output_pixels: u64::MAX,
            ..Default::default()
        };
        let mut req = request();
        req.width = Some(70000);
        req.height = Some(10);
        assert!(matches!(
            ResizeJob::from_request(req, &wide_open),
            Err(ProcessError::OutputTooLarge { .. })
        ));

        let mut req = request();
        req.width = Some(8192);
        req.height = Some(4000);
        assert!(ResizeJob::from_request(req, &PipelineOptions::default()).is_ok());
    }

    #[test]
    fn test_request_fit_overrides_default() {
        let mut req = request();
        req.fit = Some(FitPolicy::Inside);
        let job = ResizeJob::from_request(req, &PipelineOptions::default()).unwrap();
        assert_eq!(job.params.fit, FitPolicy::Inside);
    }
}
