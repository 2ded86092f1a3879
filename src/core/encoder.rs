//! JPEG encoder backends
//!
//! The baseline backend uses the `image` crate. Building with the `mozjpeg`
//! feature switches the default to libjpeg-turbo/mozjpeg, which produces
//! smaller files at the same quality setting.

use std::io::Cursor;

use image::RgbImage;

use crate::core::error::ProcessError;

/// Map a 0..1 quality fraction onto the encoder's 1..=100 scale.
pub fn quality_from_fraction(quality: f64) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}

pub trait JpegBackend: Send + Sync {
    fn name(&self) -> &'static str;

    fn encode(&self, img: &RgbImage, quality: u8) -> Result<Vec<u8>, ProcessError>;
}

/// Baseline encoder from the `image` crate
pub struct StandardJpeg;

impl JpegBackend for StandardJpeg {
    fn name(&self) -> &'static str {
        "image-jpeg"
    }

    fn encode(&self, img: &RgbImage, quality: u8) -> Result<Vec<u8>, ProcessError> {
        use image::codecs::jpeg::JpegEncoder;

        let (width, height) = img.dimensions();
        let mut output = Cursor::new(Vec::with_capacity((width * height) as usize / 4));
        {
            let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
            encoder
                .encode_image(img)
                .map_err(|e| ProcessError::Processing(format!("jpeg encode failed: {}", e)))?;
        }

        Ok(output.into_inner())
    }
}

#[cfg(feature = "mozjpeg")]
pub struct MozJpeg;

#[cfg(feature = "mozjpeg")]
impl JpegBackend for MozJpeg {
    fn name(&self) -> &'static str {
        "mozjpeg"
    }

    fn encode(&self, img: &RgbImage, quality: u8) -> Result<Vec<u8>, ProcessError> {
        use mozjpeg::{ColorSpace, Compress};

        let (width, height) = img.dimensions();
        // libjpeg reports fatal errors by unwinding
        std::panic::catch_unwind(|| -> std::io::Result<Vec<u8>> {
            let mut compress = Compress::new(ColorSpace::JCS_RGB);
            compress.set_size(width as usize, height as usize);
            compress.set_quality(quality as f32);
            compress.set_progressive_mode();
            compress.set_optimize_coding(true);

            let mut started = compress.start_compress(Vec::new())?;
            started.write_scanlines(img.as_raw())?;
            started.finish()
        })
        .map_err(|_| ProcessError::Processing("mozjpeg encoder panicked".to_string()))?
        .map_err(|e| ProcessError::Processing(format!("mozjpeg encode failed: {}", e)))
    }
}

/// The best backend this build has.
pub fn default_backend() -> Box<dyn JpegBackend> {
    #[cfg(feature = "mozjpeg")]
    {
        Box::new(MozJpeg)
    }
    #[cfg(not(feature = "mozjpeg"))]
    {
        Box::new(StandardJpeg)
    }
}
