//! Image pipeline: header -> (pre-shrink) -> decode -> orient -> fit -> encode -> metrics
//!
//! Everything here is synchronous and CPU bound; callers run it on the
//! blocking pool (see `ResizeEngine`).

use std::io::Cursor;

use image::{DynamicImage, GenericImageView, ImageFormat, ImageReader};

use crate::core::{
    encoder::JpegBackend,
    error::ProcessError,
    fit::{self, FitPolicy},
    job::{PipelineOptions, ResizeJob},
    metrics::SizeMetrics,
    orientation,
    payload::DecodedPayload,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageInfo {
    pub format: ImageFormat,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeMode {
    /// Sniffed format only
    Strict,
    /// Declared MIME used when sniffing fails
    Lenient,
}

/// Quality used when re-encoding a pre-shrunk source.
const PREDOWNSCALE_QUALITY: u8 = 90;

#[derive(Debug, Clone)]
pub struct ProcessedImage {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
    pub metrics: SizeMetrics,
}

fn reader_for<'a>(
    bytes: &'a [u8],
    mime_hint: Option<&str>,
) -> std::io::Result<ImageReader<Cursor<&'a [u8]>>> {
    let mut reader = ImageReader::new(Cursor::new(bytes)).with_guessed_format()?;
    if reader.format().is_none() {
        if let Some(format) = mime_hint.and_then(ImageFormat::from_mime_type) {
            reader.set_format(format);
        }
    }
    Ok(reader)
}

/// Read format and dimensions from the header without decoding pixels.
pub fn read_header(bytes: &[u8], mime_hint: Option<&str>) -> Result<ImageInfo, ProcessError> {
    let reader =
        reader_for(bytes, mime_hint).map_err(|e| ProcessError::UnreadableImage(e.to_string()))?;
    let format = reader
        .format()
        .ok_or_else(|| ProcessError::UnreadableImage("unrecognised image signature".to_string()))?;
    let (width, height) = reader
        .into_dimensions()
        .map_err(|e| ProcessError::UnreadableImage(e.to_string()))?;

    Ok(ImageInfo {
        format,
        width,
        height,
    })
}

/// Decode with the `image` crate's default limits in both modes.
pub fn decode(
    bytes: &[u8],
    mime_hint: Option<&str>,
    mode: DecodeMode,
) -> Result<DynamicImage, ProcessError> {
    let reader = match mode {
        DecodeMode::Strict => ImageReader::new(Cursor::new(bytes)).with_guessed_format(),
        DecodeMode::Lenient => reader_for(bytes, mime_hint),
    }
    .map_err(|e| ProcessError::Processing(e.to_string()))?;

    Ok(reader.decode()?)
}

fn decode_oriented(
    job: &ResizeJob,
    options: &PipelineOptions,
    mode: DecodeMode,
) -> Result<DynamicImage, ProcessError> {
    let bytes = &job.payload.bytes;
    let img = decode(bytes, job.payload.mime.as_deref(), mode)?;
    if options.auto_rotate {
        Ok(orientation::auto_orient(img, bytes))
    } else {
        Ok(img)
    }
}

/// Decode the strict way, retrying once with the lenient decoder. A
/// decoder-limits failure is final.
fn decode_with_retry(
    job: &ResizeJob,
    options: &PipelineOptions,
) -> Result<DynamicImage, ProcessError> {
    match decode_oriented(job, options, DecodeMode::Strict) {
        Ok(img) => Ok(img),
        Err(err @ ProcessError::DecoderLimits(_)) => Err(err),
        Err(strict_err) => {
            tracing::warn!(
                error = %strict_err,
                "Strict decode failed, retrying with lenient decoding"
            );
            decode_oriented(job, options, DecodeMode::Lenient)
        }
    }
}

/// Shrink the source so its longest side is at most `max_dimension` and
/// re-encode it as JPEG. Orientation is applied first because the
/// re-encoded bytes carry no EXIF; transparency is flattened onto the
/// job's background.
pub fn predownscale(
    job: &ResizeJob,
    max_dimension: u32,
    options: &PipelineOptions,
    encoder: &dyn JpegBackend,
) -> Result<ResizeJob, ProcessError> {
    let img = decode_with_retry(job, options)?;
    let (width, height) = img.dimensions();

    let shrunk = fit::apply(
        &img,
        (max_dimension, max_dimension),
        FitPolicy::Inside,
        job.params.background,
    );
    tracing::debug!(
        width,
        height,
        target_w = shrunk.width(),
        target_h = shrunk.height(),
        "Pre-shrinking oversized source"
    );

    Ok(ResizeJob {
        payload: DecodedPayload {
            bytes: encoder.encode(&shrunk, PREDOWNSCALE_QUALITY)?,
            mime: Some("image/jpeg".to_string()),
        },
        params: job.params,
        actual_original_size: job.actual_original_size,
        max_source_dimension: None,
    })
}

fn transform(
    job: &ResizeJob,
    options: &PipelineOptions,
    encoder: &dyn JpegBackend,
) -> Result<(Vec<u8>, u32, u32), ProcessError> {
    let img = decode_with_retry(job, options)?;

    let params = &job.params;
    let fitted = fit::apply(&img, (params.width, params.height), params.fit, params.background);
    let (width, height) = fitted.dimensions();
    let data = encoder.encode(&fitted, params.quality)?;

    Ok((data, width, height))
}

/// Run a validated job end to end.
pub fn run(
    job: &ResizeJob,
    options: &PipelineOptions,
    encoder: &dyn JpegBackend,
) -> Result<ProcessedImage, ProcessError> {
    let info = read_header(&job.payload.bytes, job.payload.mime.as_deref())?;
    tracing::debug!(
        format = ?info.format,
        width = info.width,
        height = info.height,
        target_width = job.params.width,
        target_height = job.params.height,
        fit = ?job.params.fit,
        quality = job.params.quality,
        "Processing image"
    );

    // measured before any pre-shrink replaces the payload
    let original_size = job.original_size(options);

    let shrunk;
    let job = match job.max_source_dimension {
        Some(max) if info.width > max || info.height > max => {
            match predownscale(job, max, options, encoder) {
                Ok(resized) => {
                    shrunk = resized;
                    &shrunk
                }
                Err(err @ ProcessError::DecoderLimits(_)) => return Err(err),
                Err(err) => {
                    tracing::warn!(error = %err, "Pre-shrink failed, using the source as is");
                    job
                }
            }
        }
        _ => job,
    };

    let (data, width, height) = transform(job, options, encoder)?;
    let metrics = SizeMetrics::compute(original_size, data.len() as u64);

    Ok(ProcessedImage {
        data,
        width,
        height,
        metrics,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{
        encoder::StandardJpeg,
        fit::Background,
        job::TargetParams,
        orientation::tag_orientation,
    };
    use image::{Rgb, RgbImage};

    fn sample_jpeg(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x * y) % 256) as u8])
        });
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Jpeg)
            .unwrap();
        buffer.into_inner()
    }

    fn job(bytes: Vec<u8>, fit: FitPolicy) -> ResizeJob {
        ResizeJob {
            payload: DecodedPayload { bytes, mime: None },
            params: TargetParams {
                width: 1080,
                height: 1080,
                quality: 80,
                fit,
                background: Background::WHITE,
            },
            actual_original_size: None,
            max_source_dimension: None,
        }
    }

    fn crc32(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            crc ^= byte as u32;
            for _ in 0..8 {
                let mask = (crc & 1).wrapping_neg();
                crc = (crc >> 1) ^ (0xEDB8_8320 & mask);
            }
        }
        !crc
    }

    fn png_chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let mut body = kind.to_vec();
        body.extend_from_slice(data);
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc32(&body).to_be_bytes());
    }

    /// A PNG whose header declares `width`x`height` RGBA but carries no pixels.
    fn png_header_only(width: u32, height: u32) -> Vec<u8> {
        let mut out = b"\x89PNG\r\n\x1a\n".to_vec();
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&width.to_be_bytes());
        ihdr.extend_from_slice(&height.to_be_bytes());
        ihdr.extend_from_slice(&[8, 6, 0, 0, 0]);
        png_chunk(&mut out, b"IHDR", &ihdr);
        png_chunk(&mut out, b"IDAT", &[0x78, 0x9C, 0x03, 0x00, 0x00, 0x00, 0x00, 0x01]);
        png_chunk(&mut out, b"IEND", &[]);
        out
    }

    #[test]
    fn test_read_header() {
        let info = read_header(&sample_jpeg(64, 32), None).unwrap();
        assert_eq!(info.format, ImageFormat::Jpeg);
        assert_eq!((info.width, info.height), (64, 32));
    }

    #[test]
    fn test_header_rejects_garbage() {
        let err = read_header(&[0x42u8; 150], None).unwrap_err();
        assert!(matches!(err, ProcessError::UnreadableImage(_)));
        assert!(err.is_validation());
    }

    #[test]
    fn test_contain_scenario() {
        let input = sample_jpeg(1600, 1200);
        let input_len = input.len() as u64;
        let out = run(&job(input, FitPolicy::Contain), &PipelineOptions::default(), &StandardJpeg)
            .unwrap();

        assert_eq!((out.width, out.height), (1080, 1080));
        assert_eq!(out.metrics.original_size, input_len);
        assert_eq!(out.metrics.new_size, out.data.len() as u64);

        let decoded = image::load_from_memory(&out.data).unwrap();
        assert_eq!(decoded.dimensions(), (1080, 1080));
        // letterbox band at the top is white
        let top = decoded.to_rgb8().get_pixel(540, 5).0;
        assert!(top.iter().all(|c| *c > 245));
    }

    #[test]
    fn test_inside_scenario() {
        let out = run(
            &job(sample_jpeg(1600, 1200), FitPolicy::Inside),
            &PipelineOptions::default(),
            &StandardJpeg,
        )
        .unwrap();
        assert_eq!((out.width, out.height), (1080, 810));
    }

    #[test]
    fn test_same_input_same_output_size() {
        let input = sample_jpeg(400, 300);
        let options = PipelineOptions::default();
        let first = run(&job(input.clone(), FitPolicy::Contain), &options, &StandardJpeg).unwrap();
        let second = run(&job(input, FitPolicy::Contain), &options, &StandardJpeg).unwrap();
        assert_eq!(first.data.len(), second.data.len());
    }

    #[test]
    fn test_png_with_alpha_is_flattened() {
        let img = image::RgbaImage::from_pixel(50, 50, image::Rgba([0, 0, 0, 0]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgba8(img)
            .write_to(&mut buffer, ImageFormat::Png)
            .unwrap();

        let mut j = job(buffer.into_inner(), FitPolicy::Inside);
        j.params.background = Background { r: 0, g: 0, b: 255 };
        let out = run(&j, &PipelineOptions::default(), &StandardJpeg).unwrap();

        let decoded = image::load_from_memory(&out.data).unwrap().to_rgb8();
        let px = decoded.get_pixel(25, 25).0;
        assert!(px[2] > 200 && px[0] < 50);
    }

    #[test]
    fn test_lenient_retry_uses_declared_mime() {
        // TGA has no signature, so only the data-URI MIME identifies it
        let img = RgbImage::from_fn(32, 32, |x, y| Rgb([(x * 8) as u8, (y * 8) as u8, 90]));
        let mut buffer = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img)
            .write_to(&mut buffer, ImageFormat::Tga)
            .unwrap();
        let bytes = buffer.into_inner();

        assert!(decode(&bytes, Some("image/x-tga"), DecodeMode::Strict).is_err());

        let mut j = job(bytes.clone(), FitPolicy::Inside);
        j.payload.mime = Some("image/x-tga".to_string());
        let out = run(&j, &PipelineOptions::default(), &StandardJpeg).unwrap();
        assert_eq!((out.width, out.height), (32, 32));

        // without the hint the bytes are unreadable
        let err = run(&job(bytes, FitPolicy::Inside), &PipelineOptions::default(), &StandardJpeg)
            .unwrap_err();
        assert!(matches!(err, ProcessError::UnreadableImage(_)));
    }

    #[test]
    fn test_decoder_limits_are_not_retried() {
        let bytes = png_header_only(20_000, 20_000);
        let info = read_header(&bytes, None).unwrap();
        assert_eq!((info.width, info.height), (20_000, 20_000));

        let err = run(&job(bytes, FitPolicy::Contain), &PipelineOptions::default(), &StandardJpeg)
            .unwrap_err();
        assert!(matches!(err, ProcessError::DecoderLimits(_)), "got {:?}", err);
        assert!(!err.is_validation());
    }

    #[test]
    fn test_exif_orientation_applied() {
        let bytes = tag_orientation(&sample_jpeg(600, 200), 6);
        let out = run(&job(bytes, FitPolicy::Inside), &PipelineOptions::default(), &StandardJpeg)
            .unwrap();
        assert_eq!((out.width, out.height), (200, 600));

        let bytes = tag_orientation(&sample_jpeg(600, 200), 6);
        let no_rotate = PipelineOptions {
            auto_rotate: false,
            ..Default::default()
        };
        let out = run(&job(bytes, FitPolicy::Inside), &no_rotate, &StandardJpeg).unwrap();
        assert_eq!((out.width, out.height), (600, 200));
    }

    #[test]
    fn test_predownscale_caps_longest_side() {
        let j = job(sample_jpeg(3000, 1500), FitPolicy::Contain);
        let shrunk = predownscale(&j, 2048, &PipelineOptions::default(), &StandardJpeg).unwrap();
        assert_eq!(shrunk.payload.mime.as_deref(), Some("image/jpeg"));
        let img = image::load_from_memory(&shrunk.payload.bytes).unwrap();
        assert_eq!(img.dimensions(), (2048, 1024));

        let j = job(sample_jpeg(1000, 2500), FitPolicy::Contain);
        let shrunk = predownscale(&j, 2048, &PipelineOptions::default(), &StandardJpeg).unwrap();
        let img = image::load_from_memory(&shrunk.payload.bytes).unwrap();
        assert_eq!(img.dimensions(), (819, 2048));
    }

    #[test]
    fn test_preshrink_keeps_exif_rotation() {
        let bytes = tag_orientation(&sample_jpeg(3000, 1000), 6);
        let original_len = bytes.len() as u64;
        let mut j = job(bytes, FitPolicy::Inside);
        j.params.width = 300;
        j.params.height = 300;
        j.max_source_dimension = Some(2048);

        let out = run(&j, &PipelineOptions::default(), &StandardJpeg).unwrap();
        assert_eq!((out.width, out.height), (100, 300));
        // metrics still measure the upload, not the shrunk copy
        assert_eq!(out.metrics.original_size, original_len);
    }

    #[test]
    fn test_small_sources_skip_preshrink() {
        let mut j = job(sample_jpeg(400, 300), FitPolicy::Inside);
        j.max_source_dimension = Some(2048);
        let out = run(&j, &PipelineOptions::default(), &StandardJpeg).unwrap();
        assert_eq!((out.width, out.height), (400, 300));
    }

    #[test]
    fn test_truncated_jpeg_is_not_a_validation_error() {
        let mut input = sample_jpeg(300, 300);
        input.truncate(input.len() / 3);
        match run(&job(input, FitPolicy::Contain), &PipelineOptions::default(), &StandardJpeg) {
            Ok(out) => assert!(!out.data.is_empty()),
            Err(err) => assert!(!err.is_validation()),
        }
    }
}
