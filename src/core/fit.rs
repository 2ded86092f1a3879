//! Fit policies: how a source image is placed into the requested box.

use image::{DynamicImage, GenericImageView, RgbImage, Rgba, RgbaImage, imageops, imageops::FilterType};
use poem_openapi::Enum;
use serde::Deserialize;

#[derive(Enum, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[oai(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum FitPolicy {
    /// Shrink to fit inside the box; output is the scaled size.
    Inside,
    /// Shrink to fit inside the box; output is exactly the box, letterboxed.
    #[default]
    Contain,
    /// Shrink to cover the box; output is exactly the box, overflow cropped.
    Cover,
}

/// Solid fill used for letterboxing and for flattening transparency.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Background {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Default for Background {
    fn default() -> Self {
        Self::WHITE
    }
}

impl Background {
    pub const WHITE: Background = Background {
        r: 255,
        g: 255,
        b: 255,
    };

    /// Build from untrusted channel values, clamping each into 0..=255.
    pub fn clamped(r: i64, g: i64, b: i64) -> Self {
        let clamp = |v: i64| v.clamp(0, 255) as u8;
        Self {
            r: clamp(r),
            g: clamp(g),
            b: clamp(b),
        }
    }

    fn rgba(self) -> Rgba<u8> {
        Rgba([self.r, self.g, self.b, 255])
    }
}

/// Where the scaled image lands on the output canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub canvas: (u32, u32),
    pub scaled: (u32, u32),
    /// Top-left of the scaled image; negative when `Cover` crops.
    pub offset: (i64, i64),
}

pub fn plan(source: (u32, u32), target: (u32, u32), fit: FitPolicy) -> Placement {
    let (sw, sh) = (source.0.max(1) as f64, source.1.max(1) as f64);
    let (tw, th) = (target.0 as f64, target.1 as f64);

    let scale = match fit {
        FitPolicy::Inside | FitPolicy::Contain => (tw / sw).min(th / sh),
        FitPolicy::Cover => (tw / sw).max(th / sh),
    }
    .min(1.0);

    let scaled = (
        ((sw * scale).round() as u32).max(1),
        ((sh * scale).round() as u32).max(1),
    );

    match fit {
        FitPolicy::Inside => Placement {
            canvas: scaled,
            scaled,
            offset: (0, 0),
        },
        FitPolicy::Contain | FitPolicy::Cover => Placement {
            canvas: target,
            scaled,
            offset: (
                (target.0 as i64 - scaled.0 as i64) / 2,
                (target.1 as i64 - scaled.1 as i64) / 2,
            ),
        },
    }
}

/// Resize `img` per `fit` and flatten it onto `background`.
pub fn apply(
    img: &DynamicImage,
    target: (u32, u32),
    fit: FitPolicy,
    background: Background,
) -> RgbImage {
    let placement = plan(img.dimensions(), target, fit);

    let scaled = if placement.scaled == img.dimensions() {
        img.to_rgba8()
    } else {
        img.resize_exact(placement.scaled.0, placement.scaled.1, FilterType::Lanczos3)
            .to_rgba8()
    };

    let mut canvas = RgbaImage::from_pixel(placement.canvas.0, placement.canvas.1, background.rgba());
    imageops::overlay(&mut canvas, &scaled, placement.offset.0, placement.offset.1);

    DynamicImage::ImageRgba8(canvas).to_rgb8()
}
