use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, Luma};
use serde::{Deserialize, Serialize};

use crate::config::OcrConfig;

/// A pixel rectangle on a screenshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Intersection with a `width`×`height` image, or `None` if nothing is left.
    pub fn clamp_to(&self, width: u32, height: u32) -> Option<Region> {
        if self.x >= width || self.y >= height {
            return None;
        }
        let w = self.width.min(width - self.x);
        let h = self.height.min(height - self.y);
        (w > 0 && h > 0).then_some(Region::new(self.x, self.y, w, h))
    }
}

/// Constants of the preprocessing pipeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PreprocessSettings {
    pub contrast: f32,
    pub blur_sigma: f32,
    pub min_dimension: u32,
}

impl Default for PreprocessSettings {
    fn default() -> Self {
        Self {
            contrast: 2.0,
            blur_sigma: 0.5,
            min_dimension: 100,
        }
    }
}

impl From<&OcrConfig> for PreprocessSettings {
    fn from(cfg: &OcrConfig) -> Self {
        Self {
            contrast: cfg.contrast,
            blur_sigma: cfg.blur_sigma,
            min_dimension: cfg.min_dimension,
        }
    }
}

/// Crop (when a region is given) and run the full pipeline:
/// luminance, contrast, blur, then upscale of small crops.
pub fn prepare(img: &DynamicImage, region: Option<Region>, settings: &PreprocessSettings) -> Option<GrayImage> {
    let source = match region {
        Some(region) => {
            let r = region.clamp_to(img.width(), img.height())?;
            img.crop_imm(r.x, r.y, r.width, r.height)
        }
        None => img.clone(),
    };
    if source.width() == 0 || source.height() == 0 {
        return None;
    }

    let gray = source.to_luma8();
    let contrasted = enhance_contrast(&gray, settings.contrast);
    let smoothed = if settings.blur_sigma > 0.0 {
        imageops::blur(&contrasted, settings.blur_sigma)
    } else {
        contrasted
    };
    Some(upscale_small(smoothed, settings.min_dimension))
}

/// Scale every pixel's distance from the mean luminance by `factor`.
pub fn enhance_contrast(img: &GrayImage, factor: f32) -> GrayImage {
    let count = u64::from(img.width()) * u64::from(img.height());
    if count == 0 {
        return img.clone();
    }
    let sum: u64 = img.pixels().map(|p| u64::from(p.0[0])).sum();
    let mean = (sum as f64 / count as f64 + 0.5).floor() as f32;

    let mut out = img.clone();
    for pixel in out.pixels_mut() {
        let v = mean + factor * (f32::from(pixel.0[0]) - mean);
        *pixel = Luma([v.round().clamp(0.0, 255.0) as u8]);
    }
    out
}

/// Upscale so both sides reach `min_dimension`, preserving aspect ratio.
pub fn upscale_small(img: GrayImage, min_dimension: u32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 || (w >= min_dimension && h >= min_dimension) {
        return img;
    }
    let scale = (min_dimension as f64 / w as f64).max(min_dimension as f64 / h as f64);
    let new_w = ((w as f64 * scale) as u32).max(1);
    let new_h = ((h as f64 * scale) as u32).max(1);
    imageops::resize(&img, new_w, new_h, FilterType::Lanczos3)
}
