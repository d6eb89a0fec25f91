//! Image preprocessing strategies for OCR.
//!
//! Each strategy is a pure, deterministic `GrayImage -> GrayImage` transform
//! with bounded running time (single pass, no iterative refinement). The
//! catalog is fixed and ordered; order only matters as the tie-break
//! preference when two strategies score equally, with raw passthrough
//! first.

use image::GrayImage;

/// Adaptive threshold window radius in pixels (11x11 neighborhood).
const ADAPTIVE_RADIUS: u32 = 5;

/// Subtracted from the local mean before thresholding. Keeps faint strokes
/// from dissolving into the background on evenly lit pages.
const ADAPTIVE_BIAS: i32 = 2;

/// Unsharp mask blur sigma.
const SHARPEN_SIGMA: f32 = 1.2;

/// Unsharp mask contrast threshold.
const SHARPEN_THRESHOLD: i32 = 3;

/// Percentile clipped from each end of the histogram by contrast stretch.
const STRETCH_CLIP: f64 = 0.02;

/// A named preprocessing strategy applied before recognition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Strategy {
    /// No transformation. Always in the catalog as the safety baseline.
    Raw,
    /// Local-mean binarization tuned for uneven lighting.
    AdaptiveThreshold,
    /// Median denoise followed by an unsharp mask, for low-quality scans.
    DenoiseSharpen,
    /// Percentile histogram expansion, for faded scans.
    ContrastStretch,
}

/// The full fixed catalog, in tie-break order.
pub const FULL_CATALOG: &[Strategy] = &[
    Strategy::Raw,
    Strategy::AdaptiveThreshold,
    Strategy::DenoiseSharpen,
    Strategy::ContrastStretch,
];

/// Catalog reduced to the passthrough baseline.
pub const RAW_ONLY: &[Strategy] = &[Strategy::Raw];

/// Select the active catalog for a run.
pub fn catalog(enable_preprocessing: bool) -> &'static [Strategy] {
    if enable_preprocessing {
        FULL_CATALOG
    } else {
        RAW_ONLY
    }
}

impl Strategy {
    /// Stable name used in diagnostics and results.
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::Raw => "raw",
            Strategy::AdaptiveThreshold => "adaptive-threshold",
            Strategy::DenoiseSharpen => "denoise-sharpen",
            Strategy::ContrastStretch => "contrast-stretch",
        }
    }

    /// Apply the transform. Pure: the input is never modified.
    pub fn apply(&self, image: &GrayImage) -> GrayImage {
        match self {
            Strategy::Raw => image.clone(),
            Strategy::AdaptiveThreshold => {
                adaptive_threshold(image, ADAPTIVE_RADIUS, ADAPTIVE_BIAS)
            }
            Strategy::DenoiseSharpen => {
                let denoised = median3(image);
                image::imageops::unsharpen(&denoised, SHARPEN_SIGMA, SHARPEN_THRESHOLD)
            }
            Strategy::ContrastStretch => contrast_stretch(image, STRETCH_CLIP),
        }
    }
}

impl std::fmt::Display for Strategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Binarize against the local window mean using an integral image, so the
/// cost stays linear in pixel count regardless of window size.
fn adaptive_threshold(img: &GrayImage, radius: u32, bias: i32) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    // integral[y][x] = sum of all pixels above and left of (x, y)
    let iw = (w + 1) as usize;
    let ih = (h + 1) as usize;
    let mut integral = vec![0u64; iw * ih];
    for y in 0..h as usize {
        let mut row_sum = 0u64;
        for x in 0..w as usize {
            row_sum += img.get_pixel(x as u32, y as u32).0[0] as u64;
            integral[(y + 1) * iw + (x + 1)] = integral[y * iw + (x + 1)] + row_sum;
        }
    }

    let mut out = GrayImage::new(w, h);
    let r = radius as i64;
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let x0 = (x - r).max(0) as usize;
            let y0 = (y - r).max(0) as usize;
            let x1 = ((x + r + 1).min(w as i64)) as usize;
            let y1 = ((y + r + 1).min(h as i64)) as usize;

            let area = ((x1 - x0) * (y1 - y0)) as u64;
            let sum = integral[y1 * iw + x1] + integral[y0 * iw + x0]
                - integral[y0 * iw + x1]
                - integral[y1 * iw + x0];
            let mean = (sum / area) as i32;

            let p = img.get_pixel(x as u32, y as u32).0[0] as i32;
            let v = if p < mean - bias { 0u8 } else { 255u8 };
            out.put_pixel(x as u32, y as u32, image::Luma([v]));
        }
    }
    out
}

/// 3x3 median filter with clamped borders.
fn median3(img: &GrayImage) -> GrayImage {
    let (w, h) = img.dimensions();
    if w == 0 || h == 0 {
        return img.clone();
    }

    let mut out = GrayImage::new(w, h);
    let mut window = [0u8; 9];
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let mut n = 0;
            for dy in -1..=1i64 {
                for dx in -1..=1i64 {
                    let nx = (x + dx).clamp(0, w as i64 - 1) as u32;
                    let ny = (y + dy).clamp(0, h as i64 - 1) as u32;
                    window[n] = img.get_pixel(nx, ny).0[0];
                    n += 1;
                }
            }
            window.sort_unstable();
            out.put_pixel(x as u32, y as u32, image::Luma([window[4]]));
        }
    }
    out
}

/// Stretch the histogram so the clipped percentile range maps to [0, 255].
fn contrast_stretch(img: &GrayImage, clip: f64) -> GrayImage {
    let total = (img.width() as u64) * (img.height() as u64);
    if total == 0 {
        return img.clone();
    }

    let mut histogram = [0u64; 256];
    for p in img.pixels() {
        histogram[p.0[0] as usize] += 1;
    }

    let clip_count = (total as f64 * clip) as u64;
    let mut lo = 0usize;
    let mut acc = 0u64;
    for (i, &count) in histogram.iter().enumerate() {
        acc += count;
        if acc > clip_count {
            lo = i;
            break;
        }
    }
    let mut hi = 255usize;
    acc = 0;
    for (i, &count) in histogram.iter().enumerate().rev() {
        acc += count;
        if acc > clip_count {
            hi = i;
            break;
        }
    }

    if hi <= lo {
        return img.clone();
    }

    let range = (hi - lo) as f64;
    let mut lut = [0u8; 256];
    for (i, entry) in lut.iter_mut().enumerate() {
        let v = ((i as f64 - lo as f64) * 255.0 / range).round();
        *entry = v.clamp(0.0, 255.0) as u8;
    }

    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}
