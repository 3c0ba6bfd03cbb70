//! Cheap early-reject gate for uploads that are clearly not radiographs.
//!
//! A chest X-ray stored as a color image still has R == G == B at nearly
//! every pixel, so the average per-pixel spread across the three channels
//! stays small. Colour photographs do not. This is an accept/reject
//! heuristic only: any grayscale picture passes.

use image::RgbImage;

use super::upload::{Pixels, UploadedImage};

/// Mean cross-channel standard deviation, on the 0-255 scale, below which
/// an upload is accepted.
pub const GRAYSCALE_SPREAD_THRESHOLD: f64 = 15.0;

/// Average over all pixels of the population standard deviation of each
/// pixel's R, G and B values. An image with no pixels has zero spread.
pub fn mean_channel_spread(image: &RgbImage) -> f64 {
    let pixel_count = u64::from(image.width()) * u64::from(image.height());
    if pixel_count == 0 {
        return 0.0;
    }

    let total: f64 = image
        .pixels()
        .map(|pixel| {
            let [r, g, b] = pixel.0.map(f64::from);
            let mean = (r + g + b) / 3.0;
            let variance = ((r - mean).powi(2) + (g - mean).powi(2) + (b - mean).powi(2)) / 3.0;
            variance.sqrt()
        })
        .sum();

    total / pixel_count as f64
}

/// Single-channel uploads are always accepted. Alpha is dropped and palette
/// images are expanded to RGB on decode, so RGBA, LumaA and indexed PNGs are
/// judged on their gray or RGB values alone.
pub fn is_likely_xray(image: &UploadedImage) -> bool {
    match image.pixels() {
        Pixels::Gray(_) => true,
        Pixels::Color(rgb) => {
            let spread = mean_channel_spread(rgb);
            log::debug!(
                "Mean cross-channel spread {:.3} (threshold {})",
                spread,
                GRAYSCALE_SPREAD_THRESHOLD
            );
            spread < GRAYSCALE_SPREAD_THRESHOLD
        }
    }
}
