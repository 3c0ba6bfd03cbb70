//! Conversion of uploads into the classifier's input tensor.
//!
//! The classifier takes a single NHWC batch of `1 x 299 x 299 x 3` f32
//! values in `[0, 1]`. Every upload is resampled to that size regardless
//! of aspect ratio (no cropping or padding) with Catmull-Rom bicubic
//! interpolation, which is deterministic and clamps results to the u8
//! range before scaling.

use image::imageops::{self, FilterType};
use ndarray::Array4;

use super::upload::UploadedImage;

pub const INPUT_SIZE: u32 = 299;
pub const INPUT_CHANNELS: usize = 3;
pub const RESIZE_FILTER: FilterType = FilterType::CatmullRom;

#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedTensor(Array4<f32>);

impl NormalizedTensor {
    pub fn as_array(&self) -> &Array4<f32> {
        &self.0
    }

    pub fn shape(&self) -> [usize; 4] {
        let dims = self.0.dim();
        [dims.0, dims.1, dims.2, dims.3]
    }
}

pub fn normalize(image: &UploadedImage) -> NormalizedTensor {
    let side = INPUT_SIZE as usize;
    let shape = (1, side, side, INPUT_CHANNELS);

    let rgb = image.to_rgb();
    if rgb.width() == 0 || rgb.height() == 0 {
        return NormalizedTensor(Array4::zeros(shape));
    }

    let resized = imageops::resize(&rgb, INPUT_SIZE, INPUT_SIZE, RESIZE_FILTER);
    let tensor = Array4::from_shape_fn(shape, |(_, y, x, c)| {
        f32::from(resized.get_pixel(x as u32, y as u32)[c]) / 255.0
    });
    NormalizedTensor(tensor)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, GrayImage, Luma, Rgb, RgbImage};

    fn color(width: u32, height: u32, pixel: [u8; 3]) -> UploadedImage {
        UploadedImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            width,
            height,
            Rgb(pixel),
        )))
    }

    fn assert_in_range(tensor: &NormalizedTensor) {
        assert!(
            tensor
                .as_array()
                .iter()
                .all(|v| (0.0..=1.0).contains(v))
        );
    }

    #[test]
    fn test_shape_is_fixed_for_any_input_size() {
        for (w, h) in [(1, 1), (10, 300), (640, 480), (299, 299), (1024, 17)] {
            let tensor = normalize(&color(w, h, [12, 200, 99]));
            assert_eq!(tensor.shape(), [1, 299, 299, 3], "input {w}x{h}");
            assert_in_range(&tensor);
        }
    }

    #[test]
    fn test_grayscale_is_replicated_across_channels() {
        let gray = GrayImage::from_pixel(50, 80, Luma([51]));
        let tensor = normalize(&UploadedImage::from_dynamic(DynamicImage::ImageLuma8(gray)));
        assert_eq!(tensor.shape(), [1, 299, 299, 3]);
        let expected = 51.0 / 255.0;
        assert!(
            tensor
                .as_array()
                .iter()
                .all(|v| (v - expected).abs() < 1e-6)
        );
    }

    #[test]
    fn test_values_are_scaled_by_255() {
        let tensor = normalize(&color(7, 7, [255, 0, 102]));
        let arr = tensor.as_array();
        assert!((arr[[0, 150, 150, 0]] - 1.0).abs() < 1e-6);
        assert!(arr[[0, 150, 150, 1]].abs() < 1e-6);
        assert!((arr[[0, 150, 150, 2]] - 0.4).abs() < 1e-6);
    }

    #[test]
    fn test_high_contrast_edges_stay_in_range() {
        let checker = RgbImage::from_fn(37, 53, |x, y| {
            if (x + y) % 2 == 0 {
                Rgb([255, 255, 255])
            } else {
                Rgb([0, 0, 0])
            }
        });
        let tensor = normalize(&UploadedImage::from_dynamic(DynamicImage::ImageRgb8(checker)));
        assert_in_range(&tensor);
    }

    #[test]
    fn test_is_deterministic() {
        let gradient = RgbImage::from_fn(120, 90, |x, y| Rgb([x as u8, y as u8, (x + y) as u8]));
        let image = UploadedImage::from_dynamic(DynamicImage::ImageRgb8(gradient));
        assert_eq!(normalize(&image), normalize(&image));
    }

    #[test]
    fn test_empty_image_yields_zero_tensor() {
        let tensor = normalize(&color(0, 0, [0, 0, 0]));
        assert_eq!(tensor.shape(), [1, 299, 299, 3]);
        assert!(tensor.as_array().iter().all(|v| *v == 0.0));
    }
}
