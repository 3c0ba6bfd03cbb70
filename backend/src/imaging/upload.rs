use std::path::Path;

use image::{DynamicImage, GrayImage, ImageBuffer, ImageFormat, Rgb, RgbImage};

pub const ACCEPTED_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];
pub const ACCEPTED_MIME_TYPES: [&str; 2] = ["image/jpeg", "image/png"];

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("No image data received")]
    Empty,
    #[error("Upload of {size} bytes exceeds the {limit} byte limit")]
    TooLarge { size: usize, limit: usize },
    #[error("Unsupported file format: {0}. Accepted formats: JPG, JPEG, PNG")]
    UnsupportedFormat(String),
    #[error("Failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

/// What the client claimed about an uploaded file.
#[derive(Debug, Clone, Default)]
pub struct DeclaredType {
    pub file_name: Option<String>,
    pub content_type: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Pixels {
    Gray(GrayImage),
    Color(RgbImage),
}

/// A decoded upload, reduced to one or three 8-bit color channels.
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pixels: Pixels,
}

impl UploadedImage {
    /// Drops alpha and narrows deeper samples to 8 bits. Images without
    /// color information stay single-channel.
    pub fn from_dynamic(image: DynamicImage) -> Self {
        let pixels = if image.color().has_color() {
            Pixels::Color(image.to_rgb8())
        } else {
            Pixels::Gray(image.to_luma8())
        };
        Self { pixels }
    }

    pub fn decode(
        bytes: &[u8],
        declared: &DeclaredType,
        max_bytes: usize,
    ) -> Result<Self, UploadError> {
        if bytes.is_empty() {
            return Err(UploadError::Empty);
        }
        if bytes.len() > max_bytes {
            return Err(UploadError::TooLarge {
                size: bytes.len(),
                limit: max_bytes,
            });
        }

        check_declared_type(declared)?;
        let format = sniff_format(bytes)?;
        let image = image::load_from_memory_with_format(bytes, format)?;
        log::debug!(
            "Decoded {:?} upload: {}x{} {:?}",
            format,
            image.width(),
            image.height(),
            image.color()
        );
        Ok(Self::from_dynamic(image))
    }

    pub fn pixels(&self) -> &Pixels {
        &self.pixels
    }

    pub fn width(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.width(),
            Pixels::Color(img) => img.width(),
        }
    }

    pub fn height(&self) -> u32 {
        match &self.pixels {
            Pixels::Gray(img) => img.height(),
            Pixels::Color(img) => img.height(),
        }
    }

    pub fn channels(&self) -> u8 {
        match &self.pixels {
            Pixels::Gray(_) => 1,
            Pixels::Color(_) => 3,
        }
    }

    /// Three-channel view; grayscale values are replicated into R, G and B.
    pub fn to_rgb(&self) -> RgbImage {
        match &self.pixels {
            Pixels::Color(img) => img.clone(),
            Pixels::Gray(img) => ImageBuffer::from_fn(img.width(), img.height(), |x, y| {
                let v = img.get_pixel(x, y)[0];
                Rgb([v, v, v])
            }),
        }
    }
}

/// Rejects uploads whose file name or content type names anything other
/// than JPEG or PNG. An upload that declares neither is left to sniffing.
fn check_declared_type(declared: &DeclaredType) -> Result<(), UploadError> {
    let extension = declared
        .file_name
        .as_deref()
        .and_then(|name| Path::new(name).extension())
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase());

    if let Some(ext) = extension {
        if !ACCEPTED_EXTENSIONS.contains(&ext.as_str()) {
            return Err(UploadError::UnsupportedFormat(format!(".{ext}")));
        }
    }

    if let Some(content_type) = declared.content_type.as_deref() {
        let content_type = content_type.to_ascii_lowercase();
        // multipart clients often fall back to octet-stream
        if content_type != "application/octet-stream"
            && !ACCEPTED_MIME_TYPES.contains(&content_type.as_str())
        {
            return Err(UploadError::UnsupportedFormat(content_type));
        }
    }

    Ok(())
}

fn sniff_format(bytes: &[u8]) -> Result<ImageFormat, UploadError> {
    match image::guess_format(bytes) {
        Ok(format @ (ImageFormat::Jpeg | ImageFormat::Png)) => Ok(format),
        Ok(other) => Err(UploadError::UnsupportedFormat(format!("{other:?}"))),
        Err(_) => Err(UploadError::UnsupportedFormat("unrecognized content".into())),
    }
}
