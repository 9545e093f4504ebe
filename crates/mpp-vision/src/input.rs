//! Uploaded images and their validation.
//!
//! An `Image` is what the caller sent: bytes plus the declared content type.
//! Decoding it into a `DecodedImage` is where every size and format
//! constraint is enforced; anything that fails here is `InvalidInput`.

use std::io::Cursor;

use ::image::io::{Limits, Reader};
use ::image::{DynamicImage, GenericImageView, ImageFormat};
use tracing::debug;

use crate::error::{VisionError, VisionResult};

/// Formats accepted for detection.
const ALLOWED_FORMATS: &[ImageFormat] = &[
    ImageFormat::Jpeg,
    ImageFormat::Png,
    ImageFormat::WebP,
    ImageFormat::Bmp,
];

/// Size bounds applied before inference.
#[derive(Debug, Clone)]
pub struct ImageLimits {
    /// Maximum encoded size in bytes
    pub max_bytes: usize,
    /// Maximum width and height in pixels
    pub max_dimension: u32,
}

impl Default for ImageLimits {
    fn default() -> Self {
        Self {
            max_bytes: 10 * 1024 * 1024, // 10MB
            max_dimension: 8192,
        }
    }
}

/// Raw uploaded image, owned by a single request.
#[derive(Debug, Clone)]
pub struct Image {
    bytes: Vec<u8>,
    content_type: Option<String>,
}

impl Image {
    pub fn new(bytes: impl Into<Vec<u8>>, content_type: Option<String>) -> Self {
        Self {
            bytes: bytes.into(),
            content_type,
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    /// Validate and decode the image.
    ///
    /// The format is sniffed from the bytes; the declared content type only
    /// has to be an image type (or `application/octet-stream`).
    pub fn decode(&self, limits: &ImageLimits) -> VisionResult<DecodedImage> {
        if self.bytes.is_empty() {
            return Err(VisionError::invalid_input("Image is empty"));
        }

        if self.bytes.len() > limits.max_bytes {
            return Err(VisionError::invalid_input(format!(
                "Image is {} bytes, limit is {} bytes",
                self.bytes.len(),
                limits.max_bytes
            )));
        }

        if let Some(content_type) = self.content_type() {
            check_content_type(content_type)?;
        }

        let format = ::image::guess_format(&self.bytes)
            .map_err(|_| VisionError::invalid_input("Unrecognized image format"))?;

        if !ALLOWED_FORMATS.contains(&format) {
            return Err(VisionError::invalid_input(format!(
                "Unsupported image format: {}",
                format_name(format)
            )));
        }

        let mut io_limits = Limits::default();
        io_limits.max_image_width = Some(limits.max_dimension);
        io_limits.max_image_height = Some(limits.max_dimension);

        let mut reader = Reader::with_format(Cursor::new(self.bytes.as_slice()), format);
        reader.limits(io_limits);

        let image = reader
            .decode()
            .map_err(|e| VisionError::invalid_input(format!("Failed to decode image: {}", e)))?;

        let decoded = DecodedImage::new(image, format);
        if decoded.width() == 0 || decoded.height() == 0 {
            return Err(VisionError::invalid_input("Image has no pixels"));
        }

        debug!(
            format = decoded.format_name(),
            width = decoded.width(),
            height = decoded.height(),
            bytes = self.bytes.len(),
            "Image decoded"
        );

        Ok(decoded)
    }
}

fn check_content_type(content_type: &str) -> VisionResult<()> {
    let essence = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_lowercase();

    if essence.starts_with("image/") || essence == "application/octet-stream" {
        Ok(())
    } else {
        Err(VisionError::invalid_input(format!(
            "Content type {} is not an image",
            essence
        )))
    }
}

fn format_name(format: ImageFormat) -> &'static str {
    match format {
        ImageFormat::Jpeg => "jpeg",
        ImageFormat::Png => "png",
        ImageFormat::WebP => "webp",
        ImageFormat::Bmp => "bmp",
        ImageFormat::Gif => "gif",
        ImageFormat::Tiff => "tiff",
        _ => "other",
    }
}

/// A validated, decoded image ready for inference.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    image: DynamicImage,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn new(image: DynamicImage, format: ImageFormat) -> Self {
        Self { image, format }
    }

    pub fn image(&self) -> &DynamicImage {
        &self.image
    }

    pub fn width(&self) -> u32 {
        self.image.dimensions().0
    }

    pub fn height(&self) -> u32 {
        self.image.dimensions().1
    }

    pub fn format(&self) -> ImageFormat {
        self.format
    }

    pub fn format_name(&self) -> &'static str {
        format_name(self.format)
    }
}
