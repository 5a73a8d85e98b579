/// Capture boundary
///
/// The camera hands over an encoded frame plus the mirroring the user asked
/// for. This module turns that into the opaque `ImageData` the store keeps:
/// a `data:` URL. Pixels are only touched when the frame must be mirrored.
use base64::Engine;
use image::codecs::jpeg::JpegEncoder;
use image::ImageFormat;
use std::io::Cursor;

use crate::error::CaptureError;
use crate::state::ImageData;

/// Encoding of a captured frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureFormat {
    Jpeg,
    Png,
    Webp,
}

impl CaptureFormat {
    pub fn mime_type(&self) -> &'static str {
        match self {
            CaptureFormat::Jpeg => "image/jpeg",
            CaptureFormat::Png => "image/png",
            CaptureFormat::Webp => "image/webp",
        }
    }

    /// Guess the format from a file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(CaptureFormat::Jpeg),
            "png" => Some(CaptureFormat::Png),
            "webp" => Some(CaptureFormat::Webp),
            _ => None,
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            CaptureFormat::Jpeg => ImageFormat::Jpeg,
            CaptureFormat::Png => ImageFormat::Png,
            CaptureFormat::Webp => ImageFormat::WebP,
        }
    }
}

/// Mirroring requested for the stored image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mirror {
    /// Keep the frame as captured
    #[default]
    None,
    /// Flip left/right (front camera selfie)
    Horizontal,
}

/// Raw capture from the camera collaborator
#[derive(Debug, Clone)]
pub struct CapturedImage {
    pub format: CaptureFormat,
    pub bytes: Vec<u8>,
}

impl CapturedImage {
    pub fn new(format: CaptureFormat, bytes: Vec<u8>) -> Self {
        Self { format, bytes }
    }

    /// Build the stored payload, applying the requested mirroring
    pub fn into_payload(self, mirror: Mirror) -> Result<ImageData, CaptureError> {
        if self.bytes.is_empty() {
            return Err(CaptureError::Empty);
        }

        let (format, bytes) = match mirror {
            Mirror::None => (self.format, self.bytes),
            Mirror::Horizontal => mirror_horizontal(self.format, &self.bytes)?,
        };

        let encoded = base64::engine::general_purpose::STANDARD.encode(&bytes);
        Ok(ImageData::from(format!(
            "data:{};base64,{}",
            format.mime_type(),
            encoded
        )))
    }
}

/// JPEG quality used when a mirrored frame is re-encoded
const JPEG_QUALITY: u8 = 92;

/// Decode, flip and re-encode a frame in its original format.
/// WebP frames are re-encoded lossless.
fn mirror_horizontal(
    format: CaptureFormat,
    bytes: &[u8],
) -> Result<(CaptureFormat, Vec<u8>), CaptureError> {
    let img = image::load_from_memory_with_format(bytes, format.image_format())?;
    let flipped = img.fliph();

    let mut buffer = Cursor::new(Vec::new());
    match format {
        CaptureFormat::Jpeg => {
            let encoder = JpegEncoder::new_with_quality(&mut buffer, JPEG_QUALITY);
            image::DynamicImage::ImageRgb8(flipped.to_rgb8()).write_with_encoder(encoder)?;
        }
        CaptureFormat::Png | CaptureFormat::Webp => {
            flipped.write_to(&mut buffer, format.image_format())?;
        }
    }

    log::debug!(
        "Mirrored {}x{} capture ({} bytes)",
        flipped.width(),
        flipped.height(),
        buffer.get_ref().len()
    );

    Ok((format, buffer.into_inner()))
}
