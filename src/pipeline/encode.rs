//! Image encoding: page images → base64 attachments for the model request.
//!
//! Vision chat APIs accept images as base64 data URLs embedded in the JSON
//! body. Rendered pages are PNG-encoded (lossless; rendered glyphs stay
//! crisp), uploaded photos are passed through in their own format.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// One image ready to attach to the model request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageImage {
    pub mime_type: String,
    /// Base64 payload, no data-URL prefix.
    pub data: String,
}

impl PageImage {
    /// Wrap raw image bytes that are already in a supported format.
    pub fn from_bytes(mime_type: &str, bytes: &[u8]) -> Self {
        Self {
            mime_type: mime_type.to_string(),
            data: STANDARD.encode(bytes),
        }
    }

    /// `data:<mime>;base64,<data>`
    pub fn data_url(&self) -> String {
        data_url(&self.mime_type, &self.data)
    }
}

/// Encode a rasterised page as a base64 PNG.
pub fn encode_page(img: &DynamicImage) -> Result<PageImage, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let page = PageImage::from_bytes("image/png", &buf);
    debug!("Encoded image → {} bytes base64", page.data.len());
    Ok(page)
}

/// Build a data URL from a MIME type and an already-encoded base64 payload.
pub fn data_url(mime_type: &str, base64_data: &str) -> String {
    format!("data:{mime_type};base64,{base64_data}")
}
