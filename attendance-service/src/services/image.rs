//! Upload decoding.
//!
//! Every upload is fully decoded so corrupt files fail here rather than at
//! the model. Formats Gemini takes inline are forwarded untouched; anything
//! else the decoder understands is re-encoded as PNG.

use crate::services::providers::ImageInput;
use image::{DynamicImage, ImageError, ImageFormat};
use std::io::Cursor;

/// A decoded upload ready to be sent to the model.
#[derive(Debug, Clone)]
pub struct PreparedImage {
    pub source_format: ImageFormat,
    pub width: u32,
    pub height: u32,
    pub input: ImageInput,
}

fn forwardable(format: ImageFormat) -> bool {
    matches!(
        format,
        ImageFormat::Png | ImageFormat::Jpeg | ImageFormat::WebP
    )
}

pub fn prepare_image(bytes: &[u8]) -> Result<PreparedImage, ImageError> {
    let source_format = image::guess_format(bytes)?;
    let decoded = image::load_from_memory_with_format(bytes, source_format)?;
    let (width, height) = (decoded.width(), decoded.height());

    let input = if forwardable(source_format) {
        ImageInput {
            mime_type: source_format.to_mime_type().to_string(),
            data: bytes.to_vec(),
        }
    } else {
        ImageInput {
            mime_type: ImageFormat::Png.to_mime_type().to_string(),
            data: encode_png(decoded)?,
        }
    };

    Ok(PreparedImage {
        source_format,
        width,
        height,
        input,
    })
}

fn encode_png(decoded: DynamicImage) -> Result<Vec<u8>, ImageError> {
    let rgba = DynamicImage::ImageRgba8(decoded.into_rgba8());
    let mut buf = Vec::new();
    rgba.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)?;
    Ok(buf)
}
