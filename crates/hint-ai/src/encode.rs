//! Frame encoding for upload: downscale, PNG, base64.

use std::io::Cursor;

use barpath_common::error::{BarpathError, BarpathResult};
use barpath_motion_model::RgbaFrame;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat, RgbaImage};

/// A frame ready to be sent to the hint service.
#[derive(Debug, Clone)]
pub struct EncodedFrame {
    /// Base64 PNG without a data-URL prefix.
    pub image: String,
    pub width: u32,
    pub height: u32,
    /// `encoded size / original size`; divide service coordinates by this
    /// to map them back onto the original frame.
    pub scale: f64,
}

/// Encode `frame`, shrinking it so the long edge is at most `max_dimension`.
pub fn encode_frame(frame: &RgbaFrame, max_dimension: u32) -> BarpathResult<EncodedFrame> {
    let image = RgbaImage::from_raw(frame.width(), frame.height(), frame.as_bytes().to_vec())
        .ok_or_else(|| BarpathError::invalid_frame("frame buffer does not match its dimensions"))?;

    let long_edge = frame.width().max(frame.height());
    let scale = if max_dimension > 0 && long_edge > max_dimension {
        max_dimension as f64 / long_edge as f64
    } else {
        1.0
    };

    let image = if scale < 1.0 {
        let w = ((frame.width() as f64 * scale).round() as u32).max(1);
        let h = ((frame.height() as f64 * scale).round() as u32).max(1);
        image::imageops::resize(&image, w, h, FilterType::Triangle)
    } else {
        image
    };
    let (width, height) = image.dimensions();

    let mut png = Vec::new();
    DynamicImage::ImageRgba8(image)
        .write_to(&mut Cursor::new(&mut png), ImageFormat::Png)
        .map_err(|e| BarpathError::hint(format!("PNG encoding failed: {e}")))?;

    Ok(EncodedFrame {
        image: STANDARD.encode(&png),
        width,
        height,
        scale: width as f64 / frame.width() as f64,
    })
}
