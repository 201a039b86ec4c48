//! Image encoding: `DynamicImage` → `data:image/png;base64,…`.
//!
//! OpenAI-compatible vision endpoints accept images as data URIs inside the
//! JSON request body, so a page never needs to be hosted anywhere.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Encode a rasterised page as a PNG data URI.
///
/// ## Why PNG?
/// Lossless compression preserves text crispness. JPEG artefacts around small
/// digits are a common source of misread amounts and invoice numbers.
pub fn encode_page(img: &DynamicImage) -> Result<String, image::ImageError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded image → {} bytes base64", b64.len());

    Ok(format!("data:image/png;base64,{b64}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn encode_small_image() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(10, 10, Rgba([255, 0, 0, 255])));
        let uri = encode_page(&img).expect("encode should succeed");
        let payload = uri
            .strip_prefix("data:image/png;base64,")
            .expect("png data uri prefix");

        let decoded = STANDARD.decode(payload).expect("valid base64");
        assert_eq!(&decoded[1..4], b"PNG");
    }
}
