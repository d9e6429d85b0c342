use qrcode::render::svg;
use qrcode::QrCode;
use serde::Deserialize;

const CHECK_IN_PREFIX: &str = "dojo:checkin:";

#[derive(thiserror::Error, Debug)]
pub enum QrGenerationError {
    #[error("QR code generation failed: {0}")]
    QrCodeError(#[from] qrcode::types::QrError),

    #[error("PNG encoding failed: {0}")]
    ImageError(#[from] image::ImageError),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QrFormat {
    #[default]
    Svg,
    Png,
}

/// Text encoded in a member's check-in QR code
pub fn check_in_payload(qr_token: &str) -> String {
    format!("{}{}", CHECK_IN_PREFIX, qr_token)
}

/// Accepts either the scanned payload or a bare token
pub fn parse_check_in_payload(scanned: &str) -> &str {
    let scanned = scanned.trim();
    scanned.strip_prefix(CHECK_IN_PREFIX).unwrap_or(scanned)
}

/// Generates a QR code SVG for a member's check-in token
pub fn generate_qr_svg(qr_token: &str) -> Result<String, QrGenerationError> {
    let code = QrCode::new(check_in_payload(qr_token).as_bytes())?;

    let svg = code.render::<svg::Color>().min_dimensions(200, 200).build();

    Ok(svg)
}

/// Generates a QR code PNG for a member's check-in token
pub fn generate_qr_png(qr_token: &str) -> Result<Vec<u8>, QrGenerationError> {
    use image::{ImageBuffer, Luma};

    let code = QrCode::new(check_in_payload(qr_token).as_bytes())?;

    // Each module is 10x10 pixels
    let module_size = 10u32;
    let width = code.width() as u32;
    let img_size = width * module_size;

    let mut img = ImageBuffer::<Luma<u8>, Vec<u8>>::new(img_size, img_size);

    for (x, y, color) in img.enumerate_pixels_mut() {
        let module_x = x / module_size;
        let module_y = y / module_size;
        *color = match code[(module_x as usize, module_y as usize)] {
            qrcode::types::Color::Dark => Luma([0u8]),
            qrcode::types::Color::Light => Luma([255u8]),
        };
    }

    let mut png_data = Vec::new();
    image::DynamicImage::ImageLuma8(img).write_to(
        &mut std::io::Cursor::new(&mut png_data),
        image::ImageFormat::Png,
    )?;

    Ok(png_data)
}

/// PNG as a `data:` URI for embedding in email bodies
pub fn qr_png_data_uri(qr_token: &str) -> Result<String, QrGenerationError> {
    use base64::{engine::general_purpose::STANDARD, Engine};

    let png = generate_qr_png(qr_token)?;
    Ok(format!("data:image/png;base64,{}", STANDARD.encode(png)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_round_trip() {
        let payload = check_in_payload("abc123");
        assert_eq!(payload, "dojo:checkin:abc123");
        assert_eq!(parse_check_in_payload(&payload), "abc123");
        assert_eq!(parse_check_in_payload("  abc123 "), "abc123");
    }

    #[test]
    fn test_qr_svg_generation() {
        let svg = generate_qr_svg("0123456789abcdef0123456789abcdef").unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("</svg>"));
    }

    #[test]
    fn test_qr_png_generation() {
        let png = generate_qr_png("0123456789abcdef0123456789abcdef").unwrap();
        assert_eq!(&png[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn test_data_uri() {
        let uri = qr_png_data_uri("token").unwrap();
        assert!(uri.starts_with("data:image/png;base64,"));
    }
}
