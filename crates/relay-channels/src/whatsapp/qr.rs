//! QR code rendering for the pairing flow.
//!
//! The bridge emits raw QR payloads; we render them for the terminal and as a
//! base64 PNG for the status endpoint.

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use relay_core::error::RelayError;

/// Render a compact QR code for terminal display using Unicode half-block characters.
///
/// Packs two rows of modules into one line of text using `▀`, `▄`, `█`, and space.
pub fn generate_qr_terminal(qr_data: &str) -> Result<String, RelayError> {
    use qrcode::{Color, EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| RelayError::Validation(format!("QR generation failed: {e}")))?;

    let width = code.width();
    let colors: Vec<Color> = code.into_colors();
    let is_dark = |row: usize, col: usize| -> bool {
        row < width && col < width && colors[row * width + col] == Color::Dark
    };

    let mut out = String::new();
    for row in (0..width).step_by(2) {
        for col in 0..width {
            out.push(match (is_dark(row, col), is_dark(row + 1, col)) {
                (true, true) => '█',
                (true, false) => '▀',
                (false, true) => '▄',
                (false, false) => ' ',
            });
        }
        out.push('\n');
    }

    Ok(out)
}

/// Render a QR code as PNG bytes.
pub fn generate_qr_image(qr_data: &str) -> Result<Vec<u8>, RelayError> {
    use image::{ImageBuffer, Luma};
    use qrcode::{Color, EcLevel, QrCode};

    let code = QrCode::with_error_correction_level(qr_data.as_bytes(), EcLevel::L)
        .map_err(|e| RelayError::Validation(format!("QR generation failed: {e}")))?;

    let module_size: u32 = 8;
    let quiet_zone: u32 = 2;
    let modules = code.width() as u32;
    let img_size = (modules + quiet_zone * 2) * module_size;

    let img = ImageBuffer::from_fn(img_size, img_size, |x, y| {
        let (cx, cy) = (x / module_size, y / module_size);
        let in_code = cx >= quiet_zone
            && cy >= quiet_zone
            && cx - quiet_zone < modules
            && cy - quiet_zone < modules;
        if in_code
            && code[((cx - quiet_zone) as usize, (cy - quiet_zone) as usize)] == Color::Dark
        {
            Luma([0u8])
        } else {
            Luma([255u8])
        }
    });

    let mut buf = std::io::Cursor::new(Vec::new());
    img.write_to(&mut buf, image::ImageFormat::Png)
        .map_err(|e| RelayError::Validation(format!("PNG encoding failed: {e}")))?;

    Ok(buf.into_inner())
}

/// PNG rendering of a QR payload, base64-encoded for JSON responses.
pub fn qr_png_base64(qr_data: &str) -> Result<String, RelayError> {
    Ok(BASE64.encode(generate_qr_image(qr_data)?))
}
