//! Rendering of encoded QR symbols.
//!
//! Consumes the boolean module matrix produced by [`crate::qrcode`] and emits
//! exactly one representation per call: a raster image buffer, an in-memory
//! PNG byte stream, an SVG document, or console text. There is no fallback
//! between representations; if the requested pixel width cannot fit at least
//! one pixel per module, rendering fails with [`RenderError::ImageTooSmall`]
//! instead of producing a corrupted or mixed artifact.

use std::io::Cursor;

use image::{DynamicImage, ImageBuffer, ImageFormat, Luma};
use thiserror::Error;

use crate::qrcode::QrCode;

/// The default quiet zone width in modules, per the QR specification's
/// recommendation.
pub const DEFAULT_MARGIN: u32 = 4;

/// Error type for when a symbol cannot be rendered at the requested size.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The target width is smaller than one pixel per module including the
    /// quiet zone. The caller must request at least `minimum` pixels.
    #[error("target width {requested}px is below the {minimum}px needed for 1px modules")]
    ImageTooSmall {
        requested: u32,
        minimum: u32,
    },
    /// PNG serialization failed.
    #[error("png encoding failed: {0}")]
    Png(#[from] image::ImageError),
}

/// Returns the integer pixel width of one module when the symbol plus its
/// margin is fitted into `target_width` pixels.
///
/// Every module maps to a whole number of pixels, so the rendered output may
/// be slightly smaller than `target_width`.
///
/// # Errors
///
/// Returns [`RenderError::ImageTooSmall`] if even 1px modules do not fit.
pub fn module_pixel_size(qr: &QrCode, target_width: u32, margin: u32) -> Result<u32, RenderError> {
    let total_modules: u32 = qr.size() as u32 + 2 * margin;
    let px: u32 = target_width / total_modules;
    if px == 0 {
        return Err(RenderError::ImageTooSmall {
            requested: target_width,
            minimum: total_modules,
        });
    }
    Ok(px)
}

/// Renders the symbol into a grayscale image buffer.
///
/// The output is square with `(size + 2*margin) * px` pixels per side, where
/// `px` is the per-module pixel width from [`module_pixel_size`]. Dark
/// modules are blitted as solid black squares on a white background, with no
/// partially covered module boundaries.
///
/// # Arguments
///
/// * `qr` - The symbol to render.
/// * `target_width` - Desired output width in pixels.
/// * `margin` - Optional quiet zone width in modules; defaults to 4.
///
/// # Example
///
/// ```rust
/// use qrsym::qrcode::QrCode;
/// use qrsym::render::to_image;
///
/// let qr = QrCode::encode("Hello, World!").unwrap();
/// let img = to_image(&qr, 600, None).unwrap();
/// assert_eq!(img.width(), img.height());
/// ```
pub fn to_image(
    qr: &QrCode,
    target_width: u32,
    margin: Option<u32>
) -> Result<ImageBuffer<Luma<u8>, Vec<u8>>, RenderError> {
    let margin: u32 = margin.unwrap_or(DEFAULT_MARGIN);
    let px: u32 = module_pixel_size(qr, target_width, margin)?;
    let dimension: u32 = (qr.size() as u32 + 2 * margin) * px;

    let img = ImageBuffer::from_fn(dimension, dimension, |x, y| {
        let qr_x = (x / px) as i32 - margin as i32;
        let qr_y = (y / px) as i32 - margin as i32;
        if qr.get_module(qr_x, qr_y) {
            Luma([0u8]) // Black
        } else {
            Luma([255u8]) // White
        }
    });
    Ok(img)
}

/// Renders the symbol as PNG bytes, entirely in memory.
///
/// # Errors
///
/// Returns [`RenderError::ImageTooSmall`] for an undersized target width, or
/// [`RenderError::Png`] if PNG serialization fails.
pub fn to_png_bytes(
    qr: &QrCode,
    target_width: u32,
    margin: Option<u32>
) -> Result<Vec<u8>, RenderError> {
    let img = to_image(qr, target_width, margin)?;
    let mut bytes: Vec<u8> = Vec::new();
    DynamicImage::ImageLuma8(img).write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)?;
    Ok(bytes)
}

/// Returns a string of SVG code for an image depicting the given QR Code.
///
/// The `width` and `height` attributes are in pixels (whole modules only, as
/// computed by [`module_pixel_size`]); the `viewBox` is in module units.
/// Horizontal runs of dark modules are merged into a single path command per
/// run. The string always uses Unix newlines (\n), regardless of platform.
pub fn to_svg(qr: &QrCode, target_width: u32, margin: Option<u32>) -> Result<String, RenderError> {
    let margin: u32 = margin.unwrap_or(DEFAULT_MARGIN);
    let px: u32 = module_pixel_size(qr, target_width, margin)?;
    let dimension: i32 = qr.size() + 2 * (margin as i32);
    let pixel_dimension: u32 = (dimension as u32) * px;

    let mut result = String::new();
    result += "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n";
    result += "<!DOCTYPE svg PUBLIC \"-//W3C//DTD SVG 1.1//EN\" \"http://www.w3.org/Graphics/SVG/1.1/DTD/svg11.dtd\">\n";
    result += &format!(
        "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{0}\" height=\"{0}\" viewBox=\"0 0 {1} {1}\" stroke=\"none\">\n",
        pixel_dimension,
        dimension
    );
    result += "\t<rect width=\"100%\" height=\"100%\" fill=\"#FFFFFF\"/>\n";
    result += "\t<path d=\"";
    let mut first = true;
    for y in 0..qr.size() {
        let mut x: i32 = 0;
        while x < qr.size() {
            if !qr.get_module(x, y) {
                x += 1;
                continue;
            }
            let run_start: i32 = x;
            while x < qr.size() && qr.get_module(x, y) {
                x += 1;
            }
            let run: i32 = x - run_start;
            if !first {
                result += " ";
            }
            first = false;
            result += &format!(
                "M{},{}h{}v1h-{}z",
                run_start + (margin as i32),
                y + (margin as i32),
                run,
                run
            );
        }
    }
    result += "\" fill=\"#000000\"/>\n";
    result += "</svg>\n";
    Ok(result)
}

/// Renders the symbol as console text, two block characters per module, with
/// the default quiet zone.
pub fn to_console_string(qr: &QrCode) -> String {
    let border: i32 = DEFAULT_MARGIN as i32;
    let mut result = String::new();
    for y in -border..qr.size() + border {
        for x in -border..qr.size() + border {
            let c: char = if qr.get_module(x, y) { '█' } else { ' ' };
            result.push(c);
            result.push(c);
        }
        result.push('\n');
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::qrcode::EccLevel;

    fn count_dark_modules(qr: &QrCode) -> usize {
        let mut count = 0;
        for y in 0..qr.size() {
            for x in 0..qr.size() {
                if qr.get_module(x, y) {
                    count += 1;
                }
            }
        }
        count
    }

    #[test]
    fn raster_is_pixel_exact() {
        // 100 bytes at Low selects version 5 (size 37)
        let text = "a".repeat(100);
        let qr = QrCode::encode_text(&text, EccLevel::Low).unwrap();
        assert_eq!(qr.version().value(), 5);

        let img = to_image(&qr, 600, None).unwrap();
        let px = module_pixel_size(&qr, 600, DEFAULT_MARGIN).unwrap();
        let dimension = (qr.size() as u32 + 2 * DEFAULT_MARGIN) * px;
        assert_eq!(img.dimensions(), (dimension, dimension));

        let dark_pixels = img.pixels().filter(|p| p.0[0] == 0).count();
        assert_eq!(dark_pixels, count_dark_modules(&qr) * (px * px) as usize);
    }

    #[test]
    fn undersized_width_fails_deterministically() {
        let qr = QrCode::encode("too small").unwrap();
        // Version 1 plus the default margin needs at least 29 pixels
        let err = to_image(&qr, 20, None).unwrap_err();
        assert!(matches!(err, RenderError::ImageTooSmall { requested: 20, minimum: 29 }));
        assert!(to_image(&qr, 29, None).is_ok());
    }

    #[test]
    fn margin_override_is_honored() {
        let qr = QrCode::encode_text("HELLO", EccLevel::Medium).unwrap();
        let img = to_image(&qr, 210, Some(0)).unwrap();
        // 21 modules at 10px each, no quiet zone
        assert_eq!(img.dimensions(), (210, 210));
        // Top-left finder corner is dark
        assert_eq!(img.get_pixel(0, 0).0[0], 0);
    }

    #[test]
    fn svg_has_pixel_size_and_module_viewbox() {
        let qr = QrCode::encode_text("HELLO", EccLevel::Medium).unwrap();
        let svg = to_svg(&qr, 600, None).unwrap();
        assert!(svg.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        // 29 total modules, 20px each
        assert!(svg.contains("width=\"580\" height=\"580\""));
        assert!(svg.contains("viewBox=\"0 0 29 29\""));
        assert!(svg.ends_with("</svg>\n"));
    }

    #[test]
    fn svg_merges_horizontal_runs() {
        let qr = QrCode::encode_text("HELLO", EccLevel::Medium).unwrap();
        let svg = to_svg(&qr, 600, None).unwrap();
        // The top edge of the top-left finder pattern is a 7-module run,
        // offset by the default margin
        assert!(svg.contains("M4,4h7v1h-7z"));
    }

    #[test]
    fn svg_too_small_fails() {
        let qr = QrCode::encode("vector").unwrap();
        assert!(matches!(to_svg(&qr, 10, None), Err(RenderError::ImageTooSmall { .. })));
    }

    #[test]
    fn png_bytes_have_png_magic() {
        let qr = QrCode::encode("png output").unwrap();
        let bytes = to_png_bytes(&qr, 300, None).unwrap();
        assert_eq!(&bytes[..4], &[0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn console_rendering_covers_symbol_and_border() {
        let qr = QrCode::encode_text("HELLO", EccLevel::Medium).unwrap();
        let text = to_console_string(&qr);
        let lines: Vec<&str> = text.lines().collect();
        let expected = (qr.size() + 2 * (DEFAULT_MARGIN as i32)) as usize;
        assert_eq!(lines.len(), expected);
        for line in lines {
            assert_eq!(line.chars().count(), expected * 2);
        }
    }
}
