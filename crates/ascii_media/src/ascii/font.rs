use std::fs;
use std::path::Path;

use ab_glyph::{point, Font, FontVec, PxScale, ScaleFont};
use log::debug;

use crate::AsciiError;

/// Single-channel glyph image; for rasterizer output it holds ink coverage.
///
/// `0` means untouched background, `255` means full ink.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlyphBitmap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl GlyphBitmap {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Self {
        assert_eq!(width as usize * height as usize, data.len());
        Self { width, height, data }
    }
}

/// Source of per-character coverage bitmaps for atlas construction.
pub trait GlyphRasterizer {
    fn rasterize(&self, ch: char, stroke_width: u32) -> Result<GlyphBitmap, AsciiError>;
}

/// Rasterizes glyphs from a TrueType/OpenType font file.
pub struct FontRasterizer {
    font: FontVec,
    size: f32,
}

impl FontRasterizer {
    pub fn open<P: AsRef<Path>>(path: P, font_size: u32) -> Result<Self, AsciiError> {
        let path = path.as_ref().to_path_buf();
        if font_size == 0 {
            return Err(AsciiError::Config("font size must be > 0".into()));
        }

        let bytes = fs::read(&path)
            .map_err(|err| AsciiError::FontLoad { path: path.clone(), reason: err.to_string() })?;
        let font = FontVec::try_from_vec(bytes)
            .map_err(|err| AsciiError::FontLoad { path: path.clone(), reason: err.to_string() })?;

        debug!("loaded font {} at {}px", path.display(), font_size);
        Ok(Self { font, size: font_size as f32 })
    }
}

impl GlyphRasterizer for FontRasterizer {
    fn rasterize(&self, ch: char, stroke_width: u32) -> Result<GlyphBitmap, AsciiError> {
        let scale = PxScale::from(self.size);
        let scaled = self.font.as_scaled(scale);
        let id = self.font.glyph_id(ch);

        let width = scaled.h_advance(id).ceil();
        let height = scaled.height().ceil();
        if width < 1.0 || height < 1.0 {
            return Err(AsciiError::GlyphRaster(ch));
        }
        let (width, height) = (width as u32, height as u32);

        // Glyphs sit a sixth of the font size above the natural baseline.
        let baseline = scaled.ascent() - self.size / 6.0;
        let glyph = id.with_scale_and_position(scale, point(0.0, baseline));

        let mut data = vec![0u8; width as usize * height as usize];
        if let Some(outlined) = self.font.outline_glyph(glyph) {
            let bounds = outlined.px_bounds();
            outlined.draw(|x, y, coverage| {
                let px = bounds.min.x as i64 + i64::from(x);
                let py = bounds.min.y as i64 + i64::from(y);
                if px < 0 || py < 0 || px >= i64::from(width) || py >= i64::from(height) {
                    return;
                }
                let idx = py as usize * width as usize + px as usize;
                let value = (coverage.clamp(0.0, 1.0) * 255.0).round() as u8;
                data[idx] = data[idx].max(value);
            });
        }

        dilate(&mut data, width as usize, height as usize, stroke_width as usize);
        Ok(GlyphBitmap::new(width, height, data))
    }
}

/// Square max filter of the given radius, used to thicken strokes.
pub(crate) fn dilate(data: &mut [u8], width: usize, height: usize, radius: usize) {
    if radius == 0 || width == 0 || height == 0 {
        return;
    }

    let mut horizontal = vec![0u8; data.len()];
    for y in 0..height {
        let row = &data[y * width..(y + 1) * width];
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(width - 1);
            horizontal[y * width + x] = row[lo..=hi].iter().copied().max().unwrap_or(0);
        }
    }

    for x in 0..width {
        for y in 0..height {
            let lo = y.saturating_sub(radius);
            let hi = (y + radius).min(height - 1);
            data[y * width + x] =
                (lo..=hi).map(|yy| horizontal[yy * width + x]).max().unwrap_or(0);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dilate_spreads_single_pixel() {
        let mut data = vec![0u8; 25];
        data[12] = 200;
        dilate(&mut data, 5, 5, 1);

        let lit: Vec<usize> = (0..25).filter(|&i| data[i] == 200).collect();
        assert_eq!(lit, vec![6, 7, 8, 11, 12, 13, 16, 17, 18]);
    }

    #[test]
    fn dilate_zero_radius_is_noop() {
        let mut data = vec![0, 9, 0, 0];
        dilate(&mut data, 2, 2, 0);
        assert_eq!(data, vec![0, 9, 0, 0]);
    }

    #[test]
    fn missing_font_file_is_font_load_error() {
        let result = FontRasterizer::open("/nonexistent/font/file.ttf", 20);
        assert!(matches!(result, Err(AsciiError::FontLoad { .. })));
    }

    #[test]
    fn garbage_font_bytes_are_font_load_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.ttf");
        fs::write(&path, b"definitely not a font").unwrap();

        let result = FontRasterizer::open(&path, 20);
        assert!(matches!(result, Err(AsciiError::FontLoad { .. })));
    }

    #[test]
    fn zero_font_size_is_config_error() {
        let result = FontRasterizer::open("/nonexistent/font/file.ttf", 0);
        assert!(matches!(result, Err(AsciiError::Config(_))));
    }
}
