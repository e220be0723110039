use std::cmp::Reverse;

use log::debug;

use super::font::{GlyphBitmap, GlyphRasterizer};
use super::gradient::Gradient;
use super::mapping::ElementWidth;
use crate::image_pipeline::adjust::Polarity;
use crate::AsciiError;

/// Validated parameters for building a [`GlyphAtlas`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasConfig {
    pub font_size: u32,
    pub stroke_width: u32,
    pub reverse: bool,
    pub polarity: Polarity,
}

impl AtlasConfig {
    pub fn new(
        font_size: i64,
        stroke_width: i64,
        reverse: bool,
        background: i64,
    ) -> Result<Self, AsciiError> {
        if font_size <= 0 {
            return Err(AsciiError::Config(format!("font size must be > 0, got {font_size}")));
        }
        if stroke_width < 0 {
            return Err(AsciiError::Config(format!(
                "boldness must be >= 0, got {stroke_width}"
            )));
        }
        let font_size = u32::try_from(font_size)
            .map_err(|_| AsciiError::Config(format!("font size {font_size} is too large")))?;
        let stroke_width = u32::try_from(stroke_width)
            .map_err(|_| AsciiError::Config(format!("boldness {stroke_width} is too large")))?;

        Ok(Self { font_size, stroke_width, reverse, polarity: Polarity::from_level(background)? })
    }
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self { font_size: 20, stroke_width: 2, reverse: false, polarity: Polarity::Light }
    }
}

/// Uniformly sized glyph bitmaps ordered by ink, paired with their characters.
///
/// Index `i` of the bitmaps always belongs to character `i`; the two are
/// sorted together and never re-derived separately. Bitmaps are stored
/// polarity-normalised: high values are ink on either background.
#[derive(Clone, Debug)]
pub struct GlyphAtlas {
    chars: Vec<char>,
    pixels: Vec<u8>,
    glyph_width: u32,
    glyph_height: u32,
    polarity: Polarity,
    element_width: ElementWidth,
}

impl GlyphAtlas {
    /// Rasterizes every character of `gradient` and assembles the atlas.
    pub fn build<R: GlyphRasterizer + ?Sized>(
        rasterizer: &R,
        gradient: &Gradient,
        config: &AtlasConfig,
    ) -> Result<Self, AsciiError> {
        if config.font_size == 0 {
            return Err(AsciiError::Config("font size must be > 0".into()));
        }

        let background = config.polarity.level();
        let ink = config.polarity.ink_level();

        let mut glyphs = Vec::with_capacity(gradient.len());
        for &ch in gradient.chars() {
            let coverage = rasterizer.rasterize(ch, config.stroke_width)?;

            // Draw ink over the background, then normalise the polarity.
            let data = coverage
                .data
                .iter()
                .map(|&alpha| config.polarity.apply(blend(background, ink, alpha)))
                .collect();
            glyphs.push((ch, GlyphBitmap::new(coverage.width, coverage.height, data)));
        }

        Self::from_bitmaps(glyphs, config.reverse, config.polarity)
    }

    /// Crops and sorts already normalised bitmaps into an atlas.
    ///
    /// Normal order puts the glyph with the most ink first, so the darkest
    /// source intensity (index 0) picks the densest glyph. `reverse` flips it.
    pub fn from_bitmaps(
        glyphs: Vec<(char, GlyphBitmap)>,
        reverse: bool,
        polarity: Polarity,
    ) -> Result<Self, AsciiError> {
        if glyphs.is_empty() {
            return Err(AsciiError::Config("character set must not be empty".into()));
        }

        let glyph_width = glyphs.iter().map(|(_, bitmap)| bitmap.width).min().unwrap_or(0);
        let glyph_height = glyphs.iter().map(|(_, bitmap)| bitmap.height).min().unwrap_or(0);
        if glyph_width == 0 || glyph_height == 0 {
            let ch = glyphs
                .iter()
                .find(|(_, bitmap)| bitmap.width == 0 || bitmap.height == 0)
                .map_or(' ', |(ch, _)| *ch);
            return Err(AsciiError::GlyphRaster(ch));
        }

        let mut cropped: Vec<(char, Vec<u8>, u64)> = glyphs
            .into_iter()
            .map(|(ch, bitmap)| {
                let data = crop(&bitmap, glyph_width, glyph_height);
                let ink = data.iter().map(|&value| u64::from(value)).sum();
                (ch, data, ink)
            })
            .collect();

        if reverse {
            cropped.sort_by_key(|&(_, _, ink)| ink);
        } else {
            cropped.sort_by_key(|&(_, _, ink)| Reverse(ink));
        }

        let element_width = ElementWidth::for_glyph_count(cropped.len())?;
        let mut chars = Vec::with_capacity(cropped.len());
        let mut pixels =
            Vec::with_capacity(cropped.len() * glyph_width as usize * glyph_height as usize);
        for (ch, data, _) in cropped {
            chars.push(ch);
            pixels.extend_from_slice(&data);
        }

        debug!(
            "built glyph atlas: {} glyphs of {}x{}, {}-bit scratch",
            chars.len(),
            glyph_width,
            glyph_height,
            element_width.bits()
        );

        Ok(Self { chars, pixels, glyph_width, glyph_height, polarity, element_width })
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    /// Characters in atlas order.
    pub fn chars(&self) -> &[char] {
        &self.chars
    }

    pub fn glyph_width(&self) -> u32 {
        self.glyph_width
    }

    pub fn glyph_height(&self) -> u32 {
        self.glyph_height
    }

    pub fn polarity(&self) -> Polarity {
        self.polarity
    }

    pub fn element_width(&self) -> ElementWidth {
        self.element_width
    }

    /// Row-major pixels of the glyph at `index`.
    pub fn bitmap(&self, index: usize) -> &[u8] {
        let size = self.glyph_area();
        &self.pixels[index * size..(index + 1) * size]
    }

    /// Total ink of the glyph at `index`.
    pub fn ink(&self, index: usize) -> u64 {
        self.bitmap(index).iter().map(|&value| u64::from(value)).sum()
    }

    pub(crate) fn glyph_area(&self) -> usize {
        self.glyph_width as usize * self.glyph_height as usize
    }
}

#[inline]
fn blend(background: u8, ink: u8, alpha: u8) -> u8 {
    let background = u32::from(background);
    let ink = u32::from(ink);
    let alpha = u32::from(alpha);
    ((background * (255 - alpha) + ink * alpha + 127) / 255) as u8
}

fn crop(bitmap: &GlyphBitmap, width: u32, height: u32) -> Vec<u8> {
    let width = width as usize;
    let stride = bitmap.width as usize;
    (0..height as usize)
        .flat_map(|y| bitmap.data[y * stride..y * stride + width].iter().copied())
        .collect()
}
