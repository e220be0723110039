use crate::image_pipeline::adjust::{weighted_luma, MAX_LUMA};
use crate::AsciiError;

/// Luma times glyph count is shifted right by this many bits; `2^11 = 2048`
/// is the first power of two above [`MAX_LUMA`].
const INDEX_SHIFT: u32 = 11;

/// Integer width of the scratch buffer elements.
///
/// Chosen so that `2^bits / (255 * 8) > glyph_count`, which keeps
/// `luma * glyph_count` inside the element range.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ElementWidth {
    U16,
    U32,
}

impl ElementWidth {
    pub fn for_glyph_count(count: usize) -> Result<Self, AsciiError> {
        let needed = count as u64 * u64::from(MAX_LUMA);
        if (1u64 << 16) > needed {
            Ok(ElementWidth::U16)
        } else if (1u64 << 32) > needed {
            Ok(ElementWidth::U32)
        } else {
            Err(AsciiError::Config(format!("character set of {count} glyphs is too large")))
        }
    }

    pub fn bits(self) -> u32 {
        match self {
            ElementWidth::U16 => 16,
            ElementWidth::U32 => 32,
        }
    }

    pub fn max_value(self) -> u64 {
        (1u64 << self.bits()) - 1
    }
}

/// Quantises sampled pixels to atlas indices.
#[derive(Clone, Copy, Debug)]
pub struct GlyphMapper {
    count: u32,
    width: ElementWidth,
}

impl GlyphMapper {
    pub fn new(count: usize, width: ElementWidth) -> Self {
        assert!(count > 0, "glyph mapper needs at least one glyph");
        Self { count: count as u32, width }
    }

    pub fn glyph_count(&self) -> usize {
        self.count as usize
    }

    /// Atlas index for a raw luma value.
    ///
    /// Both the luma and the product saturate at the element range, and the
    /// result is clamped into `[0, count - 1]`.
    #[inline]
    pub fn index_for_luma(&self, luma: u32) -> u32 {
        let max = self.width.max_value();
        let luma = u64::from(luma).min(max);
        let product = (luma * u64::from(self.count)).min(max);
        ((product >> INDEX_SHIFT) as u32).min(self.count - 1)
    }

    #[inline]
    pub fn index_for_pixel(&self, rgb: [u8; 3]) -> u32 {
        self.index_for_luma(weighted_luma(rgb))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn element_width_threshold() {
        assert_eq!(ElementWidth::for_glyph_count(1).unwrap(), ElementWidth::U16);
        assert_eq!(ElementWidth::for_glyph_count(10).unwrap(), ElementWidth::U16);
        // 65536 / 2040 = 32.12, so 32 glyphs still fit sixteen bits.
        assert_eq!(ElementWidth::for_glyph_count(32).unwrap(), ElementWidth::U16);
        assert_eq!(ElementWidth::for_glyph_count(33).unwrap(), ElementWidth::U32);
        assert_eq!(ElementWidth::for_glyph_count(70).unwrap(), ElementWidth::U32);
        assert!(ElementWidth::for_glyph_count(3_000_000).is_err());
    }

    #[test]
    fn two_glyph_extremes() {
        let mapper = GlyphMapper::new(2, ElementWidth::U16);
        assert_eq!(mapper.index_for_pixel([0, 0, 0]), 0);
        assert_eq!(mapper.index_for_pixel([255, 255, 255]), 1);
    }

    #[test]
    fn ten_glyph_ramp_is_monotonic() {
        let mapper = GlyphMapper::new(10, ElementWidth::U16);
        let mut last = 0;
        for value in 0..=255u8 {
            let index = mapper.index_for_pixel([value; 3]);
            assert!(index >= last);
            assert!(index < 10);
            last = index;
        }
        assert_eq!(last, 9);
    }

    #[test]
    fn saturated_product_is_clamped() {
        let mapper = GlyphMapper::new(31, ElementWidth::U16);
        assert_eq!(mapper.index_for_luma(u32::MAX), 30);

        let single = GlyphMapper::new(1, ElementWidth::U16);
        assert_eq!(single.index_for_luma(MAX_LUMA), 0);
    }
}
