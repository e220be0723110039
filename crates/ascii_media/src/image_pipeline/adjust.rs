use crate::AsciiError;

/// Channel weights of the fast luma approximation. They sum to 8, so the
/// largest possible luma is `255 * 8 = 2040`.
pub const LUMA_WEIGHTS: [u32; 3] = [3, 4, 1];

/// Largest value [`weighted_luma`] can return.
pub const MAX_LUMA: u32 = 255 * 8;

/// Background convention of a render.
///
/// With a light background every intensity and color is inverted on the
/// way in and out so ink stays numerically "high" in both conventions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Polarity {
    /// Background level 0.
    Dark,
    /// Background level 255.
    #[default]
    Light,
}

impl Polarity {
    pub fn from_level(level: i64) -> Result<Self, AsciiError> {
        match level {
            0 => Ok(Polarity::Dark),
            255 => Ok(Polarity::Light),
            other => Err(AsciiError::Config(format!(
                "background must be either 0 or 255, got {other}"
            ))),
        }
    }

    pub fn level(self) -> u8 {
        match self {
            Polarity::Dark => 0,
            Polarity::Light => 255,
        }
    }

    /// Level used to draw ink on this background.
    pub fn ink_level(self) -> u8 {
        255 - self.level()
    }

    #[inline]
    pub fn apply(self, value: u8) -> u8 {
        match self {
            Polarity::Dark => value,
            Polarity::Light => 255 - value,
        }
    }

    pub fn apply_rgb(self, rgb: [u8; 3]) -> [u8; 3] {
        rgb.map(|channel| self.apply(channel))
    }
}

#[inline]
pub fn weighted_luma(rgb: [u8; 3]) -> u32 {
    rgb.iter().zip(LUMA_WEIGHTS).map(|(&channel, weight)| u32::from(channel) * weight).sum()
}
