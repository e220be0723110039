use crate::AsciiError;

/// Ordered set of characters an atlas is built from.
///
/// Repeated characters are dropped, keeping the first occurrence.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Gradient {
    chars: Vec<char>,
}

impl Gradient {
    pub fn new(chars: impl AsRef<str>) -> Result<Self, AsciiError> {
        let mut unique: Vec<char> = Vec::new();
        for ch in chars.as_ref().chars() {
            if !unique.contains(&ch) {
                unique.push(ch);
            }
        }

        if unique.is_empty() {
            return Err(AsciiError::Config("character set must not be empty".into()));
        }

        Ok(Self { chars: unique })
    }

    /// Default ten character ramp, densest first.
    pub fn standard() -> Self {
        Self::preset("@%#*+=-:. ")
    }

    pub fn detailed() -> Self {
        Self::preset("$@B%8&WM#*oahkbdpqwmZO0QLCJUYXzcvunxrjft/\\|()1{}[]?-_+~<>i!lI;:,\"^`'. ")
    }

    pub fn blocks() -> Self {
        Self::preset("█▓▒░ ")
    }

    pub fn binary() -> Self {
        Self::preset("01")
    }

    fn preset(chars: &str) -> Self {
        Self { chars: chars.chars().collect() }
    }

    pub fn len(&self) -> usize {
        self.chars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chars.is_empty()
    }

    pub fn chars(&self) -> &[char] {
        &self.chars
    }
}

impl Default for Gradient {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicates_keep_first_occurrence() {
        let gradient = Gradient::new("a#ba#").unwrap();
        assert_eq!(gradient.chars(), &['a', '#', 'b']);
    }

    #[test]
    fn empty_set_is_rejected() {
        assert!(matches!(Gradient::new(""), Err(AsciiError::Config(_))));
    }

    #[test]
    fn standard_ramp_has_ten_levels() {
        assert_eq!(Gradient::standard().len(), 10);
        assert_eq!(Gradient::default(), Gradient::standard());
    }
}
