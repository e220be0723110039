use serde::{Deserialize, Serialize};

/// Text form of a rendered frame: one string per row of glyph cells.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CharacterGrid {
    rows: Vec<String>,
}

impl CharacterGrid {
    pub fn new(rows: Vec<String>) -> Self {
        Self { rows }
    }

    /// Resolves row-major atlas indices through the atlas character order.
    pub fn from_indices(indices: &[u32], columns: usize, chars: &[char]) -> Self {
        if columns == 0 {
            return Self::default();
        }

        let rows = indices
            .chunks(columns)
            .map(|row| row.iter().map(|&index| chars[index as usize]).collect::<String>())
            .collect();
        Self { rows }
    }

    pub fn rows(&self) -> &[String] {
        &self.rows
    }

    pub fn height(&self) -> usize {
        self.rows.len()
    }

    pub fn width(&self) -> usize {
        self.rows.first().map_or(0, |row| row.chars().count())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_resolve_row_major() {
        let grid = CharacterGrid::from_indices(&[0, 1, 1, 0, 2, 2], 3, &['#', '.', ' ']);
        assert_eq!(grid.rows(), &["#..".to_string(), "#  ".to_string()]);
        assert_eq!((grid.width(), grid.height()), (3, 2));
    }

    #[test]
    fn serializes_as_plain_rows() {
        let grid = CharacterGrid::new(vec!["ab".into(), "cd".into()]);
        assert_eq!(serde_json::to_string(&grid).unwrap(), r#"["ab","cd"]"#);
    }
}
