/// Layout of a frame once it is cut into glyph cells.
///
/// The canvas is the frame rounded up to whole cells; the output is either
/// the canvas or, when clipping, the exact source size.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CellGeometry {
    pub columns: u32,
    pub rows: u32,
    pub glyph_width: u32,
    pub glyph_height: u32,
    pub source_width: u32,
    pub source_height: u32,
    pub clip: bool,
}

impl CellGeometry {
    /// One cell per `glyph_width x glyph_height` stride of the source, rounding up.
    pub fn derive(
        source_width: u32,
        source_height: u32,
        glyph_width: u32,
        glyph_height: u32,
        clip: bool,
    ) -> Option<Self> {
        if source_width == 0 || source_height == 0 || glyph_width == 0 || glyph_height == 0 {
            return None;
        }

        Some(Self {
            columns: source_width.div_ceil(glyph_width),
            rows: source_height.div_ceil(glyph_height),
            glyph_width,
            glyph_height,
            source_width,
            source_height,
            clip,
        })
    }

    pub fn cell_count(&self) -> usize {
        self.columns as usize * self.rows as usize
    }

    pub fn canvas_width(&self) -> u32 {
        self.columns * self.glyph_width
    }

    pub fn canvas_height(&self) -> u32 {
        self.rows * self.glyph_height
    }

    pub fn output_width(&self) -> u32 {
        if self.clip {
            self.source_width
        } else {
            self.canvas_width()
        }
    }

    pub fn output_height(&self) -> u32 {
        if self.clip {
            self.source_height
        } else {
            self.canvas_height()
        }
    }

    /// Source pixel sampled for a cell: the top-left corner of its stride.
    #[inline]
    pub fn sample_point(&self, column: u32, row: u32) -> (u32, u32) {
        (column * self.glyph_width, row * self.glyph_height)
    }
}
