use std::sync::Arc;

use image::{ImageBuffer, Rgb, RgbImage};
use log::debug;

use super::atlas::GlyphAtlas;
use super::grid::CharacterGrid;
use super::mapping::{ElementWidth, GlyphMapper};
use crate::image_pipeline::resize::CellGeometry;
use crate::AsciiError;

/// Borrowed RGB image, backed by a [`ScratchBuffer`].
pub type RgbView<'a> = ImageBuffer<Rgb<u8>, &'a [u8]>;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RasterOptions {
    /// Crop the padded canvas back to the source frame size.
    pub clip: bool,
    /// Flat color used for every cell instead of the sampled pixel.
    pub monochrome: Option<[u8; 3]>,
}

impl Default for RasterOptions {
    fn default() -> Self {
        Self { clip: true, monochrome: None }
    }
}

trait CanvasElement: Copy + Default {
    fn from_u32(value: u32) -> Self;
    fn to_u32(self) -> u32;
}

impl CanvasElement for u16 {
    #[inline]
    fn from_u32(value: u32) -> Self {
        value.min(u32::from(u16::MAX)) as u16
    }

    #[inline]
    fn to_u32(self) -> u32 {
        u32::from(self)
    }
}

impl CanvasElement for u32 {
    #[inline]
    fn from_u32(value: u32) -> Self {
        value
    }

    #[inline]
    fn to_u32(self) -> u32 {
        self
    }
}

#[derive(Debug)]
enum CanvasPlane {
    Narrow(Vec<u16>),
    Wide(Vec<u32>),
}

/// Reusable working memory for one stream of equally sized frames.
///
/// Shape and element width are fixed at allocation. Every rasterization
/// overwrites it, so a result borrowed from it lives only until the next call.
#[derive(Debug)]
pub struct ScratchBuffer {
    geometry: CellGeometry,
    canvas: CanvasPlane,
    cell_indices: Vec<u32>,
    cell_colors: Vec<[u8; 3]>,
    output: Vec<u8>,
}

impl ScratchBuffer {
    pub fn new(geometry: CellGeometry, element_width: ElementWidth) -> Self {
        let canvas_len = geometry.canvas_width() as usize * geometry.canvas_height() as usize * 3;
        let canvas = match element_width {
            ElementWidth::U16 => CanvasPlane::Narrow(vec![0; canvas_len]),
            ElementWidth::U32 => CanvasPlane::Wide(vec![0; canvas_len]),
        };
        let output_len = geometry.output_width() as usize * geometry.output_height() as usize * 3;

        debug!(
            "allocated {}-bit scratch buffer for {}x{} cells ({}x{} canvas)",
            element_width.bits(),
            geometry.columns,
            geometry.rows,
            geometry.canvas_width(),
            geometry.canvas_height()
        );

        Self {
            geometry,
            canvas,
            cell_indices: vec![0; geometry.cell_count()],
            cell_colors: vec![[0; 3]; geometry.cell_count()],
            output: vec![0; output_len],
        }
    }

    pub fn geometry(&self) -> CellGeometry {
        self.geometry
    }

    pub fn element_width(&self) -> ElementWidth {
        match self.canvas {
            CanvasPlane::Narrow(_) => ElementWidth::U16,
            CanvasPlane::Wide(_) => ElementWidth::U32,
        }
    }
}

/// Single-slot holder for a stream's scratch buffer.
///
/// The buffer is checked out for a rasterization and checked back in once
/// the caller is done with the borrowed result.
#[derive(Debug, Default)]
pub struct ScratchSlot {
    buffer: Option<ScratchBuffer>,
}

impl ScratchSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn checkout(&mut self) -> Option<ScratchBuffer> {
        self.buffer.take()
    }

    pub fn checkin(&mut self, buffer: ScratchBuffer) {
        debug_assert!(self.buffer.is_none(), "scratch slot already holds a buffer");
        self.buffer = Some(buffer);
    }
}

/// Result of rasterizing one frame into a scratch buffer.
#[derive(Debug)]
pub struct Rasterized<'a> {
    pub image: RgbView<'a>,
    pub grid: CharacterGrid,
    indices: &'a [u32],
}

impl Rasterized<'_> {
    /// Row-major atlas index of every cell.
    pub fn glyph_indices(&self) -> &[u32] {
        self.indices
    }

    pub fn to_image(&self) -> RgbImage {
        let mut image = RgbImage::new(self.image.width(), self.image.height());
        image.copy_from_slice(&self.image);
        image
    }
}

/// Maps color frames to glyph-composited images and character grids.
///
/// The atlas is shared read-only, so clones can run on several threads as
/// long as each one uses its own [`ScratchBuffer`].
#[derive(Clone, Debug)]
pub struct FrameRasterizer {
    atlas: Arc<GlyphAtlas>,
    mapper: GlyphMapper,
    options: RasterOptions,
}

impl FrameRasterizer {
    pub fn new(atlas: Arc<GlyphAtlas>, options: RasterOptions) -> Self {
        let mapper = GlyphMapper::new(atlas.len(), atlas.element_width());
        Self { atlas, mapper, options }
    }

    pub fn atlas(&self) -> &GlyphAtlas {
        &self.atlas
    }

    pub fn options(&self) -> RasterOptions {
        self.options
    }

    pub fn geometry_for(&self, width: u32, height: u32) -> Result<CellGeometry, AsciiError> {
        CellGeometry::derive(
            width,
            height,
            self.atlas.glyph_width(),
            self.atlas.glyph_height(),
            self.options.clip,
        )
        .ok_or_else(|| AsciiError::Config(format!("cannot rasterize a {width}x{height} frame")))
    }

    /// Allocates a scratch buffer shaped for frames of the given size.
    pub fn scratch_for(&self, width: u32, height: u32) -> Result<ScratchBuffer, AsciiError> {
        Ok(ScratchBuffer::new(self.geometry_for(width, height)?, self.atlas.element_width()))
    }

    /// Rasterizes without a pre-existing buffer, handing the new one back.
    pub fn rasterize_fresh(
        &self,
        frame: &RgbImage,
    ) -> Result<(RgbImage, CharacterGrid, ScratchBuffer), AsciiError> {
        let mut scratch = self.scratch_for(frame.width(), frame.height())?;
        let (image, grid) = {
            let result = self.rasterize(frame, &mut scratch)?;
            (result.to_image(), result.grid)
        };
        Ok((image, grid, scratch))
    }

    /// Rasterizes `frame` in place inside `scratch`.
    pub fn rasterize<'s>(
        &self,
        frame: &RgbImage,
        scratch: &'s mut ScratchBuffer,
    ) -> Result<Rasterized<'s>, AsciiError> {
        let geometry = scratch.geometry;
        if frame.width() != geometry.source_width || frame.height() != geometry.source_height {
            return Err(AsciiError::ShapeMismatch {
                width: geometry.source_width,
                height: geometry.source_height,
                expected: geometry.source_width as usize * geometry.source_height as usize * 3,
                actual: frame.as_raw().len(),
            });
        }

        self.sample_cells(frame, &geometry, &mut scratch.cell_indices, &mut scratch.cell_colors);

        match &mut scratch.canvas {
            CanvasPlane::Narrow(canvas) => self.compose(
                canvas,
                &geometry,
                &scratch.cell_indices,
                &scratch.cell_colors,
                &mut scratch.output,
            ),
            CanvasPlane::Wide(canvas) => self.compose(
                canvas,
                &geometry,
                &scratch.cell_indices,
                &scratch.cell_colors,
                &mut scratch.output,
            ),
        }

        let grid = CharacterGrid::from_indices(
            &scratch.cell_indices,
            geometry.columns as usize,
            self.atlas.chars(),
        );
        let image = ImageBuffer::from_raw(
            geometry.output_width(),
            geometry.output_height(),
            scratch.output.as_slice(),
        )
        .ok_or(AsciiError::ShapeMismatch {
            width: geometry.output_width(),
            height: geometry.output_height(),
            expected: geometry.output_width() as usize * geometry.output_height() as usize * 3,
            actual: scratch.output.len(),
        })?;

        Ok(Rasterized { image, grid, indices: &scratch.cell_indices })
    }

    /// Nearest-pixel sampling: one source pixel per cell picks the glyph and the color.
    fn sample_cells(
        &self,
        frame: &RgbImage,
        geometry: &CellGeometry,
        indices: &mut [u32],
        colors: &mut [[u8; 3]],
    ) {
        let polarity = self.atlas.polarity();
        for row in 0..geometry.rows {
            for column in 0..geometry.columns {
                let cell = (row * geometry.columns + column) as usize;
                let (x, y) = geometry.sample_point(column, row);
                let pixel = frame.get_pixel(x, y).0;

                indices[cell] = self.mapper.index_for_pixel(pixel);
                colors[cell] = polarity.apply_rgb(self.options.monochrome.unwrap_or(pixel));
            }
        }
    }

    /// Tiles cell colors over the canvas, then multiplies in the glyph pixels.
    fn compose<T: CanvasElement>(
        &self,
        canvas: &mut [T],
        geometry: &CellGeometry,
        indices: &[u32],
        colors: &[[u8; 3]],
        output: &mut [u8],
    ) {
        let canvas_width = geometry.canvas_width() as usize;
        let glyph_width = geometry.glyph_width as usize;
        let glyph_height = geometry.glyph_height as usize;
        let columns = geometry.columns as usize;

        for (y, line) in canvas.chunks_exact_mut(canvas_width * 3).enumerate() {
            let cell_row = (y / glyph_height) * columns;
            for (x, px) in line.chunks_exact_mut(3).enumerate() {
                let color = colors[cell_row + x / glyph_width];
                for (slot, &channel) in px.iter_mut().zip(color.iter()) {
                    *slot = T::from_u32(u32::from(channel));
                }
            }
        }

        let polarity = self.atlas.polarity();
        let output_width = geometry.output_width() as usize;
        let output_height = geometry.output_height() as usize;
        for y in 0..output_height {
            let cell_row = (y / glyph_height) * columns;
            let glyph_row = (y % glyph_height) * glyph_width;
            for x in 0..output_width {
                let index = indices[cell_row + x / glyph_width] as usize;
                let glyph = u32::from(self.atlas.bitmap(index)[glyph_row + x % glyph_width]);

                let canvas_px = (y * canvas_width + x) * 3;
                let output_px = (y * output_width + x) * 3;
                for channel in 0..3 {
                    let blended = glyph * canvas[canvas_px + channel].to_u32() / 255;
                    canvas[canvas_px + channel] = T::from_u32(blended);
                    output[output_px + channel] = polarity.apply(blended.min(255) as u8);
                }
            }
        }
    }
}
