use std::sync::Arc;

use ascii_media::{
    AsciiError, AsciiOptions, AsciiRenderer, AtlasConfig, ElementWidth, FrameRasterizer,
    FrameSequence, GlyphBitmap, GlyphRasterizer, Gradient, InMemorySink, PipelineDriver, Polarity,
    RasterOptions,
};
use image::{Rgb, RgbImage};

const CELL_WIDTH: u32 = 4;
const CELL_HEIGHT: u32 = 6;

/// Synthetic font: ink pixel count follows a lookup, natural boxes vary in size.
/// `#` is solid over its whole box.
struct CountingRasterizer;

impl CountingRasterizer {
    fn ink_pixels(ch: char) -> u32 {
        match ch {
            '@' => 20,
            '%' => 16,
            '*' => 12,
            '+' => 8,
            '-' => 4,
            '.' => 2,
            ' ' => 0,
            other => other as u32 % 23,
        }
    }
}

impl GlyphRasterizer for CountingRasterizer {
    fn rasterize(&self, ch: char, stroke_width: u32) -> Result<GlyphBitmap, AsciiError> {
        let width = CELL_WIDTH + ch as u32 % 2 + stroke_width;
        let height = CELL_HEIGHT + ch as u32 % 3;
        if ch == '#' {
            return Ok(GlyphBitmap::new(width, height, vec![255; (width * height) as usize]));
        }

        let inked = Self::ink_pixels(ch);
        let mut data = vec![0u8; (width * height) as usize];
        for y in 0..CELL_HEIGHT {
            for x in 0..CELL_WIDTH {
                if y * CELL_WIDTH + x < inked {
                    data[(y * width + x) as usize] = 255;
                }
            }
        }
        Ok(GlyphBitmap::new(width, height, data))
    }
}

fn renderer(chars: &str, reverse: bool, background: i64, raster: RasterOptions) -> AsciiRenderer {
    let options = AsciiOptions {
        gradient: Gradient::new(chars).unwrap(),
        atlas: AtlasConfig::new(20, 0, reverse, background).unwrap(),
        raster,
        ..AsciiOptions::default()
    };
    AsciiRenderer::with_rasterizer(&CountingRasterizer, options).unwrap()
}

fn shared(renderer: &AsciiRenderer) -> FrameRasterizer {
    FrameRasterizer::new(Arc::new(renderer.atlas().clone()), RasterOptions::default())
}

fn gradient_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let red = (x * 255 / width) as u8;
        let green = (y * 255 / height) as u8;
        Rgb([red, green, ((x + y) * 7) as u8])
    })
}

#[test]
fn atlas_holds_one_uniform_glyph_per_distinct_char() {
    let renderer = renderer("@%#*+=-:. @#", false, 255, RasterOptions::default());
    let atlas = renderer.atlas();

    assert_eq!(atlas.len(), 10);
    assert_eq!((atlas.glyph_width(), atlas.glyph_height()), (CELL_WIDTH, CELL_HEIGHT));
    for index in 0..atlas.len() {
        assert_eq!(atlas.bitmap(index).len(), (CELL_WIDTH * CELL_HEIGHT) as usize);
    }
}

#[test]
fn atlas_orders_by_ink_and_reverses() {
    let normal = renderer("-#. +", false, 255, RasterOptions::default());
    let reversed = renderer("-#. +", true, 255, RasterOptions::default());

    assert_eq!(normal.atlas().chars(), &['#', '+', '-', '.', ' ']);
    let mut expected: Vec<char> = normal.atlas().chars().to_vec();
    expected.reverse();
    assert_eq!(reversed.atlas().chars(), expected.as_slice());

    let inks: Vec<u64> = (0..normal.atlas().len()).map(|i| normal.atlas().ink(i)).collect();
    assert!(inks.windows(2).all(|pair| pair[0] >= pair[1]));
}

#[test]
fn ink_is_polarity_normalised() {
    let light = renderer("# ", false, 255, RasterOptions::default());
    let dark = renderer("# ", false, 0, RasterOptions::default());

    assert_eq!(light.atlas().chars(), dark.atlas().chars());
    assert_eq!(light.atlas().bitmap(0), dark.atlas().bitmap(0));
    assert_eq!(light.atlas().polarity(), Polarity::Light);
    assert_eq!(dark.atlas().polarity(), Polarity::Dark);
}

#[test]
fn rasterization_is_deterministic() {
    let renderer = renderer("@%#*+-. ", false, 255, RasterOptions::default());
    let frame = gradient_frame(37, 23);

    let first = renderer.render_image(&frame).unwrap();
    let second = renderer.render_image(&frame).unwrap();
    assert_eq!(first.image, second.image);
    assert_eq!(first.grid, second.grid);
}

#[test]
fn unclipped_canvas_is_whole_cells_and_clipped_matches_input() {
    let frame = gradient_frame(37, 23);

    let padded = renderer("#*. ", false, 255, RasterOptions { clip: false, monochrome: None })
        .render_image(&frame)
        .unwrap();
    assert_eq!(padded.image.width() % CELL_WIDTH, 0);
    assert_eq!(padded.image.height() % CELL_HEIGHT, 0);
    assert_eq!(padded.image.dimensions(), (40, 24));
    assert_eq!((padded.grid.width(), padded.grid.height()), (10, 4));

    let clipped =
        renderer("#*. ", false, 255, RasterOptions::default()).render_image(&frame).unwrap();
    assert_eq!(clipped.image.dimensions(), frame.dimensions());
    assert_eq!(clipped.grid, padded.grid);
}

#[test]
fn monochrome_output_only_uses_the_given_color() {
    let color = [200, 40, 90];
    let options = RasterOptions { clip: true, monochrome: Some(color) };
    let renderer = renderer("# ", false, 0, options);
    let output = renderer.render_image(&gradient_frame(30, 18)).unwrap();

    for pixel in output.image.pixels() {
        assert!(pixel.0 == color || pixel.0 == [0, 0, 0], "unexpected pixel {:?}", pixel.0);
    }
    assert!(output.image.pixels().any(|pixel| pixel.0 == color));
}

#[test]
fn monochrome_on_white_keeps_the_color_and_the_background() {
    let color = [200, 40, 90];
    let options = RasterOptions { clip: true, monochrome: Some(color) };
    let renderer = renderer("# ", false, 255, options);
    let output = renderer.render_image(&gradient_frame(30, 18)).unwrap();

    for pixel in output.image.pixels() {
        assert!(pixel.0 == color || pixel.0 == [255; 3], "unexpected pixel {:?}", pixel.0);
    }
    assert!(output.image.pixels().any(|pixel| pixel.0 == color));
    assert!(output.image.pixels().any(|pixel| pixel.0 == [255; 3]));
}

#[test]
fn grid_text_matches_glyph_indices() {
    let renderer = renderer("@%#*+-. ", false, 255, RasterOptions::default());
    let frame = gradient_frame(41, 29);
    let rasterizer = shared(&renderer);
    let mut scratch = rasterizer.scratch_for(frame.width(), frame.height()).unwrap();
    let result = rasterizer.rasterize(&frame, &mut scratch).unwrap();

    let columns = result.grid.width();
    let indices = result.glyph_indices();
    for (row, text) in result.grid.rows().iter().enumerate() {
        for (column, ch) in text.chars().enumerate() {
            let index = indices[row * columns + column] as usize;
            assert_eq!(renderer.atlas().chars()[index], ch);
        }
    }
}

#[test]
fn reused_scratch_matches_fresh_buffers() {
    let renderer = renderer("@%#*+-. ", false, 255, RasterOptions::default());
    let rasterizer = shared(&renderer);
    let first = gradient_frame(26, 14);
    let second = RgbImage::from_fn(26, 14, |x, y| Rgb([(y * 18) as u8, 255, (x * 9) as u8]));

    let mut scratch = rasterizer.scratch_for(26, 14).unwrap();
    drop(rasterizer.rasterize(&first, &mut scratch).unwrap());
    let reused = rasterizer.rasterize(&second, &mut scratch).unwrap();
    let (fresh_image, fresh_grid, _) = rasterizer.rasterize_fresh(&second).unwrap();

    assert_eq!(reused.to_image(), fresh_image);
    assert_eq!(reused.grid, fresh_grid);
}

#[test]
fn white_is_background_and_black_is_solid() {
    let renderer = renderer(" #", false, 255, RasterOptions::default());

    let white = renderer.render_image(&RgbImage::from_pixel(8, 12, Rgb([255; 3]))).unwrap();
    assert!(white.image.pixels().all(|pixel| pixel.0 == [255; 3]));
    assert!(white.grid.rows().iter().all(|row| row.chars().all(|ch| ch == ' ')));

    let black = renderer.render_image(&RgbImage::from_pixel(8, 12, Rgb([0; 3]))).unwrap();
    assert!(black.image.pixels().all(|pixel| pixel.0 == [0; 3]));
    assert!(black.grid.rows().iter().all(|row| row.chars().all(|ch| ch == '#')));
}

#[test]
fn large_character_sets_use_wide_scratch() {
    let chars: String = (0..40u32).filter_map(|i| char::from_u32('A' as u32 + i)).collect();
    let renderer = renderer(&chars, false, 255, RasterOptions::default());

    assert_eq!(renderer.atlas().element_width(), ElementWidth::U32);
    let output = renderer.render_image(&gradient_frame(20, 12)).unwrap();
    assert_eq!(output.image.dimensions(), (20, 12));
}

#[test]
fn invalid_settings_are_rejected() {
    assert!(matches!(AtlasConfig::new(0, 2, false, 255), Err(AsciiError::Config(_))));
    assert!(matches!(AtlasConfig::new(20, -1, false, 255), Err(AsciiError::Config(_))));
    assert!(matches!(AtlasConfig::new(20, 2, false, 128), Err(AsciiError::Config(_))));
    assert!(matches!(Gradient::new(""), Err(AsciiError::Config(_))));
}

#[test]
fn driver_records_every_frame_of_a_stream() {
    let renderer = renderer("@%#*+-. ", false, 255, RasterOptions::default());
    let rasterizer = shared(&renderer);
    let frames: Vec<RgbImage> = (0..6u8)
        .map(|i| RgbImage::from_pixel(12, 12, Rgb([i * 40, i * 40, i * 40])))
        .collect();
    let mut sink = InMemorySink::new();

    let report = PipelineDriver::new(rasterizer)
        .workers(2)
        .run(&mut FrameSequence::new(frames, 24.0), &mut sink)
        .unwrap();

    assert_eq!(report.frames, 6);
    assert_eq!(report.record.len(), 6);
    assert_eq!(sink.frames().len(), 6);
    assert_eq!(report.record.frame(0).unwrap().rows()[0], "###");
}
