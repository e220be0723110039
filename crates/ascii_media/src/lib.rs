mod ascii;
mod image_pipeline;
mod pipeline;
mod video;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use image::RgbImage;
use log::{info, warn};

pub use ascii::{
    atlas::{AtlasConfig, GlyphAtlas},
    font::{FontRasterizer, GlyphBitmap, GlyphRasterizer},
    gradient::Gradient,
    grid::CharacterGrid,
    mapping::{ElementWidth, GlyphMapper},
    raster::{FrameRasterizer, RasterOptions, Rasterized, RgbView, ScratchBuffer, ScratchSlot},
    series::CharacterRecord,
};
pub use image_pipeline::{
    adjust::{weighted_luma, Polarity, LUMA_WEIGHTS, MAX_LUMA},
    loader::{
        detect_media, frame_from_raw, FrameSequence, FrameSource, MediaKind, StaticFrame,
        DEFAULT_FRAME_RATE,
    },
    resize::CellGeometry,
};
pub use pipeline::{PipelineDriver, PipelineReport, Progress};
pub use video::{
    ffmpeg::{is_ffmpeg_on_path, EncoderOptions, FfmpegDecoder, FfmpegEncoder, VideoInfo},
    sink::{FrameSink, ImageFileSink, InMemorySink, SinkConfig},
};

/// Where video runs leave their character grids for the playback viewers.
pub const DEFAULT_RECORD_PATH: &str = "ascii_frames.json";

pub const DEFAULT_FONT: &str = "cour.ttf";

#[derive(Debug, thiserror::Error)]
pub enum AsciiError {
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("failed to load font {}: {reason}", path.display())]
    FontLoad { path: PathBuf, reason: String },
    #[error("failed to rasterize glyph {0:?}")]
    GlyphRaster(char),
    #[error("frame of {width}x{height} needs {expected} bytes, got {actual}")]
    ShapeMismatch { width: u32, height: u32, expected: usize, actual: usize },
    #[error("failed to process image: {0}")]
    Image(#[from] image::ImageError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("invalid character record: {0}")]
    Record(#[from] serde_json::Error),
    #[error("video decode failed: {0}")]
    Decode(String),
    #[error("video encode failed: {0}")]
    Encode(String),
    #[error("{} is neither an image nor a video", .0.display())]
    Unrecognized(PathBuf),
}

#[derive(Clone, Debug)]
pub struct AsciiOptions {
    pub gradient: Gradient,
    pub atlas: AtlasConfig,
    pub raster: RasterOptions,
    pub font_path: PathBuf,
    /// Carry the source audio track into video output.
    pub audio: bool,
    /// Video quality, 0 (worst) to 10 (best).
    pub quality: u8,
    /// Rasterization threads for video; 1 keeps everything on the caller's thread.
    pub workers: usize,
    pub record_path: PathBuf,
    /// Also write a one-frame record for still images.
    pub record_still: bool,
}

impl Default for AsciiOptions {
    fn default() -> Self {
        Self {
            gradient: Gradient::standard(),
            atlas: AtlasConfig::default(),
            raster: RasterOptions::default(),
            font_path: PathBuf::from(DEFAULT_FONT),
            audio: false,
            quality: 5,
            workers: 1,
            record_path: PathBuf::from(DEFAULT_RECORD_PATH),
            record_still: false,
        }
    }
}

#[derive(Clone, Debug)]
pub struct RenderOutput {
    pub image: RgbImage,
    pub grid: CharacterGrid,
}

/// Atlas plus options: everything needed to convert files.
pub struct AsciiRenderer {
    rasterizer: FrameRasterizer,
    options: AsciiOptions,
}

impl AsciiRenderer {
    /// Loads the configured font and builds the glyph atlas.
    pub fn new(options: AsciiOptions) -> Result<Self, AsciiError> {
        let font = FontRasterizer::open(&options.font_path, options.atlas.font_size)?;
        Self::with_rasterizer(&font, options)
    }

    pub fn with_rasterizer<R: GlyphRasterizer + ?Sized>(
        glyphs: &R,
        options: AsciiOptions,
    ) -> Result<Self, AsciiError> {
        let atlas = GlyphAtlas::build(glyphs, &options.gradient, &options.atlas)?;
        info!(
            "glyph atlas ready: {} glyphs of {}x{} px",
            atlas.len(),
            atlas.glyph_width(),
            atlas.glyph_height()
        );

        let rasterizer = FrameRasterizer::new(Arc::new(atlas), options.raster);
        Ok(Self { rasterizer, options })
    }

    pub fn atlas(&self) -> &GlyphAtlas {
        self.rasterizer.atlas()
    }

    pub fn options(&self) -> &AsciiOptions {
        &self.options
    }

    pub fn render_image(&self, image: &RgbImage) -> Result<RenderOutput, AsciiError> {
        let (image, grid, _) = self.rasterizer.rasterize_fresh(image)?;
        Ok(RenderOutput { image, grid })
    }

    pub fn render_path<P: AsRef<Path>>(&self, path: P) -> Result<RenderOutput, AsciiError> {
        let image = image::open(path)?.to_rgb8();
        self.render_image(&image)
    }

    /// Renders a still image to `output`; the format follows its extension.
    pub fn convert_still(
        &self,
        image: RgbImage,
        output: &Path,
    ) -> Result<PipelineReport, AsciiError> {
        let driver = PipelineDriver::new(self.rasterizer.clone());
        let mut sink = ImageFileSink::new(output);
        let report = driver.run(&mut StaticFrame::new(image), &mut sink)?;

        if self.options.record_still {
            report.record.save(&self.options.record_path)?;
        }
        Ok(report)
    }

    /// Renders a video stream to `output` and writes the character record.
    pub fn convert_video<F: FnMut(Progress)>(
        &self,
        info: VideoInfo,
        output: &Path,
        cancel: Option<Arc<AtomicBool>>,
        on_frame: F,
    ) -> Result<PipelineReport, AsciiError> {
        let mut encoder_options = EncoderOptions::new(output);
        encoder_options.quality = self.options.quality;
        if self.options.audio {
            if info.has_audio {
                encoder_options.audio_source = Some(info.path.clone());
            } else {
                warn!("{} has no audio track to copy", info.path.display());
            }
        }

        let mut driver = PipelineDriver::new(self.rasterizer.clone()).workers(self.options.workers);
        if let Some(flag) = cancel {
            driver = driver.cancel_flag(flag);
        }

        let mut decoder = FfmpegDecoder::spawn(info)?;
        let mut encoder = FfmpegEncoder::new(encoder_options);
        let report = driver.run_with_progress(&mut decoder, &mut encoder, on_frame)?;

        report.record.save(&self.options.record_path)?;
        Ok(report)
    }
}
