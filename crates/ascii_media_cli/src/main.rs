use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use ascii_media::{
    detect_media, AsciiError, AsciiOptions, AsciiRenderer, AtlasConfig, CharacterGrid,
    CharacterRecord, Gradient, MediaKind, RasterOptions, VideoInfo, DEFAULT_FONT,
    DEFAULT_RECORD_PATH,
};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use walkdir::WalkDir;

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Parser, Debug)]
#[command(author, version, about = "Render images and videos as ASCII art")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Convert an image, a video or a directory of either
    Convert(ConvertArgs),
    /// Print a recorded character stream to the terminal
    Play(PlayArgs),
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Input file or directory
    input: PathBuf,
    /// Output file, or output directory when the input is a directory
    output: PathBuf,
    #[command(flatten)]
    settings: RenderSettings,
    /// Copy the audio track of the input into the output video
    #[arg(short, long)]
    audio: bool,
    /// Output video quality (0 worst, 10 best)
    #[arg(
        short,
        long,
        default_value_t = 5,
        value_parser = clap::value_parser!(u8).range(0..=10)
    )]
    quality: u8,
    /// Rasterization threads for video frames
    #[arg(long, default_value_t = 1)]
    workers: usize,
    /// Also write the character record for still images
    #[arg(long)]
    record_still: bool,
    /// Where the character record is written
    #[arg(long, default_value = DEFAULT_RECORD_PATH)]
    record: PathBuf,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    /// Character record written by `convert`
    #[arg(default_value = DEFAULT_RECORD_PATH)]
    record: PathBuf,
    /// Delay between frames in milliseconds
    #[arg(long, default_value_t = 100, value_parser = clap::value_parser!(u64).range(1..))]
    interval_ms: u64,
    /// Number of passes; loops until interrupted when omitted
    #[arg(long)]
    loops: Option<u32>,
    /// First frame to show
    #[arg(long, default_value_t = 0)]
    start: usize,
    /// Frame to stop before
    #[arg(long)]
    end: Option<usize>,
}

#[derive(Parser, Debug, Clone)]
struct RenderSettings {
    /// Characters to draw with, densest first; overrides --gradient
    #[arg(long = "chars")]
    chars: Option<String>,
    /// Character preset used when --chars is not given
    #[arg(long, value_enum, default_value = "standard")]
    gradient: GradientPreset,
    /// Reverse the character order
    #[arg(short, long)]
    reverse: bool,
    /// Font size in pixels
    #[arg(short = 'f', long, default_value_t = 20, allow_negative_numbers = true)]
    font_size: i64,
    /// Stroke boldness in pixels
    #[arg(short = 'b', long = "bold", default_value_t = 2, allow_negative_numbers = true)]
    bold: i64,
    /// Background level, 255 (white) or 0 (black)
    #[arg(long, default_value_t = 255, allow_negative_numbers = true)]
    background: i64,
    /// Draw every character in one color, given as "R,G,B"
    #[arg(short, long, value_parser = parse_rgb)]
    monochrome: Option<[u8; 3]>,
    /// Keep the padded canvas instead of cropping to the input size
    #[arg(long)]
    no_clip: bool,
    /// TrueType or OpenType font file
    #[arg(long, env = "ASCII_MEDIA_FONT", default_value = DEFAULT_FONT)]
    font: PathBuf,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum GradientPreset {
    Standard,
    Detailed,
    Blocks,
    Binary,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cancel = Arc::new(AtomicBool::new(false));
    let handler_flag = cancel.clone();
    ctrlc::set_handler(move || {
        handler_flag.store(true, Ordering::Relaxed);
    })
    .context("failed to install Ctrl-C handler")?;

    match cli.command {
        Commands::Convert(args) => convert(args, cancel),
        Commands::Play(args) => play(args, cancel),
    }
}

fn convert(args: ConvertArgs, cancel: Arc<AtomicBool>) -> Result<()> {
    let options = args.to_options()?;
    let renderer = AsciiRenderer::new(options).context("failed to prepare glyph atlas")?;

    if !args.input.is_dir() {
        return convert_file(&renderer, &args.input, &args.output, &cancel);
    }

    std::fs::create_dir_all(&args.output)
        .with_context(|| format!("failed to create output directory {:?}", args.output))?;

    let mut entries: Vec<PathBuf> = WalkDir::new(&args.input)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .map(|entry| entry.path().to_path_buf())
        .collect();
    entries.sort();
    if entries.is_empty() {
        bail!("no files found in {:?}", args.input);
    }

    let progress = ProgressBar::new(entries.len() as u64);
    progress.set_style(bar_style(
        "{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files",
    ));

    let mut failures = 0usize;
    for entry in &entries {
        if cancel.load(Ordering::Relaxed) {
            warn!("batch interrupted");
            break;
        }

        let Some(name) = entry.file_name() else {
            continue;
        };
        let output = args.output.join(name);
        if let Err(err) = convert_file(&renderer, entry, &output, &cancel) {
            error!("{}: {err:#}", entry.display());
            failures += 1;
        }
        progress.inc(1);
    }
    progress.finish_and_clear();

    if failures > 0 {
        bail!("{failures} of {} files failed", entries.len());
    }
    info!("converted {} files into {:?}", entries.len(), args.output);
    Ok(())
}

fn convert_file(
    renderer: &AsciiRenderer,
    input: &Path,
    output: &Path,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    let kind = detect_media(input).with_context(|| format!("failed to inspect {:?}", input))?;
    match kind {
        MediaKind::StillImage(image) => {
            renderer
                .convert_still(image, output)
                .with_context(|| format!("failed to render {:?}", input))?;
            info!("wrote {:?}", output);
        },
        MediaKind::VideoStream(info) => convert_video(renderer, info, output, cancel)?,
        MediaKind::Unrecognized => {
            return Err(AsciiError::Unrecognized(input.to_path_buf()).into());
        },
    }
    Ok(())
}

fn convert_video(
    renderer: &AsciiRenderer,
    info: VideoInfo,
    output: &Path,
    cancel: &Arc<AtomicBool>,
) -> Result<()> {
    let input = info.path.clone();
    let progress = ProgressBar::no_length();
    progress.set_style(bar_style(
        "{spinner} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} frames ({per_sec})",
    ));

    let report = renderer
        .convert_video(info, output, Some(cancel.clone()), |update| {
            if let Some(expected) = update.expected {
                progress.set_length(expected.max(update.frames));
            }
            progress.set_position(update.frames);
        })
        .with_context(|| format!("failed to render {:?}", input))?;
    progress.finish_and_clear();

    if report.cancelled {
        warn!("stopped after {} frames, {:?} is partial", report.frames, output);
    } else {
        info!("wrote {} frames to {:?}", report.frames, output);
    }
    Ok(())
}

fn play(args: PlayArgs, cancel: Arc<AtomicBool>) -> Result<()> {
    let record = CharacterRecord::load(&args.record)
        .with_context(|| format!("failed to load character record {:?}", args.record))?;
    let clip: CharacterRecord =
        record.slice(args.start, args.end.unwrap_or(record.len())).iter().cloned().collect();
    if clip.is_empty() {
        bail!("no frames to play in {:?}", args.record);
    }

    let interval = Duration::from_millis(args.interval_ms);
    let stdout = io::stdout();
    let started = Instant::now();
    let mut shown: Option<&CharacterGrid> = None;
    while !cancel.load(Ordering::Relaxed) {
        let elapsed = started.elapsed();
        let Some(grid) = due_frame(&clip, elapsed, interval, args.loops) else {
            break;
        };

        if !shown.is_some_and(|previous| std::ptr::eq(previous, grid)) {
            let mut out = stdout.lock();
            write!(out, "{CLEAR_SCREEN}")?;
            for row in grid.rows() {
                writeln!(out, "{row}")?;
            }
            out.flush()?;
            shown = Some(grid);
        }

        // Wake on the next frame boundary.
        let into_frame = elapsed.as_nanos() % interval.as_nanos();
        thread::sleep(interval - Duration::from_nanos(into_frame as u64));
    }
    Ok(())
}

/// Frame due `elapsed` into playback, or `None` once `loops` passes are over.
fn due_frame(
    clip: &CharacterRecord,
    elapsed: Duration,
    interval: Duration,
    loops: Option<u32>,
) -> Option<&CharacterGrid> {
    if let Some(loops) = loops {
        if elapsed >= clip.total_duration(interval).saturating_mul(loops) {
            return None;
        }
    }
    clip.frame_at(elapsed, interval)
}

fn bar_style(template: &str) -> ProgressStyle {
    ProgressStyle::with_template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("=> ")
}

fn parse_rgb(value: &str) -> Result<[u8; 3], String> {
    let parts: Vec<&str> = value.split(',').map(str::trim).collect();
    let [r, g, b] = parts.as_slice() else {
        return Err(format!("expected \"R,G,B\", got {value:?}"));
    };

    let channel = |part: &str| {
        part.parse::<u8>().map_err(|_| format!("color channel {part:?} is not in 0..=255"))
    };
    Ok([channel(r)?, channel(g)?, channel(b)?])
}

impl ConvertArgs {
    fn to_options(&self) -> Result<AsciiOptions> {
        let settings = &self.settings;
        let gradient = match &settings.chars {
            Some(chars) => Gradient::new(chars)?,
            None => settings.gradient.to_gradient(),
        };
        let atlas = AtlasConfig::new(
            settings.font_size,
            settings.bold,
            settings.reverse,
            settings.background,
        )?;

        Ok(AsciiOptions {
            gradient,
            atlas,
            raster: RasterOptions { clip: !settings.no_clip, monochrome: settings.monochrome },
            font_path: settings.font.clone(),
            audio: self.audio,
            quality: self.quality,
            workers: self.workers.max(1),
            record_path: self.record.clone(),
            record_still: self.record_still,
        })
    }
}

impl GradientPreset {
    fn to_gradient(self) -> Gradient {
        match self {
            GradientPreset::Standard => Gradient::standard(),
            GradientPreset::Detailed => Gradient::detailed(),
            GradientPreset::Blocks => Gradient::blocks(),
            GradientPreset::Binary => Gradient::binary(),
        }
    }
}
