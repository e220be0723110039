use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use log::{debug, warn};
use serde::Deserialize;

use super::sink::{FrameSink, SinkConfig};
use crate::image_pipeline::loader::{frame_from_raw, FrameSource, DEFAULT_FRAME_RATE};
use crate::AsciiError;

/// Stream metadata reported by `ffprobe`.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoInfo {
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
    pub frame_count: Option<u64>,
    pub has_audio: bool,
}

#[derive(Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    avg_frame_rate: Option<String>,
    r_frame_rate: Option<String>,
    nb_frames: Option<String>,
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

#[derive(Deserialize)]
struct ProbeOut {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

pub(crate) const FFPROBE: &str = "ffprobe";

/// Looks for a video stream in `path`, running `program` as ffprobe.
///
/// `Ok(None)` means ffprobe ran and found no video stream. Failing to run
/// it at all is an error.
pub(crate) fn find_video_stream(
    program: &str,
    path: &Path,
) -> Result<Option<VideoInfo>, AsciiError> {
    let out = Command::new(program)
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output()
        .map_err(|err| AsciiError::Decode(format!("failed to run {program}: {err}")))?;
    if !out.status.success() {
        debug!(
            "{program} rejected '{}': {}",
            path.display(),
            String::from_utf8_lossy(&out.stderr).trim()
        );
        return Ok(None);
    }

    parse_stream_info(path, &out.stdout)
}

fn parse_stream_info(path: &Path, json: &[u8]) -> Result<Option<VideoInfo>, AsciiError> {
    let parsed: ProbeOut = serde_json::from_slice(json)
        .map_err(|err| AsciiError::Decode(format!("ffprobe json parse failed: {err}")))?;

    let Some(video) =
        parsed.streams.iter().find(|stream| stream.codec_type.as_deref() == Some("video"))
    else {
        return Ok(None);
    };
    let width = video
        .width
        .filter(|&width| width > 0)
        .ok_or_else(|| AsciiError::Decode("missing video width from ffprobe".into()))?;
    let height = video
        .height
        .filter(|&height| height > 0)
        .ok_or_else(|| AsciiError::Decode("missing video height from ffprobe".into()))?;

    let frame_rate = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .unwrap_or(DEFAULT_FRAME_RATE);

    let duration = video
        .duration
        .as_deref()
        .or_else(|| parsed.format.as_ref().and_then(|format| format.duration.as_deref()))
        .and_then(|duration| duration.parse::<f64>().ok());
    let frame_count = video
        .nb_frames
        .as_deref()
        .and_then(|frames| frames.parse::<u64>().ok())
        .or_else(|| duration.map(|seconds| (frame_rate * seconds - 0.5).max(0.0) as u64));

    let has_audio =
        parsed.streams.iter().any(|stream| stream.codec_type.as_deref() == Some("audio"));

    Ok(Some(VideoInfo {
        path: path.to_path_buf(),
        width,
        height,
        frame_rate,
        frame_count,
        has_audio,
    }))
}

/// Parses `ffprobe` rationals such as `30000/1001`.
fn parse_rate(rate: &str) -> Option<f64> {
    let (num, den) = match rate.split_once('/') {
        Some((num, den)) => (num.trim().parse::<f64>().ok()?, den.trim().parse::<f64>().ok()?),
        None => (rate.trim().parse::<f64>().ok()?, 1.0),
    };
    let fps = num / den;
    (fps.is_finite() && fps > 0.0).then_some(fps)
}

/// Return `true` when `ffmpeg` can be invoked from `PATH`.
pub fn is_ffmpeg_on_path() -> bool {
    Command::new("ffmpeg")
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn drain_stderr(child: &mut Child) -> Option<JoinHandle<std::io::Result<Vec<u8>>>> {
    let mut stderr = child.stderr.take()?;
    Some(std::thread::spawn(move || {
        let mut bytes = Vec::new();
        stderr.read_to_end(&mut bytes)?;
        Ok(bytes)
    }))
}

fn collect_stderr(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>) -> String {
    let bytes = match handle.map(JoinHandle::join) {
        Some(Ok(Ok(bytes))) => bytes,
        _ => Vec::new(),
    };
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Decodes a video into `rgb24` frames through a child `ffmpeg`.
pub struct FfmpegDecoder {
    info: VideoInfo,
    child: Option<Child>,
    stdout: Option<ChildStdout>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
}

impl FfmpegDecoder {
    pub fn spawn(info: VideoInfo) -> Result<Self, AsciiError> {
        let mut child = Command::new("ffmpeg")
            .args(["-v", "error", "-nostdin", "-i"])
            .arg(&info.path)
            .args(["-an", "-f", "rawvideo", "-pix_fmt", "rgb24", "pipe:1"])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|err| {
                AsciiError::Decode(format!("failed to spawn ffmpeg (is it on PATH?): {err}"))
            })?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| AsciiError::Decode("failed to open ffmpeg stdout".into()))?;
        let stderr_drain = drain_stderr(&mut child);

        debug!(
            "decoding {} ({}x{} @ {:.3} fps)",
            info.path.display(),
            info.width,
            info.height,
            info.frame_rate
        );

        Ok(Self { info, child: Some(child), stdout: Some(stdout), stderr_drain })
    }

    fn finish(&mut self) -> Result<(), AsciiError> {
        drop(self.stdout.take());
        let Some(mut child) = self.child.take() else {
            return Ok(());
        };

        let status = child
            .wait()
            .map_err(|err| AsciiError::Decode(format!("failed to wait for ffmpeg: {err}")))?;
        let stderr = collect_stderr(self.stderr_drain.take());
        if !status.success() {
            return Err(AsciiError::Decode(format!("ffmpeg exited with status {status}: {stderr}")));
        }
        Ok(())
    }
}

impl FrameSource for FfmpegDecoder {
    fn frame_rate(&self) -> f64 {
        self.info.frame_rate
    }

    fn frame_count_hint(&self) -> Option<u64> {
        self.info.frame_count
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, AsciiError> {
        let Some(stdout) = self.stdout.as_mut() else {
            return Ok(None);
        };

        let frame_len = self.info.width as usize * self.info.height as usize * 3;
        let mut data = vec![0u8; frame_len];
        let mut filled = 0;
        while filled < frame_len {
            match stdout.read(&mut data[filled..]) {
                Ok(0) => break,
                Ok(read) => filled += read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }

        if filled == 0 {
            self.finish()?;
            return Ok(None);
        }

        data.truncate(filled);
        frame_from_raw(self.info.width, self.info.height, data).map(Some)
    }
}

impl Drop for FfmpegDecoder {
    fn drop(&mut self) {
        drop(self.stdout.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Options for [`FfmpegEncoder`].
#[derive(Clone, Debug)]
pub struct EncoderOptions {
    pub out_path: PathBuf,
    /// 0 (worst) to 10 (best).
    pub quality: u8,
    /// Take the audio track of this file, if it has one.
    pub audio_source: Option<PathBuf>,
}

impl EncoderOptions {
    pub fn new(out_path: impl Into<PathBuf>) -> Self {
        Self { out_path: out_path.into(), quality: 5, audio_source: None }
    }

    /// x264 constant rate factor for the configured quality.
    pub fn crf(&self) -> u32 {
        let quality = f64::from(self.quality.min(10));
        ((1.0 - quality / 10.0) * 51.0) as u32
    }
}

/// Encodes `rgb24` frames through a child `ffmpeg` (H.264, yuv420p).
pub struct FfmpegEncoder {
    opts: EncoderOptions,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr_drain: Option<JoinHandle<std::io::Result<Vec<u8>>>>,
    config: Option<SinkConfig>,
    last_index: Option<u64>,
}

impl FfmpegEncoder {
    pub fn new(opts: EncoderOptions) -> Self {
        Self { opts, child: None, stdin: None, stderr_drain: None, config: None, last_index: None }
    }

    fn command(&self, config: &SinkConfig) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.stdin(Stdio::piped()).stdout(Stdio::null()).stderr(Stdio::piped());
        cmd.args(["-y", "-loglevel", "error", "-f", "rawvideo", "-pix_fmt", "rgb24"])
            .args(["-s", &format!("{}x{}", config.width, config.height)])
            .args(["-r", &format!("{}", config.frame_rate)])
            .args(["-i", "pipe:0"]);

        if let Some(audio) = self.opts.audio_source.as_ref() {
            cmd.arg("-i").arg(audio).args(["-map", "0:v:0", "-map", "1:a:0?"]);
            cmd.args(["-c:a", "aac", "-shortest"]);
        } else {
            cmd.arg("-an");
        }

        // yuv420p needs even dimensions.
        cmd.args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"])
            .args(["-c:v", "libx264", "-pix_fmt", "yuv420p"])
            .args(["-crf", &self.opts.crf().to_string()]);

        let is_mp4 = self
            .opts
            .out_path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| matches!(ext.to_ascii_lowercase().as_str(), "mp4" | "mov" | "m4v"));
        if is_mp4 {
            cmd.args(["-movflags", "+faststart"]);
        }

        cmd.arg(&self.opts.out_path);
        cmd
    }
}

impl FrameSink for FfmpegEncoder {
    fn begin(&mut self, config: SinkConfig) -> Result<(), AsciiError> {
        if config.width == 0 || config.height == 0 {
            return Err(AsciiError::Encode("ffmpeg output width/height must be non-zero".into()));
        }
        if !(config.frame_rate.is_finite() && config.frame_rate > 0.0) {
            return Err(AsciiError::Encode("frame rate must be positive".into()));
        }
        if !is_ffmpeg_on_path() {
            return Err(AsciiError::Encode(
                "ffmpeg is required for video output, but was not found on PATH".into(),
            ));
        }
        if let Some(parent) = self.opts.out_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut child = self.command(&config).spawn().map_err(|err| {
            AsciiError::Encode(format!("failed to spawn ffmpeg (is it on PATH?): {err}"))
        })?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| AsciiError::Encode("failed to open ffmpeg stdin".into()))?;

        debug!(
            "encoding {} ({}x{} @ {:.3} fps, crf {})",
            self.opts.out_path.display(),
            config.width,
            config.height,
            config.frame_rate,
            self.opts.crf()
        );

        self.stderr_drain = drain_stderr(&mut child);
        self.child = Some(child);
        self.stdin = Some(stdin);
        self.config = Some(config);
        self.last_index = None;
        Ok(())
    }

    fn push_frame(&mut self, index: u64, rgb: &[u8]) -> Result<(), AsciiError> {
        let config = self
            .config
            .as_ref()
            .ok_or_else(|| AsciiError::Encode("ffmpeg sink not started".into()))?;
        if self.last_index.is_some_and(|last| index <= last) {
            return Err(AsciiError::Encode(format!("frame {index} arrived out of order")));
        }
        if rgb.len() != config.frame_len() {
            return Err(AsciiError::ShapeMismatch {
                width: config.width,
                height: config.height,
                expected: config.frame_len(),
                actual: rgb.len(),
            });
        }

        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| AsciiError::Encode("ffmpeg sink is already finalized".into()))?;
        stdin.write_all(rgb).map_err(|err| {
            AsciiError::Encode(format!("failed to write frame to ffmpeg stdin: {err}"))
        })?;
        self.last_index = Some(index);
        Ok(())
    }

    fn end(&mut self) -> Result<(), AsciiError> {
        drop(self.stdin.take());
        let mut child =
            self.child.take().ok_or_else(|| AsciiError::Encode("ffmpeg sink not started".into()))?;

        let status = child
            .wait()
            .map_err(|err| AsciiError::Encode(format!("failed to wait for ffmpeg: {err}")))?;
        let stderr = collect_stderr(self.stderr_drain.take());
        self.config = None;

        if !status.success() {
            return Err(AsciiError::Encode(format!("ffmpeg exited with status {status}: {stderr}")));
        }
        if !stderr.is_empty() {
            warn!("ffmpeg: {stderr}");
        }
        Ok(())
    }
}

impl Drop for FfmpegEncoder {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}
