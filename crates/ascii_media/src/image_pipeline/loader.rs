use std::collections::VecDeque;
use std::path::Path;

use image::io::Reader as ImageReader;
use image::RgbImage;
use log::debug;

use crate::video::ffmpeg::{find_video_stream, VideoInfo, FFPROBE};
use crate::AsciiError;

/// Frame rate assumed when a source carries no timing.
pub const DEFAULT_FRAME_RATE: f64 = 30.0;

/// Ordered supply of equally sized RGB frames.
///
/// `Ok(None)` marks the normal end of the stream.
pub trait FrameSource {
    fn frame_rate(&self) -> f64 {
        DEFAULT_FRAME_RATE
    }

    /// Expected number of frames, if the source knows it.
    fn frame_count_hint(&self) -> Option<u64> {
        None
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, AsciiError>;
}

/// A single still image, yielded once.
pub struct StaticFrame {
    image: Option<RgbImage>,
}

impl StaticFrame {
    pub fn new(image: RgbImage) -> Self {
        Self { image: Some(image) }
    }
}

impl FrameSource for StaticFrame {
    fn frame_count_hint(&self) -> Option<u64> {
        Some(1)
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, AsciiError> {
        Ok(self.image.take())
    }
}

/// In-memory frame stream.
pub struct FrameSequence {
    frame_rate: f64,
    total: u64,
    frames: VecDeque<RgbImage>,
}

impl FrameSequence {
    pub fn new(frames: Vec<RgbImage>, frame_rate: f64) -> Self {
        Self { frame_rate, total: frames.len() as u64, frames: frames.into() }
    }
}

impl FrameSource for FrameSequence {
    fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    fn frame_count_hint(&self) -> Option<u64> {
        Some(self.total)
    }

    fn next_frame(&mut self) -> Result<Option<RgbImage>, AsciiError> {
        Ok(self.frames.pop_front())
    }
}

/// Wraps raw `rgb24` bytes as a frame, checking the byte length.
pub fn frame_from_raw(width: u32, height: u32, data: Vec<u8>) -> Result<RgbImage, AsciiError> {
    let expected = width as usize * height as usize * 3;
    let actual = data.len();
    RgbImage::from_raw(width, height, data).ok_or(AsciiError::ShapeMismatch {
        width,
        height,
        expected,
        actual,
    })
}

/// What an input file turned out to be.
#[derive(Debug)]
pub enum MediaKind {
    StillImage(RgbImage),
    VideoStream(VideoInfo),
    Unrecognized,
}

/// Sniffs the file content: a decodable still image wins, then anything
/// `ffprobe` reports a video stream for.
///
/// A missing `ffprobe` is an error, not an unrecognized file.
pub fn detect_media(path: &Path) -> Result<MediaKind, AsciiError> {
    detect_media_with(path, FFPROBE)
}

pub(crate) fn detect_media_with(path: &Path, ffprobe: &str) -> Result<MediaKind, AsciiError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    if let Some(format) = reader.format() {
        match reader.decode() {
            Ok(image) => return Ok(MediaKind::StillImage(image.to_rgb8())),
            Err(err) => {
                debug!("{} looks like {format:?} but did not decode: {err}", path.display())
            },
        }
    }

    match find_video_stream(ffprobe, path)? {
        Some(info) => Ok(MediaKind::VideoStream(info)),
        None => {
            debug!("{} has no video stream", path.display());
            Ok(MediaKind::Unrecognized)
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_frame_length_is_checked() {
        assert!(frame_from_raw(2, 2, vec![0; 12]).is_ok());
        let err = frame_from_raw(2, 2, vec![0; 11]).unwrap_err();
        assert!(matches!(err, AsciiError::ShapeMismatch { expected: 12, actual: 11, .. }));
    }

    #[test]
    fn static_frame_yields_once() {
        let mut source = StaticFrame::new(RgbImage::new(3, 2));
        assert_eq!(source.frame_count_hint(), Some(1));
        assert!(source.next_frame().unwrap().is_some());
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn sequence_preserves_order() {
        let frames: Vec<RgbImage> =
            (0..3u8).map(|v| RgbImage::from_pixel(1, 1, image::Rgb([v, v, v]))).collect();
        let mut source = FrameSequence::new(frames, 24.0);
        assert_eq!(source.frame_count_hint(), Some(3));
        for expected in 0..3u8 {
            assert_eq!(source.next_frame().unwrap().unwrap().get_pixel(0, 0).0[0], expected);
        }
        assert!(source.next_frame().unwrap().is_none());
    }

    #[test]
    fn png_is_detected_as_still_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("input.png");
        RgbImage::from_pixel(4, 3, image::Rgb([1, 2, 3])).save(&path).unwrap();

        match detect_media(&path).unwrap() {
            MediaKind::StillImage(image) => assert_eq!(image.dimensions(), (4, 3)),
            other => panic!("unexpected media kind {other:?}"),
        }
    }

    // `false` stands in for an ffprobe that runs and rejects the file.
    #[cfg(unix)]
    #[test]
    fn rejected_by_ffprobe_is_unrecognized() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "not a picture").unwrap();

        assert!(matches!(detect_media_with(&path, "false").unwrap(), MediaKind::Unrecognized));
    }

    #[test]
    fn video_without_ffprobe_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("clip.mp4");
        let mut header = vec![0, 0, 0, 0x20];
        header.extend_from_slice(b"ftypisom\0\0\x02\0isomiso2avc1mp41");
        std::fs::write(&path, header).unwrap();

        let result = detect_media_with(&path, "/nonexistent/bin/ffprobe");
        assert!(matches!(result, Err(AsciiError::Decode(_))));
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = detect_media(Path::new("/nonexistent/input.png"));
        assert!(matches!(result, Err(AsciiError::Io(_))));
    }
}
