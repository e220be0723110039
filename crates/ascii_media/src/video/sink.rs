use std::path::PathBuf;

use image::RgbImage;

use crate::image_pipeline::loader::frame_from_raw;
use crate::AsciiError;

/// Configuration handed to a [`FrameSink`] before the first frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SinkConfig {
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl SinkConfig {
    pub fn frame_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Consumer of rendered frames.
///
/// `push_frame` receives packed `rgb24` data in strictly increasing index order.
pub trait FrameSink {
    fn begin(&mut self, config: SinkConfig) -> Result<(), AsciiError>;
    fn push_frame(&mut self, index: u64, rgb: &[u8]) -> Result<(), AsciiError>;
    fn end(&mut self) -> Result<(), AsciiError>;
}

/// Keeps every frame in memory.
#[derive(Debug, Default)]
pub struct InMemorySink {
    config: Option<SinkConfig>,
    frames: Vec<(u64, RgbImage)>,
    finished: bool,
}

impl InMemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn config(&self) -> Option<SinkConfig> {
        self.config
    }

    pub fn frames(&self) -> &[(u64, RgbImage)] {
        &self.frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }
}

impl FrameSink for InMemorySink {
    fn begin(&mut self, config: SinkConfig) -> Result<(), AsciiError> {
        self.config = Some(config);
        self.frames.clear();
        self.finished = false;
        Ok(())
    }

    fn push_frame(&mut self, index: u64, rgb: &[u8]) -> Result<(), AsciiError> {
        let config = self.config.ok_or_else(|| AsciiError::Encode("sink not started".into()))?;
        let image = frame_from_raw(config.width, config.height, rgb.to_vec())?;
        self.frames.push((index, image));
        Ok(())
    }

    fn end(&mut self) -> Result<(), AsciiError> {
        self.finished = true;
        Ok(())
    }
}

/// Writes a single frame as a still image; format follows the file extension.
#[derive(Debug)]
pub struct ImageFileSink {
    path: PathBuf,
    config: Option<SinkConfig>,
    written: bool,
}

impl ImageFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into(), config: None, written: false }
    }
}

impl FrameSink for ImageFileSink {
    fn begin(&mut self, config: SinkConfig) -> Result<(), AsciiError> {
        self.config = Some(config);
        self.written = false;
        Ok(())
    }

    fn push_frame(&mut self, _index: u64, rgb: &[u8]) -> Result<(), AsciiError> {
        let config = self.config.ok_or_else(|| AsciiError::Encode("sink not started".into()))?;
        if self.written {
            return Err(AsciiError::Encode(format!(
                "{} takes exactly one frame",
                self.path.display()
            )));
        }

        frame_from_raw(config.width, config.height, rgb.to_vec())?.save(&self.path)?;
        self.written = true;
        Ok(())
    }

    fn end(&mut self) -> Result<(), AsciiError> {
        if !self.written {
            return Err(AsciiError::Encode(format!("no frame written to {}", self.path.display())));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn in_memory_sink_checks_frame_length() {
        let mut sink = InMemorySink::new();
        sink.begin(SinkConfig { width: 2, height: 1, frame_rate: 10.0 }).unwrap();
        sink.push_frame(0, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert!(matches!(sink.push_frame(1, &[1, 2, 3]), Err(AsciiError::ShapeMismatch { .. })));
        sink.end().unwrap();

        assert!(sink.is_finished());
        assert_eq!(sink.frames().len(), 1);
        assert_eq!(sink.frames()[0].1.get_pixel(1, 0).0, [4, 5, 6]);
    }

    #[test]
    fn image_sink_writes_one_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.png");
        let mut sink = ImageFileSink::new(&path);

        sink.begin(SinkConfig { width: 1, height: 1, frame_rate: 1.0 }).unwrap();
        sink.push_frame(0, &[7, 8, 9]).unwrap();
        assert!(sink.push_frame(1, &[7, 8, 9]).is_err());
        sink.end().unwrap();

        let written = image::open(&path).unwrap().to_rgb8();
        assert_eq!(written.get_pixel(0, 0).0, [7, 8, 9]);
    }

    #[test]
    fn image_sink_without_frames_fails() {
        let mut sink = ImageFileSink::new("unused.png");
        sink.begin(SinkConfig { width: 1, height: 1, frame_rate: 1.0 }).unwrap();
        assert!(sink.end().is_err());
    }
}
