use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

use super::grid::CharacterGrid;
use crate::AsciiError;

/// Ordered character grids of a render, one per frame.
///
/// Persisted as a JSON array of frames, each an array of row strings. That
/// file is what the playback viewers read.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CharacterRecord {
    frames: Vec<CharacterGrid>,
}

impl CharacterRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn push(&mut self, grid: CharacterGrid) {
        if let Some(first) = self.frames.first() {
            debug_assert_eq!(first.height(), grid.height());
        }
        self.frames.push(grid);
    }

    pub fn frame(&self, index: usize) -> Option<&CharacterGrid> {
        self.frames.get(index)
    }

    pub fn frames(&self) -> &[CharacterGrid] {
        &self.frames
    }

    /// Frames `start..end`, clamped to the record.
    pub fn slice(&self, start: usize, end: usize) -> &[CharacterGrid] {
        let end = end.min(self.frames.len());
        &self.frames[start.min(end)..end]
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), AsciiError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let mut writer = BufWriter::new(File::create(path)?);
        serde_json::to_writer(&mut writer, &self.frames)?;
        writer.flush()?;
        Ok(())
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, AsciiError> {
        let reader = BufReader::new(File::open(path)?);
        let frames: Vec<CharacterGrid> = serde_json::from_reader(reader)?;
        Ok(Self { frames })
    }

    /// Length of one pass through the record at a fixed frame interval.
    pub fn total_duration(&self, interval: Duration) -> Duration {
        interval.saturating_mul(self.frames.len() as u32)
    }

    /// Frame shown after `elapsed` when looping at a fixed interval.
    pub fn frame_index_at(&self, elapsed: Duration, interval: Duration) -> Option<usize> {
        if self.frames.is_empty() {
            return None;
        }

        if self.frames.len() == 1 || interval.is_zero() {
            return Some(0);
        }

        let step = (elapsed.as_nanos() / interval.as_nanos()) as usize;
        Some(step % self.frames.len())
    }

    pub fn frame_at(&self, elapsed: Duration, interval: Duration) -> Option<&CharacterGrid> {
        let index = self.frame_index_at(elapsed, interval)?;
        self.frames.get(index)
    }
}

impl FromIterator<CharacterGrid> for CharacterRecord {
    fn from_iter<I: IntoIterator<Item = CharacterGrid>>(iter: I) -> Self {
        Self { frames: iter.into_iter().collect() }
    }
}
