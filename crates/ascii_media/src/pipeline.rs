use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use image::RgbImage;
use log::{debug, info, warn};
use rayon::prelude::*;

use crate::ascii::grid::CharacterGrid;
use crate::ascii::raster::{FrameRasterizer, ScratchBuffer, ScratchSlot};
use crate::ascii::series::CharacterRecord;
use crate::image_pipeline::loader::FrameSource;
use crate::video::sink::{FrameSink, SinkConfig};
use crate::AsciiError;

/// Frames decoded ahead per worker in parallel mode.
const FRAMES_PER_WORKER: usize = 2;

type RenderedFrame = Result<(RgbImage, CharacterGrid), AsciiError>;

/// Outcome of a [`PipelineDriver::run`].
#[derive(Debug, Default)]
pub struct PipelineReport {
    pub record: CharacterRecord,
    pub frames: u64,
    pub cancelled: bool,
    /// Scratch buffers allocated over the run, one per worker.
    pub scratch_buffers: usize,
}

/// Handed to the progress callback after every frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
    pub frames: u64,
    /// Frame count the source expects to produce, if it knows.
    pub expected: Option<u64>,
}

/// Drives decode, rasterize and encode over a frame stream.
///
/// Decoding and encoding are serial; frames reach the sink in arrival order.
/// With more than one worker, batches of frames are rasterized on a thread
/// pool. Each worker owns one scratch buffer for the whole run.
pub struct PipelineDriver {
    rasterizer: FrameRasterizer,
    workers: usize,
    cancel: Option<Arc<AtomicBool>>,
}

impl PipelineDriver {
    pub fn new(rasterizer: FrameRasterizer) -> Self {
        Self { rasterizer, workers: 1, cancel: None }
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    /// Checked at every frame boundary; once set the run stops early.
    pub fn cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn rasterizer(&self) -> &FrameRasterizer {
        &self.rasterizer
    }

    pub fn run<S, K>(&self, source: &mut S, sink: &mut K) -> Result<PipelineReport, AsciiError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
    {
        self.run_with_progress(source, sink, |_| {})
    }

    /// Like [`run`](Self::run), calling `on_frame` after every frame.
    pub fn run_with_progress<S, K, F>(
        &self,
        source: &mut S,
        sink: &mut K,
        mut on_frame: F,
    ) -> Result<PipelineReport, AsciiError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
        F: FnMut(Progress),
    {
        let mut report = PipelineReport::default();
        let expected = source.frame_count_hint();
        let mut notify = |frames: u64| on_frame(Progress { frames, expected });

        let Some(first) = source.next_frame()? else {
            warn!("frame source produced no frames");
            return Ok(report);
        };

        // The first frame runs without a buffer to learn the output shape.
        let (image, grid, scratch) = self.rasterizer.rasterize_fresh(&first)?;
        let config = SinkConfig {
            width: image.width(),
            height: image.height(),
            frame_rate: source.frame_rate(),
        };
        debug!("stream output {}x{} @ {:.3} fps", config.width, config.height, config.frame_rate);

        sink.begin(config)?;
        sink.push_frame(0, image.as_raw())?;
        report.record.push(grid);
        report.frames = 1;
        report.scratch_buffers = 1;
        notify(report.frames);

        if self.workers > 1 {
            self.drive_parallel(source, sink, scratch, &mut report, &mut notify)?;
        } else {
            self.drive_serial(source, sink, scratch, &mut report, &mut notify)?;
        }

        sink.end()?;
        Ok(report)
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn drive_serial<S, K, F>(
        &self,
        source: &mut S,
        sink: &mut K,
        scratch: ScratchBuffer,
        report: &mut PipelineReport,
        on_frame: &mut F,
    ) -> Result<(), AsciiError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
        F: FnMut(u64),
    {
        let mut slot = ScratchSlot::new();
        slot.checkin(scratch);

        loop {
            if self.is_cancelled() {
                info!("cancelled after {} frames", report.frames);
                report.cancelled = true;
                return Ok(());
            }

            let Some(frame) = source.next_frame()? else {
                return Ok(());
            };

            let mut scratch = slot
                .checkout()
                .ok_or_else(|| AsciiError::Config("scratch buffer is already checked out".into()))?;
            let result = self.rasterizer.rasterize(&frame, &mut scratch)?;
            sink.push_frame(report.frames, result.image.as_raw())?;
            report.record.push(result.grid);
            slot.checkin(scratch);

            report.frames += 1;
            on_frame(report.frames);
        }
    }

    fn drive_parallel<S, K, F>(
        &self,
        source: &mut S,
        sink: &mut K,
        first: ScratchBuffer,
        report: &mut PipelineReport,
        on_frame: &mut F,
    ) -> Result<(), AsciiError>
    where
        S: FrameSource + ?Sized,
        K: FrameSink + ?Sized,
        F: FnMut(u64),
    {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.workers)
            .build()
            .map_err(|err| AsciiError::Config(format!("failed to start worker pool: {err}")))?;
        let rasterizer = &self.rasterizer;

        let geometry = first.geometry();
        let element_width = first.element_width();
        let mut scratches = Vec::with_capacity(self.workers);
        scratches.push(first);
        scratches.resize_with(self.workers, || ScratchBuffer::new(geometry, element_width));
        report.scratch_buffers = scratches.len();

        let batch_size = self.workers * FRAMES_PER_WORKER;
        debug!("rasterizing on {} workers, {} frames per batch", self.workers, batch_size);

        loop {
            let mut batch = Vec::with_capacity(batch_size);
            let mut exhausted = false;
            while batch.len() < batch_size {
                if self.is_cancelled() {
                    report.cancelled = true;
                    break;
                }
                match source.next_frame()? {
                    Some(frame) => batch.push(frame),
                    None => {
                        exhausted = true;
                        break;
                    },
                }
            }

            // Chunk `i` always runs on scratch `i`, so no buffer is shared.
            let rendered: Vec<Vec<RenderedFrame>> = pool.install(|| {
                batch
                    .par_chunks(FRAMES_PER_WORKER)
                    .zip(scratches.par_iter_mut())
                    .map(|(frames, scratch)| {
                        frames
                            .iter()
                            .map(|frame| -> RenderedFrame {
                                let result = rasterizer.rasterize(frame, scratch)?;
                                Ok((result.to_image(), result.grid))
                            })
                            .collect()
                    })
                    .collect()
            });

            for item in rendered.into_iter().flatten() {
                let (image, grid) = item?;
                sink.push_frame(report.frames, image.as_raw())?;
                report.record.push(grid);
                report.frames += 1;
                on_frame(report.frames);
            }

            if report.cancelled {
                info!("cancelled after {} frames", report.frames);
                return Ok(());
            }
            if exhausted {
                return Ok(());
            }
        }
    }
}
