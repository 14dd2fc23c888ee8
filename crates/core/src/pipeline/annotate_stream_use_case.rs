use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::annotation::domain::frame_annotator::{FrameAnnotator, StreamStatus};
use crate::detection::domain::face_locator::FaceLocator;
use crate::inference::domain::classification_job::ClassificationRequest;
use crate::inference::domain::face_context::FaceContext;
use crate::inference::infrastructure::classifier_pool::{ClassifierPool, DispatchError};
use crate::shared::frame::Frame;
use crate::tracking::domain::face_slot::FaceSlot;
use crate::video::domain::frame_sink::FrameSink;
use crate::video::domain::frame_source::FrameSource;

use super::pipeline_logger::{NullPipelineLogger, PipelineLogger};

const FPS_WINDOW: usize = 30;

/// What happened during one run.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct StreamSummary {
    pub frames: usize,
    pub dispatches: usize,
    /// Dispatches dropped because the request queue was full.
    pub shed: usize,
    pub results_applied: usize,
    pub locator_failures: usize,
    pub sink_failures: usize,
    /// Set when the source failed mid-stream and the run ended early.
    pub source_error: Option<String>,
}

/// Runs the live annotation loop: locate, track, schedule, classify in the
/// background, annotate and emit every frame.
///
/// Single use: `execute` consumes the source and the pool.
pub struct AnnotateStreamUseCase {
    source: Option<Box<dyn FrameSource>>,
    locator: Box<dyn FaceLocator>,
    pool: Option<ClassifierPool>,
    annotator: Box<dyn FrameAnnotator>,
    sink: Box<dyn FrameSink>,
    context: FaceContext,
    logger: Box<dyn PipelineLogger>,
    cancelled: Arc<AtomicBool>,
    max_frames: Option<usize>,
}

impl AnnotateStreamUseCase {
    pub fn new(
        source: Box<dyn FrameSource>,
        locator: Box<dyn FaceLocator>,
        pool: ClassifierPool,
        annotator: Box<dyn FrameAnnotator>,
        sink: Box<dyn FrameSink>,
        context: FaceContext,
    ) -> Self {
        Self {
            source: Some(source),
            locator,
            pool: Some(pool),
            annotator,
            sink,
            context,
            logger: Box::new(NullPipelineLogger),
            cancelled: Arc::new(AtomicBool::new(false)),
            max_frames: None,
        }
    }

    pub fn with_logger(mut self, logger: Box<dyn PipelineLogger>) -> Self {
        self.logger = logger;
        self
    }

    /// The loop stops before the next frame once the flag is set.
    pub fn with_cancel_flag(mut self, cancelled: Arc<AtomicBool>) -> Self {
        self.cancelled = cancelled;
        self
    }

    pub fn with_max_frames(mut self, max_frames: Option<usize>) -> Self {
        self.max_frames = max_frames;
        self
    }

    pub fn context(&self) -> &FaceContext {
        &self.context
    }

    /// Opens source and sink, runs until the source ends, fails, is
    /// cancelled or hits the frame limit, then drains the pool and closes
    /// everything. Only opening errors are returned; everything later is
    /// absorbed and reported in the summary.
    pub fn execute(&mut self) -> Result<StreamSummary, Box<dyn std::error::Error>> {
        let mut source = self.source.take().ok_or("Stream already executed")?;
        let pool = self.pool.take().ok_or("Stream already executed")?;

        let metadata = source.open()?;
        if let Err(e) = self.sink.open(&metadata) {
            source.close();
            return Err(e.into());
        }
        let total = match (metadata.total_frames, self.max_frames) {
            (0, _) => 0,
            (n, Some(max)) => n.min(max),
            (n, None) => n,
        };
        self.logger.info(&format!(
            "Annotating {}x{} @ {:.1} fps{}",
            metadata.width,
            metadata.height,
            metadata.fps,
            if metadata.is_live() { " (live)" } else { "" }
        ));

        let mut summary = StreamSummary::default();
        let mut fps = FpsMeter::new(FPS_WINDOW);
        {
            let mut frames = source.frames();
            loop {
                if self.cancelled.load(Ordering::Relaxed) {
                    self.logger.info("Cancelled");
                    break;
                }
                if self.max_frames.is_some_and(|max| summary.frames >= max) {
                    break;
                }
                let frame = match frames.next() {
                    None => break,
                    Some(Ok(frame)) => frame,
                    Some(Err(e)) => {
                        log::warn!("Source failed after {} frames: {e}", summary.frames);
                        summary.source_error = Some(e.to_string());
                        break;
                    }
                };
                self.process_frame(frame, &pool, &mut summary, &mut fps);
                self.logger.progress(summary.frames, total);
            }
        }

        let grace = self.context.scheduler().config().inference_timeout;
        for response in pool.shutdown(grace) {
            if self.context.apply_response(response) {
                summary.results_applied += 1;
            }
        }
        if let Err(e) = self.sink.close() {
            log::warn!("Closing sink failed: {e}");
            summary.sink_failures += 1;
        }
        source.close();

        self.logger.count("dispatched", summary.dispatches);
        self.logger.count("shed", summary.shed);
        self.logger.count("results applied", summary.results_applied);
        self.logger.count("locator failures", summary.locator_failures);
        self.logger.count("sink failures", summary.sink_failures);
        self.logger.summary();
        Ok(summary)
    }

    fn process_frame(
        &mut self,
        mut frame: Frame,
        pool: &ClassifierPool,
        summary: &mut StreamSummary,
        fps: &mut FpsMeter,
    ) {
        let frame_index = summary.frames;

        let t = Instant::now();
        let boxes = match self.locator.locate(&frame) {
            Ok(boxes) => boxes,
            Err(e) => {
                log::warn!("Face location failed on frame {frame_index}: {e}");
                summary.locator_failures += 1;
                Vec::new()
            }
        };
        self.logger.timing("locate", elapsed_ms(t));

        let slots = self.context.observe(&boxes, frame_index);
        self.logger.metric("faces", slots.len() as f64);

        let t = Instant::now();
        self.dispatch_due(&frame, &slots, frame_index, pool, summary);
        for response in pool.drain() {
            self.logger
                .timing("classify", response.elapsed.as_secs_f64() * 1000.0);
            if self.context.apply_response(response) {
                summary.results_applied += 1;
            }
        }
        self.logger.timing("schedule", elapsed_ms(t));

        let t = Instant::now();
        self.annotator
            .render(&mut frame, &slots, self.context.cache());
        let status = StreamStatus {
            fps: fps.tick(Instant::now()),
            frame_index,
            faces: slots.len(),
        };
        self.annotator.render_status(&mut frame, &status);
        self.logger.timing("annotate", elapsed_ms(t));

        let t = Instant::now();
        if let Err(e) = self.sink.write(&frame) {
            log::warn!("Sink write failed on frame {frame_index}: {e}");
            summary.sink_failures += 1;
        }
        self.logger.timing("sink", elapsed_ms(t));

        summary.frames += 1;
    }

    fn dispatch_due(
        &mut self,
        frame: &Frame,
        slots: &[FaceSlot],
        frame_index: usize,
        pool: &ClassifierPool,
        summary: &mut StreamSummary,
    ) {
        let now = Instant::now();
        for id in self.context.due(slots, frame_index, now) {
            let Some(slot) = slots.iter().find(|s| s.id == id) else {
                continue;
            };
            let Some(crop) = frame.crop(&slot.bbox) else {
                log::debug!("Slot {id} is outside frame {frame_index}; not dispatched");
                continue;
            };
            let request = ClassificationRequest {
                slot: id,
                crop,
                frame_index,
            };
            match pool.submit(request) {
                Ok(()) => {
                    self.context.dispatched(id, frame_index, now);
                    summary.dispatches += 1;
                }
                Err(DispatchError::QueueFull) => {
                    log::debug!("Queue full; shed slot {id} at frame {frame_index}");
                    summary.shed += 1;
                }
                Err(e @ DispatchError::PoolClosed) => {
                    log::warn!("Cannot dispatch slot {id}: {e}");
                    summary.shed += 1;
                }
            }
        }
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

/// Frames per second over the last `window` frames.
struct FpsMeter {
    window: usize,
    stamps: VecDeque<Instant>,
}

impl FpsMeter {
    fn new(window: usize) -> Self {
        Self {
            window: window.max(2),
            stamps: VecDeque::with_capacity(window.max(2)),
        }
    }

    fn tick(&mut self, now: Instant) -> f64 {
        if self.stamps.len() == self.window {
            self.stamps.pop_front();
        }
        self.stamps.push_back(now);
        let (Some(first), Some(last)) = (self.stamps.front(), self.stamps.back()) else {
            return 0.0;
        };
        let span = last.duration_since(*first).as_secs_f64();
        if span > 0.0 {
            (self.stamps.len() - 1) as f64 / span
        } else {
            0.0
        }
    }
}
