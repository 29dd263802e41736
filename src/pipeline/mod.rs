mod clock;
mod stats;

pub use clock::FrameClock;

use crate::capture::{fit_to, CaptureError, CaptureSource};
use crate::compositor::{compose, CompositeError};
use crate::frame::Frame;
use crate::mask::MaskCache;
use crate::output::PresentationSurface;
use crate::segmentation::{ConfidenceMask, InferenceError, SegmentationEngine};
use std::time::{Duration, Instant};
use stats::{StageTimes, TickStats};
use thiserror::Error;

/// Failure that persists across ticks and has to reach the user.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("no frame could be shown for {ticks} consecutive ticks (last error: {last})")]
    Stalled { ticks: u32, last: String },
}

/// Why a tick presented nothing. The previous frame stays on screen.
#[derive(Debug)]
pub enum SkipReason {
    EmptySurface,
    Capture(CaptureError),
    Composite(CompositeError),
}

#[derive(Debug)]
pub enum TickOutcome {
    /// A frame was presented; `degraded` means without background removal.
    Presented { degraded: bool },
    Skipped(SkipReason),
}

#[derive(Clone, Copy, Debug)]
pub struct PipelineConfig {
    /// Consecutive failed ticks before giving up; 0 never gives up.
    pub max_consecutive_failures: u32,
    pub stats_every: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 120,
            stats_every: 60,
        }
    }
}

/// Per-tick capture -> segment -> composite -> present orchestration.
///
/// Every stage runs synchronously inside `tick`, so a frame and its
/// confidence mask always come from the same tick.
pub struct Pipeline<C: CaptureSource> {
    capture: C,
    engine: Option<Box<dyn SegmentationEngine>>,
    masks: MaskCache,
    stats: TickStats,
    config: PipelineConfig,
    consecutive_failures: u32,
    engine_healthy: bool,
}

impl<C: CaptureSource> Pipeline<C> {
    pub fn new(
        capture: C,
        engine: Option<Box<dyn SegmentationEngine>>,
        masks: MaskCache,
        config: PipelineConfig,
    ) -> Self {
        match &engine {
            Some(engine) => tracing::info!("Segmentation enabled ({})", engine.name()),
            None => tracing::info!("Running in passthrough mode (no segmentation)"),
        }

        Self {
            capture,
            engine,
            masks,
            stats: TickStats::new(config.stats_every),
            config,
            consecutive_failures: 0,
            engine_healthy: true,
        }
    }

    #[cfg(test)]
    pub fn stats(&self) -> &TickStats {
        &self.stats
    }

    #[cfg(test)]
    pub fn masks(&self) -> &MaskCache {
        &self.masks
    }

    /// Run one tick against `surface`.
    ///
    /// Per-tick failures are absorbed into `TickOutcome::Skipped`; only a run
    /// of `max_consecutive_failures` skipped ticks is returned as an error.
    pub fn tick<S: PresentationSurface + ?Sized>(
        &mut self,
        surface: &mut S,
    ) -> Result<TickOutcome, PipelineError> {
        let _span = tracing::debug_span!("tick").entered();

        let (width, height) = surface.current_size();
        if width == 0 || height == 0 {
            return Ok(TickOutcome::Skipped(SkipReason::EmptySurface));
        }
        let circular = self.masks.get(width, height);

        let capture_start = Instant::now();
        let raw = match self.capture.acquire() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::debug!("Skipping tick: {}", e);
                return self.skip(SkipReason::Capture(e));
            }
        };
        let capture_time = capture_start.elapsed();

        let fit_start = Instant::now();
        let frame = if raw.dimensions() == (width, height) {
            raw
        } else {
            let fitted = fit_to(raw.image(), width, height);
            raw.with_image(fitted)
        };
        let fit_time = fit_start.elapsed();

        let segment_start = Instant::now();
        let confidence = self.segment(&frame);
        let segment_time = segment_start.elapsed();
        let degraded = confidence.is_none();

        let composite_start = Instant::now();
        let composited = match compose(&frame, confidence.as_ref(), &circular) {
            Ok(composited) => composited,
            Err(e) => {
                if cfg!(debug_assertions) {
                    panic!("circular mask out of sync with the surface: {e}");
                }
                tracing::error!("{}; regenerating circular mask", e);
                self.masks.invalidate();
                return self.skip(SkipReason::Composite(e));
            }
        };
        let composite_time = composite_start.elapsed();

        surface.present(composited);
        tracing::trace!("Capture-to-present latency {:?}", frame.captured_at().elapsed());
        self.consecutive_failures = 0;
        let times = StageTimes {
            capture: capture_time,
            fit: fit_time,
            segment: segment_time,
            composite: composite_time,
        };
        self.stats.record_presented(times, degraded);

        Ok(TickOutcome::Presented { degraded })
    }

    /// Stop using the camera and release it.
    pub fn shutdown(&mut self) {
        tracing::info!(
            "Shutting down after {} frames ({} skipped, {} unmasked, {} circular masks generated)",
            self.stats.presented(),
            self.stats.skipped(),
            self.stats.degraded(),
            self.masks.generations()
        );
        self.capture.close();
    }

    fn skip(&mut self, reason: SkipReason) -> Result<TickOutcome, PipelineError> {
        self.stats.record_skip();
        self.consecutive_failures += 1;

        let limit = self.config.max_consecutive_failures;
        if limit > 0 && self.consecutive_failures >= limit {
            let last = match &reason {
                SkipReason::Capture(e) => e.to_string(),
                SkipReason::Composite(e) => e.to_string(),
                SkipReason::EmptySurface => "surface has no area".to_string(),
            };
            return Err(PipelineError::Stalled {
                ticks: self.consecutive_failures,
                last,
            });
        }

        Ok(TickOutcome::Skipped(reason))
    }

    /// Confidence for `frame`, or `None` to show it unmasked this tick.
    fn segment(&mut self, frame: &Frame) -> Option<ConfidenceMask> {
        let engine = self.engine.as_mut()?;

        let result = engine.infer(frame).and_then(|mask| {
            if mask.dimensions() == frame.dimensions() {
                Ok(mask)
            } else {
                let (width, height) = frame.dimensions();
                Err(InferenceError::MaskSize {
                    width,
                    height,
                    expected: width as usize * height as usize,
                    actual: mask.values().len(),
                })
            }
        });

        match result {
            Ok(mask) => {
                if !self.engine_healthy {
                    tracing::info!("Segmentation recovered, background removal resumed");
                    self.engine_healthy = true;
                }
                Some(mask)
            }
            Err(e) => {
                if self.engine_healthy {
                    tracing::warn!("Segmentation failed ({}), showing unmasked frames", e);
                    self.engine_healthy = false;
                } else {
                    tracing::debug!("Segmentation still failing: {}", e);
                }
                None
            }
        }
    }
}

/// Default capture timeout: one frame period.
pub fn frame_budget(fps: u32) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1) as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::CompositedFrame;
    use crate::mask::MaskGenerator;
    use image::{Rgb, RgbImage};
    use std::cell::Cell;
    use std::collections::VecDeque;
    use std::rc::Rc;

    struct ScriptedCapture {
        script: VecDeque<Result<(), ()>>,
        size: (u32, u32),
        closed: Rc<Cell<bool>>,
    }

    impl ScriptedCapture {
        fn new(script: Vec<bool>, size: (u32, u32)) -> (Self, Rc<Cell<bool>>) {
            let closed = Rc::new(Cell::new(false));
            let capture = Self {
                script: script.into_iter().map(|ok| if ok { Ok(()) } else { Err(()) }).collect(),
                size,
                closed: Rc::clone(&closed),
            };
            (capture, closed)
        }
    }

    impl CaptureSource for ScriptedCapture {
        fn acquire(&mut self) -> Result<Frame, CaptureError> {
            match self.script.pop_front().unwrap_or(Ok(())) {
                Ok(()) => Ok(Frame::new(
                    RgbImage::from_pixel(self.size.0, self.size.1, Rgb([255, 255, 255])),
                    Instant::now(),
                )),
                Err(()) => Err(CaptureError::Timeout(Duration::from_millis(16))),
            }
        }

        fn resolution(&self) -> (u32, u32) {
            self.size
        }

        fn close(&mut self) {
            self.closed.set(true);
        }
    }

    struct ScriptedEngine {
        script: VecDeque<Result<f32, ()>>,
        wrong_size: bool,
    }

    impl SegmentationEngine for ScriptedEngine {
        fn infer(&mut self, frame: &Frame) -> Result<ConfidenceMask, InferenceError> {
            let (w, h) = frame.dimensions();
            match self.script.pop_front().unwrap_or(Ok(1.0)) {
                Ok(v) if self.wrong_size => Ok(ConfidenceMask::uniform(w + 1, h, v)),
                Ok(v) => Ok(ConfidenceMask::uniform(w, h, v)),
                Err(()) => Err(InferenceError::Runtime("model unavailable".to_string())),
            }
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[derive(Default)]
    struct RecordingSurface {
        size: (u32, u32),
        presented: Vec<CompositedFrame>,
    }

    impl PresentationSurface for RecordingSurface {
        fn present(&mut self, image: CompositedFrame) {
            self.presented.push(image);
        }

        fn current_size(&self) -> (u32, u32) {
            self.size
        }
    }

    fn pipeline<C: CaptureSource>(
        capture: C,
        engine: Option<ScriptedEngine>,
        config: PipelineConfig,
    ) -> Pipeline<C> {
        Pipeline::new(
            capture,
            engine.map(|e| Box::new(e) as Box<dyn SegmentationEngine>),
            MaskCache::new(MaskGenerator::default(), 0.8, 0.2),
            config,
        )
    }

    fn surface(size: u32) -> RecordingSurface {
        RecordingSurface {
            size: (size, size),
            ..Default::default()
        }
    }

    #[test]
    fn test_failed_capture_skips_only_that_tick() {
        let (capture, _) = ScriptedCapture::new(vec![true, true, false, true, true], (20, 20));
        let mut pipeline = pipeline(capture, None, PipelineConfig::default());
        let mut surface = surface(20);

        for tick in 1..=5 {
            let outcome = pipeline.tick(&mut surface).unwrap();
            if tick == 3 {
                assert!(matches!(
                    outcome,
                    TickOutcome::Skipped(SkipReason::Capture(CaptureError::Timeout(_)))
                ));
            } else {
                assert!(matches!(outcome, TickOutcome::Presented { .. }));
            }
        }

        assert_eq!(surface.presented.len(), 4);
        assert_eq!(pipeline.stats().skipped(), 1);
    }

    #[test]
    fn test_inference_failure_degrades_instead_of_skipping() {
        let (capture, _) = ScriptedCapture::new(vec![], (16, 16));
        let engine = ScriptedEngine {
            script: vec![Ok(0.0), Err(()), Ok(0.0)].into(),
            wrong_size: false,
        };
        let mut pipeline = pipeline(capture, Some(engine), PipelineConfig::default());
        let mut surface = surface(16);

        let outcomes: Vec<_> = (0..3).map(|_| pipeline.tick(&mut surface).unwrap()).collect();
        assert!(matches!(outcomes[0], TickOutcome::Presented { degraded: false }));
        assert!(matches!(outcomes[1], TickOutcome::Presented { degraded: true }));
        assert!(matches!(outcomes[2], TickOutcome::Presented { degraded: false }));

        // zero confidence hides everything; the degraded frame shows the disc
        let center = 8;
        assert_eq!(surface.presented[0].pixel(center, center)[3], 0);
        assert_eq!(surface.presented[1].pixel(center, center), [255, 255, 255, 255]);
        assert_eq!(surface.presented[2].pixel(center, center)[3], 0);
    }

    #[test]
    fn test_wrong_sized_confidence_is_treated_as_failure() {
        let (capture, _) = ScriptedCapture::new(vec![], (10, 10));
        let engine = ScriptedEngine {
            script: VecDeque::new(),
            wrong_size: true,
        };
        let mut pipeline = pipeline(capture, Some(engine), PipelineConfig::default());
        let mut surface = surface(10);

        let outcome = pipeline.tick(&mut surface).unwrap();
        assert!(matches!(outcome, TickOutcome::Presented { degraded: true }));
    }

    #[test]
    fn test_frames_are_fitted_to_surface() {
        let (capture, _) = ScriptedCapture::new(vec![], (64, 48));
        let mut pipeline = pipeline(capture, None, PipelineConfig::default());
        let mut surface = surface(30);

        pipeline.tick(&mut surface).unwrap();
        assert_eq!(surface.presented[0].width(), 30);
        assert_eq!(surface.presented[0].height(), 30);
    }

    struct SlowCapture {
        inner: ScriptedCapture,
        delay: Duration,
    }

    impl CaptureSource for SlowCapture {
        fn acquire(&mut self) -> Result<Frame, CaptureError> {
            std::thread::sleep(self.delay);
            self.inner.acquire()
        }

        fn resolution(&self) -> (u32, u32) {
            self.inner.resolution()
        }

        fn close(&mut self) {
            self.inner.close();
        }
    }

    #[test]
    fn test_fit_is_timed_apart_from_capture() {
        let (inner, _) = ScriptedCapture::new(vec![], (24, 24));
        let capture = SlowCapture {
            inner,
            delay: Duration::from_millis(25),
        };
        let mut pipeline = pipeline(capture, None, PipelineConfig::default());
        let mut surface = surface(20);

        pipeline.tick(&mut surface).unwrap();
        let avg = pipeline.stats().averages();
        assert!(avg.capture >= Duration::from_millis(25));
        assert!(avg.fit < Duration::from_millis(25));
        assert_eq!(surface.presented[0].width(), 20);
    }

    #[test]
    fn test_resize_regenerates_mask() {
        let (capture, _) = ScriptedCapture::new(vec![], (40, 40));
        let mut pipeline = pipeline(capture, None, PipelineConfig::default());
        let mut surface = surface(20);

        pipeline.tick(&mut surface).unwrap();
        pipeline.tick(&mut surface).unwrap();
        assert_eq!(pipeline.masks().generations(), 1);

        surface.size = (32, 24);
        pipeline.tick(&mut surface).unwrap();
        assert_eq!(pipeline.masks().generations(), 2);
        assert_eq!(surface.presented[2].width(), 32);
        assert_eq!(surface.presented[2].height(), 24);
    }

    #[test]
    fn test_empty_surface_skips_without_escalating() {
        let (capture, _) = ScriptedCapture::new(vec![], (8, 8));
        let config = PipelineConfig {
            max_consecutive_failures: 2,
            ..PipelineConfig::default()
        };
        let mut pipeline = pipeline(capture, None, config);
        let mut surface = surface(0);

        for _ in 0..5 {
            let outcome = pipeline.tick(&mut surface).unwrap();
            assert!(matches!(outcome, TickOutcome::Skipped(SkipReason::EmptySurface)));
        }
    }

    #[test]
    fn test_persistent_capture_failure_escalates() {
        let (capture, _) = ScriptedCapture::new(vec![false; 10], (8, 8));
        let config = PipelineConfig {
            max_consecutive_failures: 3,
            ..PipelineConfig::default()
        };
        let mut pipeline = pipeline(capture, None, config);
        let mut surface = surface(8);

        assert!(pipeline.tick(&mut surface).is_ok());
        assert!(pipeline.tick(&mut surface).is_ok());
        let err = pipeline.tick(&mut surface).unwrap_err();
        assert!(matches!(err, PipelineError::Stalled { ticks: 3, .. }));
    }

    #[test]
    fn test_success_resets_failure_run() {
        let (capture, _) =
            ScriptedCapture::new(vec![false, false, true, false, false, true], (8, 8));
        let config = PipelineConfig {
            max_consecutive_failures: 3,
            ..PipelineConfig::default()
        };
        let mut pipeline = pipeline(capture, None, config);
        let mut surface = surface(8);

        for _ in 0..6 {
            assert!(pipeline.tick(&mut surface).is_ok());
        }
        assert_eq!(surface.presented.len(), 2);
    }

    #[test]
    fn test_shutdown_closes_capture() {
        let (capture, closed) = ScriptedCapture::new(vec![], (8, 8));
        let mut pipeline = pipeline(capture, None, PipelineConfig::default());
        pipeline.shutdown();
        assert!(closed.get());
    }

    #[test]
    fn test_frame_budget() {
        assert_eq!(frame_budget(50), Duration::from_millis(20));
    }
}
