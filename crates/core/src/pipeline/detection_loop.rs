use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crossbeam_channel::{bounded, select, tick};

use crate::capture::domain::frame_source::FrameSource;
use crate::detection::domain::expression_detector::{ExpressionDetector, InferenceError};
use crate::detection::domain::face_detection::{AnnotatedFace, FaceDetection};
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::overlay::domain::render_surface::RenderSurface;
use crate::pipeline::loop_logger::{LoopLogger, TickSkip};
use crate::shared::constants::DEFAULT_TICK_PERIOD_MS;
use crate::shared::frame::FrameSample;

/// Lifecycle state of the sampling/inference/render loop.
///
/// `Polling` is the steady operating state, entered once the stream and
/// model are both live and left only for `Stopped`. Per-tick inference
/// failures never change the state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    ModelLoading,
    ModelLoadFailed,
    StreamStarting,
    StreamFailed,
    Ready,
    Polling,
    Stopped,
}

impl LoopState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoopState::Idle => "idle",
            LoopState::ModelLoading => "loading models",
            LoopState::ModelLoadFailed => "model load failed",
            LoopState::StreamStarting => "starting stream",
            LoopState::StreamFailed => "stream failed",
            LoopState::Ready => "ready",
            LoopState::Polling => "polling",
            LoopState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for LoopState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Called at the end of each successful cycle with the sampled frame and
/// the annotated faces found in it.
pub type CycleFn = Box<dyn FnMut(&FrameSample, &[AnnotatedFace]) + Send>;

/// Loop configuration. `display_size` defaults to the native frame size
/// (1:1 overlay scale) when unset.
pub struct LoopConfig {
    pub tick_period: Duration,
    pub display_size: Option<(u32, u32)>,
    pub on_cycle: Option<CycleFn>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            tick_period: Duration::from_millis(DEFAULT_TICK_PERIOD_MS),
            display_size: None,
            on_cycle: None,
        }
    }
}

/// What the inference worker hands back per frame.
struct CycleOutcome {
    frame: FrameSample,
    result: Result<Vec<FaceDetection>, InferenceError>,
    detect_ms: f64,
}

/// The tick scheduler. Owns the frame source, the render surface, and the
/// detector (which it moves onto a worker thread) for the duration of the
/// run; the source is handed back to the caller for release.
///
/// One scheduler thread processes ticks and results strictly one at a
/// time; the `outstanding` flag lives on that thread, so two ticks can
/// never both observe "no call outstanding".
pub(crate) struct DetectionLoop {
    pub(crate) source: Box<dyn FrameSource>,
    pub(crate) detector: Box<dyn ExpressionDetector>,
    pub(crate) surface: Box<dyn RenderSurface>,
    pub(crate) renderer: OverlayRenderer,
    pub(crate) config: LoopConfig,
    pub(crate) state: Arc<Mutex<LoopState>>,
    pub(crate) latest: Arc<Mutex<Vec<AnnotatedFace>>>,
    pub(crate) cancelled: Arc<AtomicBool>,
    pub(crate) logger: Box<dyn LoopLogger>,
}

impl DetectionLoop {
    /// Run until cancelled. Returns the frame source so the session can
    /// release the stream exactly once, after both threads are done.
    pub(crate) fn run(self) -> Box<dyn FrameSource> {
        let DetectionLoop {
            mut source,
            mut detector,
            mut surface,
            renderer,
            mut config,
            state,
            latest,
            cancelled,
            mut logger,
        } = self;

        *state.lock().unwrap() = LoopState::Polling;

        let (frame_tx, frame_rx) = bounded::<FrameSample>(1);
        let (result_tx, result_rx) = bounded::<CycleOutcome>(1);

        std::thread::spawn(move || {
            for frame in frame_rx {
                let started = Instant::now();
                let result = detector.detect(&frame);
                let detect_ms = started.elapsed().as_secs_f64() * 1000.0;
                if result_tx
                    .send(CycleOutcome {
                        frame,
                        result,
                        detect_ms,
                    })
                    .is_err()
                {
                    break;
                }
            }
        });

        let ticker = tick(config.tick_period);
        let mut outstanding = false;

        loop {
            select! {
                recv(ticker) -> _ => {
                    if cancelled.load(Ordering::Relaxed) {
                        break;
                    }
                    if outstanding {
                        logger.tick_skipped(TickSkip::InferenceOutstanding);
                    } else {
                        match source.current_frame() {
                            None => logger.tick_skipped(TickSkip::NoFrame),
                            Some(frame) => {
                                if frame_tx.send(frame).is_ok() {
                                    outstanding = true;
                                }
                            }
                        }
                    }
                }
                recv(result_rx) -> outcome => {
                    let Ok(outcome) = outcome else {
                        // Worker gone (panicked detector); nothing left to do.
                        break;
                    };
                    if cancelled.load(Ordering::Relaxed) {
                        // Resolved after stop: discard, never render.
                        break;
                    }
                    outstanding = false;
                    match outcome.result {
                        Ok(detections) => {
                            let faces: Vec<AnnotatedFace> =
                                detections.into_iter().map(AnnotatedFace::annotate).collect();
                            let native = outcome.frame.size();
                            let display = config.display_size.unwrap_or(native);
                            if let Err(e) =
                                renderer.render(surface.as_mut(), &faces, native, display)
                            {
                                log::warn!("overlay render dropped this cycle: {e}");
                            }
                            logger.cycle(faces.len(), outcome.detect_ms);
                            if let Some(cb) = config.on_cycle.as_mut() {
                                cb(&outcome.frame, &faces);
                            }
                            *latest.lock().unwrap() = faces;
                        }
                        Err(e) => logger.inference_failed(&e.to_string()),
                    }
                }
            }
        }

        // The worker is not joined: it holds only the detector, and once the
        // result channel is gone its next send fails and it exits after the
        // in-flight call completes. Stream release must not wait for that.
        drop(frame_tx);
        logger.summary();
        source
    }
}
