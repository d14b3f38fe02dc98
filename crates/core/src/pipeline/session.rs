use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use thiserror::Error;

use crate::capture::domain::frame_source::{CameraError, FrameSource};
use crate::detection::domain::expression_detector::{ExpressionDetector, ModelLoadError};
use crate::detection::domain::face_detection::AnnotatedFace;
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::overlay::domain::render_surface::RenderSurface;
use crate::pipeline::detection_loop::{DetectionLoop, LoopConfig, LoopState};
use crate::pipeline::loop_logger::LoopLogger;

/// Deferred model loading: invoked by `start` inside the `ModelLoading`
/// state, so a load failure maps onto the lifecycle instead of happening
/// before it exists.
pub type DetectorLoader =
    Box<dyn FnOnce() -> Result<Box<dyn ExpressionDetector>, ModelLoadError> + Send>;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error(transparent)]
    ModelLoad(#[from] ModelLoadError),
    #[error(transparent)]
    Camera(#[from] CameraError),
    #[error("session was already started")]
    AlreadyStarted,
}

/// Components consumed when the session starts.
struct Pending {
    source: Box<dyn FrameSource>,
    loader: DetectorLoader,
    surface: Box<dyn RenderSurface>,
    logger: Box<dyn LoopLogger>,
    config: LoopConfig,
}

/// Owns the loop's lifecycle: model loading → stream start → loop start,
/// reversed on teardown or error.
///
/// `stop` (also run on drop) signals the loop, joins it, and releases the
/// camera stream exactly once: the source travels into the loop thread
/// and is handed back through the join, so no other path can release it.
pub struct OverlaySession {
    state: Arc<Mutex<LoopState>>,
    latest: Arc<Mutex<Vec<AnnotatedFace>>>,
    cancelled: Arc<AtomicBool>,
    pending: Option<Pending>,
    loop_thread: Option<JoinHandle<Box<dyn FrameSource>>>,
}

impl OverlaySession {
    pub fn new(
        source: Box<dyn FrameSource>,
        loader: DetectorLoader,
        surface: Box<dyn RenderSurface>,
        logger: Box<dyn LoopLogger>,
        config: LoopConfig,
    ) -> Self {
        Self {
            state: Arc::new(Mutex::new(LoopState::Idle)),
            latest: Arc::new(Mutex::new(Vec::new())),
            cancelled: Arc::new(AtomicBool::new(false)),
            pending: Some(Pending {
                source,
                loader,
                surface,
                logger,
                config,
            }),
            loop_thread: None,
        }
    }

    /// Bring the loop up. Fatal failures stop the sequence where they
    /// happen and leave the matching terminal state for display.
    pub fn start(&mut self) -> Result<(), SessionError> {
        let Some(mut pending) = self.pending.take() else {
            return Err(SessionError::AlreadyStarted);
        };

        self.set_state(LoopState::ModelLoading);
        let detector = match (pending.loader)() {
            Ok(detector) => detector,
            Err(e) => {
                self.set_state(LoopState::ModelLoadFailed);
                return Err(e.into());
            }
        };

        self.set_state(LoopState::StreamStarting);
        if let Err(e) = pending.source.start() {
            self.set_state(LoopState::StreamFailed);
            return Err(e.into());
        }

        self.set_state(LoopState::Ready);
        let detection_loop = DetectionLoop {
            source: pending.source,
            detector,
            surface: pending.surface,
            renderer: OverlayRenderer::new(),
            config: pending.config,
            state: self.state.clone(),
            latest: self.latest.clone(),
            cancelled: self.cancelled.clone(),
            logger: pending.logger,
        };
        self.loop_thread = Some(std::thread::spawn(move || detection_loop.run()));
        Ok(())
    }

    pub fn state(&self) -> LoopState {
        *self.state.lock().unwrap()
    }

    /// The most recent annotated face list, for textual status display.
    pub fn latest_faces(&self) -> Vec<AnnotatedFace> {
        self.latest.lock().unwrap().clone()
    }

    /// Tear down, from any state. Idempotent; the stream release runs at
    /// most once across repeated calls and drop.
    pub fn stop(&mut self) {
        self.cancelled.store(true, Ordering::Relaxed);
        if let Some(handle) = self.loop_thread.take() {
            if let Ok(mut source) = handle.join() {
                source.stop();
            }
        }
        // Never-started components (if any) are dropped without a release.
        self.pending.take();
        self.set_state(LoopState::Stopped);
    }

    fn set_state(&self, next: LoopState) {
        *self.state.lock().unwrap() = next;
    }
}

impl Drop for OverlaySession {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::expression::{Expression, ExpressionScores};
    use crate::detection::domain::expression_detector::InferenceError;
    use crate::detection::domain::face_detection::FaceDetection;
    use crate::overlay::domain::render_surface::RenderError;
    use crate::pipeline::loop_logger::NullLoopLogger;
    use crate::shared::bounding_box::BoundingBox;
    use crate::shared::frame::FrameSample;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    const TICK: Duration = Duration::from_millis(10);
    const SETTLE: Duration = Duration::from_millis(150);

    // --- Stubs ---

    struct CountingSource {
        fail_start: bool,
        started: Arc<AtomicBool>,
        stop_calls: Arc<AtomicUsize>,
    }

    impl CountingSource {
        fn new(fail_start: bool) -> (Self, Arc<AtomicBool>, Arc<AtomicUsize>) {
            let started = Arc::new(AtomicBool::new(false));
            let stop_calls = Arc::new(AtomicUsize::new(0));
            (
                Self {
                    fail_start,
                    started: started.clone(),
                    stop_calls: stop_calls.clone(),
                },
                started,
                stop_calls,
            )
        }
    }

    impl FrameSource for CountingSource {
        fn start(&mut self) -> Result<(), CameraError> {
            if self.fail_start {
                return Err(CameraError::Unavailable("no device".into()));
            }
            self.started.store(true, Ordering::SeqCst);
            Ok(())
        }

        fn current_frame(&mut self) -> Option<FrameSample> {
            if self.started.load(Ordering::SeqCst) {
                Some(FrameSample::new(vec![0u8; 4 * 4 * 3], 4, 4))
            } else {
                None
            }
        }

        fn stop(&mut self) {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct NullSurface;

    impl RenderSurface for NullSurface {
        fn size(&self) -> (u32, u32) {
            (0, 0)
        }
        fn resize(&mut self, _: u32, _: u32) {}
        fn clear(&mut self) {}
        fn stroke_rect(&mut self, _: i32, _: i32, _: u32, _: u32) -> Result<(), RenderError> {
            Ok(())
        }
        fn draw_label(&mut self, _: &str, _: i32, _: i32) -> Result<(), RenderError> {
            Ok(())
        }
    }

    struct FixedDetector {
        faces: Vec<FaceDetection>,
        calls: Arc<AtomicUsize>,
    }

    impl ExpressionDetector for FixedDetector {
        fn detect(
            &mut self,
            _frame: &FrameSample,
        ) -> Result<Vec<FaceDetection>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(self.faces.clone())
        }
    }

    /// Blocks until the gate is released (or disconnected).
    struct GatedDetector {
        gate: crossbeam_channel::Receiver<()>,
        calls: Arc<AtomicUsize>,
    }

    impl ExpressionDetector for GatedDetector {
        fn detect(
            &mut self,
            _frame: &FrameSample,
        ) -> Result<Vec<FaceDetection>, InferenceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.gate.recv();
            Ok(vec![FaceDetection {
                bounding_box: BoundingBox::new(1.0, 1.0, 2.0, 2.0),
                scores: ExpressionScores::new().with(Expression::Happy, 0.9),
            }])
        }
    }

    fn session_with(
        source: Box<dyn FrameSource>,
        loader: DetectorLoader,
    ) -> OverlaySession {
        OverlaySession::new(
            source,
            loader,
            Box::new(NullSurface),
            Box::new(NullLoopLogger),
            LoopConfig {
                tick_period: TICK,
                ..LoopConfig::default()
            },
        )
    }

    #[test]
    fn test_new_session_is_idle() {
        let (source, _, _) = CountingSource::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_loader = calls.clone();
        let session = session_with(
            Box::new(source),
            Box::new(move || {
                Ok(Box::new(FixedDetector {
                    faces: Vec::new(),
                    calls: calls_for_loader,
                }) as Box<dyn ExpressionDetector>)
            }),
        );
        assert_eq!(session.state(), LoopState::Idle);
    }

    #[test]
    fn test_model_load_failure_is_terminal_and_detect_never_runs() {
        let (source, started, _) = CountingSource::new(false);
        let mut session = session_with(
            Box::new(source),
            Box::new(|| Err(ModelLoadError::Session("bad model".into()))),
        );

        let result = session.start();
        assert!(matches!(result, Err(SessionError::ModelLoad(_))));
        assert_eq!(session.state(), LoopState::ModelLoadFailed);
        // The sequence halted before the stream: polling was never entered.
        assert!(!started.load(Ordering::SeqCst));
    }

    #[test]
    fn test_stream_failure_is_terminal() {
        let (source, _, _) = CountingSource::new(true);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_loader = calls.clone();
        let mut session = session_with(
            Box::new(source),
            Box::new(move || {
                Ok(Box::new(FixedDetector {
                    faces: Vec::new(),
                    calls: calls_for_loader,
                }) as Box<dyn ExpressionDetector>)
            }),
        );

        let result = session.start();
        assert!(matches!(result, Err(SessionError::Camera(_))));
        assert_eq!(session.state(), LoopState::StreamFailed);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_start_reaches_polling_and_publishes_faces() {
        let (source, _, stop_calls) = CountingSource::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_loader = calls.clone();
        let mut session = session_with(
            Box::new(source),
            Box::new(move || {
                Ok(Box::new(FixedDetector {
                    faces: vec![FaceDetection {
                        bounding_box: BoundingBox::new(1.0, 1.0, 2.0, 2.0),
                        scores: ExpressionScores::new().with(Expression::Surprised, 0.7),
                    }],
                    calls: calls_for_loader,
                }) as Box<dyn ExpressionDetector>)
            }),
        );

        session.start().unwrap();
        std::thread::sleep(SETTLE);

        assert_eq!(session.state(), LoopState::Polling);
        let faces = session.latest_faces();
        assert!(!faces.is_empty());
        assert_eq!(faces[0].dominant, Expression::Surprised);

        session.stop();
        assert_eq!(session.state(), LoopState::Stopped);
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_second_start_is_rejected() {
        let (source, _, _) = CountingSource::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_loader = calls.clone();
        let mut session = session_with(
            Box::new(source),
            Box::new(move || {
                Ok(Box::new(FixedDetector {
                    faces: Vec::new(),
                    calls: calls_for_loader,
                }) as Box<dyn ExpressionDetector>)
            }),
        );
        session.start().unwrap();
        assert!(matches!(session.start(), Err(SessionError::AlreadyStarted)));
        session.stop();
    }

    #[test]
    fn test_repeated_stop_and_drop_release_stream_once() {
        let (source, _, stop_calls) = CountingSource::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_loader = calls.clone();
        let mut session = session_with(
            Box::new(source),
            Box::new(move || {
                Ok(Box::new(FixedDetector {
                    faces: Vec::new(),
                    calls: calls_for_loader,
                }) as Box<dyn ExpressionDetector>)
            }),
        );
        session.start().unwrap();
        std::thread::sleep(SETTLE);

        session.stop();
        session.stop();
        drop(session);
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_stop_before_start_never_touches_the_stream() {
        let (source, _, stop_calls) = CountingSource::new(false);
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_loader = calls.clone();
        let mut session = session_with(
            Box::new(source),
            Box::new(move || {
                Ok(Box::new(FixedDetector {
                    faces: Vec::new(),
                    calls: calls_for_loader,
                }) as Box<dyn ExpressionDetector>)
            }),
        );
        session.stop();
        assert_eq!(session.state(), LoopState::Stopped);
        assert_eq!(stop_calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_stop_with_outstanding_call_releases_once_and_discards_result() {
        let (source, _, stop_calls) = CountingSource::new(false);
        let (gate_tx, gate_rx) = crossbeam_channel::unbounded::<()>();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_for_loader = calls.clone();
        let mut session = session_with(
            Box::new(source),
            Box::new(move || {
                Ok(Box::new(GatedDetector {
                    gate: gate_rx,
                    calls: calls_for_loader,
                }) as Box<dyn ExpressionDetector>)
            }),
        );
        session.start().unwrap();

        // Wait until a detect call is outstanding, then tear down while it
        // is still blocked.
        std::thread::sleep(SETTLE);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        session.stop();
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);

        // The call resolves after teardown: no render, no published faces,
        // and no second release.
        gate_tx.send(()).unwrap();
        std::thread::sleep(SETTLE);
        assert!(session.latest_faces().is_empty());
        assert_eq!(stop_calls.load(Ordering::SeqCst), 1);
    }
}
