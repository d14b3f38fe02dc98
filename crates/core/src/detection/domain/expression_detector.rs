use std::path::PathBuf;

use thiserror::Error;

use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::frame::FrameSample;

/// A single inference call failed. Non-fatal: the loop reports it and
/// tries again on the next tick.
#[derive(Error, Debug)]
pub enum InferenceError {
    #[error("inference backend error: {0}")]
    Backend(String),
    #[error("frame has zero dimensions")]
    EmptyFrame,
}

/// Loading the model assets failed. Fatal to starting the loop.
#[derive(Error, Debug)]
pub enum ModelLoadError {
    #[error("model file missing: {0}")]
    Missing(PathBuf),
    #[error("failed to initialize inference session: {0}")]
    Session(String),
    #[error("failed to resolve model assets: {0}")]
    Resolve(String),
}

/// Domain interface for the external face/expression inference engine.
///
/// Implementations may be stateful, hence `&mut self`. Callers must not
/// issue a new `detect` while a previous call is outstanding, and must not
/// call it before model loading has completed successfully.
pub trait ExpressionDetector: Send {
    fn detect(&mut self, frame: &FrameSample) -> Result<Vec<FaceDetection>, InferenceError>;
}
