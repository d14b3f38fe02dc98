use thiserror::Error;

use crate::shared::frame::FrameSample;

/// Starting the camera stream failed. Fatal to starting the loop; there is
/// no automatic retry.
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("camera access denied: {0}")]
    AccessDenied(String),
    #[error("camera unavailable: {0}")]
    Unavailable(String),
}

/// Owns the live camera stream.
///
/// `current_frame` never blocks: it returns the most recent frame the
/// stream has produced, or `None` before the first frame arrives. `stop`
/// releases the underlying device and is idempotent (calls after the
/// first are no-ops). No frame is ever exposed after `start` has failed.
pub trait FrameSource: Send {
    fn start(&mut self) -> Result<(), CameraError>;
    fn current_frame(&mut self) -> Option<FrameSample>;
    fn stop(&mut self);
}
