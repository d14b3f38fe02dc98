use thiserror::Error;

/// A draw failed mid-cycle. Non-fatal: the cycle's render is dropped and
/// the loop continues.
#[derive(Error, Debug)]
pub enum RenderError {
    #[error("render target unavailable: {0}")]
    TargetUnavailable(String),
}

/// Drawing surface the overlay is composed onto.
///
/// The renderer resizes the surface to the native frame size before each
/// draw pass and clears it, so every cycle starts from an empty target of
/// the right dimensions. Implementations own their pixel storage; nothing
/// else draws on it.
pub trait RenderSurface: Send {
    fn size(&self) -> (u32, u32);

    fn resize(&mut self, width: u32, height: u32);

    /// Reset the whole surface to its empty (fully transparent) state.
    fn clear(&mut self);

    fn stroke_rect(&mut self, x: i32, y: i32, width: u32, height: u32)
        -> Result<(), RenderError>;

    /// Draw caption text with its top-left corner at `(x, y)`.
    fn draw_label(&mut self, text: &str, x: i32, y: i32) -> Result<(), RenderError>;
}
