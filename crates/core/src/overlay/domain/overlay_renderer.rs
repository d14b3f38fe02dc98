use crate::detection::domain::face_detection::AnnotatedFace;
use crate::overlay::domain::render_surface::{RenderError, RenderSurface};

/// Vertical gap between a box's top edge and its caption.
const LABEL_OFFSET: i32 = 10;

/// Maps native-resolution detections onto the display surface.
///
/// Detections arrive in native-frame coordinates. When the display size
/// differs from the native capture size, every box is scaled per axis by
/// `display / native` so the overlay stays visually aligned with the
/// scaled video.
#[derive(Clone, Copy, Debug, Default)]
pub struct OverlayRenderer;

impl OverlayRenderer {
    pub fn new() -> Self {
        Self
    }

    /// One full draw pass: size the surface to the native frame, clear it,
    /// then draw each face's box and caption. An empty face list leaves a
    /// cleared surface with nothing drawn.
    pub fn render(
        &self,
        surface: &mut dyn RenderSurface,
        faces: &[AnnotatedFace],
        native_size: (u32, u32),
        display_size: (u32, u32),
    ) -> Result<(), RenderError> {
        if surface.size() != native_size {
            surface.resize(native_size.0, native_size.1);
        }
        surface.clear();

        let sx = display_size.0 as f64 / native_size.0 as f64;
        let sy = display_size.1 as f64 / native_size.1 as f64;

        for face in faces {
            let bbox = face.bounding_box().scaled(sx, sy);
            let x = bbox.x.round() as i32;
            let y = bbox.y.round() as i32;
            surface.stroke_rect(
                x,
                y,
                bbox.width.round().max(1.0) as u32,
                bbox.height.round().max(1.0) as u32,
            )?;
            // Caption sits just above the box's top-left corner, clamped so
            // top-edge faces keep a visible label.
            surface.draw_label(&face.label(), x, (y - LABEL_OFFSET).max(0))?;
        }
        Ok(())
    }
}
