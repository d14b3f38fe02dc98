use std::path::PathBuf;

use ab_glyph::{FontVec, PxScale};
use image::{Rgba, RgbaImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;

use crate::overlay::domain::render_surface::{RenderError, RenderSurface};

/// Overlay stroke and caption color (the classic detector green).
const OVERLAY_COLOR: Rgba<u8> = Rgba([0, 255, 0, 255]);

/// Caption glyph height in pixels.
const LABEL_SCALE: f32 = 24.0;

/// Box stroke thickness in pixels.
const STROKE_WIDTH: i32 = 2;

/// RGBA pixel canvas backing the overlay.
///
/// Cleared pixels are fully transparent, so the canvas composites over the
/// video frame the way a browser canvas sits over a video element. Caption
/// text needs a font; when none of the known system fonts is present, boxes
/// still render and captions are skipped (warned once).
pub struct PixelCanvas {
    image: RgbaImage,
    font: Option<FontVec>,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32) -> Self {
        let font = load_system_font();
        if font.is_none() {
            log::warn!("no usable system font found; overlay captions will be skipped");
        }
        Self {
            image: RgbaImage::new(width, height),
            font,
        }
    }

    pub fn image(&self) -> &RgbaImage {
        &self.image
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }
}

impl RenderSurface for PixelCanvas {
    fn size(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.image = RgbaImage::new(width, height);
    }

    fn clear(&mut self) {
        for pixel in self.image.pixels_mut() {
            *pixel = Rgba([0, 0, 0, 0]);
        }
    }

    fn stroke_rect(
        &mut self,
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    ) -> Result<(), RenderError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(RenderError::TargetUnavailable("canvas has no pixels".into()));
        }
        for inset in 0..STROKE_WIDTH {
            let w = width.saturating_sub(2 * inset as u32);
            let h = height.saturating_sub(2 * inset as u32);
            if w == 0 || h == 0 {
                break;
            }
            draw_hollow_rect_mut(
                &mut self.image,
                Rect::at(x + inset, y + inset).of_size(w, h),
                OVERLAY_COLOR,
            );
        }
        Ok(())
    }

    fn draw_label(&mut self, text: &str, x: i32, y: i32) -> Result<(), RenderError> {
        if self.image.width() == 0 || self.image.height() == 0 {
            return Err(RenderError::TargetUnavailable("canvas has no pixels".into()));
        }
        if let Some(font) = &self.font {
            draw_text_mut(
                &mut self.image,
                OVERLAY_COLOR,
                x,
                y,
                PxScale::from(LABEL_SCALE),
                font,
                text,
            );
        }
        Ok(())
    }
}

/// Probe well-known font locations; first one that parses wins.
fn load_system_font() -> Option<FontVec> {
    for path in font_candidates() {
        if let Ok(bytes) = std::fs::read(&path) {
            if let Ok(font) = FontVec::try_from_vec(bytes) {
                log::debug!("overlay captions using {}", path.display());
                return Some(font);
            }
        }
    }
    None
}

fn font_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();
    if let Ok(custom) = std::env::var("FACEMOOD_FONT") {
        candidates.push(PathBuf::from(custom));
    }
    candidates.extend(
        [
            "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
            "/usr/share/fonts/TTF/DejaVuSans.ttf",
            "/usr/share/fonts/liberation/LiberationSans-Regular.ttf",
            "/Library/Fonts/Arial Unicode.ttf",
            "/System/Library/Fonts/Supplemental/Arial.ttf",
            "C:\\Windows\\Fonts\\arial.ttf",
        ]
        .iter()
        .map(PathBuf::from),
    );
    candidates
}
