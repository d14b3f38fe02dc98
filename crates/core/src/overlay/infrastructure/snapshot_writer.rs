use std::path::{Path, PathBuf};

use image::{RgbImage, RgbaImage};
use thiserror::Error;

use crate::detection::domain::face_detection::AnnotatedFace;
use crate::overlay::domain::overlay_renderer::OverlayRenderer;
use crate::overlay::domain::render_surface::RenderError;
use crate::overlay::infrastructure::pixel_canvas::PixelCanvas;
use crate::shared::frame::FrameSample;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("failed to create snapshot directory {path}: {source}")]
    Dir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("frame buffer does not match its dimensions")]
    BadFrame,
    #[error(transparent)]
    Render(#[from] RenderError),
    #[error("failed to write snapshot: {0}")]
    Encode(#[from] image::ImageError),
}

/// Writes annotated still frames: the overlay rendered at native size and
/// composited over the camera frame, one numbered PNG per completed cycle.
pub struct SnapshotWriter {
    dir: PathBuf,
    renderer: OverlayRenderer,
    canvas: PixelCanvas,
    count: usize,
}

impl SnapshotWriter {
    pub fn new(dir: &Path) -> Result<Self, SnapshotError> {
        std::fs::create_dir_all(dir).map_err(|e| SnapshotError::Dir {
            path: dir.to_path_buf(),
            source: e,
        })?;
        Ok(Self {
            dir: dir.to_path_buf(),
            renderer: OverlayRenderer::new(),
            canvas: PixelCanvas::new(1, 1),
            count: 0,
        })
    }

    pub fn save(
        &mut self,
        frame: &FrameSample,
        faces: &[AnnotatedFace],
    ) -> Result<PathBuf, SnapshotError> {
        self.renderer
            .render(&mut self.canvas, faces, frame.size(), frame.size())?;

        let mut base = RgbImage::from_raw(frame.width(), frame.height(), frame.data().to_vec())
            .ok_or(SnapshotError::BadFrame)?;
        composite_over(&mut base, self.canvas.image());

        let path = self.dir.join(format!("frame_{:06}.png", self.count));
        self.count += 1;
        base.save(&path)?;
        Ok(path)
    }
}

/// Source-over blend of the RGBA overlay onto the RGB frame.
fn composite_over(base: &mut RgbImage, overlay: &RgbaImage) {
    for (x, y, pixel) in overlay.enumerate_pixels() {
        let alpha = pixel.0[3] as u32;
        if alpha == 0 {
            continue;
        }
        let under = base.get_pixel_mut(x, y);
        for c in 0..3 {
            let over = pixel.0[c] as u32;
            under.0[c] = ((over * alpha + under.0[c] as u32 * (255 - alpha)) / 255) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::expression::{Expression, ExpressionScores};
    use crate::detection::domain::face_detection::FaceDetection;
    use crate::shared::bounding_box::BoundingBox;
    use tempfile::TempDir;

    fn frame(width: u32, height: u32, value: u8) -> FrameSample {
        FrameSample::new(vec![value; (width * height * 3) as usize], width, height)
    }

    fn face(x: f64, y: f64, w: f64, h: f64) -> AnnotatedFace {
        AnnotatedFace::annotate(FaceDetection {
            bounding_box: BoundingBox::new(x, y, w, h),
            scores: ExpressionScores::new().with(Expression::Happy, 0.9),
        })
    }

    #[test]
    fn test_save_without_faces_preserves_frame_pixels() {
        let tmp = TempDir::new().unwrap();
        let mut writer = SnapshotWriter::new(tmp.path()).unwrap();

        let path = writer.save(&frame(8, 8, 77), &[]).unwrap();
        let saved = image::open(&path).unwrap().to_rgb8();
        assert!(saved.pixels().all(|p| p.0 == [77, 77, 77]));
    }

    #[test]
    fn test_save_with_face_draws_green_border() {
        let tmp = TempDir::new().unwrap();
        let mut writer = SnapshotWriter::new(tmp.path()).unwrap();

        let path = writer
            .save(&frame(32, 32, 0), &[face(4.0, 4.0, 16.0, 16.0)])
            .unwrap();
        let saved = image::open(&path).unwrap().to_rgb8();
        assert_eq!(saved.get_pixel(4, 4).0, [0, 255, 0]);
    }

    #[test]
    fn test_snapshots_are_numbered_sequentially() {
        let tmp = TempDir::new().unwrap();
        let mut writer = SnapshotWriter::new(tmp.path()).unwrap();

        let first = writer.save(&frame(8, 8, 0), &[]).unwrap();
        let second = writer.save(&frame(8, 8, 0), &[]).unwrap();
        assert!(first.ends_with("frame_000000.png"));
        assert!(second.ends_with("frame_000001.png"));
    }

    #[test]
    fn test_snapshot_dir_is_created() {
        let tmp = TempDir::new().unwrap();
        let nested = tmp.path().join("captures/session");
        SnapshotWriter::new(&nested).unwrap();
        assert!(nested.is_dir());
    }
}
