use crate::detection::domain::expression::{Expression, ExpressionScores};
use crate::shared::bounding_box::BoundingBox;

/// One face found by the inference engine: where it is in the native frame
/// and how its expression scores across the label set.
#[derive(Clone, Debug, PartialEq)]
pub struct FaceDetection {
    pub bounding_box: BoundingBox,
    pub scores: ExpressionScores,
}

/// A `FaceDetection` reduced to its dominant label, ready for the overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnotatedFace {
    pub detection: FaceDetection,
    pub dominant: Expression,
    pub confidence: f32,
}

impl AnnotatedFace {
    pub fn annotate(detection: FaceDetection) -> Self {
        let (dominant, confidence) = detection.scores.dominant();
        Self {
            detection,
            dominant,
            confidence,
        }
    }

    pub fn bounding_box(&self) -> &BoundingBox {
        &self.detection.bounding_box
    }

    /// Overlay caption, e.g. `happy (90%)`.
    pub fn label(&self) -> String {
        format!(
            "{} ({}%)",
            self.dominant.as_str(),
            (self.confidence * 100.0).round() as u32
        )
    }
}
