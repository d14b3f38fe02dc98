/// Two-stage ONNX inference backend: a YOLO-style face detector followed by
/// a FER expression classifier run on each face crop.
///
/// Both sessions are created up front by `load`; a failure there is the
/// model-loading failure the lifecycle treats as fatal. `detect` itself only
/// ever produces per-call `InferenceError`s.
use std::path::Path;

use crate::detection::domain::expression::{Expression, ExpressionScores};
use crate::detection::domain::expression_detector::{
    ExpressionDetector, InferenceError, ModelLoadError,
};
use crate::detection::domain::face_detection::FaceDetection;
use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::EMOTION_INPUT_SIZE;
use crate::shared::frame::FrameSample;

/// Fallback face-model input resolution when the model doesn't specify one.
const DEFAULT_FACE_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold for the face stage.
const NMS_IOU_THRESH: f64 = 0.45;

/// FER class index order emitted by the expression model. This is the wire
/// format of the classifier, not the label enumeration order.
const FER_CLASS_ORDER: [Expression; Expression::COUNT] = [
    Expression::Angry,
    Expression::Disgusted,
    Expression::Fearful,
    Expression::Happy,
    Expression::Sad,
    Expression::Surprised,
    Expression::Neutral,
];

pub struct OnnxExpressionDetector {
    face_session: ort::session::Session,
    emotion_session: ort::session::Session,
    confidence: f32,
    face_input_size: u32,
}

impl OnnxExpressionDetector {
    /// Load both model files and prepare the inference sessions.
    ///
    /// The face model's input resolution is read from its input shape
    /// (expecting NCHW), falling back to 640 when dynamic.
    pub fn load(
        face_model: &Path,
        emotion_model: &Path,
        confidence: f32,
    ) -> Result<Self, ModelLoadError> {
        for path in [face_model, emotion_model] {
            if !path.exists() {
                return Err(ModelLoadError::Missing(path.to_path_buf()));
            }
        }

        let face_session = build_session(face_model)?;
        let emotion_session = build_session(emotion_model)?;

        let face_input_size = face_session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    // NCHW: [1, 3, H, W]; H and W are equal for square input
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_FACE_INPUT_SIZE);

        Ok(Self {
            face_session,
            emotion_session,
            confidence,
            face_input_size,
        })
    }

    fn detect_faces(&mut self, frame: &FrameSample) -> Result<Vec<BoundingBox>, InferenceError> {
        let mapping = Letterbox::fit(frame.size(), self.face_input_size);
        let tensor = mapping.to_tensor(frame);

        let input = ort::value::Tensor::from_array(tensor).map_err(backend)?;
        let outputs = self.face_session.run(ort::inputs![input]).map_err(backend)?;
        if outputs.len() == 0 {
            return Err(InferenceError::Backend(
                "face model produced no outputs".into(),
            ));
        }
        let output = outputs[0].try_extract_array::<f32>().map_err(backend)?;
        let shape = output.shape().to_vec();
        let data = output
            .as_slice()
            .ok_or_else(|| InferenceError::Backend("face output is not contiguous".into()))?;

        let rows = parse_rows(data, &shape, self.confidence)?;
        let candidates: Vec<(BoundingBox, f32)> = rows
            .into_iter()
            .map(|(cx, cy, w, h, conf)| (mapping.to_native(cx, cy, w, h), conf))
            .collect();

        let kept = nms(candidates, NMS_IOU_THRESH);
        Ok(kept
            .into_iter()
            .map(|(b, _)| b.clamped(frame.width() as f64, frame.height() as f64))
            .filter(|b| b.width >= 1.0 && b.height >= 1.0)
            .collect())
    }

    fn classify(
        &mut self,
        frame: &FrameSample,
        bbox: &BoundingBox,
    ) -> Result<ExpressionScores, InferenceError> {
        let crop = gray_crop(frame, bbox, EMOTION_INPUT_SIZE);
        let input = ort::value::Tensor::from_array(crop).map_err(backend)?;
        let outputs = self
            .emotion_session
            .run(ort::inputs![input])
            .map_err(backend)?;
        if outputs.len() == 0 {
            return Err(InferenceError::Backend(
                "expression model produced no outputs".into(),
            ));
        }
        let output = outputs[0].try_extract_array::<f32>().map_err(backend)?;
        let logits: Vec<f32> = output.iter().copied().collect();
        if logits.len() < Expression::COUNT {
            return Err(InferenceError::Backend(format!(
                "expected {} expression logits, got {}",
                Expression::COUNT,
                logits.len()
            )));
        }
        Ok(scores_from_logits(&logits[..Expression::COUNT]))
    }
}

impl ExpressionDetector for OnnxExpressionDetector {
    fn detect(&mut self, frame: &FrameSample) -> Result<Vec<FaceDetection>, InferenceError> {
        if frame.width() == 0 || frame.height() == 0 {
            return Err(InferenceError::EmptyFrame);
        }

        let boxes = self.detect_faces(frame)?;
        let mut detections = Vec::with_capacity(boxes.len());
        for bounding_box in boxes {
            let scores = self.classify(frame, &bounding_box)?;
            detections.push(FaceDetection {
                bounding_box,
                scores,
            });
        }
        Ok(detections)
    }
}

fn build_session(path: &Path) -> Result<ort::session::Session, ModelLoadError> {
    ort::session::Session::builder()
        .and_then(|b| Ok(b.with_execution_providers(preferred_execution_providers())?))
        .and_then(|mut b| b.commit_from_file(path))
        .map_err(|e| ModelLoadError::Session(e.to_string()))
}

/// Preferred ONNX execution providers for the current platform, falling
/// back to CPU when the platform-specific provider is unavailable.
fn preferred_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    {
        vec![ort::execution_providers::CoreMLExecutionProvider::default().build()]
    }
    #[cfg(target_os = "windows")]
    {
        vec![ort::execution_providers::DirectMLExecutionProvider::default().build()]
    }
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    {
        vec![]
    }
}

fn backend<E: std::fmt::Display>(e: E) -> InferenceError {
    InferenceError::Backend(e.to_string())
}

// ---------------------------------------------------------------------------
// Face stage geometry
// ---------------------------------------------------------------------------

/// Mapping between native-frame coordinates and the square letterboxed
/// input the face model sees.
#[derive(Clone, Copy, Debug)]
struct Letterbox {
    scale: f64,
    pad_x: u32,
    pad_y: u32,
    target: u32,
}

impl Letterbox {
    fn fit((width, height): (u32, u32), target: u32) -> Self {
        let scale = (target as f64 / width as f64).min(target as f64 / height as f64);
        let new_w = (width as f64 * scale).round() as u32;
        let new_h = (height as f64 * scale).round() as u32;
        Self {
            scale,
            pad_x: (target - new_w) / 2,
            pad_y: (target - new_h) / 2,
            target,
        }
    }

    /// Resize the frame into the letterboxed square, normalized NCHW
    /// float32, padding filled with the YOLO-convention gray.
    fn to_tensor(&self, frame: &FrameSample) -> ndarray::Array4<f32> {
        let target = self.target as usize;
        let gray = 114.0f32 / 255.0;
        let mut tensor = ndarray::Array4::<f32>::from_elem((1, 3, target, target), gray);

        let src = frame.as_ndarray();
        let src_w = frame.width() as usize;
        let src_h = frame.height() as usize;
        let new_w = (frame.width() as f64 * self.scale).round() as usize;
        let new_h = (frame.height() as f64 * self.scale).round() as usize;

        for y in 0..new_h {
            let src_y = ((y as f64 / self.scale) as usize).min(src_h - 1);
            for x in 0..new_w {
                let src_x = ((x as f64 / self.scale) as usize).min(src_w - 1);
                let ty = self.pad_y as usize + y;
                let tx = self.pad_x as usize + x;
                for c in 0..3 {
                    tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
                }
            }
        }
        tensor
    }

    /// Map a center-format box in letterbox coordinates back to a
    /// top-left-format box in native-frame coordinates.
    fn to_native(&self, cx: f32, cy: f32, w: f32, h: f32) -> BoundingBox {
        let x = (cx as f64 - w as f64 / 2.0 - self.pad_x as f64) / self.scale;
        let y = (cy as f64 - h as f64 / 2.0 - self.pad_y as f64) / self.scale;
        BoundingBox::new(x, y, w as f64 / self.scale, h as f64 / self.scale)
    }
}

/// Parse YOLO output rows `[cx, cy, w, h, conf, ...]` above the confidence
/// threshold. Handles both `[1, features, detections]` (transposed) and
/// `[1, detections, features]` layouts.
fn parse_rows(
    data: &[f32],
    shape: &[usize],
    confidence: f32,
) -> Result<Vec<(f32, f32, f32, f32, f32)>, InferenceError> {
    if shape.len() != 3 {
        return Err(InferenceError::Backend(format!(
            "unexpected face output shape: {shape:?}"
        )));
    }
    let transposed = shape[1] < shape[2];
    let (num_dets, num_feats) = if transposed {
        (shape[2], shape[1])
    } else {
        (shape[1], shape[2])
    };
    if num_feats < 5 {
        return Err(InferenceError::Backend(format!(
            "face output rows too short: {num_feats} features"
        )));
    }

    let at = |det: usize, feat: usize| {
        if transposed {
            data[feat * num_dets + det]
        } else {
            data[det * num_feats + feat]
        }
    };

    let mut rows = Vec::new();
    for i in 0..num_dets {
        let conf = at(i, 4);
        if conf >= confidence {
            rows.push((at(i, 0), at(i, 1), at(i, 2), at(i, 3), conf));
        }
    }
    Ok(rows)
}

/// Greedy NMS: highest confidence first, suppress boxes overlapping a kept
/// one above the threshold.
fn nms(mut candidates: Vec<(BoundingBox, f32)>, iou_thresh: f64) -> Vec<(BoundingBox, f32)> {
    candidates.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    let mut kept: Vec<(BoundingBox, f32)> = Vec::new();
    for (bbox, conf) in candidates {
        if kept.iter().all(|(k, _)| bbox.iou(k) <= iou_thresh) {
            kept.push((bbox, conf));
        }
    }
    kept
}

// ---------------------------------------------------------------------------
// Expression stage
// ---------------------------------------------------------------------------

/// Extract the face crop as a normalized grayscale square, NCHW float32.
fn gray_crop(frame: &FrameSample, bbox: &BoundingBox, size: u32) -> ndarray::Array4<f32> {
    let size_us = size as usize;
    let mut tensor = ndarray::Array4::<f32>::zeros((1, 1, size_us, size_us));

    let src = frame.as_ndarray();
    let src_w = frame.width() as usize;
    let src_h = frame.height() as usize;

    for y in 0..size_us {
        let fy = bbox.y + bbox.height * (y as f64 + 0.5) / size as f64;
        let src_y = (fy as usize).min(src_h.saturating_sub(1));
        for x in 0..size_us {
            let fx = bbox.x + bbox.width * (x as f64 + 0.5) / size as f64;
            let src_x = (fx as usize).min(src_w.saturating_sub(1));
            let r = src[[src_y, src_x, 0]] as f32;
            let g = src[[src_y, src_x, 1]] as f32;
            let b = src[[src_y, src_x, 2]] as f32;
            // ITU-R BT.601 luma
            tensor[[0, 0, y, x]] = (0.299 * r + 0.587 * g + 0.114 * b) / 255.0;
        }
    }
    tensor
}

/// Softmax over the FER logits, mapped from wire order into the label set.
fn scores_from_logits(logits: &[f32]) -> ExpressionScores {
    let max = logits.iter().copied().fold(f32::NEG_INFINITY, f32::max);
    let exps: Vec<f32> = logits.iter().map(|&l| (l - max).exp()).collect();
    let sum: f32 = exps.iter().sum();

    let mut scores = ExpressionScores::new();
    for (i, &label) in FER_CLASS_ORDER.iter().enumerate() {
        scores.set(label, exps[i] / sum);
    }
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    // ── Letterbox geometry ───────────────────────────────────────────

    #[test]
    fn test_letterbox_square_input_has_no_padding() {
        let m = Letterbox::fit((640, 640), 640);
        assert_relative_eq!(m.scale, 1.0);
        assert_eq!((m.pad_x, m.pad_y), (0, 0));
    }

    #[test]
    fn test_letterbox_wide_input_pads_vertically() {
        let m = Letterbox::fit((640, 480), 640);
        assert_relative_eq!(m.scale, 1.0);
        assert_eq!(m.pad_x, 0);
        assert_eq!(m.pad_y, 80); // (640 - 480) / 2
    }

    #[test]
    fn test_letterbox_round_trip_to_native() {
        let m = Letterbox::fit((1280, 720), 640);
        // A box centered at native (640, 360) with size 200x100 maps to
        // letterbox coords and back unchanged.
        let scale = m.scale;
        let cx = (640.0 * scale + m.pad_x as f64) as f32;
        let cy = (360.0 * scale + m.pad_y as f64) as f32;
        let w = (200.0 * scale) as f32;
        let h = (100.0 * scale) as f32;
        let native = m.to_native(cx, cy, w, h);
        assert_relative_eq!(native.x, 540.0, epsilon = 1.0);
        assert_relative_eq!(native.y, 310.0, epsilon = 1.0);
        assert_relative_eq!(native.width, 200.0, epsilon = 1.0);
        assert_relative_eq!(native.height, 100.0, epsilon = 1.0);
    }

    #[test]
    fn test_letterbox_tensor_shape_and_padding_fill() {
        let frame = FrameSample::new(vec![255u8; 4 * 2 * 3], 4, 2);
        let m = Letterbox::fit(frame.size(), 8);
        let tensor = m.to_tensor(&frame);
        assert_eq!(tensor.shape(), &[1, 3, 8, 8]);
        // top-left corner lies in the vertical padding band
        assert_relative_eq!(tensor[[0, 0, 0, 0]], 114.0 / 255.0);
        // center row holds the (white) image content
        assert_relative_eq!(tensor[[0, 0, 4, 0]], 1.0);
    }

    // ── Output parsing ───────────────────────────────────────────────

    #[test]
    fn test_parse_rows_filters_by_confidence() {
        // [1, 6 detections, 5 features], detection-major: more detections
        // than features, so the layout is read as-is.
        #[rustfmt::skip]
        let data = [
            10.0, 10.0, 4.0, 4.0, 0.9, // keep
            50.0, 50.0, 4.0, 4.0, 0.2, // below threshold
            20.0, 20.0, 4.0, 4.0, 0.1,
            30.0, 30.0, 4.0, 4.0, 0.1,
            40.0, 40.0, 4.0, 4.0, 0.1,
            60.0, 60.0, 4.0, 4.0, 0.7, // keep
        ];
        let rows = parse_rows(&data, &[1, 6, 5], 0.5).unwrap();
        assert_eq!(rows.len(), 2);
        assert_relative_eq!(rows[0].4, 0.9);
        assert_relative_eq!(rows[1].0, 60.0);
    }

    #[test]
    fn test_parse_rows_transposed_layout() {
        // [1, 5 features, 6 detections]: feature-major, detected because
        // the middle axis is the smaller one.
        #[rustfmt::skip]
        let data = [
            10.0, 50.0, 20.0, 30.0, 40.0, 60.0, // cx
            12.0, 52.0, 22.0, 32.0, 42.0, 62.0, // cy
             4.0,  6.0,  4.0,  4.0,  4.0,  4.0, // w
             4.0,  6.0,  4.0,  4.0,  4.0,  4.0, // h
             0.9,  0.8,  0.1,  0.1,  0.1,  0.1, // conf
        ];
        let rows = parse_rows(&data, &[1, 5, 6], 0.5).unwrap();
        assert_eq!(rows.len(), 2);
        assert_relative_eq!(rows[0].0, 10.0);
        assert_relative_eq!(rows[1].1, 52.0);
    }

    #[test]
    fn test_parse_rows_rejects_bad_shape() {
        assert!(parse_rows(&[0.0; 4], &[2, 2], 0.5).is_err());
    }

    // ── NMS ──────────────────────────────────────────────────────────

    #[test]
    fn test_nms_suppresses_overlapping_lower_confidence() {
        let a = (BoundingBox::new(0.0, 0.0, 100.0, 100.0), 0.9);
        let b = (BoundingBox::new(5.0, 5.0, 100.0, 100.0), 0.7);
        let kept = nms(vec![b, a], NMS_IOU_THRESH);
        assert_eq!(kept.len(), 1);
        assert_relative_eq!(kept[0].1, 0.9);
    }

    #[test]
    fn test_nms_keeps_disjoint_boxes() {
        let a = (BoundingBox::new(0.0, 0.0, 50.0, 50.0), 0.9);
        let b = (BoundingBox::new(200.0, 200.0, 50.0, 50.0), 0.6);
        let kept = nms(vec![a, b], NMS_IOU_THRESH);
        assert_eq!(kept.len(), 2);
    }

    // ── Expression stage ─────────────────────────────────────────────

    #[test]
    fn test_scores_from_logits_sum_to_one() {
        let scores = scores_from_logits(&[1.0, 2.0, 0.5, 3.0, 0.0, 1.5, 2.5]);
        let total: f32 = Expression::ALL.iter().map(|&l| scores.get(l)).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-5);
    }

    #[test]
    fn test_scores_from_logits_maps_wire_order() {
        // Highest logit at FER index 3 → happy
        let scores = scores_from_logits(&[0.0, 0.0, 0.0, 5.0, 0.0, 0.0, 0.0]);
        assert_eq!(scores.dominant().0, Expression::Happy);
    }

    #[rstest]
    #[case(0, Expression::Angry)]
    #[case(1, Expression::Disgusted)]
    #[case(2, Expression::Fearful)]
    #[case(4, Expression::Sad)]
    #[case(5, Expression::Surprised)]
    #[case(6, Expression::Neutral)]
    fn test_fer_index_mapping(#[case] index: usize, #[case] expected: Expression) {
        let mut logits = [0.0f32; Expression::COUNT];
        logits[index] = 5.0;
        assert_eq!(scores_from_logits(&logits).dominant().0, expected);
    }

    #[test]
    fn test_gray_crop_shape_and_luma() {
        // Uniform mid-gray frame: every crop pixel is ~0.5
        let frame = FrameSample::new(vec![128u8; 8 * 8 * 3], 8, 8);
        let crop = gray_crop(&frame, &BoundingBox::new(2.0, 2.0, 4.0, 4.0), 16);
        assert_eq!(crop.shape(), &[1, 1, 16, 16]);
        assert_relative_eq!(crop[[0, 0, 8, 8]], 128.0 / 255.0, epsilon = 1e-3);
    }

    #[test]
    fn test_gray_crop_clamps_out_of_range_boxes() {
        let frame = FrameSample::new(vec![10u8; 4 * 4 * 3], 4, 4);
        // box extends past the frame edge; sampling clamps instead of panicking
        let crop = gray_crop(&frame, &BoundingBox::new(2.0, 2.0, 10.0, 10.0), 8);
        assert_relative_eq!(crop[[0, 0, 7, 7]], 10.0 / 255.0, epsilon = 1e-3);
    }
}
