pub const FACE_MODEL_NAME: &str = "yolov8n-face_widerface.onnx";
pub const FACE_MODEL_URL: &str =
    "https://github.com/neutrinographics/facemood/releases/download/v0.1.0/yolov8n-face_widerface.onnx";

pub const EMOTION_MODEL_NAME: &str = "emotion_fer2013.onnx";
pub const EMOTION_MODEL_URL: &str =
    "https://github.com/neutrinographics/facemood/releases/download/v0.1.0/emotion_fer2013.onnx";

/// Default sampling cadence for the detection loop.
pub const DEFAULT_TICK_PERIOD_MS: u64 = 250;

/// Default face-detection confidence threshold.
pub const DEFAULT_CONFIDENCE: f32 = 0.5;

/// Expression classifier input resolution (square grayscale crop).
pub const EMOTION_INPUT_SIZE: u32 = 64;
