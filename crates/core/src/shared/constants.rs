/// Pixels added on every side of a detection before smoothing.
pub const DEFAULT_MARGIN: f64 = 120.0;

/// Smallest per-field change treated as real motion.
pub const DEFAULT_THRESHOLD: f64 = 5.0;

/// Fraction of the way the display box moves towards a new detection.
pub const DEFAULT_ALPHA: f64 = 0.5;

/// Edge length of the square preview surface, in pixels.
pub const DEFAULT_PREVIEW_SIZE: u32 = 120;

/// Scheduler tick rate when no display refresh rate is known.
pub const DEFAULT_TICK_RATE: f64 = 60.0;

pub const BLAZEFACE_MODEL_NAME: &str = "blaze_face_short_range.onnx";

pub const DEFAULT_CONFIDENCE: f64 = 0.5;
