use std::fmt;
use std::path::PathBuf;

use crate::shared::bounding_box::BoundingBox;
use crate::shared::constants::DEFAULT_CONFIDENCE;
use crate::shared::frame::Frame;

/// Domain interface for face detection.
///
/// Implementations may keep per-stream state (video running mode), hence
/// `&mut self`. Boxes are in frame pixel units and never degenerate.
pub trait FaceDetector: Send {
    fn detect(
        &mut self,
        frame: &Frame,
        timestamp_ms: f64,
    ) -> Result<Vec<BoundingBox>, Box<dyn std::error::Error>>;

    /// Releases inference resources. The detector must not be used afterwards.
    fn close(&mut self) {}
}

/// Hardware backend the inference engine should prefer.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Delegate {
    #[default]
    Gpu,
    Cpu,
}

impl fmt::Display for Delegate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Delegate::Gpu => write!(f, "gpu"),
            Delegate::Cpu => write!(f, "cpu"),
        }
    }
}

impl std::str::FromStr for Delegate {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gpu" => Ok(Delegate::Gpu),
            "cpu" => Ok(Delegate::Cpu),
            other => Err(format!("Delegate must be 'gpu' or 'cpu', got '{other}'")),
        }
    }
}

/// Where the detection model comes from.
#[derive(Clone, Debug, PartialEq)]
pub enum ModelAsset {
    /// A model file already on disk.
    Path(PathBuf),
    /// A named model looked up in the cache, fetched from `url` when missing.
    Url { name: String, url: String },
    /// A named model that must already be cached or bundled.
    Named(String),
}

impl ModelAsset {
    /// Interprets `http(s)://` locations as downloadable, anything else as a path.
    pub fn parse(location: &str) -> Self {
        if location.starts_with("http://") || location.starts_with("https://") {
            let name = location
                .rsplit('/')
                .next()
                .filter(|n| !n.is_empty())
                .unwrap_or("model.onnx")
                .to_string();
            ModelAsset::Url {
                name,
                url: location.to_string(),
            }
        } else {
            ModelAsset::Path(PathBuf::from(location))
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct DetectorConfig {
    pub model: ModelAsset,
    pub delegate: Delegate,
    pub confidence: f64,
}

impl DetectorConfig {
    pub fn new(model: ModelAsset) -> Self {
        Self {
            model,
            delegate: Delegate::default(),
            confidence: DEFAULT_CONFIDENCE,
        }
    }
}

/// Builds a ready detector from configuration.
///
/// Runs on a setup thread, so it may block on model download and session
/// creation.
pub trait DetectorProvider: Send + Sync {
    fn create(
        &self,
        config: &DetectorConfig,
    ) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error + Send + Sync>>;
}
