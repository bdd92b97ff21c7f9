use std::path::PathBuf;

use crate::detection::domain::face_detector::{DetectorConfig, DetectorProvider, FaceDetector};
use crate::detection::infrastructure::model_resolver::{self, ProgressFn};
use crate::detection::infrastructure::onnx_blazeface_detector::OnnxBlazefaceDetector;

type SetupError = Box<dyn std::error::Error + Send + Sync>;

/// Resolves the configured model asset and opens a BlazeFace session.
pub struct BlazefaceProvider {
    bundled_dir: Option<PathBuf>,
    progress: Option<fn(u64, u64)>,
}

impl BlazefaceProvider {
    pub fn new() -> Self {
        Self {
            bundled_dir: None,
            progress: None,
        }
    }

    /// Directory checked after the user cache, e.g. models shipped next to the binary.
    pub fn with_bundled_dir(mut self, dir: PathBuf) -> Self {
        self.bundled_dir = Some(dir);
        self
    }

    pub fn with_download_progress(mut self, progress: fn(u64, u64)) -> Self {
        self.progress = Some(progress);
        self
    }
}

impl Default for BlazefaceProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectorProvider for BlazefaceProvider {
    fn create(&self, config: &DetectorConfig) -> Result<Box<dyn FaceDetector>, SetupError> {
        let progress: Option<ProgressFn> = self
            .progress
            .map(|cb| Box::new(cb) as ProgressFn);
        let model_path =
            model_resolver::resolve_asset(&config.model, self.bundled_dir.as_deref(), progress)?;

        let detector = OnnxBlazefaceDetector::new(&model_path, config.delegate, config.confidence)
            .map_err(|e| -> SetupError { e.to_string().into() })?;
        Ok(Box::new(detector))
    }
}
