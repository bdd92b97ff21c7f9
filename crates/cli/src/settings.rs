use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use spotlight_core::shared::constants::{
    DEFAULT_ALPHA, DEFAULT_CONFIDENCE, DEFAULT_MARGIN, DEFAULT_PREVIEW_SIZE, DEFAULT_THRESHOLD,
    DEFAULT_TICK_RATE,
};

/// Persisted defaults for the spotlight CLI. Flags override these per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Model path or URL. `None` uses the cached/bundled BlazeFace model.
    pub model: Option<String>,
    pub delegate: String,
    pub confidence: f64,
    pub margin: f64,
    pub threshold: f64,
    pub alpha: f64,
    pub preview_size: u32,
    pub circle_mask: bool,
    pub fps: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            model: None,
            delegate: "gpu".to_string(),
            confidence: DEFAULT_CONFIDENCE,
            margin: DEFAULT_MARGIN,
            threshold: DEFAULT_THRESHOLD,
            alpha: DEFAULT_ALPHA,
            preview_size: DEFAULT_PREVIEW_SIZE,
            circle_mask: true,
            fps: DEFAULT_TICK_RATE,
        }
    }
}

impl Settings {
    pub fn config_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("Face Spotlight").join("settings.json"))
    }

    pub fn load() -> Self {
        Self::config_path()
            .map(|path| Self::load_from(&path))
            .unwrap_or_default()
    }

    /// Missing or unreadable files yield defaults.
    pub fn load_from(path: &Path) -> Self {
        fs::read_to_string(path)
            .ok()
            .and_then(|json| match serde_json::from_str(&json) {
                Ok(settings) => Some(settings),
                Err(e) => {
                    log::warn!("Ignoring invalid settings in {}: {e}", path.display());
                    None
                }
            })
            .unwrap_or_default()
    }

    pub fn save(&self) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let path = Self::config_path().ok_or("No config directory on this platform")?;
        self.save_to(&path)?;
        Ok(path)
    }

    pub fn save_to(&self, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("settings.json"));
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("settings.json");
        let settings = Settings {
            model: Some("/models/face.onnx".into()),
            delegate: "cpu".into(),
            margin: 80.0,
            circle_mask: false,
            ..Settings::default()
        };
        settings.save_to(&path).unwrap();
        assert_eq!(Settings::load_from(&path), settings);
    }

    #[test]
    fn test_partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, r#"{ "alpha": 0.25 }"#).unwrap();

        let settings = Settings::load_from(&path);
        assert_eq!(settings.alpha, 0.25);
        assert_eq!(settings.margin, DEFAULT_MARGIN);
        assert_eq!(settings.delegate, "gpu");
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(&path, "not json").unwrap();
        assert_eq!(Settings::load_from(&path), Settings::default());
    }
}
