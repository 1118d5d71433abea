// JSON-file configuration loading for the anti-spam detector.
//
// The config is read once at startup; there is no hot reload. A missing
// file is not an error - we fall back to the compiled defaults, and any
// field omitted from the file keeps its default value.

use crate::core::antispam::DetectionConfig;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Load the detection config from a JSON file, falling back to defaults
/// when the file does not exist.
pub fn load_detection_config(path: impl AsRef<Path>) -> Result<DetectionConfig, ConfigLoadError> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::info!(
            "No anti-spam config at {}, using built-in defaults",
            path.display()
        );
        return Ok(DetectionConfig::default());
    }

    let file = std::fs::File::open(path)?;
    let config = serde_json::from_reader(file)?;
    Ok(config)
}
