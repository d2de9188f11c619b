use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{timing::LINEAR, Result};

/// Top-level configuration structure for the application.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub morph: MorphConfig,
    #[serde(default)]
    pub host: HostConfig,
}

impl AppConfig {
    pub fn from_json(contents: &str) -> Result<Self> {
        Ok(serde_json::from_str(contents)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_json(&contents)?;
        tracing::debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Timing parameters of a morph run. Durations are in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MorphConfig {
    #[serde(default = "default_duration")]
    pub duration: f64,
    #[serde(default)]
    pub start_delay: f64,
    #[serde(default = "default_timing")]
    pub timing: String,
    /// Clamp the elapsed ratio into `[0, 1]` so the final frame reports
    /// exactly `timing(1.0)`.
    #[serde(default)]
    pub clamp_ratio: bool,
}

impl Default for MorphConfig {
    fn default() -> Self {
        Self {
            duration: default_duration(),
            start_delay: 0.0,
            timing: default_timing(),
            clamp_ratio: false,
        }
    }
}

/// Configuration of the real-time frame host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HostConfig {
    #[serde(default = "default_refresh_hz")]
    pub refresh_hz: u32,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            refresh_hz: default_refresh_hz(),
        }
    }
}

fn default_duration() -> f64 {
    crate::scheduler::DEFAULT_DURATION_SECS
}

fn default_timing() -> String {
    LINEAR.to_string()
}

fn default_refresh_hz() -> u32 {
    60
}
