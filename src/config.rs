//! Tunable parameters for the hourly-demand feature pipeline.

use anyhow::{Context, Result, ensure};
use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_WINDOW_SIZE: usize = 28;
pub const DEFAULT_STEP_SIZE: usize = 1;
pub const DEFAULT_TOP_K: usize = 3;
pub const DEFAULT_MAX_TRIP_DURATION_HOURS: i64 = 5;

/// Window, ranking, and cleaning parameters shared by training and inference runs.
///
/// Both runs must use the same values or the feature layout drifts. Stored as a
/// plain JSON object on disk, every field optional:
/// ```json
/// {
///   "window_size": 28,
///   "step_size": 1,
///   "top_k": 3,
///   "max_trip_duration_hours": 5
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub window_size: usize,
    pub step_size: usize,
    pub top_k: usize,
    pub max_trip_duration_hours: i64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_size: DEFAULT_WINDOW_SIZE,
            step_size: DEFAULT_STEP_SIZE,
            top_k: DEFAULT_TOP_K,
            max_trip_duration_hours: DEFAULT_MAX_TRIP_DURATION_HOURS,
        }
    }
}

impl PipelineConfig {
    /// Loads the config from a JSON file at `path`. Missing fields keep their defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("reading pipeline config '{}'", path.display()))?;
        let config: PipelineConfig = serde_json::from_str(&content)
            .with_context(|| format!("parsing pipeline config '{}'", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        ensure!(self.window_size >= 1, "window_size must be at least 1");
        ensure!(self.step_size >= 1, "step_size must be at least 1");
        ensure!(self.top_k >= 1, "top_k must be at least 1");
        ensure!(
            self.max_trip_duration_hours > 0,
            "max_trip_duration_hours must be positive"
        );
        ensure!(
            Duration::try_hours(self.max_trip_duration_hours).is_some(),
            "max_trip_duration_hours is too large: {}",
            self.max_trip_duration_hours
        );
        Ok(())
    }

    /// Saturates at [`Duration::MAX`] for values `validate` rejects.
    pub fn max_trip_duration(&self) -> Duration {
        Duration::try_hours(self.max_trip_duration_hours).unwrap_or(Duration::MAX)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.window_size, 28);
        assert_eq!(config.step_size, 1);
        assert_eq!(config.top_k, 3);
        assert_eq!(config.max_trip_duration(), Duration::hours(5));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_load_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "window_size": 12 }}"#).unwrap();

        let config = PipelineConfig::load(file.path()).unwrap();
        assert_eq!(config.window_size, 12);
        assert_eq!(config.top_k, 3);
    }

    #[test]
    fn test_load_rejects_zero_step() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "step_size": 0 }}"#).unwrap();

        assert!(PipelineConfig::load(file.path()).is_err());
    }

    #[test]
    fn test_validate_rejects_huge_trip_duration() {
        let config = PipelineConfig {
            max_trip_duration_hours: i64::MAX / 1000,
            ..PipelineConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.max_trip_duration(), Duration::MAX);
    }
}
