//! Service configuration loader - parses predictor.toml
//!
//! Keeps artifact locations, pipeline policies and endpoint settings out of
//! code so a deployment can swap models or tighten timeouts without
//! recompiling. Every section is optional; omitted values fall back to the
//! defaults below.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::model::WINDOW_LENGTH;

/// Default config file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "predictor.toml";

// ---------------------------------------------------------------------------
// Policies
// ---------------------------------------------------------------------------

/// What to do when fewer than `window_length - 1` history rows exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShortWindowPolicy {
    /// Run inference on the shorter window as-is.
    Proceed,
    /// Repeat the oldest available row at the front until the window is full.
    PadOldest,
    /// Skip inference and report insufficient history.
    Reject,
}

/// What to do when a row already exists at the same epoch second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicatePolicy {
    /// Last write wins.
    Overwrite,
    /// Fail the write with `StoreError::DuplicateKey`.
    Reject,
}

// ---------------------------------------------------------------------------
// Sections
// ---------------------------------------------------------------------------

/// Root configuration structure for TOML parsing
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub artifacts: ArtifactConfig,
    pub pipeline: PipelineConfig,
    pub endpoint: EndpointConfig,
    pub logging: LoggingConfig,
}

/// Locations of the fitted scaler and the two horizon classifiers.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ArtifactConfig {
    pub scaler: PathBuf,
    pub classifier_24h: PathBuf,
    pub classifier_48h: PathBuf,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            scaler: PathBuf::from("models/scaler.json"),
            classifier_24h: PathBuf::from("models/flood_24h.json"),
            classifier_48h: PathBuf::from("models/flood_48h.json"),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Timesteps per rolling window, new reading included.
    pub window_length: usize,
    pub short_window_policy: ShortWindowPolicy,
    pub duplicate_timestamp_policy: DuplicatePolicy,
    /// Deadline for each classifier call.
    pub classifier_timeout_ms: u64,
    /// Allowed drift of a probability vector's sum from 1.0.
    pub probability_tolerance: f64,
    /// Threads available for classifier calls.
    pub inference_workers: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            window_length: WINDOW_LENGTH,
            short_window_policy: ShortWindowPolicy::Proceed,
            duplicate_timestamp_policy: DuplicatePolicy::Overwrite,
            classifier_timeout_ms: 5_000,
            probability_tolerance: 1e-3,
            inference_workers: 4,
        }
    }
}

impl PipelineConfig {
    pub fn classifier_timeout(&self) -> Duration {
        Duration::from_millis(self.classifier_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EndpointConfig {
    pub port: u16,
    pub api_keys: Vec<String>,
    pub require_api_key: bool,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            port: 5000,
            api_keys: Vec::new(),
            require_api_key: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub filter: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

impl ServiceConfig {
    /// Parses and validates a config document.
    pub fn from_toml_str(contents: &str, path: &Path) -> Result<Self, ConfigError> {
        let config: ServiceConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let p = &self.pipeline;
        if p.window_length == 0 {
            return Err(ConfigError::Invalid("pipeline.window_length must be at least 1".into()));
        }
        if p.classifier_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "pipeline.classifier_timeout_ms must be at least 1".into(),
            ));
        }
        if !(p.probability_tolerance > 0.0 && p.probability_tolerance < 1.0) {
            return Err(ConfigError::Invalid(format!(
                "pipeline.probability_tolerance must be in (0, 1), got {}",
                p.probability_tolerance
            )));
        }
        if p.inference_workers < 2 {
            return Err(ConfigError::Invalid(
                "pipeline.inference_workers must be at least 2".into(),
            ));
        }
        Ok(())
    }

    /// Applies `PORT` and `FLOPRED_ENV` from the environment.
    pub fn apply_env_overrides(&mut self) {
        if let Some(port) = env::var("PORT").ok().and_then(|p| p.parse().ok()) {
            self.endpoint.port = port;
        }
        if is_development() {
            self.endpoint.require_api_key = false;
        }
    }
}

/// True when `FLOPRED_ENV=development`.
pub fn is_development() -> bool {
    env::var("FLOPRED_ENV").map(|v| v == "development").unwrap_or(false)
}

/// Loads configuration from an explicit file path. The file must exist.
pub fn load_config_from(path: &Path) -> Result<ServiceConfig, ConfigError> {
    let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    ServiceConfig::from_toml_str(&contents, path)
}

/// Loads configuration from `FLOPRED_CONFIG`, or `predictor.toml` in the
/// working directory, then applies environment overrides.
///
/// An explicitly named file must exist. When falling back to the default
/// path and no file is there, built-in defaults are used.
pub fn load_config() -> Result<ServiceConfig, ConfigError> {
    dotenv::dotenv().ok();

    let mut config = match env::var("FLOPRED_CONFIG") {
        Ok(path) => load_config_from(Path::new(&path))?,
        Err(_) => {
            let path = Path::new(DEFAULT_CONFIG_PATH);
            if path.exists() {
                load_config_from(path)?
            } else {
                ServiceConfig::default()
            }
        }
    };

    config.apply_env_overrides();
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn parse(contents: &str) -> Result<ServiceConfig, ConfigError> {
        ServiceConfig::from_toml_str(contents, Path::new("test.toml"))
    }

    #[test]
    fn test_empty_document_uses_defaults() {
        let config = parse("").unwrap();
        assert_eq!(config.pipeline.window_length, 30);
        assert_eq!(config.pipeline.short_window_policy, ShortWindowPolicy::Proceed);
        assert_eq!(config.pipeline.duplicate_timestamp_policy, DuplicatePolicy::Overwrite);
        assert_eq!(config.pipeline.classifier_timeout(), Duration::from_secs(5));
        assert_eq!(config.endpoint.port, 5000);
        assert_eq!(config.artifacts.scaler, PathBuf::from("models/scaler.json"));
    }

    #[test]
    fn test_policies_parse_from_snake_case() {
        let config = parse(
            r#"
            [pipeline]
            short_window_policy = "pad_oldest"
            duplicate_timestamp_policy = "reject"
            classifier_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.pipeline.short_window_policy, ShortWindowPolicy::PadOldest);
        assert_eq!(config.pipeline.duplicate_timestamp_policy, DuplicatePolicy::Reject);
        assert_eq!(config.pipeline.classifier_timeout_ms, 250);
    }

    #[test]
    fn test_unknown_policy_is_parse_error() {
        let err = parse("[pipeline]\nshort_window_policy = \"guess\"\n").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_zero_window_rejected() {
        let err = parse("[pipeline]\nwindow_length = 0\n").unwrap_err();
        assert!(err.to_string().contains("window_length"));
    }

    #[test]
    fn test_tolerance_out_of_range_rejected() {
        assert!(parse("[pipeline]\nprobability_tolerance = 0.0\n").is_err());
        assert!(parse("[pipeline]\nprobability_tolerance = 1.5\n").is_err());
    }

    #[test]
    fn test_single_worker_rejected() {
        assert!(parse("[pipeline]\ninference_workers = 1\n").is_err());
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[endpoint]
port = 8081
api_keys = ["abc"]

[artifacts]
scaler = "/opt/models/scaler.json"
"#
        )
        .unwrap();

        let config = load_config_from(file.path()).unwrap();
        assert_eq!(config.endpoint.port, 8081);
        assert_eq!(config.endpoint.api_keys, vec!["abc".to_string()]);
        assert_eq!(config.artifacts.scaler, PathBuf::from("/opt/models/scaler.json"));
        // Untouched keys keep their defaults
        assert_eq!(config.artifacts.classifier_48h, PathBuf::from("models/flood_48h.json"));
    }

    #[test]
    fn test_missing_explicit_file_is_io_error() {
        let err = load_config_from(Path::new("/nonexistent/predictor.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
