//! Configuration loading from TOML with environment variable overrides.
//!
//! Reads `harness.toml` and deserializes into strongly-typed structs.
//! Every field has a default, so a missing file simply means "defaults".
//! Relative paths are resolved against the config file's directory, which
//! by default is the directory holding the executable.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

use crate::discovery::Scenario;
use crate::types::FilterVariant;
use crate::validation::PairingPolicy;

/// Default config file name, looked up next to the executable.
pub const DEFAULT_CONFIG_PATH: &str = "harness.toml";

const DEFAULT_ENGINE_URL: &str = "http://127.0.0.1:50051";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 3600;

/// Top-level harness configuration.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(default)]
pub struct HarnessConfig {
    pub harness: HarnessSection,
    pub engine: EngineConfig,
    /// Explicit scenario list. When non-empty, directory discovery is skipped.
    pub scenarios: Vec<Scenario>,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct HarnessSection {
    pub data_dir: PathBuf,
    /// Filter variants run against every estimation config.
    pub filters: Vec<FilterVariant>,
    /// Per-batch wait limit. Absent means wait indefinitely.
    pub batch_timeout_secs: Option<u64>,
    pub pairing: PairingPolicy,
}

impl Default for HarnessSection {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            filters: FilterVariant::ALL.to_vec(),
            batch_timeout_secs: None,
            pairing: PairingPolicy::Strict,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EngineConfig {
    pub base_url: String,
    pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ENGINE_URL.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
        }
    }
}

/// `harness.toml` beside the running executable, or in the working
/// directory if the executable's location is unknown.
pub fn default_config_path() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(|dir| dir.join(DEFAULT_CONFIG_PATH)))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

fn config_dir(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("."))
}

impl HarnessConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: HarnessConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        config.resolve_paths(config_dir(path));
        Ok(config)
    }

    /// Load `path` if it exists, otherwise fall back to defaults rooted
    /// at the directory `path` would have been in.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            info!(path = %path.display(), "No config file found, using defaults");
            let mut config = Self::default();
            config.resolve_paths(config_dir(path));
            Ok(config)
        }
    }

    /// Apply `ODH_ENGINE_URL` / `ODH_DATA_DIR` overrides.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("ODH_ENGINE_URL") {
            self.engine.base_url = url;
        }
        if let Ok(dir) = std::env::var("ODH_DATA_DIR") {
            self.harness.data_dir = PathBuf::from(dir);
        }
    }

    /// Make relative data and manifest paths relative to `base`.
    pub fn resolve_paths(&mut self, base: &Path) {
        if self.harness.data_dir.is_relative() {
            self.harness.data_dir = base.join(&self.harness.data_dir);
        }
        for scenario in &mut self.scenarios {
            if scenario.dir.is_relative() {
                scenario.dir = base.join(&scenario.dir);
            }
        }
    }

    pub fn batch_timeout(&self) -> Option<Duration> {
        self.harness.batch_timeout_secs.map(Duration::from_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.engine.request_timeout_secs)
    }
}
