//! Scenario discovery.
//!
//! Walks the data directory for simulation (`*sim_cfg.json`) and
//! estimation (`*od_cfg.json`) configs. Each directory holding configs
//! gets an `output/` subdirectory for engine results; those output
//! directories are never searched themselves.
//!
//! A manifest in the harness config bypasses the walk entirely.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::types::FilterVariant;

pub const SIM_CONFIG_SUFFIX: &str = "sim_cfg.json";
pub const OD_CONFIG_SUFFIX: &str = "od_cfg.json";
pub const OUTPUT_DIR: &str = "output";

/// Which stage a config feeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScenarioKind {
    Simulation,
    Estimation,
}

impl ScenarioKind {
    pub fn suffix(&self) -> &'static str {
        match self {
            ScenarioKind::Simulation => SIM_CONFIG_SUFFIX,
            ScenarioKind::Estimation => OD_CONFIG_SUFFIX,
        }
    }
}

/// One config file and the file names derived from it.
///
/// `prefix` is the config's file name with the suffix removed; all
/// outputs for the scenario share it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Scenario {
    pub dir: PathBuf,
    pub prefix: String,
    pub kind: ScenarioKind,
}

impl Scenario {
    pub fn config_file_name(&self) -> String {
        format!("{}{}", self.prefix, self.kind.suffix())
    }

    pub fn config_path(&self) -> PathBuf {
        self.dir.join(self.config_file_name())
    }

    pub fn output_dir(&self) -> PathBuf {
        self.dir.join(OUTPUT_DIR)
    }

    /// Simulated observations: `<prefix>obs.json`.
    pub fn observations_path(&self) -> PathBuf {
        self.output_dir().join(format!("{}obs.json", self.prefix))
    }

    /// Estimation output: `<prefix><FILTER>_fit.json`.
    pub fn fit_path(&self, filter: FilterVariant) -> PathBuf {
        self.output_dir().join(format!("{}{filter}_fit.json", self.prefix))
    }

    /// Validator verdict: `<prefix><FILTER>_diff.json`.
    pub fn diff_path(&self, filter: FilterVariant) -> PathBuf {
        self.output_dir().join(format!("{}{filter}_diff.json", self.prefix))
    }

    fn from_file_name(dir: &Path, name: &str) -> Option<Self> {
        [ScenarioKind::Simulation, ScenarioKind::Estimation]
            .into_iter()
            .find_map(|kind| {
                name.strip_suffix(kind.suffix()).map(|prefix| Scenario {
                    dir: dir.to_path_buf(),
                    prefix: prefix.to_string(),
                    kind,
                })
            })
    }
}

/// Find every scenario config under `root`, sorted by config path.
pub fn discover(root: &Path) -> Result<Vec<Scenario>> {
    let mut scenarios = Vec::new();
    walk(root, &mut scenarios)?;
    scenarios.sort_by_key(|s| s.config_path());
    Ok(scenarios)
}

fn walk(dir: &Path, found: &mut Vec<Scenario>) -> Result<()> {
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to read directory {}", dir.display()))?;

    let mut subdirs = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to list {}", dir.display()))?;
        let path = entry.path();
        let file_type = entry
            .file_type()
            .with_context(|| format!("Failed to stat {}", path.display()))?;

        if file_type.is_dir() {
            if entry.file_name() != OUTPUT_DIR {
                subdirs.push(path);
            }
        } else if let Some(scenario) = entry
            .file_name()
            .to_str()
            .and_then(|name| Scenario::from_file_name(dir, name))
        {
            debug!(
                config = %scenario.config_path().display(),
                kind = ?scenario.kind,
                "Found config"
            );
            found.push(scenario);
        }
    }

    for sub in subdirs {
        walk(&sub, found)?;
    }
    Ok(())
}

/// Create the output directory of every scenario that lacks one.
pub fn ensure_output_dirs(scenarios: &[Scenario]) -> Result<()> {
    for scenario in scenarios {
        let out = scenario.output_dir();
        std::fs::create_dir_all(&out)
            .with_context(|| format!("Failed to create output directory {}", out.display()))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
