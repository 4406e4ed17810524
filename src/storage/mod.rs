//! File I/O for the harness.
//!
//! Reads engine configs and result files, writes job outputs and verdict
//! files. Every failure carries the offending path; nothing here retries.

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use serde_json::Value;
use std::path::Path;
use tracing::debug;

use crate::types::{FilterVariant, HarnessError};

/// Indent used for all JSON the harness writes.
const JSON_INDENT: &[u8] = b" ";

/// Read and parse a JSON file.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    serde_json::from_str(&json).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Serialize `value` as indented JSON and write it to `path`.
pub fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut buf = Vec::new();
    let mut ser =
        serde_json::Serializer::with_formatter(&mut buf, PrettyFormatter::with_indent(JSON_INDENT));
    value
        .serialize(&mut ser)
        .with_context(|| format!("Failed to serialise {}", path.display()))?;

    std::fs::write(path, &buf).with_context(|| format!("Failed to write {}", path.display()))?;

    debug!(path = %path.display(), bytes = buf.len(), "JSON written");
    Ok(())
}

/// Copy of an estimation config with `Estimation.Filter` set to `variant`.
///
/// All other fields are left as they were.
pub fn with_filter(config: &Value, variant: FilterVariant) -> Result<Value, HarnessError> {
    let mut config = config.clone();
    let estimation = config
        .get_mut("Estimation")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| HarnessError::MissingConfigField("Estimation".to_string()))?;

    estimation.insert("Filter".to_string(), Value::String(variant.as_str().to_string()));
    Ok(config)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
