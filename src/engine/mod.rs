//! Engine seam and the batch machinery that drives it.
//!
//! The orbit simulator and the EKF/UKF estimators live behind the
//! [`OrbitEngine`] trait. Everything else here is about submitting jobs
//! to it and knowing when a batch of them has finished.

pub mod coordinator;
pub mod http;
pub mod runner;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;

/// Abstraction over an orbit-determination engine.
///
/// Implementors run one job per call and return the raw JSON result
/// array; the coordinator takes care of writing it to the job's output
/// file and signalling completion.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait OrbitEngine: Send + Sync {
    /// Simulate measurements from a simulation config.
    async fn simulate(&self, config: &Value) -> Result<Value>;

    /// Fit an orbit to `observations` using the filter selected in `config`.
    async fn determine_orbit(&self, config: &Value, observations: &Value) -> Result<Value>;
}
