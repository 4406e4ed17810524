//! Shared types for the validation harness.
//!
//! Data flows one way: discovery → job submission → result files →
//! validator → verdict file. These types carry it between stages; none
//! of them is shared mutable state.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::path::PathBuf;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// State vectors
// ---------------------------------------------------------------------------

/// Number of Cartesian state components (position + velocity).
pub const STATE_DIM: usize = 6;

/// A six-element Cartesian state `[x, y, z, vx, vy, vz]`.
pub type StateVector = [f64; STATE_DIM];

/// Full state covariance, row-major.
pub type Covariance = [StateVector; STATE_DIM];

// ---------------------------------------------------------------------------
// Filter variants
// ---------------------------------------------------------------------------

/// Estimation filter run by the external engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FilterVariant {
    #[serde(rename = "EKF")]
    Ekf,
    #[serde(rename = "UKF")]
    Ukf,
}

impl FilterVariant {
    pub const ALL: [FilterVariant; 2] = [FilterVariant::Ekf, FilterVariant::Ukf];

    /// Name written into the `Estimation.Filter` config field and output file names.
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterVariant::Ekf => "EKF",
            FilterVariant::Ukf => "UKF",
        }
    }
}

impl fmt::Display for FilterVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ---------------------------------------------------------------------------
// Epoch
// ---------------------------------------------------------------------------

/// Sample timestamp exactly as the engine reports it: an ISO-8601 string,
/// seconds from the engine's reference epoch, or anything else. Kept as
/// raw JSON so the verdict file echoes it unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Epoch(pub Value);

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

/// What the engine is asked to do. The config payload is opaque here.
#[derive(Debug, Clone)]
pub enum JobKind {
    Simulate { config: Value },
    Estimate { config: Value, observations: Value },
}

impl JobKind {
    pub fn name(&self) -> &'static str {
        match self {
            JobKind::Simulate { .. } => "simulate",
            JobKind::Estimate { .. } => "estimate",
        }
    }
}

/// A unit of asynchronous work submitted to the engine.
#[derive(Debug, Clone)]
pub struct Job {
    pub id: Uuid,
    /// Human-readable tag used in logs and failure reports.
    pub label: String,
    pub kind: JobKind,
    /// Where the engine's result is written once the job finishes.
    pub output: PathBuf,
}

impl Job {
    pub fn simulate(label: impl Into<String>, config: Value, output: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            kind: JobKind::Simulate { config },
            output: output.into(),
        }
    }

    pub fn estimate(
        label: impl Into<String>,
        config: Value,
        observations: Value,
        output: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            label: label.into(),
            kind: JobKind::Estimate { config, observations },
            output: output.into(),
        }
    }

    /// Identity of this job, detached from its payload.
    pub fn ticket(&self) -> JobTicket {
        JobTicket {
            job_id: self.id,
            label: self.label.clone(),
            output: self.output.clone(),
        }
    }
}

/// The part of a job the coordinator keeps until it completes.
#[derive(Debug, Clone, PartialEq)]
pub struct JobTicket {
    pub job_id: Uuid,
    pub label: String,
    pub output: PathBuf,
}

impl JobTicket {
    pub fn new(label: impl Into<String>, output: impl Into<PathBuf>) -> Self {
        Self {
            job_id: Uuid::new_v4(),
            label: label.into(),
            output: output.into(),
        }
    }
}

/// How a job finished.
#[derive(Debug, Clone, PartialEq)]
pub enum JobStatus {
    Succeeded,
    Failed { reason: String },
}

/// A completed job as recorded by its batch.
#[derive(Debug, Clone, PartialEq)]
pub struct JobOutcome {
    pub ticket: JobTicket,
    pub status: JobStatus,
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        self.status == JobStatus::Succeeded
    }
}

// ---------------------------------------------------------------------------
// Truth / estimate records
// ---------------------------------------------------------------------------

/// Where a truth state came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TruthSource {
    /// Exact simulated state (`TrueStateCartesian`).
    Exact,
    /// Measured position/velocity (`PositionVelocity`).
    Measured,
}

/// One ground-truth sample from the simulated observation set.
#[derive(Debug, Clone, PartialEq)]
pub struct TruthRecord {
    pub time: Epoch,
    pub station: Option<String>,
    pub state: StateVector,
    pub source: TruthSource,
}

/// One filter output sample: state estimate plus covariance.
#[derive(Debug, Clone, PartialEq)]
pub struct EstimateRecord {
    pub time: Epoch,
    pub state: StateVector,
    pub covariance: Covariance,
}

/// One row of the verdict file.
///
/// Bounds computed from a negative or NaN variance stay NaN in memory;
/// JSON has no NaN, so they are written as `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResidualEntry {
    #[serde(rename = "Time")]
    pub time: Epoch,
    #[serde(rename = "Station")]
    pub station: Option<String>,
    #[serde(rename = "StateResidual")]
    pub state_residual: StateVector,
    #[serde(rename = "Covariance3Sigma")]
    pub covariance_3sigma: StateVector,
    #[serde(rename = "WithinBounds")]
    pub within_bounds: [bool; STATE_DIM],
}

impl ResidualEntry {
    /// True when every dimension is inside its 3-sigma envelope.
    pub fn all_within(&self) -> bool {
        self.within_bounds.iter().all(|&b| b)
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Domain errors that callers match on. I/O and parse failures travel
/// as `anyhow::Error` with context instead.
#[derive(Debug, thiserror::Error)]
pub enum HarnessError {
    #[error("Batch timed out: {completed} of {expected} jobs completed")]
    BatchTimedOut { completed: usize, expected: usize },

    #[error("Batch over-subscribed: more than {expected} jobs registered")]
    BatchOverSubscribed { expected: usize },

    #[error("Batch too large: {expected} jobs exceeds the barrier limit")]
    BatchTooLarge { expected: usize },

    #[error("Batch barrier closed before all jobs completed")]
    BarrierClosed,

    #[error("{failed} of {expected} jobs failed (first: {first})")]
    JobsFailed {
        failed: usize,
        expected: usize,
        first: String,
    },

    #[error("Record count mismatch: {truth} truth records vs {estimates} estimates")]
    RecordCountMismatch { truth: usize, estimates: usize },

    #[error("Malformed {kind} record at index {index}: {reason}")]
    MalformedRecord {
        kind: &'static str,
        index: usize,
        reason: String,
    },

    #[error("Missing config field: {0}")]
    MissingConfigField(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
