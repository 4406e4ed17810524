//! Residual validator.
//!
//! Pairs each truth sample from a simulated observation set with the
//! matching filter estimate and checks the residual against the
//! estimator's own 3-sigma envelope, per state dimension.
//!
//! Pairing is positional: the n-th truth record is compared with the
//! n-th estimate. [`PairingPolicy`] decides what happens when the two
//! sequences differ in length.

pub mod summary;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::types::{
    Covariance, Epoch, EstimateRecord, HarnessError, ResidualEntry, StateVector, TruthRecord,
    TruthSource, STATE_DIM,
};

/// Width of the confidence envelope, in standard deviations.
pub const SIGMA_MULTIPLIER: f64 = 3.0;

// ---------------------------------------------------------------------------
// Pairing policy
// ---------------------------------------------------------------------------

/// What to do when truth and estimate sequences differ in length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PairingPolicy {
    /// Refuse to compare; the run fails.
    #[default]
    Strict,
    /// Compare up to the shorter length and log a warning.
    Truncate,
}

// ---------------------------------------------------------------------------
// Raw engine records (engine JSON → Rust)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawTruth {
    time: Epoch,
    #[serde(default)]
    station: Option<String>,
    #[serde(default)]
    true_state_cartesian: Option<Vec<f64>>,
    #[serde(default)]
    position_velocity: Option<Vec<f64>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RawEstimate {
    time: Epoch,
    estimated_state: Vec<f64>,
    estimated_covariance: Vec<Vec<f64>>,
}

fn leading_state(values: &[f64]) -> Option<StateVector> {
    values.get(..STATE_DIM)?.try_into().ok()
}

fn leading_covariance(rows: &[Vec<f64>]) -> Option<Covariance> {
    let mut cov = [[0.0; STATE_DIM]; STATE_DIM];
    for (dst, row) in cov.iter_mut().zip(rows.get(..STATE_DIM)?) {
        *dst = leading_state(row)?;
    }
    Some(cov)
}

fn malformed(kind: &'static str, index: usize, reason: impl Into<String>) -> HarnessError {
    HarnessError::MalformedRecord {
        kind,
        index,
        reason: reason.into(),
    }
}

// ---------------------------------------------------------------------------
// Record extraction
// ---------------------------------------------------------------------------

/// Pull truth samples out of a simulated observation set.
///
/// Only entries carrying `Station` or `PositionVelocity` are samples;
/// anything else in the array is skipped. The exact simulated state is
/// preferred over the measured position/velocity when both are present.
/// A malformed sample is reported by its position in `observations`.
pub fn extract_truth(observations: &[Value]) -> Result<Vec<TruthRecord>, HarnessError> {
    let truths = observations
        .iter()
        .enumerate()
        .filter(|(_, v)| v.get("Station").is_some() || v.get("PositionVelocity").is_some())
        .map(|(index, v)| -> Result<TruthRecord, HarnessError> {
            let raw: RawTruth = serde_json::from_value(v.clone())
                .map_err(|e| malformed("truth", index, e.to_string()))?;

            let (values, source) = match (&raw.true_state_cartesian, &raw.position_velocity) {
                (Some(exact), _) => (exact, TruthSource::Exact),
                (None, Some(measured)) => (measured, TruthSource::Measured),
                (None, None) => {
                    return Err(malformed(
                        "truth",
                        index,
                        "neither TrueStateCartesian nor PositionVelocity present",
                    ))
                }
            };
            let state = leading_state(values).ok_or_else(|| {
                malformed("truth", index, format!("state has {} elements", values.len()))
            })?;

            Ok(TruthRecord {
                time: raw.time,
                station: raw.station,
                state,
                source,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let measured = truths
        .iter()
        .filter(|t| t.source == TruthSource::Measured)
        .count();
    debug!(samples = truths.len(), measured, "Truth samples extracted");
    Ok(truths)
}

/// Pull estimates out of a filter's fit output.
///
/// Only entries carrying both `PreFit` and `PostFit` are estimates;
/// errors carry the entry's position in `fit`.
pub fn extract_estimates(fit: &[Value]) -> Result<Vec<EstimateRecord>, HarnessError> {
    fit.iter()
        .enumerate()
        .filter(|(_, v)| v.get("PreFit").is_some() && v.get("PostFit").is_some())
        .map(|(index, v)| -> Result<EstimateRecord, HarnessError> {
            let raw: RawEstimate = serde_json::from_value(v.clone())
                .map_err(|e| malformed("estimate", index, e.to_string()))?;

            let state = leading_state(&raw.estimated_state)
                .ok_or_else(|| malformed("estimate", index, "EstimatedState too short"))?;
            let covariance = leading_covariance(&raw.estimated_covariance).ok_or_else(|| {
                malformed("estimate", index, "EstimatedCovariance smaller than 6x6")
            })?;

            Ok(EstimateRecord {
                time: raw.time,
                state,
                covariance,
            })
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Residuals
// ---------------------------------------------------------------------------

/// Compare one truth sample with one estimate.
///
/// A residual exactly on the bound is out of bounds. A negative or NaN
/// variance gives a NaN bound, which no residual is within.
pub fn residual_entry(truth: &TruthRecord, estimate: &EstimateRecord) -> ResidualEntry {
    let mut state_residual = [0.0; STATE_DIM];
    let mut covariance_3sigma = [0.0; STATE_DIM];
    let mut within_bounds = [false; STATE_DIM];

    for i in 0..STATE_DIM {
        let diff = truth.state[i] - estimate.state[i];
        let bound = SIGMA_MULTIPLIER * estimate.covariance[i][i].sqrt();
        state_residual[i] = diff;
        covariance_3sigma[i] = bound;
        within_bounds[i] = -bound < diff && diff < bound;
    }

    ResidualEntry {
        time: truth.time.clone(),
        station: truth.station.clone(),
        state_residual,
        covariance_3sigma,
        within_bounds,
    }
}

/// Build the verdict table, one entry per (truth, estimate) pair, in
/// truth order.
pub fn compute_residuals(
    truth: &[TruthRecord],
    estimates: &[EstimateRecord],
    policy: PairingPolicy,
) -> Result<Vec<ResidualEntry>, HarnessError> {
    if truth.len() != estimates.len() {
        match policy {
            PairingPolicy::Strict => {
                return Err(HarnessError::RecordCountMismatch {
                    truth: truth.len(),
                    estimates: estimates.len(),
                })
            }
            PairingPolicy::Truncate => warn!(
                truth = truth.len(),
                estimates = estimates.len(),
                "Record count mismatch; comparing up to the shorter sequence"
            ),
        }
    }

    Ok(truth
        .iter()
        .zip(estimates)
        .map(|(t, e)| residual_entry(t, e))
        .collect())
}

/// Validate raw engine output: `observations` from a simulation run
/// against `fit` from an estimation run.
pub fn validate(
    observations: &[Value],
    fit: &[Value],
    policy: PairingPolicy,
) -> Result<Vec<ResidualEntry>, HarnessError> {
    let truth = extract_truth(observations)?;
    let estimates = extract_estimates(fit)?;
    compute_residuals(&truth, &estimates, policy)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
