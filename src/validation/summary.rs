//! Verdict aggregation for progress logs.
//!
//! The verdict file stays a raw per-sample table; this only condenses it
//! into a line a human can read while the harness runs.

use std::fmt;

use crate::types::{ResidualEntry, STATE_DIM};

/// Counts over one verdict table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VerdictSummary {
    pub samples: usize,
    /// Samples inside the envelope on every dimension.
    pub fully_within: usize,
    pub within_per_dimension: [usize; STATE_DIM],
}

impl VerdictSummary {
    /// Fraction of samples fully inside the envelope (0.0 for an empty table).
    pub fn pass_rate(&self) -> f64 {
        if self.samples == 0 {
            0.0
        } else {
            self.fully_within as f64 / self.samples as f64
        }
    }
}

impl fmt::Display for VerdictSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{} samples within 3σ ({:.1}%) | per-dim {:?}",
            self.fully_within,
            self.samples,
            self.pass_rate() * 100.0,
            self.within_per_dimension,
        )
    }
}

pub fn summarize(entries: &[ResidualEntry]) -> VerdictSummary {
    let mut summary = VerdictSummary {
        samples: entries.len(),
        ..VerdictSummary::default()
    };
    for entry in entries {
        if entry.all_within() {
            summary.fully_within += 1;
        }
        for (count, &ok) in summary.within_per_dimension.iter_mut().zip(&entry.within_bounds) {
            if ok {
                *count += 1;
            }
        }
    }
    summary
}
