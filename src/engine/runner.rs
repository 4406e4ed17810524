//! Harness pipeline.
//!
//! simulate → barrier → estimate (one job per filter variant) → barrier →
//! validate. The estimation batch consumes the simulation batch's output
//! files, so it is never submitted before the first barrier returns.

use anyhow::{Context, Result};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::HarnessConfig;
use crate::discovery::{self, Scenario, ScenarioKind};
use crate::engine::coordinator::{Batch, BatchReport};
use crate::engine::OrbitEngine;
use crate::storage;
use crate::types::{FilterVariant, Job};
use crate::validation;
use crate::validation::summary::{summarize, VerdictSummary};

// ---------------------------------------------------------------------------
// Run report
// ---------------------------------------------------------------------------

/// One verdict file written by the validation stage.
#[derive(Debug, Clone)]
pub struct VerdictReport {
    pub scenario: String,
    pub filter: FilterVariant,
    pub path: PathBuf,
    pub summary: VerdictSummary,
}

/// Summary of a complete harness run.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub simulations: usize,
    pub estimations: usize,
    pub verdicts: Vec<VerdictReport>,
}

// ---------------------------------------------------------------------------
// Harness
// ---------------------------------------------------------------------------

pub struct Harness {
    engine: Arc<dyn OrbitEngine>,
    config: HarnessConfig,
}

impl Harness {
    pub fn new(engine: Arc<dyn OrbitEngine>, config: HarnessConfig) -> Self {
        Self { engine, config }
    }

    /// Scenarios from the manifest, or discovered under the data directory.
    /// Output directories are created for all of them.
    pub fn scenarios(&self) -> Result<Vec<Scenario>> {
        let scenarios = if self.config.scenarios.is_empty() {
            discovery::discover(&self.config.harness.data_dir)?
        } else {
            self.config.scenarios.clone()
        };
        discovery::ensure_output_dirs(&scenarios)?;
        Ok(scenarios)
    }

    /// Run all three stages over every scenario.
    pub async fn run(&self) -> Result<RunReport> {
        let scenarios = self.scenarios()?;
        let (simulations, estimations): (Vec<_>, Vec<_>) = scenarios
            .into_iter()
            .partition(|s| s.kind == ScenarioKind::Simulation);

        info!(
            simulations = simulations.len(),
            estimations = estimations.len(),
            "Scenarios loaded"
        );

        let sim_report = self.run_simulations(&simulations).await?;
        let od_report = self.run_estimations(&estimations).await?;
        let verdicts = self.run_validations(&estimations)?;

        Ok(RunReport {
            simulations: sim_report.expected,
            estimations: od_report.expected,
            verdicts,
        })
    }

    /// Simulation batch: one job per simulation config.
    pub async fn run_simulations(&self, scenarios: &[Scenario]) -> Result<BatchReport> {
        let batch = Batch::new(scenarios.len());

        for scenario in scenarios {
            info!("Simulating {}", scenario.config_file_name());
            let config: Value = storage::read_json(&scenario.config_path())?;
            let job = Job::simulate(
                scenario.config_file_name(),
                config,
                scenario.observations_path(),
            );
            batch.submit(Arc::clone(&self.engine), job)?;
        }

        self.finish(batch, "simulation").await
    }

    /// Estimation batch: one job per (estimation config, filter variant).
    pub async fn run_estimations(&self, scenarios: &[Scenario]) -> Result<BatchReport> {
        let filters = &self.config.harness.filters;
        let batch = Batch::new(scenarios.len() * filters.len());

        for scenario in scenarios {
            info!("Fitting {}", scenario.config_file_name());
            let observations: Value = storage::read_json(&scenario.observations_path())?;
            let config: Value = storage::read_json(&scenario.config_path())?;

            for &filter in filters {
                let config = storage::with_filter(&config, filter).with_context(|| {
                    format!("Cannot select filter in {}", scenario.config_file_name())
                })?;
                let job = Job::estimate(
                    format!("{}:{filter}", scenario.config_file_name()),
                    config,
                    observations.clone(),
                    scenario.fit_path(filter),
                );
                batch.submit(Arc::clone(&self.engine), job)?;
            }
        }

        self.finish(batch, "estimation").await
    }

    /// Validation: compare each filter's fit against the simulated truth
    /// and write one verdict file per (scenario, filter).
    pub fn run_validations(&self, scenarios: &[Scenario]) -> Result<Vec<VerdictReport>> {
        let mut verdicts = Vec::new();

        for scenario in scenarios {
            let observations: Vec<Value> = storage::read_json(&scenario.observations_path())?;

            for &filter in &self.config.harness.filters {
                let fit: Vec<Value> = storage::read_json(&scenario.fit_path(filter))?;
                let entries =
                    validation::validate(&observations, &fit, self.config.harness.pairing)
                        .with_context(|| {
                            format!(
                                "Validation failed for {} ({filter})",
                                scenario.config_file_name()
                            )
                        })?;

                let path = scenario.diff_path(filter);
                storage::write_json(&path, &entries)?;

                let summary = summarize(&entries);
                info!(
                    scenario = %scenario.config_file_name(),
                    filter = %filter,
                    samples = summary.samples,
                    within = summary.fully_within,
                    pass_rate = format!("{:.1}%", summary.pass_rate() * 100.0),
                    "Verdict written"
                );

                verdicts.push(VerdictReport {
                    scenario: scenario.config_file_name(),
                    filter,
                    path,
                    summary,
                });
            }
        }

        Ok(verdicts)
    }

    async fn finish(&self, batch: Batch, stage: &str) -> Result<BatchReport> {
        let expected = batch.expected();
        info!(stage, jobs = expected, "Waiting for batch");

        let report = batch
            .wait(self.config.batch_timeout())
            .await
            .with_context(|| format!("{stage} batch did not complete"))?;
        report
            .ensure_success()
            .with_context(|| format!("{stage} batch had failures"))?;
        Ok(report)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
