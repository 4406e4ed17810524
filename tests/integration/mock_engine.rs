//! Mock engine for integration testing.
//!
//! Provides a deterministic `OrbitEngine` that "simulates" observations
//! from a tiny config schema and "fits" them with a per-filter bias,
//! all in-memory with no external dependencies. Every call is logged so
//! tests can check ordering across batches.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use odharness::engine::OrbitEngine;

/// What the engine was doing, in the order it happened.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    SimulateStarted(String),
    SimulateFinished(String),
    EstimateStarted { scenario: String, filter: String },
    EstimateFinished { scenario: String, filter: String },
}

/// A mock orbit-determination engine.
///
/// Simulation config fields read: `Name`, `X0` (initial x position),
/// `Samples`, `DelayMs`. Estimation config fields read: `Name`,
/// `DelayMs`, `Estimation.Filter`.
pub struct MockEngine {
    /// Bias subtracted from the truth x position, per filter name.
    biases: HashMap<String, f64>,
    /// Diagonal variance reported for every estimate.
    variance: f64,
    events: Arc<Mutex<Vec<EngineEvent>>>,
    /// If set, all operations will return this error.
    force_error: Arc<Mutex<Option<String>>>,
}

impl MockEngine {
    /// EKF fits within 3σ, UKF lands outside on the x axis.
    pub fn new() -> Self {
        Self {
            biases: HashMap::from([("EKF".to_string(), 0.5), ("UKF".to_string(), 4.0)]),
            variance: 1.0,
            events: Arc::new(Mutex::new(Vec::new())),
            force_error: Arc::new(Mutex::new(None)),
        }
    }

    /// Force all subsequent operations to return an error.
    pub fn set_error(&self, msg: &str) {
        *self.force_error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().unwrap().clone()
    }

    fn log(&self, event: EngineEvent) {
        self.events.lock().unwrap().push(event);
    }

    fn check_error(&self) -> Result<()> {
        match self.force_error.lock().unwrap().as_ref() {
            Some(msg) => Err(anyhow!("{msg}")),
            None => Ok(()),
        }
    }

    async fn delay(config: &Value) {
        let ms = config["DelayMs"].as_u64().unwrap_or(0);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn covariance(&self) -> Vec<Vec<f64>> {
        let mut cov = vec![vec![0.0; 6]; 6];
        for (i, row) in cov.iter_mut().enumerate() {
            row[i] = self.variance;
        }
        cov
    }
}

#[async_trait]
impl OrbitEngine for MockEngine {
    async fn simulate(&self, config: &Value) -> Result<Value> {
        let name = config["Name"].as_str().unwrap_or("unnamed").to_string();
        self.log(EngineEvent::SimulateStarted(name.clone()));
        self.check_error()?;
        Self::delay(config).await;

        let x0 = config["X0"].as_f64().unwrap_or(7000.0);
        let samples = config["Samples"].as_u64().unwrap_or(3);

        let mut obs = vec![json!({"Time": 0.0, "Comment": "initial epoch"})];
        for i in 0..samples {
            let t = 60.0 * (i + 1) as f64;
            let state = [x0 + i as f64, 0.0, 0.0, 0.0, 7.5, 0.0, 0.0];
            // Every third sample is a bare position/velocity measurement.
            if i % 3 == 2 {
                obs.push(json!({"Time": t, "PositionVelocity": &state[..6]}));
            } else {
                obs.push(json!({
                    "Time": t,
                    "Station": format!("GS{}", i % 2 + 1),
                    "Range": 1.0e6,
                    "TrueStateCartesian": state
                }));
            }
        }

        self.log(EngineEvent::SimulateFinished(name));
        Ok(Value::Array(obs))
    }

    async fn determine_orbit(&self, config: &Value, observations: &Value) -> Result<Value> {
        let scenario = config["Name"].as_str().unwrap_or("unnamed").to_string();
        let filter = config["Estimation"]["Filter"]
            .as_str()
            .ok_or_else(|| anyhow!("no filter selected"))?
            .to_string();
        self.log(EngineEvent::EstimateStarted {
            scenario: scenario.clone(),
            filter: filter.clone(),
        });
        self.check_error()?;
        Self::delay(config).await;

        let bias = *self
            .biases
            .get(&filter)
            .ok_or_else(|| anyhow!("unknown filter {filter}"))?;

        let mut fit = vec![json!({"Time": 0.0, "EstimatedState": [0.0], "Comment": "a priori"})];
        for m in observations.as_array().into_iter().flatten() {
            let truth = m
                .get("TrueStateCartesian")
                .or_else(|| m.get("PositionVelocity"));
            let Some(truth) = truth.and_then(Value::as_array) else {
                continue;
            };
            let mut state: Vec<f64> = truth.iter().take(6).filter_map(Value::as_f64).collect();
            state[0] -= bias;
            fit.push(json!({
                "Time": m["Time"],
                "PreFit": {"Range": 0.0},
                "PostFit": {"Range": 0.0},
                "EstimatedState": state,
                "EstimatedCovariance": self.covariance()
            }));
        }

        self.log(EngineEvent::EstimateFinished { scenario, filter });
        Ok(Value::Array(fit))
    }
}
