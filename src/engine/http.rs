//! Remote orbit-determination engine over JSON/HTTP.
//!
//! Endpoints (relative to the configured base URL):
//! - `POST /simulate`: body is simulation config; returns the simulated
//!   observation array.
//! - `POST /determine-orbit`: body is `{ "config": ..., "measurements": ... }`;
//!   returns the filter's fit array.
//!
//! No retries: a failed request fails the job, and the batch reports it.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::OrbitEngine;

const SIMULATE_PATH: &str = "simulate";
const DETERMINE_ORBIT_PATH: &str = "determine-orbit";

/// Longest error body echoed back into a job failure reason.
const MAX_ERROR_BODY: usize = 500;

#[derive(Debug, Serialize)]
struct DetermineOrbitRequest<'a> {
    config: &'a Value,
    measurements: &'a Value,
}

pub struct HttpEngine {
    http: Client,
    base_url: String,
}

impl HttpEngine {
    /// Create a client for the engine at `base_url`.
    ///
    /// `timeout` bounds each request; long estimation runs need a generous one.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build engine HTTP client")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    async fn post<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<Value> {
        let url = self.endpoint(path);
        debug!(url = %url, "Engine request");

        let response = self
            .http
            .post(&url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Engine request to {url} failed"))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let snippet: String = body.chars().take(MAX_ERROR_BODY).collect();
            bail!("Engine returned {status} for {path}: {snippet}");
        }

        response
            .json::<Value>()
            .await
            .with_context(|| format!("Failed to decode engine response from {url}"))
    }
}

#[async_trait]
impl OrbitEngine for HttpEngine {
    async fn simulate(&self, config: &Value) -> Result<Value> {
        self.post(SIMULATE_PATH, config).await
    }

    async fn determine_orbit(&self, config: &Value, observations: &Value) -> Result<Value> {
        let request = DetermineOrbitRequest {
            config,
            measurements: observations,
        };
        self.post(DETERMINE_ORBIT_PATH, &request).await
    }
}
