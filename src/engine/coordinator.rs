//! Batch coordinator.
//!
//! Fires a fixed number of independent jobs at the engine and blocks the
//! submitting flow until every one of them has signalled completion, in
//! whatever order and from whatever thread the engine uses.
//!
//! The barrier is a zero-permit [`Semaphore`]: each completion adds one
//! permit, and [`Batch::wait`] acquires all `expected` permits at once.
//! Each job gets a [`CompletionHandle`] that is consumed on use, so a job
//! cannot signal twice; a handle dropped without signalling still
//! releases its unit and is recorded as a failure.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

use crate::engine::OrbitEngine;
use crate::storage;
use crate::types::{HarnessError, Job, JobKind, JobOutcome, JobStatus, JobTicket};

// ---------------------------------------------------------------------------
// Shared batch state
// ---------------------------------------------------------------------------

struct BatchState {
    expected: usize,
    registered: AtomicUsize,
    completed: AtomicUsize,
    barrier: Semaphore,
    outcomes: Mutex<Vec<JobOutcome>>,
}

impl BatchState {
    fn record(&self, ticket: JobTicket, status: JobStatus) {
        // Outcome must be visible before the permit that releases the waiter.
        self.outcomes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(JobOutcome { ticket, status });
        let done = self.completed.fetch_add(1, Ordering::AcqRel) + 1;
        self.barrier.add_permits(1);
        debug!(completed = done, expected = self.expected, "Job signalled completion");
    }
}

// ---------------------------------------------------------------------------
// Completion handle
// ---------------------------------------------------------------------------

/// One-shot completion callback bound to a batch.
///
/// `Send + 'static`: it can be moved into an engine thread, a tokio task,
/// or anywhere else the engine finishes its work.
pub struct CompletionHandle {
    state: Arc<BatchState>,
    ticket: Option<JobTicket>,
}

impl CompletionHandle {
    /// Signal that the job finished with `status`.
    pub fn complete(mut self, status: JobStatus) {
        self.signal(status);
    }

    pub fn succeed(self) {
        self.complete(JobStatus::Succeeded);
    }

    pub fn fail(self, reason: impl Into<String>) {
        self.complete(JobStatus::Failed {
            reason: reason.into(),
        });
    }

    fn signal(&mut self, status: JobStatus) {
        if let Some(ticket) = self.ticket.take() {
            self.state.record(ticket, status);
        }
    }
}

impl Drop for CompletionHandle {
    fn drop(&mut self) {
        if let Some(ticket) = &self.ticket {
            warn!(
                job = %ticket.label,
                job_id = %ticket.job_id,
                "Completion handle dropped without signalling; counting job as failed"
            );
            self.signal(JobStatus::Failed {
                reason: "job abandoned before signalling completion".to_string(),
            });
        }
    }
}

// ---------------------------------------------------------------------------
// Batch report
// ---------------------------------------------------------------------------

/// Outcomes of a finished batch, in completion order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    pub expected: usize,
    pub outcomes: Vec<JobOutcome>,
}

impl BatchReport {
    pub fn succeeded(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    pub fn failed(&self) -> impl Iterator<Item = &JobOutcome> {
        self.outcomes.iter().filter(|o| !o.is_success())
    }

    /// Error out if any job reported failure.
    pub fn ensure_success(&self) -> Result<(), HarnessError> {
        let failed: Vec<&JobOutcome> = self.failed().collect();
        match failed.first() {
            None => Ok(()),
            Some(first) => {
                let reason = match &first.status {
                    JobStatus::Failed { reason } => reason.as_str(),
                    JobStatus::Succeeded => "",
                };
                Err(HarnessError::JobsFailed {
                    failed: failed.len(),
                    expected: self.expected,
                    first: format!("{}: {}", first.ticket.label, reason),
                })
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Batch
// ---------------------------------------------------------------------------

/// A fixed-size group of jobs tracked by one completion barrier.
pub struct Batch {
    state: Arc<BatchState>,
}

impl Batch {
    /// Create a batch that completes after exactly `expected` signals.
    pub fn new(expected: usize) -> Self {
        Self {
            state: Arc::new(BatchState {
                expected,
                registered: AtomicUsize::new(0),
                completed: AtomicUsize::new(0),
                barrier: Semaphore::new(0),
                outcomes: Mutex::new(Vec::with_capacity(expected)),
            }),
        }
    }

    pub fn expected(&self) -> usize {
        self.state.expected
    }

    /// Number of jobs that have signalled so far.
    pub fn completed(&self) -> usize {
        self.state.completed.load(Ordering::Acquire)
    }

    /// Reserve one of the batch's slots and return its completion handle.
    ///
    /// Fails once `expected` handles have been handed out.
    pub fn register(&self, ticket: JobTicket) -> Result<CompletionHandle, HarnessError> {
        let expected = self.state.expected;
        self.state
            .registered
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                (n < expected).then_some(n + 1)
            })
            .map_err(|_| HarnessError::BatchOverSubscribed { expected })?;

        Ok(CompletionHandle {
            state: Arc::clone(&self.state),
            ticket: Some(ticket),
        })
    }

    /// Hand `job` to the engine without blocking.
    ///
    /// The job runs on a spawned tokio task, so this must be called from
    /// within a runtime. Its result is written to `job.output` and the
    /// batch is signalled with success or failure either way.
    pub fn submit(&self, engine: Arc<dyn OrbitEngine>, job: Job) -> Result<(), HarnessError> {
        let handle = self.register(job.ticket())?;
        debug!(job = %job.label, kind = job.kind.name(), "Submitting job");

        tokio::spawn(async move {
            match run_job(engine.as_ref(), &job).await {
                Ok(()) => handle.succeed(),
                Err(e) => {
                    warn!(job = %job.label, error = %e, "Job failed");
                    handle.fail(format!("{e:#}"));
                }
            }
        });

        Ok(())
    }

    /// Block until every expected job has signalled.
    ///
    /// Consumes the batch: its barrier can be waited on once. With a
    /// `timeout`, gives up after that long and reports how far it got.
    pub async fn wait(self, timeout: Option<Duration>) -> Result<BatchReport, HarnessError> {
        let expected = self.state.expected;
        if expected == 0 {
            return Ok(BatchReport {
                expected,
                outcomes: Vec::new(),
            });
        }

        let permits =
            u32::try_from(expected).map_err(|_| HarnessError::BatchTooLarge { expected })?;
        let acquire = self.state.barrier.acquire_many(permits);

        let acquired = match timeout {
            Some(limit) => tokio::time::timeout(limit, acquire).await.map_err(|_| {
                HarnessError::BatchTimedOut {
                    completed: self.completed(),
                    expected,
                }
            })?,
            None => acquire.await,
        };
        acquired.map_err(|_| HarnessError::BarrierClosed)?.forget();

        let outcomes = std::mem::take(
            &mut *self
                .state
                .outcomes
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let report = BatchReport { expected, outcomes };
        info!(
            expected,
            succeeded = report.succeeded().count(),
            failed = report.failed().count(),
            "Batch complete"
        );
        Ok(report)
    }
}

/// Run one job through the engine and persist its result.
async fn run_job(engine: &dyn OrbitEngine, job: &Job) -> Result<()> {
    let data = match &job.kind {
        JobKind::Simulate { config } => engine.simulate(config).await?,
        JobKind::Estimate {
            config,
            observations,
        } => engine.determine_orbit(config, observations).await?,
    };
    let output = job.output.clone();
    tokio::task::spawn_blocking(move || storage::write_json(&output, &data))
        .await
        .context("Output writer task panicked")?
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
