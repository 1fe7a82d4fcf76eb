//! Fixed-interval job polling.
//!
//! Job durations are decided by the vendor, so there is no backoff and no
//! jitter. Whether the wait is bounded is a per-vendor policy.

use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::prelude::*;

use super::{JobStatus, OcrEngine, OcrError, RemoteJob};

/// How often to ask about a job, and how long to keep asking.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two status queries.
    pub interval: Duration,

    /// Give up after this long. `None` waits until the job finishes.
    pub timeout: Option<Duration>,
}

impl PollPolicy {
    /// Poll forever at `interval`.
    pub const fn unbounded(interval: Duration) -> Self {
        Self {
            interval,
            timeout: None,
        }
    }

    /// Poll at `interval`, giving up after `timeout`.
    pub const fn bounded(interval: Duration, timeout: Duration) -> Self {
        Self {
            interval,
            timeout: Some(timeout),
        }
    }
}

/// Query `job` until it reaches a terminal status.
///
/// The returned status is always terminal.
pub async fn wait_for_terminal(
    engine: &dyn OcrEngine,
    job: &RemoteJob,
    policy: PollPolicy,
) -> Result<JobStatus, OcrError> {
    let started = Instant::now();
    let mut queries = 0usize;
    loop {
        let status =
            engine
                .job_status(job)
                .await
                .map_err(|source| OcrError::StatusQuery {
                    job_id: job.id.clone(),
                    source,
                })?;
        queries += 1;
        trace!(?status, queries, "Polled job status");
        if status.is_terminal() {
            debug!(?status, queries, "Job reached terminal status");
            return Ok(status);
        }

        if let Some(timeout) = policy.timeout {
            let waited = started.elapsed();
            if waited >= timeout {
                warn!(job = %job.id, waited_secs = waited.as_secs(), "Gave up waiting on job");
                return Err(OcrError::PollTimeout {
                    job_id: job.id.clone(),
                    waited,
                });
            }
        }
        sleep(policy.interval).await;
    }
}
