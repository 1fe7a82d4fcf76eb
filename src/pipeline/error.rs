//! Per-document failures.
//!
//! Every error here is caught by the batch driver and reported against the
//! document that caused it. None of them ends the batch. Vendor and network
//! errors are carried as opaque [`anyhow::Error`] causes.

use std::{io, time::Duration};

use thiserror::Error;

/// Why a single document could not be turned into an output file.
#[derive(Debug, Error)]
pub enum OcrError {
    /// Staging the document or starting the remote job failed.
    #[error("could not submit {file_name}")]
    Submission {
        file_name: String,
        #[source]
        source: anyhow::Error,
    },

    /// A status query failed while we were waiting on a job.
    #[error("could not query the status of job {job_id}")]
    StatusQuery {
        job_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The job did not reach a terminal status within its bounded wait.
    #[error("job {job_id} did not finish within {}s", waited.as_secs())]
    PollTimeout { job_id: String, waited: Duration },

    /// The job finished, but not successfully.
    #[error("job {job_id} failed: {reason}")]
    JobFailed { job_id: String, reason: String },

    /// Fetching or decoding the results of a finished job failed.
    #[error("could not assemble the results of job {job_id}")]
    Assembly {
        job_id: String,
        #[source]
        source: anyhow::Error,
    },

    /// The output file could not be written.
    #[error("could not write {}", path.display())]
    Write {
        path: std::path::PathBuf,
        #[source]
        source: io::Error,
    },
}

impl OcrError {
    /// Render this error with its full cause chain on one line.
    pub fn report(&self) -> String {
        use std::error::Error as _;
        let mut out = self.to_string();
        let mut cause = self.source();
        while let Some(err) = cause {
            out.push_str(": ");
            out.push_str(&err.to_string());
            cause = err.source();
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_includes_cause_chain() {
        let err = OcrError::Submission {
            file_name: "report.pdf".to_owned(),
            source: anyhow::anyhow!("access denied").context("upload to bucket failed"),
        };
        assert_eq!(
            err.report(),
            "could not submit report.pdf: upload to bucket failed: access denied"
        );
    }

    #[test]
    fn poll_timeout_mentions_bound() {
        let err = OcrError::PollTimeout {
            job_id: "op-1".to_owned(),
            waited: Duration::from_secs(180),
        };
        assert_eq!(err.to_string(), "job op-1 did not finish within 180s");
    }
}
