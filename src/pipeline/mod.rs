//! Vendor-independent OCR job pipeline.
//!
//! Each vendor drives the same shape of asynchronous protocol: stage and start
//! a remote job, poll it until it reaches a terminal status, fetch its results
//! and write them to one local file. [`OcrEngine`] is the vendor-specific
//! half of that protocol, and [`Pipeline`] composes it with the shared
//! poller, assembler and writer.

use std::{fmt, sync::Arc};

use tokio::time::Instant;

use crate::{config::Vendor, prelude::*};

use self::assemble::{OutputFormat, ResultSource, assemble_pages};

pub mod assemble;
pub mod batch;
pub mod error;
pub mod output;
pub mod poll;
#[cfg(test)]
pub mod testing;

pub use self::error::OcrError;

/// A local document waiting to be OCRed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InputDocument {
    /// Where the document lives.
    pub path: PathBuf,

    /// The bare file name, used as the remote object name.
    pub file_name: String,
}

impl InputDocument {
    /// Describe a document at `path`.
    pub fn from_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file_name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| anyhow!("not a usable file name: {:?}", path))?
            .to_owned();
        Ok(Self { path, file_name })
    }
}

/// A job owned by a remote OCR service. We only hold its identifier.
#[derive(Clone, Debug)]
pub struct RemoteJob {
    /// The vendor-issued job or operation identifier.
    pub id: String,

    /// The name of the document this job is processing.
    pub file_name: String,

    /// When we started the job.
    pub submitted_at: Instant,
}

impl RemoteJob {
    /// Record a freshly started job.
    pub fn new(id: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            file_name: file_name.into(),
            submitted_at: Instant::now(),
        }
    }
}

/// Status of a remote job, as reported by the vendor.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum JobStatus {
    /// Accepted, but not started.
    Pending,
    /// Being processed.
    Running,
    /// Finished with results available.
    Succeeded,
    /// Finished without usable results.
    Failed(String),
}

impl JobStatus {
    /// Will this status ever change again?
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Succeeded | JobStatus::Failed(_))
    }
}

/// Where one document is in its trip through the pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DocumentState {
    Pending,
    Submitted,
    Polling,
    Succeeded,
    Failed,
    Written,
    Skipped,
}

impl fmt::Display for DocumentState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DocumentState::Pending => "pending",
            DocumentState::Submitted => "submitted",
            DocumentState::Polling => "polling",
            DocumentState::Succeeded => "succeeded",
            DocumentState::Failed => "failed",
            DocumentState::Written => "written",
            DocumentState::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// The vendor-specific half of an asynchronous OCR protocol.
///
/// Errors returned here are opaque vendor or network failures. [`Pipeline`]
/// wraps them into the matching [`OcrError`].
#[async_trait]
pub trait OcrEngine: Send + Sync + 'static {
    /// Which vendor is this?
    fn vendor(&self) -> Vendor;

    /// Stage the document if the vendor needs it, and start a job.
    async fn start_job(&self, input: &InputDocument) -> Result<RemoteJob>;

    /// Ask the vendor for the current status of a job.
    async fn job_status(&self, job: &RemoteJob) -> Result<JobStatus>;

    /// How results are retrieved once a job succeeds.
    fn result_source(&self) -> ResultSource<'_>;
}

/// One vendor's complete submit → poll → assemble → write pipeline.
#[derive(Clone)]
pub struct Pipeline {
    engine: Arc<dyn OcrEngine>,
    output_dir: PathBuf,
}

impl Pipeline {
    /// Create a pipeline writing into `output_dir`.
    pub fn new(engine: Arc<dyn OcrEngine>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            engine,
            output_dir: output_dir.into(),
        }
    }

    /// Which vendor does this pipeline drive?
    pub fn vendor(&self) -> Vendor {
        self.engine.vendor()
    }

    /// The format our results are written in.
    pub fn output_format(&self) -> OutputFormat {
        self.vendor().output_format()
    }

    /// Where output files go.
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Start a remote job for `input`.
    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    pub async fn submit(&self, input: &InputDocument) -> Result<RemoteJob, OcrError> {
        self.engine
            .start_job(input)
            .await
            .map_err(|source| OcrError::Submission {
                file_name: input.file_name.clone(),
                source,
            })
    }

    /// Wait for `job` to finish, using this vendor's poll policy.
    #[instrument(level = "debug", skip_all, fields(job = %job.id))]
    pub async fn poll(&self, job: &RemoteJob) -> Result<JobStatus, OcrError> {
        poll::wait_for_terminal(self.engine.as_ref(), job, self.vendor().poll_policy())
            .await
    }

    /// Fetch all result pages of a succeeded job and render them.
    #[instrument(level = "debug", skip_all, fields(job = %job.id))]
    pub async fn assemble(&self, job: &RemoteJob) -> Result<String, OcrError> {
        let wrap = |source| OcrError::Assembly {
            job_id: job.id.clone(),
            source,
        };
        let pages = assemble_pages(self.engine.result_source(), job)
            .await
            .map_err(wrap)?;
        self.output_format().render(&pages).map_err(wrap)
    }

    /// Write assembled content for `input`, returning the output path.
    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    pub async fn write(
        &self,
        input: &InputDocument,
        content: &str,
    ) -> Result<PathBuf, OcrError> {
        let path = output::output_path(&self.output_dir, &input.path, self.output_format());
        let (target, content) = (path.clone(), content.to_owned());
        tokio::task::spawn_blocking(move || output::write_output(&target, &content))
            .await
            .map_err(|err| OcrError::Write {
                path: path.clone(),
                source: std::io::Error::other(err),
            })??;
        Ok(path)
    }

    /// Drive one document all the way through the pipeline.
    ///
    /// On any error, no output file exists for this document.
    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    pub async fn process(&self, input: &InputDocument) -> Result<PathBuf, OcrError> {
        debug!(state = %DocumentState::Pending);
        let job = self.submit(input).await?;
        debug!(state = %DocumentState::Submitted, job = %job.id);
        info!("Started job {}, waiting for completion...", job.id);

        debug!(state = %DocumentState::Polling);
        let status = self.poll(&job).await?;
        if let Err(err) = require_success(&job, status) {
            debug!(state = %DocumentState::Failed);
            return Err(err);
        }
        debug!(
            state = %DocumentState::Succeeded,
            elapsed_secs = job.submitted_at.elapsed().as_secs()
        );

        let content = self.assemble(&job).await?;
        let path = self.write(input, &content).await?;
        debug!(state = %DocumentState::Written, path = %path.display());
        Ok(path)
    }
}

/// Turn the terminal status of `job` into the pipeline's verdict.
///
/// A non-terminal status here is reported as a status error.
fn require_success(job: &RemoteJob, status: JobStatus) -> Result<(), OcrError> {
    match status {
        JobStatus::Succeeded => Ok(()),
        JobStatus::Failed(reason) => Err(OcrError::JobFailed {
            job_id: job.id.clone(),
            reason,
        }),
        status @ (JobStatus::Pending | JobStatus::Running) => Err(OcrError::StatusQuery {
            job_id: job.id.clone(),
            source: anyhow!("poller stopped at non-terminal status {status:?}"),
        }),
    }
}
