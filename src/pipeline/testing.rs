//! A scripted [`OcrEngine`] for tests.

use std::{
    collections::{HashSet, VecDeque},
    sync::{
        Mutex,
        atomic::{AtomicUsize, Ordering},
    },
};

use crate::{config::Vendor, prelude::*};

use super::{
    InputDocument, JobStatus, OcrEngine, RemoteJob,
    assemble::{ArtifactStore, PagedResults, ResultChunk, ResultPage, ResultSource},
};

/// An engine whose every answer is scripted up front.
pub struct FakeEngine {
    vendor: Vendor,
    statuses: Mutex<VecDeque<JobStatus>>,
    failing_status: bool,
    failing_submits: HashSet<String>,
    chunks: Vec<ResultChunk>,
    artifacts: Option<Vec<(String, Vec<ResultPage>)>>,
    failing_results_after: Option<usize>,
    status_queries: AtomicUsize,
    result_fetches: AtomicUsize,
    requested_tokens: Mutex<Vec<Option<String>>>,
    submitted: Mutex<Vec<String>>,
}

impl FakeEngine {
    /// An engine for `vendor` whose jobs succeed at once with no results.
    pub fn new(vendor: Vendor) -> Self {
        Self {
            vendor,
            statuses: Mutex::new(VecDeque::new()),
            failing_status: false,
            failing_submits: HashSet::new(),
            chunks: vec![ResultChunk::default()],
            artifacts: None,
            failing_results_after: None,
            status_queries: AtomicUsize::new(0),
            result_fetches: AtomicUsize::new(0),
            requested_tokens: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
        }
    }

    /// Report these statuses in order, repeating the last one forever.
    pub fn with_statuses(mut self, statuses: Vec<JobStatus>) -> Self {
        self.statuses = Mutex::new(statuses.into());
        self
    }

    /// Return a single page of results per text fragment, with no token.
    pub fn with_pages(self, pages: Vec<&str>) -> Self {
        self.with_chunks(vec![(pages, None)])
    }

    /// Return these chunks as one continuation-token chain.
    pub fn with_chunks(mut self, chunks: Vec<(Vec<&str>, Option<&str>)>) -> Self {
        self.chunks = chunks
            .into_iter()
            .map(|(pages, token)| ResultChunk {
                pages: pages
                    .into_iter()
                    .map(|page| ResultPage::Text(page.to_owned()))
                    .collect(),
                next_token: token.map(str::to_owned),
            })
            .collect();
        self
    }

    /// Switch to listing-based results with these named artifacts.
    pub fn with_artifacts(mut self, artifacts: Vec<(&str, Vec<&str>)>) -> Self {
        self.artifacts = Some(
            artifacts
                .into_iter()
                .map(|(name, pages)| {
                    let pages = pages
                        .into_iter()
                        .map(|page| ResultPage::Text(page.to_owned()))
                        .collect();
                    (name.to_owned(), pages)
                })
                .collect(),
        );
        self
    }

    /// Fail every status query.
    pub fn failing_status(mut self) -> Self {
        self.failing_status = true;
        self
    }

    /// Fail to submit the document with this file name.
    pub fn failing_submit_for(mut self, file_name: &str) -> Self {
        self.failing_submits.insert(file_name.to_owned());
        self
    }

    /// Fail every result fetch after the first `n`.
    pub fn failing_results_after(mut self, n: usize) -> Self {
        self.failing_results_after = Some(n);
        self
    }

    /// How many status queries have we answered?
    pub fn status_queries(&self) -> usize {
        self.status_queries.load(Ordering::SeqCst)
    }

    /// How many result fetches have we answered?
    pub fn result_fetches(&self) -> usize {
        self.result_fetches.load(Ordering::SeqCst)
    }

    /// The continuation tokens we were asked for, in order.
    pub fn requested_tokens(&self) -> Vec<Option<String>> {
        self.requested_tokens.lock().expect("lock poisoned").clone()
    }

    /// The file names we were asked to submit, in order.
    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().expect("lock poisoned").clone()
    }

    /// Count a result fetch, failing if we were told to.
    fn count_result_fetch(&self) -> Result<()> {
        let n = self.result_fetches.fetch_add(1, Ordering::SeqCst);
        match self.failing_results_after {
            Some(limit) if n >= limit => Err(anyhow!("scripted result failure")),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl OcrEngine for FakeEngine {
    fn vendor(&self) -> Vendor {
        self.vendor
    }

    async fn start_job(&self, input: &InputDocument) -> Result<RemoteJob> {
        self.submitted
            .lock()
            .expect("lock poisoned")
            .push(input.file_name.clone());
        if self.failing_submits.contains(&input.file_name) {
            return Err(anyhow!("scripted submission failure"));
        }
        Ok(RemoteJob::new(
            format!("job-{}", input.file_name),
            &input.file_name,
        ))
    }

    async fn job_status(&self, _job: &RemoteJob) -> Result<JobStatus> {
        self.status_queries.fetch_add(1, Ordering::SeqCst);
        if self.failing_status {
            return Err(anyhow!("scripted status failure"));
        }
        let mut statuses = self.statuses.lock().expect("lock poisoned");
        let status = if statuses.len() > 1 {
            statuses.pop_front()
        } else {
            statuses.front().cloned()
        };
        Ok(status.unwrap_or(JobStatus::Succeeded))
    }

    fn result_source(&self) -> ResultSource<'_> {
        if self.artifacts.is_some() {
            ResultSource::ListingBased(self)
        } else {
            ResultSource::TokenPaginated(self)
        }
    }
}

#[async_trait]
impl PagedResults for FakeEngine {
    async fn fetch_results(
        &self,
        _job: &RemoteJob,
        token: Option<&str>,
    ) -> Result<ResultChunk> {
        self.requested_tokens
            .lock()
            .expect("lock poisoned")
            .push(token.map(str::to_owned));
        self.count_result_fetch()?;
        // Every job replays the same chain: the first chunk, then whichever
        // chunk follows the one that handed out `token`.
        let index = match token {
            None => 0,
            Some(token) => {
                self.chunks
                    .iter()
                    .position(|chunk| chunk.next_token.as_deref() == Some(token))
                    .ok_or_else(|| anyhow!("unknown continuation token {token:?}"))?
                    + 1
            }
        };
        self.chunks
            .get(index)
            .cloned()
            .ok_or_else(|| anyhow!("no scripted chunk #{index}"))
    }
}

#[async_trait]
impl ArtifactStore for FakeEngine {
    async fn list_artifacts(&self, _job: &RemoteJob) -> Result<Vec<String>> {
        Ok(self
            .artifacts
            .iter()
            .flatten()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn fetch_artifact(&self, name: &str) -> Result<Vec<ResultPage>> {
        self.count_result_fetch()?;
        self.artifacts
            .iter()
            .flatten()
            .find(|(candidate, _)| candidate == name)
            .map(|(_, pages)| pages.clone())
            .ok_or_else(|| anyhow!("no scripted artifact {name:?}"))
    }
}
