//! Gathering the results of a finished job.
//!
//! Vendors hand back results in one of two shapes. Some write result
//! artifacts into object storage, which we list and download one by one.
//! Others return results in pages chained by a continuation token. Both end
//! up as a flat list of [`ResultPage`]s in arrival order.

use std::collections::HashSet;

use futures::{StreamExt as _, stream};

use crate::prelude::*;

use super::RemoteJob;

/// One fragment of a job's results.
#[derive(Clone, Debug, PartialEq)]
pub enum ResultPage {
    /// Recognized text, already including any line terminators.
    Text(String),

    /// A structured vendor response, kept as-is.
    Structured(Value),
}

/// One response in a continuation-token chain.
#[derive(Clone, Debug, Default)]
pub struct ResultChunk {
    /// The pages carried by this response.
    pub pages: Vec<ResultPage>,

    /// The token for the next response, if there is one.
    pub next_token: Option<String>,
}

/// Result artifacts written by a job into a store we can list.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// List the names of all artifacts produced by `job`, in store order.
    async fn list_artifacts(&self, job: &RemoteJob) -> Result<Vec<String>>;

    /// Download and decode a single artifact.
    async fn fetch_artifact(&self, name: &str) -> Result<Vec<ResultPage>>;
}

/// Results returned directly by the vendor, one token-chained page at a time.
#[async_trait]
pub trait PagedResults: Send + Sync {
    /// Fetch the page after `token`, or the first page if `token` is `None`.
    async fn fetch_results(&self, job: &RemoteJob, token: Option<&str>)
    -> Result<ResultChunk>;
}

/// How a vendor's results are retrieved.
#[derive(Clone, Copy)]
pub enum ResultSource<'a> {
    /// List artifacts under the job's output location and fetch each one.
    ListingBased(&'a dyn ArtifactStore),

    /// Follow continuation tokens until a response carries none.
    TokenPaginated(&'a dyn PagedResults),
}

/// Retrieve every result page of a succeeded job.
///
/// If any fetch fails, the pages gathered so far are dropped.
pub async fn assemble_pages(
    source: ResultSource<'_>,
    job: &RemoteJob,
) -> Result<Vec<ResultPage>> {
    let mut pages = Vec::new();
    match source {
        ResultSource::ListingBased(store) => {
            // Store order is not guaranteed to be page order. We keep it
            // anyway, since the artifacts carry no better ordering signal.
            let names = store.list_artifacts(job).await?;
            debug!(count = names.len(), "Listed result artifacts");
            for name in names {
                let fetched = store
                    .fetch_artifact(&name)
                    .await
                    .with_context(|| format!("failed to fetch result artifact {name:?}"))?;
                pages.extend(fetched);
            }
        }
        ResultSource::TokenPaginated(results) => {
            let mut chunks = paginate(results, job);
            while let Some(chunk) = chunks.next().await {
                pages.extend(chunk?.pages);
            }
        }
    }
    Ok(pages)
}

/// State threaded through [`paginate`].
enum Cursor {
    First,
    After(String),
    Done,
}

/// Turn a token-chained API into a stream of [`ResultChunk`]s.
///
/// The stream ends after the first response without a token. A token we have
/// already followed is an error, so no page is ever fetched twice.
fn paginate<'a>(
    results: &'a dyn PagedResults,
    job: &'a RemoteJob,
) -> stream::BoxStream<'a, Result<ResultChunk>> {
    stream::try_unfold(
        (Cursor::First, HashSet::new()),
        move |(cursor, seen)| fetch_next_chunk(results, job, cursor, seen),
    )
    .boxed()
}

/// Fetch the chunk at `cursor` and compute the cursor that follows it.
async fn fetch_next_chunk(
    results: &dyn PagedResults,
    job: &RemoteJob,
    cursor: Cursor,
    mut seen: HashSet<String>,
) -> Result<Option<(ResultChunk, (Cursor, HashSet<String>))>> {
    let token = match cursor {
        Cursor::Done => return Ok(None),
        Cursor::First => None,
        Cursor::After(token) => Some(token),
    };
    let mut chunk = results
        .fetch_results(job, token.as_deref())
        .await
        .with_context(|| match &token {
            Some(token) => format!("failed to fetch results after token {token:?}"),
            None => "failed to fetch first page of results".to_owned(),
        })?;
    let next = match chunk.next_token.take() {
        Some(next) if !seen.insert(next.clone()) => {
            return Err(anyhow!("continuation token {next:?} was returned twice"));
        }
        Some(next) => Cursor::After(next),
        None => Cursor::Done,
    };
    trace!(pages = chunk.pages.len(), "Fetched result chunk");
    Ok(Some((chunk, (next, seen))))
}

/// How assembled results are serialized.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    /// Plain text: every text page, concatenated.
    Text,

    /// A JSON array holding every structured page.
    Json,
}

impl OutputFormat {
    /// File extension for this format.
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Text => "txt",
            OutputFormat::Json => "json",
        }
    }

    /// Serialize assembled pages.
    pub fn render(self, pages: &[ResultPage]) -> Result<String> {
        match self {
            OutputFormat::Text => {
                let mut text = String::new();
                for page in pages {
                    match page {
                        ResultPage::Text(page_text) => text.push_str(page_text),
                        ResultPage::Structured(_) => {
                            return Err(anyhow!(
                                "cannot write a structured result page as plain text"
                            ));
                        }
                    }
                }
                Ok(text)
            }
            OutputFormat::Json => {
                let values = pages
                    .iter()
                    .map(|page| match page {
                        ResultPage::Text(text) => Value::String(text.clone()),
                        ResultPage::Structured(value) => value.clone(),
                    })
                    .collect::<Vec<_>>();
                serde_json::to_string(&values).context("failed to serialize result pages")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::{
        config::Vendor,
        pipeline::{OcrEngine as _, testing::FakeEngine},
    };

    fn job() -> RemoteJob {
        RemoteJob::new("job-1", "report.pdf")
    }

    #[tokio::test]
    async fn paginated_fetch_follows_tokens_once() {
        let engine = FakeEngine::new(Vendor::Textract).with_chunks(vec![
            (vec!["a"], Some("t1")),
            (vec!["b"], Some("t2")),
            (vec!["c"], Some("t3")),
            (vec!["d"], None),
        ]);

        let pages = assemble_pages(engine.result_source(), &job()).await.unwrap();
        let texts = OutputFormat::Text.render(&pages).unwrap();
        assert_eq!(texts, "abcd");
        assert_eq!(engine.result_fetches(), 4);
        assert_eq!(
            engine.requested_tokens(),
            vec![None, Some("t1".to_owned()), Some("t2".to_owned()), Some("t3".to_owned())]
        );
    }

    #[tokio::test]
    async fn repeated_token_is_an_error() {
        let engine = FakeEngine::new(Vendor::Textract).with_chunks(vec![
            (vec!["a"], Some("t1")),
            (vec!["b"], Some("t1")),
            (vec!["c"], None),
        ]);

        let err = assemble_pages(engine.result_source(), &job()).await.unwrap_err();
        assert!(err.to_string().contains("returned twice"));
        assert_eq!(engine.result_fetches(), 2);
    }

    #[tokio::test]
    async fn paginated_fetch_error_discards_pages() {
        let engine = FakeEngine::new(Vendor::Textract)
            .with_chunks(vec![(vec!["a"], Some("t1"))])
            .failing_results_after(1);

        assert!(assemble_pages(engine.result_source(), &job()).await.is_err());
    }

    #[tokio::test]
    async fn listing_keeps_store_order() {
        let engine = FakeEngine::new(Vendor::GoogleVision).with_artifacts(vec![
            ("report.pdf/output-1-to-2.json", vec!["one", "two"]),
            ("report.pdf/output-11-to-12.json", vec!["eleven", "twelve"]),
            ("report.pdf/output-3-to-4.json", vec!["three"]),
        ]);

        let pages = assemble_pages(engine.result_source(), &job()).await.unwrap();
        assert_eq!(
            OutputFormat::Text.render(&pages).unwrap(),
            "onetwoeleventwelvethree"
        );
    }

    #[tokio::test]
    async fn listing_fetch_error_is_reported() {
        let engine = FakeEngine::new(Vendor::GoogleVision)
            .with_artifacts(vec![("report.pdf/output-1-to-2.json", vec!["one"])])
            .failing_results_after(0);

        let err = assemble_pages(engine.result_source(), &job()).await.unwrap_err();
        assert!(format!("{err:#}").contains("output-1-to-2.json"));
    }

    #[test]
    fn json_render_is_an_array_of_pages() {
        let pages = vec![
            ResultPage::Structured(json!({ "JobStatus": "SUCCEEDED", "Blocks": [] })),
            ResultPage::Structured(json!({ "JobStatus": "SUCCEEDED", "Blocks": [1] })),
        ];
        let rendered = OutputFormat::Json.render(&pages).unwrap();
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed.as_array().unwrap().len(), 2);
        assert_eq!(parsed[1]["Blocks"][0], 1);
    }

    #[test]
    fn text_render_rejects_structured_pages() {
        let pages = vec![ResultPage::Structured(json!({}))];
        assert!(OutputFormat::Text.render(&pages).is_err());
    }
}
