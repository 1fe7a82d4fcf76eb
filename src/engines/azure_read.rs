//! OCR using Azure Computer Vision's Read API (v3.2).
//!
//! The PDF is posted directly to the service, which answers with an
//! `Operation-Location` header naming the job. No staging store is needed.

use reqwest::header::CONTENT_TYPE;

use crate::{
    config::{AzureConfig, Vendor},
    pipeline::{
        InputDocument, JobStatus, OcrEngine, RemoteJob,
        assemble::{PagedResults, ResultChunk, ResultPage, ResultSource},
    },
    prelude::*,
};

use super::{api_url, check_response, http_client};

/// Header carrying the subscription key.
const SUBSCRIPTION_KEY_HEADER: &str = "Ocp-Apim-Subscription-Key";

/// Header naming the started operation.
const OPERATION_LOCATION_HEADER: &str = "Operation-Location";

/// OCR engine wrapping the Azure Read API.
pub struct AzureReadEngine {
    http: reqwest::Client,
    config: AzureConfig,
}

impl AzureReadEngine {
    /// Create a new engine.
    pub fn new(config: AzureConfig) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            config,
        })
    }

    /// Fetch the current state of a read operation.
    async fn read_result(&self, job: &RemoteJob) -> Result<ReadOperationResult> {
        let url = api_url(
            self.config.endpoint.as_str(),
            ["vision", "v3.2", "read", "analyzeResults", job.id.as_str()],
        )?;
        let response = self
            .http
            .get(url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.subscription_key)
            .send()
            .await
            .context("failed to query Azure read result")?;
        check_response(response)
            .await?
            .json::<ReadOperationResult>()
            .await
            .context("failed to parse Azure read result")
    }
}

#[async_trait]
impl OcrEngine for AzureReadEngine {
    fn vendor(&self) -> Vendor {
        Vendor::AzureRead
    }

    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    async fn start_job(&self, input: &InputDocument) -> Result<RemoteJob> {
        let data = tokio::fs::read(&input.path)
            .await
            .with_context(|| format!("failed to read {}", input.path.display()))?;
        let url = api_url(
            self.config.endpoint.as_str(),
            ["vision", "v3.2", "read", "analyze"],
        )?;
        let response = self
            .http
            .post(url)
            .header(SUBSCRIPTION_KEY_HEADER, &self.config.subscription_key)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(data)
            .send()
            .await
            .context("failed to call Azure Read")?;
        let response = check_response(response).await?;
        let location = response
            .headers()
            .get(OPERATION_LOCATION_HEADER)
            .ok_or_else(|| {
                anyhow!("Azure Read response has no {OPERATION_LOCATION_HEADER}")
            })?
            .to_str()
            .context("Azure Read returned a non-ASCII operation location")?;
        let operation_id = operation_id_from_location(location)?;
        Ok(RemoteJob::new(operation_id, &input.file_name))
    }

    async fn job_status(&self, job: &RemoteJob) -> Result<JobStatus> {
        Ok(self.read_result(job).await?.job_status())
    }

    fn result_source(&self) -> ResultSource<'_> {
        ResultSource::TokenPaginated(self)
    }
}

#[async_trait]
impl PagedResults for AzureReadEngine {
    /// The Read API returns every page in one response, so the chain always
    /// ends after the first fetch.
    async fn fetch_results(
        &self,
        job: &RemoteJob,
        token: Option<&str>,
    ) -> Result<ResultChunk> {
        if let Some(token) = token {
            return Err(anyhow!(
                "Azure Read results are not paginated (got {token:?})"
            ));
        }
        let result = self.read_result(job).await?;
        Ok(ResultChunk {
            pages: result.into_pages()?,
            next_token: None,
        })
    }
}

/// The operation ID is the last path segment of `Operation-Location`.
fn operation_id_from_location(location: &str) -> Result<&str> {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| anyhow!("cannot find an operation ID in {location:?}"))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReadOperationResult {
    status: String,
    analyze_result: Option<AnalyzeResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnalyzeResult {
    #[serde(default)]
    read_results: Vec<ReadResult>,
}

#[derive(Debug, Deserialize)]
struct ReadResult {
    #[serde(default)]
    lines: Vec<Line>,
}

#[derive(Debug, Deserialize)]
struct Line {
    text: String,
}

impl ReadOperationResult {
    fn job_status(&self) -> JobStatus {
        match self.status.as_str() {
            "notStarted" => JobStatus::Pending,
            "running" => JobStatus::Running,
            "succeeded" => JobStatus::Succeeded,
            other => JobStatus::Failed(format!("operation status {other}")),
        }
    }

    /// One text page per result page, with every line terminated by `\n`.
    fn into_pages(self) -> Result<Vec<ResultPage>> {
        if self.job_status() != JobStatus::Succeeded {
            return Err(anyhow!("read operation is {:?}, not succeeded", self.status));
        }
        let analyze_result = self
            .analyze_result
            .ok_or_else(|| anyhow!("succeeded read operation has no analyzeResult"))?;
        Ok(analyze_result
            .read_results
            .into_iter()
            .map(|page| {
                let mut text = String::new();
                for line in page.lines {
                    text.push_str(&line.text);
                    text.push('\n');
                }
                ResultPage::Text(text)
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operation_id_is_last_segment() {
        let location = "https://example.cognitiveservices.azure.com\
                        /vision/v3.2/read/analyzeResults/0f8a-42";
        assert_eq!(operation_id_from_location(location).unwrap(), "0f8a-42");
        assert!(operation_id_from_location("").is_err());
    }

    #[test]
    fn maps_statuses() {
        let parse = |json: &str| {
            serde_json::from_str::<ReadOperationResult>(json)
                .unwrap()
                .job_status()
        };
        assert_eq!(parse(r#"{"status":"notStarted"}"#), JobStatus::Pending);
        assert_eq!(parse(r#"{"status":"running"}"#), JobStatus::Running);
        assert_eq!(parse(r#"{"status":"succeeded"}"#), JobStatus::Succeeded);
        assert_eq!(
            parse(r#"{"status":"failed"}"#),
            JobStatus::Failed("operation status failed".to_owned())
        );
    }

    #[test]
    fn lines_become_newline_terminated_text() {
        let result = serde_json::from_str::<ReadOperationResult>(
            r#"{
                "status": "succeeded",
                "createdDateTime": "2024-01-01T00:00:00Z",
                "analyzeResult": {
                    "version": "3.2.0",
                    "readResults": [
                        {"page": 1, "lines": [{"text": "Hello"}, {"text": "world"}]},
                        {"page": 2, "lines": []},
                        {"page": 3, "lines": [{"text": "Bye"}]}
                    ]
                }
            }"#,
        )
        .unwrap();
        assert_eq!(
            result.into_pages().unwrap(),
            vec![
                ResultPage::Text("Hello\nworld\n".to_owned()),
                ResultPage::Text(String::new()),
                ResultPage::Text("Bye\n".to_owned()),
            ]
        );
    }

    #[test]
    fn unfinished_result_has_no_pages() {
        let result =
            serde_json::from_str::<ReadOperationResult>(r#"{"status":"running"}"#).unwrap();
        assert!(result.into_pages().is_err());
    }
}
