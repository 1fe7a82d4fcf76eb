//! OCR using Google Cloud Vision's asynchronous file annotation.
//!
//! The document is uploaded to a Cloud Storage bucket, and Vision writes one
//! JSON file per batch of pages into a second bucket. We list and download
//! those files once the long-running operation is done.

use reqwest::header::CONTENT_TYPE;
use serde_json::json;

use crate::{
    config::{GoogleConfig, Vendor},
    pipeline::{
        InputDocument, JobStatus, OcrEngine, RemoteJob,
        assemble::{ArtifactStore, ResultPage, ResultSource},
    },
    prelude::*,
};

use super::{api_url, check_response, http_client};

/// Cloud Storage JSON API.
const STORAGE_API: &str = "https://storage.googleapis.com/storage/v1/";

/// Cloud Storage media upload endpoint.
const STORAGE_UPLOAD_API: &str = "https://storage.googleapis.com/upload/storage/v1/";

/// Cloud Vision REST API.
const VISION_API: &str = "https://vision.googleapis.com/v1/";

/// How many pages Vision puts into each output file.
const PAGES_PER_OUTPUT_FILE: u32 = 2;

/// OCR engine wrapping Google Cloud Vision and Cloud Storage.
pub struct GoogleVisionEngine {
    http: reqwest::Client,
    access_token: String,
    config: GoogleConfig,
}

impl GoogleVisionEngine {
    /// Create a new engine using an OAuth access token.
    pub fn new(config: GoogleConfig, access_token: String) -> Result<Self> {
        Ok(Self {
            http: http_client()?,
            access_token,
            config,
        })
    }

    /// Upload a document to the input bucket under its file name.
    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    async fn upload(&self, input: &InputDocument) -> Result<()> {
        let data = tokio::fs::read(&input.path)
            .await
            .with_context(|| format!("failed to read {}", input.path.display()))?;
        let content_type = mime_guess::from_path(&input.path).first_or_octet_stream();

        let bucket = self.config.input_bucket.as_str();
        let mut url = api_url(STORAGE_UPLOAD_API, ["b", bucket, "o"])?;
        url.query_pairs_mut()
            .append_pair("uploadType", "media")
            .append_pair("name", &input.file_name);
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .header(CONTENT_TYPE, content_type.essence_str())
            .body(data)
            .send()
            .await
            .context("failed to upload to Cloud Storage")?;
        check_response(response)
            .await
            .with_context(|| format!("upload to gs://{} failed", self.config.input_bucket))?;
        Ok(())
    }
}

#[async_trait]
impl OcrEngine for GoogleVisionEngine {
    fn vendor(&self) -> Vendor {
        Vendor::GoogleVision
    }

    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    async fn start_job(&self, input: &InputDocument) -> Result<RemoteJob> {
        self.upload(input).await?;

        let request = annotate_request(&self.config, &input.file_name);
        trace!(%request, "Vision request");
        let response = self
            .http
            .post(api_url(VISION_API, ["files:asyncBatchAnnotate"])?)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .context("failed to call Vision asyncBatchAnnotate")?;
        let operation = check_response(response)
            .await?
            .json::<Operation>()
            .await
            .context("failed to parse Vision operation")?;
        Ok(RemoteJob::new(operation.name, &input.file_name))
    }

    async fn job_status(&self, job: &RemoteJob) -> Result<JobStatus> {
        let response = self
            .http
            .get(api_url(VISION_API, job.id.split('/'))?)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("failed to query Vision operation")?;
        let operation = check_response(response)
            .await?
            .json::<Operation>()
            .await
            .context("failed to parse Vision operation")?;
        Ok(operation.status())
    }

    fn result_source(&self) -> ResultSource<'_> {
        ResultSource::ListingBased(self)
    }
}

#[async_trait]
impl ArtifactStore for GoogleVisionEngine {
    async fn list_artifacts(&self, job: &RemoteJob) -> Result<Vec<String>> {
        let bucket = self.config.output_bucket.as_str();
        let prefix = output_prefix(&job.file_name);
        let mut names = Vec::new();
        let mut page_token: Option<String> = None;
        loop {
            let mut url = api_url(STORAGE_API, ["b", bucket, "o"])?;
            {
                let mut query = url.query_pairs_mut();
                query.append_pair("prefix", &prefix);
                if let Some(token) = &page_token {
                    query.append_pair("pageToken", token);
                }
            }
            let response = self
                .http
                .get(url)
                .bearer_auth(&self.access_token)
                .send()
                .await
                .context("failed to list Cloud Storage objects")?;
            let listing = check_response(response)
                .await?
                .json::<ObjectList>()
                .await
                .context("failed to parse Cloud Storage listing")?;
            names.extend(listing.items.into_iter().map(|item| item.name));
            match listing.next_page_token {
                Some(token) if page_token.as_ref() != Some(&token) => page_token = Some(token),
                Some(token) => {
                    return Err(anyhow!("Cloud Storage repeated page token {token:?}"));
                }
                None => break,
            }
        }
        Ok(names)
    }

    async fn fetch_artifact(&self, name: &str) -> Result<Vec<ResultPage>> {
        let bucket = self.config.output_bucket.as_str();
        let mut url = api_url(STORAGE_API, ["b", bucket, "o", name])?;
        url.query_pairs_mut().append_pair("alt", "media");
        let response = self
            .http
            .get(url)
            .bearer_auth(&self.access_token)
            .send()
            .await
            .context("failed to download Vision output")?;
        let data = check_response(response).await?.bytes().await?;
        parse_annotate_file_response(&data)
    }
}

/// Where Vision writes the results for `file_name`.
fn output_prefix(file_name: &str) -> String {
    format!("{file_name}/")
}

/// Build an `asyncBatchAnnotate` request for one PDF.
fn annotate_request(config: &GoogleConfig, file_name: &str) -> Value {
    json!({
        "requests": [{
            "inputConfig": {
                "gcsSource": {
                    "uri": format!("gs://{}/{}", config.input_bucket, file_name),
                },
                "mimeType": "application/pdf",
            },
            "features": [{ "type": "DOCUMENT_TEXT_DETECTION" }],
            "outputConfig": {
                "gcsDestination": {
                    "uri": format!(
                        "gs://{}/{}",
                        config.output_bucket,
                        output_prefix(file_name),
                    ),
                },
                "batchSize": PAGES_PER_OUTPUT_FILE,
            },
        }],
    })
}

/// A long-running operation.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    error: Option<RpcStatus>,
    metadata: Option<OperationMetadata>,
}

impl Operation {
    fn status(&self) -> JobStatus {
        match (self.done, &self.error) {
            (true, Some(error)) => JobStatus::Failed(error.to_string()),
            (true, None) => JobStatus::Succeeded,
            (false, _) => match self.metadata.as_ref().and_then(|m| m.state.as_deref()) {
                Some("CREATED") | None => JobStatus::Pending,
                Some(_) => JobStatus::Running,
            },
        }
    }
}

#[derive(Debug, Deserialize)]
struct OperationMetadata {
    state: Option<String>,
}

/// A Google RPC error status.
#[derive(Debug, Deserialize)]
struct RpcStatus {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

impl std::fmt::Display for RpcStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} (code {})", self.message, self.code)
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ObjectList {
    #[serde(default)]
    items: Vec<ObjectResource>,
    next_page_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectResource {
    name: String,
}

/// One output file written by Vision.
#[derive(Debug, Deserialize)]
struct AnnotateFileResponse {
    #[serde(default)]
    responses: Vec<AnnotateImageResponse>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateImageResponse {
    full_text_annotation: Option<TextAnnotation>,
    error: Option<RpcStatus>,
    context: Option<ImageAnnotationContext>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageAnnotationContext {
    page_number: Option<u32>,
}

/// Extract the full text of every page in a Vision output file.
fn parse_annotate_file_response(data: &[u8]) -> Result<Vec<ResultPage>> {
    let response = serde_json::from_slice::<AnnotateFileResponse>(data)
        .context("failed to parse Vision output file")?;
    let mut pages = Vec::with_capacity(response.responses.len());
    for page in response.responses {
        let page_number = page.context.and_then(|c| c.page_number);
        if let Some(error) = &page.error {
            warn!(?page_number, %error, "Vision could not annotate page");
        }
        if let Some(annotation) = page.full_text_annotation {
            pages.push(ResultPage::Text(annotation.text));
        }
    }
    Ok(pages)
}
