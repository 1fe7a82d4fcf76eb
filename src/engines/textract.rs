//! OCR using AWS Textract's asynchronous text detection.
//!
//! The document is uploaded to S3, and Textract reads it from there. Results
//! come back from `GetDocumentTextDetection` in pages chained by `NextToken`.
//! Each response is kept as a structured page, since we write Textract output
//! as JSON.

use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_textract::{
    operation::get_document_text_detection::GetDocumentTextDetectionOutput,
    types::{Block, DocumentLocation, S3Object},
};

use crate::{
    config::{TextractConfig, Vendor},
    pipeline::{
        InputDocument, JobStatus, OcrEngine, RemoteJob,
        assemble::{PagedResults, ResultChunk, ResultPage, ResultSource},
    },
    prelude::*,
};

/// OCR engine wrapping AWS Textract and S3.
pub struct TextractEngine {
    /// S3 client for staging documents.
    s3: aws_sdk_s3::Client,

    /// AWS Textract client.
    textract: aws_sdk_textract::Client,

    /// Where documents are staged.
    config: TextractConfig,
}

impl TextractEngine {
    /// Create a new `textract` engine.
    pub fn new(sdk_config: &aws_config::SdkConfig, config: TextractConfig) -> Self {
        Self {
            s3: aws_sdk_s3::Client::new(sdk_config),
            textract: aws_sdk_textract::Client::new(sdk_config),
            config,
        }
    }

    /// Upload a document to the staging bucket under its file name.
    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    async fn upload(&self, input: &InputDocument) -> Result<()> {
        let body = ByteStream::from_path(&input.path)
            .await
            .with_context(|| format!("failed to read {}", input.path.display()))?;
        let content_type = mime_guess::from_path(&input.path).first_or_octet_stream();
        self.s3
            .put_object()
            .bucket(&self.config.input_bucket)
            .key(&input.file_name)
            .content_type(content_type.essence_str())
            .body(body)
            .send()
            .await
            .map_err(aws_sdk_s3::Error::from)
            .with_context(|| {
                format!("upload to s3://{} failed", self.config.input_bucket)
            })?;
        Ok(())
    }

    /// Fetch one `GetDocumentTextDetection` response.
    async fn get_detection(
        &self,
        job: &RemoteJob,
        next_token: Option<&str>,
    ) -> Result<GetDocumentTextDetectionOutput> {
        self.textract
            .get_document_text_detection()
            .job_id(&job.id)
            .set_next_token(next_token.map(str::to_owned))
            .send()
            .await
            .map_err(aws_sdk_textract::Error::from)
            .context("AWS Textract GetDocumentTextDetection failed")
    }
}

#[async_trait]
impl OcrEngine for TextractEngine {
    fn vendor(&self) -> Vendor {
        Vendor::Textract
    }

    #[instrument(level = "debug", skip_all, fields(file = %input.file_name))]
    async fn start_job(&self, input: &InputDocument) -> Result<RemoteJob> {
        self.upload(input).await?;

        let location = DocumentLocation::builder()
            .s3_object(
                S3Object::builder()
                    .bucket(&self.config.input_bucket)
                    .name(&input.file_name)
                    .build(),
            )
            .build();
        let response = self
            .textract
            .start_document_text_detection()
            .document_location(location)
            .send()
            .await
            .map_err(aws_sdk_textract::Error::from)
            .context("AWS Textract StartDocumentTextDetection failed")?;
        let job_id = response
            .job_id()
            .ok_or_else(|| anyhow!("AWS Textract did not return a job ID"))?;
        Ok(RemoteJob::new(job_id, &input.file_name))
    }

    async fn job_status(&self, job: &RemoteJob) -> Result<JobStatus> {
        let output = self.get_detection(job, None).await?;
        Ok(job_status_of(&output))
    }

    fn result_source(&self) -> ResultSource<'_> {
        ResultSource::TokenPaginated(self)
    }
}

#[async_trait]
impl PagedResults for TextractEngine {
    async fn fetch_results(
        &self,
        job: &RemoteJob,
        token: Option<&str>,
    ) -> Result<ResultChunk> {
        let output = self.get_detection(job, token).await?;
        let page = serde_json::to_value(DetectionPage::from_output(&output))
            .context("failed to serialize Textract response")?;
        Ok(ResultChunk {
            pages: vec![ResultPage::Structured(page)],
            next_token: output.next_token().map(str::to_owned),
        })
    }
}

/// Map a Textract job status onto ours.
///
/// A partial success is a failure here, since we never write partial output.
fn job_status_of(output: &GetDocumentTextDetectionOutput) -> JobStatus {
    use aws_sdk_textract::types::JobStatus as Status;
    let message = || {
        output
            .status_message()
            .unwrap_or("no status message")
            .to_owned()
    };
    match output.job_status() {
        Some(Status::InProgress) => JobStatus::Running,
        Some(Status::Succeeded) => JobStatus::Succeeded,
        Some(Status::Failed) => JobStatus::Failed(message()),
        Some(Status::PartialSuccess) => {
            JobStatus::Failed(format!("partial success: {}", message()))
        }
        Some(other) => JobStatus::Failed(format!("unknown job status {}", other.as_str())),
        None => JobStatus::Pending,
    }
}

/// A serializable copy of one `GetDocumentTextDetection` response.
///
/// Field names follow the service's own JSON.
#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectionPage {
    #[serde(skip_serializing_if = "Option::is_none")]
    job_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    status_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    next_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    detect_document_text_model_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    document_metadata: Option<DetectionMetadata>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    warnings: Vec<DetectionWarning>,
    blocks: Vec<DetectionBlock>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectionMetadata {
    pages: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectionWarning {
    error_code: Option<String>,
    pages: Vec<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectionBlock {
    #[serde(skip_serializing_if = "Option::is_none")]
    block_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    text_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    confidence: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    page: Option<i32>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    relationships: Vec<DetectionRelationship>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct DetectionRelationship {
    #[serde(rename = "Type")]
    kind: Option<String>,
    ids: Vec<String>,
}

impl DetectionPage {
    fn from_output(output: &GetDocumentTextDetectionOutput) -> Self {
        Self {
            job_status: output.job_status().map(|s| s.as_str().to_owned()),
            status_message: output.status_message().map(str::to_owned),
            next_token: output.next_token().map(str::to_owned),
            detect_document_text_model_version: output
                .detect_document_text_model_version()
                .map(str::to_owned),
            document_metadata: output.document_metadata().map(|m| DetectionMetadata {
                pages: m.pages(),
            }),
            warnings: output
                .warnings()
                .iter()
                .map(|w| DetectionWarning {
                    error_code: w.error_code().map(str::to_owned),
                    pages: w.pages().to_vec(),
                })
                .collect(),
            blocks: output.blocks().iter().map(DetectionBlock::from_block).collect(),
        }
    }
}

impl DetectionBlock {
    fn from_block(block: &Block) -> Self {
        Self {
            block_type: block.block_type().map(|t| t.as_str().to_owned()),
            id: block.id().map(str::to_owned),
            text: block.text().map(str::to_owned),
            text_type: block.text_type().map(|t| t.as_str().to_owned()),
            confidence: block.confidence(),
            page: block.page(),
            relationships: block
                .relationships()
                .iter()
                .map(|r| DetectionRelationship {
                    kind: r.r#type().map(|t| t.as_str().to_owned()),
                    ids: r.ids().to_vec(),
                })
                .collect(),
        }
    }
}
