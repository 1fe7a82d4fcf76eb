use std::str::FromStr;

use clap::Parser;
use tracing_subscriber::{
    EnvFilter, Layer as _, filter::Directive, fmt::format::FmtSpan, layer::SubscriberExt,
    util::SubscriberInitExt as _,
};

use self::{prelude::*, ui::Ui};

mod aws;
mod cmd;
mod config;
mod engines;
mod gcp;
mod pipeline;
mod prelude;
mod ui;

/// OCR a directory of PDFs using Google Cloud Vision, AWS Textract or Azure
/// Computer Vision.
///
/// Documents are read from `./documents`, and results are written to
/// `./google_ocr`, `./aws_ocr` or `./azure_ocr`. The service and its settings
/// are chosen interactively.
#[derive(Debug, Parser)]
#[clap(
    version,
    author,
    after_help = r#"
Environment Variables:
  - GCS_INPUT_BUCKET, GCS_OUTPUT_BUCKET (optional): Default Google Cloud
    Storage buckets.
  - GOOGLE_OAUTH_ACCESS_TOKEN (optional): Google access token. If unset, we
    run `gcloud auth print-access-token`.
  - S3_INPUT_BUCKET (optional): Default S3 bucket for Textract.
  - AZURE_VISION_ENDPOINT, AZURE_VISION_KEY (optional): Default Azure
    endpoint and subscription key.

  Standard AWS environment variables and credential files
  are used for Textract.

  These variables may be set in a standard `.env` file.
"#
)]
struct Opts {}

/// Our entry point, which can return an error. [`anyhow::Result`] will
/// automatically print a nice error message with optional backtrace.
#[tokio::main]
async fn main() -> Result<()> {
    let ui = Ui::init();

    // Initialize tracing.
    let directive =
        Directive::from_str("info").expect("built-in directive should be valid");
    let env_filter = EnvFilter::builder()
        .with_default_directive(directive)
        .from_env_lossy();

    let subscriber = tracing_subscriber::fmt::layer()
        .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
        .with_writer(ui.get_stderr_writer())
        .with_filter(env_filter);
    tracing_subscriber::registry().with(subscriber).init();

    real_main(ui).await
}

/// Our real entry point.
#[instrument(level = "debug", name = "main", skip_all)]
async fn real_main(ui: Ui) -> Result<()> {
    // Load environment variables from a `.env` file, if it exists.
    dotenvy::dotenv().ok();

    let opts = Opts::parse();
    debug!("Parsed options: {:?}", opts);

    cmd::ocr::cmd_ocr(ui).await
}
