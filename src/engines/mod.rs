//! Vendor OCR engines.

use std::sync::Arc;

use reqwest::{Response, Url};

use crate::{
    aws::load_aws_config, config::VendorConfig, gcp::load_access_token,
    pipeline::OcrEngine, prelude::*,
};

pub mod azure_read;
pub mod google_vision;
pub mod textract;

/// Build the engine for a vendor configuration.
///
/// This is where ambient credentials get resolved, once, before any document
/// is processed.
pub async fn engine_for_config(config: VendorConfig) -> Result<Arc<dyn OcrEngine>> {
    debug!(vendor = %config.vendor(), "Creating OCR engine");
    let engine: Arc<dyn OcrEngine> = match config {
        VendorConfig::GoogleVision(config) => {
            let access_token = load_access_token().await?;
            Arc::new(google_vision::GoogleVisionEngine::new(config, access_token)?)
        }
        VendorConfig::Textract(config) => {
            let sdk_config = load_aws_config().await?;
            Arc::new(textract::TextractEngine::new(&sdk_config, config))
        }
        VendorConfig::AzureRead(config) => Arc::new(azure_read::AzureReadEngine::new(config)?),
    };
    Ok(engine)
}

/// Create the HTTP client used by REST-based engines.
fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
        .build()
        .context("failed to create HTTP client")
}

/// Build a URL by appending path segments to `base`. Each segment is
/// percent-encoded, so `/` inside a segment stays part of that segment.
fn api_url<'a>(base: &str, segments: impl IntoIterator<Item = &'a str>) -> Result<Url> {
    let mut url = Url::parse(base).with_context(|| format!("invalid base URL {base:?}"))?;
    url.path_segments_mut()
        .map_err(|()| anyhow!("cannot append a path to {base:?}"))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Turn an unsuccessful HTTP response into an error that includes its body.
async fn check_response(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let location = format!(
        "{}{}",
        response.url().host_str().unwrap_or_default(),
        response.url().path()
    );
    let body = response.text().await.unwrap_or_default();
    Err(anyhow!("HTTP {status} from {location}: {}", body.trim()))
}
