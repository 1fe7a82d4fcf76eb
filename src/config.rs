//! Vendor selection and per-vendor configuration.
//!
//! Configuration is gathered once, up front, and passed explicitly into the
//! engine for the chosen vendor. Engines never look up credentials on their
//! own.

use std::{env, fmt, time::Duration};

use reqwest::Url;
use tokio::io::{AsyncBufRead, AsyncWrite};

use crate::{
    pipeline::{assemble::OutputFormat, poll::PollPolicy},
    prelude::*,
    ui::Questioner,
};

/// The OCR services we know how to drive.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Vendor {
    /// Google Cloud Vision, via Cloud Storage.
    GoogleVision,
    /// AWS Textract, via S3.
    Textract,
    /// Azure Computer Vision's Read API.
    AzureRead,
}

impl Vendor {
    /// Every vendor, in menu order.
    pub const ALL: [Vendor; 3] = [Vendor::GoogleVision, Vendor::Textract, Vendor::AzureRead];

    /// Parse an interactive menu choice.
    pub fn from_choice(choice: &str) -> Result<Self> {
        match choice.trim() {
            "1" => Ok(Vendor::GoogleVision),
            "2" => Ok(Vendor::Textract),
            "3" => Ok(Vendor::AzureRead),
            other => Err(anyhow!("Invalid choice {other:?}. Exiting.")),
        }
    }

    /// The menu number for this vendor.
    pub fn choice(self) -> u8 {
        match self {
            Vendor::GoogleVision => 1,
            Vendor::Textract => 2,
            Vendor::AzureRead => 3,
        }
    }

    /// Human-readable service name.
    pub fn display_name(self) -> &'static str {
        match self {
            Vendor::GoogleVision => "Google Cloud Vision API",
            Vendor::Textract => "AWS Textract",
            Vendor::AzureRead => "Azure Computer Vision",
        }
    }

    /// Directory that receives this vendor's output files.
    pub fn output_dir(self) -> &'static Path {
        Path::new(match self {
            Vendor::GoogleVision => "./google_ocr",
            Vendor::Textract => "./aws_ocr",
            Vendor::AzureRead => "./azure_ocr",
        })
    }

    /// How this vendor's results are written.
    ///
    /// Textract results are a list of paginated structured responses, so they
    /// are kept as JSON instead of being flattened to text.
    pub fn output_format(self) -> OutputFormat {
        match self {
            Vendor::GoogleVision | Vendor::AzureRead => OutputFormat::Text,
            Vendor::Textract => OutputFormat::Json,
        }
    }

    /// How we wait on this vendor's jobs.
    pub fn poll_policy(self) -> PollPolicy {
        match self {
            Vendor::GoogleVision => {
                PollPolicy::bounded(Duration::from_secs(2), Duration::from_secs(180))
            }
            Vendor::Textract => PollPolicy::unbounded(Duration::from_secs(5)),
            Vendor::AzureRead => PollPolicy::unbounded(Duration::from_secs(1)),
        }
    }
}

impl fmt::Display for Vendor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Settings for Google Cloud Vision.
#[derive(Clone, Debug)]
pub struct GoogleConfig {
    /// Bucket that receives the input PDFs.
    pub input_bucket: String,
    /// Bucket that receives the annotation JSON.
    pub output_bucket: String,
}

/// Settings for AWS Textract. Credentials come from the standard AWS chain.
#[derive(Clone, Debug)]
pub struct TextractConfig {
    /// Bucket that receives the input PDFs.
    pub input_bucket: String,
}

/// Environment variable holding a default Azure subscription key.
const AZURE_KEY_VAR: &str = "AZURE_VISION_KEY";

/// Settings for Azure Read.
#[derive(Clone)]
pub struct AzureConfig {
    /// Service endpoint, like `https://<name>.cognitiveservices.azure.com/`.
    pub endpoint: Url,
    /// Subscription key.
    pub subscription_key: String,
}

impl fmt::Debug for AzureConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AzureConfig")
            .field("endpoint", &self.endpoint.as_str())
            .finish_non_exhaustive()
    }
}

/// Configuration for whichever vendor was chosen.
#[derive(Clone, Debug)]
pub enum VendorConfig {
    GoogleVision(GoogleConfig),
    Textract(TextractConfig),
    AzureRead(AzureConfig),
}

impl VendorConfig {
    /// Ask for the settings `vendor` needs.
    ///
    /// Each question may be pre-filled from an environment variable.
    pub async fn ask<R, W>(vendor: Vendor, q: &mut Questioner<R, W>) -> Result<Self>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        Self::ask_with_defaults(vendor, q, |var| env::var(var).ok()).await
    }

    /// Ask for the settings `vendor` needs, taking defaults from `lookup`.
    async fn ask_with_defaults<R, W>(
        vendor: Vendor,
        q: &mut Questioner<R, W>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let default_for = |var: &str| lookup(var).filter(|value| !value.trim().is_empty());
        Ok(match vendor {
            Vendor::GoogleVision => {
                let input_bucket = q
                    .ask(
                        "Enter your GCS bucket name for input files",
                        default_for("GCS_INPUT_BUCKET").as_deref(),
                    )
                    .await?;
                let output_bucket = q
                    .ask(
                        "Enter your GCS bucket name for output files",
                        default_for("GCS_OUTPUT_BUCKET").as_deref(),
                    )
                    .await?;
                VendorConfig::GoogleVision(GoogleConfig {
                    input_bucket,
                    output_bucket,
                })
            }
            Vendor::Textract => {
                let input_bucket = q
                    .ask(
                        "Enter your S3 bucket name for input files",
                        default_for("S3_INPUT_BUCKET").as_deref(),
                    )
                    .await?;
                VendorConfig::Textract(TextractConfig { input_bucket })
            }
            Vendor::AzureRead => {
                let endpoint = q
                    .ask(
                        "Enter your Azure endpoint URL",
                        default_for("AZURE_VISION_ENDPOINT").as_deref(),
                    )
                    .await?;
                let endpoint = Url::parse(&endpoint)
                    .with_context(|| format!("Invalid Azure endpoint URL: {endpoint:?}"))?;
                if endpoint.cannot_be_a_base() {
                    return Err(anyhow!("Invalid Azure endpoint URL: {endpoint}"));
                }
                let subscription_key = q
                    .ask_secret(
                        "Enter your Azure subscription key",
                        default_for(AZURE_KEY_VAR).as_deref(),
                        AZURE_KEY_VAR,
                    )
                    .await?;
                VendorConfig::AzureRead(AzureConfig {
                    endpoint,
                    subscription_key,
                })
            }
        })
    }

    /// Which vendor is this configuration for?
    pub fn vendor(&self) -> Vendor {
        match self {
            VendorConfig::GoogleVision(_) => Vendor::GoogleVision,
            VendorConfig::Textract(_) => Vendor::Textract,
            VendorConfig::AzureRead(_) => Vendor::AzureRead,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn menu_choices() {
        assert_eq!(Vendor::from_choice("1").unwrap(), Vendor::GoogleVision);
        assert_eq!(Vendor::from_choice(" 2\n").unwrap(), Vendor::Textract);
        assert_eq!(Vendor::from_choice("3").unwrap(), Vendor::AzureRead);
        for vendor in Vendor::ALL {
            let choice = vendor.choice().to_string();
            assert_eq!(Vendor::from_choice(&choice).unwrap(), vendor);
        }
    }

    #[test]
    fn invalid_choices() {
        for choice in ["4", "0", "", "google", "1 2"] {
            let err = Vendor::from_choice(choice).unwrap_err();
            assert!(err.to_string().starts_with("Invalid choice"));
        }
    }

    #[test]
    fn vendor_policies() {
        assert_eq!(Vendor::Textract.output_format(), OutputFormat::Json);
        assert_eq!(Vendor::AzureRead.output_format(), OutputFormat::Text);
        assert_eq!(Vendor::GoogleVision.output_format(), OutputFormat::Text);

        assert!(Vendor::GoogleVision.poll_policy().timeout.is_some());
        assert!(Vendor::Textract.poll_policy().timeout.is_none());
        assert!(Vendor::AzureRead.poll_policy().timeout.is_none());

        assert_eq!(Vendor::Textract.output_dir(), Path::new("./aws_ocr"));
    }

    #[tokio::test]
    async fn asks_for_google_buckets_in_order() {
        let mut q = Questioner::new(&b"in-bucket\nout-bucket\n"[..], Vec::new());
        let config = VendorConfig::ask(Vendor::GoogleVision, &mut q).await.unwrap();
        match config {
            VendorConfig::GoogleVision(google) => {
                assert_eq!(google.input_bucket, "in-bucket");
                assert_eq!(google.output_bucket, "out-bucket");
            }
            other => panic!("unexpected config {other:?}"),
        }
    }

    #[tokio::test]
    async fn azure_key_from_environment_stays_off_screen() {
        let mut q = Questioner::new(
            &b"https://example.cognitiveservices.azure.com/\n\n"[..],
            Vec::new(),
        );
        let config = VendorConfig::ask_with_defaults(Vendor::AzureRead, &mut q, |var| {
            (var == "AZURE_VISION_KEY").then(|| "s3cr3t-key".to_owned())
        })
        .await
        .unwrap();
        match config {
            VendorConfig::AzureRead(azure) => assert_eq!(azure.subscription_key, "s3cr3t-key"),
            other => panic!("unexpected config {other:?}"),
        }
        let out = String::from_utf8(q.into_output()).unwrap();
        assert!(!out.contains("s3cr3t-key"));
        assert!(out.contains("Enter your Azure subscription key [from AZURE_VISION_KEY]: "));
    }

    #[tokio::test]
    async fn plain_defaults_are_shown() {
        let mut q = Questioner::new(&b"\n"[..], Vec::new());
        let config = VendorConfig::ask_with_defaults(Vendor::Textract, &mut q, |var| {
            (var == "S3_INPUT_BUCKET").then(|| "env-bucket".to_owned())
        })
        .await
        .unwrap();
        match config {
            VendorConfig::Textract(textract) => assert_eq!(textract.input_bucket, "env-bucket"),
            other => panic!("unexpected config {other:?}"),
        }
        let out = String::from_utf8(q.into_output()).unwrap();
        assert_eq!(out, "Enter your S3 bucket name for input files [env-bucket]: ");
    }

    #[tokio::test]
    async fn rejects_bad_azure_endpoint() {
        let mut q = Questioner::new(&b"not a url\nkey\n"[..], Vec::new());
        assert!(VendorConfig::ask(Vendor::AzureRead, &mut q).await.is_err());
    }

    #[tokio::test]
    async fn asks_for_azure_settings() {
        let mut q = Questioner::new(
            &b"https://example.cognitiveservices.azure.com/\nsecret\n"[..],
            Vec::new(),
        );
        let config = VendorConfig::ask(Vendor::AzureRead, &mut q).await.unwrap();
        assert_eq!(config.vendor(), Vendor::AzureRead);
        assert!(!format!("{config:?}").contains("secret"));
    }
}
