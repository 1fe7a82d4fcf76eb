//! Google Cloud credentials.
//!
//! We take a ready-made OAuth access token from the environment, or ask the
//! `gcloud` CLI for one. Either way, it is looked up once and handed to the
//! engine explicitly.

use std::{env, process::Output};

use tokio::process::Command;

use crate::prelude::*;

/// Environment variable holding a pre-issued access token.
pub const ACCESS_TOKEN_VAR: &str = "GOOGLE_OAUTH_ACCESS_TOKEN";

/// Find an OAuth access token for Google Cloud APIs.
#[instrument(level = "debug")]
pub async fn load_access_token() -> Result<String> {
    if let Ok(token) = env::var(ACCESS_TOKEN_VAR)
        && !token.trim().is_empty()
    {
        debug!("Using access token from {}", ACCESS_TOKEN_VAR);
        return Ok(token.trim().to_owned());
    }

    let output = Command::new("gcloud")
        .args(["auth", "print-access-token"])
        .output()
        .await
        .with_context(|| {
            format!(
                "cannot run gcloud (install the Google Cloud SDK or set {ACCESS_TOKEN_VAR})"
            )
        })?;
    check_for_command_failure("gcloud", &output)?;
    let token = String::from_utf8(output.stdout)
        .context("gcloud printed a non-UTF-8 access token")?
        .trim()
        .to_owned();
    if token.is_empty() {
        return Err(anyhow!("gcloud printed an empty access token"));
    }
    Ok(token)
}

/// Report a command failure, including its error output.
///
/// Standard output is never logged, since it may hold credentials.
fn check_for_command_failure(command_name: &str, output: &Output) -> Result<()> {
    let stderr = String::from_utf8_lossy(&output.stderr);
    debug!(command_name, output = %stderr, "Standard error from command");

    if output.status.success() {
        Ok(())
    } else if let Some(exit_code) = output.status.code() {
        Err(anyhow!(
            "{} failed with exit code {} and error output:\n{}",
            command_name,
            exit_code,
            stderr,
        ))
    } else {
        Err(anyhow!(
            "{} failed with error output:\n{}",
            command_name,
            stderr,
        ))
    }
}
