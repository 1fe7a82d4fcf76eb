//! The interactive OCR command.

use tokio::io::{BufReader, stdin, stdout};

use crate::{
    config::{Vendor, VendorConfig},
    engines::engine_for_config,
    pipeline::{Pipeline, batch::run_batch},
    prelude::*,
    ui::{Questioner, Ui},
};

/// Directory we read input documents from.
const INPUT_DIR: &str = "./documents";

/// Ask which vendor to use and how to reach it, then OCR every document in
/// [`INPUT_DIR`].
#[instrument(level = "debug", skip_all)]
pub async fn cmd_ocr(ui: Ui) -> Result<()> {
    let mut q = Questioner::new(BufReader::new(stdin()), stdout());

    // Choose a vendor. A bad choice stops us before we touch anything.
    q.say("Select the OCR service to use:").await?;
    for vendor in Vendor::ALL {
        q.say(&format!("{}. {}", vendor.choice(), vendor.display_name()))
            .await?;
    }
    let choice = q.ask("Enter the number of your choice", None).await?;
    let vendor = Vendor::from_choice(&choice)?;
    debug!(%vendor, "selected vendor");

    let output_dir = vendor.output_dir();
    tokio::fs::create_dir_all(output_dir)
        .await
        .with_context(|| format!("failed to create {}", output_dir.display()))?;

    let config = VendorConfig::ask(vendor, &mut q).await?;
    let engine = engine_for_config(config).await?;
    let pipeline = Pipeline::new(engine, output_dir);

    let summary = run_batch(&ui, &pipeline, Path::new(INPUT_DIR)).await?;
    summary.finish(&ui);
    Ok(())
}
