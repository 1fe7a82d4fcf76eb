//! Run one vendor's pipeline over a directory of documents.

use crate::{
    prelude::*,
    ui::{ProgressConfig, Ui},
};

use super::{DocumentState, InputDocument, Pipeline};

/// The file name suffix of documents we OCR, compared case-insensitively.
const DOCUMENT_SUFFIX: &str = ".pdf";

/// What happened during a batch.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BatchSummary {
    /// Output files written.
    pub written: Vec<PathBuf>,

    /// Documents that failed at some stage, with the error report.
    pub skipped: Vec<(String, String)>,
}

impl BatchSummary {
    /// Report the totals.
    pub fn finish(&self, ui: &Ui) {
        if self.skipped.is_empty() {
            ui.display_message(
                "🏁",
                &format!("Finished: {} document(s) written.", self.written.len()),
            );
        } else {
            ui.display_message(
                "🏁",
                &format!(
                    "Finished: {} document(s) written, {} skipped.",
                    self.written.len(),
                    self.skipped.len(),
                ),
            );
        }
    }
}

/// List the documents in `dir` that we should OCR, sorted by file name.
pub async fn eligible_documents(dir: &Path) -> Result<Vec<InputDocument>> {
    let mut entries = tokio::fs::read_dir(dir)
        .await
        .with_context(|| format!("failed to read input directory {}", dir.display()))?;
    let mut documents = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .with_context(|| format!("failed to list {}", dir.display()))?
    {
        let path = entry.path();
        let is_document = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| name.to_ascii_lowercase().ends_with(DOCUMENT_SUFFIX));
        if !is_document {
            continue;
        }
        let file_type = entry
            .file_type()
            .await
            .with_context(|| format!("failed to inspect {}", path.display()))?;
        if !file_type.is_file() {
            trace!(path = %path.display(), "Skipping non-file");
            continue;
        }
        match InputDocument::from_path(path) {
            Ok(doc) => documents.push(doc),
            Err(err) => warn!("{err:#}"),
        }
    }
    documents.sort_by(|a, b| a.file_name.cmp(&b.file_name));
    Ok(documents)
}

/// Process every eligible document in `input_dir`, one at a time.
///
/// A failure on one document is reported and the batch moves on. Only a
/// problem listing `input_dir` itself is returned as an error.
#[instrument(level = "debug", skip_all, fields(input_dir = %input_dir.display()))]
pub async fn run_batch(
    ui: &Ui,
    pipeline: &Pipeline,
    input_dir: &Path,
) -> Result<BatchSummary> {
    let documents = eligible_documents(input_dir).await?;
    debug!(
        count = documents.len(),
        output_dir = %pipeline.output_dir().display(),
        "Found documents"
    );

    let vendor = pipeline.vendor();
    let pb = ui.new_progress_bar(
        &ProgressConfig {
            emoji: "📄",
            msg: "OCRing documents",
            done_msg: "OCRed documents",
        },
        documents.len() as u64,
    );

    let mut summary = BatchSummary::default();
    for doc in &documents {
        ui.display_message(
            "🔍",
            &format!("Processing {} with {vendor}...", doc.file_name),
        );
        match pipeline.process(doc).await {
            Ok(path) => {
                let msg = format!(
                    "OCR results for {} saved to {}",
                    doc.file_name,
                    path.display()
                );
                ui.display_message("✅", &msg);
                summary.written.push(path);
            }
            Err(err) => {
                debug!(file = %doc.file_name, state = %DocumentState::Skipped);
                let report = err.report();
                ui.display_message(
                    "❌",
                    &format!("Failed to process {}: {report}", doc.file_name),
                );
                summary.skipped.push((doc.file_name.clone(), report));
            }
        }
        pb.inc(1);
    }
    pb.finish_using_style();

    Ok(summary)
}
