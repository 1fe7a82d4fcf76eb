//! Writing assembled results to disk.

use std::io::Write as _;

use tempfile::NamedTempFile;

use crate::prelude::*;

use super::{OcrError, assemble::OutputFormat};

/// Where the output for `input` goes: `<dir>/<stem>_ocr.<ext>`.
pub fn output_path(dir: &Path, input: &Path, format: OutputFormat) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|stem| stem.to_string_lossy())
        .unwrap_or_default();
    dir.join(format!("{stem}_ocr.{}", format.extension()))
}

/// Write `content` to `path` in one piece.
///
/// The content goes to a temporary file next to `path`, which is then renamed
/// into place. Readers see either no file or the complete file.
pub fn write_output(path: &Path, content: &str) -> Result<(), OcrError> {
    let wrap = |source| OcrError::Write {
        path: path.to_owned(),
        source,
    };
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    let mut file = NamedTempFile::new_in(dir).map_err(wrap)?;
    file.write_all(content.as_bytes()).map_err(wrap)?;
    file.flush().map_err(wrap)?;
    file.persist(path).map_err(|err| wrap(err.error))?;
    debug!(path = %path.display(), bytes = content.len(), "Wrote output");
    Ok(())
}
