//! PDF corpus loader.
//!
//! Scans a flat directory of uploaded PDFs and extracts per-page text, tagging
//! each page with its originating file name. Per-file failures (unreadable,
//! corrupt, password-protected) are skipped and reported on a side channel;
//! only a directory-level enumeration failure propagates as an error.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::Path;

use crate::models::{DocumentInfo, LoadedPage};

/// Result of a corpus scan: the pages that loaded plus the file names that
/// had to be skipped.
#[derive(Debug, Default)]
pub struct LoadOutcome {
    pub pages: Vec<LoadedPage>,
    pub skipped: Vec<String>,
}

fn is_pdf_name(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

/// Collect the PDF file names in `dir`, sorted for deterministic ordering.
/// An absent directory yields an empty list, distinguishing "no corpus yet"
/// from a load failure.
fn pdf_entries(dir: &Path) -> Result<Vec<String>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut names = Vec::new();
    let entries = std::fs::read_dir(dir)
        .with_context(|| format!("Failed to enumerate corpus directory: {}", dir.display()))?;
    for entry in entries {
        let entry =
            entry.with_context(|| format!("Failed to read entry in {}", dir.display()))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if is_pdf_name(&name) {
            names.push(name);
        }
    }

    names.sort();
    Ok(names)
}

/// True if `dir` exists and contains at least one PDF. An absent directory
/// reads as an empty corpus; an enumeration failure (unreadable path,
/// non-directory) is an error, not emptiness.
pub fn has_documents(dir: &Path) -> Result<bool> {
    Ok(!pdf_entries(dir)?.is_empty())
}

/// Load every readable PDF in `dir` into per-page [`LoadedPage`]s.
///
/// Each extracted page carries `source = <file name>` and a 1-based page
/// number. Pages whose extracted text is blank are dropped. A single corrupt
/// document never aborts ingestion of the rest.
pub fn load_corpus(dir: &Path) -> Result<LoadOutcome> {
    let mut outcome = LoadOutcome::default();

    for name in pdf_entries(dir)? {
        let path = dir.join(&name);

        match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => {}
            Ok(_) => {
                tracing::warn!(file = %name, "skipping non-regular corpus entry");
                outcome.skipped.push(name);
                continue;
            }
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "skipping unreadable corpus entry");
                outcome.skipped.push(name);
                continue;
            }
        }

        let bytes = match std::fs::read(&path) {
            Ok(b) => b,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "skipping unreadable PDF");
                outcome.skipped.push(name);
                continue;
            }
        };

        let pages = match pdf_extract::extract_text_from_mem_by_pages(&bytes) {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(file = %name, error = %e, "skipping PDF that failed extraction");
                outcome.skipped.push(name);
                continue;
            }
        };

        for (i, text) in pages.into_iter().enumerate() {
            if text.trim().is_empty() {
                continue;
            }
            outcome.pages.push(LoadedPage {
                source: name.clone(),
                page: i + 1,
                text,
            });
        }
    }

    Ok(outcome)
}

/// List the corpus for display: name, size, and modification time per PDF.
/// Follows the same absent-directory and per-file tolerance rules as
/// [`load_corpus`].
pub fn list_documents(dir: &Path) -> Result<Vec<DocumentInfo>> {
    let mut docs = Vec::new();

    for name in pdf_entries(dir)? {
        let path = dir.join(&name);
        let metadata = match std::fs::metadata(&path) {
            Ok(m) if m.is_file() => m,
            Ok(_) | Err(_) => continue,
        };

        let modified = metadata
            .modified()
            .unwrap_or(std::time::SystemTime::UNIX_EPOCH);
        let modified: DateTime<Utc> = modified.into();

        docs.push(DocumentInfo {
            name,
            size: metadata.len(),
            modified,
        });
    }

    Ok(docs)
}
