//! Fixed-size overlapping text chunker.
//!
//! Splits each loaded page into fragments of at most `chunk_size` characters
//! with `chunk_overlap` characters shared between adjacent fragments, so that
//! sentence-critical content near a boundary survives in at least one
//! fragment. Window cuts snap back to the nearest whitespace inside the
//! window when one exists, bounding mid-word splits. Splitting is
//! deterministic and every fragment inherits its page's provenance unchanged.

use crate::models::{Fragment, LoadedPage};

/// Split all pages into fragments. Empty input yields empty output.
pub fn chunk_pages(
    pages: Vec<LoadedPage>,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Fragment> {
    let mut fragments = Vec::new();

    for page in pages {
        for (_, text) in split_with_offsets(&page.text, chunk_size, chunk_overlap) {
            fragments.push(Fragment {
                text,
                source: page.source.clone(),
                page: page.page,
            });
        }
    }

    fragments
}

/// Split `text` into overlapping windows, returning each window's starting
/// char offset alongside its text. Offsets make the reassembly invariant
/// checkable: dropping each window's leading overlap and concatenating
/// recovers the original text.
pub fn split_with_offsets(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<(usize, String)> {
    debug_assert!(chunk_overlap < chunk_size, "overlap must be < chunk size");

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Vec::new();
    }

    let mut out = Vec::new();
    let mut start = 0usize;

    loop {
        let window_end = (start + chunk_size).min(chars.len());

        // Snap the cut back to just after the last whitespace in the window,
        // unless the window already reaches the end of the text.
        let mut cut = window_end;
        if window_end < chars.len() {
            if let Some(ws) = (start + 1..window_end).rev().find(|&i| chars[i].is_whitespace()) {
                cut = ws + 1;
            }
        }

        out.push((start, chars[start..cut].iter().collect()));

        if cut >= chars.len() {
            break;
        }
        // Next window re-covers `chunk_overlap` chars; always make progress.
        start = cut.saturating_sub(chunk_overlap).max(start + 1);
    }

    out
}
