//! Shared fixtures for the integration tests.

use std::fs;
use std::path::Path;

/// Minimal valid multi-page PDF with one text line per page. Builds the body
/// then the xref with correct byte offsets so pdf-extract can parse it.
fn build_pdf(pages: &[&str]) -> Vec<u8> {
    let n = pages.len();
    let total_objs = 3 + 2 * n;
    let mut out = Vec::new();
    let mut offsets = vec![0usize; total_objs + 1];

    out.extend_from_slice(b"%PDF-1.4\n");

    offsets[1] = out.len();
    out.extend_from_slice(b"1 0 obj << /Type /Catalog /Pages 2 0 R >> endobj\n");

    offsets[2] = out.len();
    let kids = (0..n)
        .map(|i| format!("{} 0 R", 4 + 2 * i))
        .collect::<Vec<_>>()
        .join(" ");
    out.extend_from_slice(
        format!(
            "2 0 obj << /Type /Pages /Kids [{}] /Count {} >> endobj\n",
            kids, n
        )
        .as_bytes(),
    );

    offsets[3] = out.len();
    out.extend_from_slice(
        b"3 0 obj << /Type /Font /Subtype /Type1 /BaseFont /Helvetica >> endobj\n",
    );

    for (i, text) in pages.iter().enumerate() {
        let page_obj = 4 + 2 * i;
        let content_obj = 5 + 2 * i;

        offsets[page_obj] = out.len();
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Type /Page /Parent 2 0 R /MediaBox [0 0 612 792] \
                 /Contents {} 0 R /Resources << /Font << /F1 3 0 R >> >> >> endobj\n",
                page_obj, content_obj
            )
            .as_bytes(),
        );

        let stream = format!("BT /F1 12 Tf 72 720 Td ({}) Tj ET\n", text);
        offsets[content_obj] = out.len();
        out.extend_from_slice(
            format!(
                "{} 0 obj << /Length {} >> stream\n{}endstream endobj\n",
                content_obj,
                stream.len(),
                stream
            )
            .as_bytes(),
        );
    }

    let xref_start = out.len();
    out.extend_from_slice(format!("xref\n0 {}\n", total_objs + 1).as_bytes());
    out.extend_from_slice(format!("{:010} 65535 f \n", 0).as_bytes());
    for obj in 1..=total_objs {
        out.extend_from_slice(format!("{:010} 00000 n \n", offsets[obj]).as_bytes());
    }
    out.extend_from_slice(
        format!(
            "trailer << /Size {} /Root 1 0 R >>\nstartxref\n{}\n%%EOF\n",
            total_objs + 1,
            xref_start
        )
        .as_bytes(),
    );

    out
}

pub fn write_pdf(dir: &Path, name: &str, pages: &[&str]) {
    fs::write(dir.join(name), build_pdf(pages)).unwrap();
}
