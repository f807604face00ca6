use anyhow::{anyhow, Result};

/// Extracts the text layer of a PDF held in memory.
///
/// Scanned PDFs without a text layer come back empty; they are not OCR'd.
pub fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let text = pdf_extract::extract_text_from_mem(bytes)
        .map_err(|e| anyhow!("failed to read PDF: {e}"))?;
    Ok(normalize_pdf_text(&text))
}

/// Collapses the runs of blank lines pdf-extract emits between pages.
fn normalize_pdf_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut blank_run = 0;

    for line in text.lines() {
        let line = line.trim_end();
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run > 1 {
                continue;
            }
        } else {
            blank_run = 0;
        }
        out.push_str(line);
        out.push('\n');
    }

    out.trim().to_string()
}
