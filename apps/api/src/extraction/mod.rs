//! Best-effort text extraction for uploaded business documents.
//!
//! `extract` never returns an error: a parser failure (or panic) becomes
//! `Extraction::Failed`, an unknown extension becomes `Extraction::Unsupported`.
//! Parsers that do CPU-bound work run on the blocking pool.

pub mod ocr;
pub mod ooxml;
pub mod pdf;
pub mod spreadsheet;

use anyhow::Result;
use bytes::Bytes;
use tracing::{debug, warn};

use crate::extraction::ocr::OcrEngine;

/// Format of an upload, decided by its file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Pdf,
    Docx,
    Pptx,
    Image,
    Xlsx,
    Csv,
    PlainText,
    Unsupported,
}

impl DocumentKind {
    pub fn from_file_name(file_name: &str) -> Self {
        let ext = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "pdf" => DocumentKind::Pdf,
            "docx" => DocumentKind::Docx,
            "pptx" => DocumentKind::Pptx,
            "png" | "jpg" | "jpeg" => DocumentKind::Image,
            "xlsx" => DocumentKind::Xlsx,
            "csv" => DocumentKind::Csv,
            "txt" | "md" => DocumentKind::PlainText,
            _ => DocumentKind::Unsupported,
        }
    }
}

/// A file received in one of the upload slots. Lives only for the request.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub slot: String,
    pub file_name: String,
    pub bytes: Bytes,
}

impl UploadedFile {
    pub fn kind(&self) -> DocumentKind {
        DocumentKind::from_file_name(&self.file_name)
    }
}

/// Outcome of extracting one upload.
#[derive(Debug, Clone, PartialEq)]
pub enum Extraction {
    Text(String),
    Unsupported,
    Failed { reason: String },
}

impl Extraction {
    /// True when the extraction produced non-whitespace text.
    pub fn has_text(&self) -> bool {
        matches!(self, Extraction::Text(text) if !text.trim().is_empty())
    }

    /// The string this extraction contributes to the context.
    pub fn into_context_text(self, file_name: &str) -> String {
        match self {
            Extraction::Text(text) => text,
            Extraction::Unsupported => String::new(),
            Extraction::Failed { reason } => {
                format!("[Could not extract text from {file_name}: {reason}]")
            }
        }
    }
}

/// Extracts text from one upload. Never fails.
pub async fn extract(file: &UploadedFile, ocr: &OcrEngine) -> Extraction {
    let kind = file.kind();
    debug!(
        "Extracting {} ({:?}, {} bytes)",
        file.file_name,
        kind,
        file.bytes.len()
    );

    let result = match kind {
        DocumentKind::Unsupported => return Extraction::Unsupported,
        DocumentKind::Image => ocr.image_to_text(&file.bytes, &file.file_name).await,
        DocumentKind::Csv | DocumentKind::PlainText => Ok(decode_text(&file.bytes)),
        _ => run_blocking(kind, file.bytes.clone()).await,
    };

    match result {
        Ok(text) => Extraction::Text(text),
        Err(e) => {
            warn!("Extraction failed for {}: {e:#}", file.file_name);
            Extraction::Failed {
                reason: format!("{e:#}"),
            }
        }
    }
}

async fn run_blocking(kind: DocumentKind, bytes: Bytes) -> Result<String> {
    tokio::task::spawn_blocking(move || match kind {
        DocumentKind::Pdf => pdf::extract_pdf(&bytes),
        DocumentKind::Docx => ooxml::extract_docx(&bytes),
        DocumentKind::Pptx => ooxml::extract_pptx(&bytes),
        DocumentKind::Xlsx => spreadsheet::extract_xlsx(&bytes),
        other => anyhow::bail!("{other:?} has no blocking extractor"),
    })
    .await
    .map_err(|e| anyhow::anyhow!("extractor aborted: {e}"))?
}

/// UTF-8 decoding that tolerates invalid sequences and strips a leading BOM.
pub fn decode_text(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    text.strip_prefix('\u{feff}').unwrap_or(&text).to_string()
}
