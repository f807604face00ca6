//! Optical Character Recognition for image uploads.
//!
//! Runs the Tesseract executable against a temporary copy of the upload and
//! reads the recognized text from stdout.

use std::io::Write;

use anyhow::{bail, Context, Result};
use tokio::process::Command;
use tracing::info;

#[derive(Debug, Clone)]
pub struct OcrEngine {
    command: String,
}

impl OcrEngine {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
        }
    }

    /// Recognizes text in an image. The file name only supplies the temp-file suffix.
    pub async fn image_to_text(&self, bytes: &[u8], file_name: &str) -> Result<String> {
        info!("Running OCR on {} ({} bytes)", file_name, bytes.len());

        let suffix = file_name
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{}", ext.to_ascii_lowercase()))
            .unwrap_or_else(|| ".png".to_string());

        let mut image = tempfile::Builder::new()
            .prefix("finreport-ocr-")
            .suffix(&suffix)
            .tempfile()
            .context("failed to create temporary image file")?;
        image
            .write_all(bytes)
            .context("failed to write temporary image file")?;
        image.flush()?;

        let output = Command::new(&self.command)
            .arg(image.path())
            .arg("stdout")
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("failed to run OCR command '{}'", self.command))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "OCR command exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }

        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}
