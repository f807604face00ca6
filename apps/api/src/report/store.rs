use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};
use tokio::fs::OpenOptions;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, warn};

use crate::errors::AppError;

/// URL prefix the download route is mounted under.
pub const DOWNLOAD_PREFIX: &str = "/static/reports";

const FILE_STEM: &str = "financial_report_";
const FILE_EXT: &str = "docx";

/// Reports directory on local disk. Files are never overwritten.
#[derive(Debug, Clone)]
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    /// Creates the directory (and parents) if it does not exist yet.
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Writes a new report named after `now`, returning the bare filename.
    ///
    /// A name already on disk gets a `_2`, `_3`, ... suffix instead of being replaced.
    pub async fn save<Tz>(&self, bytes: &[u8], now: DateTime<Tz>) -> Result<String, AppError>
    where
        Tz: TimeZone,
        Tz::Offset: std::fmt::Display,
    {
        let stamp = now.format("%Y%m%d%H%M%S").to_string();

        for n in 1u32.. {
            let filename = if n == 1 {
                format!("{FILE_STEM}{stamp}.{FILE_EXT}")
            } else {
                format!("{FILE_STEM}{stamp}_{n}.{FILE_EXT}")
            };

            let path = self.dir.join(&filename);
            let file = match OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    debug!("Report name {filename} taken, trying next suffix");
                    continue;
                }
                Err(e) => return Err(AppError::Storage(e)),
            };

            write_or_discard(file, &path, bytes).await?;
            return Ok(filename);
        }

        Err(AppError::Storage(std::io::Error::new(
            ErrorKind::AlreadyExists,
            "no free report filename left for this timestamp",
        )))
    }

    /// Reads a saved report. Unknown or unsafe names are `NotFound`.
    pub async fn open(&self, filename: &str) -> Result<Vec<u8>, AppError> {
        if !is_safe_filename(filename) {
            return Err(not_found(filename));
        }

        match tokio::fs::read(self.dir.join(filename)).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(not_found(filename)),
            Err(e) => Err(AppError::Storage(e)),
        }
    }
}

/// Writes the whole report or removes the partial file, so a reserved name
/// never holds a truncated document.
async fn write_or_discard<W>(mut writer: W, path: &Path, bytes: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let written = async {
        writer.write_all(bytes).await?;
        writer.flush().await
    }
    .await;

    if let Err(e) = written {
        drop(writer);
        if let Err(remove_err) = tokio::fs::remove_file(path).await {
            warn!("Could not remove partial report {}: {remove_err}", path.display());
        }
        return Err(e);
    }
    Ok(())
}

/// Relative URL a client uses to fetch a saved report.
pub fn download_url(filename: &str) -> String {
    format!("{DOWNLOAD_PREFIX}/{filename}")
}

/// A bare filename: ASCII alphanumerics, `_`, `-` and `.`, not starting with `.`.
pub fn is_safe_filename(name: &str) -> bool {
    !name.is_empty()
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn not_found(filename: &str) -> AppError {
    AppError::NotFound(format!("Report '{filename}' not found"))
}
