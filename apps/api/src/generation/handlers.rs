//! Axum route handlers for the Generation API.

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        Multipart, State,
    },
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::errors::AppError;
use crate::extraction::UploadedFile;
use crate::generation::generator::{generate_report, NO_CONTENT_MESSAGE};
use crate::state::AppState;

/// Multipart fields read as uploads, in the order their text enters the context.
pub const UPLOAD_SLOTS: [&str; 3] = ["file1", "file2", "file3"];

#[derive(Debug, Serialize)]
pub struct GenerateResponse {
    pub download_url: String,
}

/// POST /generate
///
/// Accepts up to three files and answers with the URL of the generated report.
pub async fn handle_generate(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<Json<GenerateResponse>, AppError> {
    let span = info_span!("generate_report", request_id = %Uuid::new_v4());

    async move {
        let files = match multipart {
            Ok(multipart) => read_uploads(multipart).await?,
            Err(rejection) => {
                warn!("Request is not a readable multipart form: {rejection}");
                return Err(AppError::Validation(NO_CONTENT_MESSAGE.to_string()));
            }
        };

        info!(
            "Received {} file(s): {:?}",
            files.len(),
            files.iter().map(|f| f.file_name.as_str()).collect::<Vec<_>>()
        );

        let outcome = generate_report(&state, files).await?;
        info!(
            "Report {} ready with {} sections",
            outcome.filename,
            outcome.sections.len()
        );

        Ok(Json(GenerateResponse {
            download_url: outcome.download_url,
        }))
    }
    .instrument(span)
    .await
}

/// Collects the upload slots. Unknown fields, repeated slots and empty
/// selections are skipped; the result is ordered by slot.
async fn read_uploads(mut multipart: Multipart) -> Result<Vec<UploadedFile>, AppError> {
    let mut files: Vec<UploadedFile> = Vec::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_error("Failed to read multipart field", e))?
    {
        let Some(slot) = field.name().filter(|n| UPLOAD_SLOTS.contains(n)) else {
            continue;
        };
        let slot = slot.to_string();
        if files.iter().any(|f| f.slot == slot) {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        let bytes = field
            .bytes()
            .await
            .map_err(|e| multipart_error("Failed to read file data", e))?;

        if file_name.is_empty() || bytes.is_empty() {
            continue;
        }

        files.push(UploadedFile {
            slot,
            file_name,
            bytes,
        });
    }

    files.sort_by_key(|f| UPLOAD_SLOTS.iter().position(|s| *s == f.slot));
    Ok(files)
}

/// Keeps the body-limit rejection distinct from malformed uploads.
fn multipart_error(action: &str, err: MultipartError) -> AppError {
    let message = format!("{action}: {}", err.body_text());
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        AppError::PayloadTooLarge(message)
    } else {
        AppError::Upload(message)
    }
}
