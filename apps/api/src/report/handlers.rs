use axum::{
    extract::{Path, State},
    http::header,
    response::IntoResponse,
};
use tracing::info;

use crate::errors::AppError;
use crate::state::AppState;

pub const DOCX_CONTENT_TYPE: &str =
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document";

/// GET /static/reports/:filename
///
/// Streams a saved report back as an attachment.
pub async fn handle_download(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let bytes = state.reports.open(&filename).await?;
    info!("Serving report {} ({} bytes)", filename, bytes.len());

    // Only safe filenames reach this point, so no quoting is needed.
    let disposition = format!("attachment; filename=\"{filename}\"");
    Ok((
        [
            (header::CONTENT_TYPE, DOCX_CONTENT_TYPE.to_string()),
            (header::CONTENT_DISPOSITION, disposition),
        ],
        bytes,
    ))
}
