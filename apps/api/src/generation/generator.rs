//! Report generation: orchestrates the full pipeline for one request.
//!
//! Flow: extract each upload → build context → fit context to the token budget →
//!       one LLM call per section (fixed order) → assemble DOCX → save → URL.
//!
//! Section failures never fail the request: the error text becomes the section
//! body, so the document always carries every heading.

use chrono::Local;
use tracing::{info, warn};

use crate::context::{prepare_context, ContextBuilder};
use crate::errors::AppError;
use crate::extraction::{extract, UploadedFile};
use crate::generation::prompts::{
    RATE_LIMITED_SECTION_TEXT, SECTION_ERROR_PREFIX, SECTION_PROMPT_TEMPLATE,
};
use crate::generation::sections::{Section, SECTIONS};
use crate::llm_client::{ChatModel, LlmError};
use crate::report::document::{ReportDocument, REPORT_TITLE};
use crate::report::store::download_url;
use crate::state::AppState;

/// Message of the 400 returned when no upload yielded text.
pub const NO_CONTENT_MESSAGE: &str = "No valid file content found.";

// ────────────────────────────────────────────────────────────────────────────
// Data models
// ────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SectionOutcome {
    Generated,
    RateLimited,
    Failed,
}

/// One written section of the report.
#[derive(Debug, Clone)]
pub struct GeneratedSection {
    pub title: String,
    pub body: String,
    pub outcome: SectionOutcome,
}

/// Everything the pipeline produced for one request.
#[derive(Debug, Clone)]
pub struct ReportOutcome {
    pub filename: String,
    pub download_url: String,
    pub sections: Vec<GeneratedSection>,
}

// ────────────────────────────────────────────────────────────────────────────
// Pipeline
// ────────────────────────────────────────────────────────────────────────────

/// Runs the report pipeline over the uploaded files and saves the document.
///
/// Errors only when no file yielded text (`Validation`) or the report cannot
/// be written (`Storage` / `Internal`).
pub async fn generate_report(
    state: &AppState,
    files: Vec<UploadedFile>,
) -> Result<ReportOutcome, AppError> {
    // Step 1: Extract every upload, in slot order
    let mut builder = ContextBuilder::new();
    for file in &files {
        let extraction = extract(file, &state.ocr).await;
        info!(
            "Extracted {} from {}: has_text={}",
            file.file_name,
            file.slot,
            extraction.has_text()
        );
        builder.push(&file.file_name, extraction);
    }

    if !builder.has_content() {
        return Err(AppError::Validation(NO_CONTENT_MESSAGE.to_string()));
    }

    // Step 2: Fit the context into the token budget
    let raw_context = builder.finish();
    let context = prepare_context(
        raw_context,
        &state.budget,
        state.config.context_strategy,
        state.llm.as_ref(),
    )
    .await?;
    info!(
        "Context ready: {} tokens in, truncated={}, summarized={}",
        context.original_tokens, context.truncated, context.summarized
    );

    // Step 3: One LLM call per section, in fixed order
    let mut document = ReportDocument::new(REPORT_TITLE);
    let mut sections = Vec::with_capacity(SECTIONS.len());
    for section in &SECTIONS {
        let generated = generate_section(state.llm.as_ref(), section, &context.text).await;
        document.push_section(&generated.title, &generated.body);
        sections.push(generated);
    }

    // Step 4: Assemble and persist
    let bytes = document.to_docx_bytes()?;
    let filename = state.reports.save(&bytes, Local::now()).await?;

    let failed = sections
        .iter()
        .filter(|s| s.outcome != SectionOutcome::Generated)
        .count();
    info!(
        "Saved report {} ({} bytes, {} sections, {} without generated content)",
        filename,
        bytes.len(),
        sections.len(),
        failed
    );

    Ok(ReportOutcome {
        download_url: download_url(&filename),
        filename,
        sections,
    })
}

/// Writes one section. Never fails: errors become the section body.
///
/// The request is a single user message carrying instruction and context.
pub async fn generate_section(
    llm: &dyn ChatModel,
    section: &Section,
    context: &str,
) -> GeneratedSection {
    let prompt = build_section_prompt(section, context);

    let (body, outcome) = match llm.complete(None, &prompt).await {
        Ok(text) => (text.trim().to_string(), SectionOutcome::Generated),
        Err(LlmError::RateLimited { attempts }) => {
            warn!(
                "Section '{}' still rate limited after {} attempts",
                section.title, attempts
            );
            (
                RATE_LIMITED_SECTION_TEXT.to_string(),
                SectionOutcome::RateLimited,
            )
        }
        Err(e) => {
            warn!("Section '{}' failed: {e}", section.title);
            (
                format!("{SECTION_ERROR_PREFIX} {e}"),
                SectionOutcome::Failed,
            )
        }
    };

    info!("Section '{}' done: {:?}", section.title, outcome);

    GeneratedSection {
        title: section.title.to_string(),
        body,
        outcome,
    }
}

/// Builds the prompt for one section from its instruction and the context.
pub fn build_section_prompt(section: &Section, context: &str) -> String {
    SECTION_PROMPT_TEMPLATE
        .replace("{instruction}", section.instruction)
        .replace("{context}", context)
}

// ────────────────────────────────────────────────────────────────────────────
// Tests
// ────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;

    use super::*;
    use crate::extraction::ooxml::extract_docx;
    use crate::llm_client::testing::StubModel;

    fn upload(slot: &str, name: &str, bytes: &'static [u8]) -> UploadedFile {
        UploadedFile {
            slot: slot.to_string(),
            file_name: name.to_string(),
            bytes: Bytes::from_static(bytes),
        }
    }

    #[test]
    fn test_section_prompt_is_instruction_then_context() {
        let prompt = build_section_prompt(&SECTIONS[1], "Revenue: 10M");
        assert_eq!(
            prompt,
            format!("{}\n\nContext:\nRevenue: 10M", SECTIONS[1].instruction)
        );
    }

    #[test]
    fn test_section_prompt_does_not_expand_placeholders_in_context() {
        // Placeholders inside uploaded text are left as-is.
        let prompt = build_section_prompt(&SECTIONS[0], "literal {instruction}");
        assert!(prompt.ends_with("Context:\nliteral {instruction}"));
    }

    #[tokio::test]
    async fn test_generate_section_success_is_trimmed() {
        let llm = StubModel::replying("\n Revenue is concentrated in two clients. \n");
        let section = generate_section(&llm, &SECTIONS[1], "ctx").await;
        assert_eq!(section.title, "1. Revenue Analysis");
        assert_eq!(section.body, "Revenue is concentrated in two clients.");
        assert_eq!(section.outcome, SectionOutcome::Generated);
    }

    #[tokio::test]
    async fn test_section_calls_send_no_system_prompt() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(StubModel::replying("ok"));
        let state = AppState::for_tests(llm.clone(), dir.path());

        generate_report(&state, vec![upload("file1", "pnl.txt", b"Gross margin 41%")])
            .await
            .unwrap();

        assert_eq!(llm.calls(), SECTIONS.len());
        assert_eq!(llm.system_calls(), 0);
    }

    #[tokio::test]
    async fn test_generate_section_rate_limited_uses_static_text() {
        let llm = StubModel::new(|_, _| Err(LlmError::RateLimited { attempts: 3 }));
        let section = generate_section(&llm, &SECTIONS[0], "ctx").await;
        assert_eq!(section.body, RATE_LIMITED_SECTION_TEXT);
        assert_eq!(section.outcome, SectionOutcome::RateLimited);
    }

    #[tokio::test]
    async fn test_generate_section_error_is_embedded() {
        let llm = StubModel::new(|_, _| {
            Err(LlmError::Api {
                status: 401,
                message: "Incorrect API key provided".to_string(),
            })
        });
        let section = generate_section(&llm, &SECTIONS[6], "ctx").await;
        assert_eq!(
            section.body,
            "Error generating this section: API error (status 401): Incorrect API key provided"
        );
        assert_eq!(section.outcome, SectionOutcome::Failed);
    }

    #[tokio::test]
    async fn test_report_has_every_heading_in_order_even_when_calls_fail() {
        let dir = tempfile::tempdir().unwrap();
        // Every other section fails.
        let llm = StubModel::new(|n, prompt| {
            assert!(prompt.contains("Cash at bank 120000"));
            if n % 2 == 0 {
                Ok(format!("Analysis number {n}."))
            } else {
                Err(LlmError::EmptyContent)
            }
        });
        let state = AppState::for_tests(Arc::new(llm), dir.path());

        let outcome = generate_report(
            &state,
            vec![upload("file1", "balances.txt", b"Cash at bank 120000")],
        )
        .await
        .unwrap();

        let titles: Vec<_> = outcome.sections.iter().map(|s| s.title.as_str()).collect();
        let expected: Vec<_> = SECTIONS.iter().map(|s| s.title).collect();
        assert_eq!(titles, expected);

        let saved = std::fs::read(dir.path().join(&outcome.filename)).unwrap();
        let text = extract_docx(&saved).unwrap();
        let mut cursor = 0;
        for title in std::iter::once(REPORT_TITLE).chain(expected.iter().copied()) {
            let pos = text[cursor..]
                .find(title)
                .unwrap_or_else(|| panic!("heading '{title}' missing or out of order"));
            cursor += pos + title.len();
        }
        assert!(text.contains("Analysis number 0."));
        assert!(text.contains("Error generating this section: LLM returned empty content"));
    }

    #[tokio::test]
    async fn test_download_url_points_at_saved_file() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(Arc::new(StubModel::replying("ok")), dir.path());

        let outcome = generate_report(&state, vec![upload("file2", "notes.md", b"# Q3\nEBITDA 3.4M")])
            .await
            .unwrap();

        assert_eq!(
            outcome.download_url,
            format!("/static/reports/{}", outcome.filename)
        );
        assert!(outcome.filename.starts_with("financial_report_"));
        assert!(dir.path().join(&outcome.filename).is_file());
    }

    #[tokio::test]
    async fn test_no_content_is_a_validation_error_and_skips_llm() {
        let dir = tempfile::tempdir().unwrap();
        let llm = Arc::new(StubModel::replying("unused"));
        let state = AppState::for_tests(llm.clone(), dir.path());

        let files = vec![
            upload("file1", "blank.txt", b"  \n "),
            upload("file2", "archive.zip", b"PK"),
        ];
        let err = generate_report(&state, files).await.unwrap_err();

        assert!(matches!(err, AppError::Validation(ref m) if m == NO_CONTENT_MESSAGE));
        assert_eq!(llm.calls(), 0);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_no_files_is_a_validation_error() {
        let dir = tempfile::tempdir().unwrap();
        let state = AppState::for_tests(Arc::new(StubModel::replying("unused")), dir.path());
        let err = generate_report(&state, Vec::new()).await.unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }
}
