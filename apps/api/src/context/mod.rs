//! Context assembly: turns per-file extractions into the single text blob
//! sent with every section prompt, and fits it into the token budget.
//!
//! Strategies:
//! - `Trim` (default): keep the leading tokens that fit.
//! - `Summarize`: chunk an oversize context, summarize each chunk with the LLM,
//!   join the summaries. Falls back to `Trim` if any summarization call fails.

pub mod budget;
pub mod prompts;

use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use crate::context::prompts::{CHUNK_SUMMARY_PROMPT_TEMPLATE, SUMMARY_SYSTEM};
use crate::extraction::Extraction;
use crate::llm_client::ChatModel;

pub use budget::TokenBudget;

const SUMMARY_CHUNK_TOKENS: usize = 3000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextStrategy {
    Trim,
    Summarize,
}

/// Accumulates extractions in upload order.
#[derive(Debug, Default)]
pub struct ContextBuilder {
    text: String,
    has_content: bool,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends one file's contribution followed by a newline.
    pub fn push(&mut self, file_name: &str, extraction: Extraction) {
        self.has_content |= extraction.has_text();
        self.text.push_str(&extraction.into_context_text(file_name));
        self.text.push('\n');
    }

    /// True once any file produced non-blank text. Failure markers do not count.
    pub fn has_content(&self) -> bool {
        self.has_content
    }

    pub fn finish(self) -> String {
        self.text
    }
}

/// The context as it will be sent, plus how it was derived.
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedContext {
    pub text: String,
    pub original_tokens: usize,
    pub truncated: bool,
    pub summarized: bool,
}

/// Fits the raw context into the budget using the configured strategy.
///
/// Tokenizer work runs on the blocking pool.
pub async fn prepare_context(
    raw: String,
    budget: &TokenBudget,
    strategy: ContextStrategy,
    llm: &dyn ChatModel,
) -> Result<PreparedContext> {
    let raw: Arc<str> = raw.into();
    let original_tokens = budget
        .run_blocking({
            let raw = raw.clone();
            move |b| Ok(b.count(&raw))
        })
        .await?;

    if original_tokens <= budget.max_tokens() {
        return Ok(PreparedContext {
            text: raw.to_string(),
            original_tokens,
            truncated: false,
            summarized: false,
        });
    }

    if strategy == ContextStrategy::Summarize {
        match summarize_chunks(raw.clone(), budget, llm).await {
            Ok(summary) => {
                let (trimmed, summary_tokens) = budget
                    .run_blocking(move |b| {
                        let trimmed = b.trim(&summary)?;
                        let tokens = b.count(&trimmed.text);
                        Ok((trimmed, tokens))
                    })
                    .await?;
                info!(
                    "Context summarized: {} tokens -> {} tokens",
                    original_tokens, summary_tokens
                );
                return Ok(PreparedContext {
                    text: trimmed.text,
                    original_tokens,
                    truncated: trimmed.truncated,
                    summarized: true,
                });
            }
            Err(e) => warn!("Context summarization failed, falling back to trimming: {e:#}"),
        }
    }

    let trimmed = budget.run_blocking(move |b| b.trim(&raw)).await?;
    info!(
        "Context trimmed: {} tokens -> budget of {}",
        original_tokens,
        budget.max_tokens()
    );
    Ok(PreparedContext {
        text: trimmed.text,
        original_tokens,
        truncated: trimmed.truncated,
        summarized: false,
    })
}

async fn summarize_chunks(
    raw: Arc<str>,
    budget: &TokenBudget,
    llm: &dyn ChatModel,
) -> Result<String> {
    let size = SUMMARY_CHUNK_TOKENS.min(budget.max_tokens()).max(10);
    let chunks = budget
        .run_blocking(move |b| b.chunks(&raw, size, size / 10))
        .await?;
    let total = chunks.len();

    let mut summaries = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let prompt = CHUNK_SUMMARY_PROMPT_TEMPLATE
            .replace("{part}", &(i + 1).to_string())
            .replace("{total}", &total.to_string())
            .replace("{chunk}", chunk);
        let summary = llm.complete(Some(SUMMARY_SYSTEM), &prompt).await?;
        summaries.push(summary);
    }

    Ok(summaries.join("\n\n"))
}
