use std::sync::Arc;

use anyhow::{anyhow, Result};
use tiktoken_rs::{cl100k_base, CoreBPE};

/// Appended when the context had to be cut to fit the budget.
pub const TRUNCATION_NOTICE: &str = "[Context truncated to fit the model's input limit]";

/// How many tokens a window edge may move to land on a UTF-8 boundary.
const MAX_EDGE_BACKOFF: usize = 3;

/// Token budget for the context sent with each prompt, measured with `cl100k_base`.
///
/// Building the tokenizer is expensive, so one instance is built at startup and shared.
#[derive(Clone)]
pub struct TokenBudget {
    bpe: Arc<CoreBPE>,
    max_tokens: usize,
}

/// Result of fitting text into the budget.
#[derive(Debug, Clone, PartialEq)]
pub struct Trimmed {
    pub text: String,
    pub truncated: bool,
}

impl TokenBudget {
    pub fn new(max_tokens: usize) -> Result<Self> {
        let bpe =
            cl100k_base().map_err(|e| anyhow!("failed to load cl100k_base tokenizer: {e}"))?;
        Ok(Self {
            bpe: Arc::new(bpe),
            max_tokens,
        })
    }

    pub fn max_tokens(&self) -> usize {
        self.max_tokens
    }

    pub fn count(&self, text: &str) -> usize {
        self.bpe.encode_with_special_tokens(text).len()
    }

    /// Runs `f` on tokio's blocking pool. BPE encoding is CPU-bound and must
    /// stay off the async workers.
    pub async fn run_blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&TokenBudget) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let budget = self.clone();
        tokio::task::spawn_blocking(move || f(&budget))
            .await
            .map_err(|e| anyhow!("tokenizer task failed: {e}"))?
    }

    /// Keeps the leading tokens that fit, followed by `TRUNCATION_NOTICE`.
    pub fn trim(&self, text: &str) -> Result<Trimmed> {
        let tokens = self.bpe.encode_with_special_tokens(text);

        if tokens.len() <= self.max_tokens {
            return Ok(Trimmed {
                text: text.to_string(),
                truncated: false,
            });
        }

        // Newline plus one token of slack for re-tokenization at the seam.
        let notice_tokens = self.count(TRUNCATION_NOTICE) + 2;
        let keep = self.max_tokens.saturating_sub(notice_tokens);
        let head = decode_window(0, keep, |s, e| {
            self.bpe
                .decode(tokens[s..e].to_vec())
                .map_err(|err| anyhow!("{err}"))
        })?;

        Ok(Trimmed {
            text: format!("{}\n{TRUNCATION_NOTICE}", head.trim_end()),
            truncated: true,
        })
    }

    /// Splits text into windows of `size` tokens overlapping by `overlap` tokens.
    pub fn chunks(&self, text: &str, size: usize, overlap: usize) -> Result<Vec<String>> {
        if size == 0 || overlap >= size {
            return Err(anyhow!(
                "invalid chunking window: size={size}, overlap={overlap}"
            ));
        }

        let tokens = self.bpe.encode_with_special_tokens(text);
        let mut chunks = Vec::new();
        let mut start = 0;

        while start < tokens.len() {
            let end = std::cmp::min(start + size, tokens.len());
            let chunk = decode_window(start, end, |s, e| {
                self.bpe
                    .decode(tokens[s..e].to_vec())
                    .map_err(|err| anyhow!("{err}"))
            })?;
            chunks.push(chunk);

            if end == tokens.len() {
                break;
            }

            start += size - overlap;
        }

        Ok(chunks)
    }
}

/// Decodes tokens `start..end`, nudging either edge inward when a cut splits a
/// multi-byte character.
fn decode_window<F>(start: usize, end: usize, decode: F) -> Result<String>
where
    F: Fn(usize, usize) -> Result<String>,
{
    let mut first_error = None;

    for s in start..=(start + MAX_EDGE_BACKOFF).min(end) {
        let lowest_end = s.max(end.saturating_sub(MAX_EDGE_BACKOFF));
        for e in (lowest_end..=end).rev() {
            match decode(s, e) {
                Ok(text) => return Ok(text),
                Err(err) => {
                    first_error.get_or_insert(err);
                }
            }
        }
    }

    Err(first_error.unwrap_or_else(|| anyhow!("empty token window {start}..{end}")))
}
