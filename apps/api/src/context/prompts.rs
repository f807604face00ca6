/// System prompt for chunk summarization calls.
pub const SUMMARY_SYSTEM: &str = "You are a senior financial analyst preparing a \
    client-facing financial optimization report. \
    Base every statement on the provided context. \
    When the context lacks the figures needed, say so plainly instead of inventing them. \
    Write in clear professional prose without markdown headings.";

/// Chunk summarization prompt. Replace `{part}`, `{total}` and `{chunk}` before sending.
pub const CHUNK_SUMMARY_PROMPT_TEMPLATE: &str = r#"The following is part {part} of {total} of the text extracted from a client's financial documents.

Summarize it for a financial analyst. Keep every figure, date, account name, ratio and
period label exactly as written. Preserve table rows that carry numbers. Drop boilerplate,
legal disclaimers and repeated headers. Do not add commentary or recommendations.

TEXT:
{chunk}"#;
