// All LLM prompt constants for report generation.
// Section calls send the filled template as the only message.

/// Section prompt template. Replace `{instruction}` and `{context}` before sending.
pub const SECTION_PROMPT_TEMPLATE: &str = "{instruction}\n\nContext:\n{context}";

/// Body used when the provider keeps rate limiting a section.
pub const RATE_LIMITED_SECTION_TEXT: &str =
    "Rate limit exceeded while generating this section. Please try again later.";

/// Prefix of the body used when a section call fails for any other reason.
pub const SECTION_ERROR_PREFIX: &str = "Error generating this section:";
