// Report generation: the fixed section outline, per-section prompting and the
// end-to-end pipeline behind POST /generate.
// All LLM calls go through llm_client via the ChatModel trait.

pub mod generator;
pub mod handlers;
pub mod prompts;
pub mod sections;
