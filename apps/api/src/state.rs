use std::sync::Arc;

use crate::config::Config;
use crate::context::TokenBudget;
use crate::extraction::ocr::OcrEngine;
use crate::llm_client::ChatModel;
use crate::report::store::ReportStore;

/// Shared application state injected into all route handlers via Axum extractors.
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    /// Chat model behind the trait so tests can swap in a stub.
    pub llm: Arc<dyn ChatModel>,
    pub budget: TokenBudget,
    pub ocr: OcrEngine,
    pub reports: ReportStore,
}

#[cfg(test)]
impl AppState {
    pub fn for_tests(llm: Arc<dyn ChatModel>, reports_dir: &std::path::Path) -> Self {
        let config = Config::for_tests(reports_dir.to_path_buf());
        AppState {
            budget: TokenBudget::new(config.max_context_tokens).unwrap(),
            ocr: OcrEngine::new(config.tesseract_cmd.clone()),
            reports: ReportStore::new(&config.reports_dir).unwrap(),
            llm,
            config,
        }
    }
}
