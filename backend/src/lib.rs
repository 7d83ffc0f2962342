//! PEG Insight — 3GPP Performance Event Group counter analysis pipeline.
//!
//! Design philosophy: keep it simple, let the type system be the DI
//! container. `AppState` holds `Arc`-wrapped services built once in `main`
//! and cloned into every handler.

pub mod config;
pub mod expr;
pub mod filters;
pub mod handlers;
pub mod llm;
pub mod middleware;
pub mod models;
pub mod repository;
pub mod response;
pub mod services;
pub mod time_range;
pub mod utils;
pub mod validation;

use std::sync::Arc;

use config::Settings;
use services::analysis_service::AnalysisService;

/// Shared application state handed to every axum handler.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub analysis_service: Arc<AnalysisService>,
}
