//! HTTP entry point for the analysis pipeline (C11, spec §4.11).

use axum::extract::State;
use axum::Json;

use crate::models::request::RawAnalysisRequest;
use crate::models::response::AnalysisResponse;
use crate::AppState;

/// Runs the full pipeline and always answers `200 OK`: the orchestrator
/// never propagates an error, it reports failures as
/// `AnalysisResponse { status: "error", .. }` (spec §4.11, §6.2) so callers
/// get a uniform envelope instead of branching on HTTP status.
pub async fn analyze(State(state): State<AppState>, Json(raw): Json<RawAnalysisRequest>) -> Json<AnalysisResponse> {
    let response = state.analysis_service.analyze(raw).await;
    Json(response)
}
