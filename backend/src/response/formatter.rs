//! Assembles the external `AnalysisResponse` from the orchestrator's
//! intermediate results (C10, spec §4.10/§6.2).

use crate::models::response::{
    AnalysisMetadata, AnalysisResponse, AnalysisStatus, ChoiJudgement, DataSummary, ErrorDetails,
    LlmAnalysis, PegAnalysis, PegResult, ResponseMetadata, TimeRangeView, TimeRanges,
};
use crate::services::data_processor::AnalyzedPegs;
use crate::services::llm_analysis_service::LlmAnalysisResult;
use crate::time_range::TimeRange;
use crate::utils::error::AppError;
use chrono::{DateTime, FixedOffset};
use uuid::Uuid;

const WORKFLOW_VERSION: &str = env!("CARGO_PKG_VERSION");

pub struct FormatterInput {
    pub request_id: Uuid,
    pub analysis_id: String,
    pub request_timestamp: DateTime<FixedOffset>,
    pub completion_timestamp: DateTime<FixedOffset>,
    pub n_minus_1_range: TimeRange,
    pub n_range: TimeRange,
    pub analyzed: AnalyzedPegs,
    pub llm_result: Option<LlmAnalysisResult>,
    pub choi_judgement: Option<ChoiJudgement>,
    pub enable_mock: bool,
}

/// Builds the `"completed"` response (spec §6.2).
pub fn format_success(input: FormatterInput) -> AnalysisResponse {
    let duration_seconds =
        (input.completion_timestamp - input.request_timestamp).num_milliseconds() as f64 / 1000.0;

    let total_pegs = input.analyzed.statistics.total_pegs;
    let complete_data_pegs = input.analyzed.statistics.complete_data_pegs;
    let data_summary = DataSummary {
        total_pegs,
        complete_data_pegs,
        incomplete_data_pegs: input.analyzed.statistics.incomplete_data_pegs,
        has_data: total_pegs > 0,
    };

    let results: Vec<PegResult> = input
        .analyzed
        .results
        .into_iter()
        .map(|r| PegResult {
            peg_name: r.peg_name,
            n_minus_1_value: r.n_minus_1_value,
            n_value: r.n_value,
            absolute_change: r.absolute_change,
            percentage_change: r.percentage_change,
            llm_analysis_summary: r.llm_analysis_summary,
        })
        .collect();

    let peg_analysis = PegAnalysis {
        results,
        statistics: input.analyzed.statistics,
        choi_judgement: input.choi_judgement,
    };

    let llm_analysis = input.llm_result.map(|llm| LlmAnalysis {
        executive_summary: llm.executive_summary,
        diagnostic_findings: llm.diagnostic_findings,
        recommended_actions: llm.recommended_actions,
        model_used: llm.model_used,
        analysis_metadata: AnalysisMetadata {
            prompt_chars: llm.analysis_metadata.prompt_chars,
            prompt_tokens_estimate: llm.analysis_metadata.prompt_tokens_estimate,
            rows_in_preview: llm.analysis_metadata.rows_in_preview,
        },
    });

    AnalysisResponse {
        status: AnalysisStatus::Completed,
        message: "analysis completed".to_string(),
        analysis_id: input.analysis_id,
        request_timestamp: input.request_timestamp,
        completion_timestamp: input.completion_timestamp,
        duration_seconds,
        time_ranges: Some(TimeRanges {
            n_minus_1: time_range_view(&input.n_minus_1_range),
            n: time_range_view(&input.n_range),
        }),
        data_summary: Some(data_summary),
        peg_analysis: Some(peg_analysis),
        llm_analysis,
        metadata: ResponseMetadata {
            workflow_version: WORKFLOW_VERSION.to_string(),
            processing_timestamp: input.completion_timestamp,
            request_id: input.request_id.to_string(),
            enable_mock: input.enable_mock,
        },
        error_details: None,
    }
}

/// Builds the `"error"` response (spec §4.11: "error response containing
/// `{stage, code, message, details}`").
pub fn format_error(
    request_id: Uuid,
    analysis_id: String,
    request_timestamp: DateTime<FixedOffset>,
    completion_timestamp: DateTime<FixedOffset>,
    enable_mock: bool,
    err: &AppError,
) -> AnalysisResponse {
    let duration_seconds = (completion_timestamp - request_timestamp).num_milliseconds() as f64 / 1000.0;

    AnalysisResponse {
        status: AnalysisStatus::Error,
        message: err.to_string(),
        analysis_id,
        request_timestamp,
        completion_timestamp,
        duration_seconds,
        time_ranges: None,
        data_summary: None,
        peg_analysis: None,
        llm_analysis: None,
        metadata: ResponseMetadata {
            workflow_version: WORKFLOW_VERSION.to_string(),
            processing_timestamp: completion_timestamp,
            request_id: request_id.to_string(),
            enable_mock,
        },
        error_details: Some(ErrorDetails {
            stage: err.stage().to_string(),
            code: err.error_code().to_string(),
            message: err.to_string(),
            details: err.details(),
        }),
    }
}

fn time_range_view(range: &TimeRange) -> TimeRangeView {
    TimeRangeView { start: range.start, end: range.end, range_text: range.to_canonical_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::response::PegStatistics;
    use crate::services::data_processor::AnalyzedPegs;
    use chrono::FixedOffset;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn range() -> TimeRange {
        TimeRange::parse("2025-01-01_00:00~2025-01-01_01:00", utc()).unwrap()
    }

    #[test]
    fn success_response_has_completed_status_and_no_error_details() {
        let analyzed = AnalyzedPegs {
            results: vec![],
            statistics: PegStatistics {
                total_pegs: 0,
                complete_data_pegs: 0,
                incomplete_data_pegs: 0,
                positive_changes: 0,
                negative_changes: 0,
                no_change: 0,
                avg_percentage_change: None,
            },
        };
        let response = format_success(FormatterInput {
            request_id: Uuid::nil(),
            analysis_id: "abc".to_string(),
            request_timestamp: range().start,
            completion_timestamp: range().end,
            n_minus_1_range: range(),
            n_range: range(),
            analyzed,
            llm_result: None,
            choi_judgement: None,
            enable_mock: true,
        });
        assert_eq!(response.status, AnalysisStatus::Completed);
        assert!(response.error_details.is_none());
        assert!(response.data_summary.is_some());
    }

    #[test]
    fn error_response_carries_stage_and_code() {
        let err = AppError::validation("bad request");
        let response = format_error(Uuid::nil(), "abc".to_string(), range().start, range().end, false, &err);
        assert_eq!(response.status, AnalysisStatus::Error);
        let details = response.error_details.unwrap();
        assert_eq!(details.code, "VALIDATION_ERROR");
        assert_eq!(details.stage, "request_validation");
    }
}
