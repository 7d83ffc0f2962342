//! Outbound analysis response shape (spec §6.2).

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Completed,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRangeView {
    pub start: DateTime<FixedOffset>,
    pub end: DateTime<FixedOffset>,
    pub range_text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimeRanges {
    #[serde(rename = "n_minus_1")]
    pub n_minus_1: TimeRangeView,
    pub n: TimeRangeView,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataSummary {
    pub total_pegs: usize,
    pub complete_data_pegs: usize,
    pub incomplete_data_pegs: usize,
    pub has_data: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PegResult {
    pub peg_name: String,
    pub n_minus_1_value: Option<f64>,
    pub n_value: Option<f64>,
    pub absolute_change: Option<f64>,
    pub percentage_change: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_analysis_summary: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PegStatistics {
    pub total_pegs: usize,
    pub complete_data_pegs: usize,
    pub incomplete_data_pegs: usize,
    pub positive_changes: usize,
    pub negative_changes: usize,
    pub no_change: usize,
    pub avg_percentage_change: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChoiJudgement {
    pub overall: String,
    pub reasons: Vec<String>,
    pub by_kpi: serde_json::Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abnormal_detection: Option<Value>,
    #[serde(default)]
    pub warnings: Vec<String>,
    pub algorithm_version: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PegAnalysis {
    pub results: Vec<PegResult>,
    pub statistics: PegStatistics,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choi_judgement: Option<ChoiJudgement>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub prompt_chars: usize,
    pub prompt_tokens_estimate: u64,
    pub rows_in_preview: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnalysis {
    pub executive_summary: String,
    pub diagnostic_findings: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub model_used: String,
    #[serde(rename = "_analysis_metadata")]
    pub analysis_metadata: AnalysisMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub workflow_version: String,
    pub processing_timestamp: DateTime<FixedOffset>,
    pub request_id: String,
    pub enable_mock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorDetails {
    pub stage: String,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResponse {
    pub status: AnalysisStatus,
    pub message: String,
    pub analysis_id: String,
    pub request_timestamp: DateTime<FixedOffset>,
    pub completion_timestamp: DateTime<FixedOffset>,
    pub duration_seconds: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_ranges: Option<TimeRanges>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_summary: Option<DataSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub peg_analysis: Option<PegAnalysis>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_analysis: Option<LlmAnalysis>,
    pub metadata: ResponseMetadata,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<ErrorDetails>,
}
