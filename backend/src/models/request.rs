//! Inbound analysis request shape (spec §3 `AnalysisRequest`, §4.9, §6.5).

use super::filter::FilterSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;
use validator::Validate;

/// Nested table/connection descriptor (spec §4.9: "nested DB config (host,
/// dbname required; port ∈ [1,65535])"). The request names the table to
/// query and the store it lives in; the process-wide pool still owns the
/// actual connection.
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct TableConfig {
    #[validate(length(min = 1))]
    pub host: String,
    #[validate(length(min = 1))]
    pub dbname: String,
    #[serde(default)]
    #[validate(range(min = 1, max = 65535))]
    pub port: Option<u16>,
    #[validate(length(min = 1))]
    pub table: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisType {
    Enhanced,
}

impl Default for AnalysisType {
    fn default() -> Self {
        AnalysisType::Enhanced
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct AnalysisRequest {
    /// Accepts the `n1` synonym; normalized to this field by C9.
    pub n_minus_1: String,
    pub n: String,
    #[validate]
    pub table: TableConfig,
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    #[serde(default)]
    pub filters: FilterSet,
    pub peg_filter_file: Option<String>,
    #[serde(default)]
    pub peg_definitions: BTreeMap<String, String>,
    pub data_limit: Option<i64>,
    #[serde(default)]
    pub analysis_type: AnalysisType,
    #[serde(default)]
    pub enable_mock: bool,
    #[serde(default = "default_output_dir")]
    pub output_dir: String,
    pub backend_url: Option<String>,
    #[serde(default)]
    pub use_choi: bool,
    #[serde(default = "Uuid::new_v4")]
    pub request_id: Uuid,
    #[serde(default = "default_max_prompt_tokens")]
    #[validate(range(min = 1, max = 50_000))]
    pub max_prompt_tokens: u32,
    /// `usize` isn't one of `validator`'s range-validated numeric types;
    /// checked by hand in `validate_request` instead.
    #[serde(default = "default_max_prompt_chars")]
    pub max_prompt_chars: usize,
}

fn default_output_dir() -> String {
    "output".to_string()
}

fn default_max_prompt_tokens() -> u32 {
    8000
}

fn default_max_prompt_chars() -> usize {
    32_000
}

/// Raw, pre-normalization request body — accepts the `n1` request-alias and
/// `cell` filter-alias (spec §4.9) before C9 normalizes them into
/// [`AnalysisRequest`].
#[derive(Debug, Clone, Deserialize)]
pub struct RawAnalysisRequest {
    pub n_minus_1: Option<String>,
    pub n1: Option<String>,
    pub n: Option<String>,
    /// Kept as raw JSON so missing/malformed nested DB config produces a
    /// structured `VALIDATION_ERROR` (spec §4.9) instead of a deserialize
    /// failure before the validator ever runs.
    pub table: serde_json::Value,
    #[serde(default)]
    pub columns: BTreeMap<String, String>,
    #[serde(default)]
    pub filters: FilterSet,
    pub peg_filter_file: Option<String>,
    #[serde(default)]
    pub peg_definitions: BTreeMap<String, String>,
    pub data_limit: Option<i64>,
    pub analysis_type: Option<String>,
    #[serde(default)]
    pub enable_mock: bool,
    pub output_dir: Option<String>,
    pub backend_url: Option<String>,
    #[serde(default)]
    pub use_choi: bool,
    pub request_id: Option<Uuid>,
    pub max_prompt_tokens: Option<u32>,
    pub max_prompt_chars: Option<usize>,
}
