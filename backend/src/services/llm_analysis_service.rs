//! Builds the enhanced-diagnostic prompt from processed PEG comparisons,
//! invokes the LLM client, and post-processes the result (C7, spec §4.6).

use crate::config::PegConfig;
use crate::llm::prompt::{load_enhanced_template, render};
use crate::llm::LlmClient;
use crate::models::peg::ProcessedPeg;
use crate::time_range::TimeRange;
use crate::utils::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisMetadata {
    pub prompt_chars: usize,
    pub prompt_tokens_estimate: u64,
    pub rows_in_preview: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmAnalysisResult {
    pub executive_summary: String,
    pub diagnostic_findings: Vec<String>,
    pub recommended_actions: Vec<String>,
    pub model_used: String,
    pub analysis_metadata: AnalysisMetadata,
    /// Optional per-PEG summaries keyed by peg_name (case-insensitive
    /// lookup by the caller), grounded on the original's
    /// `llm_analysis.peg_insights` mapping. Usually empty.
    pub peg_insights: BTreeMap<String, String>,
}

pub struct LlmAnalysisService {
    client: LlmClient,
    template_path: Option<String>,
    exclude_zero_both_from_prompt: bool,
}

impl LlmAnalysisService {
    pub fn new(client: LlmClient, peg_config: &PegConfig) -> Self {
        Self {
            client,
            template_path: None,
            exclude_zero_both_from_prompt: peg_config.exclude_zero_both_from_prompt,
        }
    }

    pub fn with_template_path(mut self, path: Option<String>) -> Self {
        self.template_path = path;
        self
    }

    pub async fn analyze(
        &self,
        n_minus_1_range: &TimeRange,
        n_range: &TimeRange,
        processed: &[ProcessedPeg],
        model_name: &str,
        enable_mock: bool,
    ) -> Result<LlmAnalysisResult, AppError> {
        let preview_rows: Vec<&ProcessedPeg> = processed
            .iter()
            .filter(|p| p.percentage_change().is_some() || !self.exclude_zero_both_from_prompt)
            .collect();

        if preview_rows.is_empty() {
            return Err(AppError::LlmAnalysis {
                message: "no PEG carries a comparable percentage change; nothing to analyze".to_string(),
                prompt_preview: String::new(),
            });
        }

        let data_table = render_data_table(&preview_rows);
        let template = load_enhanced_template(self.template_path.as_deref());

        let mut vars = BTreeMap::new();
        vars.insert("n_minus_1_range", n_minus_1_range.to_canonical_string());
        vars.insert("n_range", n_range.to_canonical_string());
        vars.insert("data_table", data_table);

        let prompt = render(&template, &vars)?;

        let response = self.client.analyze_data(&prompt, enable_mock).await.map_err(|err| {
            let preview: String = prompt.chars().take(200).collect();
            match err {
                AppError::Llm { message, .. } => {
                    AppError::LlmAnalysis { message, prompt_preview: preview }
                },
                other => other,
            }
        })?;

        Ok(post_process(response, model_name, prompt.chars().count(), self.client.estimate_tokens(&prompt), preview_rows.len()))
    }
}

fn render_data_table(rows: &[&ProcessedPeg]) -> String {
    let mut out = String::from("peg_name | n_minus_1 | n | pct_change\n");
    for row in rows {
        out.push_str(&format!(
            "{} | {} | {} | {}\n",
            row.peg_name,
            row.n_minus_1_value.map(|v| format!("{v:.3}")).unwrap_or_else(|| "null".to_string()),
            row.n_value.map(|v| format!("{v:.3}")).unwrap_or_else(|| "null".to_string()),
            row.percentage_change().map(|v| format!("{v:.3}")).unwrap_or_else(|| "null".to_string()),
        ));
    }
    out
}

/// Ensures the minimum required keys exist (spec §4.6 post-processing),
/// filling defaults for anything the model omitted.
fn post_process(
    response: serde_json::Value,
    model_name: &str,
    prompt_chars: usize,
    prompt_tokens_estimate: u64,
    rows_in_preview: usize,
) -> LlmAnalysisResult {
    let executive_summary = response
        .get("executive_summary")
        .and_then(|v| v.as_str())
        .unwrap_or("No executive summary was provided.")
        .to_string();

    let diagnostic_findings = response
        .get("diagnostic_findings")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let recommended_actions = response
        .get("recommended_actions")
        .and_then(|v| v.as_array())
        .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();

    let peg_insights = response
        .get("peg_insights")
        .and_then(|v| v.as_object())
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default();

    LlmAnalysisResult {
        executive_summary,
        diagnostic_findings,
        recommended_actions,
        model_used: model_name.to_string(),
        analysis_metadata: AnalysisMetadata { prompt_chars, prompt_tokens_estimate, rows_in_preview },
        peg_insights,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmConfig;
    use chrono::FixedOffset;

    fn range() -> TimeRange {
        TimeRange::parse("2025-01-01_00:00~2025-01-01_01:00", FixedOffset::east_opt(0).unwrap()).unwrap()
    }

    fn peg(n1: Option<f64>, n: Option<f64>) -> ProcessedPeg {
        ProcessedPeg { peg_name: "throughput".to_string(), dimensions: None, n_minus_1_value: n1, n_value: n, is_derived: false }
    }

    #[tokio::test]
    async fn raises_llm_analysis_error_when_preview_is_empty() {
        let client = LlmClient::new(LlmConfig::default());
        let service = LlmAnalysisService::new(client, &crate::config::PegConfig::default());
        let processed = vec![peg(Some(0.0), Some(10.0))];
        let err = service.analyze(&range(), &range(), &processed, "model", true).await.unwrap_err();
        assert!(matches!(err, AppError::LlmAnalysis { .. }));
    }

    #[tokio::test]
    async fn mock_mode_produces_defaulted_post_processed_result() {
        let client = LlmClient::new(LlmConfig::default());
        let service = LlmAnalysisService::new(client, &crate::config::PegConfig::default());
        let processed = vec![peg(Some(100.0), Some(150.0))];
        let result = service.analyze(&range(), &range(), &processed, "model", true).await.unwrap();
        assert!(!result.executive_summary.is_empty());
    }
}
