//! Builds the V2 payload POSTed to the downstream backend (spec §6.3),
//! grounded on `backend_payload_builder.py`'s `build_v2_payload`.

use crate::models::filter::FilterSet;
use crate::models::peg::{PegSample, Period};
use crate::models::response::ChoiJudgement;
use crate::services::data_processor::{sample_stats, sanitize_float, AnalyzedPeg};
use crate::services::llm_analysis_service::LlmAnalysisResult;
use crate::time_range::TimeRange;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Network identifiers observed on the fetched rows, independent of the
/// request's own filters. Takes precedence over the request's filters when
/// both are present (spec §6.3).
#[derive(Debug, Clone, Default)]
pub struct DbIdentifiers {
    pub ne_id: Option<String>,
    pub cell_id: Option<String>,
    pub swname: Option<String>,
}

/// Scans fetched rows for identifiers. `rel_ver` is deliberately not
/// collected here: the payload takes it from the request's filters only,
/// never from the rows.
pub fn extract_db_identifiers<'a>(samples: impl IntoIterator<Item = &'a PegSample>) -> DbIdentifiers {
    let mut ne_id = None;
    let mut swname = None;
    let mut cell_id = None;

    for sample in samples {
        if ne_id.is_none() {
            ne_id = sample.ne.clone();
        }
        if swname.is_none() {
            swname = sample.swname.clone();
        }
        if cell_id.is_none() {
            cell_id = sample
                .dimensions
                .as_deref()
                .and_then(|d| d.split(',').find_map(|tok| tok.strip_prefix("CellIdentity=")))
                .map(str::to_string);
        }
        if ne_id.is_some() && swname.is_some() && cell_id.is_some() {
            break;
        }
    }

    DbIdentifiers { ne_id, cell_id, swname }
}

#[derive(Debug, Clone, Serialize)]
pub struct AnalysisPeriod {
    pub n_minus_1_start: String,
    pub n_minus_1_end: String,
    pub n_start: String,
    pub n_end: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChoiResultPayload {
    pub enabled: bool,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    pub details: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendLlmAnalysis {
    pub summary: String,
    pub issues: Vec<String>,
    pub recommendations: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    pub model_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Default)]
pub struct PeriodStats {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_95: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pct_99: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub std: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PegComparison {
    pub peg_name: String,
    pub n_minus_1: PeriodStats,
    pub n: PeriodStats,
    pub change_absolute: Option<f64>,
    pub change_percentage: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub llm_insight: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendPayload {
    pub ne_id: String,
    pub cell_id: String,
    pub swname: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rel_ver: Option<String>,
    pub analysis_period: AnalysisPeriod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub choi_result: Option<ChoiResultPayload>,
    pub llm_analysis: BackendLlmAnalysis,
    pub peg_comparisons: Vec<PegComparison>,
    pub analysis_id: String,
}

/// `(peg_name, dimensions, is_derived)` -> period -> raw samples, as produced
/// by peg processing (C6).
pub type RawValueMap = BTreeMap<(String, Option<String>, bool), HashMap<Period, Vec<f64>>>;

/// `value[0]` for a list, `value` as a string otherwise; `default` if empty
/// or absent. Mirrors `_extract_identifier`.
fn extract_identifier(filters: &FilterSet, field: impl Fn(&FilterSet) -> Option<&crate::models::filter::FilterValue>, default: &str) -> String {
    field(filters)
        .map(|v| v.as_values())
        .and_then(|vals| vals.into_iter().next())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn resolve_identifier(db_value: Option<String>, filters: &FilterSet, field: impl Fn(&FilterSet) -> Option<&crate::models::filter::FilterValue>) -> String {
    db_value
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| extract_identifier(filters, field, "unknown"))
}

/// `rel_ver` is filters-only (never DB-derived), defaulting to `None` rather
/// than `"unknown"`.
fn resolve_rel_ver(filters: &FilterSet) -> Option<String> {
    filters.rel_ver.as_ref().map(|v| v.as_values()).and_then(|vals| vals.into_iter().next()).filter(|s| !s.is_empty())
}

fn build_analysis_period(n_minus_1_range: &TimeRange, n_range: &TimeRange) -> AnalysisPeriod {
    const FMT: &str = "%Y-%m-%d %H:%M:%S";
    AnalysisPeriod {
        n_minus_1_start: n_minus_1_range.start.format(FMT).to_string(),
        n_minus_1_end: n_minus_1_range.end.format(FMT).to_string(),
        n_start: n_range.start.format(FMT).to_string(),
        n_end: n_range.end.format(FMT).to_string(),
    }
}

fn build_llm_analysis(llm: Option<&LlmAnalysisResult>) -> BackendLlmAnalysis {
    match llm {
        Some(llm) => BackendLlmAnalysis {
            summary: llm.executive_summary.clone(),
            issues: llm.diagnostic_findings.clone(),
            recommendations: llm.recommended_actions.clone(),
            confidence: None,
            model_name: llm.model_used.clone(),
        },
        None => BackendLlmAnalysis {
            summary: String::new(),
            issues: Vec::new(),
            recommendations: Vec::new(),
            confidence: None,
            model_name: String::new(),
        },
    }
}

fn build_choi_result(choi: Option<&ChoiJudgement>) -> Option<ChoiResultPayload> {
    choi.map(|c| ChoiResultPayload {
        enabled: true,
        status: c.overall.clone(),
        score: None,
        details: serde_json::json!({
            "reasons": c.reasons,
            "by_kpi": c.by_kpi,
            "abnormal_detection": c.abnormal_detection,
            "warnings": c.warnings,
            "algorithm_version": c.algorithm_version,
        }),
    })
}

fn period_stats(raw_values: &RawValueMap, peg_name: &str, dimensions: &Option<String>, is_derived: bool, period: Period) -> PeriodStats {
    let key = (peg_name.to_string(), dimensions.clone(), is_derived);
    let values = raw_values.get(&key).and_then(|by_period| by_period.get(&period));
    match values.and_then(|v| sample_stats(v)) {
        Some(stats) => PeriodStats {
            avg: sanitize_float(stats.avg),
            pct_95: sanitize_float(stats.pct_95),
            pct_99: sanitize_float(stats.pct_99),
            min: sanitize_float(stats.min),
            max: sanitize_float(stats.max),
            count: Some(stats.count),
            std: sanitize_float(stats.std),
        },
        None => PeriodStats::default(),
    }
}

fn build_peg_comparisons(analyzed: &[AnalyzedPeg], raw_values: &RawValueMap, dimensions_by_peg: &BTreeMap<String, (Option<String>, bool)>) -> Vec<PegComparison> {
    analyzed
        .iter()
        .map(|peg| {
            let (dimensions, is_derived) = dimensions_by_peg.get(&peg.peg_name).cloned().unwrap_or((None, false));
            PegComparison {
                peg_name: peg.peg_name.clone(),
                n_minus_1: period_stats(raw_values, &peg.peg_name, &dimensions, is_derived, Period::NMinus1),
                n: period_stats(raw_values, &peg.peg_name, &dimensions, is_derived, Period::N),
                change_absolute: peg.absolute_change,
                change_percentage: peg.percentage_change,
                llm_insight: peg.llm_analysis_summary.clone(),
            }
        })
        .collect()
}

pub struct BackendPayloadInput<'a> {
    pub db_identifiers: &'a DbIdentifiers,
    pub filters: &'a FilterSet,
    pub n_minus_1_range: &'a TimeRange,
    pub n_range: &'a TimeRange,
    pub choi: Option<&'a ChoiJudgement>,
    pub llm: Option<&'a LlmAnalysisResult>,
    pub analyzed: &'a [AnalyzedPeg],
    pub raw_values: &'a RawValueMap,
    pub analysis_id: &'a str,
}

pub fn build_backend_payload(input: BackendPayloadInput<'_>) -> BackendPayload {
    let dimensions_by_peg: BTreeMap<String, (Option<String>, bool)> = input
        .raw_values
        .keys()
        .map(|(peg_name, dimensions, is_derived)| (peg_name.clone(), (dimensions.clone(), *is_derived)))
        .collect();

    BackendPayload {
        ne_id: resolve_identifier(input.db_identifiers.ne_id.clone(), input.filters, |f| f.ne.as_ref()),
        cell_id: resolve_identifier(input.db_identifiers.cell_id.clone(), input.filters, |f| f.cellid.as_ref()),
        swname: resolve_identifier(input.db_identifiers.swname.clone(), input.filters, |f| f.swname.as_ref()),
        rel_ver: resolve_rel_ver(input.filters),
        analysis_period: build_analysis_period(input.n_minus_1_range, input.n_range),
        choi_result: build_choi_result(input.choi),
        llm_analysis: build_llm_analysis(input.llm),
        peg_comparisons: build_peg_comparisons(input.analyzed, input.raw_values, &dimensions_by_peg),
        analysis_id: input.analysis_id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::filter::FilterValue;
    use chrono::FixedOffset;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn range() -> TimeRange {
        TimeRange::parse("2025-01-01_00:00~2025-01-01_01:00", utc()).unwrap()
    }

    #[test]
    fn db_identifiers_take_precedence_over_filters() {
        let mut filters = FilterSet::default();
        filters.ne = Some(FilterValue::Single("filter-ne".to_string()));
        let db = DbIdentifiers { ne_id: Some("db-ne".to_string()), cell_id: None, swname: None };
        assert_eq!(resolve_identifier(db.ne_id.clone(), &filters, |f| f.ne.as_ref()), "db-ne");
    }

    #[test]
    fn falls_back_to_filters_then_unknown() {
        let mut filters = FilterSet::default();
        filters.ne = Some(FilterValue::Single("filter-ne".to_string()));
        let empty_db: Option<String> = None;
        assert_eq!(resolve_identifier(empty_db.clone(), &filters, |f| f.ne.as_ref()), "filter-ne");

        let filters2 = FilterSet::default();
        assert_eq!(resolve_identifier(empty_db, &filters2, |f| f.ne.as_ref()), "unknown");
    }

    #[test]
    fn rel_ver_comes_only_from_filters_and_defaults_to_none() {
        let filters = FilterSet::default();
        assert_eq!(resolve_rel_ver(&filters), None);

        let mut filters2 = FilterSet::default();
        filters2.rel_ver = Some(FilterValue::Many(vec!["v1".to_string(), "v2".to_string()]));
        assert_eq!(resolve_rel_ver(&filters2), Some("v1".to_string()));
    }

    #[test]
    fn extract_db_identifiers_reads_cell_id_from_dimensions_token() {
        let samples = vec![PegSample {
            timestamp: range().start,
            family_id: 1,
            peg_name: "x".to_string(),
            value: 1.0,
            ne: Some("ne1".to_string()),
            swname: None,
            rel_ver: None,
            dimensions: Some("CellIdentity=20,QCI=9".to_string()),
        }];
        let ids = extract_db_identifiers(&samples);
        assert_eq!(ids.ne_id, Some("ne1".to_string()));
        assert_eq!(ids.cell_id, Some("20".to_string()));
        assert_eq!(ids.swname, None);
    }

    #[test]
    fn choi_result_is_none_when_not_invoked() {
        assert!(build_choi_result(None).is_none());
    }

    #[test]
    fn analysis_period_formats_each_side() {
        let period = build_analysis_period(&range(), &range());
        assert_eq!(period.n_minus_1_start, "2025-01-01 00:00:00");
        assert_eq!(period.n_end, "2025-01-01 01:00:00");
    }
}
