//! Merges processed PEG comparisons with the LLM result into the final
//! `AnalyzedPeg` list plus summary statistics (C8, spec §4.8).

use crate::models::peg::ProcessedPeg;
use crate::models::response::PegStatistics;
use crate::services::llm_analysis_service::LlmAnalysisResult;
use serde::Serialize;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Serialize)]
pub struct AnalyzedPeg {
    pub peg_name: String,
    pub n_minus_1_value: Option<f64>,
    pub n_value: Option<f64>,
    pub absolute_change: Option<f64>,
    pub percentage_change: Option<f64>,
    pub llm_analysis_summary: Option<String>,
}

pub struct AnalyzedPegs {
    pub results: Vec<AnalyzedPeg>,
    pub statistics: PegStatistics,
}

/// Merges change metrics with any per-PEG LLM insight (spec §4.8).
///
/// Percentage change obeys the same null policy as C6: never 0, never an
/// infinity, null whenever `n_minus_1_value` is zero or either side is
/// missing.
pub fn process(processed: &[ProcessedPeg], llm_result: Option<&LlmAnalysisResult>) -> AnalyzedPegs {
    let insights = llm_result.map(|r| &r.peg_insights);

    let mut results: Vec<AnalyzedPeg> = processed
        .iter()
        .map(|p| AnalyzedPeg {
            peg_name: p.peg_name.clone(),
            n_minus_1_value: p.n_minus_1_value,
            n_value: p.n_value,
            absolute_change: p.absolute_change().and_then(sanitize_float),
            percentage_change: p.percentage_change().and_then(sanitize_float),
            llm_analysis_summary: insights.and_then(|map| lookup_case_insensitive(map, &p.peg_name)),
        })
        .collect();

    results.sort_by(|a, b| a.peg_name.cmp(&b.peg_name));

    let total_pegs = results.len();
    let complete_data_pegs =
        results.iter().filter(|r| r.n_minus_1_value.is_some() && r.n_value.is_some()).count();
    let incomplete_data_pegs = total_pegs - complete_data_pegs;

    let mut positive_changes = 0usize;
    let mut negative_changes = 0usize;
    let mut no_change = 0usize;
    let mut pct_sum = 0.0f64;
    let mut pct_count = 0usize;

    for r in &results {
        if let Some(pct) = r.percentage_change {
            pct_sum += pct;
            pct_count += 1;
            if pct > 0.0 {
                positive_changes += 1;
            } else if pct < 0.0 {
                negative_changes += 1;
            } else {
                no_change += 1;
            }
        }
    }

    let avg_percentage_change =
        if pct_count > 0 { sanitize_float(pct_sum / pct_count as f64) } else { None };

    let statistics = PegStatistics {
        total_pegs,
        complete_data_pegs,
        incomplete_data_pegs,
        positive_changes,
        negative_changes,
        no_change,
        avg_percentage_change,
    };

    AnalyzedPegs { results, statistics }
}

fn lookup_case_insensitive(map: &BTreeMap<String, String>, peg_name: &str) -> Option<String> {
    map.iter().find(|(k, _)| k.eq_ignore_ascii_case(peg_name)).map(|(_, v)| v.clone())
}

/// Per-period descriptive statistics over raw samples (SPEC_FULL §B.1),
/// consumed by the backend payload builder (C10).
#[derive(Debug, Clone, Copy, Serialize)]
pub struct SampleStats {
    pub avg: f64,
    pub pct_95: f64,
    pub pct_99: f64,
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub std: f64,
}

/// Computes `{avg, pct_95, pct_99, min, max, count, std}` from raw samples,
/// using sample standard deviation (N-1 denominator, 0 when `count <= 1`)
/// and linear-interpolated percentiles. NaN/infinite inputs are dropped
/// before computing, mirroring `PEGCalculator.calculate_statistics`'s
/// valid-value filter.
pub fn sample_stats(values: &[f64]) -> Option<SampleStats> {
    let mut valid: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
    if valid.is_empty() {
        return None;
    }
    valid.sort_by(|a, b| a.partial_cmp(b).unwrap());

    let count = valid.len();
    let sum: f64 = valid.iter().sum();
    let avg = sum / count as f64;

    let std = if count > 1 {
        let variance = valid.iter().map(|v| (v - avg).powi(2)).sum::<f64>() / (count - 1) as f64;
        variance.sqrt()
    } else {
        0.0
    };

    Some(SampleStats {
        avg,
        pct_95: percentile(&valid, 95.0),
        pct_99: percentile(&valid, 99.0),
        min: valid[0],
        max: valid[count - 1],
        count,
        std,
    })
}

/// Linear-interpolation percentile (numpy's default `"linear"` method).
fn percentile(sorted_values: &[f64], pct: f64) -> f64 {
    let n = sorted_values.len();
    if n == 1 {
        return sorted_values[0];
    }
    let rank = (pct / 100.0) * (n - 1) as f64;
    let lo = rank.floor() as usize;
    let hi = rank.ceil() as usize;
    if lo == hi {
        sorted_values[lo]
    } else {
        let frac = rank - lo as f64;
        sorted_values[lo] + (sorted_values[hi] - sorted_values[lo]) * frac
    }
}

/// NaN/±∞ must never reach a JSON response (`PEGCalculator._sanitize_float_value`).
pub fn sanitize_float(value: f64) -> Option<f64> {
    if value.is_finite() {
        Some(value)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peg(name: &str, n1: Option<f64>, n: Option<f64>) -> ProcessedPeg {
        ProcessedPeg {
            peg_name: name.to_string(),
            dimensions: None,
            n_minus_1_value: n1,
            n_value: n,
            is_derived: false,
        }
    }

    #[test]
    fn counts_positive_negative_and_no_change() {
        let processed = vec![
            peg("up", Some(100.0), Some(150.0)),
            peg("down", Some(100.0), Some(50.0)),
            peg("flat", Some(100.0), Some(100.0)),
            peg("incomplete", None, Some(1.0)),
        ];
        let result = process(&processed, None);
        assert_eq!(result.statistics.total_pegs, 4);
        assert_eq!(result.statistics.complete_data_pegs, 3);
        assert_eq!(result.statistics.incomplete_data_pegs, 1);
        assert_eq!(result.statistics.positive_changes, 1);
        assert_eq!(result.statistics.negative_changes, 1);
        assert_eq!(result.statistics.no_change, 1);
    }

    #[test]
    fn avg_percentage_change_ignores_null_rows() {
        let processed = vec![peg("a", Some(100.0), Some(200.0)), peg("b", Some(0.0), Some(5.0))];
        let result = process(&processed, None);
        assert_eq!(result.statistics.avg_percentage_change, Some(100.0));
    }

    #[test]
    fn results_are_sorted_by_peg_name() {
        let processed = vec![peg("zeta", Some(1.0), Some(1.0)), peg("alpha", Some(1.0), Some(1.0))];
        let result = process(&processed, None);
        assert_eq!(result.results[0].peg_name, "alpha");
        assert_eq!(result.results[1].peg_name, "zeta");
    }

    #[test]
    fn sample_stats_uses_sample_stdev_with_n_minus_1_denominator() {
        let stats = sample_stats(&[2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0]).unwrap();
        assert_eq!(stats.count, 8);
        assert!((stats.avg - 5.0).abs() < 1e-9);
        assert!((stats.std - 2.138089935299395).abs() < 1e-6);
    }

    #[test]
    fn sample_stats_std_is_zero_for_single_value() {
        let stats = sample_stats(&[42.0]).unwrap();
        assert_eq!(stats.count, 1);
        assert_eq!(stats.std, 0.0);
    }

    #[test]
    fn sample_stats_drops_non_finite_values() {
        let stats = sample_stats(&[1.0, f64::NAN, 3.0, f64::INFINITY]).unwrap();
        assert_eq!(stats.count, 2);
    }

    #[test]
    fn sample_stats_is_none_for_empty_input() {
        assert!(sample_stats(&[]).is_none());
    }

    #[test]
    fn sanitize_float_rejects_non_finite() {
        assert_eq!(sanitize_float(1.5), Some(1.5));
        assert_eq!(sanitize_float(f64::NAN), None);
        assert_eq!(sanitize_float(f64::INFINITY), None);
    }
}
