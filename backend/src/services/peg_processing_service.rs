//! Orchestrates retrieval -> validation -> aggregation -> derivation ->
//! percent-change for one analysis request (C6, spec §4.5).

use crate::expr::{self, topological_order};
use crate::filters::FamilyFilter;
use crate::models::filter::FilterSet;
use crate::models::peg::{AggregatedPEG, DerivedPegDefinition, PegSample, Period, ProcessedPeg};
use crate::repository::{PegRepository, QueryBuilderInput};
use crate::response::backend_payload::{extract_db_identifiers, DbIdentifiers};
use crate::time_range::TimeRange;
use crate::utils::error::AppError;
use std::collections::{BTreeMap, HashMap};

pub struct PegProcessingInput<'a> {
    pub table: &'a str,
    pub n_minus_1_range: TimeRange,
    pub n_range: TimeRange,
    pub columns: BTreeMap<String, String>,
    pub column_values: BTreeMap<String, Vec<String>>,
    pub filters: &'a FilterSet,
    pub csv_filter: FamilyFilter,
    pub derived_defs: Vec<DerivedPegDefinition>,
    pub data_limit: Option<i64>,
}

pub struct PegProcessingOutput {
    /// Long-form table sorted `(is_derived, peg_name, period)` (spec §4.5 step 8).
    pub long_form: Vec<AggregatedPEG>,
    pub processed: Vec<ProcessedPeg>,
    /// Raw per-sample values behind each `(peg_name, dimensions, is_derived)`
    /// pivot key, retained for C10's descriptive statistics
    /// (SPEC_FULL §B.1). Derived PEGs carry their single evaluated value.
    pub raw_values: BTreeMap<(String, Option<String>, bool), HashMap<Period, Vec<f64>>>,
    /// `ne`/`cell_id`/`swname` lifted from the fetched rows, for the
    /// downstream backend payload's identifier precedence (spec §6.3).
    pub db_identifiers: DbIdentifiers,
}

pub struct PegProcessingService {
    repository: PegRepository,
}

impl PegProcessingService {
    pub fn new(repository: PegRepository) -> Self {
        Self { repository }
    }

    pub async fn process(&self, input: PegProcessingInput<'_>) -> Result<PegProcessingOutput, AppError> {
        if input.n_minus_1_range.end > input.n_range.start {
            tracing::warn!("N-1 window overlaps the N window");
        }

        let query_input = QueryBuilderInput {
            columns: input.columns.clone(),
            column_values: input.column_values.clone(),
            dimension_filters: input.filters.dimension_filters(),
            csv_filter: input.csv_filter.clone(),
            data_limit: input.data_limit,
        };

        let n_minus_1_samples = self
            .repository
            .fetch_peg_data(input.table, &input.n_minus_1_range, &query_input)
            .await
            .map_err(|e| wrap_step(e, "data_retrieval"))?;
        let n_samples = self
            .repository
            .fetch_peg_data(input.table, &input.n_range, &query_input)
            .await
            .map_err(|e| wrap_step(e, "data_retrieval"))?;

        if n_minus_1_samples.is_empty() {
            tracing::warn!("N-1 window returned no samples");
        }
        if n_samples.is_empty() {
            tracing::warn!("N window returned no samples");
        }

        let db_identifiers = extract_db_identifiers(n_minus_1_samples.iter().chain(n_samples.iter()));

        let no_cellid_filter = input.filters.cellid.is_none();

        let n_minus_1_samples = if no_cellid_filter {
            average_across_cells(n_minus_1_samples)
        } else {
            n_minus_1_samples
        };
        let n_samples = if no_cellid_filter { average_across_cells(n_samples) } else { n_samples };

        let mut raw_values = collect_raw_values(&n_minus_1_samples, Period::NMinus1, BTreeMap::new());
        raw_values = collect_raw_values(&n_samples, Period::N, raw_values);

        let mut n_minus_1_aggs = aggregate_period(&n_minus_1_samples, Period::NMinus1);
        let mut n_aggs = aggregate_period(&n_samples, Period::N);

        let derived_order =
            topological_order(&input.derived_defs).map_err(|cycle| AppError::PegProcessing {
                step: "dependency_resolution".to_string(),
                message: "circular dependency among derived PEGs".to_string(),
                details: Some(serde_json::json!({ "circular_dependencies": cycle.circular_dependencies })),
            })?;

        evaluate_derived(&mut n_minus_1_aggs, &derived_order, Period::NMinus1, &mut raw_values);
        evaluate_derived(&mut n_aggs, &derived_order, Period::N, &mut raw_values);

        let mut long_form: Vec<AggregatedPEG> = Vec::new();
        long_form.extend(n_minus_1_aggs);
        long_form.extend(n_aggs);

        let processed = compute_processed(&long_form);

        long_form.sort_by(|a, b| {
            a.is_derived
                .cmp(&b.is_derived)
                .then_with(|| a.peg_name.cmp(&b.peg_name))
                .then_with(|| a.period.cmp(&b.period))
        });

        Ok(PegProcessingOutput { long_form, processed, raw_values, db_identifiers })
    }
}

fn wrap_step(err: AppError, step: &str) -> AppError {
    match err {
        AppError::Database { message, query_preview, param_keys } => AppError::PegProcessing {
            step: step.to_string(),
            message,
            details: Some(serde_json::json!({ "query_preview": query_preview, "param_keys": param_keys })),
        },
        other => other,
    }
}

/// Strips only the `CellIdentity=` token from `dimensions`, then groups by
/// `(timestamp, peg_name, dimensions)` taking the mean of `value` and the
/// first identifier columns seen (spec §4.5 step 4, SPEC_FULL §B — the
/// "strip only CellIdentity=" open-question resolution is authoritative).
fn average_across_cells(samples: Vec<PegSample>) -> Vec<PegSample> {
    let mut groups: BTreeMap<(i64, String, Option<String>), (f64, u32, PegSample)> = BTreeMap::new();

    for sample in samples {
        let stripped = strip_cell_identity(sample.dimensions.as_deref());
        let key = (sample.timestamp.timestamp(), sample.peg_name.clone(), stripped.clone());
        groups
            .entry(key)
            .and_modify(|(sum, count, _)| {
                *sum += sample.value;
                *count += 1;
            })
            .or_insert_with(|| (sample.value, 1, sample.clone()));
    }

    groups
        .into_values()
        .map(|(sum, count, mut first)| {
            first.value = sum / count as f64;
            first
        })
        .collect()
}

fn strip_cell_identity(dimensions: Option<&str>) -> Option<String> {
    let dims = dimensions?;
    let remainder: Vec<&str> = dims.split(',').filter(|tok| !tok.starts_with("CellIdentity=")).collect();
    if remainder.is_empty() {
        None
    } else {
        Some(remainder.join(","))
    }
}

/// Groups samples by `(peg_name[, dimensions])` computing the mean value per
/// window (spec §4.5 step 5).
fn aggregate_period(samples: &[PegSample], period: Period) -> Vec<AggregatedPEG> {
    let mut groups: BTreeMap<(String, Option<String>), (f64, u32)> = BTreeMap::new();
    for sample in samples {
        let key = (sample.peg_name.clone(), sample.dimensions.clone());
        let entry = groups.entry(key).or_insert((0.0, 0));
        entry.0 += sample.value;
        entry.1 += 1;
    }
    groups
        .into_iter()
        .map(|((peg_name, dimensions), (sum, count))| AggregatedPEG {
            peg_name,
            period,
            avg_value: sum / count as f64,
            dimensions,
            is_derived: false,
            formula: None,
        })
        .collect()
}

/// Groups raw sample values by `(peg_name, dimensions, is_derived=false)`,
/// merging into an already-started map (one call per period).
fn collect_raw_values(
    samples: &[PegSample],
    period: Period,
    mut raw_values: BTreeMap<(String, Option<String>, bool), HashMap<Period, Vec<f64>>>,
) -> BTreeMap<(String, Option<String>, bool), HashMap<Period, Vec<f64>>> {
    for sample in samples {
        let key = (sample.peg_name.clone(), sample.dimensions.clone(), false);
        raw_values.entry(key).or_default().entry(period).or_default().push(sample.value);
    }
    raw_values
}

/// Evaluates derived PEGs in dependency order and appends results to
/// `aggs` (spec §4.5 step 6). The variable map "ignores dimensions": each
/// peg_name contributes the mean of its (possibly multiple, per-dimension)
/// aggregate values for this period (spec §9 two-pass-grouping design note).
fn evaluate_derived(
    aggs: &mut Vec<AggregatedPEG>,
    derived_order: &[DerivedPegDefinition],
    period: Period,
    raw_values: &mut BTreeMap<(String, Option<String>, bool), HashMap<Period, Vec<f64>>>,
) {
    let mut vars: HashMap<String, f64> = HashMap::new();
    {
        let mut sums: HashMap<String, (f64, u32)> = HashMap::new();
        for agg in aggs.iter() {
            let entry = sums.entry(agg.peg_name.clone()).or_insert((0.0, 0));
            entry.0 += agg.avg_value;
            entry.1 += 1;
        }
        for (name, (sum, count)) in sums {
            vars.insert(name, sum / count as f64);
        }
    }

    for def in derived_order {
        let value = match expr::evaluate_formula(&def.formula, &vars) {
            Ok(v) => v,
            Err(err) => {
                tracing::warn!(peg = def.output_peg, %err, "derived PEG formula failed to parse, skipping");
                continue;
            },
        };
        if !value.is_finite() {
            tracing::warn!(peg = def.output_peg, "derived PEG evaluated to NaN/infinite, omitting");
            continue;
        }
        vars.insert(def.output_peg.clone(), value);
        aggs.push(AggregatedPEG {
            peg_name: def.output_peg.clone(),
            period,
            avg_value: value,
            dimensions: None,
            is_derived: true,
            formula: Some(def.formula.clone()),
        });
        raw_values
            .entry((def.output_peg.clone(), None, true))
            .or_default()
            .entry(period)
            .or_default()
            .push(value);
    }
}

/// Pivots the long-form table on `period` and computes `ProcessedPeg`
/// entries with the null-policy percent change (spec §4.5 step 7).
fn compute_processed(long_form: &[AggregatedPEG]) -> Vec<ProcessedPeg> {
    let mut pivot: BTreeMap<(String, Option<String>, bool), HashMap<Period, f64>> = BTreeMap::new();
    for agg in long_form {
        pivot
            .entry((agg.peg_name.clone(), agg.dimensions.clone(), agg.is_derived))
            .or_default()
            .insert(agg.period, agg.avg_value);
    }

    pivot
        .into_iter()
        .map(|((peg_name, dimensions, is_derived), periods)| ProcessedPeg {
            peg_name,
            dimensions,
            n_minus_1_value: periods.get(&Period::NMinus1).copied(),
            n_value: periods.get(&Period::N).copied(),
            is_derived,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn sample(peg_name: &str, value: f64, dims: Option<&str>) -> PegSample {
        PegSample {
            timestamp: TimeRange::parse("2025-01-01_00:00~2025-01-01_01:00", FixedOffset::east_opt(0).unwrap())
                .unwrap()
                .start,
            family_id: 1,
            peg_name: peg_name.to_string(),
            value,
            ne: None,
            swname: None,
            rel_ver: None,
            dimensions: dims.map(|s| s.to_string()),
        }
    }

    #[test]
    fn strips_only_cell_identity_token() {
        assert_eq!(strip_cell_identity(Some("CellIdentity=20,QCI=5")), Some("QCI=5".to_string()));
        assert_eq!(strip_cell_identity(Some("CellIdentity=20")), None);
        assert_eq!(strip_cell_identity(None), None);
    }

    #[test]
    fn aggregate_period_takes_mean_per_peg_and_dimension() {
        let samples = vec![
            sample("throughput", 100.0, None),
            sample("throughput", 200.0, None),
        ];
        let aggs = aggregate_period(&samples, Period::NMinus1);
        assert_eq!(aggs.len(), 1);
        assert!((aggs[0].avg_value - 150.0).abs() < 1e-9);
    }

    #[test]
    fn derived_peg_evaluates_from_base_aggregates() {
        let mut aggs = vec![
            AggregatedPEG {
                peg_name: "attempt".to_string(),
                period: Period::N,
                avg_value: 100.0,
                dimensions: None,
                is_derived: false,
                formula: None,
            },
            AggregatedPEG {
                peg_name: "response".to_string(),
                period: Period::N,
                avg_value: 95.0,
                dimensions: None,
                is_derived: false,
                formula: None,
            },
        ];
        let derived = vec![DerivedPegDefinition {
            output_peg: "success_rate".to_string(),
            formula: "response/attempt*100".to_string(),
            dependencies: ["response", "attempt"].into_iter().map(String::from).collect(),
        }];
        let mut raw_values = BTreeMap::new();
        evaluate_derived(&mut aggs, &derived, Period::N, &mut raw_values);
        let sr = aggs.iter().find(|a| a.peg_name == "success_rate").unwrap();
        assert!((sr.avg_value - 95.0).abs() < 1e-9);
        assert!(sr.is_derived);
    }

    #[test]
    fn undefined_identifier_omits_the_derived_peg_without_failing() {
        let mut aggs = vec![AggregatedPEG {
            peg_name: "attempt".to_string(),
            period: Period::N,
            avg_value: 100.0,
            dimensions: None,
            is_derived: false,
            formula: None,
        }];
        let derived = vec![DerivedPegDefinition {
            output_peg: "bad".to_string(),
            formula: "missing_var + 1".to_string(),
            dependencies: ["missing_var"].into_iter().map(String::from).collect(),
        }];
        let mut raw_values = BTreeMap::new();
        evaluate_derived(&mut aggs, &derived, Period::N, &mut raw_values);
        assert!(aggs.iter().all(|a| a.peg_name != "bad"));
    }
}
