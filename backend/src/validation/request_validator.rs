//! Structural, type, and range validation of inbound requests, plus
//! alias/default normalization (C9, spec §4.9).
//!
//! Grounded on the original's `RequestValidator`: required-field checks,
//! scalar range checks, nested DB config checks, filter type checks, and
//! derived-PEG formula character checks all mirror its validation order.
//! Defaults are applied after validation, never before, matching the
//! original's `validate_request` pipeline.

use crate::expr::has_only_allowed_characters;
use crate::models::request::{AnalysisRequest, AnalysisType, RawAnalysisRequest, TableConfig};
use crate::time_range::TimeRange;
use crate::utils::error::AppError;
use chrono::FixedOffset;
use validator::Validate;

/// Validates and normalizes a raw request body into an [`AnalysisRequest`].
///
/// `tz` is used only for the cross-validation format/logic pre-check against
/// C1 (spec §4.9: "cross-validated with C1 but N-1 >= N start is only a
/// warning"); the orchestrator re-parses with the same timezone afterwards.
pub fn validate_request(raw: RawAnalysisRequest, tz: FixedOffset) -> Result<AnalysisRequest, AppError> {
    let n_minus_1 = raw.n_minus_1.clone().or_else(|| raw.n1.clone());
    let n = raw.n.clone();

    let mut missing = Vec::new();
    if !n_minus_1.as_deref().is_some_and(|s| !s.is_empty()) {
        missing.push("n_minus_1 (or n1)");
    }
    if !n.as_deref().is_some_and(|s| !s.is_empty()) {
        missing.push("n");
    }
    if !missing.is_empty() {
        return Err(AppError::Validation {
            message: format!("missing required fields: {}", missing.join(", ")),
            details: Some(serde_json::json!({ "missing_fields": missing })),
        });
    }
    let n_minus_1 = n_minus_1.unwrap();
    let n = n.unwrap();

    let max_prompt_tokens = raw.max_prompt_tokens.unwrap_or(8_000);

    let max_prompt_chars = raw.max_prompt_chars.unwrap_or(32_000);

    let analysis_type = match raw.analysis_type.as_deref() {
        None => AnalysisType::Enhanced,
        Some("enhanced") => AnalysisType::Enhanced,
        Some(other) => {
            return Err(AppError::validation(format!(
                "analysis_type must be 'enhanced', got '{other}'"
            )));
        },
    };

    let table = validate_table_config(&raw.table)?;

    for (peg_name, formula) in &raw.peg_definitions {
        if peg_name.trim().is_empty() {
            return Err(AppError::validation("derived PEG name must not be empty"));
        }
        if formula.trim().is_empty() {
            return Err(AppError::validation(format!("formula for derived PEG '{peg_name}' must not be empty")));
        }
        if !has_only_allowed_characters(formula) {
            return Err(AppError::Validation {
                message: format!("formula for derived PEG '{peg_name}' contains disallowed characters"),
                details: Some(serde_json::json!({ "peg_name": peg_name, "formula": formula })),
            });
        }
    }

    cross_validate_time_ranges(&n_minus_1, &n, tz)?;

    let mut filters = raw.filters;
    filters.normalize_aliases();

    let request = AnalysisRequest {
        n_minus_1,
        n,
        table,
        columns: raw.columns,
        filters,
        peg_filter_file: raw.peg_filter_file,
        peg_definitions: raw.peg_definitions,
        data_limit: raw.data_limit,
        analysis_type,
        enable_mock: raw.enable_mock,
        output_dir: raw.output_dir.unwrap_or_else(|| "output".to_string()),
        backend_url: raw.backend_url,
        use_choi: raw.use_choi,
        request_id: raw.request_id.unwrap_or_else(uuid::Uuid::new_v4),
        max_prompt_tokens,
        max_prompt_chars,
    };

    if max_prompt_chars == 0 {
        return Err(AppError::validation("max_prompt_chars must be a positive integer"));
    }
    request.validate().map_err(validation_errors_to_app_error)?;

    Ok(request)
}

/// Validates the nested `table` object: `host`/`dbname`/`table` required
/// non-empty strings, `port` in `[1, 65535]` when present (spec §4.9), via
/// `TableConfig`'s own `Validate` derive.
fn validate_table_config(value: &serde_json::Value) -> Result<TableConfig, AppError> {
    if !value.is_object() {
        return Err(AppError::Validation { message: "table must be an object".to_string(), details: None });
    }

    let table: TableConfig = serde_json::from_value(value.clone()).map_err(|err| AppError::Validation {
        message: format!("table is malformed: {err}"),
        details: None,
    })?;

    table.validate().map_err(validation_errors_to_app_error)?;
    Ok(table)
}

/// Flattens `validator::ValidationErrors` into a single `AppError::Validation`
/// carrying the offending field names (spec §4.9's structured `VALIDATION_ERROR`).
fn validation_errors_to_app_error(errors: validator::ValidationErrors) -> AppError {
    let fields: Vec<&str> = errors.field_errors().keys().copied().collect();
    AppError::Validation {
        message: format!("validation failed for fields: {}", fields.join(", ")),
        details: Some(serde_json::json!({ "fields": fields })),
    }
}

/// Format/logic pre-check against C1 (spec §4.9): malformed input is a hard
/// error; N-1 overlapping or starting after N is only a warning here — the
/// orchestrator's C6 stage re-checks and logs the same warning.
fn cross_validate_time_ranges(n_minus_1: &str, n: &str, tz: FixedOffset) -> Result<(), AppError> {
    let n1_range = TimeRange::parse(n_minus_1, tz)?;
    let n_range = TimeRange::parse(n, tz)?;

    if n1_range.end >= n_range.start {
        tracing::warn!(n_minus_1, n, "N-1 range ends at or after N starts");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::filter::FilterSet;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn utc() -> FixedOffset {
        FixedOffset::east_opt(0).unwrap()
    }

    fn base_raw() -> RawAnalysisRequest {
        RawAnalysisRequest {
            n_minus_1: Some("2025-01-01_00:00~2025-01-01_01:00".to_string()),
            n1: None,
            n: Some("2025-01-01_01:00~2025-01-01_02:00".to_string()),
            table: json!({ "host": "db1", "dbname": "peg", "table": "summary", "port": 5432 }),
            columns: BTreeMap::new(),
            filters: FilterSet::default(),
            peg_filter_file: None,
            peg_definitions: BTreeMap::new(),
            data_limit: None,
            analysis_type: None,
            enable_mock: false,
            output_dir: None,
            backend_url: None,
            use_choi: false,
            request_id: None,
            max_prompt_tokens: None,
            max_prompt_chars: None,
        }
    }

    #[test]
    fn accepts_n1_alias_for_n_minus_1() {
        let mut raw = base_raw();
        raw.n_minus_1 = None;
        raw.n1 = Some("2025-01-01_00:00~2025-01-01_01:00".to_string());
        let req = validate_request(raw, utc()).unwrap();
        assert_eq!(req.n_minus_1, "2025-01-01_00:00~2025-01-01_01:00");
    }

    #[test]
    fn rejects_missing_required_fields() {
        let mut raw = base_raw();
        raw.n_minus_1 = None;
        raw.n1 = None;
        let err = validate_request(raw, utc()).unwrap_err();
        assert!(matches!(err, AppError::Validation { .. }));
    }

    #[test]
    fn rejects_max_prompt_tokens_over_ceiling() {
        let mut raw = base_raw();
        raw.max_prompt_tokens = Some(60_000);
        assert!(validate_request(raw, utc()).is_err());
    }

    #[test]
    fn rejects_table_without_dbname() {
        let mut raw = base_raw();
        raw.table = json!({ "host": "db1", "table": "summary" });
        assert!(validate_request(raw, utc()).is_err());
    }

    #[test]
    fn rejects_table_port_out_of_range() {
        let mut raw = base_raw();
        raw.table = json!({ "host": "db1", "dbname": "peg", "table": "summary", "port": 70000 });
        assert!(validate_request(raw, utc()).is_err());
    }

    #[test]
    fn rejects_derived_formula_with_disallowed_characters() {
        let mut raw = base_raw();
        raw.peg_definitions.insert("bad".to_string(), "import os".to_string());
        assert!(validate_request(raw, utc()).is_err());
    }

    #[test]
    fn accepts_well_formed_derived_formula() {
        let mut raw = base_raw();
        raw.peg_definitions.insert("success_rate".to_string(), "response / attempt * 100".to_string());
        assert!(validate_request(raw, utc()).is_ok());
    }

    #[test]
    fn overlapping_time_ranges_are_a_warning_not_an_error() {
        let mut raw = base_raw();
        raw.n_minus_1 = Some("2025-01-01_00:00~2025-01-01_03:00".to_string());
        raw.n = Some("2025-01-01_01:00~2025-01-01_02:00".to_string());
        assert!(validate_request(raw, utc()).is_ok());
    }

    #[test]
    fn malformed_time_range_is_a_hard_error() {
        let mut raw = base_raw();
        raw.n = Some("not-a-time-range".to_string());
        let err = validate_request(raw, utc()).unwrap_err();
        assert!(matches!(err, AppError::TimeParsing { .. }));
    }

    #[test]
    fn cell_filter_alias_normalizes_to_cellid() {
        let mut raw = base_raw();
        raw.filters.dimensions.insert("cell".to_string(), crate::models::filter::FilterValue::Single("20".to_string()));
        let req = validate_request(raw, utc()).unwrap();
        assert!(req.filters.cellid.is_some());
    }
}
