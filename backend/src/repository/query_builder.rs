//! Dynamic JSONB-expansion SQL builder (C4, spec §4.4).
//!
//! Builds the three-layer `jsonb_each`/`jsonb_each_text` lateral expansion
//! over the dimensions JSONB column, with every value bound as a parameter —
//! never concatenated into the query text (spec §8 property 5, §9 "load-bearing").

use crate::filters::FamilyFilter;
use crate::time_range::TimeRange;
use chrono::{DateTime, FixedOffset};
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
pub enum BoundParam {
    Text(String),
    TextArray(Vec<String>),
    Int(i64),
    Timestamp(DateTime<FixedOffset>),
}

#[derive(Debug, Default)]
pub struct QueryBuilderInput {
    /// Logical filter key ("ne", "swname", "rel_ver", "host") -> db column name.
    pub columns: BTreeMap<String, String>,
    /// Logical filter key -> requested values (non-dimension column filters).
    pub column_values: BTreeMap<String, Vec<String>>,
    /// `(index_name, values)` pairs, e.g. `("CellIdentity", ["20","21"])`.
    pub dimension_filters: Vec<(String, Vec<String>)>,
    pub csv_filter: FamilyFilter,
    pub data_limit: Option<i64>,
}

struct ParamSink {
    params: Vec<BoundParam>,
}

impl ParamSink {
    fn push(&mut self, p: BoundParam) -> String {
        self.params.push(p);
        format!("${}", self.params.len())
    }
}

/// Builds `(sql, bound_params)` for the given table and inputs.
pub fn build_peg_query(
    table: &str,
    time_range: &TimeRange,
    input: &QueryBuilderInput,
) -> (String, Vec<BoundParam>) {
    let mut sink = ParamSink { params: Vec::new() };
    let mut clauses: Vec<String> = Vec::new();

    let start_ph = sink.push(BoundParam::Timestamp(time_range.start));
    let end_ph = sink.push(BoundParam::Timestamp(time_range.end));
    clauses.push(format!("t.time BETWEEN {start_ph} AND {end_ph}"));

    clauses.push("metric.key <> 'index_name'".to_string());
    clauses.push(
        "metric.value ~ '^-?[0-9]+(\\.[0-9]+)?([eE][+-]?[0-9]+)?$'".to_string(),
    );

    if !input.dimension_filters.is_empty() {
        let mut mentioned_names = Vec::new();
        let mut or_parts = Vec::new();
        for (index_name, values) in &input.dimension_filters {
            let name_ph = sink.push(BoundParam::Text(index_name.clone()));
            let values_ph = sink.push(BoundParam::TextArray(values.clone()));
            or_parts.push(format!(
                "(t.values->>'index_name' = {name_ph} AND idx.key = ANY({values_ph}))"
            ));
            mentioned_names.push(index_name.clone());
        }
        let names_ph = sink.push(BoundParam::TextArray(mentioned_names));
        or_parts.push(format!(
            "(t.values->>'index_name' IS NULL OR t.values->>'index_name' <> ALL({names_ph}))"
        ));
        clauses.push(format!("({})", or_parts.join(" OR ")));
    }

    for (key, db_col) in &input.columns {
        let Some(values) = input.column_values.get(key) else { continue };
        if values.is_empty() {
            continue;
        }
        if values.len() == 1 {
            let ph = sink.push(BoundParam::Text(values[0].clone()));
            clauses.push(format!("t.{db_col} = {ph}"));
        } else {
            let ph = sink.push(BoundParam::TextArray(values.clone()));
            clauses.push(format!("t.{db_col} = ANY({ph})"));
        }
    }

    if !input.csv_filter.is_empty() {
        let mut or_parts = Vec::new();
        for (family_id, peg_names) in &input.csv_filter {
            let family_ph = sink.push(BoundParam::Int(*family_id));
            let names: Vec<String> = peg_names.iter().cloned().collect();
            let names_ph = sink.push(BoundParam::TextArray(names));
            or_parts.push(format!("(t.family_id = {family_ph} AND metric.key = ANY({names_ph}))"));
        }
        clauses.push(format!("({})", or_parts.join(" OR ")));
    }

    let where_clause = clauses.join("\n  AND ");

    let mut sql = format!(
        "SELECT\n  \
         CASE WHEN jsonb_typeof(idx.val) = 'object' \
         THEN metric.key || '[' || idx.key || ']' ELSE metric.key END AS peg_name,\n  \
         NULLIF(regexp_replace(metric.value, '[^0-9.\\-eE]', '', 'g'), '')::numeric AS value,\n  \
         t.values->>'index_name' AS index_name,\n  \
         idx.key AS dimension_value,\n  \
         jsonb_typeof(idx.val) AS dimension_kind,\n  \
         t.time AS \"timestamp\",\n  \
         t.family_id AS family_id,\n  \
         t.ne_key AS ne,\n  \
         t.swname AS swname,\n  \
         t.rel_ver AS rel_ver\n\
         FROM {table} t\n\
         CROSS JOIN LATERAL jsonb_each(t.values) AS idx(key, val)\n\
         CROSS JOIN LATERAL jsonb_each_text(\n  \
         CASE WHEN jsonb_typeof(idx.val) = 'object' THEN idx.val ELSE jsonb_build_object(idx.key, idx.val) END\n\
         ) AS metric(key, value)\n\
         WHERE {where_clause}\n\
         ORDER BY t.time"
    );

    if let Some(limit) = input.data_limit {
        let ph = sink.push(BoundParam::Int(limit));
        sql.push_str(&format!("\nLIMIT {ph}"));
    }

    (sql, sink.params)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn sample_range() -> TimeRange {
        TimeRange::parse("2025-01-01_00:00~2025-01-01_01:00", FixedOffset::east_opt(0).unwrap())
            .unwrap()
    }

    #[test]
    fn injects_no_literal_filter_values_into_sql_text() {
        let input = QueryBuilderInput {
            dimension_filters: vec![("CellIdentity".to_string(), vec!["'; DROP TABLE t; --".to_string()])],
            ..Default::default()
        };
        let (sql, params) = build_peg_query("peg_counters", &sample_range(), &input);
        assert!(!sql.contains("DROP TABLE"));
        assert!(params.iter().any(|p| matches!(p, BoundParam::TextArray(v) if v.iter().any(|s| s.contains("DROP TABLE")))));
    }

    #[test]
    fn others_clause_is_present_when_dimension_filters_exist() {
        let input = QueryBuilderInput {
            dimension_filters: vec![("CellIdentity".to_string(), vec!["20".to_string()])],
            ..Default::default()
        };
        let (sql, _params) = build_peg_query("peg_counters", &sample_range(), &input);
        assert!(sql.contains("IS NULL OR"));
    }

    #[test]
    fn omits_others_clause_when_no_dimension_filters_requested() {
        let input = QueryBuilderInput::default();
        let (sql, _params) = build_peg_query("peg_counters", &sample_range(), &input);
        assert!(!sql.contains("IS NULL OR"));
    }
}
