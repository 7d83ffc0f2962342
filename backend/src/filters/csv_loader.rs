//! CSV-based PEG filter and derived-PEG definition loader (C3, spec §4.3).
//!
//! Columns: `family_id`, `peg_name`, optional `define` (`OUTPUT = FORMULA`).
//! Missing file, empty file, and malformed rows are warnings, never errors —
//! the loader always returns *some* (possibly empty) pair of products.

use crate::models::peg::DerivedPegDefinition;
use std::collections::{BTreeSet, HashMap};
use std::path::Path;

pub type FamilyFilter = HashMap<i64, BTreeSet<String>>;

#[derive(Debug, Clone, Default)]
pub struct LoadedFilters {
    pub filter: FamilyFilter,
    pub derived: Vec<DerivedPegDefinition>,
}

/// Loads `file_path`; never fails — logs a warning and returns empty
/// products for a missing file, an unreadable file, or a malformed row.
pub fn load_peg_definitions_from_csv(file_path: &str) -> LoadedFilters {
    let path = Path::new(file_path);
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(err) => {
            tracing::warn!(file_path, %err, "CSV filter file not found, proceeding with empty config");
            return LoadedFilters::default();
        },
    };

    let mut lines = content.lines();
    let header = match lines.next() {
        Some(h) => h,
        None => {
            tracing::warn!(file_path, "CSV filter file is empty");
            return LoadedFilters::default();
        },
    };

    let columns: Vec<String> = split_csv_line(header).into_iter().map(|c| c.trim().to_string()).collect();
    let family_idx = columns.iter().position(|c| c == "family_id");
    let peg_name_idx = columns.iter().position(|c| c == "peg_name");
    let define_idx = columns.iter().position(|c| c == "define");

    let mut filter: FamilyFilter = HashMap::new();
    let mut derived = Vec::new();

    for (line_no, line) in lines.enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let fields = split_csv_line(line);
        let field = |idx: Option<usize>| -> String {
            idx.and_then(|i| fields.get(i)).map(|s| s.trim().to_string()).unwrap_or_default()
        };

        let define_formula = field(define_idx);
        if !define_formula.is_empty() {
            match parse_define(&define_formula) {
                Some((output_peg, formula)) => {
                    let dependencies = crate::expr::extract_dependencies(&formula);
                    derived.push(DerivedPegDefinition { output_peg, formula, dependencies });
                },
                None => {
                    tracing::warn!(
                        file_path,
                        line = line_no + 2,
                        define_formula,
                        "malformed define column, ignoring row"
                    );
                },
            }
            continue;
        }

        let family_val = field(family_idx);
        let peg_name = field(peg_name_idx);
        if family_val.is_empty() || peg_name.is_empty() {
            continue;
        }
        match family_val.parse::<i64>() {
            Ok(family_key) => {
                filter.entry(family_key).or_default().insert(peg_name);
            },
            Err(_) => {
                tracing::warn!(
                    file_path,
                    line = line_no + 2,
                    family_val,
                    "family_id is not an integer, ignoring row"
                );
            },
        }
    }

    LoadedFilters { filter, derived }
}

fn parse_define(define_formula: &str) -> Option<(String, String)> {
    let idx = define_formula.find('=')?;
    let (left, right) = define_formula.split_at(idx);
    let output_peg = left.trim().to_string();
    let formula = right[1..].trim().to_string();
    if output_peg.is_empty() || formula.is_empty() {
        return None;
    }
    Some((output_peg, formula))
}

/// Splits one CSV line on commas, honoring double-quoted fields (which may
/// themselves contain commas or escaped `""` quotes). No full RFC 4180
/// support is needed here since field values are plain identifiers/formulas.
fn split_csv_line(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut chars = line.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '"' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            },
            '"' => in_quotes = !in_quotes,
            ',' if !in_quotes => {
                fields.push(std::mem::take(&mut current));
            },
            other => current.push(other),
        }
    }
    fields.push(current);
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_temp_csv(contents: &str) -> String {
        let mut path = std::env::temp_dir();
        path.push(format!("peg_insight_test_{:p}.csv", contents.as_ptr()));
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(contents.as_bytes()).unwrap();
        path.to_string_lossy().to_string()
    }

    #[test]
    fn missing_file_returns_empty_products() {
        let loaded = load_peg_definitions_from_csv("/nonexistent/path/filters.csv");
        assert!(loaded.filter.is_empty());
        assert!(loaded.derived.is_empty());
    }

    #[test]
    fn loads_filter_rows_and_derived_rows() {
        let path = write_temp_csv(
            "family_id,peg_name,define\n5002,throughput,\n,,success_rate = response / attempt * 100\n",
        );
        let loaded = load_peg_definitions_from_csv(&path);
        assert_eq!(loaded.filter.get(&5002).unwrap().iter().next().unwrap(), "throughput");
        assert_eq!(loaded.derived.len(), 1);
        assert_eq!(loaded.derived[0].output_peg, "success_rate");
        assert!(loaded.derived[0].dependencies.contains("response"));
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn malformed_define_row_is_skipped_not_fatal() {
        let path = write_temp_csv("family_id,peg_name,define\n,,not_an_assignment\n");
        let loaded = load_peg_definitions_from_csv(&path);
        assert!(loaded.derived.is_empty());
        std::fs::remove_file(path).ok();
    }

    #[test]
    fn non_integer_family_id_is_skipped_not_fatal() {
        let path = write_temp_csv("family_id,peg_name,define\nabc,throughput,\n");
        let loaded = load_peg_definitions_from_csv(&path);
        assert!(loaded.filter.is_empty());
        std::fs::remove_file(path).ok();
    }
}
