//! Filter types accepted on an analysis request (spec §3 `FilterSet`, §4.4, §4.9).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A filter value: either a single scalar or a list of scalars, always
/// normalized to a list by the time the repository consumes it (spec §4.9:
/// "filter value types (string or list of primitives)").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(String),
    Many(Vec<String>),
}

impl FilterValue {
    pub fn into_values(self) -> Vec<String> {
        match self {
            FilterValue::Single(s) => vec![s],
            FilterValue::Many(v) => v,
        }
    }

    pub fn as_values(&self) -> Vec<String> {
        match self {
            FilterValue::Single(s) => vec![s.clone()],
            FilterValue::Many(v) => v.clone(),
        }
    }
}

/// Known dimension index names (spec §4.4, SPEC_FULL §B.4 — the authoritative
/// alias table from the original's `dimension_alias_map`, not illustrative).
pub fn dimension_alias(key: &str) -> Option<&'static str> {
    match key {
        "cellid" => Some("CellIdentity"),
        "qci" => Some("QCI"),
        "bpu_id" => Some("BPU_ID"),
        _ => None,
    }
}

/// Network-element / cell / software-version / dimension filters.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct FilterSet {
    pub ne: Option<FilterValue>,
    pub cellid: Option<FilterValue>,
    pub swname: Option<FilterValue>,
    pub rel_ver: Option<FilterValue>,
    pub host: Option<FilterValue>,
    /// Extra dimension filters keyed by alias (e.g. `"qci"`), beyond the
    /// fixed fields above.
    #[serde(flatten)]
    pub dimensions: BTreeMap<String, FilterValue>,
}

impl FilterSet {
    /// Normalizes the `cell` alias to `cellid` (spec §4.9).
    pub fn normalize_aliases(&mut self) {
        if self.cellid.is_none() {
            if let Some(v) = self.dimensions.remove("cell") {
                self.cellid = Some(v);
            }
        }
    }

    /// All dimension filters (cellid plus free-form ones) as
    /// `(index_name, values)` pairs, resolved through the alias table.
    pub fn dimension_filters(&self) -> Vec<(String, Vec<String>)> {
        let mut out = Vec::new();
        if let Some(v) = &self.cellid {
            out.push(("CellIdentity".to_string(), v.as_values()));
        }
        for (key, val) in &self.dimensions {
            if let Some(index_name) = dimension_alias(key) {
                out.push((index_name.to_string(), val.as_values()));
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_alias_normalizes_to_cellid() {
        let mut fs = FilterSet::default();
        fs.dimensions.insert("cell".to_string(), FilterValue::Single("20".to_string()));
        fs.normalize_aliases();
        assert!(fs.cellid.is_some());
        assert!(!fs.dimensions.contains_key("cell"));
    }

    #[test]
    fn dimension_alias_table_is_fixed() {
        assert_eq!(dimension_alias("cellid"), Some("CellIdentity"));
        assert_eq!(dimension_alias("qci"), Some("QCI"));
        assert_eq!(dimension_alias("bpu_id"), Some("BPU_ID"));
        assert_eq!(dimension_alias("unknown_dim"), None);
    }
}
