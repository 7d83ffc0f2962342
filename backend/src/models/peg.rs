//! PEG sample, aggregate, and derived-PEG types (spec §3).

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The comparison window a sample or aggregate belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, PartialOrd, Ord)]
pub enum Period {
    #[serde(rename = "N-1")]
    NMinus1,
    N,
}

impl Period {
    pub fn as_str(&self) -> &'static str {
        match self {
            Period::NMinus1 => "N-1",
            Period::N => "N",
        }
    }
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A raw counter row after JSONB expansion (C4's output row shape).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PegSample {
    pub timestamp: DateTime<FixedOffset>,
    pub family_id: i64,
    pub peg_name: String,
    pub value: f64,
    pub ne: Option<String>,
    pub swname: Option<String>,
    pub rel_ver: Option<String>,
    /// Canonical `K1=V1,K2=V2` dimension string, if any.
    pub dimensions: Option<String>,
}

/// A single-window mean of one PEG (base or derived), spec §3 `AggregatedPEG`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedPEG {
    pub peg_name: String,
    pub period: Period,
    pub avg_value: f64,
    pub dimensions: Option<String>,
    pub is_derived: bool,
    pub formula: Option<String>,
}

/// A formula-defined PEG: `output_peg = formula` over other PEG names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DerivedPegDefinition {
    pub output_peg: String,
    pub formula: String,
    pub dependencies: BTreeSet<String>,
}

/// Two-period comparison for one `(peg_name[, dimensions])` key.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessedPeg {
    pub peg_name: String,
    pub dimensions: Option<String>,
    pub n_minus_1_value: Option<f64>,
    pub n_value: Option<f64>,
    pub is_derived: bool,
}

impl ProcessedPeg {
    /// `n_value - n_minus_1_value`, null if either side is missing.
    pub fn absolute_change(&self) -> Option<f64> {
        match (self.n_minus_1_value, self.n_value) {
            (Some(n1), Some(n)) => Some(n - n1),
            _ => None,
        }
    }

    /// Percentage change with the load-bearing null policy (spec §3, §8 property 2-3):
    /// null whenever `n_minus_1_value` is zero or either side is missing — never 0, never ∞.
    pub fn percentage_change(&self) -> Option<f64> {
        match (self.n_minus_1_value, self.n_value) {
            (Some(n1), Some(n)) if n1 != 0.0 => Some((n - n1) / n1 * 100.0),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn peg(n1: Option<f64>, n: Option<f64>) -> ProcessedPeg {
        ProcessedPeg {
            peg_name: "throughput".to_string(),
            dimensions: None,
            n_minus_1_value: n1,
            n_value: n,
            is_derived: false,
        }
    }

    #[test]
    fn percentage_change_is_null_when_n_minus_1_is_zero() {
        let p = peg(Some(0.0), Some(230.0));
        assert_eq!(p.percentage_change(), None);
        assert_eq!(p.absolute_change(), Some(230.0));
    }

    #[test]
    fn percentage_change_is_null_when_either_side_missing() {
        assert_eq!(peg(None, Some(1.0)).percentage_change(), None);
        assert_eq!(peg(Some(1.0), None).percentage_change(), None);
    }

    #[test]
    fn percentage_change_matches_expected_scenario_one() {
        let p = peg(Some(150.0), Some(230.0));
        let pct = p.percentage_change().unwrap();
        assert!((pct - 53.333333333333336).abs() < 1e-9);
    }
}
