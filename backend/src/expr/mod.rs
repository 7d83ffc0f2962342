//! Safe arithmetic expression engine for derived PEGs (C2, spec §4.2).

pub mod ast;
pub mod dag;
pub mod evaluator;
pub mod lexer;
pub mod parser;

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeSet, HashMap};

pub use ast::Expr;
pub use dag::{topological_order, CycleError};
pub use parser::ParseError;

static IDENTIFIER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"[A-Za-z_][A-Za-z0-9_.]*").unwrap());

/// Allowed formula characters (spec §4.9, reused by the request validator).
static ALLOWED_CHARS_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_+\-*/().\s]*$").unwrap());

pub fn has_only_allowed_characters(formula: &str) -> bool {
    ALLOWED_CHARS_RE.is_match(formula)
}

/// All identifier tokens referenced by a formula (spec §3
/// `DerivedPEGDefinition.dependencies`).
pub fn extract_dependencies(formula: &str) -> BTreeSet<String> {
    IDENTIFIER_RE.find_iter(formula).map(|m| m.as_str().to_string()).collect()
}

/// Parses and evaluates `formula` against `vars` in one step. Returns NaN
/// rather than an error for undefined identifiers or division by zero
/// (spec §4.2); only a genuinely malformed formula is a parse error.
pub fn evaluate_formula(formula: &str, vars: &HashMap<String, f64>) -> Result<f64, ParseError> {
    let expr = parser::parse(formula)?;
    Ok(evaluator::eval(&expr, vars))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_identifier_tokens_only() {
        let deps = extract_dependencies("response / attempt * 100");
        assert!(deps.contains("response"));
        assert!(deps.contains("attempt"));
        assert_eq!(deps.len(), 2);
    }

    #[test]
    fn rejects_formula_with_disallowed_characters() {
        assert!(!has_only_allowed_characters("a > b"));
        assert!(has_only_allowed_characters("(a + b) / 2.0"));
    }
}
