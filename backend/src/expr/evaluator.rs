//! Evaluates an [`Expr`] over a `name -> f64` variable map (spec §4.2).
//!
//! Division by zero yields NaN, never a panic. An undefined identifier also
//! yields NaN — the caller (C6) is responsible for dropping the dependent
//! derived PEG and logging, not this function.

use super::ast::{BinOp, Expr, UnOp};
use std::collections::HashMap;

pub fn eval(expr: &Expr, vars: &HashMap<String, f64>) -> f64 {
    match expr {
        Expr::Num(n) => *n,
        Expr::Var(name) => vars.get(name).copied().unwrap_or(f64::NAN),
        Expr::Unary(op, inner) => {
            let v = eval(inner, vars);
            match op {
                UnOp::Neg => -v,
                UnOp::Pos => v,
            }
        },
        Expr::Binary(op, lhs, rhs) => {
            let l = eval(lhs, vars);
            let r = eval(rhs, vars);
            match op {
                BinOp::Add => l + r,
                BinOp::Sub => l - r,
                BinOp::Mul => l * r,
                BinOp::Div => {
                    if r == 0.0 {
                        f64::NAN
                    } else {
                        l / r
                    }
                },
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::parser::parse;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    #[test]
    fn division_by_zero_is_nan_not_panic() {
        let e = parse("a / b").unwrap();
        let v = eval(&e, &vars(&[("a", 1.0), ("b", 0.0)]));
        assert!(v.is_nan(), "1.0/0.0 is +Infinity under IEEE754; eval must force NaN explicitly");
    }

    #[test]
    fn negative_numerator_over_zero_is_also_nan() {
        let e = parse("a / b").unwrap();
        let v = eval(&e, &vars(&[("a", -1.0), ("b", 0.0)]));
        assert!(v.is_nan());
    }

    #[test]
    fn undefined_identifier_is_nan() {
        let e = parse("a + 1").unwrap();
        let v = eval(&e, &vars(&[]));
        assert!(v.is_nan());
    }

    #[test]
    fn success_rate_scenario_matches_expected_value() {
        let e = parse("response/attempt*100").unwrap();
        let v = eval(&e, &vars(&[("response", 92.5), ("attempt", 100.0)]));
        assert!((v - 92.5).abs() < 1e-9);
    }
}
