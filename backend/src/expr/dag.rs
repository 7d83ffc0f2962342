//! Dependency-order resolution for derived PEGs (spec §4.2), Kahn's
//! algorithm ported from `_resolve_dependency_order`: edges run
//! `dependency -> dependent`, counted only when the dependency is itself an
//! output PEG, with a FIFO queue for a stable, order-preserving result
//! (spec §5 "Kahn with stable queue").

use crate::models::peg::DerivedPegDefinition;
use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq)]
pub struct CycleError {
    pub circular_dependencies: Vec<String>,
}

/// Returns derived-PEG definitions ordered so that every dependency that is
/// itself a derived PEG precedes its dependent (spec §8 property 4).
pub fn topological_order(
    derived: &[DerivedPegDefinition],
) -> Result<Vec<DerivedPegDefinition>, CycleError> {
    let output_names: HashSet<&str> = derived.iter().map(|d| d.output_peg.as_str()).collect();

    let mut in_degree: HashMap<String, usize> =
        derived.iter().map(|d| (d.output_peg.clone(), 0)).collect();
    let mut adjacency: HashMap<String, Vec<String>> =
        derived.iter().map(|d| (d.output_peg.clone(), Vec::new())).collect();

    for def in derived {
        for dep in &def.dependencies {
            if output_names.contains(dep.as_str()) && dep != &def.output_peg {
                adjacency.get_mut(dep).unwrap().push(def.output_peg.clone());
                *in_degree.get_mut(&def.output_peg).unwrap() += 1;
            }
        }
    }

    let by_name: HashMap<&str, &DerivedPegDefinition> =
        derived.iter().map(|d| (d.output_peg.as_str(), d)).collect();

    let mut queue: VecDeque<String> = derived
        .iter()
        .filter(|d| in_degree[&d.output_peg] == 0)
        .map(|d| d.output_peg.clone())
        .collect();

    let mut ordered = Vec::with_capacity(derived.len());
    while let Some(name) = queue.pop_front() {
        ordered.push((*by_name[name.as_str()]).clone());
        if let Some(dependents) = adjacency.get(&name) {
            for dependent in dependents {
                let degree = in_degree.get_mut(dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent.clone());
                }
            }
        }
    }

    if ordered.len() != derived.len() {
        let resolved: HashSet<&str> = ordered.iter().map(|d| d.output_peg.as_str()).collect();
        let circular_dependencies = derived
            .iter()
            .map(|d| d.output_peg.clone())
            .filter(|name| !resolved.contains(name.as_str()))
            .collect();
        return Err(CycleError { circular_dependencies });
    }

    Ok(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn def(output: &str, deps: &[&str]) -> DerivedPegDefinition {
        DerivedPegDefinition {
            output_peg: output.to_string(),
            formula: String::new(),
            dependencies: deps.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
        }
    }

    #[test]
    fn orders_dependency_before_dependent() {
        let derived =
            vec![def("c", &["a", "b"]), def("a", &["x"]), def("b", &["a", "y"])];
        let ordered = topological_order(&derived).unwrap();
        let pos = |n: &str| ordered.iter().position(|d| d.output_peg == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn detects_two_node_cycle() {
        let derived = vec![def("A", &["B"]), def("B", &["A"])];
        let err = topological_order(&derived).unwrap_err();
        let mut names = err.circular_dependencies;
        names.sort();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn independent_derived_pegs_keep_stable_insertion_order() {
        let derived = vec![def("a", &["x"]), def("b", &["y"])];
        let ordered = topological_order(&derived).unwrap();
        assert_eq!(ordered[0].output_peg, "a");
        assert_eq!(ordered[1].output_peg, "b");
    }
}
