//! Transitive Closure
//!
//! Worklist expansion of a seed set over the dependency graph. Shared by
//! operation-filter reachability and usage classification.

use std::collections::{BTreeSet, HashSet};

use super::DependencyGraph;
use crate::schema::SchemaName;

/// Expand `seeds` to the fixed point of "add every direct dependency".
///
/// Seeds are always part of the result, known to the graph or not. Each name
/// is processed at most once, so the walk terminates on cyclic graphs.
pub fn expand_closure<I, S>(seeds: I, graph: &DependencyGraph) -> BTreeSet<SchemaName>
where
    I: IntoIterator<Item = S>,
    S: Into<SchemaName>,
{
    let mut result: BTreeSet<SchemaName> = BTreeSet::new();
    let mut processed: HashSet<SchemaName> = HashSet::new();
    let mut worklist: Vec<SchemaName> = Vec::new();

    for seed in seeds {
        let seed = seed.into();
        if result.insert(seed.clone()) {
            worklist.push(seed);
        }
    }

    while let Some(name) = worklist.pop() {
        if !processed.insert(name.clone()) {
            continue;
        }
        for dep in graph.dependencies(&name) {
            if result.insert(dep.clone()) {
                worklist.push(dep.clone());
            }
        }
    }

    result
}
