//! Cycle Detection
//!
//! Finds every schema that participates in at least one reference cycle,
//! using Kosaraju's SCC algorithm over the petgraph structure. The walk is
//! iterative, so chain depth is bounded by memory rather than stack size.
//!
//! A schema is circular iff it sits in a strongly connected component with
//! more than one member, or it references itself directly.

use petgraph::algo::kosaraju_scc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use super::DependencyGraph;
use crate::schema::SchemaName;

/// One group of mutually reachable schemas
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleGroup {
    /// Members in document order
    pub members: Vec<SchemaName>,
    /// Single schema that references itself
    pub is_self_referential: bool,
}

/// Every schema that can reach itself through one or more edges
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CircularSet {
    members: BTreeSet<SchemaName>,
    groups: Vec<CycleGroup>,
}

impl CircularSet {
    pub fn contains(&self, name: &str) -> bool {
        self.members.contains(name)
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Members, sorted by name
    pub fn iter(&self) -> impl Iterator<Item = &SchemaName> {
        self.members.iter()
    }

    /// Cycle groups, ordered by their first member's document position
    pub fn groups(&self) -> &[CycleGroup] {
        &self.groups
    }
}

/// Detect every circular schema in the graph
pub fn detect_cycles(graph: &DependencyGraph) -> CircularSet {
    let positions: HashMap<&str, usize> = graph
        .names()
        .iter()
        .enumerate()
        .map(|(i, name)| (name.as_str(), i))
        .collect();
    let position = |name: &str| positions.get(name).copied().unwrap_or(usize::MAX);

    let mut groups = Vec::new();
    for scc in kosaraju_scc(&graph.graph) {
        let is_cycle = match scc.as_slice() {
            [single] => graph.graph.contains_edge(*single, *single),
            _ => true,
        };
        if !is_cycle {
            continue;
        }

        let mut members: Vec<SchemaName> = scc
            .iter()
            .filter_map(|idx| graph.graph.node_weight(*idx).cloned())
            .collect();
        members.sort_by_key(|m| position(m));

        groups.push(CycleGroup {
            is_self_referential: members.len() == 1,
            members,
        });
    }
    groups.sort_by_key(|g| g.members.first().map(|m| position(m)).unwrap_or(usize::MAX));

    let members: BTreeSet<SchemaName> = groups
        .iter()
        .flat_map(|g| g.members.iter().cloned())
        .collect();

    debug!(circular = members.len(), groups = groups.len(), "detected cycles");

    CircularSet { members, groups }
}
