//! Emission Order Planning
//!
//! Orders schemas so that, wherever possible, a schema is emitted after
//! everything it references. The plan has three consecutive regions:
//!
//! 1. `Sorted` - DFS post-order of schemas with no circular dependency
//! 2. `Circular` - cycle members plus anything depending on one
//! 3. `Alias` - `allOf: [$ref]` aliases, always last
//!
//! Every edge whose target does not come strictly earlier is flagged as
//! needing a forward reference, so emitters never inspect the graph again.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::debug;

use crate::document::ApiDocument;
use crate::graph::{CircularSet, DependencyGraph};
use crate::schema::SchemaName;

/// Region of the plan a schema was placed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmissionBucket {
    Sorted,
    Circular,
    Alias,
}

impl fmt::Display for EmissionBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Sorted => "sorted",
            Self::Circular => "circular",
            Self::Alias => "alias",
        };
        write!(f, "{}", s)
    }
}

/// One outgoing reference of a planned schema
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannedReference {
    pub target: SchemaName,
    /// Target is not yet nameable where the referencing schema is emitted
    pub forward: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanEntry {
    pub name: SchemaName,
    pub bucket: EmissionBucket,
    pub references: Vec<PlannedReference>,
}

impl PlanEntry {
    pub fn has_forward_references(&self) -> bool {
        self.references.iter().any(|r| r.forward)
    }
}

/// Ordered emission plan with per-edge forward-reference flags
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EmissionPlan {
    entries: Vec<PlanEntry>,
    positions: HashMap<SchemaName, usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VisitState {
    Visiting,
    Done,
}

/// One schema on the explicit DFS stack
struct Frame<'a> {
    name: &'a str,
    /// Index of the next dependency to look at
    next: usize,
    depends_on_circular: bool,
}

/// DFS state for one planning run
struct Planner<'a> {
    doc: &'a ApiDocument,
    graph: &'a DependencyGraph,
    circular: &'a CircularSet,
    subset: Option<&'a BTreeSet<SchemaName>>,
    state: HashMap<&'a str, VisitState>,
    sorted: Vec<&'a str>,
    deferred: Vec<&'a str>,
    aliases: Vec<&'a str>,
    buckets: HashMap<&'a str, EmissionBucket>,
}

impl<'a> Planner<'a> {
    fn in_scope(&self, name: &str) -> bool {
        self.doc.contains_schema(name) && self.subset.map_or(true, |s| s.contains(name))
    }

    /// Whether an already-seen name makes its referrer circular
    fn seen_as_circular(&self, name: &str) -> Option<bool> {
        match self.state.get(name)? {
            VisitState::Visiting => Some(self.circular.contains(name)),
            VisitState::Done => Some(self.buckets.get(name) == Some(&EmissionBucket::Circular)),
        }
    }

    /// Place an alias, or open a frame for anything else
    fn enter(&mut self, name: &'a str) -> Option<Frame<'a>> {
        if self.doc.schema(name).map_or(false, |node| node.is_alias()) {
            self.state.insert(name, VisitState::Done);
            self.buckets.insert(name, EmissionBucket::Alias);
            self.aliases.push(name);
            return None;
        }
        self.state.insert(name, VisitState::Visiting);
        Some(Frame {
            name,
            next: 0,
            depends_on_circular: false,
        })
    }

    /// Close a frame; returns true if it landed in the circular bucket
    fn finish(&mut self, frame: Frame<'a>) -> bool {
        let name = frame.name;
        self.state.insert(name, VisitState::Done);
        if self.circular.contains(name) || frame.depends_on_circular {
            self.buckets.insert(name, EmissionBucket::Circular);
            self.deferred.push(name);
            true
        } else {
            self.buckets.insert(name, EmissionBucket::Sorted);
            self.sorted.push(name);
            false
        }
    }

    /// Depth-first walk from `root` with an explicit stack.
    ///
    /// Dependencies are taken in body order and every schema is placed in
    /// post-order, after all of its in-scope dependencies.
    fn visit(&mut self, root: &'a str) {
        if self.state.contains_key(root) {
            return;
        }
        let graph = self.graph;
        let mut stack: Vec<Frame<'a>> = self.enter(root).into_iter().collect();

        while let Some(frame) = stack.last_mut() {
            let Some(dep) = graph.dependencies(frame.name).get(frame.next) else {
                if let Some(done) = stack.pop() {
                    if self.finish(done) {
                        if let Some(parent) = stack.last_mut() {
                            parent.depends_on_circular = true;
                        }
                    }
                }
                continue;
            };
            frame.next += 1;

            if !self.in_scope(dep) {
                continue;
            }
            match self.seen_as_circular(dep) {
                Some(true) => frame.depends_on_circular = true,
                Some(false) => {}
                None => {
                    if let Some(child) = self.enter(dep) {
                        stack.push(child);
                    }
                }
            }
        }
    }
}

impl EmissionPlan {
    /// Plan the emission order.
    ///
    /// With `subset`, only those names are planned and references leaving
    /// the subset are dropped; otherwise every schema of the document is.
    pub fn build(
        doc: &ApiDocument,
        graph: &DependencyGraph,
        circular: &CircularSet,
        subset: Option<&BTreeSet<SchemaName>>,
    ) -> Self {
        let mut planner = Planner {
            doc,
            graph,
            circular,
            subset,
            state: HashMap::new(),
            sorted: Vec::new(),
            deferred: Vec::new(),
            aliases: Vec::new(),
            buckets: HashMap::new(),
        };

        for name in doc.schema_names() {
            if planner.in_scope(name) {
                planner.visit(name);
            }
        }

        let order: Vec<&str> = planner
            .sorted
            .iter()
            .chain(planner.deferred.iter())
            .chain(planner.aliases.iter())
            .copied()
            .collect();

        let positions: HashMap<SchemaName, usize> = order
            .iter()
            .enumerate()
            .map(|(i, name)| (name.to_string(), i))
            .collect();

        let entries = order
            .iter()
            .map(|&name| {
                let own = positions[name];
                let references = graph
                    .dependencies(name)
                    .iter()
                    .filter_map(|dep| {
                        positions.get(dep).map(|&target| PlannedReference {
                            target: dep.clone(),
                            forward: target >= own,
                        })
                    })
                    .collect();
                PlanEntry {
                    name: name.to_string(),
                    bucket: planner.buckets[name],
                    references,
                }
            })
            .collect();

        debug!(
            sorted = planner.sorted.len(),
            circular = planner.deferred.len(),
            aliases = planner.aliases.len(),
            "planned emission order"
        );

        Self { entries, positions }
    }

    /// Names in emission order
    pub fn names(&self) -> impl Iterator<Item = &SchemaName> {
        self.entries.iter().map(|e| &e.name)
    }

    pub fn entries(&self) -> &[PlanEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, PlanEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.positions.contains_key(name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    pub fn entry(&self, name: &str) -> Option<&PlanEntry> {
        self.position(name).map(|i| &self.entries[i])
    }

    pub fn bucket(&self, name: &str) -> Option<EmissionBucket> {
        self.entry(name).map(|e| e.bucket)
    }

    /// Whether the reference `from -> to` must be rendered forward-safe.
    ///
    /// False for pairs that are not a planned edge.
    pub fn needs_forward_reference(&self, from: &str, to: &str) -> bool {
        self.entry(from)
            .and_then(|e| e.references.iter().find(|r| r.target == to))
            .map_or(false, |r| r.forward)
    }

    /// Names of one bucket, in emission order
    pub fn bucket_names(&self, bucket: EmissionBucket) -> Vec<&SchemaName> {
        self.entries
            .iter()
            .filter(|e| e.bucket == bucket)
            .map(|e| &e.name)
            .collect()
    }
}

impl<'a> IntoIterator for &'a EmissionPlan {
    type Item = &'a PlanEntry;
    type IntoIter = std::slice::Iter<'a, PlanEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}
