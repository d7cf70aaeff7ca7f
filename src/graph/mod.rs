//! Schema Dependency Graph
//!
//! Primary data structure using petgraph for `Ref` dependencies between
//! named schemas. Direct dependency lists are kept alongside the petgraph
//! structure so traversal order follows document order.
//!
//! Consumers:
//! - Cycle detection (`cycles`)
//! - Closure expansion (`closure`) for filtering and usage classification
//! - Emission planning (`crate::plan`)

pub mod closure;
pub mod cycles;
pub mod extract;

pub use closure::expand_closure;
pub use cycles::{detect_cycles, CircularSet, CycleGroup};
pub use extract::{
    direct_refs, format_field_path, ref_occurrences, FieldPath, FieldPathSegment, RefOccurrence,
};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

use crate::document::ApiDocument;
use crate::error::{EmitError, Result};
use crate::schema::{SchemaName, SchemaNode};

/// Where the first reference from one schema to another was found
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    /// The schema itself is a bare `$ref`
    Ref,
    /// allOf composition
    AllOf,
    /// oneOf union variant
    OneOf,
    /// anyOf union option
    AnyOf,
    /// items array element type
    Items,
    /// prefixItems tuple slot
    PrefixItems,
    /// additionalProperties map value type
    AdditionalProperties,
    /// Property field type
    Property,
    /// not
    Not,
    /// if / then / else
    Conditional,
}

impl EdgeKind {
    fn from_path(path: &FieldPath) -> Self {
        match path.first() {
            None => Self::Ref,
            Some(FieldPathSegment::Field(_)) => Self::Property,
            Some(FieldPathSegment::Index(_)) => Self::PrefixItems,
            Some(FieldPathSegment::MapValue) => Self::AdditionalProperties,
            Some(FieldPathSegment::AllOf(_)) => Self::AllOf,
            Some(FieldPathSegment::OneOf(_)) => Self::OneOf,
            Some(FieldPathSegment::AnyOf(_)) => Self::AnyOf,
            Some(FieldPathSegment::ArrayItems) => Self::Items,
            Some(FieldPathSegment::Not) => Self::Not,
            Some(FieldPathSegment::If | FieldPathSegment::Then | FieldPathSegment::Else) => {
                Self::Conditional
            }
        }
    }
}

/// The schema dependency graph
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    /// Petgraph structure - may contain cycles and self-loops
    pub(crate) graph: DiGraph<SchemaName, EdgeKind>,

    /// Node index lookup: name -> NodeIndex
    pub(crate) node_indices: HashMap<SchemaName, NodeIndex>,

    /// Names in document order
    names: Vec<SchemaName>,

    /// Direct dependencies per name, deduplicated, in first-seen order
    deps: HashMap<SchemaName, Vec<SchemaName>>,
}

impl DependencyGraph {
    /// Build the graph for every named schema of a document.
    ///
    /// Every name gets an entry, including names with no dependencies.
    pub fn build(doc: &ApiDocument) -> Self {
        let mut graph = Self::default();
        for name in doc.schema_names() {
            graph.add_node(name);
        }
        for (name, node) in doc.schemas() {
            graph.add_schema_edges(name, node);
        }
        debug!(
            schemas = graph.len(),
            edges = graph.edge_count(),
            "built dependency graph"
        );
        graph
    }

    /// Build from explicit adjacency lists (targets may be unknown names)
    pub fn from_dependencies<I, N, D>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, D)>,
        N: Into<SchemaName>,
        D: IntoIterator,
        D::Item: Into<SchemaName>,
    {
        let entries: Vec<(SchemaName, Vec<SchemaName>)> = entries
            .into_iter()
            .map(|(n, d)| (n.into(), d.into_iter().map(Into::into).collect()))
            .collect();

        let mut graph = Self::default();
        for (name, _) in &entries {
            graph.add_node(name);
        }
        for (name, targets) in entries {
            for target in targets {
                graph.add_edge(&name, target, EdgeKind::Ref);
            }
        }
        graph
    }

    fn add_node(&mut self, name: &str) {
        if self.node_indices.contains_key(name) {
            return;
        }
        let idx = self.graph.add_node(name.to_string());
        self.node_indices.insert(name.to_string(), idx);
        self.names.push(name.to_string());
        self.deps.insert(name.to_string(), Vec::new());
    }

    fn add_schema_edges(&mut self, name: &str, node: &SchemaNode) {
        for occurrence in ref_occurrences(node) {
            let kind = EdgeKind::from_path(&occurrence.path);
            self.add_edge(name, occurrence.target, kind);
        }
    }

    fn add_edge(&mut self, from: &str, to: SchemaName, kind: EdgeKind) {
        let deps = self.deps.entry(from.to_string()).or_default();
        if deps.contains(&to) {
            return;
        }
        if let (Some(&from_idx), Some(&to_idx)) =
            (self.node_indices.get(from), self.node_indices.get(&to))
        {
            self.graph.add_edge(from_idx, to_idx, kind);
        }
        deps.push(to);
    }

    // ========== Public API ==========

    /// Get schema count
    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Get edge count (edges between known schemas only)
    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.node_indices.contains_key(name)
    }

    /// Names in document order
    pub fn names(&self) -> &[SchemaName] {
        &self.names
    }

    /// Direct dependencies (dependency order follows the schema body)
    pub fn dependencies(&self, name: &str) -> &[SchemaName] {
        self.deps.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Every (from, to) edge, in document order
    pub fn edges(&self) -> impl Iterator<Item = (&SchemaName, &SchemaName)> {
        self.names
            .iter()
            .flat_map(move |from| self.dependencies(from).iter().map(move |to| (from, to)))
    }

    /// Immediate incoming refs (dependents)
    pub fn dependents(&self, name: &str) -> Vec<&SchemaName> {
        let Some(&node_idx) = self.node_indices.get(name) else {
            return Vec::new();
        };

        let mut result: Vec<&SchemaName> = self
            .graph
            .edges_directed(node_idx, Direction::Incoming)
            .filter_map(|e| self.graph.node_weight(e.source()))
            .collect();
        result.sort();
        result
    }

    /// Kind of the edge `from -> to`, if both are known schemas
    pub fn edge_kind(&self, from: &str, to: &str) -> Option<EdgeKind> {
        let from_idx = *self.node_indices.get(from)?;
        let to_idx = *self.node_indices.get(to)?;
        self.graph
            .find_edge(from_idx, to_idx)
            .and_then(|e| self.graph.edge_weight(e))
            .copied()
    }

    /// Export the dependency graph to GraphViz DOT format
    pub fn to_dot(&self, circular: &CircularSet) -> String {
        let mut output = String::new();

        output.push_str("digraph SchemaGraph {\n");
        output.push_str("  rankdir=LR;\n");
        output.push_str("  node [shape=box, style=\"filled,rounded\", fontname=\"Helvetica\", fontsize=10];\n");
        output.push_str("  edge [fontname=\"Helvetica\", fontsize=8, fontcolor=\"#808080\"];\n");
        output.push('\n');

        for name in &self.names {
            let color = if circular.contains(name) { "#F44336" } else { "#9E9E9E" };
            output.push_str(&format!(
                "  \"{}\" [label=\"{}\", fillcolor=\"{}\"];\n",
                dot_id(name),
                name,
                color
            ));
        }

        output.push('\n');

        for edge in self.graph.edge_references() {
            if let (Some(source), Some(target)) = (
                self.graph.node_weight(edge.source()),
                self.graph.node_weight(edge.target()),
            ) {
                output.push_str(&format!(
                    "  \"{}\" -> \"{}\" [label=\"{:?}\"];\n",
                    dot_id(source),
                    dot_id(target),
                    edge.weight()
                ));
            }
        }

        output.push_str("}\n");
        output
    }
}

fn dot_id(name: &str) -> String {
    name.replace(['/', '.', '-', '"'], "_")
}

// =============================================================================
// Reference Validation
// =============================================================================

/// Check that every `Ref` in the document names an existing schema.
///
/// Reports the first unresolved reference with the referencing schema (or
/// operation) and the field path inside it.
pub fn validate_references(doc: &ApiDocument) -> Result<()> {
    for (name, node) in doc.schemas() {
        check_node(doc, name, node)?;
    }

    for operation in doc.operations() {
        for (i, body) in operation.request_bodies.iter().enumerate() {
            check_node(doc, &format!("{} requestBody[{}]", operation.label(), i), body)?;
        }
        for parameter in &operation.parameters {
            check_node(
                doc,
                &format!("{} parameter '{}'", operation.label(), parameter.name),
                &parameter.schema,
            )?;
        }
        for response in &operation.responses {
            for schema in &response.schemas {
                check_node(
                    doc,
                    &format!("{} response {}", operation.label(), response.status),
                    schema,
                )?;
            }
        }
    }

    Ok(())
}

fn check_node(doc: &ApiDocument, owner: &str, node: &SchemaNode) -> Result<()> {
    match ref_occurrences(node)
        .into_iter()
        .find(|occ| !doc.contains_schema(&occ.target))
    {
        Some(missing) => Err(EmitError::UnresolvedRef {
            name: missing.target,
            schema: owner.to_string(),
            path: format_field_path(&missing.path),
        }),
        None => Ok(()),
    }
}
