//! Usage Context Classification
//!
//! Buckets every schema by whether callers send it, servers return it, or both.
//!
//! Seeds come from the operations that survived filtering: parameter and
//! request-body references feed the input side, response references feed
//! the output side. Both seed sets are closed over the dependency graph.
//! Members of a cycle are always forced to `Both`.
//!
//! With no operation seeds at all, classification falls back to `readOnly` /
//! `writeOnly` property markers.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::fmt;
use tracing::{debug, warn};

use crate::document::{ApiDocument, Operation};
use crate::graph::{direct_refs, expand_closure, CircularSet, DependencyGraph};
use crate::schema::{SchemaName, SchemaNode};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageContext {
    Input,
    Output,
    Both,
    Unused,
}

impl UsageContext {
    fn from_membership(input: bool, output: bool) -> Self {
        match (input, output) {
            (true, true) => Self::Both,
            (true, false) => Self::Input,
            (false, true) => Self::Output,
            (false, false) => Self::Unused,
        }
    }
}

impl fmt::Display for UsageContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Output => "output",
            Self::Both => "both",
            Self::Unused => "unused",
        };
        write!(f, "{}", s)
    }
}

/// What the classification was derived from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClassificationSource {
    Operations,
    Structural,
}

/// Per-schema usage contexts for one job
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UsageClassification {
    contexts: HashMap<SchemaName, UsageContext>,
    source: ClassificationSource,
}

impl UsageClassification {
    /// Context of a schema; unknown names are `Unused`
    pub fn get(&self, name: &str) -> UsageContext {
        self.contexts.get(name).copied().unwrap_or(UsageContext::Unused)
    }

    pub fn source(&self) -> ClassificationSource {
        self.source
    }

    pub fn len(&self) -> usize {
        self.contexts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contexts.is_empty()
    }

    /// Count of schemas per context
    pub fn counts(&self) -> HashMap<UsageContext, usize> {
        let mut counts = HashMap::new();
        for context in self.contexts.values() {
            *counts.entry(*context).or_insert(0) += 1;
        }
        counts
    }
}

/// Schema names referenced directly from operation inputs and outputs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationSeeds {
    pub input: BTreeSet<SchemaName>,
    pub output: BTreeSet<SchemaName>,
}

impl OperationSeeds {
    pub fn collect<'a, I>(operations: I) -> Self
    where
        I: IntoIterator<Item = &'a Operation>,
    {
        let mut seeds = Self::default();
        for operation in operations {
            for schema in operation.input_schemas() {
                seeds.input.extend(direct_refs(schema));
            }
            for schema in operation.output_schemas() {
                seeds.output.extend(direct_refs(schema));
            }
        }
        seeds
    }

    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    /// Every seeded name, input and output together
    pub fn all(&self) -> impl Iterator<Item = &SchemaName> {
        self.input.union(&self.output)
    }
}

/// Classify every schema of the document.
///
/// `operations` are the operations that survived filtering.
pub fn classify_usage(
    doc: &ApiDocument,
    graph: &DependencyGraph,
    circular: &CircularSet,
    operations: &[&Operation],
) -> UsageClassification {
    let seeds = OperationSeeds::collect(operations.iter().copied());

    let (mut contexts, source) = if seeds.is_empty() {
        if doc.has_operations() {
            warn!("no schemas reachable from operations; classifying by readOnly/writeOnly markers");
        }
        (classify_structurally(doc), ClassificationSource::Structural)
    } else {
        let input = expand_closure(seeds.input.iter().cloned(), graph);
        let output = expand_closure(seeds.output.iter().cloned(), graph);
        let contexts = doc
            .schema_names()
            .map(|name| {
                let context =
                    UsageContext::from_membership(input.contains(name), output.contains(name));
                (name.clone(), context)
            })
            .collect();
        (contexts, ClassificationSource::Operations)
    };

    for name in circular.iter() {
        if let Some(context) = contexts.get_mut(name) {
            *context = UsageContext::Both;
        }
    }

    debug!(schemas = contexts.len(), ?source, "classified usage");

    UsageClassification { contexts, source }
}

fn classify_structurally(doc: &ApiDocument) -> HashMap<SchemaName, UsageContext> {
    doc.schemas()
        .map(|(name, node)| {
            let markers = AccessMarkers::of(node);
            let context = match (markers.read_only > 0, markers.write_only > 0) {
                (true, false) => UsageContext::Output,
                (false, true) => UsageContext::Input,
                _ => UsageContext::Unused,
            };
            (name.clone(), context)
        })
        .collect()
}

/// readOnly / writeOnly property counts of a schema's own body
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct AccessMarkers {
    read_only: usize,
    write_only: usize,
}

impl AccessMarkers {
    /// Counts markers on the schema's own properties, including inline
    /// composition members. Referenced schemas are not followed.
    fn of(node: &SchemaNode) -> Self {
        let mut markers = Self::default();
        markers.scan(node);
        markers
    }

    fn scan(&mut self, node: &SchemaNode) {
        match node {
            SchemaNode::Object(object) => {
                for property in &object.properties {
                    if property.read_only {
                        self.read_only += 1;
                    }
                    if property.write_only {
                        self.write_only += 1;
                    }
                }
            }
            SchemaNode::AllOf(members) | SchemaNode::OneOf(members) | SchemaNode::AnyOf(members) => {
                for member in members {
                    self.scan(member);
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::HttpMethod;
    use crate::graph::detect_cycles;
    use crate::schema::Property;

    fn classify(doc: &ApiDocument) -> UsageClassification {
        let graph = DependencyGraph::build(doc);
        let circular = detect_cycles(&graph);
        let ops: Vec<&Operation> = doc.operations().iter().collect();
        classify_usage(doc, &graph, &circular, &ops)
    }

    fn doc() -> ApiDocument {
        ApiDocument::new()
            .with_schema("NewPet", SchemaNode::object(vec![Property::new("name", SchemaNode::string())]))
            .with_schema(
                "Pet",
                SchemaNode::object(vec![Property::new("category", SchemaNode::reference("Category"))]),
            )
            .with_schema("Category", SchemaNode::string())
            .with_schema("Error", SchemaNode::string())
            .with_schema("Orphan", SchemaNode::string())
            .with_operation(
                Operation::new(HttpMethod::Post, "/pets")
                    .with_request_body(SchemaNode::reference("NewPet"))
                    .with_response("201", SchemaNode::reference("Pet"))
                    .with_response("400", SchemaNode::reference("Error")),
            )
            .with_operation(
                Operation::new(HttpMethod::Put, "/pets/{id}")
                    .with_request_body(SchemaNode::reference("Pet"))
                    .with_response("200", SchemaNode::reference("Pet")),
            )
    }

    #[test]
    fn test_operation_classification() {
        let usage = classify(&doc());
        assert_eq!(usage.source(), ClassificationSource::Operations);
        assert_eq!(usage.get("NewPet"), UsageContext::Input);
        assert_eq!(usage.get("Pet"), UsageContext::Both);
        assert_eq!(usage.get("Category"), UsageContext::Both);
        assert_eq!(usage.get("Error"), UsageContext::Output);
        assert_eq!(usage.get("Orphan"), UsageContext::Unused);
    }

    #[test]
    fn test_circular_forced_to_both() {
        let doc = ApiDocument::new()
            .with_schema("A", SchemaNode::object(vec![Property::new("b", SchemaNode::reference("B"))]))
            .with_schema("B", SchemaNode::object(vec![Property::new("a", SchemaNode::reference("A"))]))
            .with_operation(
                Operation::new(HttpMethod::Post, "/a").with_request_body(SchemaNode::reference("A")),
            );
        let usage = classify(&doc);
        assert_eq!(usage.get("A"), UsageContext::Both);
        assert_eq!(usage.get("B"), UsageContext::Both);
    }

    #[test]
    fn test_parameters_seed_input() {
        let doc = ApiDocument::new()
            .with_schema("PetId", SchemaNode::string())
            .with_operation(Operation::new(HttpMethod::Get, "/pets/{id}").with_parameter(
                "id",
                crate::document::ParameterLocation::Path,
                SchemaNode::reference("PetId"),
            ));
        assert_eq!(classify(&doc).get("PetId"), UsageContext::Input);
    }

    #[test]
    fn test_structural_fallback() {
        let doc = ApiDocument::new()
            .with_schema(
                "Audit",
                SchemaNode::object(vec![
                    Property::new("id", SchemaNode::string()).read_only(),
                    Property::new("at", SchemaNode::string()).read_only(),
                ]),
            )
            .with_schema(
                "Credentials",
                SchemaNode::object(vec![Property::new("password", SchemaNode::string()).write_only()]),
            )
            .with_schema(
                "Mixed",
                SchemaNode::AllOf(vec![
                    SchemaNode::object(vec![Property::new("id", SchemaNode::string()).read_only()]),
                    SchemaNode::object(vec![Property::new("secret", SchemaNode::string()).write_only()]),
                ]),
            )
            .with_schema("Plain", SchemaNode::object(vec![Property::new("x", SchemaNode::string())]));

        let usage = classify(&doc);
        assert_eq!(usage.source(), ClassificationSource::Structural);
        assert_eq!(usage.get("Audit"), UsageContext::Output);
        assert_eq!(usage.get("Credentials"), UsageContext::Input);
        assert_eq!(usage.get("Mixed"), UsageContext::Unused);
        assert_eq!(usage.get("Plain"), UsageContext::Unused);
    }

    #[test]
    fn test_structural_fallback_still_forces_cycles() {
        let doc = ApiDocument::new().with_schema(
            "Tree",
            SchemaNode::object(vec![
                Property::new("id", SchemaNode::string()).read_only(),
                Property::new("children", SchemaNode::array_of(SchemaNode::reference("Tree"))),
            ]),
        );
        assert_eq!(classify(&doc).get("Tree"), UsageContext::Both);
    }

    #[test]
    fn test_counts() {
        let counts = classify(&doc()).counts();
        assert_eq!(counts.get(&UsageContext::Both), Some(&2));
        assert_eq!(counts.get(&UsageContext::Unused), Some(&1));
    }
}
