//! Parsed API document
//!
//! The engine's only input: an ordered catalog of named component schemas
//! plus the (possibly empty) list of operations that reference them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EmitError;
use crate::schema::{SchemaName, SchemaNode};

// =============================================================================
// HTTP Method
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HttpMethod {
    Get,
    Put,
    Post,
    Delete,
    Options,
    Head,
    Patch,
    Trace,
}

impl HttpMethod {
    pub const ALL: [HttpMethod; 8] = [
        Self::Get,
        Self::Put,
        Self::Post,
        Self::Delete,
        Self::Options,
        Self::Head,
        Self::Patch,
        Self::Trace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Put => "put",
            Self::Post => "post",
            Self::Delete => "delete",
            Self::Options => "options",
            Self::Head => "head",
            Self::Patch => "patch",
            Self::Trace => "trace",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str().to_uppercase())
    }
}

impl FromStr for HttpMethod {
    type Err = EmitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| EmitError::InvalidOption(format!("unknown HTTP method '{}'", s)))
    }
}

// =============================================================================
// Operations
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterLocation {
    Path,
    Query,
    Header,
    Cookie,
}

/// An operation parameter with its schema
#[derive(Debug, Clone, PartialEq)]
pub struct Parameter {
    pub name: String,
    pub location: ParameterLocation,
    pub schema: SchemaNode,
}

/// Response schemas for one status code (one per media type)
#[derive(Debug, Clone, PartialEq)]
pub struct Response {
    pub status: String,
    pub schemas: Vec<SchemaNode>,
}

/// One (path, method) operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub path: String,
    pub method: HttpMethod,
    pub operation_id: Option<String>,
    pub tags: Vec<String>,
    pub deprecated: bool,
    pub parameters: Vec<Parameter>,
    /// Request body schemas, one per media type
    pub request_bodies: Vec<SchemaNode>,
    pub responses: Vec<Response>,
}

impl Operation {
    pub fn new(method: HttpMethod, path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            method,
            operation_id: None,
            tags: Vec::new(),
            deprecated: false,
            parameters: Vec::new(),
            request_bodies: Vec::new(),
            responses: Vec::new(),
        }
    }

    pub fn with_operation_id(mut self, id: impl Into<String>) -> Self {
        self.operation_id = Some(id.into());
        self
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    pub fn deprecated(mut self) -> Self {
        self.deprecated = true;
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, location: ParameterLocation, schema: SchemaNode) -> Self {
        self.parameters.push(Parameter {
            name: name.into(),
            location,
            schema,
        });
        self
    }

    pub fn with_request_body(mut self, schema: SchemaNode) -> Self {
        self.request_bodies.push(schema);
        self
    }

    pub fn with_response(mut self, status: impl Into<String>, schema: SchemaNode) -> Self {
        let status = status.into();
        match self.responses.iter_mut().find(|r| r.status == status) {
            Some(existing) => existing.schemas.push(schema),
            None => self.responses.push(Response {
                status,
                schemas: vec![schema],
            }),
        }
        self
    }

    /// Schemas the caller supplies: parameters and request bodies
    pub fn input_schemas(&self) -> impl Iterator<Item = &SchemaNode> {
        self.parameters
            .iter()
            .map(|p| &p.schema)
            .chain(self.request_bodies.iter())
    }

    /// Schemas the server returns, across every status code
    pub fn output_schemas(&self) -> impl Iterator<Item = &SchemaNode> {
        self.responses.iter().flat_map(|r| r.schemas.iter())
    }

    /// `GET /pets/{id}`
    pub fn label(&self) -> String {
        format!("{} {}", self.method, self.path)
    }
}

// =============================================================================
// API Document
// =============================================================================

/// Ordered schema catalog plus operations
#[derive(Debug, Clone, Default)]
pub struct ApiDocument {
    /// Schemas in document order
    schemas: Vec<(SchemaName, SchemaNode)>,
    /// Index: name -> position in `schemas`
    by_name: HashMap<SchemaName, usize>,
    operations: Vec<Operation>,
    /// Content hash of the source file, when loaded from disk
    pub source_hash: Option<String>,
}

impl ApiDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a named schema. Replacement keeps the original position.
    pub fn insert_schema(&mut self, name: impl Into<SchemaName>, node: SchemaNode) {
        let name = name.into();
        if let Some(&idx) = self.by_name.get(&name) {
            self.schemas[idx].1 = node;
            return;
        }
        self.by_name.insert(name.clone(), self.schemas.len());
        self.schemas.push((name, node));
    }

    pub fn with_schema(mut self, name: impl Into<SchemaName>, node: SchemaNode) -> Self {
        self.insert_schema(name, node);
        self
    }

    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    pub fn with_operation(mut self, operation: Operation) -> Self {
        self.add_operation(operation);
        self
    }

    pub fn schema(&self, name: &str) -> Option<&SchemaNode> {
        self.by_name.get(name).map(|&idx| &self.schemas[idx].1)
    }

    pub fn contains_schema(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Schema names in document order
    pub fn schema_names(&self) -> impl Iterator<Item = &SchemaName> {
        self.schemas.iter().map(|(name, _)| name)
    }

    pub fn schemas(&self) -> impl Iterator<Item = (&SchemaName, &SchemaNode)> {
        self.schemas.iter().map(|(name, node)| (name, node))
    }

    pub fn schema_count(&self) -> usize {
        self.schemas.len()
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn has_operations(&self) -> bool {
        !self.operations.is_empty()
    }
}
