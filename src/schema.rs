//! Schema model
//!
//! A schema is an explicit sum type with one variant per composition
//! operator. Only `Ref` carries a cross-schema edge; every other variant
//! nests further nodes structurally.

use serde_json::Value;

/// Name of a component schema (case-sensitive, unique within a document)
pub type SchemaName = String;

// =============================================================================
// Schema Node
// =============================================================================

/// One schema node
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaNode {
    /// Reference to a named component schema
    Ref(SchemaName),
    /// Closed set of literal values
    Enum(Vec<Value>),
    /// Single literal value
    Const(Value),
    /// Object with ordered properties
    Object(ObjectSchema),
    /// Array or tuple
    Array(ArraySchema),
    AllOf(Vec<SchemaNode>),
    OneOf(Vec<SchemaNode>),
    AnyOf(Vec<SchemaNode>),
    Not(Box<SchemaNode>),
    /// `if` / `then` / `else`
    Conditional(Box<ConditionalSchema>),
    /// Scalar type with its validation constraints
    Primitive(PrimitiveKind, Constraints),
}

/// A named object property
#[derive(Debug, Clone, PartialEq)]
pub struct Property {
    pub name: String,
    pub schema: SchemaNode,
    pub required: bool,
    /// Marked `readOnly`: only ever sent by the server
    pub read_only: bool,
    /// Marked `writeOnly`: only ever sent by the client
    pub write_only: bool,
}

impl Property {
    pub fn new(name: impl Into<String>, schema: SchemaNode) -> Self {
        Self {
            name: name.into(),
            schema,
            required: false,
            read_only: false,
            write_only: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    pub fn write_only(mut self) -> Self {
        self.write_only = true;
        self
    }
}

/// `additionalProperties` is either a boolean switch or a value schema
#[derive(Debug, Clone, PartialEq)]
pub enum AdditionalProperties {
    Allowed(bool),
    Schema(Box<SchemaNode>),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: Vec<Property>,
    pub additional_properties: Option<AdditionalProperties>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArraySchema {
    /// Element schema; `None` for pure tuples or untyped arrays
    pub items: Option<Box<SchemaNode>>,
    pub prefix_items: Vec<SchemaNode>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalSchema {
    pub if_schema: SchemaNode,
    pub then_schema: Option<SchemaNode>,
    pub else_schema: Option<SchemaNode>,
}

/// Scalar type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    String,
    Number,
    Integer,
    Boolean,
    Null,
    /// No `type` keyword at all
    Any,
}

impl PrimitiveKind {
    pub fn from_type_name(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }
}

/// Validation keywords of a primitive. Never carries schema edges.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Constraints {
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub min_length: Option<u64>,
    pub max_length: Option<u64>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
    pub multiple_of: Option<f64>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

// =============================================================================
// Constructors
// =============================================================================

impl SchemaNode {
    pub fn reference(name: impl Into<SchemaName>) -> Self {
        Self::Ref(name.into())
    }

    pub fn primitive(kind: PrimitiveKind) -> Self {
        Self::Primitive(kind, Constraints::default())
    }

    pub fn string() -> Self {
        Self::primitive(PrimitiveKind::String)
    }

    pub fn object(properties: Vec<Property>) -> Self {
        Self::Object(ObjectSchema {
            properties,
            additional_properties: None,
        })
    }

    pub fn array_of(items: SchemaNode) -> Self {
        Self::Array(ArraySchema {
            items: Some(Box::new(items)),
            prefix_items: Vec::new(),
        })
    }

    /// `AllOf([Ref(target)])`, the canonical alias shape
    pub fn alias_of(target: impl Into<SchemaName>) -> Self {
        Self::AllOf(vec![Self::reference(target)])
    }

    /// Wrap in `AnyOf([self, null])`
    pub fn nullable(self) -> Self {
        Self::AnyOf(vec![self, Self::primitive(PrimitiveKind::Null)])
    }
}

// =============================================================================
// Alias Recognition
// =============================================================================

impl SchemaNode {
    /// Target of a pure alias.
    ///
    /// A node is an alias iff it is exactly `AllOf([Ref(target)])`. Anything
    /// attached beside the reference (properties, constraints, nullability)
    /// is normalised into extra composition members by the loader, so the
    /// single-member check is sufficient.
    pub fn alias_target(&self) -> Option<&str> {
        match self {
            Self::AllOf(members) => match members.as_slice() {
                [Self::Ref(target)] => Some(target),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn is_alias(&self) -> bool {
        self.alias_target().is_some()
    }

    /// Directly nested schema nodes, in keyword order
    pub fn children(&self) -> Vec<&SchemaNode> {
        match self {
            Self::Ref(_) | Self::Enum(_) | Self::Const(_) | Self::Primitive(..) => Vec::new(),
            Self::Object(object) => {
                let mut children: Vec<&SchemaNode> =
                    object.properties.iter().map(|p| &p.schema).collect();
                if let Some(AdditionalProperties::Schema(value)) = &object.additional_properties {
                    children.push(value.as_ref());
                }
                children
            }
            Self::Array(array) => array
                .items
                .as_deref()
                .into_iter()
                .chain(array.prefix_items.iter())
                .collect(),
            Self::AllOf(members) | Self::OneOf(members) | Self::AnyOf(members) => {
                members.iter().collect()
            }
            Self::Not(inner) => vec![inner.as_ref()],
            Self::Conditional(cond) => std::iter::once(&cond.if_schema)
                .chain(cond.then_schema.as_ref())
                .chain(cond.else_schema.as_ref())
                .collect(),
        }
    }

    /// Every `format` keyword in this node's body, first-seen order, no repeats.
    /// Referenced schemas are not followed.
    pub fn string_formats(&self) -> Vec<&str> {
        let mut formats: Vec<&str> = Vec::new();
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            if let Self::Primitive(_, constraints) = node {
                if let Some(format) = constraints.format.as_deref() {
                    if !formats.contains(&format) {
                        formats.push(format);
                    }
                }
            }
            stack.extend(node.children().into_iter().rev());
        }
        formats
    }

    /// Short human-readable label of the variant
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Ref(_) => "ref",
            Self::Enum(_) => "enum",
            Self::Const(_) => "const",
            Self::Object(_) => "object",
            Self::Array(_) => "array",
            Self::AllOf(_) => "allOf",
            Self::OneOf(_) => "oneOf",
            Self::AnyOf(_) => "anyOf",
            Self::Not(_) => "not",
            Self::Conditional(_) => "conditional",
            Self::Primitive(..) => "primitive",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alias_of_single_ref() {
        let node = SchemaNode::alias_of("Pet");
        assert_eq!(node.alias_target(), Some("Pet"));
    }

    #[test]
    fn test_allof_with_extra_member_is_not_alias() {
        let node = SchemaNode::AllOf(vec![
            SchemaNode::reference("Pet"),
            SchemaNode::object(vec![Property::new("extra", SchemaNode::string())]),
        ]);
        assert!(!node.is_alias());
    }

    #[test]
    fn test_bare_ref_is_not_alias() {
        assert!(!SchemaNode::reference("Pet").is_alias());
    }

    #[test]
    fn test_nullable_alias_is_not_alias() {
        assert!(!SchemaNode::alias_of("Pet").nullable().is_alias());
    }

    #[test]
    fn test_string_formats_in_body_order() {
        let email = SchemaNode::Primitive(
            PrimitiveKind::String,
            Constraints {
                format: Some("email".into()),
                ..Constraints::default()
            },
        );
        let uuid = SchemaNode::Primitive(
            PrimitiveKind::String,
            Constraints {
                format: Some("uuid".into()),
                ..Constraints::default()
            },
        );
        let node = SchemaNode::object(vec![
            Property::new("id", uuid),
            Property::new("contacts", SchemaNode::array_of(email.clone())),
            Property::new("backup", email.nullable()),
            Property::new("owner", SchemaNode::reference("User")),
        ]);
        assert_eq!(node.string_formats(), vec!["uuid", "email"]);
    }

    #[test]
    fn test_primitive_kind_from_type_name() {
        assert_eq!(PrimitiveKind::from_type_name("integer"), Some(PrimitiveKind::Integer));
        assert_eq!(PrimitiveKind::from_type_name("object"), None);
    }
}
