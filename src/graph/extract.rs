//! Schema Reference Extraction
//!
//! Walks one schema node and reports every `Ref` it contains, without
//! crossing into the referenced schemas. Each occurrence carries the field
//! path where it was found so unresolved references can be reported precisely.

use std::fmt;

use crate::schema::{AdditionalProperties, SchemaName, SchemaNode};

// =============================================================================
// Field Path Segment
// =============================================================================

/// A segment in a field path, identifying where a reference sits inside a schema
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FieldPathSegment {
    /// A named property of an object
    Field(String),
    /// A positional `prefixItems` entry
    Index(usize),
    /// The value type in a map (additionalProperties)
    MapValue,
    /// An allOf member (index into allOf array)
    AllOf(usize),
    /// A oneOf variant (index into oneOf array)
    OneOf(usize),
    /// An anyOf variant (index into anyOf array)
    AnyOf(usize),
    /// Array items type
    ArrayItems,
    Not,
    If,
    Then,
    Else,
}

impl fmt::Display for FieldPathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Field(name) => write!(f, ".{}", name),
            Self::Index(i) => write!(f, "[{}]", i),
            Self::MapValue => write!(f, "[*]"),
            Self::AllOf(i) => write!(f, "<allOf:{}>", i),
            Self::OneOf(i) => write!(f, "<oneOf:{}>", i),
            Self::AnyOf(i) => write!(f, "<anyOf:{}>", i),
            Self::ArrayItems => write!(f, "[]"),
            Self::Not => write!(f, "<not>"),
            Self::If => write!(f, "<if>"),
            Self::Then => write!(f, "<then>"),
            Self::Else => write!(f, "<else>"),
        }
    }
}

/// Full path from schema root to a nested node
pub type FieldPath = Vec<FieldPathSegment>;

/// Format a field path as a string
pub fn format_field_path(path: &FieldPath) -> String {
    if path.is_empty() {
        return String::from("<root>");
    }
    path.iter().map(|s| s.to_string()).collect::<String>()
}

/// One reference found inside a schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefOccurrence {
    pub target: SchemaName,
    pub path: FieldPath,
}

// =============================================================================
// Extraction
// =============================================================================

/// Direct references of a node, deduplicated, in first-seen order
pub fn direct_refs(node: &SchemaNode) -> Vec<SchemaName> {
    let mut refs: Vec<SchemaName> = Vec::new();
    walk(node, &mut Vec::new(), &mut |target, _| {
        if !refs.iter().any(|r| r == target) {
            refs.push(target.to_string());
        }
    });
    refs
}

/// Every reference occurrence of a node with its field path
pub fn ref_occurrences(node: &SchemaNode) -> Vec<RefOccurrence> {
    let mut found = Vec::new();
    walk(node, &mut Vec::new(), &mut |target, path| {
        found.push(RefOccurrence {
            target: target.to_string(),
            path: path.clone(),
        });
    });
    found
}

fn walk<F>(node: &SchemaNode, path: &mut FieldPath, visit: &mut F)
where
    F: FnMut(&str, &FieldPath),
{
    match node {
        SchemaNode::Ref(target) => visit(target, path),
        SchemaNode::Enum(_) | SchemaNode::Const(_) | SchemaNode::Primitive(..) => {}
        SchemaNode::Object(object) => {
            for property in &object.properties {
                path.push(FieldPathSegment::Field(property.name.clone()));
                walk(&property.schema, path, visit);
                path.pop();
            }
            if let Some(AdditionalProperties::Schema(value)) = &object.additional_properties {
                path.push(FieldPathSegment::MapValue);
                walk(value, path, visit);
                path.pop();
            }
        }
        SchemaNode::Array(array) => {
            if let Some(items) = &array.items {
                path.push(FieldPathSegment::ArrayItems);
                walk(items, path, visit);
                path.pop();
            }
            for (i, item) in array.prefix_items.iter().enumerate() {
                path.push(FieldPathSegment::Index(i));
                walk(item, path, visit);
                path.pop();
            }
        }
        SchemaNode::AllOf(members) => walk_members(members, FieldPathSegment::AllOf, path, visit),
        SchemaNode::OneOf(members) => walk_members(members, FieldPathSegment::OneOf, path, visit),
        SchemaNode::AnyOf(members) => walk_members(members, FieldPathSegment::AnyOf, path, visit),
        SchemaNode::Not(inner) => {
            path.push(FieldPathSegment::Not);
            walk(inner, path, visit);
            path.pop();
        }
        SchemaNode::Conditional(cond) => {
            path.push(FieldPathSegment::If);
            walk(&cond.if_schema, path, visit);
            path.pop();
            if let Some(then_schema) = &cond.then_schema {
                path.push(FieldPathSegment::Then);
                walk(then_schema, path, visit);
                path.pop();
            }
            if let Some(else_schema) = &cond.else_schema {
                path.push(FieldPathSegment::Else);
                walk(else_schema, path, visit);
                path.pop();
            }
        }
    }
}

fn walk_members<F>(
    members: &[SchemaNode],
    segment: fn(usize) -> FieldPathSegment,
    path: &mut FieldPath,
    visit: &mut F,
) where
    F: FnMut(&str, &FieldPath),
{
    for (i, member) in members.iter().enumerate() {
        path.push(segment(i));
        walk(member, path, visit);
        path.pop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{ArraySchema, ConditionalSchema, ObjectSchema, Property};

    #[test]
    fn test_field_path_segment_display() {
        assert_eq!(FieldPathSegment::Field("name".into()).to_string(), ".name");
        assert_eq!(FieldPathSegment::Index(0).to_string(), "[0]");
        assert_eq!(FieldPathSegment::MapValue.to_string(), "[*]");
        assert_eq!(FieldPathSegment::AllOf(1).to_string(), "<allOf:1>");
        assert_eq!(FieldPathSegment::ArrayItems.to_string(), "[]");
    }

    #[test]
    fn test_format_field_path() {
        let path = vec![
            FieldPathSegment::Field("children".into()),
            FieldPathSegment::ArrayItems,
        ];
        assert_eq!(format_field_path(&path), ".children[]");
        assert_eq!(format_field_path(&Vec::new()), "<root>");
    }

    #[test]
    fn test_refs_from_every_structural_slot() {
        let node = SchemaNode::AllOf(vec![
            SchemaNode::reference("Base"),
            SchemaNode::Object(ObjectSchema {
                properties: vec![
                    Property::new("owner", SchemaNode::reference("User")),
                    Property::new("tags", SchemaNode::array_of(SchemaNode::reference("Tag"))),
                ],
                additional_properties: Some(AdditionalProperties::Schema(Box::new(
                    SchemaNode::reference("Extra"),
                ))),
            }),
            SchemaNode::Array(ArraySchema {
                items: None,
                prefix_items: vec![SchemaNode::reference("First")],
            }),
            SchemaNode::Not(Box::new(SchemaNode::reference("Forbidden"))),
            SchemaNode::Conditional(Box::new(ConditionalSchema {
                if_schema: SchemaNode::reference("Cond"),
                then_schema: Some(SchemaNode::reference("Then")),
                else_schema: Some(SchemaNode::OneOf(vec![SchemaNode::reference("Else")])),
            })),
            SchemaNode::AnyOf(vec![SchemaNode::reference("Any")]),
        ]);

        assert_eq!(
            direct_refs(&node),
            vec!["Base", "User", "Tag", "Extra", "First", "Forbidden", "Cond", "Then", "Else", "Any"]
        );
    }

    #[test]
    fn test_refs_are_deduplicated() {
        let node = SchemaNode::object(vec![
            Property::new("a", SchemaNode::reference("User")),
            Property::new("b", SchemaNode::reference("User")),
        ]);
        assert_eq!(direct_refs(&node), vec!["User"]);
        assert_eq!(ref_occurrences(&node).len(), 2);
    }

    #[test]
    fn test_boolean_additional_properties_ignored() {
        let node = SchemaNode::Object(ObjectSchema {
            properties: Vec::new(),
            additional_properties: Some(AdditionalProperties::Allowed(true)),
        });
        assert!(direct_refs(&node).is_empty());
    }

    #[test]
    fn test_occurrence_paths() {
        let node = SchemaNode::object(vec![Property::new(
            "children",
            SchemaNode::array_of(SchemaNode::reference("Node")),
        )]);
        let found = ref_occurrences(&node);
        assert_eq!(found.len(), 1);
        assert_eq!(format_field_path(&found[0].path), ".children[]");
    }
}
