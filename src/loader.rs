//! Document Loading
//!
//! Reads an OpenAPI-style JSON or YAML file into an [`ApiDocument`].
//!
//! - `components.schemas` becomes the named catalog, in file order
//! - `#/components/schemas/<Name>` references become `SchemaNode::Ref`
//! - parameter, requestBody and response component references are inlined
//!   while collecting operation schemas
//! - keywords beside a composition (`$ref` + `properties`, `allOf` +
//!   `required`, ...) become an extra `allOf` member
//! - `nullable: true` and `type: [.., "null"]` wrap the node in
//!   `anyOf: [node, null]`

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fs;
use std::path::Path;
use tracing::debug;

use crate::document::{ApiDocument, HttpMethod, Operation, Parameter, ParameterLocation};
use crate::error::{EmitError, Result};
use crate::schema::{
    AdditionalProperties, ArraySchema, ConditionalSchema, Constraints, ObjectSchema,
    PrimitiveKind, Property, SchemaName, SchemaNode,
};

const SCHEMA_REF_PREFIX: &str = "#/components/schemas/";

/// Source syntax of a document
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceFormat {
    Json,
    Yaml,
}

impl SourceFormat {
    /// Guess from the file extension; anything but `.json` is read as YAML
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Yaml,
        }
    }
}

/// Load a document from disk, recording its content hash
pub fn load_document(path: &Path) -> Result<ApiDocument> {
    let content = fs::read_to_string(path)?;
    let mut doc = parse_document_str(&content, SourceFormat::from_path(path))?;
    debug!(
        path = %path.display(),
        schemas = doc.schema_count(),
        operations = doc.operations().len(),
        "loaded document"
    );
    doc.source_hash = Some(content_hash(&content));
    Ok(doc)
}

/// Parse document text
pub fn parse_document_str(content: &str, format: SourceFormat) -> Result<ApiDocument> {
    let value: Value = match format {
        SourceFormat::Json => serde_json::from_str(content)?,
        SourceFormat::Yaml => serde_yaml::from_str(content)?,
    };
    parse_document(&value)
}

/// Hex SHA-256 of the document text
pub fn content_hash(content: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Convert a parsed JSON value into a document
pub fn parse_document(value: &Value) -> Result<ApiDocument> {
    let root = value.as_object().ok_or_else(|| EmitError::InvalidSchema {
        location: "<document>".to_string(),
        message: "document root must be an object".to_string(),
    })?;

    let empty = Map::new();
    let components = root
        .get("components")
        .and_then(Value::as_object)
        .unwrap_or(&empty);

    let mut doc = ApiDocument::new();

    if let Some(schemas) = components.get("schemas") {
        let schemas = expect_object(schemas, "components.schemas")?;
        for (name, schema) in schemas {
            let node = parse_schema(schema, name)?;
            doc.insert_schema(name.clone(), node);
        }
    }

    if let Some(paths) = root.get("paths") {
        let paths = expect_object(paths, "paths")?;
        for (path, item) in paths {
            let item = expect_object(item, path)?;
            let shared = match item.get("parameters") {
                Some(params) => parse_parameters(params, components, path)?,
                None => Vec::new(),
            };
            for method in HttpMethod::ALL {
                if let Some(op) = item.get(method.as_str()) {
                    let operation = parse_operation(op, components, path, method, &shared)?;
                    doc.add_operation(operation);
                }
            }
        }
    }

    Ok(doc)
}

// =============================================================================
// References
// =============================================================================

/// `#/components/schemas/Pet` -> `Pet`
pub fn schema_ref_name(reference: &str) -> Result<SchemaName> {
    match reference.strip_prefix(SCHEMA_REF_PREFIX) {
        Some(name) if !name.is_empty() && !name.contains('/') => Ok(unescape_pointer(name)),
        _ => Err(EmitError::UnsupportedRef {
            reference: reference.to_string(),
        }),
    }
}

fn unescape_pointer(token: &str) -> String {
    token.replace("~1", "/").replace("~0", "~")
}

/// Follow a `$ref` into `components.<section>`, or return the value itself
fn resolve_component<'a>(
    value: &'a Value,
    components: &'a Map<String, Value>,
    section: &str,
) -> Result<&'a Value> {
    let Some(reference) = value.get("$ref").and_then(Value::as_str) else {
        return Ok(value);
    };
    let prefix = format!("#/components/{}/", section);
    let name = reference
        .strip_prefix(&prefix)
        .map(unescape_pointer)
        .ok_or_else(|| EmitError::UnsupportedRef {
            reference: reference.to_string(),
        })?;
    components
        .get(section)
        .and_then(|s| s.get(&name))
        .ok_or_else(|| EmitError::InvalidSchema {
            location: reference.to_string(),
            message: format!("no {} component named '{}'", section, name),
        })
}

// =============================================================================
// Operations
// =============================================================================

fn parse_operation(
    value: &Value,
    components: &Map<String, Value>,
    path: &str,
    method: HttpMethod,
    shared: &[Parameter],
) -> Result<Operation> {
    let location = format!("{} {}", method, path);
    let obj = expect_object(value, &location)?;
    let mut operation = Operation::new(method, path);

    operation.operation_id = obj
        .get("operationId")
        .and_then(Value::as_str)
        .map(str::to_string);
    operation.tags = obj
        .get("tags")
        .and_then(Value::as_array)
        .map(|tags| tags.iter().filter_map(Value::as_str).map(str::to_string).collect())
        .unwrap_or_default();
    operation.deprecated = obj
        .get("deprecated")
        .and_then(Value::as_bool)
        .unwrap_or(false);

    // Operation-level parameters override path-level ones with the same name and location
    let own = match obj.get("parameters") {
        Some(params) => parse_parameters(params, components, &location)?,
        None => Vec::new(),
    };
    let mut parameters: Vec<Parameter> = shared
        .iter()
        .filter(|p| !own.iter().any(|o| o.name == p.name && o.location == p.location))
        .cloned()
        .collect();
    parameters.extend(own);
    operation.parameters = parameters;

    if let Some(body) = obj.get("requestBody") {
        let body = resolve_component(body, components, "requestBodies")?;
        operation.request_bodies =
            parse_content(body, &format!("{} requestBody", location))?;
    }

    if let Some(responses) = obj.get("responses") {
        let responses = expect_object(responses, &format!("{} responses", location))?;
        for (status, response) in responses {
            let response = resolve_component(response, components, "responses")?;
            let schemas = parse_content(response, &format!("{} response {}", location, status))?;
            for schema in schemas {
                operation = operation.with_response(status.clone(), schema);
            }
        }
    }

    Ok(operation)
}

fn parse_parameters(
    value: &Value,
    components: &Map<String, Value>,
    location: &str,
) -> Result<Vec<Parameter>> {
    let Some(items) = value.as_array() else {
        return Err(invalid(location, "parameters must be an array"));
    };

    let mut parameters = Vec::with_capacity(items.len());
    for item in items {
        let item = resolve_component(item, components, "parameters")?;
        let name = item
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| invalid(location, "parameter without a name"))?;
        let param_location = match item.get("in").and_then(Value::as_str) {
            Some("path") => ParameterLocation::Path,
            Some("query") => ParameterLocation::Query,
            Some("header") => ParameterLocation::Header,
            Some("cookie") => ParameterLocation::Cookie,
            other => {
                return Err(invalid(
                    location,
                    &format!("parameter '{}' has unknown location {:?}", name, other),
                ))
            }
        };

        let param_loc = format!("{} parameter '{}'", location, name);
        let schema = match item.get("schema") {
            Some(schema) => parse_schema(schema, &param_loc)?,
            None => match parse_content(item, &param_loc)?.into_iter().next() {
                Some(schema) => schema,
                None => continue,
            },
        };

        parameters.push(Parameter {
            name: name.to_string(),
            location: param_location,
            schema,
        });
    }
    Ok(parameters)
}

/// Schemas of every media type under `content`
fn parse_content(value: &Value, location: &str) -> Result<Vec<SchemaNode>> {
    let Some(content) = value.get("content").and_then(Value::as_object) else {
        return Ok(Vec::new());
    };
    content
        .iter()
        .filter_map(|(media_type, media)| {
            media
                .get("schema")
                .map(|schema| parse_schema(schema, &format!("{} {}", location, media_type)))
        })
        .collect()
}

// =============================================================================
// Schemas
// =============================================================================

/// Convert one JSON Schema value into a `SchemaNode`
pub fn parse_schema(value: &Value, location: &str) -> Result<SchemaNode> {
    let obj = match value {
        Value::Bool(true) => return Ok(SchemaNode::primitive(PrimitiveKind::Any)),
        Value::Bool(false) => {
            return Ok(SchemaNode::Not(Box::new(SchemaNode::primitive(PrimitiveKind::Any))))
        }
        Value::Object(obj) => obj,
        _ => return Err(invalid(location, "schema must be an object or boolean")),
    };

    let mut members: Vec<SchemaNode> = Vec::new();
    let mut has_all_of = false;

    if let Some(reference) = obj.get("$ref") {
        let reference = reference
            .as_str()
            .ok_or_else(|| invalid(location, "$ref must be a string"))?;
        members.push(SchemaNode::Ref(schema_ref_name(reference)?));
    }

    if let Some(all_of) = obj.get("allOf") {
        has_all_of = true;
        members.extend(parse_schema_list(all_of, &format!("{}.allOf", location))?);
    }
    if let Some(one_of) = obj.get("oneOf") {
        members.push(SchemaNode::OneOf(parse_schema_list(
            one_of,
            &format!("{}.oneOf", location),
        )?));
    }
    if let Some(any_of) = obj.get("anyOf") {
        members.push(SchemaNode::AnyOf(parse_schema_list(
            any_of,
            &format!("{}.anyOf", location),
        )?));
    }
    if let Some(not) = obj.get("not") {
        members.push(SchemaNode::Not(Box::new(parse_schema(
            not,
            &format!("{}.not", location),
        )?)));
    }
    if let Some(if_schema) = obj.get("if") {
        let optional = |key: &str| -> Result<Option<SchemaNode>> {
            obj.get(key)
                .map(|v| parse_schema(v, &format!("{}.{}", location, key)))
                .transpose()
        };
        members.push(SchemaNode::Conditional(Box::new(ConditionalSchema {
            if_schema: parse_schema(if_schema, &format!("{}.if", location))?,
            then_schema: optional("then")?,
            else_schema: optional("else")?,
        })));
    }

    let (body, nullable) = parse_body(obj, location)?;
    if let Some(body) = body {
        members.push(body);
    }

    let node = if has_all_of || members.len() > 1 {
        SchemaNode::AllOf(members)
    } else {
        members
            .pop()
            .unwrap_or_else(|| SchemaNode::primitive(PrimitiveKind::Any))
    };

    Ok(if nullable { node.nullable() } else { node })
}

fn parse_schema_list(value: &Value, location: &str) -> Result<Vec<SchemaNode>> {
    let items = value
        .as_array()
        .ok_or_else(|| invalid(location, "expected an array of schemas"))?;
    parse_schema_slice(items, location)
}

fn parse_schema_slice(items: &[Value], location: &str) -> Result<Vec<SchemaNode>> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| parse_schema(item, &format!("{}[{}]", location, i)))
        .collect()
}

/// Keywords that make a schema body an object even without `type: object`
const OBJECT_KEYWORDS: &[&str] = &[
    "properties",
    "additionalProperties",
    "required",
    "minProperties",
    "maxProperties",
];

/// The non-composition part of a schema, plus whether it admits null
fn parse_body(obj: &Map<String, Value>, location: &str) -> Result<(Option<SchemaNode>, bool)> {
    let mut nullable = obj.get("nullable").and_then(Value::as_bool).unwrap_or(false);

    let mut types: Vec<&str> = match obj.get("type") {
        None => Vec::new(),
        Some(Value::String(t)) => vec![t.as_str()],
        Some(Value::Array(ts)) => ts.iter().filter_map(Value::as_str).collect(),
        Some(_) => return Err(invalid(location, "type must be a string or array")),
    };
    if types.len() > 1 && types.contains(&"null") {
        nullable = true;
        types.retain(|t| *t != "null");
    }

    if let Some(values) = obj.get("enum") {
        let values = values
            .as_array()
            .ok_or_else(|| invalid(location, "enum must be an array"))?;
        return Ok((Some(SchemaNode::Enum(values.clone())), nullable));
    }
    if let Some(value) = obj.get("const") {
        return Ok((Some(SchemaNode::Const(value.clone())), nullable));
    }

    let has_object_keywords = OBJECT_KEYWORDS.iter().any(|k| obj.contains_key(*k));
    let has_array_keywords = obj.contains_key("items") || obj.contains_key("prefixItems");
    let constraints = parse_constraints(obj);

    let mut variants = Vec::with_capacity(types.len());
    for t in &types {
        let node = match *t {
            "object" => parse_object(obj, location)?,
            "array" => parse_array(obj, location)?,
            other => {
                let kind = PrimitiveKind::from_type_name(other)
                    .ok_or_else(|| invalid(location, &format!("unknown type '{}'", other)))?;
                SchemaNode::Primitive(kind, constraints.clone())
            }
        };
        variants.push(node);
    }

    let body = match variants.len() {
        0 if has_object_keywords => Some(parse_object(obj, location)?),
        0 if has_array_keywords => Some(parse_array(obj, location)?),
        0 if !constraints.is_empty() => Some(SchemaNode::Primitive(PrimitiveKind::Any, constraints)),
        0 => None,
        1 => variants.pop(),
        _ => Some(SchemaNode::AnyOf(variants)),
    };

    Ok((body, nullable))
}

fn parse_object(obj: &Map<String, Value>, location: &str) -> Result<SchemaNode> {
    let required: Vec<&str> = obj
        .get("required")
        .and_then(Value::as_array)
        .map(|r| r.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();

    let mut properties = Vec::new();
    if let Some(props) = obj.get("properties") {
        let props = expect_object(props, &format!("{}.properties", location))?;
        for (name, schema) in props {
            let prop_loc = format!("{}.{}", location, name);
            let mut property = Property::new(name.clone(), parse_schema(schema, &prop_loc)?);
            property.required = required.contains(&name.as_str());
            property.read_only = flag(schema, "readOnly");
            property.write_only = flag(schema, "writeOnly");
            properties.push(property);
        }
    }

    let additional_properties = match obj.get("additionalProperties") {
        None => None,
        Some(Value::Bool(allowed)) => Some(AdditionalProperties::Allowed(*allowed)),
        Some(schema) => Some(AdditionalProperties::Schema(Box::new(parse_schema(
            schema,
            &format!("{}[*]", location),
        )?))),
    };

    Ok(SchemaNode::Object(ObjectSchema {
        properties,
        additional_properties,
    }))
}

fn parse_array(obj: &Map<String, Value>, location: &str) -> Result<SchemaNode> {
    let item_loc = format!("{}[]", location);
    let mut array = ArraySchema::default();

    match obj.get("items") {
        None => {}
        // Draft-07 tuple form
        Some(Value::Array(tuple)) => array.prefix_items = parse_schema_slice(tuple, &item_loc)?,
        Some(items) => array.items = Some(Box::new(parse_schema(items, &item_loc)?)),
    }
    if let Some(prefix) = obj.get("prefixItems") {
        array.prefix_items = parse_schema_list(prefix, &item_loc)?;
    }

    Ok(SchemaNode::Array(array))
}

fn parse_constraints(obj: &Map<String, Value>) -> Constraints {
    Constraints {
        format: obj.get("format").and_then(Value::as_str).map(str::to_string),
        pattern: obj.get("pattern").and_then(Value::as_str).map(str::to_string),
        min_length: obj.get("minLength").and_then(Value::as_u64),
        max_length: obj.get("maxLength").and_then(Value::as_u64),
        minimum: obj.get("minimum").and_then(Value::as_f64),
        maximum: obj.get("maximum").and_then(Value::as_f64),
        multiple_of: obj.get("multipleOf").and_then(Value::as_f64),
    }
}

fn flag(value: &Value, key: &str) -> bool {
    value.get(key).and_then(Value::as_bool).unwrap_or(false)
}

fn expect_object<'a>(value: &'a Value, location: &str) -> Result<&'a Map<String, Value>> {
    value
        .as_object()
        .ok_or_else(|| invalid(location, "expected an object"))
}

fn invalid(location: &str, message: &str) -> EmitError {
    EmitError::InvalidSchema {
        location: location.to_string(),
        message: message.to_string(),
    }
}
