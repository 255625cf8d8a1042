//! Translation of tool input schemas into model function declarations.
//!
//! Tool hosts describe arguments with JSON Schema; the model endpoint accepts
//! an OpenAPI-flavoured subset of it. Keys outside [`SUPPORTED_KEYS`] are
//! dropped (and logged). A schema whose shape cannot be expressed at all is
//! reported as a [`SchemaError`] and the tool is left out of the declaration
//! list, so the remaining tools stay usable.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::model::FunctionDeclaration;
use crate::tools::ToolDescriptor;

/// Schema keys the model endpoint understands.
pub const SUPPORTED_KEYS: &[&str] = &[
    "type",
    "format",
    "description",
    "nullable",
    "enum",
    "properties",
    "required",
    "items",
    "minItems",
    "maxItems",
    "minimum",
    "maximum",
    "minLength",
    "maxLength",
    "pattern",
    "anyOf",
    "propertyOrdering",
    "example",
    "default",
];

/// A tool schema that cannot be represented as a declaration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema at {path} is not an object")]
    NotAnObject { path: String },

    #[error("parameters must be an object schema, found type {found}")]
    NotObjectType { found: String },

    #[error("{path} must be {expected}")]
    WrongShape { path: String, expected: &'static str },
}

/// Declarations for every representable tool, in input order.
///
/// Tools whose schema cannot be translated are skipped with a warning.
pub fn declarations(tools: &[ToolDescriptor]) -> Vec<FunctionDeclaration> {
    tools
        .iter()
        .filter_map(|tool| match declaration(tool) {
            Ok(declaration) => Some(declaration),
            Err(err) => {
                warn!(tool = %tool.name, error = %err, "skipping tool declaration");
                None
            }
        })
        .collect()
}

/// Declaration for a single tool.
pub fn declaration(tool: &ToolDescriptor) -> Result<FunctionDeclaration, SchemaError> {
    let parameters = parameters(&tool.name, &tool.parameter_schema)?;
    Ok(FunctionDeclaration {
        name: tool.name.clone(),
        description: tool.description.clone(),
        parameters,
    })
}

fn parameters(tool: &str, schema: &Value) -> Result<Option<Value>, SchemaError> {
    let Value::Object(root) = schema else {
        return Err(SchemaError::NotAnObject {
            path: "$".to_string(),
        });
    };

    if let Some(found) = root.get("type") {
        if found != "object" {
            return Err(SchemaError::NotObjectType {
                found: found.to_string(),
            });
        }
    }

    let translated = translate(tool, root, "$")?;

    // The endpoint rejects object schemas without properties; such tools
    // simply take no arguments.
    let has_properties = translated
        .get("properties")
        .and_then(Value::as_object)
        .is_some_and(|props| !props.is_empty());

    Ok(has_properties.then_some(Value::Object(translated)))
}

fn translate(
    tool: &str,
    schema: &Map<String, Value>,
    path: &str,
) -> Result<Map<String, Value>, SchemaError> {
    let mut out = Map::new();

    for (key, value) in schema {
        if !SUPPORTED_KEYS.contains(&key.as_str()) {
            debug!(tool, path, key = key.as_str(), "dropping unsupported schema key");
            continue;
        }

        let translated = match key.as_str() {
            "properties" => {
                let props = value.as_object().ok_or_else(|| SchemaError::WrongShape {
                    path: format!("{path}.properties"),
                    expected: "an object",
                })?;
                let mut out_props = Map::new();
                for (name, prop) in props {
                    let prop_path = format!("{path}.properties.{name}");
                    out_props.insert(name.clone(), subschema(tool, prop, &prop_path)?);
                }
                Value::Object(out_props)
            }
            "items" => subschema(tool, value, &format!("{path}.items"))?,
            "anyOf" => {
                let variants = value.as_array().ok_or_else(|| SchemaError::WrongShape {
                    path: format!("{path}.anyOf"),
                    expected: "an array",
                })?;
                let translated = variants
                    .iter()
                    .enumerate()
                    .map(|(i, v)| subschema(tool, v, &format!("{path}.anyOf[{i}]")))
                    .collect::<Result<Vec<_>, _>>()?;
                Value::Array(translated)
            }
            "required" if value.as_array().is_some_and(Vec::is_empty) => continue,
            _ => value.clone(),
        };

        out.insert(key.clone(), translated);
    }

    Ok(out)
}

fn subschema(tool: &str, value: &Value, path: &str) -> Result<Value, SchemaError> {
    match value {
        Value::Object(map) => Ok(Value::Object(translate(tool, map, path)?)),
        _ => Err(SchemaError::NotAnObject {
            path: path.to_string(),
        }),
    }
}
