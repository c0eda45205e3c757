use std::collections::HashSet;

use serde_yaml::Value;
use thiserror::Error;

/// Errors raised while walking a schema document.
///
/// Every variant carries the dot-separated path of the offending property so
/// callers can point users at the exact spot in the schema file.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    /// `properties` was present but is not a mapping.
    #[error("`properties` must be a mapping at `{path}`")]
    MalformedProperties {
        /// Path of the object whose `properties` is malformed.
        path: String,
    },
    /// A property carries a `default` but declares no `type`.
    #[error("`type` keyword missing for defaulted property `{path}`")]
    MissingType {
        /// Path of the defaulted property.
        path: String,
    },
    /// The `type` keyword names something this walker does not know.
    #[error("unrecognized type `{type_name}` at `{path}`")]
    UnknownType {
        /// Path of the property with the unknown type.
        path: String,
        /// The unrecognized type name.
        type_name: String,
    },
    /// A mapping key in the schema is not a string.
    #[error("mapping key at `{path}` is not a string")]
    NonStringKey {
        /// Path of the mapping with the offending key.
        path: String,
    },
    /// The schema could not be compiled or represented for validation.
    #[error("invalid schema: {message}")]
    Invalid {
        /// Reason reported by the validator.
        message: String,
    },
}

/// Property type as declared by the schema `type` keyword.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaKind {
    /// Mapping with named properties.
    Object,
    /// Sequence; treated as a leaf for synthesis purposes.
    Array,
    /// String scalar.
    String,
    /// Integer scalar.
    Integer,
    /// Floating-point scalar.
    Number,
    /// Boolean scalar.
    Boolean,
    /// Explicit null.
    Null,
    /// No usable type declaration; never synthesized.
    Any,
}

impl SchemaKind {
    fn from_name(name: &str, path: &str) -> Result<Self, SchemaError> {
        match name {
            "object" => Ok(Self::Object),
            "array" => Ok(Self::Array),
            "string" => Ok(Self::String),
            "integer" => Ok(Self::Integer),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            "null" => Ok(Self::Null),
            other => Err(SchemaError::UnknownType {
                path: display_path(path),
                type_name: other.to_string(),
            }),
        }
    }

    /// Resolve the `type` keyword value.
    ///
    /// A list of alternatives maps to [`SchemaKind::Object`] when `object` is
    /// among them and [`SchemaKind::Any`] otherwise; each listed name must
    /// still be a recognized type.
    fn from_type(ty: &Value, path: &str) -> Result<Self, SchemaError> {
        match ty {
            Value::String(name) => Self::from_name(name, path),
            Value::Sequence(alternatives) => {
                let mut is_object = false;
                for alternative in alternatives {
                    if let Some(name) = alternative.as_str() {
                        is_object |= Self::from_name(name, path)? == Self::Object;
                    }
                }
                Ok(if is_object { Self::Object } else { Self::Any })
            }
            other => Err(SchemaError::UnknownType {
                path: display_path(path),
                type_name: format!("{other:?}"),
            }),
        }
    }
}

/// One property definition extracted from the schema.
///
/// `children` is non-empty only for [`SchemaKind::Object`] nodes and keeps
/// the exact declaration order of the schema source. That order drives where
/// synthesized keys land in the output document; validation itself does not
/// depend on it.
#[derive(Debug, Clone)]
pub struct SchemaNode {
    /// Property key. Empty for the root node.
    pub name: String,
    /// Declared type.
    pub kind: SchemaKind,
    /// Declared default value, if any.
    pub default: Option<Value>,
    /// Declared description, rendered as an inline comment on synthesis.
    pub description: Option<String>,
    /// Whether the parent object lists this property as required.
    pub required: bool,
    /// Child properties in declaration order (objects only).
    pub children: Vec<SchemaNode>,
}

impl SchemaNode {
    /// Walk a parsed schema document into an ordered node tree.
    ///
    /// Pure read of the schema value; the resulting tree is built once per
    /// schema load and never mutated afterward.
    ///
    /// # Errors
    ///
    /// Returns [`SchemaError`] when `properties` is not a mapping, a property
    /// carries a `default` without a `type`, or a `type` is unrecognized.
    pub fn from_schema(schema: &Value) -> Result<Self, SchemaError> {
        walk(String::new(), "", schema, false)
    }
}

fn walk(name: String, path: &str, schema: &Value, required: bool) -> Result<SchemaNode, SchemaError> {
    let default = schema.get("default").cloned();
    let description = schema
        .get("description")
        .and_then(Value::as_str)
        .map(str::to_string);

    let kind = match schema.get("type") {
        Some(ty) => SchemaKind::from_type(ty, path)?,
        // Schemas routinely omit `type: object` when `properties` is present.
        None if schema.get("properties").is_some() => SchemaKind::Object,
        None => {
            if default.is_some() {
                return Err(SchemaError::MissingType {
                    path: display_path(path),
                });
            }
            SchemaKind::Any
        }
    };

    let mut children = Vec::new();
    if kind == SchemaKind::Object
        && let Some(properties) = schema.get("properties")
    {
        let properties = properties
            .as_mapping()
            .ok_or_else(|| SchemaError::MalformedProperties {
                path: display_path(path),
            })?;
        let required_keys: HashSet<&str> = schema
            .get("required")
            .and_then(Value::as_sequence)
            .map(|keys| keys.iter().filter_map(Value::as_str).collect())
            .unwrap_or_default();

        for (key, subschema) in properties {
            let Some(key) = key.as_str() else {
                return Err(SchemaError::NonStringKey {
                    path: display_path(path),
                });
            };
            children.push(walk(
                key.to_string(),
                &join_path(path, key),
                subschema,
                required_keys.contains(key),
            )?);
        }
    }

    Ok(SchemaNode {
        name,
        kind,
        default,
        description,
        required,
        children,
    })
}

/// Dot-join a parent path with a key.
pub(crate) fn join_path(parent: &str, key: &str) -> String {
    if parent.is_empty() {
        key.to_string()
    } else {
        format!("{parent}.{key}")
    }
}

fn display_path(path: &str) -> String {
    if path.is_empty() {
        "(root)".to_string()
    } else {
        path.to_string()
    }
}
