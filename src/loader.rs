//! The load pipeline: schema walk, synthesis, validation, write-back.
//!
//! Control flow is linear with no retries or partial commits: either the
//! merged document validates and is returned, or the whole call fails and no
//! file is touched. Each call is stateless; concurrent calls writing the same
//! path must be serialized by the caller.

use std::{fs, io, path::Path};

use jsonschema::Draft;
use serde_yaml::{Mapping, Value};

use crate::{
    data::{
        document::{ConfigDocument, keys_to_lower},
        schema::{SchemaError, SchemaNode},
    },
    error::{ConfigError, Violation},
    render,
};

/// Configuration document language.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Primary format with schema validation and default synthesis.
    #[default]
    Yaml,
    /// Secondary format, pass-through parse only.
    Toml,
}

/// Knobs for [`get_config`].
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Document language.
    pub format: Format,
    /// Persist synthesized defaults back to the configuration file.
    pub write_back: bool,
    /// Normalize document keys to lowercase before the merge.
    pub lower_keys: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            format: Format::Yaml,
            write_back: true,
            lower_keys: true,
        }
    }
}

/// Load, default, and validate a configuration file against a schema file.
///
/// A missing configuration file is not an error: synthesis starts from an
/// empty document and, with `write_back` enabled, the generated file is
/// created with schema descriptions rendered as inline comments. When the
/// file exists but is incomplete, write-back splices the synthesized keys
/// into the original text, leaving authored lines untouched. A missing
/// schema file is fatal.
///
/// With [`Format::Toml`] the file is parsed and returned as-is; the schema
/// is not consulted.
///
/// # Errors
///
/// Returns [`ConfigError`] as described in [`crate::error`]. A write-back
/// failure alone is logged and does not fail the call.
pub fn get_config(
    config_path: impl AsRef<Path>,
    schema_path: impl AsRef<Path>,
    options: &LoadOptions,
) -> Result<ConfigDocument, ConfigError> {
    match options.format {
        Format::Toml => load_toml(config_path.as_ref()),
        Format::Yaml => load_yaml(config_path.as_ref(), schema_path.as_ref(), options),
    }
}

/// In-memory variant of [`get_config`] for already-parsed values.
///
/// No file is read or written; `None` stands for a missing document.
///
/// # Errors
///
/// Returns [`ConfigError`] when the schema is malformed, the document is not
/// a mapping, or the merged document fails validation.
pub fn get_config_from_values(
    schema: &Value,
    existing: Option<Value>,
    lower_keys: bool,
) -> Result<ConfigDocument, ConfigError> {
    let existing = match existing {
        Some(Value::Mapping(map)) => map,
        Some(Value::Null) | None => Mapping::new(),
        Some(_) => {
            return Err(ConfigError::Parse {
                path: "<memory>".to_string(),
                message: "top-level configuration must be a mapping".to_string(),
            });
        }
    };
    resolve(schema, existing, lower_keys)
}

fn load_yaml(
    config_path: &Path,
    schema_path: &Path,
    options: &LoadOptions,
) -> Result<ConfigDocument, ConfigError> {
    let schema_text = fs::read_to_string(schema_path).map_err(|source| ConfigError::Io {
        path: schema_path.to_path_buf(),
        source,
    })?;
    let schema: Value =
        serde_yaml::from_str(&schema_text).map_err(|err| parse_error(schema_path, &err))?;

    let original_text = match fs::read_to_string(config_path) {
        Ok(text) => Some(text),
        Err(err) if err.kind() == io::ErrorKind::NotFound => None,
        Err(source) => {
            return Err(ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            });
        }
    };
    let existing = match &original_text {
        Some(text) => parse_document(text, config_path)?,
        None => Mapping::new(),
    };

    let doc = resolve(&schema, existing, options.lower_keys)?;

    if options.write_back && doc.synthesized {
        // A pre-existing file is repaired in place: synthesized keys are
        // spliced into the original text so authored comments and formatting
        // survive. Only a missing file gets a full rendering.
        let rendered = match original_text.as_deref() {
            Some(text) => render::repair_yaml(text, &doc),
            None => render::to_yaml(&doc),
        };
        match rendered {
            Ok(text) => {
                if let Err(err) = fs::write(config_path, text) {
                    log::warn!(
                        "unable to write configuration file {}: {err}",
                        config_path.display()
                    );
                } else {
                    log::info!("wrote synthesized defaults to {}", config_path.display());
                }
            }
            Err(err) => log::warn!(
                "unable to render configuration for {}: {err}",
                config_path.display()
            ),
        }
    }

    Ok(doc)
}

fn load_toml(config_path: &Path) -> Result<ConfigDocument, ConfigError> {
    let text = match fs::read_to_string(config_path) {
        Ok(text) => text,
        Err(err) if err.kind() == io::ErrorKind::NotFound => String::new(),
        Err(source) => {
            return Err(ConfigError::Io {
                path: config_path.to_path_buf(),
                source,
            });
        }
    };
    let table: toml::Value =
        toml::from_str(&text).map_err(|err| parse_error(config_path, &err))?;
    let values = match serde_yaml::to_value(table).map_err(|err| parse_error(config_path, &err))? {
        Value::Mapping(map) => map,
        _ => Mapping::new(),
    };
    Ok(ConfigDocument {
        values,
        ..ConfigDocument::default()
    })
}

fn resolve(schema: &Value, existing: Mapping, lower_keys: bool) -> Result<ConfigDocument, ConfigError> {
    let root = SchemaNode::from_schema(schema)?;
    // Normalize before the merge so authored keys line up with schema keys;
    // lowering afterwards would let synthesized defaults shadow them.
    let existing = if lower_keys {
        match keys_to_lower(Value::Mapping(existing)) {
            Value::Mapping(map) => map,
            _ => Mapping::new(),
        }
    } else {
        existing
    };
    let doc = ConfigDocument::synthesize(existing, &root);
    validate(schema, &doc)?;
    Ok(doc)
}

/// Validate the merged document and aggregate every failing path.
fn validate(schema: &Value, doc: &ConfigDocument) -> Result<(), ConfigError> {
    let schema_json = serde_json::to_value(schema).map_err(|err| {
        ConfigError::Schema(SchemaError::Invalid {
            message: err.to_string(),
        })
    })?;
    let instance =
        serde_json::to_value(Value::Mapping(doc.values.clone())).map_err(|err| {
            ConfigError::Parse {
                path: "<document>".to_string(),
                message: err.to_string(),
            }
        })?;

    let validator = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema_json)
        .map_err(|err| {
            ConfigError::Schema(SchemaError::Invalid {
                message: err.to_string(),
            })
        })?;

    let violations: Vec<Violation> = validator
        .iter_errors(&instance)
        .map(|err| Violation {
            path: match err.instance_path().to_string() {
                path if path.is_empty() => "(root)".to_string(),
                path => path,
            },
            message: err.to_string(),
        })
        .collect();

    if violations.is_empty() {
        Ok(())
    } else {
        Err(ConfigError::Validation { violations })
    }
}

fn parse_document(text: &str, path: &Path) -> Result<Mapping, ConfigError> {
    match serde_yaml::from_str(text).map_err(|err| parse_error(path, &err))? {
        Value::Mapping(map) => Ok(map),
        Value::Null => Ok(Mapping::new()),
        _ => Err(ConfigError::Parse {
            path: path.display().to_string(),
            message: "top-level configuration must be a mapping".to_string(),
        }),
    }
}

fn parse_error(path: &Path, err: &dyn std::fmt::Display) -> ConfigError {
    ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(text: &str) -> Value {
        serde_yaml::from_str(text).expect("test input should be valid YAML")
    }

    const LISTEN_SCHEMA: &str = r#"
type: object
properties:
  listen:
    type: object
    properties:
      host: {type: string, default: localhost}
      port: {type: integer, default: 8080}
  tmpdir: {type: string, default: /tmp/}
"#;

    #[test]
    fn test_all_defaults_validate_from_empty_document() {
        let doc = get_config_from_values(&parse(LISTEN_SCHEMA), None, true)
            .expect("synthesis from defaults should validate");
        assert!(doc.synthesized);
        assert_eq!(
            Value::Mapping(doc.values),
            parse("{listen: {host: localhost, port: 8080}, tmpdir: /tmp/}")
        );
    }

    #[test]
    fn test_complete_document_passes_unchanged() {
        let input = parse("{listen: {host: 192.0.2.1, port: 1025}, tmpdir: /tmp}");
        let doc = get_config_from_values(&parse(LISTEN_SCHEMA), Some(input.clone()), true)
            .expect("complete document should validate");
        assert!(!doc.synthesized);
        assert_eq!(Value::Mapping(doc.values), input);
    }

    #[test]
    fn test_missing_required_fields_are_all_reported() {
        let schema = parse(
            r#"
type: object
required: [alpha, beta]
properties:
  alpha: {type: string}
  beta: {type: string}
"#,
        );
        let err = get_config_from_values(&schema, None, true)
            .expect_err("missing required fields should fail");
        let ConfigError::Validation { violations } = err else {
            panic!("expected a validation error, got {err}");
        };
        assert_eq!(violations.len(), 2);
        let combined: String = violations
            .iter()
            .map(|violation| violation.message.clone())
            .collect();
        assert!(combined.contains("alpha"));
        assert!(combined.contains("beta"));
    }

    #[test]
    fn test_invalid_existing_value_is_reported_not_corrected() {
        let input = parse("{listen: {host: localhost, port: not-a-number}, tmpdir: /tmp}");
        let err = get_config_from_values(&parse(LISTEN_SCHEMA), Some(input), true)
            .expect_err("invalid value should fail validation");
        let ConfigError::Validation { violations } = err else {
            panic!("expected a validation error, got {err}");
        };
        assert!(violations.iter().any(|v| v.path.contains("port")));
    }

    #[test]
    fn test_scalar_document_is_a_parse_error() {
        let err = get_config_from_values(&parse(LISTEN_SCHEMA), Some(parse("just a string")), true)
            .expect_err("scalar document should be rejected");
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_lower_keys_normalizes_before_validation() {
        let input = parse("{Listen: {Host: 192.0.2.1, Port: 1025}, TmpDir: /tmp}");
        let doc = get_config_from_values(&parse(LISTEN_SCHEMA), Some(input), true)
            .expect("lowercased document should validate");
        assert!(!doc.synthesized);
        assert_eq!(
            Value::Mapping(doc.values),
            parse("{listen: {host: 192.0.2.1, port: 1025}, tmpdir: /tmp}")
        );
    }
}
