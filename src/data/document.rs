use std::collections::{BTreeMap, HashMap};

use serde::de::DeserializeOwned;
use serde_yaml::{Mapping, Value};

use crate::data::schema::{SchemaKind, SchemaNode, join_path};

/// A fully-merged configuration document.
///
/// `values` is an ordered mapping: existing keys keep their original relative
/// order and synthesized keys land at the position the schema declares.
/// `annotations` is a side channel from dot-joined key path to description
/// text, attached only to synthesized keys; the YAML renderer turns it into
/// inline comments. It is never consulted by validation.
#[derive(Debug, Clone, Default)]
pub struct ConfigDocument {
    /// Merged configuration values.
    pub values: Mapping,
    /// Descriptions for synthesized keys, keyed by dot-joined path.
    pub annotations: BTreeMap<String, String>,
    /// True when any field was synthesized during the merge.
    pub synthesized: bool,
}

impl ConfigDocument {
    /// Merge an existing document with the schema's declared defaults.
    ///
    /// Existing values are never overwritten, even when they would fail
    /// validation; a missing key with a default is inserted together with its
    /// description; a missing object key with defaultable children is
    /// recursed into; a missing key with neither is left absent for the
    /// validator to flag.
    pub fn synthesize(existing: Mapping, schema: &SchemaNode) -> Self {
        let mut doc = Self::default();
        doc.values = merge_object(
            &existing,
            &schema.children,
            "",
            &mut doc.annotations,
            &mut doc.synthesized,
        );
        doc
    }

    /// Normalize all mapping keys to lowercase, recursively.
    pub fn lower_keys(&mut self) {
        let lowered = keys_to_lower(Value::Mapping(std::mem::take(&mut self.values)));
        if let Value::Mapping(map) = lowered {
            self.values = map;
        }
    }

    /// Deserialize the merged values into a typed configuration.
    ///
    /// # Errors
    ///
    /// Returns the deserializer error when the document does not match `T`.
    pub fn into_typed<T: DeserializeOwned>(self) -> Result<T, serde_yaml::Error> {
        serde_yaml::from_value(Value::Mapping(self.values))
    }
}

/// Merge one object level.
///
/// Output order: existing entries first, in their original order, with each
/// missing schema key inserted before the first existing key that follows it
/// in schema declaration order (appended when no such key exists). Keys
/// unknown to the schema pass through untouched.
fn merge_object(
    existing: &Mapping,
    nodes: &[SchemaNode],
    path: &str,
    annotations: &mut BTreeMap<String, String>,
    synthesized: &mut bool,
) -> Mapping {
    let node_index: HashMap<&str, usize> = nodes
        .iter()
        .enumerate()
        .map(|(index, node)| (node.name.as_str(), index))
        .collect();

    let mut entries: Vec<(Value, Value)> = Vec::new();
    for (key, value) in existing {
        let merged = match key.as_str().and_then(|name| {
            nodes
                .iter()
                .find(|node| node.name == name)
                .map(|node| (name, node))
        }) {
            Some((name, node)) if node.kind == SchemaKind::Object => match value.as_mapping() {
                Some(map) => Value::Mapping(merge_object(
                    map,
                    &node.children,
                    &join_path(path, name),
                    annotations,
                    synthesized,
                )),
                // Wrong shape; keep it and let validation report it.
                None => value.clone(),
            },
            _ => value.clone(),
        };
        entries.push((key.clone(), merged));
    }

    for (index, node) in nodes.iter().enumerate() {
        if existing.contains_key(node.name.as_str()) {
            continue;
        }
        let child_path = join_path(path, &node.name);
        let value = if let Some(default) = &node.default {
            default.clone()
        } else if node.kind == SchemaKind::Object && !node.children.is_empty() {
            let sub = merge_object(
                &Mapping::new(),
                &node.children,
                &child_path,
                annotations,
                synthesized,
            );
            if sub.is_empty() {
                continue;
            }
            Value::Mapping(sub)
        } else {
            continue;
        };

        if let Some(description) = &node.description {
            annotations.insert(child_path, description.clone());
        }
        *synthesized = true;

        let at = entries
            .iter()
            .position(|(key, _)| {
                key.as_str()
                    .and_then(|name| node_index.get(name))
                    .is_some_and(|&existing_index| existing_index > index)
            })
            .unwrap_or(entries.len());
        entries.insert(at, (Value::String(node.name.clone()), value));
    }

    entries.into_iter().collect()
}

/// Lowercase every string mapping key in the value, recursively.
///
/// Keys that collide after lowercasing collapse into one entry; the later
/// entry's value wins.
pub fn keys_to_lower(value: Value) -> Value {
    match value {
        Value::Mapping(map) => Value::Mapping(
            map.into_iter()
                .map(|(key, value)| {
                    let key = match key {
                        Value::String(s) => Value::String(s.to_lowercase()),
                        other => other,
                    };
                    (key, keys_to_lower(value))
                })
                .collect(),
        ),
        Value::Sequence(items) => Value::Sequence(items.into_iter().map(keys_to_lower).collect()),
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::schema::SchemaNode;

    fn listen_schema() -> SchemaNode {
        let schema: Value = serde_yaml::from_str(
            r#"
type: object
properties:
  listen:
    type: object
    description: Socket to listen to
    properties:
      host:
        type: string
        description: Hostname or IP address
        default: localhost
      port:
        type: integer
        default: 8080
  tmpdir:
    type: string
    default: /tmp/
"#,
        )
        .expect("test schema should be valid YAML");
        SchemaNode::from_schema(&schema).expect("schema should walk")
    }

    fn mapping(text: &str) -> Mapping {
        match serde_yaml::from_str(text).expect("test document should be valid YAML") {
            Value::Mapping(map) => map,
            other => panic!("expected a mapping, got {other:?}"),
        }
    }

    #[test]
    fn test_empty_document_synthesizes_all_defaults() {
        let doc = ConfigDocument::synthesize(Mapping::new(), &listen_schema());
        assert!(doc.synthesized);
        assert_eq!(
            doc.values,
            mapping("{listen: {host: localhost, port: 8080}, tmpdir: /tmp/}")
        );
        assert_eq!(
            doc.annotations.get("listen").map(String::as_str),
            Some("Socket to listen to")
        );
        assert_eq!(
            doc.annotations.get("listen.host").map(String::as_str),
            Some("Hostname or IP address")
        );
        assert!(!doc.annotations.contains_key("listen.port"));
    }

    #[test]
    fn test_complete_document_is_untouched() {
        let existing = mapping("{listen: {host: 192.0.2.1, port: 1025}, tmpdir: /tmp}");
        let doc = ConfigDocument::synthesize(existing.clone(), &listen_schema());
        assert!(!doc.synthesized);
        assert!(doc.annotations.is_empty());
        assert_eq!(doc.values, existing);
    }

    #[test]
    fn test_existing_values_are_never_overwritten() {
        // An invalid value for the schema type still survives the merge;
        // validation, not silent correction, is the reported outcome.
        let existing = mapping("{listen: {host: localhost, port: not-a-number}, tmpdir: /tmp}");
        let doc = ConfigDocument::synthesize(existing, &listen_schema());
        let listen = doc.values.get("listen").and_then(Value::as_mapping).expect("listen mapping");
        assert_eq!(listen.get("port"), Some(&Value::String("not-a-number".into())));
    }

    #[test]
    fn test_missing_keys_land_at_schema_position() {
        let schema: Value = serde_yaml::from_str(
            r#"
type: object
properties:
  a: {type: string, default: one}
  b: {type: string, default: two}
  c: {type: string, default: three}
"#,
        )
        .expect("test schema should be valid YAML");
        let root = SchemaNode::from_schema(&schema).expect("schema should walk");

        let doc = ConfigDocument::synthesize(mapping("{b: kept}"), &root);
        let keys: Vec<&str> = doc.values.keys().filter_map(Value::as_str).collect();
        assert_eq!(keys, ["a", "b", "c"]);
        assert_eq!(doc.values.get("b"), Some(&Value::String("kept".into())));
    }

    #[test]
    fn test_nested_synthesis_into_existing_object() {
        let existing = mapping("{listen: {host: 192.0.2.1}}");
        let doc = ConfigDocument::synthesize(existing, &listen_schema());
        assert!(doc.synthesized);
        let listen = doc.values.get("listen").and_then(Value::as_mapping).expect("listen mapping");
        assert_eq!(listen.get("host"), Some(&Value::String("192.0.2.1".into())));
        assert_eq!(listen.get("port"), Some(&Value::Number(8080.into())));
        // Only the synthesized leaf is annotated, not the existing parent.
        assert!(!doc.annotations.contains_key("listen"));
        assert!(!doc.annotations.contains_key("listen.host"));
    }

    #[test]
    fn test_unknown_keys_pass_through() {
        let existing = mapping("{extra: 1, listen: {host: h, port: 1}}");
        let doc = ConfigDocument::synthesize(existing, &listen_schema());
        assert_eq!(doc.values.get("extra"), Some(&Value::Number(1.into())));
    }

    #[test]
    fn test_required_without_default_stays_absent() {
        let schema: Value = serde_yaml::from_str(
            "{type: object, required: [token], properties: {token: {type: string}}}",
        )
        .expect("test schema should be valid YAML");
        let root = SchemaNode::from_schema(&schema).expect("schema should walk");
        let doc = ConfigDocument::synthesize(Mapping::new(), &root);
        assert!(!doc.synthesized);
        assert!(doc.values.is_empty());
    }

    #[test]
    fn test_keys_to_lower_recurses() {
        let mut doc = ConfigDocument {
            values: mapping("{Listen: {Host: H}, Items: [{Inner: 1}]}"),
            ..Default::default()
        };
        doc.lower_keys();
        assert_eq!(
            Value::Mapping(doc.values),
            Value::Mapping(mapping("{listen: {host: H}, items: [{inner: 1}]}"))
        );
    }

    #[test]
    fn test_keys_to_lower_collision_keeps_last_value() {
        let mut doc = ConfigDocument {
            values: mapping("{HOST: first, host: second}"),
            ..Default::default()
        };
        doc.lower_keys();
        assert_eq!(doc.values.len(), 1);
        assert_eq!(doc.values.get("host"), Some(&Value::String("second".into())));
    }

    #[test]
    fn test_into_typed_deserializes_merged_values() {
        #[derive(serde::Deserialize)]
        struct Listen {
            host: String,
            port: u16,
        }
        #[derive(serde::Deserialize)]
        struct Settings {
            listen: Listen,
            tmpdir: String,
        }

        let doc = ConfigDocument::synthesize(mapping("{listen: {port: 1025}}"), &listen_schema());
        let settings: Settings = doc.into_typed().expect("typed deserialization");
        assert_eq!(settings.listen.host, "localhost");
        assert_eq!(settings.listen.port, 1025);
        assert_eq!(settings.tmpdir, "/tmp/");
    }
}
