//! Serialization of merged configuration documents.
//!
//! YAML output is post-processed to turn the annotation side channel into
//! inline `#` comments above synthesized keys, so a generated file reads as
//! if a human wrote it. Repairing an existing file goes the other way: the
//! original text is kept and only synthesized keys are spliced in, so
//! authored comments and formatting survive untouched. TOML output is plain
//! serialization; the secondary format carries no annotations.

use std::collections::BTreeMap;

use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::data::{document::ConfigDocument, schema::join_path};

/// Render the document as YAML with annotation comments.
///
/// # Errors
///
/// Returns the serializer error when the values cannot be emitted as YAML.
pub fn to_yaml(doc: &ConfigDocument) -> Result<String, serde_yaml::Error> {
    let body = serde_yaml::to_string(&Value::Mapping(doc.values.clone()))?;
    if doc.annotations.is_empty() {
        return Ok(body);
    }
    Ok(inject_comments(&body, &doc.annotations))
}

/// Render the document as TOML.
///
/// # Errors
///
/// Returns the serializer error when the values cannot be represented in
/// TOML (for example null values).
pub fn to_toml(doc: &ConfigDocument) -> Result<String, toml::ser::Error> {
    toml::to_string_pretty(&doc.values)
}

/// Splice synthesized keys into the original document text.
///
/// Used when write-back repairs a file that already exists: every authored
/// line is kept byte-for-byte and only the synthesized keys (those present in
/// the merged values but absent from the original) are inserted, each at the
/// position the merge chose for it. Comment lines written directly above a
/// key move with that key. Falls back to a full [`to_yaml`] rendering when
/// the original is not a block-style mapping.
///
/// # Errors
///
/// Returns the serializer error when a synthesized subtree cannot be emitted
/// as YAML.
pub fn repair_yaml(original: &str, doc: &ConfigDocument) -> Result<String, serde_yaml::Error> {
    let parsed: Value = serde_yaml::from_str(original).unwrap_or(Value::Null);
    let Value::Mapping(original_map) = parsed else {
        return to_yaml(doc);
    };
    let lines: Vec<String> = original.lines().map(str::to_string).collect();
    let spliced = splice(&doc.values, &original_map, &lines, 0, "", &doc.annotations)?;
    let mut text = spliced.join("\n");
    text.push('\n');
    Ok(text)
}

/// One top-level key of a block at a given indent: the key line, the comment
/// lines attached directly above it, and the extent of its value block.
struct Span {
    key: String,
    attach: usize,
    key_line: usize,
    end: usize,
}

fn key_spans(lines: &[String], indent: usize) -> Vec<Span> {
    let re = key_line_regex();
    let mut spans: Vec<Span> = Vec::new();
    for (i, line) in lines.iter().enumerate() {
        if let Some(captures) = re.captures(line)
            && captures[1].len() == indent
        {
            let mut attach = i;
            while attach > 0 && attached_comment(&lines[attach - 1], indent) {
                attach -= 1;
            }
            if let Some(previous) = spans.last_mut() {
                previous.end = attach;
            }
            spans.push(Span {
                key: captures[2].to_string(),
                attach,
                key_line: i,
                end: lines.len(),
            });
        }
    }
    spans
}

fn attached_comment(line: &str, indent: usize) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with('#') && line.len() - trimmed.len() <= indent
}

fn lookup<'a>(map: &'a Mapping, name: &str) -> Option<&'a Value> {
    // Exact first; the case-insensitive fallback covers documents whose keys
    // were lowercased before the merge.
    if let Some(value) = map.get(name) {
        return Some(value);
    }
    map.iter()
        .find(|(key, _)| key.as_str().is_some_and(|key| key.eq_ignore_ascii_case(name)))
        .map(|(_, value)| value)
}

fn has_missing(merged: &Mapping, original: &Mapping) -> bool {
    for (key, value) in merged {
        let Some(name) = key.as_str() else { continue };
        match lookup(original, name) {
            None => return true,
            Some(Value::Mapping(sub_original)) => {
                if let Value::Mapping(sub_merged) = value
                    && has_missing(sub_merged, sub_original)
                {
                    return true;
                }
            }
            Some(_) => {}
        }
    }
    false
}

fn child_indent(body: &[String]) -> Option<usize> {
    let re = key_line_regex();
    body.iter()
        .find_map(|line| re.captures(line).map(|captures| captures[1].len()))
}

fn splice(
    merged: &Mapping,
    original: &Mapping,
    lines: &[String],
    indent: usize,
    path: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<Vec<String>, serde_yaml::Error> {
    let spans = key_spans(lines, indent);
    let head = spans.first().map_or(lines.len(), |span| span.attach);

    let mut out: Vec<String> = lines[..head].to_vec();
    let mut pending: Vec<String> = Vec::new();

    // Merged order agrees with the original line order for existing keys, so
    // iterating it interleaves kept blocks and insertions correctly.
    for (key, value) in merged {
        let Some(name) = key.as_str() else { continue };
        let Some(original_value) = lookup(original, name) else {
            pending.extend(render_snippet(name, value, indent, path, annotations)?);
            continue;
        };
        let Some(span) = find_span(&spans, name) else {
            // Key exists but its line is not recognizable (quoted, flow at
            // the root); its text is preserved inside a neighboring block.
            continue;
        };
        out.append(&mut pending);

        if let (Value::Mapping(sub_merged), Value::Mapping(sub_original)) = (value, original_value)
            && has_missing(sub_merged, sub_original)
        {
            let body = &lines[span.key_line + 1..span.end];
            match child_indent(body) {
                Some(inner) => {
                    out.extend(lines[span.attach..=span.key_line].iter().cloned());
                    out.extend(splice(
                        sub_merged,
                        sub_original,
                        body,
                        inner,
                        &join_path(path, name),
                        annotations,
                    )?);
                }
                // Flow-style value; re-render the whole subtree.
                None => {
                    out.extend(lines[span.attach..span.key_line].iter().cloned());
                    out.extend(render_snippet(name, value, indent, path, annotations)?);
                    out.extend(lines[span.key_line + 1..span.end].iter().cloned());
                }
            }
        } else {
            out.extend(lines[span.attach..span.end].iter().cloned());
        }
    }
    out.append(&mut pending);
    Ok(out)
}

fn find_span<'a>(spans: &'a [Span], name: &str) -> Option<&'a Span> {
    spans
        .iter()
        .find(|span| span.key == name)
        .or_else(|| spans.iter().find(|span| span.key.eq_ignore_ascii_case(name)))
}

/// Render one synthesized key (and its subtree) as indented, commented lines.
fn render_snippet(
    name: &str,
    value: &Value,
    indent: usize,
    path: &str,
    annotations: &BTreeMap<String, String>,
) -> Result<Vec<String>, serde_yaml::Error> {
    let mut single = Mapping::new();
    single.insert(Value::String(name.to_string()), value.clone());
    let body = serde_yaml::to_string(&Value::Mapping(single))?;

    // Re-key annotations relative to the snippet, which starts at depth zero.
    let prefix = join_path(path, name);
    let nested = format!("{prefix}.");
    let relative: BTreeMap<String, String> = annotations
        .iter()
        .filter_map(|(annotated, text)| {
            if annotated == &prefix {
                Some((name.to_string(), text.clone()))
            } else {
                annotated
                    .strip_prefix(&nested)
                    .map(|rest| (format!("{name}.{rest}"), text.clone()))
            }
        })
        .collect();
    let commented = if relative.is_empty() {
        body
    } else {
        inject_comments(&body, &relative)
    };

    let pad = " ".repeat(indent);
    Ok(commented
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{pad}{line}")
            }
        })
        .collect())
}

fn key_line_regex() -> Regex {
    Regex::new(r"^( *)([A-Za-z0-9_-]+):").expect("static pattern")
}

/// Insert `#` comment lines above annotated keys.
///
/// Tracks the dot-joined key path of each emitted mapping line via its
/// indentation. Lines that do not look like plain mapping keys (sequence
/// items, quoted keys) are passed through and never annotated.
fn inject_comments(body: &str, annotations: &BTreeMap<String, String>) -> String {
    let key_line = key_line_regex();
    let mut stack: Vec<(usize, String)> = Vec::new();
    let mut out: Vec<String> = Vec::new();

    for line in body.lines() {
        if let Some(captures) = key_line.captures(line) {
            let indent = captures[1].len();
            while stack.last().is_some_and(|(depth, _)| *depth >= indent) {
                stack.pop();
            }
            stack.push((indent, captures[2].to_string()));

            let path = stack
                .iter()
                .map(|(_, key)| key.as_str())
                .collect::<Vec<_>>()
                .join(".");
            if let Some(description) = annotations.get(&path) {
                for text in description.lines() {
                    out.push(format!("{}# {}", " ".repeat(indent), text));
                }
            }
        }
        out.push(line.to_string());
    }

    let mut rendered = out.join("\n");
    rendered.push('\n');
    rendered
}
