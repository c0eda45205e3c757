use std::path::PathBuf;

use thiserror::Error;

use crate::data::schema::SchemaError;

/// One schema violation reported by the validator.
#[derive(Debug, Clone)]
pub struct Violation {
    /// JSON-pointer style path of the failing value, `(root)` for the top.
    pub path: String,
    /// Human-readable reason.
    pub message: String,
}

/// Error taxonomy for the load pipeline.
///
/// All variants mean "configuration is unusable"; the only recoverable
/// condition, a missing configuration file, never surfaces here because it is
/// treated as an empty document.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The schema document itself is structurally invalid.
    #[error(transparent)]
    Schema(#[from] SchemaError),
    /// A document could not be parsed.
    #[error("error while parsing {path}: {message}")]
    Parse {
        /// Which input failed to parse.
        path: String,
        /// Parser diagnostic.
        message: String,
    },
    /// The merged document failed schema validation.
    ///
    /// Aggregates every failing path, not just the first.
    #[error("configuration does not match schema: {}", summarize(.violations))]
    Validation {
        /// All violations found in one validation pass.
        violations: Vec<Violation>,
    },
    /// Schema file missing or unreadable, or another fatal I/O failure.
    #[error("{}: {source}", .path.display())]
    Io {
        /// Path involved in the failure.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
}

fn summarize(violations: &[Violation]) -> String {
    violations
        .iter()
        .map(|violation| format!("{} at `{}`", violation.message, violation.path))
        .collect::<Vec<_>>()
        .join("; ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_display_names_every_path() {
        let err = ConfigError::Validation {
            violations: vec![
                Violation {
                    path: "/listen/port".to_string(),
                    message: "not an integer".to_string(),
                },
                Violation {
                    path: "(root)".to_string(),
                    message: "\"token\" is a required property".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("/listen/port"));
        assert!(text.contains("required property"));
    }
}
