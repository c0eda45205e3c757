//! # schemed-config
//!
//! Schema-validated YAML configuration with default synthesis.
//!
//! schemed-config loads a human-authored YAML configuration file, validates
//! it against a JSON Schema, and fills in missing fields from the schema's
//! declared defaults. When a file is absent or incomplete, the repaired
//! document keeps the schema's declared key order and renders schema
//! descriptions as inline comments, so a generated file reads as if a human
//! wrote it.
//!
//! ## Features
//!
//! - Ordered default synthesis driven by schema declaration order
//! - Non-destructive merge: authored values are never overwritten
//! - Aggregated validation errors naming every failing path
//! - Optional write-back of the repaired file with inline comments
//! - TOML accepted as a secondary pass-through format
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use schemed_config::{LoadOptions, get_config};
//!
//! let doc = get_config("config.yml", "config_schema.yml", &LoadOptions::default()).unwrap();
//! println!("{:?}", doc.values);
//! ```
//!
//! ## Modules
//!
//! - [`data`] - Schema walking and document synthesis
//! - [`loader`] - The load/validate/write-back pipeline
//! - [`render`] - YAML/TOML rendering with comment injection
//! - [`error`] - Error taxonomy

/// Schema walking and document synthesis.
pub mod data;

/// Error taxonomy for the load pipeline.
pub mod error;

/// The load, validate, and write-back pipeline.
pub mod loader;

/// Rendering of merged documents, including comment injection.
pub mod render;

pub use data::{ConfigDocument, SchemaError, SchemaKind, SchemaNode};
pub use error::{ConfigError, Violation};
pub use loader::{Format, LoadOptions, get_config, get_config_from_values};
pub use serde_yaml::{Mapping, Value};
