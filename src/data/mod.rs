//! Configuration data structures and schema walking.
//!
//! This module provides the core data structures of the load pipeline:
//!
//! - Schema walking into an ordered property tree
//! - Document synthesis (ordered, non-destructive default merge)
//!
//! ## Architecture
//!
//! - [`schema`] - Schema Walker: ordered [`schema::SchemaNode`] tree
//! - [`document`] - Document Synthesizer: [`document::ConfigDocument`]

/// Schema walking into an ordered property tree.
pub mod schema;

/// Configuration document synthesis and key normalization.
pub mod document;

pub use document::ConfigDocument;
pub use schema::{SchemaError, SchemaKind, SchemaNode};
