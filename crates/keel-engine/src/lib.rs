//! Keel Engine - manifest discovery and MiniJinja rendering
//!
//! Everything about manifests that does not need a cluster: walking a tree,
//! deciding which files are templates or patches, rendering them against a
//! feature's context and splitting the result into documents.

pub mod engine;
pub mod error;
pub mod filters;
pub mod manifest;

pub use engine::{Engine, EngineBuilder};
pub use error::{EngineError, Result, TemplateError, TemplateErrorKind};
pub use manifest::{Manifest, ManifestSource, classify, discover, split_documents};
