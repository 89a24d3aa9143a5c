//! Model graph and wire layer for plotwire documents.
//!
//! A [`Document`] holds model instances, typed by static [`ModelDef`]
//! property tables, and the containers their aggregate attributes live in.
//! Assignments and in-place container mutations emit [`ChangeEvent`]s that
//! can be encoded as incremental [`PatchMessage`]s; whole documents go
//! through [`serialize::to_json`] and [`serialize::from_json`].
//! [`integrity::check_integrity`] runs per-type consistency checks over the
//! graph reachable from a set of roots.

pub mod document;
pub mod error;
pub mod events;
pub mod graph;
pub mod instance;
pub mod integrity;
pub mod model;
mod models;
pub mod patch;
pub mod serialize;

pub use document::Document;
pub use error::{DeserializeError, ModelError, ReferenceError, SerializeError};
pub use events::{ChangeEvent, Fanout};
pub use graph::{collect_models, immediate_references, select, ModelGraph, Selector};
pub use instance::ModelInstance;
pub use integrity::{
    check_integrity, check_integrity_with, process_validation_issues, CheckOptions, IssueCode,
    Severity, ValidationIssue, ValidationIssues,
};
pub use model::{lookup, registry, DefaultValue, ModelDef, PropertyDef};
pub use patch::{drain_patches, PatchHint, PatchMessage};
pub use serialize::SerializerOptions;

pub use plotwire_props::{
    ColumnMap, ContainerKind, Hint, Key, ModelId, PatchIndex, PatchSet, Slice, TypeSpec, Value,
};
