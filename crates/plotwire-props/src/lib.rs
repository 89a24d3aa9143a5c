//! Typed property specs, validation and observable containers for plotwire.
//!
//! This crate is the leaf of the workspace:
//! - [`value`]: the closed [`Value`] model every attribute holds,
//! - [`spec`]: [`TypeSpec`], the declarative validator and coercer of a value domain,
//! - [`validation`]: the scoped validation on/off switch,
//! - [`container`]: the arena of mutation-observable aggregates and their hints,
//! - [`image`]: the wire transform for image-valued attributes.

pub mod container;
pub mod error;
pub mod image;
pub mod spec;
pub mod validation;
pub mod value;

pub use container::{
    ColumnMap, ColumnsMut, ContainerArena, ContainerKind, ContainerValue, DictMut, Hint, ListMut,
    Owner, OwnerNotify, PatchIndex, PatchSet, PropertyContainer, SetMut, Slice,
};
pub use error::{ContainerError, ImageError, ValidationError};
pub use spec::{TypeSpec, ValueContext};
pub use validation::{set_validation, validation_on, without_property_validation, ValidationGuard};
pub use value::{AxisIndex, ContainerId, DType, Key, ModelId, NdArray, Value};
