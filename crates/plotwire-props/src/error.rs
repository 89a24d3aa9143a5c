use std::path::PathBuf;

use thiserror::Error;

use crate::container::ContainerKind;
use crate::value::ContainerId;

/// A value was rejected by a [`TypeSpec`](crate::TypeSpec).
///
/// The message is absent when validation was requested without detail, so
/// hot paths that only care about validity skip formatting entirely.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{}", .message.as_deref().unwrap_or(""))]
pub struct ValidationError {
    message: Option<String>,
}

impl ValidationError {
    pub fn detailed(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }

    pub fn bare() -> Self {
        Self { message: None }
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContainerError {
    #[error("no container {0}")]
    Missing(ContainerId),
    #[error("container {id} holds a {actual}, not a {expected}")]
    KindMismatch {
        id: ContainerId,
        expected: ContainerKind,
        actual: ContainerKind,
    },
    #[error("index {index} out of range for length {len}")]
    IndexOutOfRange { index: usize, len: usize },
    #[error("{0} is not present")]
    ValueNotFound(String),
    #[error("key {0} is not present")]
    KeyNotFound(String),
    #[error("pop from an empty container")]
    Empty,
    #[error("Must stream updates to all existing columns ({0})")]
    StreamColumns(String),
    #[error("All streaming column updates must be the same length")]
    StreamLengths,
    #[error("Can only patch existing columns (extra: {0})")]
    PatchColumns(String),
    #[error("Out-of bounds index ({index}) in patch for column: {column}")]
    PatchIndex { column: String, index: usize },
    #[error("Out-of bounds slice index stop ({stop}) in patch for column: {column}")]
    PatchSlice { column: String, stop: usize },
    #[error("failed to validate {target}: {source}")]
    Validation {
        target: String,
        #[source]
        source: ValidationError,
    },
    #[error("{0}")]
    Usage(String),
}

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("could not read image file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("unrecognised image data")]
    UnknownFormat,
    #[error("failed to encode image: {0}")]
    Encode(#[from] image::ImageError),
    #[error("expected a uint8 array of shape (height, width, 3|4), got {dtype} array of shape {shape:?}")]
    BadArray { dtype: &'static str, shape: Vec<usize> },
    #[error("{0} cannot be converted to an image")]
    Unsupported(String),
}
