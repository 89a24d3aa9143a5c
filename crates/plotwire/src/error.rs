use plotwire_props::{ContainerError, ContainerId, ContainerKind, ImageError, ModelId, ValidationError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ModelError {
    #[error("unknown model type {0}")]
    UnknownType(String),
    #[error("{0} is abstract and cannot be instantiated")]
    AbstractType(&'static str),
    #[error("no model {0} in this document")]
    NoSuchModel(ModelId),
    #[error("model id {0} is already in use")]
    DuplicateId(ModelId),
    #[error("{type_name} has no attribute {attr}")]
    UnknownAttribute {
        type_name: &'static str,
        attr: String,
    },
    #[error("failed to validate {model}.{attr}: {source}")]
    Validation {
        model: String,
        attr: String,
        #[source]
        source: ValidationError,
    },
    #[error("{model}.{attr} does not hold a {expected}")]
    NotAContainer {
        model: String,
        attr: String,
        expected: ContainerKind,
    },
    #[error(transparent)]
    Container(#[from] ContainerError),
    #[error("{0}")]
    Usage(String),
}

/// A reference token names an instance the document does not hold.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unresolved reference to model {id}")]
pub struct ReferenceError {
    pub id: String,
}

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("reference to model {0}, which is not in this document")]
    DanglingReference(ModelId),
    #[error("no container {0}")]
    MissingContainer(ContainerId),
    #[error("container {0} contains itself")]
    Cycle(ContainerId),
    #[error("cannot encode {model}.{attr}: {source}")]
    Image {
        model: String,
        attr: String,
        #[source]
        source: ImageError,
    },
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("json encode failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Error)]
pub enum DeserializeError {
    #[error("json decode failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("malformed document: {0}")]
    Malformed(String),
    #[error("malformed model id {0:?}")]
    MalformedId(String),
    #[error("model id {0} appears twice")]
    DuplicateId(String),
    #[error(transparent)]
    Reference(#[from] ReferenceError),
    #[error(transparent)]
    Model(#[from] ModelError),
}

impl From<ContainerError> for DeserializeError {
    fn from(err: ContainerError) -> Self {
        DeserializeError::Model(ModelError::Container(err))
    }
}
