//! Built-in model types.
//!
//! Each submodule registers one family of types. Parents are registered
//! before their subtypes so inherited property tables can be flattened.

mod glyphs;
mod layout;
mod ranges;
mod renderers;
mod sources;
mod tools;

use plotwire_props::{TypeSpec, Value};

use crate::error::ModelError;
use crate::model::{DefaultValue, ModelDef, ModelRegistry};

pub(crate) fn catalog() -> Result<ModelRegistry, ModelError> {
    let mut registry = ModelRegistry::new();
    registry.register(base())?;
    registry.register(ModelDef::builder("Callback").extends("Model").abstract_type())?;
    registry.register(
        ModelDef::builder("CustomJS")
            .extends("Callback")
            .prop("args", TypeSpec::dict(TypeSpec::String, TypeSpec::AnyRef), empty_map())
            .prop("code", TypeSpec::String, DefaultValue::value("")),
    )?;
    ranges::register(&mut registry)?;
    sources::register(&mut registry)?;
    glyphs::register(&mut registry)?;
    renderers::register(&mut registry)?;
    tools::register(&mut registry)?;
    layout::register(&mut registry)?;
    Ok(registry)
}

fn base() -> crate::model::ModelDefBuilder {
    ModelDef::builder("Model")
        .abstract_type()
        .prop("name", TypeSpec::nullable(TypeSpec::String), DefaultValue::Value(Value::Null))
        .prop("tags", TypeSpec::list(TypeSpec::AnyRef), empty_list())
        .prop(
            "js_property_callbacks",
            TypeSpec::dict(TypeSpec::String, TypeSpec::list(TypeSpec::instance("Callback"))),
            empty_map(),
        )
        .prop(
            "subscribed_events",
            TypeSpec::set(TypeSpec::String),
            DefaultValue::Factory(|| Value::set(Vec::<&str>::new())),
        )
        .prop("syncable", TypeSpec::Bool, DefaultValue::value(true))
}

pub(crate) fn empty_list() -> DefaultValue {
    DefaultValue::Value(Value::List(Vec::new()))
}

pub(crate) fn empty_map() -> DefaultValue {
    DefaultValue::Factory(|| Value::map(Vec::<(&str, Value)>::new()))
}

pub(crate) fn auto_or(other: TypeSpec) -> TypeSpec {
    TypeSpec::either([TypeSpec::named_enum("Auto", &["auto"]), other])
}
