use plotwire_props::{TypeSpec, Value};

use crate::error::ModelError;
use crate::model::{DefaultValue, ModelDef, ModelRegistry};

pub(super) fn register(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    registry.register(
        ModelDef::builder("Tool")
            .extends("Model")
            .abstract_type()
            .prop("description", TypeSpec::nullable(TypeSpec::String), DefaultValue::Value(Value::Null))
            .prop("visible", TypeSpec::Bool, DefaultValue::value(true)),
    )?;
    registry.register(
        ModelDef::builder("CustomAction")
            .extends("Tool")
            .prop(
                "description",
                TypeSpec::nullable(TypeSpec::String),
                DefaultValue::value("Perform a Custom Action"),
            )
            .prop("icon", TypeSpec::nullable(TypeSpec::Image), DefaultValue::Value(Value::Null))
            .prop(
                "callback",
                TypeSpec::nullable(TypeSpec::instance("Callback")),
                DefaultValue::Value(Value::Null),
            ),
    )?;
    Ok(())
}
