use plotwire_props::{TypeSpec, Value};

use super::auto_or;
use crate::error::ModelError;
use crate::model::{DefaultValue, ModelDef, ModelRegistry};

pub(super) fn register(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    registry.register(ModelDef::builder("Range").extends("Model").abstract_type())?;
    registry.register(
        ModelDef::builder("Range1d")
            .extends("Range")
            .prop("start", TypeSpec::Float, DefaultValue::value(0.0))
            .prop("end", TypeSpec::Float, DefaultValue::value(1.0))
            .prop("reset_start", TypeSpec::nullable(TypeSpec::Float), DefaultValue::Value(Value::Null))
            .prop("reset_end", TypeSpec::nullable(TypeSpec::Float), DefaultValue::Value(Value::Null))
            .prop("bounds", TypeSpec::nullable(TypeSpec::MinMaxBounds), DefaultValue::Value(Value::Null)),
    )?;
    registry.register(
        ModelDef::builder("DataRange1d")
            .extends("Range")
            .prop("start", TypeSpec::nullable(TypeSpec::Float), DefaultValue::Value(Value::Null))
            .prop("end", TypeSpec::nullable(TypeSpec::Float), DefaultValue::Value(Value::Null))
            .prop(
                "renderers",
                auto_or(TypeSpec::list(TypeSpec::instance("Renderer"))),
                DefaultValue::value("auto"),
            )
            .prop("range_padding", TypeSpec::Float, DefaultValue::value(0.1))
            .prop(
                "follow",
                TypeSpec::nullable(TypeSpec::enumeration(&["start", "end"])),
                DefaultValue::Value(Value::Null),
            )
            .prop("bounds", TypeSpec::nullable(TypeSpec::MinMaxBounds), DefaultValue::Value(Value::Null)),
    )?;

    registry.register(ModelDef::builder("Scale").extends("Model").abstract_type())?;
    registry.register(ModelDef::builder("LinearScale").extends("Scale"))?;
    registry.register(ModelDef::builder("LogScale").extends("Scale"))?;
    Ok(())
}
