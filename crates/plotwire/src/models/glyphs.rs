use plotwire_props::{TypeSpec, Value};

use super::empty_list;
use crate::error::ModelError;
use crate::model::{DefaultValue, ModelDef, ModelRegistry};

pub(super) fn register(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    registry.register(ModelDef::builder("Glyph").extends("Model").abstract_type())?;
    registry.register(
        ModelDef::builder("Scatter")
            .extends("Glyph")
            .dataspec("x", TypeSpec::number_spec(), DefaultValue::value("x"))
            .dataspec("y", TypeSpec::number_spec(), DefaultValue::value("y"))
            .dataspec("size", TypeSpec::number_spec(), DefaultValue::value(4.0))
            .prop("marker", TypeSpec::marker_type(), DefaultValue::value("circle"))
            .prop("fill_color", TypeSpec::nullable(TypeSpec::color()), DefaultValue::value("gray"))
            .prop("fill_alpha", TypeSpec::Percent, DefaultValue::value(1.0))
            .prop("line_color", TypeSpec::nullable(TypeSpec::color()), DefaultValue::value("black"))
            .prop("line_width", TypeSpec::non_negative(TypeSpec::Float), DefaultValue::value(1.0))
            .prop("line_dash", TypeSpec::DashPattern, empty_list())
            .prop("hatch_pattern", TypeSpec::nullable(TypeSpec::String), DefaultValue::Value(Value::Null)),
    )?;
    Ok(())
}
