use plotwire_props::TypeSpec;

use super::empty_map;
use crate::error::ModelError;
use crate::model::{ModelDef, ModelRegistry};

pub(super) fn register(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    registry.register(ModelDef::builder("DataSource").extends("Model").abstract_type())?;
    registry.register(
        ModelDef::builder("ColumnarDataSource")
            .extends("DataSource")
            .abstract_type(),
    )?;
    registry.register(
        ModelDef::builder("ColumnDataSource").extends("ColumnarDataSource").prop(
            "data",
            TypeSpec::column_data(TypeSpec::String, TypeSpec::seq(TypeSpec::Any)),
            empty_map(),
        ),
    )?;
    Ok(())
}
