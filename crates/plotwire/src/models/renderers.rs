use plotwire_props::spec::enums::RENDER_LEVEL;
use plotwire_props::{ContainerValue, ModelId, TypeSpec, Value};

use super::{auto_or, empty_list};
use crate::document::Document;
use crate::error::ModelError;
use crate::integrity::codes;
use crate::model::{DefaultValue, ModelDef, ModelRegistry};

pub(super) fn register(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    let level = || TypeSpec::named_enum("RenderLevel", RENDER_LEVEL);
    registry.register(
        ModelDef::builder("Renderer")
            .extends("Model")
            .abstract_type()
            .prop("level", level(), DefaultValue::value("image"))
            .prop("visible", TypeSpec::Bool, DefaultValue::value(true))
            .prop("x_range_name", TypeSpec::String, DefaultValue::value("default"))
            .prop("y_range_name", TypeSpec::String, DefaultValue::value("default")),
    )?;

    registry.register(
        ModelDef::builder("GuideRenderer")
            .extends("Renderer")
            .abstract_type()
            .prop("level", level(), DefaultValue::value("guide")),
    )?;
    registry.register(
        ModelDef::builder("Axis")
            .extends("GuideRenderer")
            .abstract_type()
            .prop("axis_label", TypeSpec::nullable(TypeSpec::String), DefaultValue::Value(Value::Null))
            .prop("axis_label_text_font_size", TypeSpec::FontSize, DefaultValue::value("13px"))
            .prop("major_label_text_font_size", TypeSpec::FontSize, DefaultValue::value("11px"))
            .prop("axis_line_color", TypeSpec::nullable(TypeSpec::color()), DefaultValue::value("black"))
            .prop("axis_line_dash", TypeSpec::DashPattern, empty_list())
            .prop(
                "bounds",
                auto_or(TypeSpec::tuple([TypeSpec::Float, TypeSpec::Float])),
                DefaultValue::value("auto"),
            ),
    )?;
    registry.register(ModelDef::builder("LinearAxis").extends("Axis"))?;
    registry.register(
        ModelDef::builder("Grid")
            .extends("GuideRenderer")
            .prop("level", level(), DefaultValue::value("underlay"))
            .prop("dimension", TypeSpec::interval(TypeSpec::Int, 0.0, 1.0), DefaultValue::value(0i64))
            .prop("axis", TypeSpec::nullable(TypeSpec::instance("Axis")), DefaultValue::Value(Value::Null))
            .prop("grid_line_color", TypeSpec::nullable(TypeSpec::color()), DefaultValue::value("#e5e5e5"))
            .prop("grid_line_dash", TypeSpec::DashPattern, empty_list())
            .prop(
                "band_fill_color",
                TypeSpec::nullable(TypeSpec::color()),
                DefaultValue::Value(Value::Null),
            ),
    )?;

    registry.register(
        ModelDef::builder("DataRenderer")
            .extends("Renderer")
            .abstract_type()
            .prop("level", level(), DefaultValue::value("glyph")),
    )?;
    registry.register(
        ModelDef::builder("GlyphRenderer")
            .extends("DataRenderer")
            .prop("data_source", TypeSpec::instance("DataSource"), DefaultValue::Model("ColumnDataSource"))
            .prop("glyph", TypeSpec::nullable(TypeSpec::instance("Glyph")), DefaultValue::Value(Value::Null))
            .prop(
                "selection_glyph",
                auto_or(TypeSpec::nullable(TypeSpec::instance("Glyph"))),
                DefaultValue::value("auto"),
            )
            .prop("muted", TypeSpec::Bool, DefaultValue::value(false))
            .check(codes::MISSING_GLYPH, missing_glyph)
            .check(codes::BAD_COLUMN_NAME, bad_column_name),
    )?;
    Ok(())
}

fn missing_glyph(doc: &Document, id: ModelId) -> Option<String> {
    let renderer = doc.model(id)?;
    renderer.get("glyph")?.is_null().then(|| doc.describe(id))
}

fn bad_column_name(doc: &Document, id: ModelId) -> Option<String> {
    let renderer = doc.model(id)?;
    let glyph = doc.model(renderer.get("glyph")?.as_ref_id()?)?;
    let source = doc.model(renderer.get("data_source")?.as_ref_id()?)?;
    let data = source.get("data")?.as_container()?;
    let ContainerValue::ColumnData(columns) = doc.containers().get(data)?.value() else {
        return None;
    };
    let missing: Vec<String> = glyph
        .def()
        .properties()
        .filter(|prop| prop.dataspec)
        .filter_map(|prop| {
            let field = glyph.get(prop.name)?.as_str()?;
            (!columns.contains_key(field)).then(|| format!("key \"{}\" value \"{field}\"", prop.name))
        })
        .collect();
    if missing.is_empty() {
        return None;
    }
    Some(format!("{} [renderer: {}]", missing.join(", "), doc.describe(id)))
}
