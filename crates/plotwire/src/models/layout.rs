use plotwire_props::spec::enums::{OUTPUT_BACKEND, SIZING_MODE, SIZING_POLICY};
use plotwire_props::{Key, ModelId, TypeSpec, Value};

use super::{auto_or, empty_list, empty_map};
use crate::document::Document;
use crate::error::ModelError;
use crate::integrity::codes;
use crate::model::{DefaultValue, ModelDef, ModelRegistry};

const PLACES: [&str; 6] = ["above", "below", "left", "right", "center", "renderers"];

pub(super) fn register(registry: &mut ModelRegistry) -> Result<(), ModelError> {
    let size = || TypeSpec::nullable(TypeSpec::non_negative(TypeSpec::Int));
    let policy = || auto_or(TypeSpec::named_enum("SizingPolicy", SIZING_POLICY));
    let null = || DefaultValue::Value(Value::Null);
    registry.register(
        ModelDef::builder("LayoutDOM")
            .extends("Model")
            .abstract_type()
            .prop("width", size(), null())
            .prop("height", size(), null())
            .prop("min_width", size(), null())
            .prop("min_height", size(), null())
            .prop("max_width", size(), null())
            .prop("max_height", size(), null())
            .prop("width_policy", policy(), DefaultValue::value("auto"))
            .prop("height_policy", policy(), DefaultValue::value("auto"))
            .prop(
                "sizing_mode",
                TypeSpec::nullable(TypeSpec::named_enum("SizingMode", SIZING_MODE)),
                null(),
            )
            .prop("visible", TypeSpec::Bool, DefaultValue::value(true))
            .prop("disabled", TypeSpec::Bool, DefaultValue::value(false))
            .prop("css_classes", TypeSpec::list(TypeSpec::String), empty_list())
            .check(codes::MIN_PREFERRED_MAX_WIDTH, min_preferred_max_width)
            .check(codes::MIN_PREFERRED_MAX_HEIGHT, min_preferred_max_height),
    )?;

    let renderers = || TypeSpec::list(TypeSpec::instance("Renderer"));
    let ranges = || TypeSpec::dict(TypeSpec::String, TypeSpec::instance("Range"));
    let mut plot = ModelDef::builder("Plot")
        .extends("LayoutDOM")
        .prop("width", size(), DefaultValue::value(600i64))
        .prop("height", size(), DefaultValue::value(600i64))
        .prop("title", TypeSpec::nullable(TypeSpec::String), null());
    for place in PLACES {
        plot = plot.prop(place, renderers(), empty_list());
    }
    let plot = plot
        .prop("x_range", TypeSpec::instance("Range"), DefaultValue::Model("DataRange1d"))
        .prop("y_range", TypeSpec::instance("Range"), DefaultValue::Model("DataRange1d"))
        .prop("extra_x_ranges", ranges(), empty_map())
        .prop("extra_y_ranges", ranges(), empty_map())
        .prop("x_scale", TypeSpec::instance("Scale"), DefaultValue::Model("LinearScale"))
        .prop("y_scale", TypeSpec::instance("Scale"), DefaultValue::Model("LinearScale"))
        .prop("tools", TypeSpec::list(TypeSpec::instance("Tool")), empty_list())
        .prop("min_border", TypeSpec::nullable(TypeSpec::Int), DefaultValue::value(5i64))
        .prop(
            "background_fill_color",
            TypeSpec::nullable(TypeSpec::color()),
            DefaultValue::value("#ffffff"),
        )
        .prop("hidpi", TypeSpec::Bool, DefaultValue::value(true))
        .prop(
            "output_backend",
            TypeSpec::named_enum("OutputBackend", OUTPUT_BACKEND),
            DefaultValue::value("canvas"),
        )
        .check(codes::MISSING_RENDERERS, missing_renderers)
        .check(codes::BAD_EXTRA_RANGE_NAME, bad_extra_range_name);
    registry.register(plot)?;
    Ok(())
}

// ── Integrity checks ──────────────────────────────────────────────────────

fn missing_renderers(doc: &Document, id: ModelId) -> Option<String> {
    let renderers = doc.resolved(id, "renderers").ok()?;
    match renderers.as_items() {
        Some(items) if items.is_empty() => Some(doc.describe(id)),
        _ => None,
    }
}

fn bad_extra_range_name(doc: &Document, id: ModelId) -> Option<String> {
    let valid = |attr: &str| -> Vec<String> {
        let mut names = vec!["default".to_owned()];
        if let Ok(Value::Map(entries)) = doc.resolved(id, attr) {
            names.extend(entries.keys().filter_map(Key::as_str).map(str::to_owned));
        }
        names
    };
    let valid_x = valid("extra_x_ranges");
    let valid_y = valid("extra_y_ranges");

    let mut found = Vec::new();
    for place in PLACES {
        let Ok(Value::List(refs)) = doc.resolved(id, place) else {
            continue;
        };
        for target in refs.iter().filter_map(Value::as_ref_id) {
            let Some(model) = doc.model(target) else {
                continue;
            };
            let bad: Vec<String> = [("x_range_name", &valid_x), ("y_range_name", &valid_y)]
                .into_iter()
                .filter_map(|(attr, keys)| {
                    let name = model.get(attr)?.as_str()?;
                    (!keys.iter().any(|key| key == name)).then(|| format!("{attr}='{name}'"))
                })
                .collect();
            if !bad.is_empty() {
                found.push(format!("{} [{}]", bad.join(", "), doc.describe(target)));
            }
        }
    }
    (!found.is_empty()).then(|| found.join(", "))
}

fn min_preferred_max_width(doc: &Document, id: ModelId) -> Option<String> {
    min_preferred_max(doc, id, "width")
}

fn min_preferred_max_height(doc: &Document, id: ModelId) -> Option<String> {
    min_preferred_max(doc, id, "height")
}

/// `min <= preferred <= max`; the preferred size only counts when the
/// layout is fixed along that dimension.
fn min_preferred_max(doc: &Document, id: ModelId, dimension: &str) -> Option<String> {
    let model = doc.model(id)?;
    let number = |attr: String| model.get(&attr).and_then(Value::as_i64);
    let fixed = model.get("sizing_mode").and_then(Value::as_str) == Some("fixed")
        || model.get(&format!("{dimension}_policy")).and_then(Value::as_str) == Some("fixed");

    let min = number(format!("min_{dimension}")).unwrap_or(0);
    let preferred = number(dimension.to_owned())
        .filter(|_| fixed)
        .unwrap_or(min);
    let max = number(format!("max_{dimension}")).unwrap_or(preferred);
    (!(min <= preferred && preferred <= max)).then(|| doc.describe(id))
}
