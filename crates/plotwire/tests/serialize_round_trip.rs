use plotwire::serialize::{
    decode_value, encode_value, from_json, from_json_str, to_json, to_json_string,
};
use plotwire::{
    DeserializeError, Document, ModelError, ModelId, ReferenceError, SerializeError,
    SerializerOptions, Value,
};
use plotwire_props::{without_property_validation, ContainerError, DType, NdArray};
use pretty_assertions::assert_eq;
use serial_test::serial;
use serde_json::{json, Value as Json};

const PNG_MAGIC: &[u8] = b"\x89PNG\r\n\x1a\n\0\0\0\rIHDR";

struct Scatter {
    doc: Document,
    plot: ModelId,
    source: ModelId,
}

fn scatter_document() -> Scatter {
    let mut doc = Document::new();
    let source = doc
        .create_with(
            "ColumnDataSource",
            [(
                "data",
                Value::map([
                    ("x", Value::from(NdArray::from_vec(DType::Float64, vec![1.0, 2.0, 3.0]))),
                    ("y", Value::list([4i64, 5, 6])),
                ]),
            )],
        )
        .unwrap();
    let glyph = doc
        .create_with(
            "Scatter",
            [
                ("x", Value::from("x")),
                ("y", Value::from("y")),
                ("marker", Value::from("square")),
            ],
        )
        .unwrap();
    let renderer = doc
        .create_with(
            "GlyphRenderer",
            [("data_source", Value::Ref(source)), ("glyph", Value::Ref(glyph))],
        )
        .unwrap();
    let plot = doc
        .create_with(
            "Plot",
            [
                ("title", Value::from("demo")),
                ("renderers", Value::list([Value::Ref(renderer)])),
            ],
        )
        .unwrap();
    doc.add_root(plot).unwrap();
    Scatter { doc, plot, source }
}

fn record<'a>(json: &'a Json, id: ModelId) -> &'a Json {
    let id = id.to_string();
    json["models"]
        .as_array()
        .unwrap()
        .iter()
        .find(|record| record["id"] == id.as_str())
        .unwrap_or_else(|| panic!("no record for {id}"))
}

#[test]
fn documents_survive_a_round_trip() {
    let Scatter { doc, plot, .. } = scatter_document();
    let options = SerializerOptions::default();
    let json = to_json(&doc, &options).unwrap();

    assert_eq!(json["roots"], json!([plot.to_string()]));
    // Plot, its ranges and scales, the renderer, its source and glyph.
    assert_eq!(json["models"].as_array().unwrap().len(), 8);

    let loaded = from_json(&json).unwrap();
    assert_eq!(loaded.roots(), vec![plot]);
    assert_eq!(loaded.len(), 8);
    assert_eq!(to_json(&loaded, &options).unwrap(), json);

    let text = to_json_string(&doc, &options).unwrap();
    let reparsed = from_json_str(&text).unwrap();
    assert_eq!(to_json(&reparsed, &options).unwrap(), json);
}

#[test]
fn records_carry_only_set_attributes_and_created_defaults() {
    let Scatter { doc, plot, .. } = scatter_document();
    let json = to_json(&doc, &SerializerOptions::default()).unwrap();
    let plot_record = record(&json, plot);

    assert_eq!(plot_record["type"], "Plot");
    let attributes = plot_record["attributes"].as_object().unwrap();
    assert_eq!(attributes["title"], "demo");
    assert_eq!(attributes["renderers"][0]["type"], "GlyphRenderer");
    assert!(!attributes.contains_key("width"));
    assert!(!attributes.contains_key("tags"));

    let x_range = doc.get(plot, "x_range").unwrap().as_ref_id().unwrap();
    assert_eq!(
        attributes["x_range"],
        json!({ "id": x_range.to_string(), "type": "DataRange1d" })
    );
    assert_eq!(record(&json, x_range)["attributes"], json!({}));
}

#[test]
fn defaults_can_be_included() {
    let Scatter { doc, plot, .. } = scatter_document();
    let options = SerializerOptions {
        include_defaults: true,
        ..SerializerOptions::default()
    };
    let json = to_json(&doc, &options).unwrap();
    let attributes = &record(&json, plot)["attributes"];
    assert_eq!(attributes["width"], 600);
    assert_eq!(attributes["hidpi"], true);
    assert_eq!(attributes["output_backend"], "canvas");
    assert_eq!(attributes["tags"], json!([]));
    assert_eq!(attributes["extra_x_ranges"], json!({ "type": "map", "entries": [] }));
}

#[test]
fn column_data_encodes_arrays() {
    let Scatter { doc, source, .. } = scatter_document();
    let json = to_json(&doc, &SerializerOptions::default()).unwrap();
    let data = &record(&json, source)["attributes"]["data"];
    assert_eq!(data["type"], "map");
    assert_eq!(data["entries"][0][0], "x");
    let x = &data["entries"][0][1];
    assert_eq!(x["type"], "ndarray");
    assert_eq!(x["dtype"], "float64");
    assert_eq!(x["shape"], json!([3]));
    assert_eq!(x["order"], "little");
    assert_eq!(x["array"]["type"], "bytes");
    assert_eq!(data["entries"][1], json!(["y", [4, 5, 6]]));

    let plain = SerializerOptions {
        binary_arrays: false,
        ..SerializerOptions::default()
    };
    let json = to_json(&doc, &plain).unwrap();
    let data = &record(&json, source)["attributes"]["data"];
    assert_eq!(data["entries"][0], json!(["x", [1.0, 2.0, 3.0]]));
}

#[test]
fn envelopes_carry_what_json_cannot() {
    let doc = Document::new();
    let options = SerializerOptions::default();

    let nan = encode_value(&doc, &Value::Float(f64::NAN), &options).unwrap();
    assert_eq!(nan, json!({ "type": "number", "value": "nan" }));
    assert!(decode_value(&doc, &nan).unwrap().as_f64().unwrap().is_nan());
    assert_eq!(
        encode_value(&doc, &Value::Float(f64::NEG_INFINITY), &options).unwrap(),
        json!({ "type": "number", "value": "-inf" })
    );

    let cases = [
        (Value::set(["a", "b"]), json!({ "type": "set", "entries": ["a", "b"] })),
        (Value::Bytes(vec![0, 1, 2]), json!({ "type": "bytes", "data": "AAEC" })),
        (
            Value::map([(1i64, "one"), (2i64, "two")]),
            json!({ "type": "map", "entries": [[1, "one"], [2, "two"]] }),
        ),
        (Value::Float(f64::INFINITY), json!({ "type": "number", "value": "+inf" })),
    ];
    for (value, wire) in cases {
        assert_eq!(encode_value(&doc, &value, &options).unwrap(), wire);
        assert_eq!(decode_value(&doc, &wire).unwrap(), value);
    }

    assert_eq!(
        decode_value(&doc, &json!({ "a": 1, "b": [true, null] })).unwrap(),
        Value::map([
            ("a", Value::Int(1)),
            ("b", Value::list([Value::Bool(true), Value::Null])),
        ])
    );
    assert!(matches!(
        decode_value(&doc, &json!({ "type": "number", "value": "lots" })),
        Err(DeserializeError::Malformed(_))
    ));
}

#[test]
fn list_arrays_decode_with_their_dtype() {
    let doc = Document::new();
    let wire = json!({ "type": "ndarray", "array": [1, 2, 3, 4], "shape": [2, 2], "dtype": "int32", "order": "little" });
    let Value::Array(array) = decode_value(&doc, &wire).unwrap() else {
        panic!("expected an array");
    };
    assert_eq!(array.dtype(), DType::Int32);
    assert_eq!(array.shape().to_vec(), vec![2usize, 2]);
    assert_eq!(array.data().to_vec(), vec![1.0, 2.0, 3.0, 4.0]);

    let plain = SerializerOptions {
        binary_arrays: false,
        ..SerializerOptions::default()
    };
    assert_eq!(
        encode_value(&doc, &Value::Array(array), &plain).unwrap(),
        json!([[1, 2], [3, 4]])
    );

    let big_endian = json!({ "type": "ndarray", "array": [1], "shape": [1], "dtype": "int32", "order": "big" });
    assert!(matches!(decode_value(&doc, &big_endian), Err(DeserializeError::Malformed(_))));
}

#[test]
fn oversized_array_shapes_are_rejected() {
    let doc = Document::new();
    let huge = json!({
        "type": "ndarray",
        "array": { "type": "bytes", "data": "" },
        "shape": [9_223_372_036_854_775_808u64, 2],
        "dtype": "float64",
        "order": "little",
    });
    assert!(matches!(
        decode_value(&doc, &huge),
        Err(DeserializeError::Model(ModelError::Container(ContainerError::Usage(_))))
    ));

    let mismatched = json!({ "type": "ndarray", "array": [1, 2, 3], "shape": [2, 2], "dtype": "int32" });
    assert!(matches!(
        decode_value(&doc, &mismatched),
        Err(DeserializeError::Model(ModelError::Container(ContainerError::Usage(_))))
    ));
}

#[test]
#[serial]
fn foreign_references_do_not_serialize() {
    let mut doc = Document::new();
    let plot = doc.create("Plot").unwrap();
    doc.add_root(plot).unwrap();
    let mut other = Document::new();
    let stranger = other.create("Range1d").unwrap();

    without_property_validation(|| doc.set(plot, "x_range", Value::Ref(stranger))).unwrap();
    let err = to_json(&doc, &SerializerOptions::default()).unwrap_err();
    assert!(matches!(err, SerializeError::DanglingReference(id) if id == stranger));
}

#[test]
#[serial]
fn loading_rejects_bad_documents() {
    let unresolved = json!({
        "roots": [],
        "models": [{ "type": "Plot", "id": "p9000001", "attributes": { "x_range": { "id": "p9000002", "type": "Range1d" } } }],
    });
    assert!(matches!(
        from_json(&unresolved),
        Err(DeserializeError::Reference(ReferenceError { id })) if id == "p9000002"
    ));

    let duplicated = json!({
        "roots": [],
        "models": [{ "type": "Range1d", "id": "p9000003" }, { "type": "Range1d", "id": "p9000003" }],
    });
    assert!(matches!(from_json(&duplicated), Err(DeserializeError::DuplicateId(id)) if id == "p9000003"));

    let bad_id = json!({ "roots": [], "models": [{ "type": "Range1d", "id": "range-one" }] });
    assert!(matches!(from_json(&bad_id), Err(DeserializeError::MalformedId(id)) if id == "range-one"));

    let unknown = json!({ "roots": [], "models": [{ "type": "Pie", "id": "p9000004" }] });
    assert!(matches!(
        from_json(&unknown),
        Err(DeserializeError::Model(ModelError::UnknownType(name))) if name == "Pie"
    ));

    let invalid = json!({ "roots": [], "models": [{ "type": "Range1d", "id": "p9000005", "attributes": { "start": "zero" } }] });
    assert!(matches!(
        from_json(&invalid),
        Err(DeserializeError::Model(ModelError::Validation { .. }))
    ));

    let missing_root = json!({ "roots": ["p9000006"], "models": [] });
    assert!(matches!(from_json(&missing_root), Err(DeserializeError::Reference(_))));

    assert!(matches!(from_json(&json!({ "roots": [] })), Err(DeserializeError::Malformed(_))));
    assert!(matches!(from_json_str("{"), Err(DeserializeError::Json(_))));
}

#[test]
fn references_resolve_in_any_record_order() {
    let json = json!({
        "roots": ["p9000011"],
        "models": [
            {
                "type": "Plot",
                "id": "p9000011",
                "attributes": {
                    "x_range": { "id": "p9000012", "type": "Range1d" },
                    "y_range": { "id": "p9000012", "type": "Range1d" },
                },
            },
            { "type": "Range1d", "id": "p9000012", "attributes": { "start": -1.5, "end": 2 } },
        ],
    });
    let doc = from_json(&json).unwrap();
    let plot = ModelId::parse("p9000011").unwrap();
    let range = ModelId::parse("p9000012").unwrap();
    assert_eq!(doc.get(plot, "x_range").unwrap(), &Value::Ref(range));
    assert_eq!(doc.get(range, "start").unwrap(), &Value::Float(-1.5));
    // Plot, the shared range, and the two default scales.
    assert_eq!(doc.len(), 4);

    let fresh = ModelId::next();
    assert!(fresh.raw() > range.raw());
}

#[test]
fn image_attributes_become_data_urls() {
    let dir = tempfile::tempdir().unwrap();
    let png = dir.path().join("icon.png");
    std::fs::write(&png, PNG_MAGIC).unwrap();
    let svg = dir.path().join("icon.svg");
    std::fs::write(&svg, "<svg/>").unwrap();

    let mut doc = Document::new();
    let from_bytes = doc
        .create_with("CustomAction", [("icon", Value::Bytes(PNG_MAGIC.to_vec()))])
        .unwrap();
    let from_file = doc.create_with("CustomAction", [("icon", Value::from(png))]).unwrap();
    let from_svg = doc.create_with("CustomAction", [("icon", Value::from(svg))]).unwrap();
    let named = doc.create_with("CustomAction", [("icon", Value::from("copy"))]).unwrap();
    for id in [from_bytes, from_file, from_svg, named] {
        doc.add_root(id).unwrap();
    }

    let json = to_json(&doc, &SerializerOptions::default()).unwrap();
    let icon = |id| record(&json, id)["attributes"]["icon"].as_str().unwrap().to_owned();
    assert!(icon(from_bytes).starts_with("data:image/png;base64,"));
    assert_eq!(icon(from_file), icon(from_bytes));
    assert!(icon(from_svg).starts_with("data:image/svg+xml;utf8,"));
    assert_eq!(icon(named), "copy");

    let missing = doc
        .create_with("CustomAction", [("icon", Value::from(dir.path().join("missing.png")))])
        .unwrap();
    doc.add_root(missing).unwrap();
    let err = to_json(&doc, &SerializerOptions::default()).unwrap_err();
    assert!(matches!(err, SerializeError::Image { ref attr, .. } if attr == "icon"));
}

#[test]
fn in_place_mutations_mark_attributes_for_output() {
    let mut doc = Document::new();
    let plot = doc.create("Plot").unwrap();
    doc.add_root(plot).unwrap();
    doc.list_mut(plot, "tags").unwrap().push("favourite").unwrap();

    let json = to_json(&doc, &SerializerOptions::default()).unwrap();
    let attributes = &record(&json, plot)["attributes"];
    assert_eq!(attributes["tags"], json!(["favourite"]));
    assert!(attributes.get("css_classes").is_none());
}
