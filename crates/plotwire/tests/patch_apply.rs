use plotwire::serialize::{from_json, to_json};
use plotwire::{
    drain_patches, ColumnMap, DeserializeError, Document, ModelId, PatchHint, PatchIndex,
    PatchMessage, PatchSet, SerializerOptions, Value,
};
use plotwire_props::{DType, NdArray};
use pretty_assertions::assert_eq;
use serde_json::json;

struct Pair {
    primary: Document,
    replica: Document,
    plot: ModelId,
    source: ModelId,
}

fn replicated_scatter() -> Pair {
    let mut primary = Document::new();
    let source = primary
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
    let glyph = primary
        .create_with("Scatter", [("x", Value::from("x")), ("y", Value::from("y"))])
        .unwrap();
    let renderer = primary
        .create_with(
            "GlyphRenderer",
            [("data_source", Value::Ref(source)), ("glyph", Value::Ref(glyph))],
        )
        .unwrap();
    let plot = primary
        .create_with("Plot", [("renderers", Value::list([Value::Ref(renderer)]))])
        .unwrap();
    primary.add_root(plot).unwrap();

    let mut replica = from_json(&to_json(&primary, &SerializerOptions::default()).unwrap()).unwrap();
    primary.record_events(true);
    replica.record_events(true);
    Pair {
        primary,
        replica,
        plot,
        source,
    }
}

/// Sends every pending change of `from` through its JSON text form.
fn ship(from: &mut Document, to: &mut Document, setter: &str) -> Vec<PatchMessage> {
    let messages = drain_patches(from, &SerializerOptions::default()).unwrap();
    for message in &messages {
        let text = serde_json::to_string(message).unwrap();
        let received: PatchMessage = serde_json::from_str(&text).unwrap();
        assert_eq!(&received, message);
        to.apply_patch(&received, Some(setter)).unwrap();
    }
    messages
}

#[test]
fn streamed_rows_replay_on_a_replica() {
    let Pair {
        mut primary,
        mut replica,
        source,
        ..
    } = replicated_scatter();
    let data: ColumnMap = [
        ("x".to_owned(), Value::list([4.0])),
        ("y".to_owned(), Value::list([7i64])),
    ]
    .into_iter()
    .collect();
    primary.stream(source, "data", data, Some(3), Some("session-A")).unwrap();

    let messages = ship(&mut primary, &mut replica, "primary");
    assert_eq!(messages.len(), 1);
    assert_eq!(
        messages[0].hint,
        Some(PatchHint::ColumnsStreamed {
            setter: Some("session-A".to_owned()),
            rollover: Some(3),
        })
    );
    assert_eq!(
        messages[0].new,
        json!({ "type": "map", "entries": [["x", [4.0]], ["y", [7]]] })
    );
    assert!(messages[0].references.is_empty());

    let wire = serde_json::to_value(&messages[0]).unwrap();
    assert!(wire.get("references").is_none());
    assert_eq!(
        wire["hint"],
        json!({ "kind": "streamed", "setter": "session-A", "rollover": 3 })
    );

    assert_eq!(
        replica.resolved(source, "data").unwrap(),
        primary.resolved(source, "data").unwrap()
    );
    assert_eq!(
        replica.resolved(source, "data").unwrap(),
        Value::map([
            ("x", Value::from(NdArray::from_vec(DType::Float64, vec![2.0, 3.0, 4.0]))),
            ("y", Value::list([5i64, 6, 7])),
        ])
    );

    let echoed = replica.take_events();
    assert_eq!(echoed.len(), 1);
    assert_eq!(echoed[0].setter.as_deref(), Some("primary"));
}

#[test]
fn cell_patches_and_column_replacements_replay() {
    let Pair {
        mut primary,
        mut replica,
        source,
        ..
    } = replicated_scatter();

    let mut patches = PatchSet::new();
    patches.insert("y".to_owned(), vec![(PatchIndex::Row(0), Value::Int(40))]);
    primary.patch(source, "data", patches, None).unwrap();
    primary
        .columns_mut(source, "data")
        .unwrap()
        .set_column("size", Value::list([1i64, 2, 3]))
        .unwrap();

    let messages = ship(&mut primary, &mut replica, "primary");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].hint, Some(PatchHint::ColumnsPatched { setter: None }));
    assert_eq!(messages[0].new, json!({ "y": [[0, 40]] }));
    assert_eq!(
        messages[1].hint,
        Some(PatchHint::ColumnDataChanged { cols: vec!["size".to_owned()] })
    );
    assert_eq!(
        messages[1].new,
        json!({ "type": "map", "entries": [["size", [1, 2, 3]]] })
    );

    assert_eq!(
        replica.resolved(source, "data").unwrap(),
        primary.resolved(source, "data").unwrap()
    );
}

#[test]
fn assignments_bring_new_instances_along() {
    let Pair {
        mut primary,
        mut replica,
        plot,
        ..
    } = replicated_scatter();

    let range = primary
        .create_with("Range1d", [("start", Value::from(2.0)), ("end", Value::from(5.0))])
        .unwrap();
    primary.set(plot, "x_range", Value::Ref(range)).unwrap();
    let extra = primary.create("GlyphRenderer").unwrap();
    primary
        .list_mut(plot, "renderers")
        .unwrap()
        .push(Value::Ref(extra))
        .unwrap();

    let messages = ship(&mut primary, &mut replica, "primary");
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].new, json!({ "id": range.to_string(), "type": "Range1d" }));
    assert_eq!(messages[0].references.len(), 1);
    assert_eq!(messages[0].hint, None);

    assert_eq!(replica.get(plot, "x_range").unwrap(), &Value::Ref(range));
    assert_eq!(replica.get(range, "start").unwrap(), &Value::Float(2.0));
    assert_eq!(replica.model(extra).unwrap().type_name(), "GlyphRenderer");
    assert_eq!(
        replica.resolved(plot, "renderers").unwrap(),
        primary.resolved(plot, "renderers").unwrap()
    );

    let options = SerializerOptions::default();
    assert_eq!(to_json(&replica, &options).unwrap(), to_json(&primary, &options).unwrap());
}

#[test]
fn the_hint_setter_stands_in_for_a_missing_one() {
    let Pair {
        mut primary,
        mut replica,
        source,
        ..
    } = replicated_scatter();
    let mut patches = PatchSet::new();
    patches.insert("y".to_owned(), vec![(PatchIndex::Row(2), Value::Int(60))]);
    primary.patch(source, "data", patches, Some("session-B")).unwrap();

    let messages = drain_patches(&mut primary, &SerializerOptions::default()).unwrap();
    let wire = serde_json::to_value(&messages[0]).unwrap();
    assert_eq!(wire["hint"], json!({ "kind": "patched", "setter": "session-B" }));

    replica.apply_patch(&messages[0], None).unwrap();
    let echoed = replica.take_events();
    assert_eq!(echoed.len(), 1);
    assert_eq!(echoed[0].setter.as_deref(), Some("session-B"));
    assert_eq!(
        replica.resolved(source, "data").unwrap(),
        primary.resolved(source, "data").unwrap()
    );
}

#[test]
fn messages_for_unknown_targets_are_rejected() {
    let Pair { mut replica, .. } = replicated_scatter();
    let message = PatchMessage {
        id: "p99999999".to_owned(),
        attr: "title".to_owned(),
        new: json!("hello"),
        hint: None,
        references: Vec::new(),
    };
    assert!(matches!(
        replica.apply_patch(&message, None),
        Err(DeserializeError::Reference(_))
    ));
}

#[test]
fn malformed_payloads_are_rejected() {
    let Pair {
        mut replica, source, ..
    } = replicated_scatter();
    let message = PatchMessage {
        id: source.to_string(),
        attr: "data".to_owned(),
        new: json!({ "y": "not a list" }),
        hint: Some(PatchHint::ColumnsPatched { setter: None }),
        references: Vec::new(),
    };
    assert!(matches!(
        replica.apply_patch(&message, None),
        Err(DeserializeError::Malformed(_))
    ));

    let out_of_range = PatchMessage {
        new: json!({ "y": [[10, 1]] }),
        ..message
    };
    assert!(matches!(
        replica.apply_patch(&out_of_range, None),
        Err(DeserializeError::Model(_))
    ));
    assert!(replica.take_events().is_empty());
}
