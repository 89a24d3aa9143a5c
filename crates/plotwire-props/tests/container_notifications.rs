use indexmap::IndexMap;
use plotwire_props::{
    AxisIndex, ColumnMap, ContainerArena, ContainerError, ContainerId, ContainerValue, DType, Hint,
    Key, ModelId, NdArray, Owner, PatchIndex, PatchSet, Slice, Value,
};

#[derive(Debug, Clone, PartialEq)]
struct Notice {
    attr: String,
    old: ContainerValue,
    hint: Option<Hint>,
}

fn recorder(log: &mut Vec<Notice>) -> impl FnMut(&Owner, &ContainerValue, Option<&Hint>) + '_ {
    move |owner, old, hint| {
        log.push(Notice {
            attr: owner.attr.clone(),
            old: old.clone(),
            hint: hint.cloned(),
        })
    }
}

fn owned(arena: &mut ContainerArena, value: ContainerValue, attrs: &[&str]) -> ContainerId {
    let id = arena.alloc(value);
    let model = ModelId::next();
    for attr in attrs {
        arena
            .register_owner(id, Owner::new(model, *attr))
            .expect("container exists");
    }
    id
}

fn columns(entries: &[(&str, Value)]) -> ColumnMap {
    entries
        .iter()
        .map(|(k, v)| ((*k).to_owned(), v.clone()))
        .collect()
}

fn column_of(arena: &ContainerArena, id: ContainerId, name: &str) -> Value {
    match arena.get(id).expect("container").value() {
        ContainerValue::ColumnData(cols) => cols[name].clone(),
        other => panic!("not a column table: {other:?}"),
    }
}

#[test]
fn every_owner_hears_every_mutation_once() {
    let mut arena = ContainerArena::new();
    let id = owned(&mut arena, ContainerValue::List(vec![1i64.into()]), &["foo", "bar"]);
    let mut log = Vec::new();
    {
        let mut list = arena.list(id, recorder(&mut log)).expect("list");
        list.push(2i64).unwrap();
        list.insert(0, 0i64).unwrap();
        list.reverse().unwrap();
    }
    assert_eq!(log.len(), 6);
    assert_eq!(log[0].attr, "foo");
    assert_eq!(log[1].attr, "bar");
    assert_eq!(log[0].old, ContainerValue::List(vec![1i64.into()]));
    assert_eq!(log[2].old, ContainerValue::List(vec![1i64.into(), 2i64.into()]));
    assert!(log.iter().all(|n| n.hint.is_none()));
}

#[test]
fn failed_mutations_notify_nobody() {
    let mut arena = ContainerArena::new();
    let id = owned(&mut arena, ContainerValue::List(vec![]), &["foo"]);
    let mut log = Vec::new();
    {
        let mut list = arena.list(id, recorder(&mut log)).expect("list");
        assert_eq!(list.pop(), Err(ContainerError::Empty));
        assert_eq!(
            list.remove(3),
            Err(ContainerError::IndexOutOfRange { index: 3, len: 0 })
        );
        assert!(matches!(
            list.remove_value(&Value::Int(1)),
            Err(ContainerError::ValueNotFound(_))
        ));
    }
    assert!(log.is_empty());
}

#[test]
fn registration_is_exact() {
    let mut arena = ContainerArena::new();
    let id = arena.alloc(ContainerValue::List(vec![]));
    let owner = Owner::new(ModelId::next(), "items");
    assert!(arena.register_owner(id, owner.clone()).unwrap());
    assert!(!arena.register_owner(id, owner.clone()).unwrap());
    let mut log = Vec::new();
    arena.list(id, recorder(&mut log)).unwrap().push(1i64).unwrap();
    assert_eq!(log.len(), 1);

    assert!(arena.unregister_owner(id, &owner).unwrap());
    log.clear();
    arena.list(id, recorder(&mut log)).unwrap().push(2i64).unwrap();
    assert!(log.is_empty());
}

#[test]
fn list_operations_follow_sequence_semantics() {
    let mut arena = ContainerArena::new();
    let id = arena.alloc(ContainerValue::List(Value::list([3i64, 1, 2]).as_items().unwrap().to_vec()));
    let mut log = Vec::new();
    let mut list = arena.list(id, recorder(&mut log)).unwrap();
    list.sort().unwrap();
    assert_eq!(list.items(), Value::list([1i64, 2, 3]).as_items().unwrap());
    list.set_slice(Slice::range(1, 2), vec![7i64.into(), 8i64.into()]).unwrap();
    assert_eq!(list.items(), Value::list([1i64, 7, 8, 3]).as_items().unwrap());
    list.delete_range(Slice::new(None, None, Some(2))).unwrap();
    assert_eq!(list.items(), Value::list([7i64, 3]).as_items().unwrap());
    list.repeat(2).unwrap();
    assert_eq!(list.items(), Value::list([7i64, 3, 7, 3]).as_items().unwrap());
    assert_eq!(list.set(0, 9i64).unwrap(), Value::Int(7));
    assert!(list
        .set_slice(Slice::new(None, None, Some(2)), vec![Value::Null])
        .is_err());
    list.truncate(1).unwrap();
    assert_eq!(list.items(), &[Value::Int(9)]);
}

#[test]
fn repeat_notifies_with_the_original_contents() {
    let mut arena = ContainerArena::new();
    let id = owned(&mut arena, ContainerValue::List(vec![Value::from("a"), Value::Null]), &["tags"]);
    let mut log = Vec::new();
    {
        let mut list = arena.list(id, recorder(&mut log)).unwrap();
        list.repeat(3).unwrap();
        assert_eq!(list.len(), 6);
        assert_eq!(list.items()[4], Value::from("a"));
        list.repeat(0).unwrap();
        assert!(list.is_empty());
    }
    assert_eq!(log.len(), 2);
    assert_eq!(log[0].old, ContainerValue::List(vec![Value::from("a"), Value::Null]));
    assert_eq!(log[1].old.len(), 6);
}

#[test]
fn dict_and_set_operations_notify() {
    let mut arena = ContainerArena::new();
    let dict = owned(&mut arena, ContainerValue::Dict(IndexMap::new()), &["d"]);
    let set = owned(&mut arena, ContainerValue::Set(Default::default()), &["s"]);
    let mut log = Vec::new();
    {
        let mut d = arena.dict(dict, recorder(&mut log)).unwrap();
        assert_eq!(d.insert("a", 1i64).unwrap(), None);
        assert_eq!(d.set_default("a", 5i64).unwrap(), Value::Int(1));
        assert_eq!(d.set_default("b", 5i64).unwrap(), Value::Int(5));
        assert_eq!(d.pop(&Key::from("zz"), Some(Value::Null)).unwrap(), Value::Null);
        assert_eq!(d.pop_item().unwrap(), (Key::from("b"), Value::Int(5)));
        assert!(d.remove(&Key::from("zz")).is_err());
    }
    assert_eq!(log.len(), 5);
    log.clear();
    {
        let mut s = arena.set(set, recorder(&mut log)).unwrap();
        s.update([Key::from(1i64), Key::from(2i64), Key::from(3i64)]).unwrap();
        s.difference_update([Key::from(1i64)]).unwrap();
        s.symmetric_difference_update([Key::from(3i64), Key::from(4i64)]).unwrap();
        assert!(s.contains(&Key::from(2i64)));
        assert!(s.contains(&Key::from(4i64)));
        assert!(!s.contains(&Key::from(3i64)));
        s.intersection_update([Key::from(4i64)]).unwrap();
        assert_eq!(s.len(), 1);
        assert!(!s.discard(&Key::from(9i64)).unwrap());
        assert!(s.remove(&Key::from(9i64)).is_err());
    }
    assert_eq!(log.len(), 5);
}

#[test]
fn shallow_copies_share_nested_containers_and_deep_copies_do_not() {
    let mut arena = ContainerArena::new();
    let inner = arena.alloc(ContainerValue::List(vec![1i64.into()]));
    let outer = owned(
        &mut arena,
        ContainerValue::Dict([(Key::from("inner"), Value::Container(inner))].into_iter().collect()),
        &["d"],
    );

    let shallow = arena.shallow_copy(outer).unwrap();
    assert_eq!(arena.get(shallow).unwrap().value(), arena.get(outer).unwrap().value());
    assert_eq!(arena.get(shallow).unwrap().owners().count(), 0);

    let deep = arena.deep_copy(outer).unwrap();
    let copied_inner = match arena.get(deep).unwrap().value() {
        ContainerValue::Dict(entries) => entries[&Key::from("inner")].as_container().unwrap(),
        other => panic!("unexpected {other:?}"),
    };
    assert_ne!(copied_inner, inner);

    arena.list(inner, recorder(&mut Vec::new())).unwrap().push(2i64).unwrap();
    assert_eq!(
        arena.to_plain(&Value::Container(shallow)),
        Value::map([("inner", Value::list([1i64, 2]))])
    );
    assert_eq!(
        arena.to_plain(&Value::Container(deep)),
        Value::map([("inner", Value::list([1i64]))])
    );
}

#[test]
fn column_changes_carry_hints() {
    let mut arena = ContainerArena::new();
    let id = owned(
        &mut arena,
        ContainerValue::ColumnData(columns(&[("x", Value::list([1i64, 2]))])),
        &["data"],
    );
    let mut log = Vec::new();
    {
        let mut cols = arena.columns(id, recorder(&mut log)).unwrap();
        cols.set_column("y", Value::list([3i64, 4])).unwrap();
        cols.update(columns(&[("x", Value::list([5i64, 6])), ("z", Value::list([7i64, 8]))]))
            .unwrap();
        cols.remove_column("z").unwrap();
        assert!(cols.set_column("bad", Value::Int(1)).is_err());
    }
    let hints: Vec<Option<Hint>> = log.into_iter().map(|n| n.hint).collect();
    assert_eq!(
        hints,
        vec![
            Some(Hint::ColumnDataChanged { cols: vec!["y".into()] }),
            Some(Hint::ColumnDataChanged {
                cols: vec!["x".into(), "z".into()]
            }),
            None,
        ]
    );
}

#[test]
fn stream_hint_carries_only_new_rows() {
    let mut arena = ContainerArena::new();
    let id = owned(
        &mut arena,
        ContainerValue::ColumnData(columns(&[
            ("a", Value::list([1i64, 2, 3])),
            ("b", Value::Array(NdArray::from_vec(DType::Float64, vec![10.0, 20.0, 30.0]))),
        ])),
        &["data"],
    );
    let mut log = Vec::new();
    let new_rows = columns(&[("a", Value::list([4i64])), ("b", Value::list([40.0]))]);
    arena
        .columns(id, recorder(&mut log))
        .unwrap()
        .stream(new_rows.clone(), Some(3), Some("session-1"))
        .unwrap();

    assert_eq!(column_of(&arena, id, "a"), Value::list([2i64, 3, 4]));
    assert_eq!(
        column_of(&arena, id, "b"),
        Value::Array(NdArray::from_vec(DType::Float64, vec![20.0, 30.0, 40.0]))
    );
    assert_eq!(log.len(), 1);
    assert_eq!(
        log[0].hint,
        Some(Hint::ColumnsStreamed {
            setter: Some("session-1".into()),
            rollover: Some(3),
            data: new_rows,
        })
    );
    assert_eq!(
        log[0].old,
        ContainerValue::ColumnData(columns(&[
            ("a", Value::list([1i64, 2, 3])),
            ("b", Value::Array(NdArray::from_vec(DType::Float64, vec![10.0, 20.0, 30.0]))),
        ]))
    );
}

#[test]
fn stream_rejects_partial_and_ragged_updates() {
    let mut arena = ContainerArena::new();
    let id = arena.alloc(ContainerValue::ColumnData(columns(&[
        ("a", Value::list([1i64])),
        ("b", Value::list([2i64])),
    ])));
    let mut sink = Vec::new();
    let mut cols = arena.columns(id, recorder(&mut sink)).unwrap();
    let err = cols
        .stream(columns(&[("a", Value::list([1i64])), ("c", Value::list([1i64]))]), None, None)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "Must stream updates to all existing columns (missing: b, extra: c)"
    );
    let err = cols
        .stream(columns(&[("a", Value::list([1i64])), ("b", Value::list([1i64, 2]))]), None, None)
        .unwrap_err();
    assert_eq!(err, ContainerError::StreamLengths);
    assert_eq!(
        cols.columns().unwrap(),
        &columns(&[("a", Value::list([1i64])), ("b", Value::list([2i64]))])
    );
}

#[test]
fn patches_apply_in_order_and_later_edits_win() {
    let mut arena = ContainerArena::new();
    let id = owned(
        &mut arena,
        ContainerValue::ColumnData(columns(&[
            ("foo", Value::list([10i64, 20])),
            ("bar", Value::list([10i64, 20, 30, 40, 50])),
        ])),
        &["data"],
    );
    let mut patches = PatchSet::new();
    patches.insert(
        "foo".into(),
        vec![(PatchIndex::Row(1), 40i64.into()), (PatchIndex::Row(1), 50i64.into())],
    );
    patches.insert(
        "bar".into(),
        vec![
            (PatchIndex::Rows(Slice::range(0, 3)), Value::list([1i64, 2, 3])),
            (PatchIndex::Rows(Slice::range(1, 3)), Value::list([1000i64, 2000])),
        ],
    );
    let mut log = Vec::new();
    arena
        .columns(id, recorder(&mut log))
        .unwrap()
        .patch(patches.clone(), None)
        .unwrap();
    assert_eq!(column_of(&arena, id, "foo"), Value::list([10i64, 50]));
    assert_eq!(
        column_of(&arena, id, "bar"),
        Value::list([1i64, 1000, 2000, 40, 50])
    );
    assert_eq!(
        log[0].hint,
        Some(Hint::ColumnsPatched {
            setter: None,
            patches
        })
    );
}

#[test]
fn nested_patches_reach_into_array_rows() {
    let mut arena = ContainerArena::new();
    let image = |a: f64, b: f64| Value::Array(NdArray::from_vec(DType::Int32, vec![a, b]));
    let id = arena.alloc(ContainerValue::ColumnData(columns(&[(
        "foo",
        Value::List(vec![image(1.0, 40.0), image(1.0, 50.0)]),
    )])));
    let mut patches = PatchSet::new();
    patches.insert(
        "foo".into(),
        vec![(PatchIndex::Nested(1, vec![AxisIndex::At(0)]), 60i64.into())],
    );
    arena
        .columns(id, recorder(&mut Vec::new()))
        .unwrap()
        .patch(patches, None)
        .unwrap();
    assert_eq!(
        column_of(&arena, id, "foo"),
        Value::List(vec![image(1.0, 40.0), image(60.0, 50.0)])
    );
}

#[test]
fn patch_bounds_are_checked() {
    let mut arena = ContainerArena::new();
    let id = arena.alloc(ContainerValue::ColumnData(columns(&[("a", Value::list([1i64, 2]))])));
    let mut sink = Vec::new();
    let mut cols = arena.columns(id, recorder(&mut sink)).unwrap();

    let mut patches = PatchSet::new();
    patches.insert("missing".into(), vec![(PatchIndex::Row(0), Value::Null)]);
    assert_eq!(
        cols.patch(patches, None).unwrap_err().to_string(),
        "Can only patch existing columns (extra: missing)"
    );

    let mut patches = PatchSet::new();
    patches.insert("a".into(), vec![(PatchIndex::Row(2), Value::Null)]);
    assert_eq!(
        cols.patch(patches, None).unwrap_err().to_string(),
        "Out-of bounds index (2) in patch for column: a"
    );

    let mut patches = PatchSet::new();
    patches.insert(
        "a".into(),
        vec![(PatchIndex::Rows(Slice::range(0, 5)), Value::list([1i64, 2, 3, 4, 5]))],
    );
    assert_eq!(
        cols.patch(patches, None).unwrap_err().to_string(),
        "Out-of bounds slice index stop (5) in patch for column: a"
    );
}
