use plotwire_props::{
    ColumnMap, ContainerArena, ContainerValue, DType, Hint, NdArray, Owner, Value,
};
use proptest::prelude::*;

fn expected_tail(old: &[i64], new: &[i64], rollover: Option<usize>) -> Vec<i64> {
    let all: Vec<i64> = old.iter().chain(new).copied().collect();
    match rollover {
        Some(r) => all[all.len().saturating_sub(r)..].to_vec(),
        None => all,
    }
}

fn stream_into(column: Value, new: Value, rollover: Option<usize>) -> Value {
    let mut arena = ContainerArena::new();
    let id = arena.alloc(ContainerValue::ColumnData(
        [("c".to_owned(), column)].into_iter().collect(),
    ));
    let data: ColumnMap = [("c".to_owned(), new)].into_iter().collect();
    arena
        .columns(id, |_: &Owner, _: &ContainerValue, _: Option<&Hint>| {})
        .expect("column table")
        .stream(data, rollover, None)
        .expect("valid stream");
    match arena.get(id).expect("container").value() {
        ContainerValue::ColumnData(columns) => columns["c"].clone(),
        other => panic!("unexpected {other:?}"),
    }
}

proptest! {
    #[test]
    fn list_columns_keep_the_trailing_window(
        old in prop::collection::vec(-1000i64..1000, 0..20),
        new in prop::collection::vec(-1000i64..1000, 0..20),
        rollover in prop::option::of(0usize..30),
    ) {
        let result = stream_into(Value::list(old.clone()), Value::list(new.clone()), rollover);
        prop_assert_eq!(result, Value::list(expected_tail(&old, &new, rollover)));
    }

    #[test]
    fn array_columns_match_list_semantics(
        old in prop::collection::vec(-1000i64..1000, 0..20),
        new in prop::collection::vec(-1000i64..1000, 0..20),
        rollover in prop::option::of(0usize..30),
    ) {
        let as_array = |xs: &[i64]| {
            Value::Array(NdArray::from_vec(DType::Float64, xs.iter().map(|&x| x as f64).collect()))
        };
        let result = stream_into(as_array(&old), Value::list(new.clone()), rollover);
        prop_assert_eq!(result, as_array(&expected_tail(&old, &new, rollover)));
    }

    #[test]
    fn full_buffers_stay_full(
        old in prop::collection::vec(-1000i64..1000, 1..20),
        extra in 0usize..20,
    ) {
        let r = old.len();
        let new: Vec<i64> = (0..extra.min(r) as i64).collect();
        let as_array = |xs: &[i64]| {
            Value::Array(NdArray::from_vec(DType::Int32, xs.iter().map(|&x| x as f64).collect()))
        };
        let result = stream_into(as_array(&old), as_array(&new), Some(r));
        prop_assert_eq!(result.column_len(), Some(r));
        prop_assert_eq!(result, as_array(&expected_tail(&old, &new, Some(r))));
    }
}
