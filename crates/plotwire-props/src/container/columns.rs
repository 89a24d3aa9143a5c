//! Column tables: equal-length named columns, with streaming and patching.

use indexmap::{IndexMap, IndexSet};

use super::{ContainerValue, Hint, OwnerNotify, PropertyContainer};
use crate::error::ContainerError;
use crate::value::{flatten_numbers, AxisIndex, ContainerId, NdArray, Slice, Value};

/// Column name to column values.
pub type ColumnMap = IndexMap<String, Value>;

/// Column name to the `(index, value)` edits applied to it, in order.
pub type PatchSet = IndexMap<String, Vec<(PatchIndex, Value)>>;

/// Where a patch writes inside a column.
#[derive(Debug, Clone, PartialEq)]
pub enum PatchIndex {
    Row(usize),
    Rows(Slice),
    /// A row, then positions inside the array held at that row (or along the
    /// trailing axes of a multi-dimensional array column).
    Nested(usize, Vec<AxisIndex>),
}

/// Mutating view of a column-table container.
pub struct ColumnsMut<'a, S: OwnerNotify> {
    id: ContainerId,
    container: &'a mut PropertyContainer,
    sink: S,
}

impl<'a, S: OwnerNotify> ColumnsMut<'a, S> {
    pub(super) fn new(id: ContainerId, container: &'a mut PropertyContainer, sink: S) -> Self {
        Self { id, container, sink }
    }

    pub fn columns(&self) -> Option<&ColumnMap> {
        match &self.container.value {
            ContainerValue::ColumnData(columns) => Some(columns),
            _ => None,
        }
    }

    pub fn column(&self, name: &str) -> Option<&Value> {
        self.columns()?.get(name)
    }

    fn apply<R>(
        &mut self,
        op: impl FnOnce(&mut ColumnMap) -> Result<(R, Option<Hint>), ContainerError>,
    ) -> Result<R, ContainerError> {
        let id = self.id;
        self.container.apply(id, &mut self.sink, |value| match value {
            ContainerValue::ColumnData(columns) => op(columns),
            other => Err(ContainerError::KindMismatch {
                id,
                expected: super::ContainerKind::ColumnData,
                actual: other.kind(),
            }),
        })
    }

    pub fn set_column(&mut self, name: impl Into<String>, values: Value) -> Result<(), ContainerError> {
        let name = name.into();
        require_sequence(&name, &values)?;
        self.apply(|columns| {
            columns.insert(name.clone(), values);
            Ok(((), Some(Hint::ColumnDataChanged { cols: vec![name] })))
        })
    }

    /// Replaces or adds several columns at once.
    pub fn update(&mut self, data: ColumnMap) -> Result<(), ContainerError> {
        for (name, values) in &data {
            require_sequence(name, values)?;
        }
        self.apply(|columns| {
            let cols: Vec<String> = data.keys().cloned().collect();
            columns.extend(data);
            Ok(((), Some(Hint::ColumnDataChanged { cols })))
        })
    }

    pub fn remove_column(&mut self, name: &str) -> Result<Value, ContainerError> {
        self.apply(|columns| {
            columns
                .shift_remove(name)
                .map(|values| (values, None))
                .ok_or_else(|| ContainerError::KeyNotFound(format!("'{name}'")))
        })
    }

    pub fn clear(&mut self) -> Result<(), ContainerError> {
        self.apply(|columns| {
            columns.clear();
            Ok(((), None))
        })
    }

    /// Appends `data` to every column, keeping at most `rollover` trailing
    /// rows. The hint carries only the new rows.
    pub fn stream(
        &mut self,
        data: ColumnMap,
        rollover: Option<usize>,
        setter: Option<&str>,
    ) -> Result<(), ContainerError> {
        self.apply(|columns| {
            stream_columns(columns, &data, rollover)?;
            let hint = Hint::ColumnsStreamed {
                setter: setter.map(str::to_owned),
                rollover,
                data,
            };
            Ok(((), Some(hint)))
        })
    }

    /// Applies every edit in order; later edits to the same place win.
    /// Nothing is written unless every edit is valid.
    pub fn patch(&mut self, patches: PatchSet, setter: Option<&str>) -> Result<(), ContainerError> {
        self.apply(|columns| {
            patch_columns(columns, &patches)?;
            let hint = Hint::ColumnsPatched {
                setter: setter.map(str::to_owned),
                patches,
            };
            Ok(((), Some(hint)))
        })
    }
}

fn require_sequence(name: &str, values: &Value) -> Result<(), ContainerError> {
    match values.column_len() {
        Some(_) => Ok(()),
        None => Err(ContainerError::Usage(format!(
            "column '{name}' must be a sequence or array, got a value of type {}",
            values.type_name()
        ))),
    }
}

fn number_items(array: &NdArray) -> Vec<Value> {
    let integer = array.dtype().is_integer();
    array
        .data()
        .iter()
        .map(|&x| if integer { Value::Int(x as i64) } else { Value::Float(x) })
        .collect()
}

/// Rows of a sequence-shaped value as individual values.
fn rows_of(value: &Value) -> Option<Vec<Value>> {
    match value {
        Value::List(items) | Value::Tuple(items) => Some(items.clone()),
        Value::Array(array) if array.ndim() == 1 => Some(number_items(array)),
        _ => None,
    }
}

// ── Stream ─────────────────────────────────────────────────────────────────

fn stream_columns(
    columns: &mut ColumnMap,
    data: &ColumnMap,
    rollover: Option<usize>,
) -> Result<(), ContainerError> {
    let missing: Vec<&str> = columns
        .keys()
        .filter(|name| !data.contains_key(*name))
        .map(String::as_str)
        .collect();
    let extra: Vec<&str> = data
        .keys()
        .filter(|name| !columns.contains_key(*name))
        .map(String::as_str)
        .collect();
    if !missing.is_empty() || !extra.is_empty() {
        let mut parts = Vec::new();
        if !missing.is_empty() {
            parts.push(format!("missing: {}", missing.join(", ")));
        }
        if !extra.is_empty() {
            parts.push(format!("extra: {}", extra.join(", ")));
        }
        return Err(ContainerError::StreamColumns(parts.join(", ")));
    }

    let mut lengths = IndexSet::new();
    for (name, values) in data {
        require_sequence(name, values)?;
        lengths.extend(values.column_len());
        if let Some(Value::Array(array)) = columns.get(name) {
            if array.ndim() != 1 {
                return Err(ContainerError::Usage(format!(
                    "cannot stream into multi-dimensional column '{name}'"
                )));
            }
            if flatten_numbers(values).is_none() {
                return Err(ContainerError::Usage(format!(
                    "cannot stream non-numeric values into array column '{name}'"
                )));
            }
        }
    }
    if lengths.len() > 1 {
        return Err(ContainerError::StreamLengths);
    }

    for (name, values) in data {
        if let Some(column) = columns.get_mut(name) {
            stream_column(column, values, rollover)?;
        }
    }
    Ok(())
}

fn stream_column(column: &mut Value, values: &Value, rollover: Option<usize>) -> Result<(), ContainerError> {
    // A numeric list meeting array data becomes an array of that dtype.
    let converted = match (&*column, values) {
        (Value::List(items), Value::Array(incoming)) => items
            .iter()
            .map(Value::as_f64)
            .collect::<Option<Vec<f64>>>()
            .map(|numbers| NdArray::from_vec(incoming.dtype(), numbers)),
        _ => None,
    };
    if let Some(array) = converted {
        *column = Value::Array(array);
    }
    match column {
        Value::Array(array) => {
            let numbers = flatten_numbers(values).ok_or_else(|| {
                ContainerError::Usage("cannot stream non-numeric values into an array".into())
            })?;
            array.stream(&numbers, rollover)
        }
        Value::List(items) | Value::Tuple(items) => {
            items.extend(rows_of(values).unwrap_or_default());
            if let Some(r) = rollover {
                let excess = items.len().saturating_sub(r);
                items.drain(..excess);
            }
            Ok(())
        }
        other => Err(ContainerError::Usage(format!(
            "cannot stream into a column of type {}",
            other.type_name()
        ))),
    }
}

// ── Patch ──────────────────────────────────────────────────────────────────

fn patch_columns(columns: &mut ColumnMap, patches: &PatchSet) -> Result<(), ContainerError> {
    let extra: Vec<&str> = patches
        .keys()
        .filter(|name| !columns.contains_key(*name))
        .map(String::as_str)
        .collect();
    if !extra.is_empty() {
        return Err(ContainerError::PatchColumns(extra.join(", ")));
    }

    let mut staged = Vec::with_capacity(patches.len());
    for (name, edits) in patches {
        let Some(original) = columns.get(name) else {
            continue;
        };
        let mut column = original.clone();
        for (index, value) in edits {
            patch_one(name, &mut column, index, value)?;
        }
        staged.push((name.clone(), column));
    }
    for (name, column) in staged {
        columns.insert(name, column);
    }
    Ok(())
}

fn patch_one(
    name: &str,
    column: &mut Value,
    index: &PatchIndex,
    value: &Value,
) -> Result<(), ContainerError> {
    let len = column.column_len().ok_or_else(|| {
        ContainerError::Usage(format!("column '{name}' is not a sequence"))
    })?;
    match index {
        PatchIndex::Row(row) => {
            if *row >= len {
                return Err(ContainerError::PatchIndex {
                    column: name.to_owned(),
                    index: *row,
                });
            }
            set_row(column, *row, value)
        }
        PatchIndex::Rows(slice) => {
            if let Some(stop) = slice.stop.filter(|stop| *stop > len) {
                return Err(ContainerError::PatchSlice {
                    column: name.to_owned(),
                    stop,
                });
            }
            let rows = slice.indices(len)?;
            let values = rows_of(value).ok_or_else(|| {
                ContainerError::Usage(format!(
                    "slice patch for column '{name}' needs a sequence of values"
                ))
            })?;
            if values.len() != rows.len() {
                return Err(ContainerError::Usage(format!(
                    "slice patch for column '{name}' selects {} rows but carries {} values",
                    rows.len(),
                    values.len()
                )));
            }
            for (row, v) in rows.into_iter().zip(&values) {
                set_row(column, row, v)?;
            }
            Ok(())
        }
        PatchIndex::Nested(row, parts) => {
            if *row >= len {
                return Err(ContainerError::PatchIndex {
                    column: name.to_owned(),
                    index: *row,
                });
            }
            match column {
                Value::Array(array) => {
                    let mut index = vec![AxisIndex::At(*row)];
                    index.extend(parts.iter().copied());
                    array.assign(&index, value).map(drop)
                }
                Value::List(items) | Value::Tuple(items) => match &mut items[*row] {
                    Value::Array(array) => array.assign(parts, value).map(drop),
                    Value::List(inner) => match parts.as_slice() {
                        [AxisIndex::At(i)] if *i < inner.len() => {
                            inner[*i] = value.clone();
                            Ok(())
                        }
                        _ => Err(ContainerError::Usage(format!(
                            "unsupported nested index into row {row} of column '{name}'"
                        ))),
                    },
                    other => Err(ContainerError::Usage(format!(
                        "row {row} of column '{name}' holds a {}, not an array",
                        other.type_name()
                    ))),
                },
                _ => Err(ContainerError::Usage(format!("column '{name}' is not a sequence"))),
            }
        }
    }
}

fn set_row(column: &mut Value, row: usize, value: &Value) -> Result<(), ContainerError> {
    match column {
        Value::List(items) | Value::Tuple(items) => {
            items[row] = value.clone();
            Ok(())
        }
        Value::Array(array) => array.assign(&[AxisIndex::At(row)], value).map(drop),
        other => Err(ContainerError::Usage(format!(
            "cannot patch a column of type {}",
            other.type_name()
        ))),
    }
}
