use std::cmp::Ordering;

use indexmap::{IndexMap, IndexSet};

use super::{ContainerValue, OwnerNotify, PropertyContainer};
use crate::error::ContainerError;
use crate::value::{ContainerId, Key, Slice, Value};

fn kind_error(id: ContainerId, expected: super::ContainerKind, actual: &ContainerValue) -> ContainerError {
    ContainerError::KindMismatch {
        id,
        expected,
        actual: actual.kind(),
    }
}

// ── List ───────────────────────────────────────────────────────────────────

/// Mutating view of a list container.
pub struct ListMut<'a, S: OwnerNotify> {
    id: ContainerId,
    container: &'a mut PropertyContainer,
    sink: S,
}

impl<'a, S: OwnerNotify> ListMut<'a, S> {
    pub(super) fn new(id: ContainerId, container: &'a mut PropertyContainer, sink: S) -> Self {
        Self { id, container, sink }
    }

    pub fn id(&self) -> ContainerId {
        self.id
    }

    pub fn items(&self) -> &[Value] {
        match &self.container.value {
            ContainerValue::List(items) => items,
            _ => &[],
        }
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items().is_empty()
    }

    fn apply<R>(
        &mut self,
        op: impl FnOnce(&mut Vec<Value>) -> Result<R, ContainerError>,
    ) -> Result<R, ContainerError> {
        let id = self.id;
        self.container.apply(id, &mut self.sink, |value| match value {
            ContainerValue::List(items) => op(items).map(|out| (out, None)),
            other => Err(kind_error(id, super::ContainerKind::List, other)),
        })
    }

    pub fn push(&mut self, value: impl Into<Value>) -> Result<(), ContainerError> {
        let value = value.into();
        self.apply(|items| {
            items.push(value);
            Ok(())
        })
    }

    pub fn extend(&mut self, values: impl IntoIterator<Item = Value>) -> Result<(), ContainerError> {
        let values: Vec<Value> = values.into_iter().collect();
        self.apply(|items| {
            items.extend(values);
            Ok(())
        })
    }

    /// Inserts before `index`; an index past the end appends.
    pub fn insert(&mut self, index: usize, value: impl Into<Value>) -> Result<(), ContainerError> {
        let value = value.into();
        self.apply(|items| {
            let at = index.min(items.len());
            items.insert(at, value);
            Ok(())
        })
    }

    /// Replaces the item at `index`, returning the previous one.
    pub fn set(&mut self, index: usize, value: impl Into<Value>) -> Result<Value, ContainerError> {
        let value = value.into();
        self.apply(|items| {
            let len = items.len();
            let slot = items
                .get_mut(index)
                .ok_or(ContainerError::IndexOutOfRange { index, len })?;
            Ok(std::mem::replace(slot, value))
        })
    }

    /// Slice assignment. A contiguous slice may change the length; a strided
    /// one must be given exactly as many values as it selects.
    pub fn set_slice(&mut self, slice: Slice, values: Vec<Value>) -> Result<(), ContainerError> {
        self.apply(|items| {
            let picked = slice.indices(items.len())?;
            if slice.step.unwrap_or(1) == 1 {
                let start = slice.start.unwrap_or(0).min(items.len());
                let stop = picked.last().map_or(start, |last| last + 1);
                items.splice(start..stop, values);
                return Ok(());
            }
            if picked.len() != values.len() {
                return Err(ContainerError::Usage(format!(
                    "attempt to assign sequence of size {} to extended slice of size {}",
                    values.len(),
                    picked.len()
                )));
            }
            for (i, value) in picked.into_iter().zip(values) {
                items[i] = value;
            }
            Ok(())
        })
    }

    pub fn remove(&mut self, index: usize) -> Result<Value, ContainerError> {
        self.apply(|items| {
            if index >= items.len() {
                return Err(ContainerError::IndexOutOfRange {
                    index,
                    len: items.len(),
                });
            }
            Ok(items.remove(index))
        })
    }

    /// Removes the first item equal to `value`.
    pub fn remove_value(&mut self, value: &Value) -> Result<(), ContainerError> {
        self.apply(|items| {
            let at = items
                .iter()
                .position(|item| item == value)
                .ok_or_else(|| ContainerError::ValueNotFound(value.repr()))?;
            items.remove(at);
            Ok(())
        })
    }

    pub fn pop(&mut self) -> Result<Value, ContainerError> {
        self.apply(|items| items.pop().ok_or(ContainerError::Empty))
    }

    pub fn delete_range(&mut self, slice: Slice) -> Result<(), ContainerError> {
        self.apply(|items| {
            let picked = slice.indices(items.len())?;
            for i in picked.into_iter().rev() {
                items.remove(i);
            }
            Ok(())
        })
    }

    pub fn truncate(&mut self, len: usize) -> Result<(), ContainerError> {
        self.apply(|items| {
            items.truncate(len);
            Ok(())
        })
    }

    /// In-place repetition: the contents become `times` copies of themselves.
    pub fn repeat(&mut self, times: usize) -> Result<(), ContainerError> {
        self.apply(|items| {
            let once = std::mem::take(items);
            for _ in 0..times {
                items.extend_from_slice(&once);
            }
            Ok(())
        })
    }

    pub fn reverse(&mut self) -> Result<(), ContainerError> {
        self.apply(|items| {
            items.reverse();
            Ok(())
        })
    }

    /// Stable sort. Numbers order numerically, strings lexically, and mixed
    /// kinds by kind.
    pub fn sort(&mut self) -> Result<(), ContainerError> {
        self.apply(|items| {
            items.sort_by(compare_values);
            Ok(())
        })
    }

    pub fn clear(&mut self) -> Result<(), ContainerError> {
        self.apply(|items| {
            items.clear();
            Ok(())
        })
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Int(_) | Value::Float(_) => 2,
        Value::Str(_) => 3,
        _ => 4,
    }
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        (Value::List(x), Value::List(y)) | (Value::Tuple(x), Value::Tuple(y)) => x
            .iter()
            .zip(y)
            .map(|(p, q)| compare_values(p, q))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        _ => match (a.as_f64(), b.as_f64()) {
            (Some(x), Some(y)) => x.total_cmp(&y),
            _ => rank(a).cmp(&rank(b)),
        },
    }
}

// ── Dict ───────────────────────────────────────────────────────────────────

/// Mutating view of a dict container.
pub struct DictMut<'a, S: OwnerNotify> {
    id: ContainerId,
    container: &'a mut PropertyContainer,
    sink: S,
}

impl<'a, S: OwnerNotify> DictMut<'a, S> {
    pub(super) fn new(id: ContainerId, container: &'a mut PropertyContainer, sink: S) -> Self {
        Self { id, container, sink }
    }

    pub fn get(&self, key: &Key) -> Option<&Value> {
        match &self.container.value {
            ContainerValue::Dict(entries) => entries.get(key),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.container.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply<R>(
        &mut self,
        op: impl FnOnce(&mut IndexMap<Key, Value>) -> Result<R, ContainerError>,
    ) -> Result<R, ContainerError> {
        let id = self.id;
        self.container.apply(id, &mut self.sink, |value| match value {
            ContainerValue::Dict(entries) => op(entries).map(|out| (out, None)),
            other => Err(kind_error(id, super::ContainerKind::Dict, other)),
        })
    }

    pub fn insert(
        &mut self,
        key: impl Into<Key>,
        value: impl Into<Value>,
    ) -> Result<Option<Value>, ContainerError> {
        let (key, value) = (key.into(), value.into());
        self.apply(|entries| Ok(entries.insert(key, value)))
    }

    pub fn remove(&mut self, key: &Key) -> Result<Value, ContainerError> {
        self.apply(|entries| {
            entries
                .shift_remove(key)
                .ok_or_else(|| ContainerError::KeyNotFound(key.repr()))
        })
    }

    /// Removes `key`, falling back to `default` when it is absent.
    pub fn pop(&mut self, key: &Key, default: Option<Value>) -> Result<Value, ContainerError> {
        self.apply(|entries| match (entries.shift_remove(key), default) {
            (Some(value), _) | (None, Some(value)) => Ok(value),
            (None, None) => Err(ContainerError::KeyNotFound(key.repr())),
        })
    }

    /// Removes the most recently inserted entry.
    pub fn pop_item(&mut self) -> Result<(Key, Value), ContainerError> {
        self.apply(|entries| entries.pop().ok_or(ContainerError::Empty))
    }

    /// Returns the value under `key`, inserting `default` first if absent.
    pub fn set_default(
        &mut self,
        key: impl Into<Key>,
        default: impl Into<Value>,
    ) -> Result<Value, ContainerError> {
        let (key, default) = (key.into(), default.into());
        self.apply(|entries| Ok(entries.entry(key).or_insert(default).clone()))
    }

    pub fn update(
        &mut self,
        items: impl IntoIterator<Item = (Key, Value)>,
    ) -> Result<(), ContainerError> {
        let items: Vec<(Key, Value)> = items.into_iter().collect();
        self.apply(|entries| {
            entries.extend(items);
            Ok(())
        })
    }

    pub fn clear(&mut self) -> Result<(), ContainerError> {
        self.apply(|entries| {
            entries.clear();
            Ok(())
        })
    }
}

// ── Set ────────────────────────────────────────────────────────────────────

/// Mutating view of a set container.
pub struct SetMut<'a, S: OwnerNotify> {
    id: ContainerId,
    container: &'a mut PropertyContainer,
    sink: S,
}

impl<'a, S: OwnerNotify> SetMut<'a, S> {
    pub(super) fn new(id: ContainerId, container: &'a mut PropertyContainer, sink: S) -> Self {
        Self { id, container, sink }
    }

    pub fn contains(&self, key: &Key) -> bool {
        match &self.container.value {
            ContainerValue::Set(keys) => keys.contains(key),
            _ => false,
        }
    }

    pub fn len(&self) -> usize {
        self.container.value.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn apply<R>(
        &mut self,
        op: impl FnOnce(&mut IndexSet<Key>) -> Result<R, ContainerError>,
    ) -> Result<R, ContainerError> {
        let id = self.id;
        self.container.apply(id, &mut self.sink, |value| match value {
            ContainerValue::Set(keys) => op(keys).map(|out| (out, None)),
            other => Err(kind_error(id, super::ContainerKind::Set, other)),
        })
    }

    /// Returns `false` when `key` was already present.
    pub fn add(&mut self, key: impl Into<Key>) -> Result<bool, ContainerError> {
        let key = key.into();
        self.apply(|keys| Ok(keys.insert(key)))
    }

    /// Removes `key` if present.
    pub fn discard(&mut self, key: &Key) -> Result<bool, ContainerError> {
        self.apply(|keys| Ok(keys.shift_remove(key)))
    }

    /// Removes `key`, failing when it is absent.
    pub fn remove(&mut self, key: &Key) -> Result<(), ContainerError> {
        self.apply(|keys| {
            if keys.shift_remove(key) {
                Ok(())
            } else {
                Err(ContainerError::KeyNotFound(key.repr()))
            }
        })
    }

    pub fn update(&mut self, items: impl IntoIterator<Item = Key>) -> Result<(), ContainerError> {
        let items: Vec<Key> = items.into_iter().collect();
        self.apply(|keys| {
            keys.extend(items);
            Ok(())
        })
    }

    pub fn difference_update(
        &mut self,
        items: impl IntoIterator<Item = Key>,
    ) -> Result<(), ContainerError> {
        let items: IndexSet<Key> = items.into_iter().collect();
        self.apply(|keys| {
            keys.retain(|k| !items.contains(k));
            Ok(())
        })
    }

    pub fn intersection_update(
        &mut self,
        items: impl IntoIterator<Item = Key>,
    ) -> Result<(), ContainerError> {
        let items: IndexSet<Key> = items.into_iter().collect();
        self.apply(|keys| {
            keys.retain(|k| items.contains(k));
            Ok(())
        })
    }

    pub fn symmetric_difference_update(
        &mut self,
        items: impl IntoIterator<Item = Key>,
    ) -> Result<(), ContainerError> {
        let items: IndexSet<Key> = items.into_iter().collect();
        self.apply(|keys| {
            for key in items {
                if !keys.shift_remove(&key) {
                    keys.insert(key);
                }
            }
            Ok(())
        })
    }

    pub fn clear(&mut self) -> Result<(), ContainerError> {
        self.apply(|keys| {
            keys.clear();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mixed_kinds_sort_numbers_before_strings() {
        let mut items = vec![
            Value::from("b"),
            Value::Float(2.5),
            Value::Null,
            Value::Int(1),
            Value::from("a"),
        ];
        items.sort_by(compare_values);
        assert_eq!(
            items,
            vec![
                Value::Null,
                Value::Int(1),
                Value::Float(2.5),
                Value::from("a"),
                Value::from("b")
            ]
        );
    }
}
