//! Observable aggregates.
//!
//! Lists, dicts, sets and column tables assigned to model attributes live in
//! a [`ContainerArena`] and are addressed by [`ContainerId`]. Each container
//! records the `(model, attribute)` pairs it is assigned to; every mutation
//! made through a handle ([`ListMut`], [`DictMut`], [`SetMut`],
//! [`ColumnsMut`]) notifies all of them with the pre-mutation contents.

use std::collections::HashMap;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use tracing::debug;

use crate::error::ContainerError;
use crate::value::{ContainerId, Key, ModelId, Value};

mod columns;
mod handles;

pub use crate::value::Slice;
pub use columns::{ColumnMap, ColumnsMut, PatchIndex, PatchSet};
pub use handles::{DictMut, ListMut, SetMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContainerKind {
    List,
    Dict,
    Set,
    ColumnData,
}

impl fmt::Display for ContainerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ContainerKind::List => "list",
            ContainerKind::Dict => "dict",
            ContainerKind::Set => "set",
            ContainerKind::ColumnData => "column table",
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ContainerValue {
    List(Vec<Value>),
    Dict(IndexMap<Key, Value>),
    Set(IndexSet<Key>),
    /// Column name to column values (`List` or `Array`).
    ColumnData(IndexMap<String, Value>),
}

impl ContainerValue {
    pub fn kind(&self) -> ContainerKind {
        match self {
            ContainerValue::List(_) => ContainerKind::List,
            ContainerValue::Dict(_) => ContainerKind::Dict,
            ContainerValue::Set(_) => ContainerKind::Set,
            ContainerValue::ColumnData(_) => ContainerKind::ColumnData,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ContainerValue::List(items) => items.len(),
            ContainerValue::Dict(entries) => entries.len(),
            ContainerValue::Set(keys) => keys.len(),
            ContainerValue::ColumnData(columns) => columns.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The contents as a plain value. Nested containers stay handles.
    pub fn to_value(&self) -> Value {
        match self {
            ContainerValue::List(items) => Value::List(items.clone()),
            ContainerValue::Dict(entries) => Value::Map(entries.clone()),
            ContainerValue::Set(keys) => Value::Set(keys.clone()),
            ContainerValue::ColumnData(columns) => Value::Map(
                columns
                    .iter()
                    .map(|(k, v)| (Key::Str(k.clone()), v.clone()))
                    .collect(),
            ),
        }
    }

    /// Every value held, in order. Keys are not values and are skipped.
    pub fn values(&self) -> Box<dyn Iterator<Item = &Value> + '_> {
        match self {
            ContainerValue::List(items) => Box::new(items.iter()),
            ContainerValue::Dict(entries) => Box::new(entries.values()),
            ContainerValue::Set(_) => Box::new(std::iter::empty()),
            ContainerValue::ColumnData(columns) => Box::new(columns.values()),
        }
    }

    fn try_map_values(
        self,
        mut f: impl FnMut(Value) -> Result<Value, ContainerError>,
    ) -> Result<Self, ContainerError> {
        Ok(match self {
            ContainerValue::List(items) => {
                ContainerValue::List(items.into_iter().map(f).collect::<Result<_, _>>()?)
            }
            ContainerValue::Dict(entries) => ContainerValue::Dict(
                entries
                    .into_iter()
                    .map(|(k, v)| f(v).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            ),
            ContainerValue::Set(keys) => ContainerValue::Set(keys),
            ContainerValue::ColumnData(columns) => ContainerValue::ColumnData(
                columns
                    .into_iter()
                    .map(|(k, v)| f(v).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            ),
        })
    }
}

/// Extra detail on a mutation, used to encode incremental updates.
#[derive(Debug, Clone, PartialEq)]
pub enum Hint {
    ColumnDataChanged {
        cols: Vec<String>,
    },
    ColumnsStreamed {
        setter: Option<String>,
        rollover: Option<usize>,
        data: ColumnMap,
    },
    ColumnsPatched {
        setter: Option<String>,
        patches: PatchSet,
    },
}

impl Hint {
    pub fn setter(&self) -> Option<&str> {
        match self {
            Hint::ColumnDataChanged { .. } => None,
            Hint::ColumnsStreamed { setter, .. } | Hint::ColumnsPatched { setter, .. } => {
                setter.as_deref()
            }
        }
    }
}

/// An attribute slot a container is assigned to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Owner {
    pub model: ModelId,
    pub attr: String,
}

impl Owner {
    pub fn new(model: ModelId, attr: impl Into<String>) -> Self {
        Self {
            model,
            attr: attr.into(),
        }
    }
}

/// Receives one call per registered owner after every mutation.
pub trait OwnerNotify {
    /// Vets the mutated contents for `owner` before anyone is notified. An
    /// error undoes the mutation.
    fn check_owner(&mut self, _owner: &Owner, _new: &ContainerValue) -> Result<(), ContainerError> {
        Ok(())
    }

    fn notify_owner(&mut self, owner: &Owner, old: &ContainerValue, hint: Option<&Hint>);
}

impl<F> OwnerNotify for F
where
    F: FnMut(&Owner, &ContainerValue, Option<&Hint>),
{
    fn notify_owner(&mut self, owner: &Owner, old: &ContainerValue, hint: Option<&Hint>) {
        self(owner, old, hint)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyContainer {
    value: ContainerValue,
    owners: IndexSet<Owner>,
}

impl PropertyContainer {
    fn new(value: ContainerValue) -> Self {
        Self {
            value,
            owners: IndexSet::new(),
        }
    }

    pub fn value(&self) -> &ContainerValue {
        &self.value
    }

    pub fn kind(&self) -> ContainerKind {
        self.value.kind()
    }

    pub fn owners(&self) -> impl Iterator<Item = &Owner> {
        self.owners.iter()
    }

    pub fn is_owned_by(&self, owner: &Owner) -> bool {
        self.owners.contains(owner)
    }

    /// Runs `op` and, if it succeeds and every owner accepts the result,
    /// notifies every owner once with the contents as they were before `op`
    /// ran. A rejected result is rolled back.
    fn apply<S, R>(
        &mut self,
        id: ContainerId,
        sink: &mut S,
        op: impl FnOnce(&mut ContainerValue) -> Result<(R, Option<Hint>), ContainerError>,
    ) -> Result<R, ContainerError>
    where
        S: OwnerNotify,
    {
        if self.owners.is_empty() {
            return op(&mut self.value).map(|(out, _)| out);
        }
        let old = self.value.clone();
        let (out, hint) = op(&mut self.value)?;
        let vetted = self
            .owners
            .iter()
            .try_for_each(|owner| sink.check_owner(owner, &self.value));
        if let Err(err) = vetted {
            self.value = old;
            return Err(err);
        }
        debug!(container = %id, owners = self.owners.len(), "container mutated");
        for owner in &self.owners {
            sink.notify_owner(owner, &old, hint.as_ref());
        }
        Ok(out)
    }
}

/// Storage for every container of a document. Slots freed by
/// [`ContainerArena::retain_reachable`] are handed out again.
#[derive(Debug, Clone, Default)]
pub struct ContainerArena {
    slots: Vec<Option<PropertyContainer>>,
    free: Vec<usize>,
}

impl ContainerArena {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn alloc(&mut self, value: ContainerValue) -> ContainerId {
        let container = Some(PropertyContainer::new(value));
        match self.free.pop() {
            Some(index) => {
                self.slots[index] = container;
                ContainerId(index)
            }
            None => {
                self.slots.push(container);
                ContainerId(self.slots.len() - 1)
            }
        }
    }

    pub fn get(&self, id: ContainerId) -> Option<&PropertyContainer> {
        self.slots.get(id.0).and_then(Option::as_ref)
    }

    /// Live containers.
    pub fn len(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn slot_mut(&mut self, id: ContainerId) -> Result<&mut PropertyContainer, ContainerError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(ContainerError::Missing(id))
    }

    /// Frees every container not reachable from `values`, following handles
    /// nested inside containers. Returns how many were freed. Handles to a
    /// freed container must not be used again.
    pub fn retain_reachable<'v>(&mut self, values: impl IntoIterator<Item = &'v Value>) -> usize {
        let mut live = vec![false; self.slots.len()];
        let mut pending = Vec::new();
        for value in values {
            collect_handles(value, &mut pending);
        }
        while let Some(id) = pending.pop() {
            let Some(container) = self.get(id) else {
                continue;
            };
            if std::mem::replace(&mut live[id.0], true) {
                continue;
            }
            for value in container.value.values() {
                collect_handles(value, &mut pending);
            }
        }

        let mut freed = 0;
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !live[index] {
                *slot = None;
                self.free.push(index);
                freed += 1;
            }
        }
        debug!(freed, live = self.len(), "containers reclaimed");
        freed
    }

    fn checked(
        &mut self,
        id: ContainerId,
        expected: ContainerKind,
    ) -> Result<&mut PropertyContainer, ContainerError> {
        let container = self.slot_mut(id)?;
        let actual = container.kind();
        if actual != expected {
            return Err(ContainerError::KindMismatch {
                id,
                expected,
                actual,
            });
        }
        Ok(container)
    }

    /// Returns `false` when `owner` was already registered.
    pub fn register_owner(&mut self, id: ContainerId, owner: Owner) -> Result<bool, ContainerError> {
        Ok(self.slot_mut(id)?.owners.insert(owner))
    }

    /// Returns `false` when `owner` was not registered.
    pub fn unregister_owner(&mut self, id: ContainerId, owner: &Owner) -> Result<bool, ContainerError> {
        Ok(self.slot_mut(id)?.owners.shift_remove(owner))
    }

    pub fn list<S: OwnerNotify>(
        &mut self,
        id: ContainerId,
        sink: S,
    ) -> Result<ListMut<'_, S>, ContainerError> {
        let container = self.checked(id, ContainerKind::List)?;
        Ok(ListMut::new(id, container, sink))
    }

    pub fn dict<S: OwnerNotify>(
        &mut self,
        id: ContainerId,
        sink: S,
    ) -> Result<DictMut<'_, S>, ContainerError> {
        let container = self.checked(id, ContainerKind::Dict)?;
        Ok(DictMut::new(id, container, sink))
    }

    pub fn set<S: OwnerNotify>(
        &mut self,
        id: ContainerId,
        sink: S,
    ) -> Result<SetMut<'_, S>, ContainerError> {
        let container = self.checked(id, ContainerKind::Set)?;
        Ok(SetMut::new(id, container, sink))
    }

    pub fn columns<S: OwnerNotify>(
        &mut self,
        id: ContainerId,
        sink: S,
    ) -> Result<ColumnsMut<'_, S>, ContainerError> {
        let container = self.checked(id, ContainerKind::ColumnData)?;
        Ok(ColumnsMut::new(id, container, sink))
    }

    /// A new, unowned container with the same entries. Nested containers are
    /// shared, not copied.
    pub fn shallow_copy(&mut self, id: ContainerId) -> Result<ContainerId, ContainerError> {
        let value = self.slot_mut(id)?.value.clone();
        Ok(self.alloc(value))
    }

    /// A new, unowned container whose nested containers are copied too.
    /// Shared and cyclic nesting is reproduced in the copy.
    pub fn deep_copy(&mut self, id: ContainerId) -> Result<ContainerId, ContainerError> {
        let mut memo = HashMap::new();
        self.deep_copy_container(id, &mut memo)
    }

    fn deep_copy_container(
        &mut self,
        id: ContainerId,
        memo: &mut HashMap<ContainerId, ContainerId>,
    ) -> Result<ContainerId, ContainerError> {
        if let Some(copy) = memo.get(&id) {
            return Ok(*copy);
        }
        let value = self.slot_mut(id)?.value.clone();
        let copy = self.alloc(ContainerValue::List(Vec::new()));
        memo.insert(id, copy);
        let value = value.try_map_values(|v| self.deep_copy_value(v, memo))?;
        self.slot_mut(copy)?.value = value;
        Ok(copy)
    }

    fn deep_copy_value(
        &mut self,
        value: Value,
        memo: &mut HashMap<ContainerId, ContainerId>,
    ) -> Result<Value, ContainerError> {
        Ok(match value {
            Value::Container(id) => Value::Container(self.deep_copy_container(id, memo)?),
            Value::List(items) => Value::List(
                items
                    .into_iter()
                    .map(|v| self.deep_copy_value(v, memo))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Tuple(items) => Value::Tuple(
                items
                    .into_iter()
                    .map(|v| self.deep_copy_value(v, memo))
                    .collect::<Result<_, _>>()?,
            ),
            Value::Map(entries) => Value::Map(
                entries
                    .into_iter()
                    .map(|(k, v)| self.deep_copy_value(v, memo).map(|v| (k, v)))
                    .collect::<Result<_, _>>()?,
            ),
            other => other,
        })
    }

    /// `value` with every container handle replaced by its contents,
    /// recursively. A handle met again inside its own contents is kept.
    pub fn to_plain(&self, value: &Value) -> Value {
        let mut visiting = Vec::new();
        self.plain(value, &mut visiting)
    }

    fn plain(&self, value: &Value, visiting: &mut Vec<ContainerId>) -> Value {
        match value {
            Value::Container(id) => {
                let Some(container) = self.get(*id) else {
                    return value.clone();
                };
                if visiting.contains(id) {
                    return value.clone();
                }
                visiting.push(*id);
                let plain = self.plain(&container.value.to_value(), visiting);
                visiting.pop();
                plain
            }
            Value::List(items) => Value::List(items.iter().map(|v| self.plain(v, visiting)).collect()),
            Value::Tuple(items) => {
                Value::Tuple(items.iter().map(|v| self.plain(v, visiting)).collect())
            }
            Value::Map(entries) => Value::Map(
                entries
                    .iter()
                    .map(|(k, v)| (k.clone(), self.plain(v, visiting)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }
}

fn collect_handles(value: &Value, out: &mut Vec<ContainerId>) {
    match value {
        Value::Container(id) => out.push(*id),
        Value::List(items) | Value::Tuple(items) => {
            items.iter().for_each(|item| collect_handles(item, out))
        }
        Value::Map(entries) => entries.values().for_each(|item| collect_handles(item, out)),
        _ => {}
    }
}
