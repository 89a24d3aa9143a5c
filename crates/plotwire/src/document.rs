//! The document: an arena of model instances, the containers they hold, the
//! root set and the change listeners.

use std::collections::BTreeMap;

use indexmap::{IndexMap, IndexSet};
use plotwire_props::{
    validation_on, ColumnMap, ColumnsMut, ContainerArena, ContainerId, ContainerKind, DictMut,
    ListMut, ModelId, Owner, PatchSet, PropertyContainer, SetMut, Value, ValueContext,
};
use tracing::debug;

use crate::error::ModelError;
use crate::events::{ChangeEvent, EventSinks, Fanout, Listener};
use crate::graph::{self, Selector};
use crate::instance::ModelInstance;
use crate::model::{self, DefaultValue, ModelDef};

#[derive(Default)]
pub struct Document {
    models: IndexMap<ModelId, ModelInstance>,
    containers: ContainerArena,
    roots: IndexSet<ModelId>,
    listeners: BTreeMap<u64, Listener>,
    next_listener_id: u64,
    recording: bool,
    events: Vec<ChangeEvent>,
}

impl Document {
    pub fn new() -> Self {
        Self {
            next_listener_id: 1,
            ..Self::default()
        }
    }

    // ── Instances ─────────────────────────────────────────────────────────

    /// Creates an instance of `type_name` with every property at its default.
    pub fn create(&mut self, type_name: &str) -> Result<ModelId, ModelError> {
        let def = model::lookup(type_name)?;
        let id = ModelId::next();
        self.instantiate(def, id, &[])?;
        Ok(id)
    }

    /// Creates an instance and assigns `attrs` in order, without emitting
    /// change events. Defaults that would create a model are skipped for the
    /// attributes given here. Nothing is left behind when an assignment fails.
    pub fn create_with<'a>(
        &mut self,
        type_name: &str,
        attrs: impl IntoIterator<Item = (&'a str, Value)>,
    ) -> Result<ModelId, ModelError> {
        let def = model::lookup(type_name)?;
        let attrs: Vec<(&str, Value)> = attrs.into_iter().collect();
        let provided: Vec<&str> = attrs.iter().map(|(name, _)| *name).collect();
        let id = ModelId::next();
        let mark = self.models.len();
        let result = self.instantiate(def, id, &provided).and_then(|()| {
            attrs
                .into_iter()
                .try_for_each(|(name, value)| self.assign(id, name, value).map(drop))
        });
        if let Err(err) = result {
            // Default-created children were inserted after `mark` as well.
            let created: Vec<ModelId> = self.models.keys().skip(mark).copied().collect();
            for child in created {
                self.discard(child);
            }
            return Err(err);
        }
        Ok(id)
    }

    pub(crate) fn instantiate(
        &mut self,
        def: &'static ModelDef,
        id: ModelId,
        provided: &[&str],
    ) -> Result<(), ModelError> {
        if def.is_abstract() {
            return Err(ModelError::AbstractType(def.name()));
        }
        if self.models.contains_key(&id) {
            return Err(ModelError::DuplicateId(id));
        }
        let mut values = IndexMap::new();
        for prop in def.properties() {
            let raw = match &prop.default {
                DefaultValue::Model(_) if provided.contains(&prop.name) => Value::Null,
                DefaultValue::Model(type_name) => Value::Ref(self.create(type_name)?),
                DefaultValue::Value(value) => value.clone(),
                DefaultValue::Factory(make) => make(),
            };
            let value = prop.spec.wrap(prop.spec.transform(raw), &mut self.containers);
            if let Value::Container(container) = value {
                self.containers
                    .register_owner(container, Owner::new(id, prop.name))?;
            }
            values.insert(prop.name, value);
        }
        self.models.insert(id, ModelInstance::new(id, def, values));
        debug!(model = %id, type_name = def.name(), "model created");
        Ok(())
    }

    /// Removes an instance and releases the containers it owned.
    fn discard(&mut self, id: ModelId) -> bool {
        let Some(instance) = self.models.shift_remove(&id) else {
            return false;
        };
        self.roots.shift_remove(&id);
        for (name, value) in instance.attributes() {
            if let Value::Container(container) = value {
                let _ = self
                    .containers
                    .unregister_owner(*container, &Owner::new(id, name));
            }
        }
        true
    }

    pub fn model(&self, id: ModelId) -> Option<&ModelInstance> {
        self.models.get(&id)
    }

    pub fn models(&self) -> impl Iterator<Item = &ModelInstance> {
        self.models.values()
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.models.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.models.len()
    }

    pub fn is_empty(&self) -> bool {
        self.models.is_empty()
    }

    pub fn containers(&self) -> &ContainerArena {
        &self.containers
    }

    /// `Plot(id='p1001', ...)`
    pub fn describe(&self, id: ModelId) -> String {
        match self.models.get(&id) {
            Some(instance) => format!("{}(id='{id}', ...)", instance.type_name()),
            None => id.to_string(),
        }
    }

    // ── Attributes ────────────────────────────────────────────────────────

    fn instance(&self, id: ModelId) -> Result<&ModelInstance, ModelError> {
        self.models.get(&id).ok_or(ModelError::NoSuchModel(id))
    }

    /// The stored value: containers appear as handles.
    pub fn get(&self, id: ModelId, attr: &str) -> Result<&Value, ModelError> {
        let instance = self.instance(id)?;
        instance
            .get(attr)
            .ok_or_else(|| ModelError::UnknownAttribute {
                type_name: instance.type_name(),
                attr: attr.to_owned(),
            })
    }

    /// The value with every container replaced by its contents.
    pub fn resolved(&self, id: ModelId, attr: &str) -> Result<Value, ModelError> {
        Ok(self.containers.to_plain(self.get(id, attr)?))
    }

    pub fn set(&mut self, id: ModelId, attr: &str, value: impl Into<Value>) -> Result<(), ModelError> {
        self.set_with_setter(id, attr, value, None)
    }

    /// Validates (when validation is on), coerces and wraps `value`, then
    /// stores it. Listeners hear about it only when the value changed.
    pub fn set_with_setter(
        &mut self,
        id: ModelId,
        attr: &str,
        value: impl Into<Value>,
        setter: Option<&str>,
    ) -> Result<(), ModelError> {
        if let Some(mut event) = self.assign(id, attr, value.into())? {
            event.setter = setter.map(str::to_owned);
            self.sinks().dispatch(event);
        }
        Ok(())
    }

    /// Stores `value` without telling anyone. Returns the event to emit,
    /// if the value changed.
    pub(crate) fn assign(
        &mut self,
        id: ModelId,
        attr: &str,
        value: Value,
    ) -> Result<Option<ChangeEvent>, ModelError> {
        let def = self.instance(id)?.def();
        let prop = def.property(attr).ok_or_else(|| ModelError::UnknownAttribute {
            type_name: def.name(),
            attr: attr.to_owned(),
        })?;
        if validation_on() {
            prop.spec
                .validate(&value, &*self, true)
                .map_err(|source| ModelError::Validation {
                    model: self.describe(id),
                    attr: attr.to_owned(),
                    source,
                })?;
        }
        let new = prop.spec.wrap(prop.spec.transform(value), &mut self.containers);

        let old = self.get(id, attr)?.clone();
        let old_plain = self.containers.to_plain(&old);
        let changed = old_plain != self.containers.to_plain(&new);
        let (before, after) = (old.as_container(), new.as_container());
        if before != after {
            let owner = Owner::new(id, prop.name);
            if let Some(before) = before {
                self.containers.unregister_owner(before, &owner)?;
            }
            if let Some(after) = after {
                self.containers.register_owner(after, owner)?;
            }
        }

        let instance = self.models.get_mut(&id).ok_or(ModelError::NoSuchModel(id))?;
        instance.replace(prop.name, new.clone());
        instance.mark_set(prop.name);
        Ok(changed.then(|| ChangeEvent {
            model: id,
            attr: prop.name.to_owned(),
            old: old_plain,
            new,
            hint: None,
            setter: None,
        }))
    }

    // ── Containers ────────────────────────────────────────────────────────

    /// The container `attr` holds, checked to be of `kind`.
    pub fn container_of(
        &self,
        id: ModelId,
        attr: &str,
        kind: ContainerKind,
    ) -> Result<ContainerId, ModelError> {
        let not_a_container = || ModelError::NotAContainer {
            model: self.describe(id),
            attr: attr.to_owned(),
            expected: kind,
        };
        let container = self.get(id, attr)?.as_container().ok_or_else(not_a_container)?;
        match self.containers.get(container) {
            Some(slot) if slot.kind() == kind => Ok(container),
            _ => Err(not_a_container()),
        }
    }

    fn split(&mut self, container: ContainerId) -> (&mut ContainerArena, Fanout<'_>) {
        let Document {
            models,
            containers,
            listeners,
            recording,
            events,
            ..
        } = self;
        let sinks = EventSinks {
            models,
            listeners,
            queue: (*recording).then_some(events),
        };
        (containers, Fanout::new(container, sinks))
    }

    fn sinks(&mut self) -> EventSinks<'_> {
        EventSinks {
            models: &mut self.models,
            listeners: &mut self.listeners,
            queue: self.recording.then_some(&mut self.events),
        }
    }

    /// In-place access to a list attribute. Every mutation notifies all
    /// owners of the list, not only `id`.
    pub fn list_mut(&mut self, id: ModelId, attr: &str) -> Result<ListMut<'_, Fanout<'_>>, ModelError> {
        let container = self.container_of(id, attr, ContainerKind::List)?;
        let (arena, fanout) = self.split(container);
        Ok(arena.list(container, fanout)?)
    }

    pub fn dict_mut(&mut self, id: ModelId, attr: &str) -> Result<DictMut<'_, Fanout<'_>>, ModelError> {
        let container = self.container_of(id, attr, ContainerKind::Dict)?;
        let (arena, fanout) = self.split(container);
        Ok(arena.dict(container, fanout)?)
    }

    pub fn set_mut(&mut self, id: ModelId, attr: &str) -> Result<SetMut<'_, Fanout<'_>>, ModelError> {
        let container = self.container_of(id, attr, ContainerKind::Set)?;
        let (arena, fanout) = self.split(container);
        Ok(arena.set(container, fanout)?)
    }

    pub fn columns_mut(
        &mut self,
        id: ModelId,
        attr: &str,
    ) -> Result<ColumnsMut<'_, Fanout<'_>>, ModelError> {
        let container = self.container_of(id, attr, ContainerKind::ColumnData)?;
        let (arena, fanout) = self.split(container);
        Ok(arena.columns(container, fanout)?)
    }

    /// Appends rows to a column table attribute, keeping at most `rollover`.
    pub fn stream(
        &mut self,
        id: ModelId,
        attr: &str,
        data: ColumnMap,
        rollover: Option<usize>,
        setter: Option<&str>,
    ) -> Result<(), ModelError> {
        self.columns_mut(id, attr)?.stream(data, rollover, setter)?;
        Ok(())
    }

    /// Replaces individual cells or slices of a column table attribute.
    pub fn patch(
        &mut self,
        id: ModelId,
        attr: &str,
        patches: PatchSet,
        setter: Option<&str>,
    ) -> Result<(), ModelError> {
        self.columns_mut(id, attr)?.patch(patches, setter)?;
        Ok(())
    }

    /// A new, unowned container with the entries of the one `attr` holds,
    /// ready to be assigned elsewhere. Nested containers stay shared.
    pub fn shallow_copy(&mut self, id: ModelId, attr: &str) -> Result<Value, ModelError> {
        let container = self.any_container(id, attr)?;
        Ok(Value::Container(self.containers.shallow_copy(container)?))
    }

    /// Like [`Document::shallow_copy`], with nested containers copied too.
    pub fn deep_copy(&mut self, id: ModelId, attr: &str) -> Result<Value, ModelError> {
        let container = self.any_container(id, attr)?;
        Ok(Value::Container(self.containers.deep_copy(container)?))
    }

    fn any_container(&self, id: ModelId, attr: &str) -> Result<ContainerId, ModelError> {
        self.get(id, attr)?.as_container().ok_or_else(|| {
            ModelError::Usage(format!("{}.{attr} does not hold a container", self.describe(id)))
        })
    }

    // ── Roots and graph ───────────────────────────────────────────────────

    pub fn add_root(&mut self, id: ModelId) -> Result<(), ModelError> {
        self.instance(id)?;
        self.roots.insert(id);
        Ok(())
    }

    pub fn remove_root(&mut self, id: ModelId) -> bool {
        self.roots.shift_remove(&id)
    }

    pub fn roots(&self) -> Vec<ModelId> {
        self.roots.iter().copied().collect()
    }

    /// Drops every instance not reachable from the roots, then frees the
    /// containers no surviving instance or pending event holds. Returns how
    /// many instances were removed.
    pub fn prune(&mut self) -> usize {
        let reachable = graph::collect_models(self, &self.roots());
        let doomed: Vec<ModelId> = self
            .models
            .keys()
            .copied()
            .filter(|id| !reachable.contains(*id))
            .collect();
        for id in &doomed {
            self.discard(*id);
        }
        let held = self
            .models
            .values()
            .flat_map(|instance| instance.attributes().map(|(_, value)| value))
            .chain(self.events.iter().flat_map(|event| [&event.old, &event.new]));
        self.containers.retain_reachable(held);
        debug!(removed = doomed.len(), kept = self.models.len(), "document pruned");
        doomed.len()
    }

    /// Instances reachable from the roots that match `selector`.
    pub fn select(&self, selector: &Selector) -> Result<Vec<ModelId>, ModelError> {
        graph::select(self, &self.roots(), selector)
    }

    // ── Listeners ─────────────────────────────────────────────────────────

    pub fn on_change<F>(&mut self, listener: F) -> u64
    where
        F: FnMut(ChangeEvent) + Send + Sync + 'static,
    {
        let id = self.take_listener_id();
        self.listeners.insert(id, Box::new(listener));
        id
    }

    pub fn off_change(&mut self, listener_id: u64) -> bool {
        self.listeners.remove(&listener_id).is_some()
    }

    /// Subscribes to changes of one instance, optionally of one attribute.
    /// Runs before the document-wide listeners.
    pub fn on_attr_change<F>(&mut self, id: ModelId, attr: Option<&str>, listener: F) -> Result<u64, ModelError>
    where
        F: FnMut(ChangeEvent) + Send + Sync + 'static,
    {
        let instance = self.instance(id)?;
        if let Some(attr) = attr {
            if !instance.def().has_property(attr) {
                return Err(ModelError::UnknownAttribute {
                    type_name: instance.type_name(),
                    attr: attr.to_owned(),
                });
            }
        }
        let listener_id = self.take_listener_id();
        let instance = self.models.get_mut(&id).ok_or(ModelError::NoSuchModel(id))?;
        instance.subscribe(listener_id, attr.map(str::to_owned), Box::new(listener));
        Ok(listener_id)
    }

    pub fn off_attr_change(&mut self, id: ModelId, listener_id: u64) -> bool {
        self.models
            .get_mut(&id)
            .is_some_and(|instance| instance.unsubscribe(listener_id))
    }

    fn take_listener_id(&mut self) -> u64 {
        let id = self.next_listener_id.max(1);
        self.next_listener_id = id.saturating_add(1);
        id
    }

    /// Starts or stops queueing change events for [`Document::take_events`].
    /// Off by default; stopping discards whatever is queued.
    pub fn record_events(&mut self, on: bool) {
        self.recording = on;
        if !on {
            self.events = Vec::new();
        }
    }

    pub fn is_recording(&self) -> bool {
        self.recording
    }

    /// Drains the events recorded since the last call.
    pub fn take_events(&mut self) -> Vec<ChangeEvent> {
        std::mem::take(&mut self.events)
    }
}

impl ValueContext for Document {
    fn container(&self, id: ContainerId) -> Option<&PropertyContainer> {
        self.containers.get(id)
    }

    fn model_type(&self, id: ModelId) -> Option<&str> {
        self.models.get(&id).map(ModelInstance::type_name)
    }

    fn is_instance_of(&self, id: ModelId, type_name: &str) -> bool {
        self.models
            .get(&id)
            .is_some_and(|instance| instance.def().is_subclass_of(type_name))
    }
}

impl std::fmt::Debug for Document {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Document")
            .field("models", &self.models)
            .field("roots", &self.roots)
            .field("containers", &self.containers.len())
            .field("listeners", &self.listeners.len())
            .field("recording", &self.recording)
            .field("pending_events", &self.events.len())
            .finish()
    }
}
