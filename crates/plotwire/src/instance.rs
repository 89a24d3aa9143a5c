use std::collections::BTreeMap;
use std::fmt;

use indexmap::{IndexMap, IndexSet};
use plotwire_props::{ModelId, Value};

use crate::events::{ChangeEvent, Listener};
use crate::model::ModelDef;

struct Subscriber {
    attr: Option<String>,
    callback: Listener,
}

/// One model object: its type, its current attribute values and the
/// callbacks subscribed to it.
pub struct ModelInstance {
    id: ModelId,
    def: &'static ModelDef,
    values: IndexMap<&'static str, Value>,
    set_attrs: IndexSet<&'static str>,
    subscribers: BTreeMap<u64, Subscriber>,
}

impl ModelInstance {
    pub(crate) fn new(id: ModelId, def: &'static ModelDef, values: IndexMap<&'static str, Value>) -> Self {
        Self {
            id,
            def,
            values,
            set_attrs: IndexSet::new(),
            subscribers: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> ModelId {
        self.id
    }

    pub fn def(&self) -> &'static ModelDef {
        self.def
    }

    pub fn type_name(&self) -> &'static str {
        self.def.name()
    }

    /// The stored value; containers appear as handles.
    pub fn get(&self, attr: &str) -> Option<&Value> {
        self.values.get(attr)
    }

    pub fn attributes(&self) -> impl Iterator<Item = (&'static str, &Value)> {
        self.values.iter().map(|(name, value)| (*name, value))
    }

    /// `true` once the attribute was assigned or mutated in place.
    pub fn is_set(&self, attr: &str) -> bool {
        self.set_attrs.contains(attr)
    }

    pub(crate) fn replace(&mut self, attr: &'static str, value: Value) -> Option<Value> {
        self.values.insert(attr, value)
    }

    pub(crate) fn mark_set(&mut self, attr: &str) {
        if let Some((&name, _)) = self.values.get_key_value(attr) {
            self.set_attrs.insert(name);
        }
    }

    pub(crate) fn subscribe(&mut self, id: u64, attr: Option<String>, callback: Listener) {
        self.subscribers.insert(id, Subscriber { attr, callback });
    }

    pub(crate) fn unsubscribe(&mut self, id: u64) -> bool {
        self.subscribers.remove(&id).is_some()
    }

    pub(crate) fn notify(&mut self, event: &ChangeEvent) {
        for subscriber in self.subscribers.values_mut() {
            if subscriber.attr.as_deref().is_some_and(|attr| attr != event.attr) {
                continue;
            }
            (subscriber.callback)(event.clone());
        }
    }
}

impl fmt::Debug for ModelInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModelInstance")
            .field("id", &self.id)
            .field("type", &self.def.name())
            .field("values", &self.values)
            .field("set_attrs", &self.set_attrs)
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
