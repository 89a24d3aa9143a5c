use std::collections::BTreeMap;

use indexmap::IndexMap;
use plotwire_props::{
    validation_on, ContainerError, ContainerId, ContainerValue, Hint, ModelId, Owner, OwnerNotify,
    PropertyContainer, Value, ValueContext,
};
use tracing::debug;

use crate::instance::ModelInstance;

/// An attribute of a model changed, by assignment or by an in-place
/// mutation of the container it holds.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub model: ModelId,
    pub attr: String,
    pub old: Value,
    pub new: Value,
    pub hint: Option<Hint>,
    /// Identifies the originator of the change, so it can skip its own echo.
    pub setter: Option<String>,
}

pub(crate) type Listener = Box<dyn FnMut(ChangeEvent) + Send + Sync>;

/// Everything an event is delivered to, borrowed out of a document.
pub(crate) struct EventSinks<'a> {
    pub(crate) models: &'a mut IndexMap<ModelId, ModelInstance>,
    pub(crate) listeners: &'a mut BTreeMap<u64, Listener>,
    /// Present only while the document records events.
    pub(crate) queue: Option<&'a mut Vec<ChangeEvent>>,
}

impl EventSinks<'_> {
    /// Instance subscribers first, then document listeners, then the queue.
    pub(crate) fn dispatch(&mut self, event: ChangeEvent) {
        debug!(model = %event.model, attr = %event.attr, hinted = event.hint.is_some(), "change event");
        if let Some(instance) = self.models.get_mut(&event.model) {
            instance.notify(&event);
        }
        for listener in self.listeners.values_mut() {
            listener(event.clone());
        }
        if let Some(queue) = self.queue.as_deref_mut() {
            queue.push(event);
        }
    }
}

/// Turns container owner notifications into change events on the owning
/// models. Handed to the mutation handles of a document's containers.
pub struct Fanout<'a> {
    container: ContainerId,
    sinks: EventSinks<'a>,
}

impl<'a> Fanout<'a> {
    pub(crate) fn new(container: ContainerId, sinks: EventSinks<'a>) -> Self {
        Self { container, sinks }
    }
}

impl OwnerNotify for Fanout<'_> {
    /// Runs the mutated contents through the owning attribute's spec, as an
    /// assignment would.
    fn check_owner(&mut self, owner: &Owner, new: &ContainerValue) -> Result<(), ContainerError> {
        if !validation_on() {
            return Ok(());
        }
        let models = &*self.sinks.models;
        let Some(instance) = models.get(&owner.model) else {
            return Ok(());
        };
        let Some(prop) = instance.def().property(&owner.attr) else {
            return Ok(());
        };
        prop.spec
            .validate(&new.to_value(), &ModelsOnly(models), true)
            .map_err(|source| ContainerError::Validation {
                target: format!("{}(id='{}', ...).{}", instance.type_name(), owner.model, owner.attr),
                source,
            })
    }

    fn notify_owner(&mut self, owner: &Owner, old: &ContainerValue, hint: Option<&Hint>) {
        if let Some(instance) = self.sinks.models.get_mut(&owner.model) {
            instance.mark_set(&owner.attr);
        }
        self.sinks.dispatch(ChangeEvent {
            model: owner.model,
            attr: owner.attr.clone(),
            old: old.to_value(),
            new: Value::Container(self.container),
            setter: hint.and_then(Hint::setter).map(str::to_owned),
            hint: hint.cloned(),
        });
    }
}

/// Instance lookups for [`Fanout::check_owner`]. The arena is borrowed by the
/// mutating handle, so nested container handles do not resolve here.
struct ModelsOnly<'a>(&'a IndexMap<ModelId, ModelInstance>);

impl ValueContext for ModelsOnly<'_> {
    fn container(&self, _id: ContainerId) -> Option<&PropertyContainer> {
        None
    }

    fn model_type(&self, id: ModelId) -> Option<&str> {
        self.0.get(&id).map(ModelInstance::type_name)
    }

    fn is_instance_of(&self, id: ModelId, type_name: &str) -> bool {
        self.0
            .get(&id)
            .is_some_and(|instance| instance.def().is_subclass_of(type_name))
    }
}
