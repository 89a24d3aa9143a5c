//! Reachability over model references.

use std::collections::HashSet;

use indexmap::IndexSet;
use plotwire_props::{ContainerId, ModelId, Value};

use crate::document::Document;
use crate::error::ModelError;
use crate::model;

/// Instances reachable from a set of roots, in discovery order.
#[derive(Debug, Clone, Default)]
pub struct ModelGraph {
    order: Vec<ModelId>,
    seen: HashSet<ModelId>,
}

impl ModelGraph {
    pub fn ids(&self) -> &[ModelId] {
        &self.order
    }

    pub fn contains(&self, id: ModelId) -> bool {
        self.seen.contains(&id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

/// Depth-first closure over every reference-carrying attribute. Ids the
/// document does not hold are not part of the graph.
pub fn collect_models(doc: &Document, roots: &[ModelId]) -> ModelGraph {
    let mut graph = ModelGraph::default();
    let mut stack: Vec<ModelId> = roots.iter().rev().copied().collect();
    while let Some(id) = stack.pop() {
        if !doc.contains(id) || !graph.seen.insert(id) {
            continue;
        }
        graph.order.push(id);
        let next = immediate_references(doc, id);
        stack.extend(next.into_iter().rev().filter(|id| !graph.seen.contains(id)));
    }
    graph
}

/// Instances referenced by `id`'s own attributes, looking through
/// containers but never through another instance.
pub fn immediate_references(doc: &Document, id: ModelId) -> Vec<ModelId> {
    let Some(instance) = doc.model(id) else {
        return Vec::new();
    };
    let mut found = IndexSet::new();
    let mut visiting = Vec::new();
    for prop in instance.def().properties().filter(|prop| prop.spec.has_ref()) {
        if let Some(value) = instance.get(prop.name) {
            references_in(doc, value, &mut found, &mut visiting);
        }
    }
    found.into_iter().collect()
}

/// Instances referenced from inside `value`, looking through containers.
pub fn references_of(doc: &Document, value: &Value) -> Vec<ModelId> {
    let mut found = IndexSet::new();
    references_in(doc, value, &mut found, &mut Vec::new());
    found.into_iter().collect()
}

fn references_in(
    doc: &Document,
    value: &Value,
    found: &mut IndexSet<ModelId>,
    visiting: &mut Vec<ContainerId>,
) {
    match value {
        Value::Ref(id) => {
            found.insert(*id);
        }
        Value::Container(id) => {
            let Some(container) = doc.containers().get(*id) else {
                return;
            };
            if visiting.contains(id) {
                return;
            }
            visiting.push(*id);
            for item in container.value().values() {
                references_in(doc, item, found, visiting);
            }
            visiting.pop();
        }
        Value::List(items) | Value::Tuple(items) => {
            for item in items {
                references_in(doc, item, found, visiting);
            }
        }
        Value::Map(entries) => {
            for item in entries.values() {
                references_in(doc, item, found, visiting);
            }
        }
        _ => {}
    }
}

// ── Selection ─────────────────────────────────────────────────────────────

/// Matches instances by `name` attribute and/or type. Type matching
/// includes subtypes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Selector {
    pub name: Option<String>,
    pub type_name: Option<String>,
}

impl Selector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn type_name(mut self, type_name: impl Into<String>) -> Self {
        self.type_name = Some(type_name.into());
        self
    }

    fn matches(&self, doc: &Document, id: ModelId) -> bool {
        let Some(instance) = doc.model(id) else {
            return false;
        };
        let name_ok = self.name.as_deref().map_or(true, |name| {
            instance.get("name").and_then(Value::as_str) == Some(name)
        });
        let type_ok = self
            .type_name
            .as_deref()
            .map_or(true, |type_name| instance.def().is_subclass_of(type_name));
        name_ok && type_ok
    }
}

pub fn select(doc: &Document, roots: &[ModelId], selector: &Selector) -> Result<Vec<ModelId>, ModelError> {
    if selector.name.is_none() && selector.type_name.is_none() {
        return Err(ModelError::Usage(
            "select requires a name or a type to match".to_owned(),
        ));
    }
    if let Some(type_name) = &selector.type_name {
        model::lookup(type_name)?;
    }
    Ok(collect_models(doc, roots)
        .ids()
        .iter()
        .copied()
        .filter(|id| selector.matches(doc, *id))
        .collect())
}
