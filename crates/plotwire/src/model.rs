//! Static per-type property tables.
//!
//! Every model type is described once by a [`ModelDef`]: its name, parent,
//! ordered [`PropertyDef`]s (inherited ones first) and integrity checks.
//! Definitions are registered in a process-wide [`ModelRegistry`] built on
//! first use from the built-in catalog.

use std::sync::OnceLock;

use indexmap::IndexMap;
use plotwire_props::{ModelId, TypeSpec, Value};

use crate::document::Document;
use crate::error::ModelError;
use crate::integrity::IssueCode;

/// How a property gets its value on a fresh instance.
#[derive(Debug, Clone)]
pub enum DefaultValue {
    Value(Value),
    Factory(fn() -> Value),
    /// A new instance of the named model type.
    Model(&'static str),
}

impl DefaultValue {
    pub fn value(value: impl Into<Value>) -> Self {
        DefaultValue::Value(value.into())
    }

    /// Defaults that produce a new model instance per owner are always
    /// sent on the wire, since a receiver cannot recreate them identically.
    pub fn is_unstable(&self) -> bool {
        matches!(self, DefaultValue::Model(_))
    }
}

#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub name: &'static str,
    pub spec: TypeSpec,
    pub default: DefaultValue,
    pub serialized: bool,
    /// A number or the name of a column of the renderer's data source.
    pub dataspec: bool,
}

/// Checks an instance; `Some(detail)` reports an issue.
pub type CheckFn = fn(&Document, ModelId) -> Option<String>;

#[derive(Debug, Clone, Copy)]
pub struct IntegrityCheck {
    pub code: IssueCode,
    pub run: CheckFn,
}

#[derive(Debug)]
pub struct ModelDef {
    name: &'static str,
    parent: Option<&'static str>,
    is_abstract: bool,
    ancestors: Vec<&'static str>,
    props: IndexMap<&'static str, PropertyDef>,
    checks: Vec<IntegrityCheck>,
}

impl ModelDef {
    pub fn builder(name: &'static str) -> ModelDefBuilder {
        ModelDefBuilder {
            name,
            parent: None,
            is_abstract: false,
            props: Vec::new(),
            checks: Vec::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn parent(&self) -> Option<&'static str> {
        self.parent
    }

    pub fn is_abstract(&self) -> bool {
        self.is_abstract
    }

    /// `true` for the type itself and for every type it derives from.
    pub fn is_subclass_of(&self, type_name: &str) -> bool {
        self.ancestors.iter().any(|name| *name == type_name)
    }

    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.props.get(name)
    }

    pub fn has_property(&self, name: &str) -> bool {
        self.props.contains_key(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = &PropertyDef> {
        self.props.values()
    }

    pub fn checks(&self) -> &[IntegrityCheck] {
        &self.checks
    }
}

pub struct ModelDefBuilder {
    name: &'static str,
    parent: Option<&'static str>,
    is_abstract: bool,
    props: Vec<PropertyDef>,
    checks: Vec<IntegrityCheck>,
}

impl ModelDefBuilder {
    pub fn extends(mut self, parent: &'static str) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn abstract_type(mut self) -> Self {
        self.is_abstract = true;
        self
    }

    /// Declares a property, or overrides an inherited one of the same name.
    pub fn prop(self, name: &'static str, spec: TypeSpec, default: DefaultValue) -> Self {
        self.push(name, spec, default, true, false)
    }

    pub fn dataspec(self, name: &'static str, spec: TypeSpec, default: DefaultValue) -> Self {
        self.push(name, spec, default, true, true)
    }

    /// A property that is never sent on the wire.
    pub fn internal(self, name: &'static str, spec: TypeSpec, default: DefaultValue) -> Self {
        self.push(name, spec, default, false, false)
    }

    pub fn check(mut self, code: IssueCode, run: CheckFn) -> Self {
        self.checks.push(IntegrityCheck { code, run });
        self
    }

    fn push(
        mut self,
        name: &'static str,
        spec: TypeSpec,
        default: DefaultValue,
        serialized: bool,
        dataspec: bool,
    ) -> Self {
        self.props.push(PropertyDef {
            name,
            spec,
            default,
            serialized,
            dataspec,
        });
        self
    }
}

#[derive(Debug, Default)]
pub struct ModelRegistry {
    defs: IndexMap<&'static str, ModelDef>,
}

impl ModelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a type. Its parent must already be registered.
    pub fn register(&mut self, builder: ModelDefBuilder) -> Result<(), ModelError> {
        let (mut ancestors, mut props, mut checks) = match builder.parent {
            Some(parent) => {
                let base = self
                    .defs
                    .get(parent)
                    .ok_or_else(|| ModelError::UnknownType(parent.to_owned()))?;
                (base.ancestors.clone(), base.props.clone(), base.checks.clone())
            }
            None => (Vec::new(), IndexMap::new(), Vec::new()),
        };
        ancestors.insert(0, builder.name);
        for prop in builder.props {
            props.insert(prop.name, prop);
        }
        checks.extend(builder.checks);
        self.defs.insert(
            builder.name,
            ModelDef {
                name: builder.name,
                parent: builder.parent,
                is_abstract: builder.is_abstract,
                ancestors,
                props,
                checks,
            },
        );
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&ModelDef> {
        self.defs.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ModelDef> {
        self.defs.values()
    }
}

pub fn registry() -> &'static ModelRegistry {
    static REGISTRY: OnceLock<ModelRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| crate::models::catalog().expect("built-in catalog registers parents first"))
}

pub fn lookup(type_name: &str) -> Result<&'static ModelDef, ModelError> {
    registry()
        .get(type_name)
        .ok_or_else(|| ModelError::UnknownType(type_name.to_owned()))
}
