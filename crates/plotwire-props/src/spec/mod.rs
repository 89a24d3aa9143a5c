//! Declarative property types.
//!
//! A [`TypeSpec`] describes the values an attribute accepts. It validates
//! (with or without a diagnostic message), coerces raw values into their
//! canonical form, wraps raw aggregates into observable containers and
//! reports whether values of the type can carry model references.

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;

use crate::container::{ContainerArena, ContainerValue, PropertyContainer};
use crate::error::{ImageError, ValidationError};
use crate::value::{ContainerId, ModelId, Value};

pub mod enums;
mod validator;

/// What validation can look up besides the value itself.
pub trait ValueContext {
    fn container(&self, id: ContainerId) -> Option<&PropertyContainer>;

    /// Concrete type name of a model instance, when known.
    fn model_type(&self, _id: ModelId) -> Option<&str> {
        None
    }

    /// `true` when `id` names an instance of `type_name` or of a subtype.
    fn is_instance_of(&self, _id: ModelId, _type_name: &str) -> bool {
        false
    }
}

impl ValueContext for () {
    fn container(&self, _id: ContainerId) -> Option<&PropertyContainer> {
        None
    }
}

impl ValueContext for ContainerArena {
    fn container(&self, id: ContainerId) -> Option<&PropertyContainer> {
        self.get(id)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EnumSpec {
    pub name: Option<&'static str>,
    pub values: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum TypeSpec {
    Any,
    /// Any value; references inside it are followed by graph traversal.
    AnyRef,
    Null,
    Bool,
    Int,
    Float,
    String,
    NonNegative(Box<TypeSpec>),
    Interval {
        base: Box<TypeSpec>,
        start: f64,
        end: f64,
    },
    Percent,
    Enum(EnumSpec),
    Regex(Regex),
    Nullable(Box<TypeSpec>),
    Either(Vec<TypeSpec>),
    List(Box<TypeSpec>),
    Seq(Box<TypeSpec>),
    Set(Box<TypeSpec>),
    Tuple(Vec<TypeSpec>),
    Dict(Box<TypeSpec>, Box<TypeSpec>),
    ColumnData(Box<TypeSpec>, Box<TypeSpec>),
    Instance(&'static str),
    /// An alias: behaves as the inner spec, displays as the name.
    Named(&'static str, Box<TypeSpec>),
    DashPattern,
    FontSize,
    MinMaxBounds,
    Image,
}

// ── Builders ───────────────────────────────────────────────────────────────

impl TypeSpec {
    pub fn nullable(inner: TypeSpec) -> Self {
        TypeSpec::Nullable(Box::new(inner))
    }

    pub fn either(alternatives: impl IntoIterator<Item = TypeSpec>) -> Self {
        TypeSpec::Either(alternatives.into_iter().collect())
    }

    pub fn list(item: TypeSpec) -> Self {
        TypeSpec::List(Box::new(item))
    }

    pub fn seq(item: TypeSpec) -> Self {
        TypeSpec::Seq(Box::new(item))
    }

    pub fn set(item: TypeSpec) -> Self {
        TypeSpec::Set(Box::new(item))
    }

    pub fn tuple(items: impl IntoIterator<Item = TypeSpec>) -> Self {
        TypeSpec::Tuple(items.into_iter().collect())
    }

    pub fn dict(key: TypeSpec, value: TypeSpec) -> Self {
        TypeSpec::Dict(Box::new(key), Box::new(value))
    }

    pub fn column_data(key: TypeSpec, value: TypeSpec) -> Self {
        TypeSpec::ColumnData(Box::new(key), Box::new(value))
    }

    pub fn instance(type_name: &'static str) -> Self {
        TypeSpec::Instance(type_name)
    }

    pub fn non_negative(base: TypeSpec) -> Self {
        TypeSpec::NonNegative(Box::new(base))
    }

    pub fn interval(base: TypeSpec, start: f64, end: f64) -> Self {
        TypeSpec::Interval {
            base: Box::new(base),
            start,
            end,
        }
    }

    pub fn enumeration(values: &[&str]) -> Self {
        TypeSpec::Enum(EnumSpec {
            name: None,
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        })
    }

    pub fn named_enum(name: &'static str, values: &[&str]) -> Self {
        TypeSpec::Enum(EnumSpec {
            name: Some(name),
            values: values.iter().map(|v| (*v).to_owned()).collect(),
        })
    }

    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Regex::new(pattern).map(TypeSpec::Regex)
    }

    pub fn named(name: &'static str, inner: TypeSpec) -> Self {
        TypeSpec::Named(name, Box::new(inner))
    }

    /// An integer in `0..=255`.
    pub fn byte() -> Self {
        TypeSpec::named("Byte", TypeSpec::interval(TypeSpec::Int, 0.0, 255.0))
    }

    /// A named CSS colour, a hex literal, or an RGB/RGBA tuple.
    pub fn color() -> Self {
        TypeSpec::named(
            "Color",
            TypeSpec::either([
                TypeSpec::named_enum("NamedColor", enums::NAMED_COLOR),
                TypeSpec::Regex(hex_color_regex().clone()),
                TypeSpec::tuple([TypeSpec::byte(), TypeSpec::byte(), TypeSpec::byte()]),
                TypeSpec::tuple([
                    TypeSpec::byte(),
                    TypeSpec::byte(),
                    TypeSpec::byte(),
                    TypeSpec::Percent,
                ]),
            ]),
        )
    }

    pub fn marker_type() -> Self {
        TypeSpec::named_enum("MarkerType", enums::MARKER_TYPE)
    }

    /// A number, or the name of a data source column holding the numbers.
    pub fn number_spec() -> Self {
        TypeSpec::named(
            "NumberSpec",
            TypeSpec::either([TypeSpec::Float, TypeSpec::String]),
        )
    }
}

fn hex_color_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^#([0-9a-fA-F]{3,4}|[0-9a-fA-F]{6}|[0-9a-fA-F]{8})$").expect("literal pattern")
    })
}

pub(crate) fn font_size_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?i)^[0-9]+(\.[0-9]+)?(%|em|ex|ch|ic|rem|vw|vh|vi|vb|vmin|vmax|cm|mm|q|in|pc|pt|px)$",
        )
        .expect("literal pattern")
    })
}

/// The alternatives a dash pattern may be given as.
pub(crate) fn dash_pattern_spec() -> &'static TypeSpec {
    static SPEC: OnceLock<TypeSpec> = OnceLock::new();
    SPEC.get_or_init(|| {
        let names: Vec<&str> = enums::DASH_PATTERNS.iter().map(|(name, _)| *name).collect();
        TypeSpec::either([
            TypeSpec::enumeration(&names),
            TypeSpec::Regex(Regex::new(r"^(\d+(\s+\d+)*)?$").expect("literal pattern")),
            TypeSpec::seq(TypeSpec::Int),
        ])
    })
}

pub(crate) fn min_max_bounds_spec() -> &'static TypeSpec {
    static SPEC: OnceLock<TypeSpec> = OnceLock::new();
    SPEC.get_or_init(|| {
        TypeSpec::either([
            TypeSpec::named("Auto", TypeSpec::enumeration(&["auto"])),
            TypeSpec::tuple([TypeSpec::Float, TypeSpec::Float]),
            TypeSpec::tuple([TypeSpec::nullable(TypeSpec::Float), TypeSpec::Float]),
            TypeSpec::tuple([TypeSpec::Float, TypeSpec::nullable(TypeSpec::Float)]),
        ])
    })
}

// ── Behaviour ──────────────────────────────────────────────────────────────

impl TypeSpec {
    /// Checks `value`. With `detail == false` the error carries no message.
    pub fn validate(
        &self,
        value: &Value,
        cx: &dyn ValueContext,
        detail: bool,
    ) -> Result<(), ValidationError> {
        validator::validate_inner(self, value, cx, detail)
    }

    pub fn is_valid(&self, value: &Value, cx: &dyn ValueContext) -> bool {
        self.validate(value, cx, false).is_ok()
    }

    /// Coerces a raw value into its canonical form. Idempotent.
    pub fn transform(&self, value: Value) -> Value {
        match self {
            TypeSpec::Nullable(_) if value.is_null() => value,
            TypeSpec::Nullable(inner) | TypeSpec::Named(_, inner) => inner.transform(value),
            TypeSpec::Either(alternatives) => {
                let chosen = alternatives.iter().find(|alt| alt.is_valid(&value, &()));
                match chosen {
                    Some(alt) => alt.transform(value),
                    None => value,
                }
            }
            TypeSpec::Tuple(items) => match value {
                Value::List(values) | Value::Tuple(values) if values.len() == items.len() => {
                    Value::Tuple(
                        items
                            .iter()
                            .zip(values)
                            .map(|(spec, v)| spec.transform(v))
                            .collect(),
                    )
                }
                other => other,
            },
            TypeSpec::List(item) | TypeSpec::Seq(item) => match value {
                Value::List(values) => {
                    Value::List(values.into_iter().map(|v| item.transform(v)).collect())
                }
                other => other,
            },
            TypeSpec::Dict(_, item) => match value {
                Value::Map(entries) => Value::Map(
                    entries
                        .into_iter()
                        .map(|(k, v)| (k, item.transform(v)))
                        .collect(),
                ),
                other => other,
            },
            TypeSpec::DashPattern => match value {
                Value::Str(text) => match enums::dash_pattern(&text) {
                    Some(lengths) => Value::list(lengths.iter().copied()),
                    None => match parse_dash_lengths(&text) {
                        Some(lengths) => Value::list(lengths),
                        None => Value::Str(text),
                    },
                },
                Value::Tuple(values) => Value::List(values),
                other => other,
            },
            TypeSpec::MinMaxBounds => match value {
                Value::List(values) if values.len() == 2 => Value::Tuple(values),
                other => other,
            },
            _ => value,
        }
    }

    /// Moves a raw aggregate into a fresh container of the matching kind.
    /// Values that are already containers come back unchanged.
    pub fn wrap(&self, value: Value, arena: &mut ContainerArena) -> Value {
        match (self, value) {
            (TypeSpec::List(_), Value::List(items)) => {
                Value::Container(arena.alloc(ContainerValue::List(items)))
            }
            (TypeSpec::Dict(..), Value::Map(entries)) => {
                Value::Container(arena.alloc(ContainerValue::Dict(entries)))
            }
            (TypeSpec::ColumnData(..), Value::Map(entries)) => {
                let columns = entries
                    .into_iter()
                    .map(|(k, v)| (k.as_str().map_or_else(|| k.to_string(), str::to_owned), v))
                    .collect();
                Value::Container(arena.alloc(ContainerValue::ColumnData(columns)))
            }
            (TypeSpec::Set(_), Value::Set(items)) => {
                Value::Container(arena.alloc(ContainerValue::Set(items)))
            }
            (TypeSpec::Nullable(inner) | TypeSpec::Named(_, inner), value) => {
                inner.wrap(value, arena)
            }
            (TypeSpec::Either(alternatives), value) => {
                let chosen = alternatives.iter().find(|alt| alt.is_valid(&value, &*arena));
                match chosen {
                    Some(alt) => alt.wrap(value, arena),
                    None => value,
                }
            }
            (_, value) => value,
        }
    }

    /// `true` when values of this type can hold model references.
    pub fn has_ref(&self) -> bool {
        match self {
            TypeSpec::Instance(_) | TypeSpec::AnyRef => true,
            TypeSpec::Nullable(inner)
            | TypeSpec::Named(_, inner)
            | TypeSpec::NonNegative(inner)
            | TypeSpec::List(inner)
            | TypeSpec::Seq(inner)
            | TypeSpec::Set(inner) => inner.has_ref(),
            TypeSpec::Interval { base, .. } => base.has_ref(),
            TypeSpec::Either(items) | TypeSpec::Tuple(items) => items.iter().any(TypeSpec::has_ref),
            TypeSpec::Dict(key, value) | TypeSpec::ColumnData(key, value) => {
                key.has_ref() || value.has_ref()
            }
            _ => false,
        }
    }

    /// The form a value takes on the wire, when it differs from the stored
    /// one. Only image attributes are rewritten.
    pub fn wire_value(&self, value: &Value) -> Result<Option<Value>, ImageError> {
        match self {
            TypeSpec::Image => crate::image::to_data_url(value).map(|url| Some(Value::Str(url))),
            TypeSpec::Nullable(_) if value.is_null() => Ok(None),
            TypeSpec::Nullable(inner) | TypeSpec::Named(_, inner) => inner.wire_value(value),
            _ => Ok(None),
        }
    }
}

fn parse_dash_lengths(text: &str) -> Option<Vec<i64>> {
    text.split_whitespace().map(|part| part.parse().ok()).collect()
}

/// Joins names as `a, b or c`.
pub(crate) fn nice_join(items: &[String]) -> String {
    match items {
        [] => String::new(),
        [only] => only.clone(),
        [init @ .., last] => format!("{} or {}", init.join(", "), last),
    }
}

// ── Display ────────────────────────────────────────────────────────────────

fn fmt_bound(base: &TypeSpec, x: f64) -> String {
    if matches!(base, TypeSpec::Int) && x.fract() == 0.0 {
        format!("{}", x as i64)
    } else {
        format!("{x:?}")
    }
}

fn join_specs(specs: &[TypeSpec]) -> String {
    specs
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for TypeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeSpec::Any => f.write_str("Any"),
            TypeSpec::AnyRef => f.write_str("AnyRef"),
            TypeSpec::Null => f.write_str("Null"),
            TypeSpec::Bool => f.write_str("Bool"),
            TypeSpec::Int => f.write_str("Int"),
            TypeSpec::Float => f.write_str("Float"),
            TypeSpec::String => f.write_str("String"),
            TypeSpec::NonNegative(base) => write!(f, "NonNegative({base})"),
            TypeSpec::Interval { base, start, end } => write!(
                f,
                "Interval({base}, {}, {})",
                fmt_bound(base, *start),
                fmt_bound(base, *end)
            ),
            TypeSpec::Percent => f.write_str("Percent"),
            TypeSpec::Enum(spec) => match spec.name {
                Some(name) => f.write_str(name),
                None => {
                    let quoted: Vec<String> = spec.values.iter().map(|v| format!("'{v}'")).collect();
                    write!(f, "Enum({})", quoted.join(", "))
                }
            },
            TypeSpec::Regex(re) => write!(f, "Regex('{}')", re.as_str()),
            TypeSpec::Nullable(inner) => write!(f, "Nullable({inner})"),
            TypeSpec::Either(items) => write!(f, "Either({})", join_specs(items)),
            TypeSpec::List(item) => write!(f, "List({item})"),
            TypeSpec::Seq(item) => write!(f, "Seq({item})"),
            TypeSpec::Set(item) => write!(f, "Set({item})"),
            TypeSpec::Tuple(items) => write!(f, "Tuple({})", join_specs(items)),
            TypeSpec::Dict(key, value) => write!(f, "Dict({key}, {value})"),
            TypeSpec::ColumnData(key, value) => write!(f, "ColumnData({key}, {value})"),
            TypeSpec::Instance(name) => write!(f, "Instance({name})"),
            TypeSpec::Named(name, _) => f.write_str(name),
            TypeSpec::DashPattern => f.write_str("DashPattern"),
            TypeSpec::FontSize => f.write_str("FontSize"),
            TypeSpec::MinMaxBounds => f.write_str("MinMaxBounds"),
            TypeSpec::Image => f.write_str("Image"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_read_like_declarations() {
        assert_eq!(TypeSpec::list(TypeSpec::Float).to_string(), "List(Float)");
        assert_eq!(
            TypeSpec::dict(TypeSpec::String, TypeSpec::Float).to_string(),
            "Dict(String, Float)"
        );
        assert_eq!(
            TypeSpec::interval(TypeSpec::Float, 0.0, 1.0).to_string(),
            "Interval(Float, 0.0, 1.0)"
        );
        assert_eq!(
            TypeSpec::interval(TypeSpec::Int, 0.0, 255.0).to_string(),
            "Interval(Int, 0, 255)"
        );
        assert_eq!(TypeSpec::enumeration(&["red", "green"]).to_string(), "Enum('red', 'green')");
        assert_eq!(TypeSpec::color().to_string(), "Color");
    }

    #[test]
    fn reference_types_are_detected_through_composition() {
        assert!(TypeSpec::instance("Range").has_ref());
        assert!(TypeSpec::dict(TypeSpec::String, TypeSpec::list(TypeSpec::instance("Callback")))
            .has_ref());
        assert!(TypeSpec::AnyRef.has_ref());
        assert!(!TypeSpec::list(TypeSpec::Float).has_ref());
        assert!(!TypeSpec::Any.has_ref());
    }

    #[test]
    fn nice_join_uses_or_before_the_last_item() {
        let items = vec!["A".to_owned(), "B".to_owned(), "C".to_owned()];
        assert_eq!(nice_join(&items), "A, B or C");
        assert_eq!(nice_join(&items[..1]), "A");
    }
}
