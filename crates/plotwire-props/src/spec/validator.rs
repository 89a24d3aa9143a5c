//! Runtime validation of values against a [`TypeSpec`], with the
//! diagnostic messages users see on assignment.

use indexmap::{IndexMap, IndexSet};

use crate::container::ContainerValue;
use crate::error::ValidationError;
use crate::value::{Key, Value};

use super::{dash_pattern_spec, font_size_regex, min_max_bounds_spec, nice_join, TypeSpec, ValueContext};

/// What a value looks like once any container handle is looked through.
enum Shape<'v> {
    Items(&'v [Value]),
    Map(&'v IndexMap<Key, Value>),
    Columns(&'v IndexMap<String, Value>),
    Keys(&'v IndexSet<Key>),
    Scalar(&'v Value),
    Dangling,
}

fn shape<'v>(value: &'v Value, cx: &'v dyn ValueContext) -> Shape<'v> {
    match value {
        Value::Container(id) => match cx.container(*id).map(|c| c.value()) {
            Some(ContainerValue::List(items)) => Shape::Items(items),
            Some(ContainerValue::Dict(entries)) => Shape::Map(entries),
            Some(ContainerValue::ColumnData(columns)) => Shape::Columns(columns),
            Some(ContainerValue::Set(keys)) => Shape::Keys(keys),
            None => Shape::Dangling,
        },
        other => Shape::Scalar(other),
    }
}

/// The value as it should appear in a message: containers shown by content.
fn shown(value: &Value, cx: &dyn ValueContext) -> Value {
    match value {
        Value::Container(id) => cx
            .container(*id)
            .map_or_else(|| value.clone(), |c| c.value().to_value()),
        other => other.clone(),
    }
}

fn type_of(value: &Value, cx: &dyn ValueContext) -> String {
    match value {
        Value::Ref(id) => cx.model_type(*id).unwrap_or("model").to_owned(),
        Value::Container(_) => shown(value, cx).type_name().to_owned(),
        other => other.type_name().to_owned(),
    }
}

fn fail(detail: bool, message: impl FnOnce() -> String) -> Result<(), ValidationError> {
    Err(if detail {
        ValidationError::detailed(message())
    } else {
        ValidationError::bare()
    })
}

fn expected_type(
    name: &str,
    value: &Value,
    cx: &dyn ValueContext,
    detail: bool,
) -> Result<(), ValidationError> {
    fail(detail, || {
        format!(
            "expected a value of type {name}, got {} of type {}",
            shown(value, cx),
            type_of(value, cx)
        )
    })
}

pub(super) fn validate_inner(
    spec: &TypeSpec,
    value: &Value,
    cx: &dyn ValueContext,
    detail: bool,
) -> Result<(), ValidationError> {
    match spec {
        TypeSpec::Any | TypeSpec::AnyRef => Ok(()),

        TypeSpec::Null => match value {
            Value::Null => Ok(()),
            _ => expected_type("None", value, cx, detail),
        },

        TypeSpec::Bool => match value {
            Value::Bool(_) => Ok(()),
            _ => expected_type("bool", value, cx, detail),
        },

        TypeSpec::Int => match value {
            Value::Int(_) => Ok(()),
            _ => expected_type("Integral", value, cx, detail),
        },

        TypeSpec::Float => match value {
            Value::Int(_) | Value::Float(_) => Ok(()),
            _ => expected_type("Real", value, cx, detail),
        },

        TypeSpec::String => match value {
            Value::Str(_) => Ok(()),
            _ => expected_type("str", value, cx, detail),
        },

        TypeSpec::NonNegative(base) => {
            validate_inner(base, value, cx, detail)?;
            match value.as_f64() {
                Some(x) if x < 0.0 => fail(detail, || {
                    format!("expected a non-negative number, got {value}")
                }),
                _ => Ok(()),
            }
        }

        TypeSpec::Interval { base, start, end } => {
            validate_inner(base, value, cx, detail)?;
            match value.as_f64() {
                Some(x) if (*start..=*end).contains(&x) => Ok(()),
                _ => fail(detail, || {
                    format!(
                        "expected a value of type {base} in range [{}, {}], got {}",
                        super::fmt_bound(base, *start),
                        super::fmt_bound(base, *end),
                        shown(value, cx)
                    )
                }),
            }
        }

        TypeSpec::Percent => {
            validate_inner(&TypeSpec::Float, value, cx, detail)?;
            match value.as_f64() {
                Some(x) if (0.0..=1.0).contains(&x) => Ok(()),
                _ => fail(detail, || format!("expected a value in range [0, 1], got {value}")),
            }
        }

        TypeSpec::Enum(spec) => match value {
            Value::Str(s) if spec.values.iter().any(|v| v == s) => Ok(()),
            _ => fail(detail, || {
                format!(
                    "invalid value: {}; allowed values are {}",
                    shown(value, cx).repr(),
                    nice_join(&spec.values)
                )
            }),
        },

        TypeSpec::Regex(re) => match value {
            Value::Str(s) if re.is_match(s) => Ok(()),
            _ => fail(detail, || {
                format!(
                    "expected a string matching '{}' pattern, got {}",
                    re.as_str(),
                    shown(value, cx).repr()
                )
            }),
        },

        TypeSpec::Nullable(inner) => {
            if value.is_null() || validate_inner(inner, value, cx, false).is_ok() {
                return Ok(());
            }
            fail(detail, || {
                format!(
                    "expected an element of either None or {inner}, got {}",
                    shown(value, cx).repr()
                )
            })
        }

        TypeSpec::Either(alternatives) => validate_either(alternatives, value, cx, detail),

        TypeSpec::List(item) => {
            let ok = match shape(value, cx) {
                Shape::Items(items) => all_valid(item, items, cx),
                Shape::Scalar(Value::List(items)) => all_valid(item, items, cx),
                _ => false,
            };
            element_result(ok, spec, value, cx, detail)
        }

        TypeSpec::Seq(item) => {
            let ok = match shape(value, cx) {
                Shape::Items(items) => all_valid(item, items, cx),
                Shape::Scalar(Value::List(items) | Value::Tuple(items)) => {
                    all_valid(item, items, cx)
                }
                Shape::Scalar(Value::Array(array)) => array
                    .data()
                    .iter()
                    .all(|x| item.is_valid(&number_value(array.dtype().is_integer(), *x), cx)),
                _ => false,
            };
            element_result(ok, spec, value, cx, detail)
        }

        TypeSpec::Set(item) => {
            let ok = match shape(value, cx) {
                Shape::Keys(keys) | Shape::Scalar(Value::Set(keys)) => {
                    keys.iter().all(|k| item.is_valid(&k.to_value(), cx))
                }
                _ => false,
            };
            element_result(ok, spec, value, cx, detail)
        }

        TypeSpec::Tuple(items) => {
            let ok = match value {
                Value::List(values) | Value::Tuple(values) => {
                    values.len() == items.len()
                        && items.iter().zip(values).all(|(s, v)| s.is_valid(v, cx))
                }
                _ => false,
            };
            element_result(ok, spec, value, cx, detail)
        }

        TypeSpec::Dict(key_spec, value_spec) => {
            let entries: Vec<(Value, &Value)> = match shape(value, cx) {
                Shape::Map(map) | Shape::Scalar(Value::Map(map)) => {
                    map.iter().map(|(k, v)| (k.to_value(), v)).collect()
                }
                _ => return not_a_dict(spec, value, cx, detail),
            };
            validate_entries(spec, key_spec, value_spec, &entries, cx, detail)
        }

        TypeSpec::ColumnData(key_spec, value_spec) => {
            let entries: Vec<(Value, &Value)> = match shape(value, cx) {
                Shape::Columns(columns) => columns
                    .iter()
                    .map(|(k, v)| (Value::Str(k.clone()), v))
                    .collect(),
                Shape::Scalar(Value::Map(map)) => {
                    map.iter().map(|(k, v)| (k.to_value(), v)).collect()
                }
                _ => return not_a_dict(spec, value, cx, detail),
            };
            validate_entries(spec, key_spec, value_spec, &entries, cx, detail)
        }

        TypeSpec::Instance(type_name) => match value {
            Value::Ref(id) if cx.is_instance_of(*id, type_name) => Ok(()),
            _ => fail(detail, || {
                format!(
                    "expected an instance of type {type_name}, got {} of type {}",
                    shown(value, cx),
                    type_of(value, cx)
                )
            }),
        },

        TypeSpec::Named(_, inner) => validate_inner(inner, value, cx, detail),

        TypeSpec::DashPattern => validate_inner(dash_pattern_spec(), value, cx, detail),

        TypeSpec::FontSize => match value {
            Value::Str(s) if font_size_regex().is_match(s) => Ok(()),
            Value::Str(_) => fail(detail, || {
                format!("{} is not a valid font size value", value.repr())
            }),
            _ => expected_type("str", value, cx, detail),
        },

        TypeSpec::MinMaxBounds => {
            validate_inner(min_max_bounds_spec(), value, cx, detail)?;
            let bounds = value.as_items().map(|items| (items[0].as_f64(), items[1].as_f64()));
            match bounds {
                Some((Some(min), Some(max))) if min > max => fail(detail, || {
                    "Invalid bounds: maximum smaller than minimum. Correct usage: bounds=(min, max)"
                        .to_owned()
                }),
                _ => Ok(()),
            }
        }

        TypeSpec::Image => {
            let ok = match value {
                Value::Str(_) | Value::Path(_) => true,
                Value::Bytes(bytes) => ::image::guess_format(bytes).is_ok(),
                Value::Array(array) => crate::image::is_rgb_array(array),
                _ => false,
            };
            if ok {
                return Ok(());
            }
            fail(detail, || {
                format!(
                    "expected an image (data URL, URL, file path, icon name, encoded image bytes \
                     or RGB(A) uint8 array), got {} of type {}",
                    shown(value, cx),
                    type_of(value, cx)
                )
            })
        }
    }
}

fn number_value(integer: bool, x: f64) -> Value {
    if integer {
        Value::Int(x as i64)
    } else {
        Value::Float(x)
    }
}

fn all_valid(item: &TypeSpec, items: &[Value], cx: &dyn ValueContext) -> bool {
    items.iter().all(|v| item.is_valid(v, cx))
}

fn element_result(
    ok: bool,
    spec: &TypeSpec,
    value: &Value,
    cx: &dyn ValueContext,
    detail: bool,
) -> Result<(), ValidationError> {
    if ok {
        return Ok(());
    }
    fail(detail, || {
        format!("expected an element of {spec}, got {}", shown(value, cx).repr())
    })
}

fn validate_either(
    alternatives: &[TypeSpec],
    value: &Value,
    cx: &dyn ValueContext,
    detail: bool,
) -> Result<(), ValidationError> {
    if alternatives.iter().any(|alt| alt.is_valid(value, cx)) {
        return Ok(());
    }
    fail(detail, || {
        let names: Vec<String> = alternatives.iter().map(ToString::to_string).collect();
        format!(
            "expected an element of either {}, got {}",
            nice_join(&names),
            shown(value, cx).repr()
        )
    })
}

fn not_a_dict(
    spec: &TypeSpec,
    value: &Value,
    cx: &dyn ValueContext,
    detail: bool,
) -> Result<(), ValidationError> {
    fail(detail, || {
        format!(
            "expected a dict of type {spec}, got a value of type {}",
            type_of(value, cx)
        )
    })
}

/// Keys and values are judged independently: a bad key never hides a bad
/// value under it, and both lists keep encounter order.
fn validate_entries(
    spec: &TypeSpec,
    key_spec: &TypeSpec,
    value_spec: &TypeSpec,
    entries: &[(Value, &Value)],
    cx: &dyn ValueContext,
    detail: bool,
) -> Result<(), ValidationError> {
    let bad_keys: Vec<&Value> = entries
        .iter()
        .filter(|(k, _)| !key_spec.is_valid(k, cx))
        .map(|(k, _)| k)
        .collect();
    let bad_values: Vec<&Value> = entries
        .iter()
        .filter(|(_, v)| !value_spec.is_valid(v, cx))
        .map(|(k, _)| k)
        .collect();
    if bad_keys.is_empty() && bad_values.is_empty() {
        return Ok(());
    }
    fail(detail, || {
        let list = |keys: &[&Value]| {
            keys.iter()
                .map(|k| k.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        let mut parts = Vec::new();
        if !bad_keys.is_empty() {
            parts.push(format!("invalid keys: {}", list(&bad_keys)));
        }
        if !bad_values.is_empty() {
            parts.push(format!("invalid values for keys: {}", list(&bad_values)));
        }
        format!("expected a dict of type {spec}, got a dict with {}", parts.join(" and "))
    })
}
