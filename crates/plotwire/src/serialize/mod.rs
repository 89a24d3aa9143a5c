//! Wire encoding of documents and values.
//!
//! A document becomes `{"roots": [ids], "models": [records]}` where each
//! record is `{"type", "id", "attributes"}` and references to other
//! instances are `{"id", "type"}` tokens. Values JSON cannot carry directly
//! are wrapped in typed envelopes: `map`, `set`, `ndarray`, `bytes` and
//! `number` (for non-finite floats).

mod decode;

pub use decode::{decode_value, from_json, from_json_str};
pub(crate) use decode::{decode_columns, load_records, resolve_id};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use plotwire_props::{ContainerId, ContainerValue, Key, ModelId, NdArray, Value};
use serde_json::{json, Map, Value as Json};

use crate::document::Document;
use crate::error::SerializeError;
use crate::graph::collect_models;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SerializerOptions {
    /// Emit every attribute, not only the ones explicitly set.
    pub include_defaults: bool,
    /// Encode arrays as base64 `ndarray` envelopes instead of JSON lists.
    pub binary_arrays: bool,
}

impl Default for SerializerOptions {
    fn default() -> Self {
        Self {
            include_defaults: false,
            binary_arrays: true,
        }
    }
}

/// Encodes the roots of `doc` and every instance reachable from them.
pub fn to_json(doc: &Document, options: &SerializerOptions) -> Result<Json, SerializeError> {
    let roots = doc.roots();
    let graph = collect_models(doc, &roots);
    let mut models = Vec::with_capacity(graph.len());
    for id in graph.ids() {
        models.push(model_record(doc, *id, options)?);
    }
    let roots: Vec<String> = roots.iter().map(ToString::to_string).collect();
    Ok(json!({ "roots": roots, "models": models }))
}

pub fn to_json_string(doc: &Document, options: &SerializerOptions) -> Result<String, SerializeError> {
    Ok(serde_json::to_string(&to_json(doc, options)?)?)
}

/// `{"type", "id", "attributes"}` for one instance. Attributes still at a
/// default are left out unless `include_defaults` is set, except defaults
/// that create a new instance, which a receiver could not reproduce.
pub fn model_record(doc: &Document, id: ModelId, options: &SerializerOptions) -> Result<Json, SerializeError> {
    let instance = doc.model(id).ok_or(SerializeError::DanglingReference(id))?;
    let mut encoder = Encoder::new(doc, options);
    let mut attributes = Map::new();
    for prop in instance.def().properties().filter(|prop| prop.serialized) {
        let wanted =
            options.include_defaults || instance.is_set(prop.name) || prop.default.is_unstable();
        let Some(value) = instance.get(prop.name).filter(|_| wanted) else {
            continue;
        };
        let wire = prop
            .spec
            .wire_value(value)
            .map_err(|source| SerializeError::Image {
                model: doc.describe(id),
                attr: prop.name.to_owned(),
                source,
            })?;
        let encoded = encoder.encode(wire.as_ref().unwrap_or(value))?;
        attributes.insert(prop.name.to_owned(), encoded);
    }
    Ok(json!({
        "type": instance.type_name(),
        "id": id.to_string(),
        "attributes": attributes,
    }))
}

/// Encodes one value, resolving container handles through `doc`.
pub fn encode_value(doc: &Document, value: &Value, options: &SerializerOptions) -> Result<Json, SerializeError> {
    Encoder::new(doc, options).encode(value)
}

// ── Encoder ───────────────────────────────────────────────────────────────

struct Encoder<'a> {
    doc: &'a Document,
    options: &'a SerializerOptions,
    visiting: Vec<ContainerId>,
}

impl<'a> Encoder<'a> {
    fn new(doc: &'a Document, options: &'a SerializerOptions) -> Self {
        Self {
            doc,
            options,
            visiting: Vec::new(),
        }
    }

    fn encode(&mut self, value: &Value) -> Result<Json, SerializeError> {
        Ok(match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => Json::from(*i),
            Value::Float(x) => encode_float(*x),
            Value::Str(s) => Json::String(s.clone()),
            Value::List(items) | Value::Tuple(items) => self.encode_items(items)?,
            Value::Map(entries) => {
                let mut pairs = Vec::with_capacity(entries.len());
                for (key, item) in entries {
                    pairs.push(json!([self.encode_key(key)?, self.encode(item)?]));
                }
                json!({ "type": "map", "entries": pairs })
            }
            Value::Set(keys) => {
                let mut items = Vec::with_capacity(keys.len());
                for key in keys {
                    items.push(self.encode_key(key)?);
                }
                json!({ "type": "set", "entries": items })
            }
            Value::Array(array) => self.encode_array(array),
            Value::Bytes(bytes) => bytes_envelope(bytes),
            Value::Path(path) => Json::String(path.display().to_string()),
            Value::Ref(id) => {
                let instance = self
                    .doc
                    .model(*id)
                    .ok_or(SerializeError::DanglingReference(*id))?;
                json!({ "id": id.to_string(), "type": instance.type_name() })
            }
            Value::Container(id) => self.encode_container(*id)?,
        })
    }

    fn encode_items(&mut self, items: &[Value]) -> Result<Json, SerializeError> {
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.encode(item)?);
        }
        Ok(Json::Array(out))
    }

    fn encode_key(&mut self, key: &Key) -> Result<Json, SerializeError> {
        self.encode(&key.to_value())
    }

    fn encode_container(&mut self, id: ContainerId) -> Result<Json, SerializeError> {
        let container = self
            .doc
            .containers()
            .get(id)
            .ok_or(SerializeError::MissingContainer(id))?;
        if self.visiting.contains(&id) {
            return Err(SerializeError::Cycle(id));
        }
        self.visiting.push(id);
        let encoded = match container.value() {
            ContainerValue::ColumnData(columns) => {
                let mut pairs = Vec::with_capacity(columns.len());
                for (name, column) in columns {
                    pairs.push(json!([name, self.encode(column)?]));
                }
                Ok(json!({ "type": "map", "entries": pairs }))
            }
            other => self.encode(&other.to_value()),
        };
        self.visiting.pop();
        encoded
    }

    fn encode_array(&self, array: &NdArray) -> Json {
        if !self.options.binary_arrays {
            return nested_list(array.data(), array.shape(), array.dtype().is_integer());
        }
        json!({
            "type": "ndarray",
            "array": bytes_envelope(&array.to_le_bytes()),
            "shape": array.shape(),
            "dtype": array.dtype().name(),
            "order": "little",
        })
    }
}

fn encode_float(x: f64) -> Json {
    if x.is_finite() {
        return Json::from(x);
    }
    let value = if x.is_nan() {
        "nan"
    } else if x > 0.0 {
        "+inf"
    } else {
        "-inf"
    };
    json!({ "type": "number", "value": value })
}

fn bytes_envelope(bytes: &[u8]) -> Json {
    json!({ "type": "bytes", "data": STANDARD.encode(bytes) })
}

fn nested_list(data: &[f64], shape: &[usize], integer: bool) -> Json {
    match shape {
        [] | [_] => Json::Array(
            data.iter()
                .map(|&x| if integer { Json::from(x as i64) } else { encode_float(x) })
                .collect(),
        ),
        [_, rest @ ..] => {
            let stride: usize = rest.iter().product();
            if stride == 0 {
                return Json::Array(Vec::new());
            }
            Json::Array(
                data.chunks(stride)
                    .map(|chunk| nested_list(chunk, rest, integer))
                    .collect(),
            )
        }
    }
}
