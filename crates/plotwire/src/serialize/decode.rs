use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use indexmap::{IndexMap, IndexSet};
use plotwire_props::{ColumnMap, DType, Key, ModelId, NdArray, Value};
use serde_json::{Map, Value as Json};
use tracing::debug;

use crate::document::Document;
use crate::error::{DeserializeError, ReferenceError};
use crate::model::{self, ModelDef};

/// Rebuilds a document from its wire form. Model ids are kept, and the
/// process-wide id counter moves past them.
pub fn from_json(json: &Json) -> Result<Document, DeserializeError> {
    let top = json
        .as_object()
        .ok_or_else(|| malformed("a document must be a JSON object"))?;
    let records = top
        .get("models")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("missing \"models\" list"))?;
    let roots = top
        .get("roots")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("missing \"roots\" list"))?;

    let mut doc = Document::new();
    load_records(&mut doc, records)?;
    for root in roots {
        let text = root
            .as_str()
            .ok_or_else(|| malformed("root ids must be strings"))?;
        let id = resolve_id(&doc, text)?;
        doc.add_root(id)?;
    }
    debug!(models = doc.len(), roots = roots.len(), "document loaded");
    Ok(doc)
}

pub fn from_json_str(text: &str) -> Result<Document, DeserializeError> {
    from_json(&serde_json::from_str(text)?)
}

struct Record<'a> {
    id: ModelId,
    def: &'static ModelDef,
    attributes: Option<&'a Map<String, Json>>,
}

fn parse_record(json: &Json) -> Result<Record<'_>, DeserializeError> {
    let record = json
        .as_object()
        .ok_or_else(|| malformed("a model record must be a JSON object"))?;
    let type_name = record
        .get("type")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("model record without a \"type\""))?;
    let raw_id = record
        .get("id")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("model record without an \"id\""))?;
    let id = ModelId::parse(raw_id).ok_or_else(|| DeserializeError::MalformedId(raw_id.to_owned()))?;
    let attributes = match record.get("attributes") {
        None => None,
        Some(Json::Object(attributes)) => Some(attributes),
        Some(_) => return Err(malformed("\"attributes\" must be a JSON object")),
    };
    Ok(Record {
        id,
        def: model::lookup(type_name)?,
        attributes,
    })
}

/// Creates every record's instance first, then assigns attributes, so
/// references between the records resolve in any order. Records for
/// instances the document already holds are skipped. Returns the ids of all
/// records.
pub(crate) fn load_records(doc: &mut Document, records: &[Json]) -> Result<Vec<ModelId>, DeserializeError> {
    let records: Vec<Record<'_>> = records.iter().map(parse_record).collect::<Result<_, _>>()?;
    let mut seen = HashSet::new();
    let mut fresh = Vec::new();
    for record in &records {
        if !seen.insert(record.id) {
            return Err(DeserializeError::DuplicateId(record.id.to_string()));
        }
        if doc.contains(record.id) {
            continue;
        }
        let provided: Vec<&str> = record
            .attributes
            .map(|attributes| attributes.keys().map(String::as_str).collect())
            .unwrap_or_default();
        doc.instantiate(record.def, record.id, &provided)?;
        fresh.push(record);
    }
    for record in fresh {
        for (attr, json) in record.attributes.into_iter().flatten() {
            let value = decode_value(doc, json)?;
            doc.assign(record.id, attr, value)?;
        }
    }
    Ok(records.iter().map(|record| record.id).collect())
}

pub(crate) fn resolve_id(doc: &Document, text: &str) -> Result<ModelId, DeserializeError> {
    let id = ModelId::parse(text).ok_or_else(|| DeserializeError::MalformedId(text.to_owned()))?;
    if !doc.contains(id) {
        return Err(ReferenceError { id: text.to_owned() }.into());
    }
    Ok(id)
}

/// Decodes one wire value. Reference tokens must name instances `doc`
/// already holds.
pub fn decode_value(doc: &Document, json: &Json) -> Result<Value, DeserializeError> {
    Ok(match json {
        Json::Null => Value::Null,
        Json::Bool(b) => Value::Bool(*b),
        Json::Number(n) => match n.as_i64() {
            Some(i) => Value::Int(i),
            None => Value::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        Json::String(s) => Value::Str(s.clone()),
        Json::Array(items) => Value::List(
            items
                .iter()
                .map(|item| decode_value(doc, item))
                .collect::<Result<_, _>>()?,
        ),
        Json::Object(object) => decode_object(doc, object)?,
    })
}

fn decode_object(doc: &Document, object: &Map<String, Json>) -> Result<Value, DeserializeError> {
    match object.get("type").and_then(Json::as_str) {
        Some("map") => {
            let mut entries = IndexMap::new();
            for pair in envelope_entries(object)? {
                let [key, value] = pair.as_array().map(Vec::as_slice).unwrap_or_default() else {
                    return Err(malformed("map entries must be [key, value] pairs"));
                };
                entries.insert(decode_key(doc, key)?, decode_value(doc, value)?);
            }
            Ok(Value::Map(entries))
        }
        Some("set") => {
            let mut keys = IndexSet::new();
            for item in envelope_entries(object)? {
                keys.insert(decode_key(doc, item)?);
            }
            Ok(Value::Set(keys))
        }
        Some("ndarray") => decode_ndarray(doc, object).map(Value::Array),
        Some("bytes") => decode_bytes(object).map(Value::Bytes),
        Some("number") => match object.get("value").and_then(Json::as_str) {
            Some("nan") => Ok(Value::Float(f64::NAN)),
            Some("+inf") => Ok(Value::Float(f64::INFINITY)),
            Some("-inf") => Ok(Value::Float(f64::NEG_INFINITY)),
            _ => Err(malformed("number envelope must hold nan, +inf or -inf")),
        },
        _ => match object.get("id").and_then(Json::as_str) {
            Some(id) if object.len() <= 2 && !object.contains_key("attributes") => {
                resolve_id(doc, id).map(Value::Ref)
            }
            _ => {
                let mut entries = IndexMap::new();
                for (key, value) in object {
                    entries.insert(Key::Str(key.clone()), decode_value(doc, value)?);
                }
                Ok(Value::Map(entries))
            }
        },
    }
}

fn envelope_entries(object: &Map<String, Json>) -> Result<&[Json], DeserializeError> {
    match object.get("entries") {
        None => Ok(&[]),
        Some(Json::Array(entries)) => Ok(entries),
        Some(_) => Err(malformed("\"entries\" must be a list")),
    }
}

fn decode_key(doc: &Document, json: &Json) -> Result<Key, DeserializeError> {
    let value = decode_value(doc, json)?;
    Key::from_value(&value).ok_or_else(|| malformed(format!("{} cannot be a key", value.type_name())))
}

fn decode_bytes(object: &Map<String, Json>) -> Result<Vec<u8>, DeserializeError> {
    let data = object
        .get("data")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("bytes envelope without \"data\""))?;
    STANDARD
        .decode(data)
        .map_err(|err| malformed(format!("invalid base64 payload: {err}")))
}

fn decode_ndarray(doc: &Document, object: &Map<String, Json>) -> Result<NdArray, DeserializeError> {
    let dtype_name = object
        .get("dtype")
        .and_then(Json::as_str)
        .ok_or_else(|| malformed("ndarray envelope without \"dtype\""))?;
    let dtype = DType::from_name(dtype_name).ok_or_else(|| malformed(format!("unsupported dtype {dtype_name}")))?;
    let shape = object
        .get("shape")
        .and_then(Json::as_array)
        .ok_or_else(|| malformed("ndarray envelope without \"shape\""))?
        .iter()
        .map(|dim| dim.as_u64().map(|dim| dim as usize))
        .collect::<Option<Vec<usize>>>()
        .ok_or_else(|| malformed("ndarray shape must be a list of sizes"))?;
    if object.get("order").and_then(Json::as_str).is_some_and(|order| order != "little") {
        return Err(malformed("only little-endian arrays are supported"));
    }
    let array = match object.get("array") {
        Some(Json::Object(inner)) => NdArray::from_le_bytes(dtype, shape, &decode_bytes(inner)?)?,
        Some(Json::Array(items)) => {
            let mut data = Vec::with_capacity(items.len());
            for item in items {
                match decode_value(doc, item)?.as_f64() {
                    Some(x) => data.push(x),
                    None => return Err(malformed("ndarray items must be numbers")),
                }
            }
            NdArray::new(dtype, shape, data)?
        }
        _ => return Err(malformed("ndarray envelope without \"array\"")),
    };
    Ok(array)
}

/// A map of column name to column values.
pub(crate) fn decode_columns(doc: &Document, json: &Json) -> Result<ColumnMap, DeserializeError> {
    let Value::Map(entries) = decode_value(doc, json)? else {
        return Err(malformed("column data must be a map"));
    };
    entries
        .into_iter()
        .map(|(key, column)| match key {
            Key::Str(name) => Ok((name, column)),
            other => Err(malformed(format!("column names must be strings, got {}", other.repr()))),
        })
        .collect()
}

fn malformed(message: impl Into<String>) -> DeserializeError {
    DeserializeError::Malformed(message.into())
}
