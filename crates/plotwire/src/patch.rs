//! Incremental updates: one change event on the wire.
//!
//! A plain assignment carries the full new value plus the records of every
//! instance reachable from it. Streamed, patched and column-replaced table
//! updates carry only their partial payload and a `hint` naming the
//! operation, so a receiver replays the same container operation.

use plotwire_props::{AxisIndex, Hint, ModelId, PatchIndex, PatchSet, Slice, Value};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value as Json};
use tracing::debug;

use crate::document::Document;
use crate::error::{DeserializeError, SerializeError};
use crate::events::ChangeEvent;
use crate::graph::{collect_models, references_of};
use crate::serialize::{
    decode_columns, decode_value, encode_value, load_records, model_record, resolve_id,
    SerializerOptions,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatchMessage {
    pub id: String,
    pub attr: String,
    pub new: Json,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<PatchHint>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub references: Vec<Json>,
}

/// `{"kind": "streamed" | "patched" | "column_data_changed", ...}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum PatchHint {
    #[serde(rename = "column_data_changed")]
    ColumnDataChanged { cols: Vec<String> },
    #[serde(rename = "streamed")]
    ColumnsStreamed {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        setter: Option<String>,
        rollover: Option<usize>,
    },
    #[serde(rename = "patched")]
    ColumnsPatched {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        setter: Option<String>,
    },
}

impl PatchHint {
    pub fn setter(&self) -> Option<&str> {
        match self {
            PatchHint::ColumnDataChanged { .. } => None,
            PatchHint::ColumnsStreamed { setter, .. } | PatchHint::ColumnsPatched { setter } => {
                setter.as_deref()
            }
        }
    }
}

impl PatchMessage {
    /// Encodes `event` against the current state of `doc`.
    pub fn from_event(
        doc: &Document,
        event: &ChangeEvent,
        options: &SerializerOptions,
    ) -> Result<Self, SerializeError> {
        let (new, hint) = match &event.hint {
            None => (encode_value(doc, &event.new, options)?, None),
            Some(Hint::ColumnDataChanged { cols }) => {
                let current = doc.resolved(event.model, &event.attr)?;
                let changed = match current {
                    Value::Map(entries) => Value::Map(
                        entries
                            .into_iter()
                            .filter(|(key, _)| key.as_str().is_some_and(|name| cols.iter().any(|c| c == name)))
                            .collect(),
                    ),
                    other => other,
                };
                (
                    encode_value(doc, &changed, options)?,
                    Some(PatchHint::ColumnDataChanged { cols: cols.clone() }),
                )
            }
            Some(Hint::ColumnsStreamed {
                setter,
                rollover,
                data,
            }) => {
                let data = Value::map(data.iter().map(|(name, column)| (name.as_str(), column.clone())));
                let hint = PatchHint::ColumnsStreamed {
                    setter: setter.clone(),
                    rollover: *rollover,
                };
                (encode_value(doc, &data, options)?, Some(hint))
            }
            Some(Hint::ColumnsPatched { setter, patches }) => {
                let hint = PatchHint::ColumnsPatched {
                    setter: setter.clone(),
                };
                (encode_patches(doc, patches, options)?, Some(hint))
            }
        };

        let mut references = Vec::new();
        if hint.is_none() {
            let direct = references_of(doc, &event.new);
            for id in collect_models(doc, &direct).ids() {
                references.push(model_record(doc, *id, options)?);
            }
        }
        Ok(Self {
            id: event.model.to_string(),
            attr: event.attr.clone(),
            new,
            hint,
            references,
        })
    }
}

impl Document {
    /// Applies a message produced by [`PatchMessage::from_event`] on another
    /// document. Unknown referenced instances are created first. `setter`
    /// falls back to the one the hint carries.
    pub fn apply_patch(&mut self, message: &PatchMessage, setter: Option<&str>) -> Result<(), DeserializeError> {
        load_records(self, &message.references)?;
        let id = resolve_id(self, &message.id)?;
        let setter = setter.or_else(|| message.hint.as_ref().and_then(PatchHint::setter));
        match &message.hint {
            None => {
                let value = decode_value(self, &message.new)?;
                self.set_with_setter(id, &message.attr, value, setter)?;
            }
            Some(PatchHint::ColumnDataChanged { .. }) => {
                let data = decode_columns(self, &message.new)?;
                self.columns_mut(id, &message.attr)?.update(data)?;
            }
            Some(PatchHint::ColumnsStreamed { rollover, .. }) => {
                let data = decode_columns(self, &message.new)?;
                self.stream(id, &message.attr, data, *rollover, setter)?;
            }
            Some(PatchHint::ColumnsPatched { .. }) => {
                let patches = decode_patches(self, &message.new)?;
                self.patch(id, &message.attr, patches, setter)?;
            }
        }
        debug!(model = %id, attr = %message.attr, "patch applied");
        Ok(())
    }
}

// ── Patch payloads ────────────────────────────────────────────────────────
//
// `{column: [[index, value], ...]}` where an index is a row number, a slice
// object `{"start", "stop", "step"}`, or `[row, axis, ...]` for positions
// inside an array cell.

fn encode_patches(doc: &Document, patches: &PatchSet, options: &SerializerOptions) -> Result<Json, SerializeError> {
    let mut out = Map::new();
    for (column, edits) in patches {
        let mut encoded = Vec::with_capacity(edits.len());
        for (index, value) in edits {
            encoded.push(json!([encode_index(index), encode_value(doc, value, options)?]));
        }
        out.insert(column.clone(), Json::Array(encoded));
    }
    Ok(Json::Object(out))
}

fn encode_index(index: &PatchIndex) -> Json {
    match index {
        PatchIndex::Row(row) => json!(row),
        PatchIndex::Rows(slice) => encode_slice(slice),
        PatchIndex::Nested(row, axes) => {
            let mut parts = vec![json!(row)];
            parts.extend(axes.iter().map(|axis| match axis {
                AxisIndex::At(i) => json!(i),
                AxisIndex::Range(slice) => encode_slice(slice),
            }));
            Json::Array(parts)
        }
    }
}

fn encode_slice(slice: &Slice) -> Json {
    json!({ "start": slice.start, "stop": slice.stop, "step": slice.step })
}

fn decode_patches(doc: &Document, json: &Json) -> Result<PatchSet, DeserializeError> {
    let columns = json
        .as_object()
        .ok_or_else(|| malformed("patches must be a JSON object"))?;
    let mut patches = PatchSet::new();
    for (column, edits) in columns {
        let edits = edits
            .as_array()
            .ok_or_else(|| malformed("column patches must be a list"))?;
        let mut decoded = Vec::with_capacity(edits.len());
        for edit in edits {
            let [index, value] = edit.as_array().map(Vec::as_slice).unwrap_or_default() else {
                return Err(malformed("a patch must be an [index, value] pair"));
            };
            decoded.push((decode_index(index)?, decode_value(doc, value)?));
        }
        patches.insert(column.clone(), decoded);
    }
    Ok(patches)
}

fn decode_index(json: &Json) -> Result<PatchIndex, DeserializeError> {
    match json {
        Json::Number(_) => Ok(PatchIndex::Row(decode_position(json)?)),
        Json::Object(_) => Ok(PatchIndex::Rows(decode_slice(json)?)),
        Json::Array(parts) => {
            let (row, axes) = parts
                .split_first()
                .ok_or_else(|| malformed("a nested patch index needs a row"))?;
            let axes = axes
                .iter()
                .map(|axis| match axis {
                    Json::Object(_) => decode_slice(axis).map(AxisIndex::Range),
                    _ => decode_position(axis).map(AxisIndex::At),
                })
                .collect::<Result<_, _>>()?;
            Ok(PatchIndex::Nested(decode_position(row)?, axes))
        }
        _ => Err(malformed(format!("invalid patch index {json}"))),
    }
}

fn decode_position(json: &Json) -> Result<usize, DeserializeError> {
    json.as_u64()
        .map(|n| n as usize)
        .ok_or_else(|| malformed(format!("invalid index {json}")))
}

fn decode_slice(json: &Json) -> Result<Slice, DeserializeError> {
    let bound = |name: &str| -> Result<Option<usize>, DeserializeError> {
        match json.get(name) {
            None | Some(Json::Null) => Ok(None),
            Some(value) => decode_position(value).map(Some),
        }
    };
    Ok(Slice::new(bound("start")?, bound("stop")?, bound("step")?))
}

fn malformed(message: impl Into<String>) -> DeserializeError {
    DeserializeError::Malformed(message.into())
}

/// Encodes and clears every event recorded by `doc` since the last drain.
pub fn drain_patches(doc: &mut Document, options: &SerializerOptions) -> Result<Vec<PatchMessage>, SerializeError> {
    let events = doc.take_events();
    events
        .iter()
        .map(|event| PatchMessage::from_event(doc, event, options))
        .collect()
}
