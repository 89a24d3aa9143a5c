//! The closed value model held by every model attribute.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};

use indexmap::{IndexMap, IndexSet};

use crate::error::ContainerError;

// ── Identifiers ────────────────────────────────────────────────────────────

static LAST_MODEL_ID: AtomicU64 = AtomicU64::new(1000);

/// Identity of a model instance, written on the wire as `p<digits>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModelId(u64);

impl ModelId {
    /// Allocates a fresh identifier, unique within the process.
    pub fn next() -> Self {
        Self(LAST_MODEL_ID.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Adopts an identifier produced elsewhere and advances the process
    /// counter past it, so later calls to [`ModelId::next`] never collide.
    pub fn adopt(raw: u64) -> Self {
        LAST_MODEL_ID.fetch_max(raw, Ordering::Relaxed);
        Self(raw)
    }

    /// Parses the wire form `p<digits>`, adopting the number on success.
    pub fn parse(text: &str) -> Option<Self> {
        let digits = text.strip_prefix('p')?;
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        digits.parse().ok().map(Self::adopt)
    }

    pub fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}", self.0)
    }
}

/// Slot of a [`PropertyContainer`](crate::PropertyContainer) inside a
/// [`ContainerArena`](crate::ContainerArena).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ContainerId(pub(crate) usize);

impl ContainerId {
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "c{}", self.0)
    }
}

// ── Keys ───────────────────────────────────────────────────────────────────

/// A float usable as a key: equality and hashing go through the bit pattern.
#[derive(Debug, Clone, Copy)]
pub struct FloatKey(pub f64);

impl PartialEq for FloatKey {
    fn eq(&self, other: &Self) -> bool {
        self.0.to_bits() == other.0.to_bits()
    }
}

impl Eq for FloatKey {}

impl Hash for FloatKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.to_bits().hash(state);
    }
}

/// The hashable subset of [`Value`]: mapping keys and set members.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    Null,
    Bool(bool),
    Int(i64),
    Float(FloatKey),
    Str(String),
    Tuple(Vec<Key>),
}

impl Key {
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(match value {
            Value::Null => Key::Null,
            Value::Bool(b) => Key::Bool(*b),
            Value::Int(i) => Key::Int(*i),
            Value::Float(f) => Key::Float(FloatKey(*f)),
            Value::Str(s) => Key::Str(s.clone()),
            Value::Tuple(items) => Key::Tuple(
                items
                    .iter()
                    .map(Key::from_value)
                    .collect::<Option<Vec<_>>>()?,
            ),
            _ => return None,
        })
    }

    pub fn to_value(&self) -> Value {
        match self {
            Key::Null => Value::Null,
            Key::Bool(b) => Value::Bool(*b),
            Key::Int(i) => Value::Int(*i),
            Key::Float(f) => Value::Float(f.0),
            Key::Str(s) => Value::Str(s.clone()),
            Key::Tuple(items) => Value::Tuple(items.iter().map(Key::to_value).collect()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn repr(&self) -> String {
        self.to_value().repr()
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.to_value(), f)
    }
}

impl From<&str> for Key {
    fn from(value: &str) -> Self {
        Key::Str(value.to_owned())
    }
}

impl From<String> for Key {
    fn from(value: String) -> Self {
        Key::Str(value)
    }
}

impl From<i64> for Key {
    fn from(value: i64) -> Self {
        Key::Int(value)
    }
}

impl From<f64> for Key {
    fn from(value: f64) -> Self {
        Key::Float(FloatKey(value))
    }
}

impl From<bool> for Key {
    fn from(value: bool) -> Self {
        Key::Bool(value)
    }
}

// ── Arrays ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DType {
    Uint8,
    Int32,
    Float32,
    Float64,
}

impl DType {
    pub fn name(self) -> &'static str {
        match self {
            DType::Uint8 => "uint8",
            DType::Int32 => "int32",
            DType::Float32 => "float32",
            DType::Float64 => "float64",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "uint8" => DType::Uint8,
            "int32" => DType::Int32,
            "float32" => DType::Float32,
            "float64" => DType::Float64,
            _ => return None,
        })
    }

    pub fn item_size(self) -> usize {
        match self {
            DType::Uint8 => 1,
            DType::Int32 | DType::Float32 => 4,
            DType::Float64 => 8,
        }
    }

    pub fn is_integer(self) -> bool {
        matches!(self, DType::Uint8 | DType::Int32)
    }

    /// Converts `x` to the nearest value representable in this dtype.
    pub fn cast(self, x: f64) -> f64 {
        match self {
            DType::Uint8 => x as u8 as f64,
            DType::Int32 => x as i32 as f64,
            DType::Float32 => x as f32 as f64,
            DType::Float64 => x,
        }
    }
}

/// Index into one axis of an [`NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisIndex {
    At(usize),
    Range(Slice),
}

/// A `start:stop:step` selection; missing bounds cover the whole axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Slice {
    pub start: Option<usize>,
    pub stop: Option<usize>,
    pub step: Option<usize>,
}

impl Slice {
    pub fn new(start: Option<usize>, stop: Option<usize>, step: Option<usize>) -> Self {
        Self { start, stop, step }
    }

    pub fn range(start: usize, stop: usize) -> Self {
        Self::new(Some(start), Some(stop), None)
    }

    /// Positions selected on an axis of length `len`.
    pub fn indices(&self, len: usize) -> Result<Vec<usize>, ContainerError> {
        let step = self.step.unwrap_or(1);
        if step == 0 {
            return Err(ContainerError::Usage("slice step cannot be zero".into()));
        }
        let stop = self.stop.unwrap_or(len).min(len);
        let start = self.start.unwrap_or(0).min(stop);
        Ok((start..stop).step_by(step).collect())
    }
}

/// Fixed-size numeric buffer. Elements are held as `f64` and narrowed to the
/// dtype on every write.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    dtype: DType,
    shape: Vec<usize>,
    data: Vec<f64>,
}

impl NdArray {
    pub fn new(dtype: DType, shape: Vec<usize>, data: Vec<f64>) -> Result<Self, ContainerError> {
        let expected = shape
            .iter()
            .try_fold(1usize, |acc, &dim| acc.checked_mul(dim))
            .ok_or_else(|| ContainerError::Usage(format!("shape {shape:?} is too large")))?;
        if expected != data.len() {
            return Err(ContainerError::Usage(format!(
                "shape {shape:?} needs {expected} elements, got {}",
                data.len()
            )));
        }
        let data = data.into_iter().map(|x| dtype.cast(x)).collect();
        Ok(Self { dtype, shape, data })
    }

    pub fn from_vec(dtype: DType, data: Vec<f64>) -> Self {
        let shape = vec![data.len()];
        let data = data.into_iter().map(|x| dtype.cast(x)).collect();
        Self { dtype, shape, data }
    }

    pub fn from_le_bytes(dtype: DType, shape: Vec<usize>, bytes: &[u8]) -> Result<Self, ContainerError> {
        let size = dtype.item_size();
        if bytes.len() % size != 0 {
            return Err(ContainerError::Usage(format!(
                "{} bytes is not a whole number of {} items",
                bytes.len(),
                dtype.name()
            )));
        }
        let data = bytes
            .chunks_exact(size)
            .map(|chunk| match dtype {
                DType::Uint8 => chunk[0] as f64,
                DType::Int32 => i32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64,
                DType::Float32 => {
                    f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) as f64
                }
                DType::Float64 => f64::from_le_bytes([
                    chunk[0], chunk[1], chunk[2], chunk[3], chunk[4], chunk[5], chunk[6], chunk[7],
                ]),
            })
            .collect();
        Self::new(dtype, shape, data)
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.data.len() * self.dtype.item_size());
        for &x in &self.data {
            match self.dtype {
                DType::Uint8 => out.push(x as u8),
                DType::Int32 => out.extend_from_slice(&(x as i32).to_le_bytes()),
                DType::Float32 => out.extend_from_slice(&(x as f32).to_le_bytes()),
                DType::Float64 => out.extend_from_slice(&x.to_le_bytes()),
            }
        }
        out
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn ndim(&self) -> usize {
        self.shape.len()
    }

    /// Length of the first axis.
    pub fn len(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn data(&self) -> &[f64] {
        &self.data
    }

    /// Appends to a 1-D array, keeping at most `rollover` trailing items.
    ///
    /// A buffer already at capacity is shifted in place instead of being
    /// reallocated.
    pub fn stream(&mut self, incoming: &[f64], rollover: Option<usize>) -> Result<(), ContainerError> {
        if self.ndim() != 1 {
            return Err(ContainerError::Usage(format!(
                "can only stream into 1-D arrays, got shape {:?}",
                self.shape
            )));
        }
        let n = incoming.len();
        let len = self.data.len();
        match rollover {
            Some(r) if r > 0 && len == r && n <= r => {
                self.data.copy_within(n.., 0);
                for (slot, &x) in self.data[len - n..].iter_mut().zip(incoming) {
                    *slot = self.dtype.cast(x);
                }
            }
            _ => {
                let dtype = self.dtype;
                self.data.extend(incoming.iter().map(|&x| dtype.cast(x)));
                if let Some(r) = rollover {
                    let excess = self.data.len().saturating_sub(r);
                    self.data.drain(..excess);
                }
            }
        }
        self.shape[0] = self.data.len();
        Ok(())
    }

    /// Writes `value` at every element selected by `index`, one part per
    /// leading axis. A scalar is broadcast; otherwise the flattened element
    /// count must match the selection.
    pub fn assign(&mut self, index: &[AxisIndex], value: &Value) -> Result<usize, ContainerError> {
        if index.len() > self.ndim() {
            return Err(ContainerError::Usage(format!(
                "too many indices for array of shape {:?}",
                self.shape
            )));
        }
        let mut strides = vec![1usize; self.ndim()];
        for axis in (0..self.ndim().saturating_sub(1)).rev() {
            strides[axis] = strides[axis + 1] * self.shape[axis + 1];
        }
        let mut offsets = vec![0usize];
        for (axis, &dim) in self.shape.iter().enumerate() {
            let picked = match index.get(axis) {
                Some(AxisIndex::At(i)) if *i < dim => vec![*i],
                Some(AxisIndex::At(i)) => {
                    return Err(ContainerError::IndexOutOfRange { index: *i, len: dim })
                }
                Some(AxisIndex::Range(slice)) => slice.indices(dim)?,
                None => (0..dim).collect(),
            };
            let stride = strides[axis];
            offsets = offsets
                .iter()
                .flat_map(|&base| picked.iter().map(move |&i| base + i * stride))
                .collect();
        }
        let values = match value.as_f64() {
            Some(x) => vec![x; offsets.len()],
            None => flatten_numbers(value).ok_or_else(|| {
                ContainerError::Usage(format!("cannot assign {} into a numeric array", value.repr()))
            })?,
        };
        if values.len() != offsets.len() {
            return Err(ContainerError::Usage(format!(
                "cannot assign {} values to a selection of {} elements",
                values.len(),
                offsets.len()
            )));
        }
        for (offset, x) in offsets.iter().zip(values) {
            self.data[*offset] = self.dtype.cast(x);
        }
        Ok(offsets.len())
    }
}

/// Flattens nested numeric lists and arrays, row-major.
pub(crate) fn flatten_numbers(value: &Value) -> Option<Vec<f64>> {
    fn walk(value: &Value, out: &mut Vec<f64>) -> bool {
        match value {
            Value::Int(_) | Value::Float(_) => {
                out.extend(value.as_f64());
                true
            }
            Value::List(items) | Value::Tuple(items) => items.iter().all(|v| walk(v, out)),
            Value::Array(array) => {
                out.extend_from_slice(array.data());
                true
            }
            _ => false,
        }
    }
    let mut out = Vec::new();
    walk(value, &mut out).then_some(out)
}

// ── Value ──────────────────────────────────────────────────────────────────

/// Everything an attribute can hold.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<Value>),
    Tuple(Vec<Value>),
    Map(IndexMap<Key, Value>),
    Set(IndexSet<Key>),
    Array(NdArray),
    Bytes(Vec<u8>),
    Path(PathBuf),
    Ref(ModelId),
    Container(ContainerId),
}

impl Value {
    /// Builds a `Map` from key/value pairs.
    pub fn map<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<Key>,
        V: Into<Value>,
    {
        Value::Map(entries.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }

    pub fn list<V: Into<Value>>(items: impl IntoIterator<Item = V>) -> Self {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn set<K: Into<Key>>(items: impl IntoIterator<Item = K>) -> Self {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Map(_) => "dict",
            Value::Set(_) => "set",
            Value::Array(_) => "ndarray",
            Value::Bytes(_) => "bytes",
            Value::Path(_) => "path",
            Value::Ref(_) => "model",
            Value::Container(_) => "container",
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of `Int` and `Float`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Items of a `List` or `Tuple`.
    pub fn as_items(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_ref_id(&self) -> Option<ModelId> {
        match self {
            Value::Ref(id) => Some(*id),
            _ => None,
        }
    }

    pub fn as_container(&self) -> Option<ContainerId> {
        match self {
            Value::Container(id) => Some(*id),
            _ => None,
        }
    }

    /// Row count of a column-shaped value (`List`, `Tuple` or `Array`).
    pub fn column_len(&self) -> Option<usize> {
        match self {
            Value::List(items) | Value::Tuple(items) => Some(items.len()),
            Value::Array(array) => Some(array.len()),
            _ => None,
        }
    }

    /// Textual form with strings single-quoted.
    pub fn repr(&self) -> String {
        match self {
            Value::Str(s) => format!("'{s}'"),
            _ => self.to_string(),
        }
    }
}

fn write_joined<'a, T: 'a>(
    f: &mut fmt::Formatter<'_>,
    items: impl IntoIterator<Item = &'a T>,
    each: impl Fn(&T) -> String,
) -> fmt::Result {
    for (i, item) in items.into_iter().enumerate() {
        if i > 0 {
            f.write_str(", ")?;
        }
        f.write_str(&each(item))?;
    }
    Ok(())
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => f.write_str("None"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x:?}"),
            Value::Str(s) => f.write_str(s),
            Value::List(items) => {
                f.write_str("[")?;
                write_joined(f, items, Value::repr)?;
                f.write_str("]")
            }
            Value::Tuple(items) => {
                f.write_str("(")?;
                write_joined(f, items, Value::repr)?;
                if items.len() == 1 {
                    f.write_str(",")?;
                }
                f.write_str(")")
            }
            Value::Map(entries) => {
                f.write_str("{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}: {}", k.repr(), v.repr())?;
                }
                f.write_str("}")
            }
            Value::Set(items) => {
                f.write_str("{")?;
                write_joined(f, items, Key::repr)?;
                f.write_str("}")
            }
            Value::Array(array) => {
                write!(f, "ndarray(dtype={}, shape={:?})", array.dtype().name(), array.shape())
            }
            Value::Bytes(bytes) => write!(f, "<{} bytes>", bytes.len()),
            Value::Path(path) => write!(f, "{}", path.display()),
            Value::Ref(id) => write!(f, "{id}"),
            Value::Container(id) => write!(f, "{id}"),
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Int(value.into())
    }
}

impl From<usize> for Value {
    fn from(value: usize) -> Self {
        Value::Int(value as i64)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value)
    }
}

impl From<Vec<Value>> for Value {
    fn from(value: Vec<Value>) -> Self {
        Value::List(value)
    }
}

impl From<Key> for Value {
    fn from(value: Key) -> Self {
        value.to_value()
    }
}

impl From<NdArray> for Value {
    fn from(value: NdArray) -> Self {
        Value::Array(value)
    }
}

impl From<PathBuf> for Value {
    fn from(value: PathBuf) -> Self {
        Value::Path(value)
    }
}

impl From<ModelId> for Value {
    fn from(value: ModelId) -> Self {
        Value::Ref(value)
    }
}

impl From<ContainerId> for Value {
    fn from(value: ContainerId) -> Self {
        Value::Container(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
