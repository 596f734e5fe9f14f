//! Value codec
//!
//! Converts host values to script values and back. Reading never fails
//! loudly: [`FromScript::from_script`] returns `None` on a mismatch so the
//! caller can report the argument position. Writing returns a
//! [`ScriptResult`] because it may allocate.
//!
//! Script values that are not reachable from a root may be reclaimed by the
//! next collection. Conversions that allocate several objects keep the
//! partial results on the VM stack until the outer value is built.

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::ops::Deref;
use std::rc::Rc;

use core_types::ScriptResult;
use interpreter::{IterStep, Pinned, StackGuard, Value, Vm};
use serde::{Serialize, Serializer};

/// Script-facing name of a host type
///
/// Used in TypeError messages and to check signature annotations.
pub trait ScriptType {
    /// Annotation text, e.g. `int` or `list[str]`
    fn type_name() -> String;
}

/// Host value that can be written into the VM
pub trait IntoScript: ScriptType {
    /// Convert, allocating on the VM heap if needed
    fn into_script(self, vm: &mut Vm) -> ScriptResult<Value>;
}

/// Host value that can be read out of the VM
pub trait FromScript: ScriptType + Sized {
    /// Convert, or `None` if `value` has the wrong shape
    fn from_script(vm: &mut Vm, value: &Value) -> Option<Self>;

    /// Convert the elements of a sequence
    ///
    /// Fails as a whole when any element fails; lossy types override this
    /// to drop the elements they cannot represent.
    fn from_script_elements(vm: &mut Vm, items: &[Value]) -> Option<Vec<Self>> {
        items.iter().map(|item| Self::from_script(vm, item)).collect()
    }
}

/// Mapping keys
pub trait ScriptKey: FromScript + IntoScript + Eq + Hash + Ord {}

impl ScriptKey for String {}
impl ScriptKey for i64 {}

macro_rules! script_type {
    ($name:expr => $($ty:ty),+) => {
        $(impl ScriptType for $ty {
            fn type_name() -> String {
                $name.to_string()
            }
        })+
    };
}

script_type!("bool" => bool);
script_type!("int" => i64, i32, u32, usize);
script_type!("float" => f64, f32);
script_type!("str" => String, &str);
script_type!("bytes" => ByteBuf);
script_type!("None" => ());
script_type!("object" => Value, Pinned);
script_type!("Any" => Dynamic);

// ============================================================================
// Scalars
// ============================================================================

impl IntoScript for bool {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::Bool(self))
    }
}

impl FromScript for bool {
    fn from_script(_vm: &mut Vm, value: &Value) -> Option<Self> {
        match value {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl IntoScript for i64 {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::Int(self))
    }
}

impl FromScript for i64 {
    fn from_script(_vm: &mut Vm, value: &Value) -> Option<Self> {
        match value {
            Value::Int(n) => Some(*n),
            _ => None,
        }
    }
}

macro_rules! narrow_int {
    ($($ty:ty),+) => {
        $(
            impl IntoScript for $ty {
                fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
                    i64::try_from(self)
                        .map(Value::Int)
                        .map_err(|_| core_types::ScriptError::value_error("integer overflow"))
                }
            }

            impl FromScript for $ty {
                fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
                    <$ty>::try_from(i64::from_script(vm, value)?).ok()
                }
            }
        )+
    };
}

narrow_int!(i32, u32, usize);

impl IntoScript for f64 {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::Float(self))
    }
}

impl FromScript for f64 {
    fn from_script(_vm: &mut Vm, value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            Value::Int(n) => Some(*n as f64),
            _ => None,
        }
    }
}

impl IntoScript for f32 {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::Float(f64::from(self)))
    }
}

impl FromScript for f32 {
    fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
        f64::from_script(vm, value).map(|f| f as f32)
    }
}

impl IntoScript for String {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::str(self))
    }
}

impl IntoScript for &str {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::str(self))
    }
}

impl FromScript for String {
    fn from_script(_vm: &mut Vm, value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl IntoScript for () {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::None)
    }
}

impl IntoScript for Value {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(self)
    }
}

impl FromScript for Value {
    fn from_script(_vm: &mut Vm, value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl IntoScript for Pinned {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(self.into_value())
    }
}

/// Keeps the argument alive after the native call returns
impl FromScript for Pinned {
    fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
        Some(vm.pin(value.clone()))
    }
}

/// Owned byte buffer, converted to and from script `bytes`
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize)]
pub struct ByteBuf(pub Vec<u8>);

impl Deref for ByteBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        &self.0
    }
}

impl From<Vec<u8>> for ByteBuf {
    fn from(bytes: Vec<u8>) -> Self {
        ByteBuf(bytes)
    }
}

impl IntoScript for ByteBuf {
    fn into_script(self, _vm: &mut Vm) -> ScriptResult<Value> {
        Ok(Value::Bytes(Rc::from(self.0)))
    }
}

impl FromScript for ByteBuf {
    fn from_script(_vm: &mut Vm, value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(b) => Some(ByteBuf(b.to_vec())),
            _ => None,
        }
    }
}

// ============================================================================
// Optionals and collections
// ============================================================================

impl<T: ScriptType> ScriptType for Option<T> {
    fn type_name() -> String {
        format!("Optional[{}]", T::type_name())
    }
}

impl<T: IntoScript> IntoScript for Option<T> {
    fn into_script(self, vm: &mut Vm) -> ScriptResult<Value> {
        match self {
            Some(inner) => inner.into_script(vm),
            None => Ok(Value::None),
        }
    }
}

/// `None` reads as `Some(None)`; an unconvertible value also reads as
/// `Some(None)` instead of failing
impl<T: FromScript> FromScript for Option<T> {
    fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
        if value.is_none() {
            return Some(None);
        }
        Some(T::from_script(vm, value))
    }
}

impl<T: ScriptType> ScriptType for Vec<T> {
    fn type_name() -> String {
        format!("list[{}]", T::type_name())
    }
}

impl<T: IntoScript> IntoScript for Vec<T> {
    fn into_script(self, vm: &mut Vm) -> ScriptResult<Value> {
        let guard = StackGuard::new(vm);
        let mut items = Vec::with_capacity(self.len());
        for item in self {
            match item.into_script(vm) {
                Ok(value) => {
                    vm.push(value.clone());
                    items.push(value);
                }
                Err(e) => {
                    guard.restore(vm);
                    return Err(e);
                }
            }
        }
        let list = vm.new_list(items);
        guard.restore(vm);
        Ok(list)
    }
}

impl<T: FromScript> FromScript for Vec<T> {
    fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
        let items = vm.list_items(value)?;
        T::from_script_elements(vm, &items)
    }
}

/// Read `(key, value)` pairs through the iteration protocol
///
/// Lists, strings and bytes are sequences, not mappings.
fn read_pairs(vm: &mut Vm, value: &Value) -> Option<Vec<(Value, Value)>> {
    match value {
        Value::Object(_) if vm.list_items(value).is_none() => {}
        _ => return None,
    }
    let guard = StackGuard::new(vm);
    let pairs = (|| {
        vm.push(value.clone());
        let iterator = vm.get_iter(value).ok()?;
        vm.push(iterator.clone());
        let mut pairs = Vec::new();
        loop {
            match vm.iter_next(&iterator).ok()? {
                IterStep::Item(key) => {
                    vm.push(key.clone());
                    let item = vm.get_item(value, &key).ok()?;
                    vm.push(item.clone());
                    pairs.push((key, item));
                }
                IterStep::Done(_) => break,
            }
        }
        Some(pairs)
    })();
    guard.restore(vm);
    pairs
}

impl<K: ScriptType, V: ScriptType> ScriptType for BTreeMap<K, V> {
    fn type_name() -> String {
        format!("dict[{}, {}]", K::type_name(), V::type_name())
    }
}

impl<K: ScriptType, V: ScriptType> ScriptType for HashMap<K, V> {
    fn type_name() -> String {
        format!("dict[{}, {}]", K::type_name(), V::type_name())
    }
}

macro_rules! mapping {
    ($map:ident) => {
        impl<K: ScriptKey, V: IntoScript> IntoScript for $map<K, V> {
            fn into_script(self, vm: &mut Vm) -> ScriptResult<Value> {
                let guard = StackGuard::new(vm);
                let result = (|| {
                    let mut pairs = Vec::with_capacity(self.len());
                    for (key, value) in self {
                        let key = key.into_script(vm)?;
                        vm.push(key.clone());
                        let value = value.into_script(vm)?;
                        vm.push(value.clone());
                        pairs.push((key, value));
                    }
                    vm.new_dict(pairs).map_err(|e| e.into_script_error())
                })();
                guard.restore(vm);
                result
            }
        }

        impl<K: ScriptKey, V: FromScript> FromScript for $map<K, V> {
            fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
                let pairs = read_pairs(vm, value)?;
                pairs
                    .iter()
                    .map(|(k, v)| Some((K::from_script(vm, k)?, V::from_script(vm, v)?)))
                    .collect()
            }
        }
    };
}

mapping!(BTreeMap);
mapping!(HashMap);

// ============================================================================
// Dynamic
// ============================================================================

/// Best-effort conversion of an arbitrary script value
///
/// Reading tries, in order: string, int, float, bool, sequence, mapping,
/// then bytes and object handles. `None` has no representation and is
/// dropped with a warning. Sequence elements and mapping values that cannot
/// be represented are dropped instead of failing the whole value; mapping
/// keys are strings or ints rendered as text.
///
/// Serializes untagged, so a `Dynamic` reads as plain JSON.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Dynamic {
    /// `str`
    Str(String),
    /// `int`
    Int(i64),
    /// `float`
    Float(f64),
    /// `bool`
    Bool(bool),
    /// `list`
    List(Vec<Dynamic>),
    /// `dict`
    Map(BTreeMap<String, Dynamic>),
    /// `bytes`
    Bytes(ByteBuf),
    /// Any other heap object, pinned while the `Dynamic` lives
    #[serde(serialize_with = "serialize_handle")]
    Object(Pinned),
}

fn serialize_handle<S: Serializer>(pin: &Pinned, serializer: S) -> Result<S::Ok, S::Error> {
    match pin.handle() {
        Some(handle) => serializer.serialize_str(&format!("<object #{}>", handle.index())),
        None => serializer.serialize_none(),
    }
}

impl Dynamic {
    fn read(vm: &mut Vm, value: &Value) -> Option<Dynamic> {
        if let Some(s) = String::from_script(vm, value) {
            return Some(Dynamic::Str(s));
        }
        if let Some(n) = i64::from_script(vm, value) {
            return Some(Dynamic::Int(n));
        }
        if let Some(f) = f64::from_script(vm, value) {
            return Some(Dynamic::Float(f));
        }
        if let Some(b) = bool::from_script(vm, value) {
            return Some(Dynamic::Bool(b));
        }
        if let Some(items) = vm.list_items(value) {
            return Some(Dynamic::List(Dynamic::read_all(vm, &items)));
        }
        if vm.dict_items(value).is_some() {
            if let Some(map) = Dynamic::read_map(vm, value) {
                return Some(Dynamic::Map(map));
            }
        }
        if let Some(bytes) = ByteBuf::from_script(vm, value) {
            return Some(Dynamic::Bytes(bytes));
        }
        if let Value::Object(_) = value {
            return Some(Dynamic::Object(vm.pin(value.clone())));
        }
        tracing::warn!(type_name = %vm.type_name(value), "dropping value with no dynamic representation");
        None
    }

    fn read_all(vm: &mut Vm, items: &[Value]) -> Vec<Dynamic> {
        items.iter().filter_map(|item| Dynamic::read(vm, item)).collect()
    }

    fn read_map(vm: &mut Vm, value: &Value) -> Option<BTreeMap<String, Dynamic>> {
        let pairs = read_pairs(vm, value)?;
        let mut map = BTreeMap::new();
        for (key, item) in &pairs {
            let key = match key {
                Value::Str(s) => s.to_string(),
                Value::Int(n) => n.to_string(),
                other => {
                    tracing::warn!(key = %vm.type_name(other), "dropping entry with non-string key");
                    continue;
                }
            };
            if let Some(item) = Dynamic::read(vm, item) {
                map.insert(key, item);
            }
        }
        Some(map)
    }

    /// Annotation-style name of the variant
    pub fn kind(&self) -> &'static str {
        match self {
            Dynamic::Str(_) => "str",
            Dynamic::Int(_) => "int",
            Dynamic::Float(_) => "float",
            Dynamic::Bool(_) => "bool",
            Dynamic::List(_) => "list",
            Dynamic::Map(_) => "dict",
            Dynamic::Bytes(_) => "bytes",
            Dynamic::Object(_) => "object",
        }
    }
}

impl FromScript for Dynamic {
    fn from_script(vm: &mut Vm, value: &Value) -> Option<Self> {
        Dynamic::read(vm, value)
    }

    fn from_script_elements(vm: &mut Vm, items: &[Value]) -> Option<Vec<Self>> {
        Some(Dynamic::read_all(vm, items))
    }
}

impl IntoScript for Dynamic {
    fn into_script(self, vm: &mut Vm) -> ScriptResult<Value> {
        match self {
            Dynamic::Str(s) => s.into_script(vm),
            Dynamic::Int(n) => Ok(Value::Int(n)),
            Dynamic::Float(f) => Ok(Value::Float(f)),
            Dynamic::Bool(b) => Ok(Value::Bool(b)),
            Dynamic::List(items) => items.into_script(vm),
            Dynamic::Map(map) => map.into_script(vm),
            Dynamic::Bytes(bytes) => bytes.into_script(vm),
            Dynamic::Object(pin) => Ok(pin.into_value()),
        }
    }
}
