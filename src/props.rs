// src/props.rs

//! Property bags passed between starters, jobs and activations.
//!
//! A [`Props`] is an ordered map with case-insensitive keys. Values are
//! plain data ([`PropValue`]) plus an opaque `Arc<dyn Any>` escape hatch
//! used to hand runtime objects (e.g. a predecessor's completion) through
//! an activation without the receiving side knowing the concrete type up
//! front.
//!
//! Merging follows a fixed precedence: template properties < instance
//! properties < per-activation run properties; later values override
//! earlier ones for identical (case-insensitive) keys.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::de::{Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Prefix marking template properties that get copied (prefix stripped)
/// into the run properties of every activation.
pub const RUN_PROP_PREFIX: &str = "RUN-PROP-";

/// Opaque runtime value carried through a property bag.
pub type OpaqueValue = Arc<dyn Any + Send + Sync>;

/// A single property value.
#[derive(Clone)]
pub enum PropValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    List(Vec<PropValue>),
    Map(Props),
    /// Runtime object; compared by pointer identity, serialized as a marker.
    Obj(OpaqueValue),
}

impl PropValue {
    /// String view of the value, without coercion.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Boolean view with lenient coercion (`"true"` / `"false"` strings and
    /// non-zero integers count), mirroring the tolerant config readers of
    /// the property dictionary this is modeled on.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Bool(b) => Some(*b),
            PropValue::Int(i) => Some(*i != 0),
            PropValue::Str(s) => s.trim().parse::<bool>().ok(),
            _ => None,
        }
    }

    /// Integer view with lenient coercion (numeric strings parse).
    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropValue::Int(i) => Some(*i),
            PropValue::Float(f) => Some(*f as i64),
            PropValue::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Nested map view.
    pub fn as_map(&self) -> Option<&Props> {
        match self {
            PropValue::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Downcast an opaque value to a concrete type.
    pub fn downcast_obj<T: Any + Send + Sync>(&self) -> Option<Arc<T>> {
        match self {
            PropValue::Obj(o) => Arc::clone(o).downcast::<T>().ok(),
            _ => None,
        }
    }
}

impl fmt::Debug for PropValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropValue::Bool(b) => write!(f, "{b}"),
            PropValue::Int(i) => write!(f, "{i}"),
            PropValue::Float(x) => write!(f, "{x}"),
            PropValue::Str(s) => write!(f, "{s:?}"),
            PropValue::List(l) => f.debug_list().entries(l).finish(),
            PropValue::Map(m) => m.fmt(f),
            PropValue::Obj(_) => write!(f, "<opaque>"),
        }
    }
}

impl PartialEq for PropValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PropValue::Bool(a), PropValue::Bool(b)) => a == b,
            (PropValue::Int(a), PropValue::Int(b)) => a == b,
            (PropValue::Float(a), PropValue::Float(b)) => a == b,
            (PropValue::Str(a), PropValue::Str(b)) => a == b,
            (PropValue::List(a), PropValue::List(b)) => a == b,
            (PropValue::Map(a), PropValue::Map(b)) => a == b,
            (PropValue::Obj(a), PropValue::Obj(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl From<bool> for PropValue {
    fn from(v: bool) -> Self {
        PropValue::Bool(v)
    }
}
impl From<i64> for PropValue {
    fn from(v: i64) -> Self {
        PropValue::Int(v)
    }
}
impl From<i32> for PropValue {
    fn from(v: i32) -> Self {
        PropValue::Int(v as i64)
    }
}
impl From<f64> for PropValue {
    fn from(v: f64) -> Self {
        PropValue::Float(v)
    }
}
impl From<&str> for PropValue {
    fn from(v: &str) -> Self {
        PropValue::Str(v.to_string())
    }
}
impl From<String> for PropValue {
    fn from(v: String) -> Self {
        PropValue::Str(v)
    }
}
impl From<Props> for PropValue {
    fn from(v: Props) -> Self {
        PropValue::Map(v)
    }
}

impl Serialize for PropValue {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        match self {
            PropValue::Bool(b) => ser.serialize_bool(*b),
            PropValue::Int(i) => ser.serialize_i64(*i),
            PropValue::Float(x) => ser.serialize_f64(*x),
            PropValue::Str(s) => ser.serialize_str(s),
            PropValue::List(l) => {
                let mut seq = ser.serialize_seq(Some(l.len()))?;
                for v in l {
                    seq.serialize_element(v)?;
                }
                seq.end()
            }
            PropValue::Map(m) => m.serialize(ser),
            PropValue::Obj(_) => ser.serialize_str("<opaque>"),
        }
    }
}

/// Stored entry: original-case key plus value, indexed by lowercased key.
#[derive(Clone, Debug, PartialEq)]
struct Entry {
    key: String,
    value: PropValue,
}

/// Ordered, case-insensitive property map.
#[derive(Clone, Default, PartialEq)]
pub struct Props {
    entries: BTreeMap<String, Entry>,
}

impl Props {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Look up a value by case-insensitive key.
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.entries.get(&key.to_lowercase()).map(|e| &e.value)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(&key.to_lowercase())
    }

    /// Insert or replace a value; the key keeps the caller's casing.
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<PropValue>) {
        let key = key.into();
        let lower = key.to_lowercase();
        self.entries.insert(
            lower,
            Entry {
                key,
                value: value.into(),
            },
        );
    }

    pub fn remove(&mut self, key: &str) -> Option<PropValue> {
        self.entries.remove(&key.to_lowercase()).map(|e| e.value)
    }

    /// Iterate entries as (original key, value).
    pub fn iter(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.entries.values().map(|e| (e.key.as_str(), &e.value))
    }

    /// Builder-style insertion, handy in tests and configurators.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<PropValue>) -> Self {
        self.set(key, value);
        self
    }

    /// Overlay `over` into `self`; values from `over` win on identical keys.
    pub fn apply(&mut self, over: &Props) {
        for (key, value) in over.iter() {
            self.set(key.to_string(), value.clone());
        }
    }

    /// Precedence merge: a copy of `base` with `over` applied on top.
    pub fn overlaid(base: &Props, over: &Props) -> Props {
        let mut merged = base.clone();
        merged.apply(over);
        merged
    }

    /// String property, or `default` if missing or not a string.
    pub fn get_str<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.get(key).and_then(PropValue::as_str).unwrap_or(default)
    }

    /// Boolean property with coercion, or `default`.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(PropValue::as_bool).unwrap_or(default)
    }

    /// Integer property with coercion, or `default`.
    pub fn get_int(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(PropValue::as_int).unwrap_or(default)
    }

    /// Copy every `RUN-PROP-`-prefixed property of `template` into `self`
    /// with the prefix stripped. Copied values overwrite existing ones,
    /// matching how starter templates seed run properties.
    pub fn copy_run_props(&mut self, template: &Props) {
        for (key, value) in template.iter() {
            if key.len() > RUN_PROP_PREFIX.len()
                && key[..RUN_PROP_PREFIX.len()].eq_ignore_ascii_case(RUN_PROP_PREFIX)
            {
                self.set(key[RUN_PROP_PREFIX.len()..].to_string(), value.clone());
            }
        }
    }

    /// Resolve a dotted key path (`"a.b.c"`) through nested maps.
    ///
    /// Resolution stops at the first segment whose value is not a nested
    /// map; the value found there is returned only if it was the final
    /// segment reachable (mirroring lenient nested lookup: `"a.b"` against
    /// `{a: 1}` returns `1`).
    pub fn resolve_path(&self, path: &str) -> Option<&PropValue> {
        let mut current = self;
        let mut segments = path.split('.').peekable();
        while let Some(seg) = segments.next() {
            let value = current.get(seg)?;
            match value.as_map() {
                Some(map) if segments.peek().is_some() => current = map,
                _ => return Some(value),
            }
        }
        None
    }

    /// Set a value at a dotted key path, creating intermediate maps as
    /// needed. Returns `false` when an intermediate segment exists but is
    /// not a map.
    pub fn set_path(&mut self, path: &str, value: impl Into<PropValue>) -> bool {
        let segments: Vec<&str> = path.split('.').collect();
        let mut current = self;
        for (i, seg) in segments.iter().enumerate() {
            if i + 1 == segments.len() {
                current.set(seg.to_string(), value.into());
                return true;
            }
            if !current.contains_key(seg) {
                current.set(seg.to_string(), Props::new());
            }
            let lower = seg.to_lowercase();
            match current.entries.get_mut(&lower).map(|e| &mut e.value) {
                Some(PropValue::Map(map)) => current = map,
                _ => return false,
            }
        }
        false
    }

    /// Resolve a property specifier.
    ///
    /// A specifier enclosed in brackets (`"[a.b]"`) is resolved as a dotted
    /// path through this bag; anything else (or a path that does not
    /// resolve) yields the specifier itself as a string value.
    pub fn resolved(&self, spec: &str) -> PropValue {
        if spec.len() >= 3 && spec.starts_with('[') && spec.ends_with(']') {
            if let Some(v) = self.resolve_path(&spec[1..spec.len() - 1]) {
                return v.clone();
            }
        }
        PropValue::Str(spec.to_string())
    }

    /// True when every entry of `other` is present in `self` with an equal
    /// value, comparing keys case-insensitively.
    pub fn is_superset_of(&self, other: &Props) -> bool {
        other.iter().all(|(key, value)| self.get(key) == Some(value))
    }
}

impl fmt::Debug for Props {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.iter().map(|(k, v)| (k, v)))
            .finish()
    }
}

impl FromIterator<(String, PropValue)> for Props {
    fn from_iter<I: IntoIterator<Item = (String, PropValue)>>(iter: I) -> Self {
        let mut props = Props::new();
        for (k, v) in iter {
            props.set(k, v);
        }
        props
    }
}

struct PropValueVisitor;

impl<'de> Visitor<'de> for PropValueVisitor {
    type Value = PropValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("a boolean, number, string, array or table")
    }

    fn visit_bool<E>(self, v: bool) -> Result<PropValue, E> {
        Ok(PropValue::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<PropValue, E> {
        Ok(PropValue::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<PropValue, E> {
        Ok(PropValue::Int(v as i64))
    }

    fn visit_f64<E>(self, v: f64) -> Result<PropValue, E> {
        Ok(PropValue::Float(v))
    }

    fn visit_str<E>(self, v: &str) -> Result<PropValue, E> {
        Ok(PropValue::Str(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<PropValue, E> {
        Ok(PropValue::Str(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<PropValue, A::Error> {
        let mut list = Vec::new();
        while let Some(v) = seq.next_element()? {
            list.push(v);
        }
        Ok(PropValue::List(list))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<PropValue, A::Error> {
        let mut props = Props::new();
        while let Some((key, value)) = map.next_entry::<String, PropValue>()? {
            props.set(key, value);
        }
        Ok(PropValue::Map(props))
    }
}

impl<'de> Deserialize<'de> for PropValue {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        de.deserialize_any(PropValueVisitor)
    }
}

impl<'de> Deserialize<'de> for Props {
    fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
        match PropValue::deserialize(de)? {
            PropValue::Map(props) => Ok(props),
            other => Err(serde::de::Error::custom(format!(
                "expected a table of properties, got {other:?}"
            ))),
        }
    }
}

impl Serialize for Props {
    fn serialize<S: Serializer>(&self, ser: S) -> Result<S::Ok, S::Error> {
        let mut map = ser.serialize_map(Some(self.len()))?;
        for (key, value) in self.iter() {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}
