//! The format-neutral tree that both JSON and XML are read into and
//! written out from.

use std::fmt;

use serde::de::{self, Deserialize, Deserializer, MapAccess, SeqAccess, Visitor};
use serde::ser::{Serialize, SerializeMap, SerializeSeq, Serializer};

/// Key prefix under which XML attributes are stored in a `Mapping`.
pub const ATTR_PREFIX: &str = "-";
/// Reserved key holding element text when the element also has attributes
/// or child elements.
pub const TEXT_KEY: &str = "#text";

#[derive(Debug, Clone, PartialEq)]
pub enum StructuredValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    String(String),
    Mapping(Mapping),
    Sequence(Vec<StructuredValue>),
}

impl StructuredValue {
    pub fn as_mapping(&self) -> Option<&Mapping> {
        match self {
            StructuredValue::Mapping(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            StructuredValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Text form of a scalar, `None` for mappings and sequences. `Null`
    /// renders as the empty string.
    pub fn scalar_text(&self) -> Option<String> {
        match self {
            StructuredValue::Null => Some(String::new()),
            StructuredValue::Bool(b) => Some(b.to_string()),
            StructuredValue::Number(n) => Some(n.to_string()),
            StructuredValue::String(s) => Some(s.clone()),
            StructuredValue::Mapping(_) | StructuredValue::Sequence(_) => None,
        }
    }
}

impl From<&str> for StructuredValue {
    fn from(s: &str) -> Self {
        StructuredValue::String(s.to_owned())
    }
}

impl From<String> for StructuredValue {
    fn from(s: String) -> Self {
        StructuredValue::String(s)
    }
}

/// Insertion-ordered mapping with unique keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Mapping {
    entries: Vec<(String, StructuredValue)>,
}

impl Mapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&StructuredValue> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &StructuredValue)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Set `key` to `value`. An existing entry keeps its position and has its
    /// value replaced.
    pub fn insert(&mut self, key: impl Into<String>, value: StructuredValue) {
        let key = key.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => *slot = value,
            None => self.entries.push((key, value)),
        }
    }

    /// Add `value` under `key`, folding repeats into a `Sequence`. This is how
    /// repeated sibling elements become an array.
    pub fn append(&mut self, key: impl Into<String>, value: StructuredValue) {
        let key = key.into();
        let Some(idx) = self.entries.iter().position(|(k, _)| *k == key) else {
            self.entries.push((key, value));
            return;
        };
        match &mut self.entries[idx].1 {
            StructuredValue::Sequence(items) => items.push(value),
            existing => {
                let first = std::mem::replace(existing, StructuredValue::Null);
                *existing = StructuredValue::Sequence(vec![first, value]);
            }
        }
    }
}

impl Serialize for StructuredValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            StructuredValue::Null => serializer.serialize_unit(),
            StructuredValue::Bool(b) => serializer.serialize_bool(*b),
            StructuredValue::Number(n) => n.serialize(serializer),
            StructuredValue::String(s) => serializer.serialize_str(s),
            StructuredValue::Mapping(m) => {
                let mut map = serializer.serialize_map(Some(m.len()))?;
                for (k, v) in m.iter() {
                    map.serialize_entry(k, v)?;
                }
                map.end()
            }
            StructuredValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
        }
    }
}

struct ValueVisitor;

impl<'de> Visitor<'de> for ValueVisitor {
    type Value = StructuredValue;

    fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("any JSON value")
    }

    fn visit_unit<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(StructuredValue::Null)
    }

    fn visit_none<E: de::Error>(self) -> Result<Self::Value, E> {
        Ok(StructuredValue::Null)
    }

    fn visit_some<D: Deserializer<'de>>(self, d: D) -> Result<Self::Value, D::Error> {
        Deserialize::deserialize(d)
    }

    fn visit_bool<E: de::Error>(self, v: bool) -> Result<Self::Value, E> {
        Ok(StructuredValue::Bool(v))
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        Ok(StructuredValue::Number(v.into()))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        Ok(StructuredValue::Number(v.into()))
    }

    fn visit_f64<E: de::Error>(self, v: f64) -> Result<Self::Value, E> {
        serde_json::Number::from_f64(v)
            .map(StructuredValue::Number)
            .ok_or_else(|| E::custom("non-finite number"))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        Ok(StructuredValue::String(v.to_owned()))
    }

    fn visit_string<E: de::Error>(self, v: String) -> Result<Self::Value, E> {
        Ok(StructuredValue::String(v))
    }

    fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let mut items = Vec::with_capacity(seq.size_hint().unwrap_or(0));
        while let Some(item) = seq.next_element()? {
            items.push(item);
        }
        Ok(StructuredValue::Sequence(items))
    }

    fn visit_map<A: MapAccess<'de>>(self, mut access: A) -> Result<Self::Value, A::Error> {
        let mut map = Mapping::new();
        // Duplicate JSON keys: last one wins.
        while let Some((k, v)) = access.next_entry::<String, StructuredValue>()? {
            map.insert(k, v);
        }
        Ok(StructuredValue::Mapping(map))
    }
}

impl<'de> Deserialize<'de> for StructuredValue {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(ValueVisitor)
    }
}
