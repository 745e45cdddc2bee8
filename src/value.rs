//! The canonical attribute value sum and the dotted-path key it is paired
//! with (§3 DATA MODEL — `Value`, `KV`).

use chrono::{DateTime, Utc};
use std::time::Duration;

/// A typed attribute value. Immutable once constructed.
///
/// Carrying a real sum type instead of a duck-typed map is what lets
/// downstream sinks pick their own representation — a timestamp extracted
/// by the JSON walker is still a timestamp by the time the pretty-printer
/// renders it, not a string that has to be re-sniffed.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Duration(Duration),
    Null,
    Array(Vec<Value>),
    Object(Vec<(String, Value)>),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Render the value the way [`crate::sink::pretty::PrettyPrinter`] does:
    /// strings verbatim, numbers/bools in their natural textual form,
    /// timestamps as RFC 3339 nanos, durations as `1h2m3s`, and
    /// objects/arrays as compact JSON.
    pub fn render(&self) -> String {
        match self {
            Value::String(s) => s.clone(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => format_general_float(*f),
            Value::Bool(b) => b.to_string(),
            Value::Timestamp(t) => t.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true),
            Value::Duration(d) => crate::time_parser::format_go_duration(*d),
            Value::Null => "null".to_string(),
            Value::Array(_) | Value::Object(_) => {
                serde_json::to_string(&self.to_json()).unwrap_or_default()
            }
        }
    }

    fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::Number((*i).into()),
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Timestamp(t) => {
                serde_json::Value::String(t.to_rfc3339_opts(chrono::SecondsFormat::Nanos, true))
            }
            Value::Duration(d) => serde_json::Value::String(crate::time_parser::format_go_duration(*d)),
            Value::Null => serde_json::Value::Null,
            Value::Array(items) => serde_json::Value::Array(items.iter().map(Value::to_json).collect()),
            Value::Object(pairs) => serde_json::Value::Object(
                pairs.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        }
    }
}

/// `%g`-style general float formatting: shortest round-trippable form,
/// integral floats rendered without a trailing `.0`.
fn format_general_float(f: f64) -> String {
    if f.is_finite() && f == f.trunc() && f.abs() < 1e15 {
        format!("{}", f as i64)
    } else {
        format!("{}", f)
    }
}

/// A single (dotted key path, value) pair as emitted by a parser.
///
/// Duplicate keys at the same level are legal and preserved in emission
/// order — the model does not deduplicate.
#[derive(Debug, Clone, PartialEq)]
pub struct Kv {
    pub key: String,
    pub value: Value,
}

impl Kv {
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self { key: key.into(), value }
    }
}

/// A dotted field path such as `a.b.c`, matched component-by-component
/// against an observed key path (§4.1 FieldPath matcher).
///
/// Array indices are rendered as decimal-string components (`peers.0.id`),
/// so matching an observed path against a configured path is exact
/// string-equality of components — no wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    components: Vec<String>,
}

impl FieldPath {
    pub fn parse(dotted: &str) -> Self {
        Self {
            components: dotted.split('.').map(str::to_string).collect(),
        }
    }

    pub fn matches_components(&self, observed: &[String]) -> bool {
        self.components.as_slice() == observed
    }

    pub fn as_dotted(&self) -> String {
        self.components.join(".")
    }
}

/// Join a prefix path and a leaf key into a dotted string, the representation
/// used both for matching against [`FieldPath`] and as the final `Kv::key`.
pub fn join_path(prefix: &[String], leaf: &str) -> String {
    if prefix.is_empty() {
        leaf.to_string()
    } else {
        let mut s = prefix.join(".");
        s.push('.');
        s.push_str(leaf);
        s
    }
}

/// Parse a JSON document into a [`Value`], preserving key order and
/// duplicate keys at every nesting level.
///
/// `serde_json::Value` collapses duplicates and (without the
/// `preserve_order` feature) sorts object keys alphabetically, so it cannot
/// be used as the intermediate representation here: the JSON attribute
/// walker depends on encounter order to decide which field wins a
/// move-to-front match. This deserializes straight from the byte stream
/// into our own tree via a manual [`serde::de::Visitor`].
pub fn parse_json_object(bytes: &[u8]) -> Option<Vec<(String, Value)>> {
    let mut de = serde_json::Deserializer::from_slice(bytes);
    let value: Value = serde::de::Deserialize::deserialize(&mut de).ok()?;
    de.end().ok()?;
    match value {
        Value::Object(pairs) => Some(pairs),
        _ => None,
    }
}

struct ValueVisitor;

impl<'de> serde::de::Visitor<'de> for ValueVisitor {
    type Value = Value;

    fn expecting(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("a JSON value")
    }

    fn visit_bool<E>(self, v: bool) -> Result<Value, E> {
        Ok(Value::Bool(v))
    }

    fn visit_i64<E>(self, v: i64) -> Result<Value, E> {
        Ok(Value::Int(v))
    }

    fn visit_u64<E>(self, v: u64) -> Result<Value, E> {
        match i64::try_from(v) {
            Ok(i) => Ok(Value::Int(i)),
            // Overflows signed 64-bit: kept as a string rather than lossily
            // downcast to f64.
            Err(_) => Ok(Value::String(v.to_string())),
        }
    }

    fn visit_f64<E>(self, v: f64) -> Result<Value, E> {
        if v.is_finite() && v.fract() == 0.0 && v.abs() < 9.2e18 {
            Ok(Value::Int(v as i64))
        } else {
            Ok(Value::Float(v))
        }
    }

    fn visit_str<E>(self, v: &str) -> Result<Value, E> {
        Ok(Value::String(v.to_string()))
    }

    fn visit_string<E>(self, v: String) -> Result<Value, E> {
        Ok(Value::String(v))
    }

    fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Null)
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<Value, A::Error>
    where
        A: serde::de::SeqAccess<'de>,
    {
        let mut items = Vec::new();
        while let Some(item) = seq.next_element_seed(ValueSeed)? {
            items.push(item);
        }
        Ok(Value::Array(items))
    }

    fn visit_map<A>(self, mut map: A) -> Result<Value, A::Error>
    where
        A: serde::de::MapAccess<'de>,
    {
        let mut pairs = Vec::new();
        while let Some(key) = map.next_key::<String>()? {
            let value = map.next_value_seed(ValueSeed)?;
            pairs.push((key, value));
        }
        Ok(Value::Object(pairs))
    }
}

struct ValueSeed;

impl<'de> serde::de::DeserializeSeed<'de> for ValueSeed {
    type Value = Value;

    fn deserialize<D>(self, deserializer: D) -> Result<Value, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

impl<'de> serde::de::Deserialize<'de> for Value {
    fn deserialize<D>(deserializer: D) -> Result<Value, D::Error>
    where
        D: serde::de::Deserializer<'de>,
    {
        deserializer.deserialize_any(ValueVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn field_path_matches_exact_components() {
        let p = FieldPath::parse("a.b.c");
        assert!(p.matches_components(&["a".into(), "b".into(), "c".into()]));
        assert!(!p.matches_components(&["a".into(), "b".into()]));
        assert!(!p.matches_components(&["a".into(), "x".into(), "c".into()]));
    }

    #[test]
    fn join_path_prefixes_with_dot() {
        assert_eq!(join_path(&[], "id"), "id");
        assert_eq!(join_path(&["peers".into(), "0".into()], "id"), "peers.0.id");
    }

    #[test]
    fn value_render_matches_go_style() {
        assert_eq!(Value::Int(42).render(), "42");
        assert_eq!(Value::Float(3.5).render(), "3.5");
        assert_eq!(Value::Float(3.0).render(), "3");
        assert_eq!(Value::Bool(true).render(), "true");
        assert_eq!(
            Value::Duration(Duration::from_secs(3723)).render(),
            "1h2m3s"
        );
    }

    #[test]
    fn parse_json_object_preserves_order_and_duplicates() {
        let pairs = parse_json_object(br#"{"b":1,"a":2,"b":3}"#).unwrap();
        assert_eq!(pairs.len(), 3);
        assert_eq!(pairs[0].0, "b");
        assert_eq!(pairs[1].0, "a");
        assert_eq!(pairs[2].0, "b");
        assert_eq!(pairs[2].1, Value::Int(3));
    }

    #[test]
    fn parse_json_object_rejects_non_object_top_level() {
        assert!(parse_json_object(b"[1,2,3]").is_none());
        assert!(parse_json_object(b"not json").is_none());
    }

    #[test]
    fn large_u64_falls_back_to_string() {
        let pairs = parse_json_object(br#"{"id":18446744073709551615}"#).unwrap();
        assert_eq!(pairs[0].1, Value::String("18446744073709551615".to_string()));
    }

    #[test]
    fn integral_float_is_emitted_as_int() {
        let pairs = parse_json_object(br#"{"n":3.0}"#).unwrap();
        assert_eq!(pairs[0].1, Value::Int(3));
    }
}
