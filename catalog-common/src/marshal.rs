//! Schema-directed coercion of loosely typed JSON into `TypedRecord`s.
use std::collections::BTreeMap;
use std::fmt;

use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Serialize, Serializer};
use serde_json::{Map, Number, Value};
use thiserror::Error;

use crate::schema::{ScalarKind, Schema, TypeDescriptor};

/// Why a single value could not be coerced.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoercionFailure {
    #[error("expected {expected}, found {found}")]
    UnexpectedShape {
        expected: &'static str,
        found: &'static str,
    },
    #[error("{value} cannot be narrowed to {kind}")]
    Narrowing { kind: ScalarKind, value: String },
}

/// A `CoercionFailure` together with the path of the offending value, e.g.
/// `$.current_version.files[0].id`.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{reason} at {path}")]
pub struct CoercionError {
    pub path: String,
    pub reason: CoercionFailure,
}

impl CoercionError {
    fn new(reason: CoercionFailure) -> Self {
        Self {
            path: String::new(),
            reason,
        }
    }

    fn unexpected_shape(expected: &'static str, found: &Value) -> Self {
        Self::new(CoercionFailure::UnexpectedShape {
            expected,
            found: json_kind(found),
        })
    }

    fn narrowing(kind: ScalarKind, value: &Value) -> Self {
        Self::new(CoercionFailure::Narrowing {
            kind,
            value: value.to_string(),
        })
    }

    /// Prepend a path segment as the error bubbles up.
    fn under(mut self, segment: impl fmt::Display) -> Self {
        self.path.insert_str(0, &segment.to_string());
        self
    }
}

/// A value after coercion. Floats are always finite.
#[derive(Debug, Clone, PartialEq)]
pub enum TypedValue {
    Null,
    String(String),
    Integer(i64),
    Float(f64),
    Boolean(bool),
    Sequence(Vec<TypedValue>),
    Mapping(BTreeMap<String, TypedValue>),
    Record(TypedRecord),
}

impl TypedValue {
    pub fn to_json(&self) -> Value {
        match self {
            TypedValue::Null => Value::Null,
            TypedValue::String(s) => Value::String(s.clone()),
            TypedValue::Integer(i) => Value::Number(Number::from(*i)),
            TypedValue::Float(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
            TypedValue::Boolean(b) => Value::Bool(*b),
            TypedValue::Sequence(items) => {
                Value::Array(items.iter().map(TypedValue::to_json).collect())
            }
            TypedValue::Mapping(entries) => Value::Object(
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.to_json()))
                    .collect(),
            ),
            TypedValue::Record(record) => record.to_json(),
        }
    }

    /// Render a coerced mapping key back into the string form JSON object keys require.
    fn into_key(self) -> String {
        match self {
            TypedValue::String(s) => s,
            TypedValue::Integer(i) => i.to_string(),
            TypedValue::Float(f) => f.to_string(),
            TypedValue::Boolean(b) => b.to_string(),
            other => other.to_json().to_string(),
        }
    }
}

impl Serialize for TypedValue {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            TypedValue::Null => serializer.serialize_none(),
            TypedValue::String(s) => serializer.serialize_str(s),
            TypedValue::Integer(i) => serializer.serialize_i64(*i),
            TypedValue::Float(f) => serializer.serialize_f64(*f),
            TypedValue::Boolean(b) => serializer.serialize_bool(*b),
            TypedValue::Sequence(items) => {
                let mut seq = serializer.serialize_seq(Some(items.len()))?;
                for item in items {
                    seq.serialize_element(item)?;
                }
                seq.end()
            }
            TypedValue::Mapping(entries) => {
                let mut map = serializer.serialize_map(Some(entries.len()))?;
                for (key, value) in entries {
                    map.serialize_entry(key, value)?;
                }
                map.end()
            }
            TypedValue::Record(record) => record.serialize(serializer),
        }
    }
}

/// The fields a schema declared and the raw document contained, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TypedRecord {
    fields: Vec<(String, TypedValue)>,
}

impl TypedRecord {
    pub fn get(&self, name: &str) -> Option<&TypedValue> {
        self.fields
            .iter()
            .find(|(field_name, _)| field_name == name)
            .map(|(_, value)| value)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &TypedValue)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut object = Map::with_capacity(self.fields.len());
        for (name, value) in &self.fields {
            object.insert(name.clone(), value.to_json());
        }
        Value::Object(object)
    }
}

impl Serialize for TypedRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name, value)?;
        }
        map.end()
    }
}

/// Result of `marshal_partial`: whatever could be coerced, plus what could not.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PartialRecord {
    pub record: TypedRecord,
    pub failures: Vec<CoercionError>,
}

/// Coerce `raw` into the shape declared by `schema`.
///
/// Only declared fields are kept and absent fields are omitted, never null-filled.
/// The first value that fails coercion aborts the whole record.
pub fn marshal(schema: &Schema, raw: &Value) -> Result<TypedRecord, CoercionError> {
    let object = raw
        .as_object()
        .ok_or_else(|| CoercionError::unexpected_shape("object", raw).under("$"))?;

    marshal_object(schema, object).map_err(|error| error.under("$"))
}

/// Like `marshal`, but a top-level field that fails coercion is dropped and reported instead
/// of aborting the record. A non-object document still fails.
pub fn marshal_partial(schema: &Schema, raw: &Value) -> Result<PartialRecord, CoercionError> {
    let object = raw
        .as_object()
        .ok_or_else(|| CoercionError::unexpected_shape("object", raw).under("$"))?;

    let mut partial = PartialRecord::default();
    for (name, descriptor) in schema.fields() {
        let Some(value) = object.get(name) else {
            continue;
        };

        match coerce(value, descriptor) {
            Ok(coerced) => partial.record.fields.push((name.to_owned(), coerced)),
            Err(error) => partial
                .failures
                .push(error.under(format_args!(".{name}")).under("$")),
        }
    }

    Ok(partial)
}

fn marshal_object(schema: &Schema, object: &Map<String, Value>) -> Result<TypedRecord, CoercionError> {
    let mut record = TypedRecord {
        fields: Vec::with_capacity(schema.len()),
    };

    for (name, descriptor) in schema.fields() {
        if let Some(value) = object.get(name) {
            let coerced =
                coerce(value, descriptor).map_err(|error| error.under(format_args!(".{name}")))?;
            record.fields.push((name.to_owned(), coerced));
        }
    }

    Ok(record)
}

/// Coerce a single value according to `descriptor`.
pub fn coerce(value: &Value, descriptor: &TypeDescriptor) -> Result<TypedValue, CoercionError> {
    match descriptor {
        TypeDescriptor::SchemaRef(schema) => match value {
            Value::Object(object) => marshal_object(schema, object).map(TypedValue::Record),
            other => Err(CoercionError::unexpected_shape("object", other)),
        },
        TypeDescriptor::SequenceOf(item) => match value {
            Value::Array(items) => items
                .iter()
                .enumerate()
                .map(|(index, element)| {
                    coerce(element, item).map_err(|error| error.under(format_args!("[{index}]")))
                })
                .collect::<Result<Vec<_>, _>>()
                .map(TypedValue::Sequence),
            other => Err(CoercionError::unexpected_shape("array", other)),
        },
        TypeDescriptor::MappingOf(key_kind, value_descriptor) => match value {
            Value::Null => Ok(TypedValue::Null),
            Value::Object(object) => {
                let mut entries = BTreeMap::new();
                for (key, entry) in object {
                    let segment = format!("[{key:?}]");
                    let key = coerce_scalar(&Value::String(key.clone()), *key_kind)
                        .map_err(|error| error.under(&segment))?
                        .into_key();
                    let entry =
                        coerce(entry, value_descriptor).map_err(|error| error.under(&segment))?;
                    entries.insert(key, entry);
                }
                Ok(TypedValue::Mapping(entries))
            }
            other => Err(CoercionError::unexpected_shape("object", other)),
        },
        TypeDescriptor::Scalar(kind) => coerce_scalar(value, *kind),
    }
}

/// Narrow a JSON value to a scalar kind.
///
/// * string: never fails; strings pass through, anything else is rendered as its JSON text
///   (`null` becomes `"null"`).
/// * integer: integral numbers pass through, finite floats truncate toward zero, booleans
///   become 0/1, strings must be a base-10 integer literal (surrounding whitespace allowed).
/// * float: numbers pass through, booleans become 0.0/1.0, strings must parse to a finite float.
/// * boolean: never fails; the strings `"true"` and `"false"` read as themselves, anything
///   else uses truthiness (zero, empty string, empty container and null are false).
///
/// Null, arrays and objects cannot be narrowed to integer or float.
pub fn coerce_scalar(value: &Value, kind: ScalarKind) -> Result<TypedValue, CoercionError> {
    match kind {
        ScalarKind::String => match value {
            Value::String(s) => Ok(TypedValue::String(s.clone())),
            other => Ok(TypedValue::String(other.to_string())),
        },
        ScalarKind::Integer => match value {
            Value::Number(n) => number_to_integer(n)
                .map(TypedValue::Integer)
                .ok_or_else(|| CoercionError::narrowing(kind, value)),
            Value::Bool(b) => Ok(TypedValue::Integer(i64::from(*b))),
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map(TypedValue::Integer)
                .map_err(|_| CoercionError::narrowing(kind, value)),
            other => Err(CoercionError::unexpected_shape("integer", other)),
        },
        ScalarKind::Float => match value {
            Value::Number(n) => n
                .as_f64()
                .filter(|f| f.is_finite())
                .map(TypedValue::Float)
                .ok_or_else(|| CoercionError::narrowing(kind, value)),
            Value::Bool(b) => Ok(TypedValue::Float(if *b { 1.0 } else { 0.0 })),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|f| f.is_finite())
                .map(TypedValue::Float)
                .ok_or_else(|| CoercionError::narrowing(kind, value)),
            other => Err(CoercionError::unexpected_shape("float", other)),
        },
        ScalarKind::Boolean => Ok(TypedValue::Boolean(match value {
            Value::String(s) if s == "true" => true,
            Value::String(s) if s == "false" => false,
            other => is_truthy(other),
        })),
    }
}

fn number_to_integer(n: &Number) -> Option<i64> {
    if let Some(i) = n.as_i64() {
        return Some(i);
    }
    if n.is_u64() {
        // Larger than i64::MAX.
        return None;
    }

    let truncated = n.as_f64()?.trunc();
    // i64::MAX is not representable as f64, so the upper bound is exclusive.
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Some(truncated as i64)
    } else {
        None
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map_or(true, |f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(object) => !object.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
