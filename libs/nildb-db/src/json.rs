use bson::{Bson, Document};
use serde_json::{Map, Value};

/// Convert request JSON into BSON.
///
/// Integral numbers become `Int64`, everything else `Double`; no extended-JSON
/// interpretation happens here — `$coerce` is the only way request data turns
/// into non-JSON native types.
#[must_use]
pub fn json_to_bson(value: Value) -> Bson {
    match value {
        Value::Null => Bson::Null,
        Value::Bool(b) => Bson::Boolean(b),
        Value::Number(n) => n
            .as_i64()
            .map(Bson::Int64)
            .or_else(|| n.as_f64().map(Bson::Double))
            .unwrap_or(Bson::Null),
        Value::String(s) => Bson::String(s),
        Value::Array(items) => Bson::Array(items.into_iter().map(json_to_bson).collect()),
        Value::Object(map) => Bson::Document(json_object_to_document(map)),
    }
}

/// Convert a JSON object into a BSON document.
#[must_use]
pub fn json_object_to_document(map: Map<String, Value>) -> Document {
    map.into_iter()
        .map(|(k, v)| (k, json_to_bson(v)))
        .collect()
}

/// Render stored BSON as plain response JSON.
///
/// UUID binaries become hyphenated strings and datetimes RFC 3339 strings,
/// so clients see the same representations they sent.
#[must_use]
pub fn bson_to_json(value: &Bson) -> Value {
    match value {
        Bson::Null | Bson::Undefined => Value::Null,
        Bson::Boolean(b) => Value::Bool(*b),
        Bson::Int32(n) => Value::from(*n),
        Bson::Int64(n) => Value::from(*n),
        Bson::Double(n) => serde_json::Number::from_f64(*n)
            .map_or(Value::Null, Value::Number),
        Bson::String(s) => Value::String(s.clone()),
        Bson::Array(items) => Value::Array(items.iter().map(bson_to_json).collect()),
        Bson::Document(doc) => Value::Object(document_to_json_object(doc)),
        Bson::Binary(binary) if binary.subtype == bson::spec::BinarySubtype::Uuid => {
            uuid::Uuid::from_slice(&binary.bytes)
                .map(|id| Value::String(id.to_string()))
                .unwrap_or(Value::Null)
        }
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .map(Value::String)
            .unwrap_or(Value::Null),
        Bson::ObjectId(oid) => Value::String(oid.to_hex()),
        other => serde_json::to_value(other).unwrap_or(Value::Null),
    }
}

/// Render a stored BSON document as a JSON object.
#[must_use]
pub fn document_to_json_object(doc: &Document) -> Map<String, Value> {
    doc.iter()
        .map(|(k, v)| (k.clone(), bson_to_json(v)))
        .collect()
}
