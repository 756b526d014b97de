use bson::{Bson, Document};
use chrono::{DateTime, Utc};
use uuid::Uuid;

use nildb_nuc::Did;

use crate::domain::error::Error;

// Catalog documents are written exclusively by this module; a shape
// mismatch on read is corruption, surfaced as a DatabaseError.

fn corrupt(key: &str) -> Error {
    Error::Database(format!("catalog document missing or malformed field '{key}'"))
}

pub fn req_string(doc: &Document, key: &str) -> Result<String, Error> {
    match doc.get(key) {
        Some(Bson::String(s)) => Ok(s.clone()),
        _ => Err(corrupt(key)),
    }
}

pub fn req_did(doc: &Document, key: &str) -> Result<Did, Error> {
    req_string(doc, key)?.parse().map_err(|_| corrupt(key))
}

pub fn req_uuid(doc: &Document, key: &str) -> Result<Uuid, Error> {
    bson_uuid(doc.get(key)).ok_or_else(|| corrupt(key))
}

pub fn req_datetime(doc: &Document, key: &str) -> Result<DateTime<Utc>, Error> {
    match doc.get(key) {
        Some(Bson::DateTime(at)) => Ok(at.to_chrono()),
        _ => Err(corrupt(key)),
    }
}

pub fn opt_datetime(doc: &Document, key: &str) -> Option<DateTime<Utc>> {
    match doc.get(key) {
        Some(Bson::DateTime(at)) => Some(at.to_chrono()),
        _ => None,
    }
}

pub fn req_bool(doc: &Document, key: &str) -> Result<bool, Error> {
    match doc.get(key) {
        Some(Bson::Boolean(b)) => Ok(*b),
        _ => Err(corrupt(key)),
    }
}

/// Extract a UUID stored as a native binary value.
#[must_use]
pub fn bson_uuid(value: Option<&Bson>) -> Option<Uuid> {
    match value {
        Some(Bson::Binary(binary)) if binary.subtype == bson::spec::BinarySubtype::Uuid => {
            Uuid::from_slice(&binary.bytes).ok()
        }
        _ => None,
    }
}

/// A UUID as the native BSON binary value.
#[must_use]
pub fn uuid_bson(id: Uuid) -> Bson {
    Bson::from(bson::Uuid::from_uuid_1(id))
}

/// A chrono instant as the native BSON datetime.
#[must_use]
pub fn datetime_bson(at: DateTime<Utc>) -> Bson {
    Bson::DateTime(bson::DateTime::from_chrono(at))
}
