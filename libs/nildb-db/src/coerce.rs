use bson::{Bson, Document};

use crate::error::DbError;

/// The request-level directive naming fields to rewrite.
pub const COERCE_KEY: &str = "$coerce";

// Operators whose value is a list of scalars to coerce element-wise.
const ARRAY_OPERATORS: &[&str] = &["$in", "$nin", "$all"];

/// The coercions a filter may request per field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Kind {
    Uuid,
    Date,
    String,
    Number,
    Boolean,
}

impl Kind {
    fn parse(name: &str) -> Result<Self, DbError> {
        match name {
            "uuid" => Ok(Self::Uuid),
            "date" => Ok(Self::Date),
            "string" => Ok(Self::String),
            "number" => Ok(Self::Number),
            "boolean" => Ok(Self::Boolean),
            other => Err(DbError::Coercion(format!("unknown coercion '{other}'"))),
        }
    }
}

/// Apply a filter document's `$coerce` directive in place.
///
/// For each named field the value is rewritten to its native type. The
/// rewrite descends into operator objects (`$eq`, `$gte`, `$in`, …) and
/// coerces each contained scalar individually. Fields absent from the
/// filter are ignored. Already-native values pass through unchanged, which
/// makes the rewrite idempotent.
///
/// # Errors
/// Fails with [`DbError::Coercion`] when a value cannot be converted.
pub fn apply_coercions(filter: &mut Document) -> Result<(), DbError> {
    let Some(directive) = filter.remove(COERCE_KEY) else {
        return Ok(());
    };
    let Bson::Document(directive) = directive else {
        return Err(DbError::Coercion("$coerce must be a document".into()));
    };

    for (field, kind_name) in &directive {
        let Bson::String(kind_name) = kind_name else {
            return Err(DbError::Coercion(format!(
                "$coerce entry for '{field}' must be a string"
            )));
        };
        let kind = Kind::parse(kind_name)?;
        if let Some(value) = filter.get_mut(field) {
            coerce_value(value, kind, field)?;
        }
    }
    Ok(())
}

/// Coerce a filter value: a scalar, an array of scalars, or an operator
/// document whose operands are coerced individually.
fn coerce_value(value: &mut Bson, kind: Kind, field: &str) -> Result<(), DbError> {
    match value {
        Bson::Document(operators) => {
            for (op, operand) in operators.iter_mut() {
                if ARRAY_OPERATORS.contains(&op.as_str()) {
                    coerce_elements(operand, kind, field)?;
                } else {
                    coerce_scalar(operand, kind, field)?;
                }
            }
            Ok(())
        }
        Bson::Array(_) => coerce_elements(value, kind, field),
        _ => coerce_scalar(value, kind, field),
    }
}

fn coerce_elements(value: &mut Bson, kind: Kind, field: &str) -> Result<(), DbError> {
    let Bson::Array(items) = value else {
        return coerce_scalar(value, kind, field);
    };
    for item in items {
        coerce_scalar(item, kind, field)?;
    }
    Ok(())
}

fn coerce_scalar(value: &mut Bson, kind: Kind, field: &str) -> Result<(), DbError> {
    let fail = |detail: &str| {
        Err(DbError::Coercion(format!(
            "field '{field}': {detail}"
        )))
    };

    match kind {
        Kind::Uuid => match &*value {
            Bson::String(text) => match bson::Uuid::parse_str(text) {
                Ok(id) => {
                    *value = Bson::from(id);
                    Ok(())
                }
                Err(_) => fail("not a valid UUID"),
            },
            Bson::Binary(binary) if binary.subtype == bson::spec::BinarySubtype::Uuid => Ok(()),
            _ => fail("expected a UUID string"),
        },
        Kind::Date => match &*value {
            Bson::String(text) => {
                match chrono::DateTime::parse_from_rfc3339(text) {
                    Ok(parsed) => {
                        *value = Bson::DateTime(bson::DateTime::from_chrono(parsed));
                        Ok(())
                    }
                    Err(_) => fail("not a valid ISO-8601 datetime"),
                }
            }
            Bson::DateTime(_) => Ok(()),
            _ => fail("expected a datetime string"),
        },
        Kind::String => match &*value {
            Bson::String(_) => Ok(()),
            Bson::Int32(n) => {
                *value = Bson::String(n.to_string());
                Ok(())
            }
            Bson::Int64(n) => {
                *value = Bson::String(n.to_string());
                Ok(())
            }
            Bson::Double(n) => {
                *value = Bson::String(n.to_string());
                Ok(())
            }
            Bson::Boolean(b) => {
                *value = Bson::String(b.to_string());
                Ok(())
            }
            _ => fail("expected a scalar"),
        },
        Kind::Number => match &*value {
            Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Ok(()),
            Bson::String(text) => {
                if let Ok(n) = text.parse::<i64>() {
                    *value = Bson::Int64(n);
                    Ok(())
                } else if let Ok(n) = text.parse::<f64>() {
                    *value = Bson::Double(n);
                    Ok(())
                } else {
                    fail("not a parseable number")
                }
            }
            _ => fail("expected a numeric string"),
        },
        Kind::Boolean => match &*value {
            Bson::Boolean(_) => Ok(()),
            Bson::String(text) if text == "true" => {
                *value = Bson::Boolean(true);
                Ok(())
            }
            Bson::String(text) if text == "false" => {
                *value = Bson::Boolean(false);
                Ok(())
            }
            _ => fail("expected a boolean"),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;

    #[test]
    fn coerces_uuid_inside_in_operator() {
        let id_a = "3f5c0a1b-9b7e-4d3a-8a46-0d9a2f1b6c5e";
        let id_b = "4a1b2c3d-4e5f-4071-8293-a4b5c6d7e8f9";
        let mut filter = doc! {
            "_id": { "$in": [id_a, id_b] },
            "$coerce": { "_id": "uuid" },
        };
        apply_coercions(&mut filter).unwrap();

        assert!(filter.get(COERCE_KEY).is_none());
        let items = filter
            .get_document("_id")
            .unwrap()
            .get_array("$in")
            .unwrap();
        for item in items {
            assert!(matches!(item, Bson::Binary(b) if b.subtype == bson::spec::BinarySubtype::Uuid));
        }
    }

    #[test]
    fn invalid_uuid_text_fails() {
        let mut filter = doc! {
            "_id": { "$in": ["not-a-uuid"] },
            "$coerce": { "_id": "uuid" },
        };
        let err = apply_coercions(&mut filter).unwrap_err();
        assert!(matches!(err, DbError::Coercion(_)));
    }

    #[test]
    fn coerces_date_comparison_operators() {
        let mut filter = doc! {
            "_created": { "$gte": "2024-01-01T00:00:00Z", "$lt": "2025-01-01T00:00:00Z" },
            "$coerce": { "_created": "date" },
        };
        apply_coercions(&mut filter).unwrap();
        let ops = filter.get_document("_created").unwrap();
        assert!(matches!(ops.get("$gte"), Some(Bson::DateTime(_))));
        assert!(matches!(ops.get("$lt"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn coerces_plain_scalars() {
        let mut filter = doc! {
            "count": "42",
            "flag": "true",
            "label": 7,
            "$coerce": { "count": "number", "flag": "boolean", "label": "string" },
        };
        apply_coercions(&mut filter).unwrap();
        assert_eq!(filter.get("count"), Some(&Bson::Int64(42)));
        assert_eq!(filter.get("flag"), Some(&Bson::Boolean(true)));
        assert_eq!(filter.get("label"), Some(&Bson::String("7".into())));
    }

    #[test]
    fn boolean_rejects_anything_else() {
        let mut filter = doc! { "flag": "yes", "$coerce": { "flag": "boolean" } };
        assert!(apply_coercions(&mut filter).is_err());
    }

    #[test]
    fn missing_fields_are_ignored() {
        let mut filter = doc! { "name": "a", "$coerce": { "absent": "uuid" } };
        apply_coercions(&mut filter).unwrap();
        assert_eq!(filter, doc! { "name": "a" });
    }

    #[test]
    fn applying_twice_is_identity() {
        let directive = doc! { "_id": "uuid", "when": "date", "n": "number" };
        let mut filter = doc! {
            "_id": "3f5c0a1b-9b7e-4d3a-8a46-0d9a2f1b6c5e",
            "when": { "$gte": "2024-06-01T12:00:00Z" },
            "n": { "$in": ["1", "2"] },
            "$coerce": directive.clone(),
        };
        apply_coercions(&mut filter).unwrap();
        let once = filter.clone();

        // Re-attach the directive: already-native values must pass through.
        filter.insert(COERCE_KEY, directive);
        apply_coercions(&mut filter).unwrap();
        assert_eq!(filter, once);
    }

    #[test]
    fn unknown_kind_fails() {
        let mut filter = doc! { "x": "1", "$coerce": { "x": "decimal" } };
        assert!(apply_coercions(&mut filter).is_err());
    }
}
