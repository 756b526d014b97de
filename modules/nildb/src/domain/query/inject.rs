use std::collections::BTreeMap;

use bson::{Bson, Document};
use serde_json::{Map, Value};

use crate::domain::error::Error;
use crate::domain::model::VariableSpec;
use crate::domain::query::path;
use crate::domain::query::validate::VarType;

/// Check the runtime variable set against the declared specs.
///
/// The provided key set must equal the required keys plus any subset of the
/// optional ones. Each violation is reported in the error's issues list as
/// `unexpected=<k>` or `missing=<k>`.
///
/// # Errors
/// `DataValidation` carrying one issue per violation.
pub fn validate_variables(
    specs: &BTreeMap<String, VariableSpec>,
    runtime: &Map<String, Value>,
) -> Result<(), Error> {
    let mut issues = Vec::new();

    for key in runtime.keys() {
        if !specs.contains_key(key) {
            issues.push(format!("unexpected={key}"));
        }
    }
    for (name, spec) in specs {
        if !spec.optional && !runtime.contains_key(name) {
            issues.push(format!("missing={name}"));
        }
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(Error::data_validation_with_issues(
            "provided variables do not match the query definition",
            issues,
        ))
    }
}

/// Produce a new pipeline with each provided variable substituted at its
/// path. Optional variables left out keep the pipeline's default value;
/// arrays are replaced wholesale. Runtime values are coerced to the type
/// recorded at definition time before substitution.
///
/// # Errors
/// `DataValidation` on type mismatches, `VariableInjection` when a path no
/// longer resolves (a definition invariant violation).
pub fn inject_variables(
    pipeline: &[Document],
    specs: &BTreeMap<String, VariableSpec>,
    types: &BTreeMap<String, VarType>,
    runtime: &Map<String, Value>,
) -> Result<Vec<Document>, Error> {
    let mut injected: Vec<Document> = pipeline.to_vec();

    for (name, value) in runtime {
        let (Some(spec), Some(expected)) = (specs.get(name), types.get(name)) else {
            // validate_variables runs first; an unknown key here is a bug.
            return Err(Error::data_validation(format!("unknown variable '{name}'")));
        };
        let coerced = coerce_variable(name, value, expected)?;
        let segments = path::parse(&spec.path)?;
        let slot = path::resolve_mut(&mut injected, &segments)
            .ok_or_else(|| Error::VariableInjection("Variable path not found".into()))?;
        *slot = coerced;
    }

    Ok(injected)
}

/// Convert one runtime JSON value into the BSON the pipeline expects.
fn coerce_variable(name: &str, value: &Value, expected: &VarType) -> Result<Bson, Error> {
    let mismatch = || {
        Error::data_validation(format!(
            "variable '{name}' must be of type {expected}"
        ))
    };

    match (expected, value) {
        (VarType::String, Value::String(s)) => Ok(Bson::String(s.clone())),
        (VarType::Uuid, Value::String(s)) => bson::Uuid::parse_str(s)
            .map(Bson::from)
            .map_err(|_| mismatch()),
        (VarType::DateTime, Value::String(s)) => chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| Bson::DateTime(bson::DateTime::from_chrono(dt)))
            .map_err(|_| mismatch()),
        (VarType::Number, Value::Number(n)) => n
            .as_i64()
            .map(Bson::Int64)
            .or_else(|| n.as_f64().map(Bson::Double))
            .ok_or_else(mismatch),
        (VarType::Bool, Value::Bool(b)) => Ok(Bson::Boolean(*b)),
        (VarType::Array(inner), Value::Array(items)) => {
            let coerced = items
                .iter()
                .map(|item| coerce_variable(name, item, inner))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Bson::Array(coerced))
        }
        // Functions, null, undefined and objects are never valid values.
        _ => Err(mismatch()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bson::doc;
    use serde_json::json;

    fn specs(entries: &[(&str, &str, bool)]) -> BTreeMap<String, VariableSpec> {
        entries
            .iter()
            .map(|(name, path, optional)| {
                (
                    (*name).to_owned(),
                    VariableSpec {
                        path: (*path).to_owned(),
                        optional: *optional,
                    },
                )
            })
            .collect()
    }

    fn runtime(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!("runtime fixture must be an object"),
        }
    }

    #[test]
    fn unexpected_and_missing_keys_are_enumerated() {
        let specs = specs(&[("address", "$.pipeline[0].$match.wallet", false)]);
        let vars = runtime(json!({"address": "0x1", "isActive": false}));
        let err = validate_variables(&specs, &vars).unwrap_err();
        assert_eq!(err.tag(), "DataValidationError");
        assert_eq!(err.issues(), ["unexpected=isActive"]);

        let err = validate_variables(&specs, &runtime(json!({}))).unwrap_err();
        assert_eq!(err.issues(), ["missing=address"]);
    }

    #[test]
    fn optional_variables_may_be_absent() {
        let specs = specs(&[
            ("address", "$.pipeline[0].$match.wallet", false),
            ("limit", "$.pipeline[0].$limit", true),
        ]);
        validate_variables(&specs, &runtime(json!({"address": "0x1"}))).unwrap();
        validate_variables(&specs, &runtime(json!({"address": "0x1", "limit": 5}))).unwrap();
    }

    #[test]
    fn deep_injection_replaces_each_path_exactly_once() {
        let pipeline = vec![doc! { "$match": { "$or": [
            { "type": "" },
            { "category": { "$in": ["", "B"] } },
            { "$and": [ { "status": "active" }, { "nested": { "deep": { "value": "" } } } ] },
        ] } }];
        let specs = specs(&[
            ("type1", "$.pipeline[0].$match.$or[0].type", false),
            ("category1", "$.pipeline[0].$match.$or[1].category.$in", false),
            (
                "deepValue",
                "$.pipeline[0].$match.$or[2].$and[1].nested.deep.value",
                false,
            ),
        ]);
        let mut types = BTreeMap::new();
        types.insert("type1".to_owned(), VarType::String);
        types.insert(
            "category1".to_owned(),
            VarType::Array(Box::new(VarType::String)),
        );
        types.insert("deepValue".to_owned(), VarType::String);

        let vars = runtime(json!({
            "type1": "special",
            "category1": ["A"],
            "deepValue": "nested-value",
        }));
        validate_variables(&specs, &vars).unwrap();
        let injected = inject_variables(&pipeline, &specs, &types, &vars).unwrap();

        let expected = vec![doc! { "$match": { "$or": [
            { "type": "special" },
            { "category": { "$in": ["A"] } },
            { "$and": [ { "status": "active" }, { "nested": { "deep": { "value": "nested-value" } } } ] },
        ] } }];
        assert_eq!(injected, expected);
        // The source pipeline is untouched.
        assert_eq!(
            pipeline[0].get_document("$match").unwrap().get_array("$or").unwrap()[0],
            Bson::Document(doc! { "type": "" })
        );
    }

    #[test]
    fn uuid_and_datetime_values_become_native_types() {
        let pipeline = vec![doc! { "$match": {
            "_id": "00000000-0000-0000-0000-000000000000",
            "since": "2020-01-01T00:00:00Z",
        } }];
        let specs = specs(&[
            ("id", "$.pipeline[0].$match._id", false),
            ("since", "$.pipeline[0].$match.since", false),
        ]);
        let mut types = BTreeMap::new();
        types.insert("id".to_owned(), VarType::Uuid);
        types.insert("since".to_owned(), VarType::DateTime);

        let vars = runtime(json!({
            "id": "3f5c0a1b-9b7e-4d3a-8a46-0d9a2f1b6c5e",
            "since": "2024-06-01T12:30:00Z",
        }));
        let injected = inject_variables(&pipeline, &specs, &types, &vars).unwrap();
        let stage = injected[0].get_document("$match").unwrap();
        assert!(matches!(stage.get("_id"), Some(Bson::Binary(_))));
        assert!(matches!(stage.get("since"), Some(Bson::DateTime(_))));
    }

    #[test]
    fn type_mismatches_are_rejected() {
        let pipeline = vec![doc! { "$match": { "n": 1 } }];
        let specs = specs(&[("n", "$.pipeline[0].$match.n", false)]);
        let mut types = BTreeMap::new();
        types.insert("n".to_owned(), VarType::Number);

        for bad in [json!({"n": "seven"}), json!({"n": null}), json!({"n": {}})] {
            let err =
                inject_variables(&pipeline, &specs, &types, &runtime(bad)).unwrap_err();
            assert_eq!(err.tag(), "DataValidationError");
        }
    }
}
