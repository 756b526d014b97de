use std::collections::BTreeMap;

use bson::{Bson, Document};

use crate::domain::error::Error;
use crate::domain::model::QueryRecord;
use crate::domain::query::path;

/// The runtime type a variable must carry, recorded from the leaf the path
/// addressed at definition time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VarType {
    String,
    Number,
    Bool,
    DateTime,
    Uuid,
    Array(Box<VarType>),
}

impl std::fmt::Display for VarType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String => write!(f, "string"),
            Self::Number => write!(f, "number"),
            Self::Bool => write!(f, "boolean"),
            Self::DateTime => write!(f, "datetime"),
            Self::Uuid => write!(f, "uuid"),
            Self::Array(inner) => write!(f, "array<{inner}>"),
        }
    }
}

/// Validate a query definition against its own pipeline.
///
/// Every variable path must address exactly one existing leaf; the leaf's
/// type becomes the variable's expected runtime type. Independently, every
/// leaf in the pipeline must be of a supported type, arrays must be
/// homogeneous, and `$lookup` stages are rejected because access control
/// covers a single collection.
///
/// # Errors
/// `VariableInjection` for unresolvable paths, `DataValidation` for
/// unsupported values or forbidden stages.
pub fn validate_query(query: &QueryRecord) -> Result<BTreeMap<String, VarType>, Error> {
    let mut types = BTreeMap::new();
    for (name, spec) in &query.variables {
        let segments = path::parse(&spec.path)?;
        let leaf = path::resolve(&query.pipeline, &segments)
            .ok_or_else(|| Error::VariableInjection("Variable path not found".into()))?;
        let var_type = classify(leaf).ok_or_else(|| {
            Error::data_validation(format!("variable '{name}' addresses an unsupported value"))
        })?;
        types.insert(name.clone(), var_type);
    }

    for stage in &query.pipeline {
        check_document(stage)?;
    }

    Ok(types)
}

/// Determine a leaf's variable type; `None` for unsupported values.
fn classify(value: &Bson) -> Option<VarType> {
    match value {
        Bson::String(text) => {
            if uuid::Uuid::parse_str(text).is_ok() {
                Some(VarType::Uuid)
            } else if chrono::DateTime::parse_from_rfc3339(text).is_ok() {
                Some(VarType::DateTime)
            } else {
                Some(VarType::String)
            }
        }
        Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_) => Some(VarType::Number),
        Bson::Boolean(_) => Some(VarType::Bool),
        Bson::DateTime(_) => Some(VarType::DateTime),
        Bson::Binary(binary) if binary.subtype == bson::spec::BinarySubtype::Uuid => {
            Some(VarType::Uuid)
        }
        Bson::Array(items) => {
            let first = items.first()?;
            let inner = classify(first)?;
            if matches!(inner, VarType::Array(_)) {
                return None;
            }
            for item in &items[1..] {
                if classify(item)? != inner {
                    return None;
                }
            }
            Some(VarType::Array(Box::new(inner)))
        }
        _ => None,
    }
}

fn check_document(doc: &Document) -> Result<(), Error> {
    for (key, value) in doc {
        if key == "$lookup" {
            return Err(Error::data_validation(
                "$lookup stages are not allowed in query pipelines",
            ));
        }
        check_value(value)?;
    }
    Ok(())
}

fn check_value(value: &Bson) -> Result<(), Error> {
    match value {
        Bson::Document(doc) => check_document(doc),
        Bson::Array(items) => {
            // Containers recurse; an array of scalars must also be homogeneous.
            if items.iter().all(is_leaf) && !items.is_empty() && classify(value).is_none() {
                return Err(Error::data_validation("Unsupported value type"));
            }
            for item in items {
                check_value(item)?;
            }
            Ok(())
        }
        leaf if is_leaf(leaf) => {
            if classify(leaf).is_none() {
                return Err(Error::data_validation("Unsupported value type"));
            }
            Ok(())
        }
        _ => Err(Error::data_validation("Unsupported value type")),
    }
}

fn is_leaf(value: &Bson) -> bool {
    !matches!(value, Bson::Document(_) | Bson::Array(_))
}
