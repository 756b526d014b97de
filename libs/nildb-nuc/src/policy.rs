use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A request-level predicate attached to a delegation token.
///
/// Selectors address the request context document with a dotted path rooted
/// at `$`, e.g. `$.req.headers.origin`. A selector that resolves to nothing
/// compares as JSON `null`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Policy {
    Eq { path: String, value: Value },
    Ne { path: String, value: Value },
    AnyOf { path: String, values: Vec<Value> },
    And { policies: Vec<Policy> },
    Or { policies: Vec<Policy> },
    Not { policy: Box<Policy> },
}

impl Policy {
    /// Evaluate the predicate against a request context document.
    #[must_use]
    pub fn evaluate(&self, context: &Value) -> bool {
        match self {
            Policy::Eq { path, value } => select(context, path) == *value,
            Policy::Ne { path, value } => select(context, path) != *value,
            Policy::AnyOf { path, values } => {
                let found = select(context, path);
                values.iter().any(|v| *v == found)
            }
            Policy::And { policies } => policies.iter().all(|p| p.evaluate(context)),
            Policy::Or { policies } => policies.iter().any(|p| p.evaluate(context)),
            Policy::Not { policy } => !policy.evaluate(context),
        }
    }
}

/// Resolve a `$.a.b.c` selector against a JSON document.
fn select(context: &Value, path: &str) -> Value {
    let mut current = context;
    for segment in path.split('.') {
        if segment == "$" {
            continue;
        }
        match current.get(segment) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> Value {
        json!({
            "req": {
                "method": "POST",
                "path": "/v1/data/find",
                "headers": { "origin": "good.com" }
            }
        })
    }

    #[test]
    fn equality_on_nested_header() {
        let policy = Policy::Eq {
            path: "$.req.headers.origin".into(),
            value: json!("good.com"),
        };
        assert!(policy.evaluate(&ctx()));

        let policy = Policy::Eq {
            path: "$.req.headers.origin".into(),
            value: json!("evil.com"),
        };
        assert!(!policy.evaluate(&ctx()));
    }

    #[test]
    fn missing_selector_compares_as_null() {
        let policy = Policy::Eq {
            path: "$.req.headers.missing".into(),
            value: Value::Null,
        };
        assert!(policy.evaluate(&ctx()));
    }

    #[test]
    fn combinators() {
        let policy = Policy::And {
            policies: vec![
                Policy::AnyOf {
                    path: "$.req.method".into(),
                    values: vec![json!("GET"), json!("POST")],
                },
                Policy::Not {
                    policy: Box::new(Policy::Eq {
                        path: "$.req.path".into(),
                        value: json!("/v1/system/maintenance/start"),
                    }),
                },
            ],
        };
        assert!(policy.evaluate(&ctx()));
    }

    #[test]
    fn serde_shape_is_tagged() {
        let policy = Policy::Eq {
            path: "$.req.headers.origin".into(),
            value: json!("good.com"),
        };
        let encoded = serde_json::to_value(&policy).unwrap();
        assert_eq!(
            encoded,
            json!({"op": "eq", "path": "$.req.headers.origin", "value": "good.com"})
        );
    }
}
