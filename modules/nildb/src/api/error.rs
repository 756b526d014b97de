use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::domain::error::Error;

/// Encode a domain error as the wire envelope
/// `{ "errors": ["<Tag>", "<detail>", issues…] }` with its mapped status.
///
/// This is the single encode step: tags survive unchanged from wherever the
/// failure originated.
pub fn error_response(error: &Error) -> Response {
    if matches!(error, Error::Database(_)) {
        // Internal detail is logged, not disclosed.
        tracing::error!(error = %error, "request failed with database error");
        let body = json!({ "errors": [error.tag(), "an internal error occurred"] });
        return (error.status(), Json(body)).into_response();
    }

    let mut errors = vec![error.tag().to_owned(), error.to_string()];
    errors.extend(error.issues().iter().cloned());
    (error.status(), Json(json!({ "errors": errors }))).into_response()
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        error_response(&self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    #[test]
    fn envelope_leads_with_the_tag() {
        let error = Error::data_validation_with_issues(
            "provided variables do not match the query definition",
            vec!["unexpected=isActive".into()],
        );
        let response = error.into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn database_detail_is_not_disclosed() {
        let response = Error::Database("connection pool exhausted".into()).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
