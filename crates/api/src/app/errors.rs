use axum::extract::rejection::{JsonRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use tracing::error;

use stockhold_core::DomainError;
use stockhold_infra::WorkflowError;

/// Handler error, rendered as `{error, message}`.
#[derive(Debug)]
pub enum ApiError {
    Workflow(WorkflowError),
    /// Request rejected before reaching a workflow (bad id, unparsable body).
    Rejected(Response),
}

pub type ApiResult<T = Response> = Result<T, ApiError>;

impl From<WorkflowError> for ApiError {
    fn from(err: WorkflowError) -> Self {
        ApiError::Workflow(err)
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        ApiError::Workflow(err.into())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::Rejected(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_body",
            rejection.body_text(),
        ))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::Rejected(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_query",
            rejection.body_text(),
        ))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            ApiError::Workflow(err) => workflow_error_to_response(err),
            ApiError::Rejected(response) => response,
        }
    }
}

pub fn workflow_error_to_response(err: WorkflowError) -> Response {
    match err {
        WorkflowError::InsufficientStock { .. } => {
            json_error(StatusCode::BAD_REQUEST, "insufficient_stock", err.to_string())
        }
        WorkflowError::Validation(msg) => {
            json_error(StatusCode::BAD_REQUEST, "validation_error", msg)
        }
        WorkflowError::InvalidTransition { .. } => {
            json_error(StatusCode::BAD_REQUEST, "invalid_transition", err.to_string())
        }
        WorkflowError::ProductNotFound(_)
        | WorkflowError::ReservationNotFound(_)
        | WorkflowError::OrderNotFound(_) => {
            json_error(StatusCode::NOT_FOUND, "not_found", err.to_string())
        }
        WorkflowError::LockContentionTimeout(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            axum::Json(json!({
                "error": "lock_timeout",
                "message": "resource is busy, retry the request",
                "retryable": true,
            })),
        )
            .into_response(),
        WorkflowError::InvariantViolation(_) | WorkflowError::Store(_) => {
            error!(error = %err, "request failed with internal error");
            json_error(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                "internal server error",
            )
        }
    }
}

pub fn json_error(
    status: StatusCode,
    code: &'static str,
    message: impl Into<String>,
) -> Response {
    (
        status,
        axum::Json(json!({
            "error": code,
            "message": message.into(),
        })),
    )
        .into_response()
}

/// Parse a path segment into a typed id, or a 400 `invalid_id` response.
pub fn parse_id<T: core::str::FromStr>(raw: &str, what: &str) -> Result<T, ApiError> {
    raw.parse().map_err(|_| {
        ApiError::Rejected(json_error(
            StatusCode::BAD_REQUEST,
            "invalid_id",
            format!("invalid {what} id"),
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use stockhold_core::ProductId;
    use stockhold_infra::StoreError;

    #[test]
    fn status_codes_follow_the_taxonomy() {
        let cases = [
            (
                WorkflowError::InsufficientStock {
                    requested: 2,
                    available: 1,
                },
                StatusCode::BAD_REQUEST,
            ),
            (WorkflowError::Validation("x".into()), StatusCode::BAD_REQUEST),
            (
                WorkflowError::InvalidTransition {
                    from: "pending".into(),
                    to: "shipped".into(),
                },
                StatusCode::BAD_REQUEST,
            ),
            (WorkflowError::ProductNotFound(ProductId::new()), StatusCode::NOT_FOUND),
            (
                WorkflowError::LockContentionTimeout("product".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
            (
                WorkflowError::InvariantViolation("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                WorkflowError::Store(StoreError::Unavailable("down".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(workflow_error_to_response(err).status(), status);
        }
    }
}
