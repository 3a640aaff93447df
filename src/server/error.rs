//! Error-to-HTTP response conversion.
//!
//! Handlers return `Result<T, AppError>`; any [`reelpipe_common::Error`]
//! converts with `?`.

use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use reelpipe_common::{Error, ErrorKind};
use serde::Serialize;
use utoipa::ToSchema;

/// JSON body of every error response.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Human-readable description.
    pub error: String,
    /// Stable error kind, e.g. `invalid_reference`.
    pub kind: String,
}

#[derive(Debug)]
pub enum AppError {
    Domain(Error),
    /// A path segment that cannot be a job id; reported like an unknown job.
    MalformedJobId(String),
    /// A request body the JSON extractor refused.
    MalformedBody(JsonRejection),
}

impl From<Error> for AppError {
    fn from(e: Error) -> Self {
        AppError::Domain(e)
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::MalformedBody(rejection)
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::Domain(inner) => {
                let status = StatusCode::from_u16(inner.http_status())
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if status.is_server_error() {
                    tracing::error!(status = %status, error = %inner, "Server error in API handler");
                }
                let body = ErrorBody {
                    error: inner.public_detail(),
                    kind: inner.kind().to_string(),
                };
                (status, body)
            }
            AppError::MalformedJobId(raw) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: format!("Job not found: {raw}"),
                    kind: ErrorKind::JobNotFound.to_string(),
                },
            ),
            AppError::MalformedBody(rejection) => (
                rejection.status(),
                ErrorBody {
                    error: rejection.body_text(),
                    kind: "invalid_request".to_string(),
                },
            ),
        };

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelpipe_common::JobId;

    #[test]
    fn not_found_produces_404() {
        let response = AppError::from(Error::JobNotFound(JobId::new())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn malformed_id_produces_404() {
        let response = AppError::MalformedJobId("j1".into()).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[test]
    fn invalid_reference_produces_400() {
        let response = AppError::from(Error::InvalidReference("nope".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn invalid_transition_produces_409() {
        let err = Error::invalid_transition(reelpipe_common::JobStatus::Done, "cancel");
        let response = AppError::from(err).into_response();
        assert_eq!(response.status(), StatusCode::CONFLICT);
    }
}
