//! HTTP error mapping.
//!
//! Every failure leaves the service as a JSON body of the form
//! `{"error": "..."}`. Validation failures additionally carry the offending
//! field names under `fields`. Store outages are reported with a generic
//! message; the cause is logged.

use axum::{
    Json,
    extract::rejection::{JsonRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

pub type ApiResult<T> = core::result::Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error(transparent)]
    Store(#[from] tokenq::Error),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Missing or invalid bearer token")]
    Unauthorized,

    /// The request body, query or path could not be decoded.
    #[error("Invalid request: {reason}")]
    InvalidRequest { reason: String },

    #[error("Unsupported export format: {0}")]
    UnknownExportFormat(String),

    #[error("No route for {method} {path}")]
    RouteNotFound { method: String, path: String },

    #[error("Internal error: {context}")]
    Internal { context: String },
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::InvalidRequest {
            reason: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::InvalidRequest {
            reason: rejection.body_text(),
        }
    }
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    fields: Option<&'a [&'static str]>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Store(err) => match err {
                tokenq::Error::Validation { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                tokenq::Error::NotFound { .. } => StatusCode::NOT_FOUND,
                tokenq::Error::InvalidStatus { .. } => StatusCode::BAD_REQUEST,
                tokenq::Error::StoreUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::InvalidCredentials | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidRequest { .. } => StatusCode::BAD_REQUEST,
            Self::UnknownExportFormat(_) | Self::RouteNotFound { .. } => StatusCode::NOT_FOUND,
            Self::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::Store(tokenq::Error::StoreUnavailable(_)) => {
                "Service temporarily unavailable, please retry".to_string()
            }
            Self::Store(tokenq::Error::NotFound { .. }) => "Service request not found".to_string(),
            Self::Store(tokenq::Error::CorruptRecord { .. }) | Self::Internal { .. } => {
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        } else {
            tracing::debug!(error = %self, "request rejected");
        }

        let fields = match &self {
            Self::Store(err) => err.invalid_fields(),
            _ => None,
        };
        let body = ErrorBody {
            error: self.public_message(),
            fields,
        };
        (status, Json(body)).into_response()
    }
}
