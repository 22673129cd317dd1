//! HTTP response envelope and error conversion.
//!
//! Every response is `{ statusCode, data, error }`; errors carry a stable
//! machine-readable code. Handlers return `Result<Response, HttpError>` and
//! use `.map_err(Into::into)` so every `AppError` renders consistently.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use reel_core::AppError;
use serde::Serialize;

/// The `{ statusCode, data, error }` envelope used by every endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope<T: Serialize> {
    pub status_code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorBody>,
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Success response with the given status.
pub fn success<T: Serialize>(status: StatusCode, data: T) -> Response {
    let envelope = Envelope {
        status_code: status.as_u16(),
        data: Some(data),
        error: None,
    };
    (status, Json(envelope)).into_response()
}

/// Wrapper type for AppError to implement IntoResponse. Needed because of
/// Rust's orphan rules: IntoResponse (external trait) cannot be implemented
/// for AppError (type from reel-core) directly.
#[derive(Debug)]
pub struct HttpError(pub AppError);

impl From<AppError> for HttpError {
    fn from(err: AppError) -> Self {
        HttpError(err)
    }
}

impl From<anyhow::Error> for HttpError {
    fn from(err: anyhow::Error) -> Self {
        HttpError(AppError::Internal(format!("{:#}", err)))
    }
}

impl From<sqlx::Error> for HttpError {
    fn from(err: sqlx::Error) -> Self {
        HttpError(AppError::Database(err))
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.http_status())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        if status.is_server_error() {
            tracing::error!(error = %self.0, code = self.0.code(), "Request failed");
        } else {
            tracing::debug!(error = %self.0, code = self.0.code(), "Request rejected");
        }

        let envelope: Envelope<()> = Envelope {
            status_code: status.as_u16(),
            data: None,
            error: Some(ErrorBody {
                code: self.0.code().to_string(),
                message: self.0.to_string(),
                details: None,
            }),
        };

        (status, Json(envelope)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_omits_absent_halves() {
        let success_env = Envelope {
            status_code: 200,
            data: Some(serde_json::json!({"ok": true})),
            error: None,
        };
        let json = serde_json::to_value(&success_env).unwrap();
        assert_eq!(json["statusCode"], 200);
        assert!(json.get("error").is_none());

        let error_env: Envelope<()> = Envelope {
            status_code: 404,
            data: None,
            error: Some(ErrorBody {
                code: "VIDEO_NOT_FOUND".to_string(),
                message: "gone".to_string(),
                details: None,
            }),
        };
        let json = serde_json::to_value(&error_env).unwrap();
        assert_eq!(json["error"]["code"], "VIDEO_NOT_FOUND");
        assert!(json.get("data").is_none());
    }
}
