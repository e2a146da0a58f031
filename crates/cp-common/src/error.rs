use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

/// Convenient Result alias.
pub type AppResult<T> = Result<T, AppError>;

/// Error returned by the broker's HTTP API.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": {
                "code": status.as_u16(),
                "message": self.to_string(),
            }
        });

        (status, axum::Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bad_request_status() {
        let response = AppError::BadRequest("x".into()).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_message() {
        assert_eq!(
            AppError::BadRequest("unknown destination".into()).to_string(),
            "Bad request: unknown destination"
        );
    }
}
