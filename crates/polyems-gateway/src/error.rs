//! Gateway errors and the `{ "error": ... }` envelope

use axum::extract::FromRequest;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use polyems_core::RouteError;
use polyems_core::protocol::ErrorBody;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// A chat provider failed; the message names the model
    #[error(transparent)]
    Route(#[from] RouteError),

    #[error("Image-based model is currently unreachable. Please try again later or use a different model.")]
    VisionUnavailable,

    #[error("Invalid request body: {}", .0.body_text())]
    InvalidBody(#[from] JsonRejection),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Route(_) | Self::VisionUnavailable => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidBody(rejection) => match rejection.status() {
                StatusCode::UNSUPPORTED_MEDIA_TYPE => StatusCode::UNSUPPORTED_MEDIA_TYPE,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), axum::Json(body)).into_response()
    }
}

/// `Json` extractor whose rejection uses the gateway's error envelope
#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(ApiError))]
pub struct AppJson<T>(pub T);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_error_is_500_with_model_message() {
        let err = ApiError::from(RouteError {
            model: "gpt-4o".to_string(),
            provider: "openai".to_string(),
            source: "status 401".into(),
        });
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            err.to_string(),
            "Model gpt-4o is currently unreachable. Please try a different model."
        );
    }

    #[test]
    fn test_vision_error_message() {
        let err = ApiError::VisionUnavailable;
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(err.to_string().starts_with("Image-based model is currently unreachable"));
    }
}
