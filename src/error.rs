use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use utoipa::ToSchema;

use crate::media::MediaStoreError;
use crate::repo::RepoError;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiErrorBody {
    pub error: String,
}

#[derive(thiserror::Error, Debug)]
pub enum ApiError {
    #[error("{0}")] BadRequest(String),
    #[error("{0}")] Unauthorized(String),
    #[error("{0}")] Forbidden(String),
    #[error("{0}")] NotFound(String),
    #[error("That picture is too chonky to upload")] PayloadTooLarge,
    #[error("{0}")] UnsupportedMediaType(String),
    #[error("Something went fowl on our end")] Internal,
}

impl ApiError {
    pub fn bad_request(msg: impl Into<String>) -> Self { ApiError::BadRequest(msg.into()) }
    pub fn unauthorized(msg: impl Into<String>) -> Self { ApiError::Unauthorized(msg.into()) }
    pub fn forbidden(msg: impl Into<String>) -> Self { ApiError::Forbidden(msg.into()) }
    pub fn not_found(msg: impl Into<String>) -> Self { ApiError::NotFound(msg.into()) }

    /// Logs the cause and hides it from the client.
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!("internal error: {cause}");
        ApiError::Internal
    }
}

impl From<RepoError> for ApiError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ApiError::not_found("Nothing here but pond water"),
            RepoError::Conflict => ApiError::bad_request("That already exists"),
            RepoError::AlreadyLiked => ApiError::bad_request("You already liked this"),
            RepoError::NotLiked => ApiError::bad_request("You haven't liked this yet"),
            RepoError::Internal(cause) => ApiError::internal(cause),
        }
    }
}

impl From<MediaStoreError> for ApiError {
    fn from(e: MediaStoreError) -> Self {
        match e {
            MediaStoreError::NotFound => ApiError::not_found("That picture flew south"),
            MediaStoreError::Other(cause) => ApiError::internal(format!("media store: {cause}")),
        }
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> actix_web::http::StatusCode {
        use actix_web::http::StatusCode;
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ApiErrorBody { error: self.to_string() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;

    #[test]
    fn repo_errors_map_to_statuses() {
        assert_eq!(ApiError::from(RepoError::NotFound).status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::from(RepoError::AlreadyLiked).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::from(RepoError::Conflict).status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::from(RepoError::Internal("db down".into())).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn internal_message_is_generic() {
        let e = ApiError::from(RepoError::Internal("password=hunter2".into()));
        assert!(!e.to_string().contains("hunter2"));
    }
}
