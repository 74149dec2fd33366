use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use oekaki_core::error::{ErrorBody, ErrorCode};

use crate::store::StoreError;

/// Failure of a coordinator operation. Each variant maps to exactly one symbolic
/// code; store internals are logged and reported as `internal`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CoordinatorError {
    MissingParams(&'static str),
    InvalidInput(&'static str),
    BadRequest(String),
    RoomNameTaken,
    DuplicateUsername,
    RoomNotFound,
    RoundNotFound,
    MemberNotFound,
    InvalidPassword,
    RoomFull,
    RoomNotJoinable,
    Unauthorized,
    Forbidden,
    Store(StoreError),
}

impl CoordinatorError {
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::MissingParams(_) => ErrorCode::MissingParams,
            Self::InvalidInput(_) => ErrorCode::InvalidInput,
            Self::BadRequest(_) => ErrorCode::BadRequest,
            Self::RoomNameTaken => ErrorCode::RoomNameTaken,
            Self::DuplicateUsername => ErrorCode::DuplicateUsername,
            Self::RoomNotFound => ErrorCode::RoomNotFound,
            Self::RoundNotFound => ErrorCode::RoundNotFound,
            Self::MemberNotFound => ErrorCode::MemberNotFound,
            Self::InvalidPassword => ErrorCode::InvalidPassword,
            Self::RoomFull => ErrorCode::RoomFull,
            Self::RoomNotJoinable => ErrorCode::RoomNotJoinable,
            Self::Unauthorized => ErrorCode::Unauthorized,
            Self::Forbidden => ErrorCode::Forbidden,
            Self::Store(_) => ErrorCode::Internal,
        }
    }

    fn status(&self) -> StatusCode {
        match self {
            Self::MissingParams(_) | Self::InvalidInput(_) | Self::BadRequest(_) => {
                StatusCode::BAD_REQUEST
            },
            Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::InvalidPassword | Self::Forbidden => StatusCode::FORBIDDEN,
            Self::RoomNotFound | Self::RoundNotFound | Self::MemberNotFound => {
                StatusCode::NOT_FOUND
            },
            Self::RoomNameTaken | Self::DuplicateUsername | Self::RoomFull | Self::RoomNotJoinable => {
                StatusCode::CONFLICT
            },
            Self::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl std::fmt::Display for CoordinatorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingParams(field) => write!(f, "missing parameter: {field}"),
            Self::InvalidInput(field) => write!(f, "invalid value for {field}"),
            Self::BadRequest(m) => write!(f, "bad request: {m}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            other => f.write_str(other.code().as_str()),
        }
    }
}

impl std::error::Error for CoordinatorError {}

impl From<StoreError> for CoordinatorError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl IntoResponse for CoordinatorError {
    fn into_response(self) -> Response {
        if let Self::Store(e) = &self {
            tracing::error!(error = %e, "Coordinator store failure");
        }
        let body = ErrorBody { error: self.code() };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ROOMS_NAME_KEY;

    #[test]
    fn store_errors_never_leak_details() {
        let err = CoordinatorError::from(StoreError::UniqueViolation(ROOMS_NAME_KEY));
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn status_codes() {
        assert_eq!(
            CoordinatorError::MissingParams("name").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(CoordinatorError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(CoordinatorError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(CoordinatorError::RoomNotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(CoordinatorError::RoomNameTaken.status(), StatusCode::CONFLICT);
        assert_eq!(CoordinatorError::RoomFull.status(), StatusCode::CONFLICT);
    }

    #[test]
    fn display_names_the_field() {
        assert_eq!(
            CoordinatorError::MissingParams("password").to_string(),
            "missing parameter: password"
        );
        assert_eq!(CoordinatorError::RoomFull.to_string(), "room_full");
    }
}
