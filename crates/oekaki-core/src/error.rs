use serde::{Deserialize, Serialize};
use std::fmt;

/// Symbolic error codes returned by every coordinator operation. Clients map these
/// to localized messages; raw storage errors are never exposed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    MissingParams,
    BadRequest,
    InvalidInput,
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
    /// The operation no longer applies (e.g. the round already advanced).
    NotApplicable,
    Unavailable,
    Internal,
}

/// How a client should react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or missing input; shown inline, user-correctable.
    Validation,
    /// Name already taken; user-correctable.
    Conflict,
    /// Stale reference; resync.
    NotFound,
    /// Role mismatch; refresh role state.
    Forbidden,
    /// Network or server hiccup; retry.
    Transient,
    /// Operation no longer applicable; benign, log only.
    State,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MissingParams => "missing_params",
            Self::BadRequest => "bad_request",
            Self::InvalidInput => "invalid_input",
            Self::RoomNameTaken => "room_name_taken",
            Self::DuplicateUsername => "duplicate_username",
            Self::RoomNotFound => "room_not_found",
            Self::RoundNotFound => "round_not_found",
            Self::MemberNotFound => "member_not_found",
            Self::InvalidPassword => "invalid_password",
            Self::RoomFull => "room_full",
            Self::RoomNotJoinable => "room_not_joinable",
            Self::Unauthorized => "unauthorized",
            Self::Forbidden => "forbidden",
            Self::NotApplicable => "not_applicable",
            Self::Unavailable => "unavailable",
            Self::Internal => "internal",
        }
    }

    pub fn kind(self) -> ErrorKind {
        match self {
            Self::MissingParams | Self::BadRequest | Self::InvalidInput => ErrorKind::Validation,
            Self::InvalidPassword | Self::RoomFull | Self::RoomNotJoinable => {
                ErrorKind::Validation
            },
            Self::RoomNameTaken | Self::DuplicateUsername => ErrorKind::Conflict,
            Self::RoomNotFound | Self::RoundNotFound | Self::MemberNotFound => {
                ErrorKind::NotFound
            },
            Self::Unauthorized | Self::Forbidden => ErrorKind::Forbidden,
            Self::Unavailable | Self::Internal => ErrorKind::Transient,
            Self::NotApplicable => ErrorKind::State,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JSON error body: `{"error": "<code>"}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: ErrorCode,
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [ErrorCode; 16] = [
        ErrorCode::MissingParams,
        ErrorCode::BadRequest,
        ErrorCode::InvalidInput,
        ErrorCode::RoomNameTaken,
        ErrorCode::DuplicateUsername,
        ErrorCode::RoomNotFound,
        ErrorCode::RoundNotFound,
        ErrorCode::MemberNotFound,
        ErrorCode::InvalidPassword,
        ErrorCode::RoomFull,
        ErrorCode::RoomNotJoinable,
        ErrorCode::Unauthorized,
        ErrorCode::Forbidden,
        ErrorCode::NotApplicable,
        ErrorCode::Unavailable,
        ErrorCode::Internal,
    ];

    #[test]
    fn serde_name_matches_as_str() {
        for code in ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
        }
    }

    #[test]
    fn error_body_shape() {
        let body = ErrorBody {
            error: ErrorCode::RoomNameTaken,
        };
        assert_eq!(
            serde_json::to_string(&body).unwrap(),
            r#"{"error":"room_name_taken"}"#
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(ErrorCode::RoomNameTaken.kind(), ErrorKind::Conflict);
        assert_eq!(ErrorCode::RoomNotFound.kind(), ErrorKind::NotFound);
        assert_eq!(ErrorCode::Forbidden.kind(), ErrorKind::Forbidden);
        assert_eq!(ErrorCode::NotApplicable.kind(), ErrorKind::State);
        assert_eq!(ErrorCode::Unavailable.kind(), ErrorKind::Transient);
        assert_eq!(ErrorCode::MissingParams.kind(), ErrorKind::Validation);
    }
}
