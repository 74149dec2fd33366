use std::fmt;

use oekaki_core::error::{ErrorCode, ErrorKind};

/// Failure of a coordinator call as seen from the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// The coordinator answered with a symbolic error code.
    Api(ErrorCode),
    /// Network failure, timeout or a server-side hiccup. Worth retrying.
    Transient(String),
    /// The response could not be understood.
    Decode(String),
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Api(code) => code.kind(),
            Self::Transient(_) | Self::Decode(_) => ErrorKind::Transient,
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_)) || self.kind() == ErrorKind::Transient
    }

    /// Errors that only mean somebody else got there first.
    pub fn is_benign(&self) -> bool {
        self.kind() == ErrorKind::State
    }
}

impl fmt::Display for ClientError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Api(code) => write!(f, "coordinator error: {code}"),
            Self::Transient(msg) => write!(f, "transient failure: {msg}"),
            Self::Decode(msg) => write!(f, "bad response: {msg}"),
        }
    }
}

impl std::error::Error for ClientError {}

impl From<reqwest::Error> for ClientError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transient(e.to_string())
        }
    }
}
