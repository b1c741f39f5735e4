use std::fmt;

use serde::{Deserialize, Serialize};

/// Failure of a single request against the events API.
///
/// `Clone` because one in-flight fetch fans its outcome out to every caller
/// that joined it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestError {
    /// No response was obtained (DNS, refused connection, timeout).
    #[error("Transport error: {0}")]
    Transport(String),
    /// The server answered with a non-success status.
    #[error("Request failed with status {status}")]
    RequestFailed {
        status: u16,
        message: Option<String>,
    },
    /// The caller aborted the operation before it completed.
    #[error("Request cancelled")]
    Cancelled,
    /// The request could not be formed from the given input.
    #[error("Invalid input: {0}")]
    Validation(String),
    /// A success response whose body did not match the expected shape.
    #[error("Failed to decode response: {0}")]
    Decode(String),
}

impl RequestError {
    pub fn request_failed(status: u16, message: Option<String>) -> Self {
        Self::RequestFailed { status, message }
    }

    /// HTTP status for `RequestFailed`, `None` for everything else.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::RequestFailed { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Message supplied by the server in the error body, if any.
    pub fn server_message(&self) -> Option<&str> {
        match self {
            Self::RequestFailed {
                message: Some(message),
                ..
            } if !message.trim().is_empty() => Some(message),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool { matches!(self, Self::Cancelled) }
}

impl From<serde_json::Error> for RequestError {
    fn from(err: serde_json::Error) -> Self { Self::Decode(err.to_string()) }
}

/// Body the events API attaches to non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerErrorBody {
    #[serde(default)]
    pub message: Option<String>,
}

impl ServerErrorBody {
    /// Extracts `message` from a raw body; anything unparseable yields `None`.
    pub fn message_from_bytes(bytes: &[u8]) -> Option<String> {
        serde_json::from_slice::<ServerErrorBody>(bytes)
            .ok()
            .and_then(|body| body.message)
    }
}

/// Titled error display: the server's message when it sent one, otherwise a
/// caller-chosen fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBlock {
    pub title: String,
    pub message: String,
    pub status: Option<u16>,
}

impl ErrorBlock {
    pub fn new(title: &str, err: &RequestError, fallback: &str) -> Self {
        let message = err.server_message().unwrap_or(fallback).to_string();

        Self {
            title: title.to_string(),
            message,
            status: err.status(),
        }
    }
}

impl fmt::Display for ErrorBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => {
                write!(f, "{} ({})\n{}", self.title, status, self.message)
            }
            None => write!(f, "{}\n{}", self.title, self.message),
        }
    }
}

pub type RequestResult<T> = Result<T, RequestError>;
