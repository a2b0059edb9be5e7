use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Failure taxonomy recorded on failed samples and in the error log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    Timeout,
    TransportError,
    ParseError,
    RealtimeError,
    EmptyBook,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            ErrorCode::Timeout => "timeout",
            ErrorCode::TransportError => "transport_error",
            ErrorCode::ParseError => "parse_error",
            ErrorCode::RealtimeError => "realtime_error",
            ErrorCode::EmptyBook => "empty_book",
            ErrorCode::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FetchError {
    #[error("request timed out after {}ms", .0.as_millis())]
    Timeout(Duration),
    #[error("HTTP {status}: {detail}")]
    Http { status: u16, detail: String },
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("unexpected response shape: {0}")]
    Parse(String),
    #[error("websocket: {0}")]
    Realtime(String),
    #[error("no usable levels in book for {0}")]
    EmptyBook(String),
    #[error("{0}")]
    Unknown(String),
}

impl FetchError {
    pub fn code(&self) -> ErrorCode {
        match self {
            FetchError::Timeout(_) => ErrorCode::Timeout,
            FetchError::Http { .. } | FetchError::Transport(_) => ErrorCode::TransportError,
            FetchError::Parse(_) => ErrorCode::ParseError,
            FetchError::Realtime(_) => ErrorCode::RealtimeError,
            FetchError::EmptyBook(_) => ErrorCode::EmptyBook,
            FetchError::Unknown(_) => ErrorCode::Unknown,
        }
    }

    /// `"<code>: <message>"`, the form stored on failed samples.
    pub fn classified(&self) -> String {
        format!("{}: {}", self.code(), self)
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // Deadlines are enforced by the caller with tokio::time::timeout, not by reqwest
        if err.is_decode() {
            FetchError::Parse(err.to_string())
        } else if let Some(status) = err.status() {
            FetchError::Http { status: status.as_u16(), detail: err.to_string() }
        } else {
            FetchError::Transport(err.to_string())
        }
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for FetchError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        FetchError::Realtime(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes() {
        assert_eq!(FetchError::Timeout(Duration::from_millis(10)).code(), ErrorCode::Timeout);
        assert_eq!(FetchError::Http { status: 503, detail: "busy".into() }.code(), ErrorCode::TransportError);
        assert_eq!(FetchError::Transport("reset".into()).code(), ErrorCode::TransportError);
        assert_eq!(FetchError::Realtime("closed".into()).code(), ErrorCode::RealtimeError);
        assert_eq!(FetchError::EmptyBook("BTC".into()).code(), ErrorCode::EmptyBook);
    }

    #[test]
    fn test_classified_message() {
        let err = FetchError::Timeout(Duration::from_millis(10_000));
        assert_eq!(err.classified(), "timeout: request timed out after 10000ms");
        assert_eq!(serde_json::to_string(&ErrorCode::ParseError).unwrap(), "\"parse_error\"");
    }
}
