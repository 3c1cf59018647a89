//! Structured errors
//!
//! Errors carry a machine-readable code plus optional hints so callers
//! (and the CLI's JSON output) can react without parsing messages.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    DispatcherUnavailable,
    DispatchFailed,
    StorageFailed,
    GroupNotFound,
    InvalidTime,
    EngineGone,
}

impl Error {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            suggestions: Vec::new(),
            context: None,
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggestions = suggestions;
        self
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn dispatcher_unavailable(reason: &str) -> Self {
        Self::new(
            ErrorCode::DispatcherUnavailable,
            format!("Input dispatcher unavailable: {}", reason),
        )
    }

    pub fn dispatch_failed(gesture: &str, reason: &str) -> Self {
        Self::new(
            ErrorCode::DispatchFailed,
            format!("{} failed: {}", gesture, reason),
        )
    }

    pub fn storage(reason: impl Into<String>) -> Self {
        Self::new(ErrorCode::StorageFailed, reason)
    }

    pub fn group_not_found(name: &str) -> Self {
        Self::new(
            ErrorCode::GroupNotFound,
            format!("No step group named: {}", name),
        )
        .with_suggestions(vec!["Run `tc list` to see saved groups".to_string()])
    }

    pub fn invalid_time(input: &str) -> Self {
        Self::new(
            ErrorCode::InvalidTime,
            format!("Invalid time of day '{}', expected HH:MM:SS or HH:MM", input),
        )
    }

    pub fn engine_gone() -> Self {
        Self::new(ErrorCode::EngineGone, "Engine loop is no longer running")
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] {}", self.code, self.message)
    }
}

impl std::error::Error for Error {}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Self::new(ErrorCode::StorageFailed, e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::new(ErrorCode::StorageFailed, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serializes_code_in_screaming_case() {
        let err = Error::dispatcher_unavailable("adb not found");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["code"], "DISPATCHER_UNAVAILABLE");
        assert!(json.get("suggestions").is_none());
    }

    #[test]
    fn display_includes_code() {
        let err = Error::group_not_found("daily");
        assert_eq!(err.to_string(), "[GroupNotFound] No step group named: daily");
        assert_eq!(err.suggestions.len(), 1);
    }

    #[test]
    fn io_and_json_failures_are_storage_errors() {
        let io = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only");
        assert_eq!(Error::from(io).code, ErrorCode::StorageFailed);

        let json = serde_json::from_str::<u64>("-1").unwrap_err();
        assert_eq!(Error::from(json).code, ErrorCode::StorageFailed);
    }
}
