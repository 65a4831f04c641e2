//! Provider fault decoding
//!
//! Organizations reports faults as a JSON body carrying `__type` and
//! `Message`, with the same code repeated in the `x-amzn-ErrorType` header.

use crate::aws::http::RequestError;
use crate::error::ErrorKind;
use serde_json::Value;
use thiserror::Error;

/// Code used for connection failures and request timeouts
pub const TRANSPORT_ERROR_CODE: &str = "TransportError";

/// A classified fault returned by the organization-management API
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: ErrorKind, code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            kind,
            code: code.into(),
            message: message.into(),
        }
    }

    /// Build an error from a provider error code, classifying it
    pub fn from_code(code: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::from_code(code), code, message)
    }

    /// Whether the retry policy may try the call again
    pub fn is_retryable(&self) -> bool {
        self.kind == ErrorKind::Throttled
    }

    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind == ErrorKind::AlreadyExists
    }

    /// Decode a non-2xx response
    pub fn from_response(status: u16, error_type: Option<&str>, body: &str) -> Self {
        let parsed: Option<Value> = serde_json::from_str(body).ok();

        let code = error_type
            .map(normalize_code)
            .filter(|c| !c.is_empty())
            .or_else(|| {
                parsed
                    .as_ref()
                    .and_then(|v| v.get("__type"))
                    .and_then(|v| v.as_str())
                    .map(normalize_code)
            });

        let message = parsed
            .as_ref()
            .and_then(|v| v.get("Message").or_else(|| v.get("message")))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .unwrap_or_else(|| body.chars().take(500).collect());

        match code {
            Some(code) => {
                let kind = ErrorKind::from_code(&code);
                // Unrecognised server-side faults are transient from our point of view
                let kind = if kind == ErrorKind::Unknown && status >= 500 {
                    ErrorKind::Throttled
                } else {
                    kind
                };
                Self::new(kind, code, message)
            }
            None if status >= 500 => Self::new(
                ErrorKind::Throttled,
                format!("HTTP{}", status),
                message,
            ),
            None => Self::new(ErrorKind::Unknown, format!("HTTP{}", status), message),
        }
    }

    /// A response that could not be decoded
    pub fn malformed_response(action: &str, err: impl std::fmt::Display) -> Self {
        Self::new(
            ErrorKind::Unknown,
            "MalformedResponse",
            format!("{} returned an unexpected response: {}", action, err),
        )
    }
}

/// Strip the namespace (`com.amazonaws...#`) and URI suffix (`:http://...`) from a code
fn normalize_code(raw: &str) -> String {
    let without_suffix = raw.split(':').next().unwrap_or(raw);
    without_suffix
        .rsplit('#')
        .next()
        .unwrap_or(without_suffix)
        .trim()
        .to_string()
}

impl From<RequestError> for ApiError {
    fn from(err: RequestError) -> Self {
        match err {
            RequestError::Status {
                status,
                error_type,
                body,
            } => ApiError::from_response(status, error_type.as_deref(), &body),
            RequestError::Transport(e) if e.is_timeout() || e.is_connect() => {
                ApiError::new(ErrorKind::Throttled, TRANSPORT_ERROR_CODE, e.to_string())
            }
            RequestError::Transport(e) => {
                ApiError::new(ErrorKind::Unknown, TRANSPORT_ERROR_CODE, e.to_string())
            }
            RequestError::Other(e) => ApiError::new(ErrorKind::Unknown, "ClientError", format!("{:#}", e)),
        }
    }
}
