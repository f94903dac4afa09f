//! Error types for the svat session layer.
//!
//! This module provides a unified error type with explicit variants for
//! transport, authentication, protocol, channel, storage, and input
//! validation errors. Every variant carries owned data only, so errors are
//! `Clone` and can be handed to every caller waiting on a shared refresh.

use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

/// The unified error type for svat operations.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Network transport errors (connection, timeout, closed channel).
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Authentication errors (bad login, expired session, validation).
    #[error("authentication error: {0}")]
    Auth(#[from] AuthError),

    /// Non-success responses from the API.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// Duplex channel lifecycle errors.
    #[error("channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Credential slot persistence errors.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// Input validation errors (URLs, resource names).
    #[error("invalid input: {0}")]
    InvalidInput(#[from] InvalidInputError),
}

impl Error {
    /// Returns true if the session is gone and the user must log in again.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Error::Auth(AuthError::SessionExpired))
    }

    /// Returns true if the identity endpoint rejected the refresh token.
    pub fn is_refresh_rejection(&self) -> bool {
        matches!(self, Error::Auth(AuthError::RefreshRejected))
    }

    /// Returns true for transient transport failures.
    pub fn is_transport(&self) -> bool {
        matches!(self, Error::Transport(_))
    }
}

/// Transport-level errors.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// Network connection failed.
    #[error("connection failed: {message}")]
    Connection { message: String },

    /// Request or connect attempt timed out.
    #[error("timed out after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// Generic HTTP error.
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// The channel was closed while an operation was in progress.
    #[error("channel closed")]
    Closed,
}

/// Authentication-related errors.
#[derive(Debug, Clone, Error)]
pub enum AuthError {
    /// Login was refused.
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Registration was refused with per-field errors.
    #[error("validation failed: {0}")]
    Validation(FieldErrors),

    /// The activation link is invalid or stale.
    #[error("activation failed: {detail}")]
    Activation { detail: String },

    /// The refresh token was rejected; the session has been cleared.
    #[error("session expired, please log in again")]
    SessionExpired,

    /// The identity endpoint refused the refresh token.
    #[error("refresh token rejected")]
    RefreshRejected,

    /// The request was still unauthorized after a refresh and retry.
    #[error("unauthorized")]
    Unauthorized,
}

/// Per-field error messages reported by the server, kept verbatim.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    /// Build field errors from a server error body.
    ///
    /// Accepts `{"field": ["msg", ...]}` as well as `{"field": "msg"}`.
    /// Anything that is not an object becomes a single `non_field_errors` entry.
    pub fn from_json(body: &serde_json::Value) -> Self {
        let mut fields = BTreeMap::new();
        match body {
            serde_json::Value::Object(map) => {
                for (field, value) in map {
                    let messages = match value {
                        serde_json::Value::Array(items) => {
                            items.iter().map(value_to_message).collect()
                        }
                        other => vec![value_to_message(other)],
                    };
                    fields.insert(field.clone(), messages);
                }
            }
            serde_json::Value::Null => {}
            other => {
                fields.insert("non_field_errors".to_string(), vec![value_to_message(other)]);
            }
        }
        Self(fields)
    }

    /// Insert a message for a field.
    pub fn push(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.0.entry(field.into()).or_default().push(message.into());
    }

    /// Messages reported for a field.
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Iterate over `(field, messages)` pairs in field order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

fn value_to_message(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                write!(f, "; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

/// Protocol-level errors from API responses.
#[derive(Debug, Clone)]
pub struct ProtocolError {
    /// HTTP status code.
    pub status: u16,
    /// Error message from the server (`error` or `detail`), if present.
    pub message: Option<String>,
    /// The raw JSON error body, if it parsed.
    pub body: Option<serde_json::Value>,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HTTP {}", self.status)?;
        if let Some(ref message) = self.message {
            write!(f, ": {}", message)?;
        }
        Ok(())
    }
}

impl std::error::Error for ProtocolError {}

impl ProtocolError {
    /// Create a protocol error from a status and an optional JSON body.
    ///
    /// The message is taken from the body's `error` or `detail` field.
    pub fn new(status: u16, body: Option<serde_json::Value>) -> Self {
        let message = body.as_ref().and_then(|b| {
            b.get("error")
                .or_else(|| b.get("detail"))
                .and_then(|v| v.as_str())
                .map(str::to_string)
        });
        Self {
            status,
            message,
            body,
        }
    }
}

/// Why a channel session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// `disconnect()` was called.
    Disconnected,
    /// The reconnect ceiling was exceeded.
    RetriesExhausted { attempts: u32 },
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TerminationReason::Disconnected => write!(f, "disconnected"),
            TerminationReason::RetriesExhausted { attempts } => {
                write!(f, "max reconnect attempts reached ({})", attempts)
            }
        }
    }
}

/// Duplex channel errors.
#[derive(Debug, Clone, Error)]
pub enum ChannelError {
    /// The channel ended for good; no further messages will arrive.
    #[error("channel terminated: {0}")]
    Terminated(TerminationReason),
}

/// Credential slot persistence errors.
#[derive(Debug, Clone, Error)]
#[error("{operation} failed: {message}")]
pub struct StorageError {
    pub operation: &'static str,
    pub message: String,
}

impl StorageError {
    pub fn new(operation: &'static str, message: impl Into<String>) -> Self {
        Self {
            operation,
            message: message.into(),
        }
    }
}

/// Input validation errors.
#[derive(Debug, Clone, Error)]
pub enum InvalidInputError {
    /// Invalid API or channel URL.
    #[error("invalid URL '{value}': {reason}")]
    Url { value: String, reason: String },

    /// Invalid channel resource name.
    #[error("invalid resource id '{value}': {reason}")]
    ResourceId { value: String, reason: String },

    /// Generic invalid input.
    #[error("invalid input: {message}")]
    Other { message: String },
}
