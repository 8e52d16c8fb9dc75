//! Error types for the engine
//!
//! Failures are reported as [`Diagnostics`]; this module also models the
//! server-reported GraphQL error list.

use gqlrun_core::{Diagnostic, Diagnostics, ErrorCode};
use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, Diagnostics>;

/// GraphQL error code, which servers send either as text or as a number
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ApiErrorCode {
    /// Symbolic code such as `NOT_FOUND`
    Text(String),
    /// Numeric code
    Number(i64),
}

impl fmt::Display for ApiErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(code) => f.write_str(code),
            Self::Number(code) => write!(f, "{code}"),
        }
    }
}

/// Segment of a response path
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathSegment {
    /// Field name
    Key(String),
    /// List index
    Index(i64),
}

impl fmt::Display for PathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Key(key) => f.write_str(key),
            Self::Index(index) => write!(f, "{index}"),
        }
    }
}

/// Nested exception raised by the server's resolver
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiException {
    /// Exception message
    #[serde(default)]
    pub message: Option<String>,
    /// Path reported by the exception
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: Vec<PathSegment>,
}

/// Structured `extensions` block of a GraphQL error
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiErrorExtensions {
    /// Extension-level code
    #[serde(default)]
    pub code: Option<ApiErrorCode>,
    /// Nested exception
    #[serde(default)]
    pub exception: Option<ApiException>,
}

/// A single entry of the response `errors` array
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiError {
    /// Human-readable error message, empty when the server sent none
    #[serde(default, deserialize_with = "null_as_default")]
    pub message: String,
    /// Top-level code
    #[serde(default)]
    pub code: Option<ApiErrorCode>,
    /// Path within the response where the error occurred
    #[serde(default, deserialize_with = "null_as_default")]
    pub path: Vec<PathSegment>,
    /// Extensions metadata
    #[serde(default)]
    pub extensions: Option<ApiErrorExtensions>,
}

impl ApiError {
    /// Create an error carrying only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            code: None,
            path: Vec::new(),
            extensions: None,
        }
    }

    /// The top-level code, falling back to the extension code
    #[must_use]
    pub fn effective_code(&self) -> Option<&ApiErrorCode> {
        self.code
            .as_ref()
            .or_else(|| self.extensions.as_ref().and_then(|ext| ext.code.as_ref()))
    }

    /// The nested exception, when present
    #[must_use]
    pub fn exception(&self) -> Option<&ApiException> {
        self.extensions.as_ref().and_then(|ext| ext.exception.as_ref())
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.message.is_empty() {
            f.write_str("(no message)")?;
        } else {
            f.write_str(&self.message)?;
        }
        if let Some(code) = self.effective_code() {
            write!(f, " (code: {code})")?;
        }
        if !self.path.is_empty() {
            write!(f, " at {}", join_path(&self.path))?;
        }
        if let Some(exception) = self.exception() {
            if let Some(message) = &exception.message {
                write!(f, "; exception: {message}")?;
            }
            if !exception.path.is_empty() {
                write!(f, " at {}", join_path(&exception.path))?;
            }
        }
        Ok(())
    }
}

/// Deserialize an absent or explicit `null` field as `T::default()`
pub(crate) fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

fn join_path(path: &[PathSegment]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(".")
}

/// Render a server error list, one entry per line
pub(crate) fn render_api_errors(errors: &[ApiError]) -> String {
    errors
        .iter()
        .enumerate()
        .map(|(i, e)| format!("{}. {e}", i + 1))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Convert a reqwest failure into a transport diagnostic
pub(crate) fn transport_failure(err: reqwest::Error) -> Diagnostic {
    let kind = if err.is_timeout() {
        "timed out"
    } else if err.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    Diagnostic::new(ErrorCode::TransportFailure, format!("HTTP {kind}: {err}")).with_source(err)
}
