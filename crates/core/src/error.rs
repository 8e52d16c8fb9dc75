//! Diagnostics with error codes, context and recovery suggestions
//!
//! Every fallible step of the engine reports failure as one or more
//! [`Diagnostic`]s collected into an ordered [`Diagnostics`] list:
//! - Error codes for programmatic handling
//! - A summary carrying the resource and operation labels
//! - An optional bounded detail block (status code, raw error list, response quote)
//! - Serializable reports

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Maximum number of bytes of a raw payload quoted into a diagnostic
pub const MAX_QUOTE_LEN: usize = 4096;

/// Error codes for programmatic error handling
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // General errors (1xxx)
    Unknown = 1000,
    Internal = 1001,
    Cancelled = 1002,
    DeadlineExceeded = 1003,

    // Transport errors (2xxx)
    TransportFailure = 2000,
    ClientBuild = 2001,

    // Configuration errors (3xxx)
    ConfigError = 3000,
    ConfigNotFound = 3001,
    ConfigParseError = 3002,
    ConfigInvalid = 3003,

    // Authentication errors (4xxx)
    AuthenticationFailed = 4000,
    TokenMalformed = 4001,

    // API errors (5xxx)
    HttpStatus = 5000,
    ApiReported = 5001,
    Serialization = 5002,

    // Decode errors (6xxx)
    DecodeFailure = 6000,
    MissingData = 6001,

    // Pagination errors (7xxx)
    NotPaginated = 7000,
    MissingCursor = 7001,
}

impl ErrorCode {
    /// Get the numeric code
    pub fn code(&self) -> u32 {
        *self as u32
    }

    /// Get a human-readable category
    pub fn category(&self) -> &'static str {
        match self.code() / 1000 {
            1 => "General",
            2 => "Transport",
            3 => "Configuration",
            4 => "Authentication",
            5 => "API",
            6 => "Decode",
            7 => "Pagination",
            _ => "Unknown",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{:04}", self.code())
    }
}

/// A single failure description
#[derive(Error, Debug)]
pub struct Diagnostic {
    /// Error code for programmatic handling
    pub code: ErrorCode,
    /// Human-readable summary
    pub message: String,
    /// Resource and operation labels, e.g. `"user/list"`
    pub context: Option<String>,
    /// Recovery suggestion
    pub suggestion: Option<String>,
    /// Raw detail: status code, error list, or a bounded response quote
    pub detail: Option<String>,
    /// Source error
    #[source]
    pub source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}]", self.code)?;
        if let Some(ctx) = &self.context {
            write!(f, " {ctx}:")?;
        }
        write!(f, " {}", self.message)?;
        if let Some(suggestion) = &self.suggestion {
            write!(f, "\n  Suggestion: {suggestion}")?;
        }
        if let Some(detail) = &self.detail {
            write!(f, "\n  Detail: {detail}")?;
        }
        Ok(())
    }
}

impl Diagnostic {
    /// Create a new diagnostic
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            context: None,
            suggestion: None,
            detail: None,
            source: None,
        }
    }

    /// Attach the resource/operation labels
    pub fn with_context(mut self, context: impl Into<String>) -> Self {
        self.context = Some(context.into());
        self
    }

    /// Label the diagnostic with a resource and operation pair
    pub fn with_labels(self, resource: &str, operation: &str) -> Self {
        self.with_context(format!("{resource}/{operation}"))
    }

    /// Add a recovery suggestion
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Attach raw detail, truncated to [`MAX_QUOTE_LEN`] bytes
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(quote(&detail.into()));
        self
    }

    /// Append more detail to an existing detail block
    pub fn append_detail(mut self, more: impl AsRef<str>) -> Self {
        let joined = match self.detail.take() {
            Some(existing) => format!("{existing}\n{}", more.as_ref()),
            None => more.as_ref().to_string(),
        };
        self.detail = Some(joined);
        self
    }

    /// Add a source error
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Whether this diagnostic records a caller-driven cancellation rather than a failure
    pub fn is_cancellation(&self) -> bool {
        matches!(self.code, ErrorCode::Cancelled | ErrorCode::DeadlineExceeded)
    }

    /// Convert to a serializable report
    pub fn to_report(&self) -> DiagnosticReport {
        DiagnosticReport {
            code: self.code,
            code_str: self.code.to_string(),
            category: self.code.category().to_string(),
            message: self.message.clone(),
            context: self.context.clone(),
            suggestion: self.suggestion.clone(),
            detail: self.detail.clone(),
            source: self.source.as_ref().map(|e| e.to_string()),
        }
    }

    // Convenience constructors

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::TransportFailure, message)
    }

    pub fn config(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ConfigInvalid, message)
    }

    pub fn config_not_found(path: impl AsRef<std::path::Path>) -> Self {
        Self::new(
            ErrorCode::ConfigNotFound,
            format!("Configuration file not found: {}", path.as_ref().display()),
        )
        .with_suggestion("Check the path or configure the engine through GQLRUN_* variables")
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::AuthenticationFailed, message)
            .with_suggestion("Verify the client id, client secret and audience")
    }

    pub fn http_status(status: u16) -> Self {
        Self::new(
            ErrorCode::HttpStatus,
            format!("unexpected HTTP status {status}"),
        )
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::DecodeFailure, message)
    }

    pub fn not_paginated() -> Self {
        Self::new(
            ErrorCode::NotPaginated,
            "response type carries no pageInfo; pagination is not supported for it",
        )
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorCode::Cancelled, "call cancelled by caller")
    }

    pub fn deadline_exceeded() -> Self {
        Self::new(ErrorCode::DeadlineExceeded, "call deadline exceeded")
    }
}

/// Truncate a raw payload to a bounded quote
pub fn quote(raw: &str) -> String {
    if raw.len() <= MAX_QUOTE_LEN {
        return raw.to_string();
    }
    let mut end = MAX_QUOTE_LEN;
    while !raw.is_char_boundary(end) {
        end -= 1;
    }
    let mut quoted = raw[..end].to_string();
    quoted.push('…');
    quoted
}

/// Serializable diagnostic report for logging and host surfaces
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub code: ErrorCode,
    pub code_str: String,
    pub category: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

/// Ordered collection of diagnostics returned by every fallible operation
#[derive(Debug, Default)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    /// Create an empty collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a diagnostic
    pub fn push(&mut self, diagnostic: Diagnostic) {
        self.entries.push(diagnostic);
    }

    /// Whether no failure was recorded
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of recorded diagnostics
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Iterate in recording order
    pub fn iter(&self) -> std::slice::Iter<'_, Diagnostic> {
        self.entries.iter()
    }

    /// First recorded diagnostic
    pub fn first(&self) -> Option<&Diagnostic> {
        self.entries.first()
    }

    /// Whether any diagnostic carries the given code
    pub fn contains_code(&self, code: ErrorCode) -> bool {
        self.entries.iter().any(|d| d.code == code)
    }

    /// Whether the failure was a caller-driven cancellation
    pub fn is_cancellation(&self) -> bool {
        self.entries.iter().any(Diagnostic::is_cancellation)
    }

    /// Serializable reports for every entry
    pub fn to_reports(&self) -> Vec<DiagnosticReport> {
        self.entries.iter().map(Diagnostic::to_report).collect()
    }

    /// Attach labels to every entry that has none yet
    pub fn label_unlabelled(self, context: &str) -> Self {
        self.entries
            .into_iter()
            .map(|d| {
                if d.context.is_some() {
                    d
                } else {
                    d.with_context(context)
                }
            })
            .collect()
    }
}

impl fmt::Display for Diagnostics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, diagnostic) in self.entries.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{diagnostic}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Diagnostics {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.entries
            .first()
            .map(|d| d as &(dyn std::error::Error + 'static))
    }
}

impl From<Diagnostic> for Diagnostics {
    fn from(diagnostic: Diagnostic) -> Self {
        Self {
            entries: vec![diagnostic],
        }
    }
}

impl Extend<Diagnostic> for Diagnostics {
    fn extend<I: IntoIterator<Item = Diagnostic>>(&mut self, iter: I) {
        self.entries.extend(iter);
    }
}

impl IntoIterator for Diagnostics {
    type Item = Diagnostic;
    type IntoIter = std::vec::IntoIter<Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.into_iter()
    }
}

impl<'a> IntoIterator for &'a Diagnostics {
    type Item = &'a Diagnostic;
    type IntoIter = std::slice::Iter<'a, Diagnostic>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Diagnostics>;

impl From<serde_json::Error> for Diagnostic {
    fn from(err: serde_json::Error) -> Self {
        Diagnostic::new(ErrorCode::Serialization, format!("JSON error: {err}")).with_source(err)
    }
}

impl From<serde_json::Error> for Diagnostics {
    fn from(err: serde_json::Error) -> Self {
        Diagnostic::from(err).into()
    }
}

/// Extension trait for adding labels to Results
pub trait ResultExt<T> {
    fn context(self, context: impl Into<String>) -> Result<T>;
    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        let context = context.into();
        self.map_err(|diagnostics| diagnostics.label_unlabelled(&context))
    }

    fn with_suggestion(self, suggestion: impl Into<String>) -> Result<T> {
        let suggestion = suggestion.into();
        self.map_err(|diagnostics| {
            diagnostics
                .into_iter()
                .map(|d| d.with_suggestion(suggestion.clone()))
                .collect()
        })
    }
}

impl FromIterator<Diagnostic> for Diagnostics {
    fn from_iter<I: IntoIterator<Item = Diagnostic>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
