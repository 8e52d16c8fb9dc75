//! Core building blocks for the gqlrun GraphQL execution engine
//!
//! This crate holds the pieces shared by every engine layer that do not touch
//! the network:
//!
//! - **Diagnostics**: coded failure descriptions with labels, suggestions and
//!   bounded raw detail, collected into an ordered list
//! - **Retry policy**: bounded attempts with capped exponential backoff
//!
//! # Example
//!
//! ```rust
//! use gqlrun_core::{Diagnostic, Diagnostics, ErrorCode};
//!
//! let mut diagnostics = Diagnostics::new();
//! diagnostics.push(Diagnostic::http_status(502).with_labels("user", "list"));
//!
//! assert!(diagnostics.contains_code(ErrorCode::HttpStatus));
//! assert!(diagnostics.to_string().contains("user/list"));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]

pub mod error;
pub mod retry;

pub use error::{quote, Diagnostic, DiagnosticReport, Diagnostics, ErrorCode, Result, ResultExt};
pub use retry::RetryConfig;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::error::{Diagnostic, Diagnostics, ErrorCode, Result, ResultExt};
    pub use crate::retry::RetryConfig;
}
