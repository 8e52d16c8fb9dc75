//! Generic execution engine for GraphQL-style APIs
//!
//! The engine authenticates once per session, executes single round trips and
//! walks cursor-based pagination across differently-shaped payloads.
//!
//! # Features
//!
//! - **Transport factory**: trusted CA bundle, optional proxy, per-host
//!   connection limit and bounded exponential-backoff retry
//! - **Auth session**: one client-credentials handshake, an immutable token
//!   with observable expiry and an explicit re-authentication hook
//! - **Typed operations**: `Operation<V, T>` statically ties variables to the
//!   destination type
//! - **Pagination**: any destination implementing [`Paginated`] can be walked
//!   up to a caller-supplied [`PageLimit`]
//! - **Diagnostics**: every failure is a labelled, coded [`Diagnostic`]
//! - **Request correlation**: each request carries an `X-Request-ID`
//!
//! # Example
//!
//! ```rust,no_run
//! use gqlrun_engine::prelude::*;
//! use serde::Deserialize;
//!
//! #[derive(Debug, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct Users {
//!     users: UserConnection,
//! }
//!
//! #[derive(Debug, Deserialize)]
//! #[serde(rename_all = "camelCase")]
//! struct UserConnection {
//!     nodes: Vec<serde_json::Value>,
//!     page_info: PageInfo,
//! }
//!
//! impl Paginated for Users {
//!     fn page_info(&self) -> Option<PageInfo> {
//!         Some(self.users.page_info.clone())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Diagnostics> {
//!     let ctx = CallContext::new();
//!     let session = Session::connect(EngineConfig::from_env()?, &ctx).await?;
//!
//!     let op: Operation<_, Users> = Operation::query(
//!         "query($after: String) { users(after: $after) { nodes { id } pageInfo { endCursor hasNextPage } } }",
//!         serde_json::json!({}),
//!     )
//!     .with_labels("user", "list");
//!
//!     let pages = session
//!         .walk(&op, PageLimit::new(10), &ctx)
//!         .await
//!         .into_result()?;
//!     println!("fetched {} pages", pages.len());
//!
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]

pub mod auth;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod operation;
pub mod page_info;
pub mod pagination;
pub mod session;
pub mod transport;

pub use auth::{authenticate, SessionToken, TokenResponse};
pub use config::{Credentials, EngineConfig, TransportConfig};
pub use context::CallContext;
pub use error::{ApiError, ApiErrorCode, EngineResult};
pub use executor::{execute, ResponsePayload, RoundTrip, X_REQUEST_ID};
pub use gqlrun_core::{Diagnostic, Diagnostics, ErrorCode, RetryConfig};
pub use operation::{build_envelope, Operation, OperationKind};
pub use page_info::{locate, LocateError, PageInfo, Paginated};
pub use pagination::{walk, PageLimit, WalkOutcome};
pub use session::Session;
pub use transport::{HttpTransport, TransportFactory};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::config::{Credentials, EngineConfig, TransportConfig};
    pub use crate::context::CallContext;
    pub use crate::error::EngineResult;
    pub use crate::operation::{Operation, OperationKind};
    pub use crate::page_info::{PageInfo, Paginated};
    pub use crate::pagination::{PageLimit, WalkOutcome};
    pub use crate::session::Session;
    pub use gqlrun_core::{Diagnostic, Diagnostics, ErrorCode, RetryConfig};
}
