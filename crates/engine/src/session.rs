//! Session facade: one authenticated handshake, many operations
//!
//! A [`Session`] owns the transport, the immutable session token and the
//! configuration. Clones share all three and may be used concurrently.

use crate::auth::{authenticate, SessionToken};
use crate::config::EngineConfig;
use crate::context::CallContext;
use crate::error::EngineResult;
use crate::executor::{execute, RoundTrip};
use crate::operation::Operation;
use crate::page_info::Paginated;
use crate::pagination::{walk, PageLimit, WalkOutcome};
use crate::transport::{HttpTransport, TransportFactory};
use gqlrun_core::ResultExt;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, instrument};

/// Authenticated connection to one API endpoint
#[derive(Debug, Clone)]
pub struct Session {
    transport: HttpTransport,
    token: Arc<SessionToken>,
    authorization: Arc<str>,
    config: Arc<EngineConfig>,
}

impl Session {
    /// Validate the configuration, build the transport and authenticate
    ///
    /// Fails without touching the API endpoint when the handshake fails. The
    /// handshake honours `ctx`'s cancellation and deadline.
    #[instrument(skip_all, fields(api_url = %config.api_url))]
    pub async fn connect(config: EngineConfig, ctx: &CallContext) -> EngineResult<Self> {
        config.validate()?;
        let transport = TransportFactory::build(&config.transport)?;
        let token = authenticate(&transport, &config.credentials, ctx).await?;
        info!(expires_at = ?token.expires_at(), "Session established");
        Ok(Self::from_parts(transport, token, Arc::new(config)))
    }

    /// Assemble a session from an existing transport and token
    pub fn from_parts(
        transport: HttpTransport,
        token: SessionToken,
        config: Arc<EngineConfig>,
    ) -> Self {
        let authorization = Arc::from(token.authorization_header());
        Self {
            transport,
            token: Arc::new(token),
            authorization,
            config,
        }
    }

    /// The session token
    #[must_use]
    pub fn token(&self) -> &SessionToken {
        &self.token
    }

    /// The configuration the session was built from
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The transport shared by every operation of this session
    #[must_use]
    pub fn transport(&self) -> &HttpTransport {
        &self.transport
    }

    /// Whether the token expires within `threshold`
    #[must_use]
    pub fn is_token_stale(&self, threshold: Duration) -> bool {
        self.token.expires_within(threshold)
    }

    /// Perform a fresh handshake and return a new session
    ///
    /// The new session reuses this session's transport; `self` is untouched.
    #[instrument(skip_all)]
    pub async fn reauthenticate(&self, ctx: &CallContext) -> EngineResult<Self> {
        let token = authenticate(&self.transport, &self.config.credentials, ctx).await?;
        info!(expires_at = ?token.expires_at(), "Session re-authenticated");
        Ok(Self::from_parts(
            self.transport.clone(),
            token,
            Arc::clone(&self.config),
        ))
    }

    /// Run one operation as a single round trip
    pub async fn execute<V, T>(&self, operation: &Operation<V, T>, ctx: &CallContext) -> EngineResult<T>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        let body = operation
            .envelope()
            .context(format!("{}/{}", operation.resource(), operation.action()))?;
        execute(&self.transport, &self.round_trip(operation), body, ctx).await
    }

    /// Walk a paginated operation, binding each page's cursor into its variables
    ///
    /// See [`walk`] for the termination rules.
    #[instrument(
        skip_all,
        fields(resource = %operation.resource(), action = %operation.action(), limit = limit.get())
    )]
    pub async fn walk<V, T>(
        &self,
        operation: &Operation<V, T>,
        limit: PageLimit,
        ctx: &CallContext,
    ) -> WalkOutcome<T>
    where
        V: Serialize,
        T: DeserializeOwned + Paginated,
    {
        let round_trip = self.round_trip(operation);
        let round_trip = &round_trip;
        let transport = &self.transport;

        let mut outcome = walk(limit, ctx, |cursor: String| {
            let body = operation.envelope_with_cursor(&cursor);
            async move {
                match body {
                    Ok(body) => execute::<T>(transport, round_trip, body, ctx).await,
                    Err(diagnostics) => Err(diagnostics),
                }
            }
        })
        .await;

        let labels = format!("{}/{}", operation.resource(), operation.action());
        outcome.diagnostics = std::mem::take(&mut outcome.diagnostics).label_unlabelled(&labels);
        outcome
    }

    fn round_trip<'a, V, T>(&'a self, operation: &'a Operation<V, T>) -> RoundTrip<'a>
    where
        V: Serialize,
        T: DeserializeOwned,
    {
        RoundTrip {
            url: &self.config.api_url,
            authorization: &self.authorization,
            user_agent: &self.config.user_agent,
            resource: operation.resource(),
            action: operation.action(),
            debug_dumps: self.config.debug_dumps,
        }
    }
}
