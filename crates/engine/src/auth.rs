//! Auth session: exchanges long-lived credentials for a short-lived token
//!
//! The handshake happens once per session. The resulting [`SessionToken`] is
//! immutable; staleness is observable through its expiry, and a fresh token
//! requires a new handshake.

use crate::config::Credentials;
use crate::context::CallContext;
use crate::error::{transport_failure, EngineResult};
use crate::transport::HttpTransport;
use chrono::{DateTime, Utc};
use gqlrun_core::{quote, Diagnostic, ErrorCode};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, instrument, warn};
use uuid::Uuid;

/// Token endpoint success body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token
    pub access_token: String,
    /// Token type, usually `Bearer`
    pub token_type: String,
    /// Granted scope
    #[serde(default)]
    pub scope: Option<String>,
    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

/// Session token shared read-only by every operation of a session
#[derive(Clone, PartialEq, Eq)]
pub struct SessionToken {
    token_type: String,
    access_token: String,
    scope: Option<String>,
    issued_at: DateTime<Utc>,
    expires_at: Option<DateTime<Utc>>,
}

impl SessionToken {
    /// Create a token from a token endpoint response
    #[must_use]
    pub fn from_response(response: TokenResponse) -> Self {
        let issued_at = Utc::now();
        let expires_at = response
            .expires_in
            .and_then(|secs| i64::try_from(secs).ok())
            .and_then(chrono::Duration::try_seconds)
            .and_then(|lifetime| issued_at.checked_add_signed(lifetime));

        Self {
            token_type: response.token_type,
            access_token: response.access_token,
            scope: response.scope,
            issued_at,
            expires_at,
        }
    }

    /// Token type, e.g. `Bearer`
    #[must_use]
    pub fn token_type(&self) -> &str {
        &self.token_type
    }

    /// Opaque token value
    #[must_use]
    pub fn access_token(&self) -> &str {
        &self.access_token
    }

    /// Granted scope
    #[must_use]
    pub fn scope(&self) -> Option<&str> {
        self.scope.as_deref()
    }

    /// When the handshake completed
    #[must_use]
    pub fn issued_at(&self) -> DateTime<Utc> {
        self.issued_at
    }

    /// When the token expires, if the server said
    #[must_use]
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        self.expires_at
    }

    /// Whether the token has expired
    #[must_use]
    pub fn is_expired(&self) -> bool {
        self.expires_within(Duration::ZERO)
    }

    /// Whether the token expires within the given window
    ///
    /// Tokens without a reported lifetime never count as stale.
    #[must_use]
    pub fn expires_within(&self, window: Duration) -> bool {
        let Some(expires_at) = self.expires_at else {
            return false;
        };
        let Ok(window) = chrono::Duration::from_std(window) else {
            return true;
        };
        Utc::now()
            .checked_add_signed(window)
            .map_or(true, |horizon| horizon >= expires_at)
    }

    /// Remaining lifetime, if known and not yet elapsed
    #[must_use]
    pub fn time_until_expiry(&self) -> Option<Duration> {
        let remaining = self.expires_at? - Utc::now();
        remaining.to_std().ok()
    }

    /// `Authorization` header value: `<token_type> <access_token>`
    #[must_use]
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.access_token)
    }
}

impl std::fmt::Debug for SessionToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionToken")
            .field("token_type", &self.token_type)
            .field("access_token", &"<redacted>")
            .field("scope", &self.scope)
            .field("issued_at", &self.issued_at)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Perform the token handshake
///
/// Posts the form-encoded credentials to the token endpoint. Anything but an
/// HTTP 200 carrying `access_token` and `token_type` is an authentication
/// failure; no retry happens here beyond the transport's own policy. The
/// exchange is abandoned when `ctx` is cancelled or its deadline passes.
#[instrument(skip_all, fields(auth_url = %credentials.auth_url, request_id))]
pub async fn authenticate(
    transport: &HttpTransport,
    credentials: &Credentials,
    ctx: &CallContext,
) -> EngineResult<SessionToken> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", request_id.as_str());

    let form = [
        ("grant_type", credentials.grant_type.as_str()),
        ("client_id", credentials.client_id.as_str()),
        ("client_secret", credentials.client_secret.as_str()),
        ("audience", credentials.audience.as_str()),
    ];

    let request = transport
        .client()
        .post(&credentials.auth_url)
        .header(ACCEPT, "application/json")
        .header(crate::executor::X_REQUEST_ID, &request_id)
        .form(&form)
        .build()
        .map_err(|e| auth_failure(transport_failure(e)))?;

    debug!(request_id = %request_id, "Requesting session token");

    let response = match ctx.run(transport.send(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => return Err(auth_failure(transport_failure(e)).into()),
        Err(interruption) => {
            debug!(request_id = %request_id, "Token request interrupted");
            return Err(interruption.into());
        }
    };

    let status = response.status();
    let content_type = response
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let body = match ctx.run(response.text()).await {
        Ok(Ok(body)) => body,
        Ok(Err(e)) => return Err(auth_failure(transport_failure(e)).into()),
        Err(interruption) => return Err(interruption.into()),
    };

    if status != StatusCode::OK {
        warn!(request_id = %request_id, status = status.as_u16(), "Token endpoint rejected credentials");
        return Err(Diagnostic::authentication(format!(
            "token endpoint returned HTTP {}",
            status.as_u16()
        ))
        .with_detail(format!("content-type: {content_type}\n{}", quote(&body)))
        .into());
    }

    let token: TokenResponse = serde_json::from_str(&body).map_err(|e| {
        Diagnostic::new(
            ErrorCode::TokenMalformed,
            format!("token endpoint returned an unreadable body: {e}"),
        )
        .with_detail(body.clone())
        .with_source(e)
    })?;

    if token.access_token.is_empty() || token.token_type.is_empty() {
        return Err(Diagnostic::new(
            ErrorCode::TokenMalformed,
            "token endpoint response is missing access_token or token_type",
        )
        .into());
    }

    let token = SessionToken::from_response(token);
    debug!(
        request_id = %request_id,
        token_type = %token.token_type(),
        expires_at = ?token.expires_at(),
        "Session token acquired"
    );
    Ok(token)
}

fn auth_failure(diagnostic: Diagnostic) -> Diagnostic {
    Diagnostic {
        code: ErrorCode::AuthenticationFailed,
        ..diagnostic
    }
    .with_suggestion("Check that the token endpoint is reachable")
}
