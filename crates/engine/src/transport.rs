//! Transport factory: builds HTTP clients with trusted CAs, proxy, pool
//! limits and a bounded retry policy
//!
//! Misconfigured CA bundles and proxy addresses are logged and ignored rather
//! than failing the factory; validating them is the caller's job.

use crate::config::TransportConfig;
use crate::error::EngineResult;
use gqlrun_core::{Diagnostic, ErrorCode, RetryConfig};
use reqwest::{Certificate, Client, Proxy, Request, Response, StatusCode};
use std::time::Instant;
use tracing::{debug, warn};

/// Builds [`HttpTransport`]s from configuration
///
/// Each call produces an independent client with its own connection pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct TransportFactory;

impl TransportFactory {
    /// Build a ready-to-use transport
    pub fn build(config: &TransportConfig) -> EngineResult<HttpTransport> {
        let roots = trusted_roots(config.ca_bundle.as_deref());
        let proxy = configured_proxy(config);

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_connections_per_host);

        for root in &roots {
            builder = builder.add_root_certificate(root.clone());
        }

        let proxy_active = proxy.is_some();
        builder = match proxy {
            Some(proxy) => builder.proxy(proxy),
            None => builder.no_proxy(),
        };

        let client = builder.build().map_err(|e| {
            Diagnostic::new(
                ErrorCode::ClientBuild,
                format!("Failed to build HTTP client: {e}"),
            )
            .with_source(e)
        })?;

        debug!(
            extra_roots = roots.len(),
            proxy_active,
            max_attempts = config.retry.attempts(),
            "HTTP transport ready"
        );

        Ok(HttpTransport {
            client,
            retry: config.retry.clone(),
            proxy_active,
            extra_roots: roots.len(),
        })
    }
}

/// HTTP client plus the retry policy applied to every send
///
/// Cheap to clone; clones share the connection pool. Safe for concurrent use.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    retry: RetryConfig,
    proxy_active: bool,
    extra_roots: usize,
}

impl HttpTransport {
    /// The underlying client, for building requests
    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Retry policy applied by [`HttpTransport::send`]
    #[must_use]
    pub fn retry(&self) -> &RetryConfig {
        &self.retry
    }

    /// Whether requests are routed through a proxy
    #[must_use]
    pub fn proxy_active(&self) -> bool {
        self.proxy_active
    }

    /// Number of CA certificates added on top of the built-in roots
    #[must_use]
    pub fn extra_roots(&self) -> usize {
        self.extra_roots
    }

    /// Send a request, retrying transient failures
    ///
    /// Connection errors, timeouts, HTTP 429 and 5xx (except 501) are retried
    /// until the attempt budget is spent. The final attempt's outcome is
    /// returned as-is, so an exhausted retry surfaces as a normal response
    /// or network error. Requests whose body cannot be cloned get one attempt.
    pub async fn send(&self, request: Request) -> Result<Response, reqwest::Error> {
        let attempts = self.retry.attempts();
        let url = request.url().clone();
        let mut attempt: u32 = 0;

        loop {
            if attempt > 0 {
                let delay = self.retry.delay_for_attempt(attempt);
                debug!(
                    url = %url,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis(),
                    "Retrying after delay"
                );
                tokio::time::sleep(delay).await;
            }

            let is_last = attempt + 1 >= attempts;
            let Some(this_try) = (if is_last { None } else { request.try_clone() }) else {
                return self.client.execute(request).await;
            };

            let start = Instant::now();
            match self.client.execute(this_try).await {
                Ok(response) if is_retryable_status(response.status()) => {
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        status = response.status().as_u16(),
                        elapsed_ms = start.elapsed().as_millis(),
                        "Transient HTTP status, will retry"
                    );
                }
                Ok(response) => return Ok(response),
                Err(e) if is_retryable_error(&e) => {
                    warn!(
                        url = %url,
                        attempt = attempt + 1,
                        error = %e,
                        "Transport error, will retry"
                    );
                }
                Err(e) => return Err(e),
            }

            attempt += 1;
        }
    }
}

/// Whether an HTTP status is worth another attempt
#[must_use]
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS
        || (status.is_server_error() && status != StatusCode::NOT_IMPLEMENTED)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_connect() || err.is_timeout() || err.is_request()
}

fn trusted_roots(bundle: Option<&str>) -> Vec<Certificate> {
    let Some(pem) = bundle.filter(|pem| !pem.trim().is_empty()) else {
        return Vec::new();
    };

    match Certificate::from_pem_bundle(pem.as_bytes()) {
        Ok(certs) => {
            if certs.is_empty() {
                warn!("CA bundle contained no certificates; using system roots only");
            }
            certs
        }
        Err(e) => {
            warn!(error = %e, "Ignoring unparsable CA bundle; using system roots only");
            Vec::new()
        }
    }
}

fn configured_proxy(config: &TransportConfig) -> Option<Proxy> {
    if !config.proxy_enabled {
        return None;
    }

    let Some(url) = config.proxy_url.as_deref().filter(|url| !url.is_empty()) else {
        warn!("Proxy enabled without an address; connecting directly");
        return None;
    };

    match Proxy::all(url) {
        Ok(proxy) => Some(proxy),
        Err(e) => {
            warn!(proxy_url = %url, error = %e, "Ignoring unparsable proxy URL; connecting directly");
            None
        }
    }
}
