//! Round-trip executor: one authenticated POST, status check and decode
//!
//! Every failure path returns labelled diagnostics. The raw exchange is
//! always logged at `trace` level and attached to diagnostics when debug
//! dumps are enabled.

use crate::context::CallContext;
use crate::error::{null_as_default, render_api_errors, transport_failure, ApiError, EngineResult};
use crate::transport::HttpTransport;
use gqlrun_core::{quote, Diagnostic, ErrorCode};
use reqwest::header::{HeaderMap, ACCEPT, AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::{Request, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::fmt::Write as _;
use std::time::Instant;
use tracing::{debug, instrument, trace, warn};
use uuid::Uuid;

/// Correlation header sent with every request
pub const X_REQUEST_ID: &str = "X-Request-ID";

/// Decoded response body: caller data plus server-reported errors
#[derive(Debug, Deserialize)]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct ResponsePayload<T> {
    /// Caller data, absent when the server failed the whole operation
    #[serde(default)]
    pub data: Option<T>,
    /// Server-reported errors in order
    #[serde(default, deserialize_with = "null_as_default")]
    pub errors: Vec<ApiError>,
}

/// Everything about the target of a round trip except the body
#[derive(Debug, Clone, Copy)]
pub struct RoundTrip<'a> {
    /// API endpoint URL
    pub url: &'a str,
    /// `Authorization` header value
    pub authorization: &'a str,
    /// `User-Agent` header value
    pub user_agent: &'a str,
    /// Resource label for diagnostics
    pub resource: &'a str,
    /// Operation label for diagnostics
    pub action: &'a str,
    /// Attach raw exchange dumps to diagnostics
    pub debug_dumps: bool,
}

impl RoundTrip<'_> {
    fn label(&self, diagnostic: Diagnostic) -> Diagnostic {
        diagnostic.with_labels(self.resource, self.action)
    }
}

/// Raw request and response captured for diagnosis
#[derive(Debug, Default)]
struct Exchange {
    request: String,
    response: String,
}

impl Exchange {
    fn attach(&self, diagnostic: Diagnostic, enabled: bool) -> Diagnostic {
        if !enabled {
            return diagnostic;
        }
        diagnostic.append_detail(format!(
            "--- request ---\n{}\n--- response ---\n{}",
            quote(&self.request),
            quote(&self.response)
        ))
    }
}

/// Send one serialized envelope and decode the response `data` into `T`
///
/// Non-200 statuses are failures without decoding. A 200 whose `errors`
/// array is non-empty is a failure too; any partially decoded `data` is
/// discarded.
#[instrument(
    skip_all,
    fields(resource = %round_trip.resource, action = %round_trip.action, request_id)
)]
pub async fn execute<T: DeserializeOwned>(
    transport: &HttpTransport,
    round_trip: &RoundTrip<'_>,
    body: Vec<u8>,
    ctx: &CallContext,
) -> EngineResult<T> {
    let request_id = Uuid::new_v4().to_string();
    tracing::Span::current().record("request_id", request_id.as_str());

    let request = transport
        .client()
        .post(round_trip.url)
        .header(USER_AGENT, round_trip.user_agent)
        .header(AUTHORIZATION, round_trip.authorization)
        .header(CONTENT_TYPE, "application/json")
        .header(ACCEPT, "application/json")
        .header(X_REQUEST_ID, &request_id)
        .body(body)
        .build()
        .map_err(|e| round_trip.label(transport_failure(e)))?;

    let mut exchange = Exchange {
        request: dump_request(&request),
        ..Exchange::default()
    };

    debug!(request_id = %request_id, url = %round_trip.url, "Sending request");
    let start = Instant::now();

    let response = match ctx.run(transport.send(request)).await {
        Ok(Ok(response)) => response,
        Ok(Err(e)) => {
            warn!(request_id = %request_id, error = %e, "Request failed");
            return Err(round_trip.label(transport_failure(e)).into());
        }
        Err(interruption) => {
            debug!(request_id = %request_id, "Round trip interrupted");
            return Err(round_trip.label(interruption).into());
        }
    };

    let status = response.status();
    let head = dump_head(status, response.headers());
    let bytes = match ctx.run(response.bytes()).await {
        Ok(Ok(bytes)) => bytes,
        Ok(Err(e)) => return Err(round_trip.label(transport_failure(e)).into()),
        Err(interruption) => return Err(round_trip.label(interruption).into()),
    };
    let text = String::from_utf8_lossy(&bytes);
    exchange.response = format!("{head}\n{text}");

    debug!(
        request_id = %request_id,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis(),
        "Response received"
    );
    trace!(
        request_id = %request_id,
        request = %exchange.request,
        response = %exchange.response,
        "Round trip dump"
    );

    if status != StatusCode::OK {
        let diagnostic = round_trip
            .label(Diagnostic::http_status(status.as_u16()))
            .with_detail(format!("status: {status}\n{}", quote(&text)));
        return Err(exchange.attach(diagnostic, round_trip.debug_dumps).into());
    }

    let payload: ResponsePayload<T> = serde_json::from_slice(&bytes).map_err(|e| {
        let diagnostic = round_trip
            .label(Diagnostic::decode(format!("response body is not a valid payload: {e}")))
            .with_detail(quote(&text))
            .with_source(e);
        exchange.attach(diagnostic, round_trip.debug_dumps)
    })?;

    if !payload.errors.is_empty() {
        warn!(
            request_id = %request_id,
            errors = payload.errors.len(),
            "API reported errors"
        );
        let diagnostic = round_trip
            .label(Diagnostic::new(
                ErrorCode::ApiReported,
                format!("API reported {} error(s)", payload.errors.len()),
            ))
            .with_detail(render_api_errors(&payload.errors));
        return Err(exchange.attach(diagnostic, round_trip.debug_dumps).into());
    }

    payload.data.ok_or_else(|| {
        let diagnostic = round_trip.label(Diagnostic::new(
            ErrorCode::MissingData,
            "response carried neither data nor errors",
        ));
        exchange.attach(diagnostic, round_trip.debug_dumps).into()
    })
}

fn dump_request(request: &Request) -> String {
    let mut dump = format!("{} {}\n", request.method(), request.url());
    write_headers(&mut dump, request.headers());
    if let Some(body) = request.body().and_then(reqwest::Body::as_bytes) {
        dump.push('\n');
        dump.push_str(&String::from_utf8_lossy(body));
    }
    dump
}

fn dump_head(status: StatusCode, headers: &HeaderMap) -> String {
    let mut dump = format!("HTTP {status}\n");
    write_headers(&mut dump, headers);
    dump
}

fn write_headers(dump: &mut String, headers: &HeaderMap) {
    for (name, value) in headers {
        let _ = writeln!(dump, "{name}: {}", value.to_str().unwrap_or("<binary>"));
    }
}
