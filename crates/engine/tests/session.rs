use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use gqlrun_engine::prelude::*;
use gqlrun_engine::X_REQUEST_ID;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use wiremock::matchers::{
    body_json, body_partial_json, body_string_contains, header, header_exists, method, path,
};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_test_writer()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

fn config(server: &MockServer) -> EngineConfig {
    EngineConfig::new(
        format!("{}/graphql", server.uri()),
        Credentials::new(format!("{}/token", server.uri()), "client-1", "s3cret", "api"),
    )
    .with_user_agent("gqlrun-tests")
    .with_transport(TransportConfig::default().with_retry(RetryConfig::new(
        3,
        Duration::from_millis(10),
        Duration::from_millis(40),
    )))
}

async fn mount_token(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "token_type": "Bearer",
            "scope": "read:all",
            "expires_in": 3600
        })))
        .mount(server)
        .await;
}

async fn connect(server: &MockServer) -> Session {
    init_tracing();
    mount_token(server).await;
    Session::connect(config(server), &CallContext::new()).await.unwrap()
}

fn users_page(cursor: Option<&str>, has_next_page: bool) -> serde_json::Value {
    json!({
        "data": {
            "users": {
                "nodes": [{"id": "u1"}],
                "pageInfo": {"endCursor": cursor, "hasNextPage": has_next_page}
            }
        }
    })
}

fn users_query() -> Operation<serde_json::Value, serde_json::Value> {
    Operation::query(
        "query($first: Int, $after: String) { users(first: $first, after: $after) { nodes { id } pageInfo { endCursor hasNextPage } } }",
        json!({"first": 1}),
    )
    .with_labels("user", "list")
}

#[tokio::test]
async fn test_handshake_posts_form_credentials() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(header_exists(X_REQUEST_ID))
        .and(body_string_contains("grant_type=client_credentials"))
        .and(body_string_contains("client_id=client-1"))
        .and(body_string_contains("client_secret=s3cret"))
        .and(body_string_contains("audience=api"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "tok",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .expect(1)
        .mount(&server)
        .await;

    let session = Session::connect(config(&server), &CallContext::new()).await.unwrap();
    assert_eq!(session.token().authorization_header(), "Bearer tok");
    assert!(session.token().expires_at().is_some());
    assert!(!session.is_token_stale(Duration::from_secs(60)));
    assert!(session.is_token_stale(Duration::from_secs(7200)));
}

#[tokio::test]
async fn test_auth_401_stops_before_any_api_call() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string(r#"{"error":"invalid_client"}"#))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = Session::connect(config(&server), &CallContext::new()).await.unwrap_err();
    assert!(err.contains_code(ErrorCode::AuthenticationFailed));
    let rendered = err.to_string();
    assert!(rendered.contains("401"));
    assert!(rendered.contains("invalid_client"));
}

#[tokio::test]
async fn test_malformed_token_body() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"token_type": "Bearer"})))
        .mount(&server)
        .await;

    let err = Session::connect(config(&server), &CallContext::new()).await.unwrap_err();
    assert!(err.contains_code(ErrorCode::TokenMalformed));
}

#[tokio::test]
async fn test_invalid_config_never_reaches_the_network() {
    init_tracing();
    let server = MockServer::start().await;
    Mock::given(path("/token"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let err = Session::connect(config(&server).with_api_url("ftp://nope"), &CallContext::new())
        .await
        .unwrap_err();
    assert!(err.contains_code(ErrorCode::ConfigInvalid));
}

#[tokio::test]
async fn test_round_trip_decodes_typed_destination() {
    #[derive(Debug, Serialize)]
    struct UserVars {
        id: String,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct UserData {
        user: User,
    }

    #[derive(Debug, PartialEq, Deserialize)]
    struct User {
        id: String,
        name: String,
    }

    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("authorization", "Bearer tok"))
        .and(header("user-agent", "gqlrun-tests"))
        .and(header("content-type", "application/json"))
        .and(header_exists(X_REQUEST_ID))
        .and(body_json(json!({
            "query": "query($id: ID!) { user(id: $id) { id name } }",
            "variables": {"id": "u1"}
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"id": "u1", "name": "Ada"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let op: Operation<_, UserData> = Operation::query(
        "query($id: ID!) { user(id: $id) { id name } }",
        UserVars {
            id: "u1".to_string(),
        },
    );
    let data = session.execute(&op, &CallContext::new()).await.unwrap();

    assert_eq!(
        data,
        UserData {
            user: User {
                id: "u1".to_string(),
                name: "Ada".to_string()
            }
        }
    );
}

#[tokio::test]
async fn test_mutation_variables_are_wrapped() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"input": {"name": "Ada"}}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"createUser": {"id": "u9"}}
        })))
        .expect(1)
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> = Operation::mutation(
        "mutation($input: CreateUserInput!) { createUser(input: $input) { id } }",
        json!({"name": "Ada"}),
    );
    let data = session.execute(&op, &CallContext::new()).await.unwrap();
    assert_eq!(data["createUser"]["id"], "u9");
}

#[tokio::test]
async fn test_api_errors_fail_despite_http_200() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"errors": [{"message": "not found"}]})),
        )
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> =
        Operation::query("query { user(id: \"x\") { id } }", json!({})).with_labels("user", "get");
    let err = session.execute(&op, &CallContext::new()).await.unwrap_err();

    assert!(err.contains_code(ErrorCode::ApiReported));
    let rendered = err.to_string();
    assert!(rendered.contains("not found"));
    assert!(rendered.contains("user/get"));
}

#[tokio::test]
async fn test_sparse_api_errors_are_still_api_reported() {
    let server = MockServer::start().await;
    let session = connect(&server).await;
    let op: Operation<_, serde_json::Value> =
        Operation::query("query { user(id: \"x\") { id } }", json!({})).with_labels("user", "get");

    let bodies = [
        json!({"errors": [{"message": "not found", "path": null}]}),
        json!({"errors": [{"extensions": {"code": "NOT_FOUND"}}]}),
        json!({"errors": [{
            "message": "lookup failed",
            "extensions": {"exception": {"message": "db down", "path": null}}
        }]}),
    ];

    for body in bodies {
        server.reset().await;
        Mock::given(path("/graphql"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body.clone()))
            .expect(1)
            .mount(&server)
            .await;

        let err = session.execute(&op, &CallContext::new()).await.unwrap_err();
        assert!(err.contains_code(ErrorCode::ApiReported), "{body}: {err}");
        assert!(!err.contains_code(ErrorCode::DecodeFailure), "{body}: {err}");
    }
}

#[tokio::test]
async fn test_api_errors_win_over_partial_data() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "data": {"user": {"id": "u1"}},
            "errors": [{
                "message": "Internal server error",
                "path": ["user", "team"],
                "extensions": {"code": "INTERNAL", "exception": {"message": "team lookup failed"}}
            }]
        })))
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> = Operation::query("query { user { id team } }", ());
    let err = session.execute(&op, &CallContext::new()).await.unwrap_err();
    let rendered = err.to_string();
    assert!(rendered.contains("team lookup failed"));
    assert!(rendered.contains("user.team"));
}

#[tokio::test]
async fn test_non_200_is_failure_without_decode() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(400).set_body_json(json!({"data": {"user": {"id": "u1"}}})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> =
        Operation::query("query { user { id } }", ()).with_labels("user", "get");
    let err = session.execute(&op, &CallContext::new()).await.unwrap_err();

    assert_eq!(err.len(), 1);
    assert!(err.contains_code(ErrorCode::HttpStatus));
    assert!(!err.contains_code(ErrorCode::DecodeFailure));
    assert!(err.to_string().contains("400"));
}

#[tokio::test]
async fn test_malformed_body_is_decode_failure() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_string("{\"data\": "))
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> = Operation::query("query { me { id } }", ());
    let err = session.execute(&op, &CallContext::new()).await.unwrap_err();
    assert!(err.contains_code(ErrorCode::DecodeFailure));
}

#[tokio::test]
async fn test_debug_dumps_attach_exchange() {
    init_tracing();
    let server = MockServer::start().await;
    mount_token(&server).await;
    let session = Session::connect(config(&server).with_debug_dumps(true), &CallContext::new())
        .await
        .unwrap();

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(404).set_body_string("no such endpoint"))
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> = Operation::query("query { me { id } }", ());
    let err = session.execute(&op, &CallContext::new()).await.unwrap_err();
    let detail = err.first().and_then(|d| d.detail.clone()).unwrap();

    assert!(detail.contains("--- request ---"));
    assert!(detail.contains("authorization: Bearer tok"));
    assert!(detail.contains("no such endpoint"));
}

#[tokio::test]
async fn test_transient_503_is_retried() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(503))
        .up_to_n_times(1)
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"ok": true}})))
        .expect(1)
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> = Operation::query("query { ok }", ());
    let data = session.execute(&op, &CallContext::new()).await.unwrap();
    assert_eq!(data, json!({"ok": true}));
}

#[tokio::test]
async fn test_exhausted_retries_surface_last_status() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(502))
        .expect(3)
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> = Operation::query("query { ok }", ());
    let err = session.execute(&op, &CallContext::new()).await.unwrap_err();
    assert!(err.contains_code(ErrorCode::HttpStatus));
    assert!(err.to_string().contains("502"));
}

#[tokio::test]
async fn test_deadline_abandons_round_trip() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"data": {}}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> = Operation::query("query { slow }", ());
    let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
    let err = session.execute(&op, &ctx).await.unwrap_err();

    assert!(err.contains_code(ErrorCode::DeadlineExceeded));
    assert!(err.is_cancellation());
}

#[tokio::test]
async fn test_deadline_abandons_token_handshake() {
    init_tracing();
    let server = MockServer::start().await;

    Mock::given(path("/token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok", "token_type": "Bearer"}))
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&server)
        .await;
    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let ctx = CallContext::new().with_timeout(Duration::from_millis(50));
    let err = Session::connect(config(&server), &ctx).await.unwrap_err();

    assert!(err.contains_code(ErrorCode::DeadlineExceeded));
    assert!(!err.contains_code(ErrorCode::AuthenticationFailed));
}

#[tokio::test]
async fn test_cancelled_context_skips_reauthentication() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    let token = CancellationToken::new();
    token.cancel();
    let err = session
        .reauthenticate(&CallContext::with_cancellation(token))
        .await
        .unwrap_err();

    assert!(err.contains_code(ErrorCode::Cancelled));
    assert_eq!(session.token().access_token(), "tok");
}

#[tokio::test]
async fn test_cancellation_mid_walk_keeps_earlier_pages() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"after": "c1"}})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(users_page(Some("c2"), true))
                .set_delay(Duration::from_secs(5)),
        )
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(users_page(Some("c1"), true)))
        .mount(&server)
        .await;

    let token = CancellationToken::new();
    let ctx = CallContext::with_cancellation(token.clone());
    let op = users_query();

    let canceller = async {
        tokio::time::sleep(Duration::from_millis(300)).await;
        token.cancel();
    };
    let (outcome, ()) = tokio::join!(session.walk(&op, PageLimit::new(5), &ctx), canceller);

    assert_eq!(outcome.pages.len(), 1);
    assert!(outcome.diagnostics.contains_code(ErrorCode::Cancelled));
    assert!(outcome.diagnostics.to_string().contains("user/list"));
}

#[tokio::test]
async fn test_walk_page_limit_wins_over_has_next_page() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(users_page(Some("cursor123"), true)))
        .expect(1)
        .mount(&server)
        .await;

    let outcome = session
        .walk(&users_query(), PageLimit::new(1), &CallContext::new())
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.pages.len(), 1);
    assert_eq!(
        outcome.pages[0]["users"]["pageInfo"]["endCursor"],
        "cursor123"
    );
}

#[tokio::test]
async fn test_walk_performs_exactly_n_fetches() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(users_page(Some("again"), true)))
        .expect(4)
        .mount(&server)
        .await;

    let outcome = session
        .walk(&users_query(), PageLimit::new(4), &CallContext::new())
        .await;

    assert!(outcome.is_complete());
    assert_eq!(outcome.pages.len(), 4);
}

/// Serves scripted pages in order and checks the cursor each request carries
struct PagedUsers {
    calls: Arc<AtomicUsize>,
    pages: Vec<(Option<&'static str>, Option<&'static str>, bool)>,
}

impl Respond for PagedUsers {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let index = self.calls.fetch_add(1, Ordering::SeqCst);
        let Some((expected_after, cursor, has_next)) = self.pages.get(index) else {
            return ResponseTemplate::new(500);
        };

        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap_or_default();
        let after = body["variables"]["after"].as_str();
        if after != *expected_after {
            return ResponseTemplate::new(400).set_body_string(format!("unexpected cursor {after:?}"));
        }

        ResponseTemplate::new(200).set_body_json(users_page(*cursor, *has_next))
    }
}

#[tokio::test]
async fn test_walk_natural_end_after_two_pages() {
    let server = MockServer::start().await;
    let session = connect(&server).await;
    let calls = Arc::new(AtomicUsize::new(0));

    Mock::given(path("/graphql"))
        .respond_with(PagedUsers {
            calls: Arc::clone(&calls),
            pages: vec![(None, Some("c1"), true), (Some("c1"), Some("c2"), false)],
        })
        .mount(&server)
        .await;

    let outcome = session
        .walk(&users_query(), PageLimit::new(10), &CallContext::new())
        .await;

    assert!(outcome.is_complete(), "{}", outcome.diagnostics);
    assert_eq!(outcome.pages.len(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_walk_failure_returns_partial_pages() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .and(body_partial_json(json!({"variables": {"after": "c1"}})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "errors": [{"message": "cursor expired"}]
        })))
        .with_priority(1)
        .mount(&server)
        .await;
    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(users_page(Some("c1"), true)))
        .mount(&server)
        .await;

    let outcome = session
        .walk(&users_query(), PageLimit::new(10), &CallContext::new())
        .await;

    assert!(!outcome.is_complete());
    assert_eq!(outcome.pages.len(), 1);
    assert!(outcome.diagnostics.to_string().contains("cursor expired"));
    assert!(outcome.into_result().is_err());
}

#[tokio::test]
async fn test_walk_on_unpaginated_destination() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    Mock::given(path("/graphql"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"me": {"id": "u1"}}})))
        .mount(&server)
        .await;

    let op: Operation<_, serde_json::Value> =
        Operation::query("query { me { id } }", ()).with_labels("user", "me");
    let outcome = session.walk(&op, PageLimit::new(3), &CallContext::new()).await;

    assert!(outcome.diagnostics.contains_code(ErrorCode::NotPaginated));
    assert!(outcome.diagnostics.to_string().contains("user/me"));
}

#[tokio::test]
async fn test_reauthenticate_returns_fresh_session() {
    let server = MockServer::start().await;
    let session = connect(&server).await;

    let fresh = session.reauthenticate(&CallContext::new()).await.unwrap();
    assert_eq!(fresh.token().access_token(), "tok");
    assert!(fresh.token().issued_at() >= session.token().issued_at());

    let requests = server.received_requests().await.unwrap_or_default();
    let handshakes = requests.iter().filter(|r| r.url.path() == "/token").count();
    assert_eq!(handshakes, 2);
}
