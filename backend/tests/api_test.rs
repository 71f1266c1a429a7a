use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use agentgate_backend::auth::session::SessionClaims;
use agentgate_backend::test_util::{
    discovery_json, generate_id_token, jwks_json, test_config, IdTokenParams, TEST_AUDIENCE,
    TEST_KID,
};
use agentgate_backend::{
    routes, AgentClient, AppState, GoogleVerifier, IpRateLimiter, QuotaManager, SessionSigner,
    UserStore,
};
use axum::extract::ConnectInfo;
use bytes::Bytes;
use chrono::Utc;
use http::StatusCode;
use jsonwebtoken::{encode, EncodingKey, Header};
use serde_json::{json, Value};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

const AGENT_REPLY: &str = "Here is the analysis you asked for.";

async fn mount_google(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path("/.well-known/openid-configuration"))
        .respond_with(ResponseTemplate::new(200).set_body_json(discovery_json(&format!(
            "{}/.well-known/jwks.json",
            server.uri()
        ))))
        .mount(server)
        .await;

    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(jwks_json()))
        .mount(server)
        .await;
}

async fn mount_agent(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "response": AGENT_REPLY
        })))
        .mount(server)
        .await;
}

/// Full application state against stand-in Google and agent servers.
async fn create_test_state(google: &MockServer, agent: &MockServer) -> Arc<AppState> {
    let config = test_config(&google.uri(), &agent.uri());

    let verifier = GoogleVerifier::new(&config.google_issuer, &config.google_client_id)
        .await
        .unwrap();
    let sessions = SessionSigner::new(&config.session_secret);
    let users = Arc::new(UserStore::new(&config.database_url).unwrap());
    let quota = QuotaManager::new(users.clone(), config.daily_query_limit);
    let rate_limiter = IpRateLimiter::new(config.rate_limit_per_minute);
    let agent_client = AgentClient::new(
        &config.agent_base_url,
        Duration::from_secs(config.agent_timeout_secs),
    );

    Arc::new(AppState {
        config,
        google: verifier,
        sessions,
        users,
        quota,
        rate_limiter,
        agent: agent_client,
    })
}

fn app(state: Arc<AppState>) -> axum::Router {
    axum::Router::new()
        .merge(routes::health::router())
        .merge(routes::auth::router(state.clone()))
        .merge(routes::chat::router(state))
}

async fn send_request(
    app: &axum::Router,
    method: http::Method,
    uri: &str,
    bearer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let peer: SocketAddr = "127.0.0.1:55555".parse().unwrap();

    let mut req_builder = http::Request::builder()
        .method(method)
        .uri(uri)
        .extension(ConnectInfo(peer));

    if let Some(token) = bearer {
        req_builder = req_builder.header("Authorization", format!("Bearer {token}"));
    }

    let req = if let Some(body) = body {
        req_builder
            .header("Content-Type", "application/json")
            .body(axum::body::Body::from(Bytes::from(body.to_string())))
            .unwrap()
    } else {
        req_builder.body(axum::body::Body::empty()).unwrap()
    };

    let response = app.clone().oneshot(req).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };

    (status, json)
}

fn valid_id_token(issuer: &str, subject: &str) -> String {
    generate_id_token(IdTokenParams {
        subject,
        email: Some("user@example.com"),
        name: Some("Test User"),
        issuer,
        audience: TEST_AUDIENCE,
        expires_at: Utc::now() + chrono::Duration::hours(1),
        kid: TEST_KID,
    })
}

/// Sign in and return the session token from the response.
async fn sign_in(app: &axum::Router, issuer: &str, subject: &str) -> String {
    let (status, body) = send_request(
        app,
        http::Method::POST,
        "/auth/google",
        None,
        Some(json!({ "id_token": valid_id_token(issuer, subject) })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["access_token"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn test_health() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let app = app(create_test_state(&google, &agent).await);

    let (status, body) = send_request(&app, http::Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn test_root_lists_endpoints() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let app = app(create_test_state(&google, &agent).await);

    let (status, body) = send_request(&app, http::Method::GET, "/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["endpoints"]["chat"], "/chat");
}

#[tokio::test]
async fn test_auth_issues_session_and_reports_quota() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let state = create_test_state(&google, &agent).await;
    let app = app(state.clone());

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/auth/google",
        None,
        Some(json!({ "id_token": valid_id_token(&google.uri(), "google-123") })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["token_type"], "bearer");
    assert_eq!(body["user_id"], "google-123");
    assert_eq!(body["email"], "user@example.com");
    assert_eq!(body["queries_remaining"], 3);
    assert!(!body["access_token"].as_str().unwrap().is_empty());

    // The session token is valid for protected endpoints
    let token = body["access_token"].as_str().unwrap();
    let claims = state.sessions.validate(token).unwrap();
    assert_eq!(claims.sub, "google-123");

    // And the user record was created with a zeroed counter
    let user = state.users.get("google-123").unwrap().unwrap();
    assert_eq!(user.queries_used_today, 0);
}

#[tokio::test]
async fn test_auth_rejects_malformed_token_and_creates_no_user() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let state = create_test_state(&google, &agent).await;
    let app = app(state.clone());

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/auth/google",
        None,
        Some(json!({ "id_token": "definitely-not-a-jwt" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "invalid_id_token");
    assert!(state.users.get("google-123").unwrap().is_none());
}

#[tokio::test]
async fn test_auth_rejects_expired_id_token() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let app = app(create_test_state(&google, &agent).await);

    let token = generate_id_token(IdTokenParams {
        subject: "google-123",
        email: None,
        name: None,
        issuer: &google.uri(),
        audience: TEST_AUDIENCE,
        expires_at: Utc::now() - chrono::Duration::hours(2),
        kid: TEST_KID,
    });

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/auth/google",
        None,
        Some(json!({ "id_token": token })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "expired_id_token");
}

#[tokio::test]
async fn test_chat_spends_daily_quota_then_fails_closed() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    mount_agent(&agent).await;
    let app = app(create_test_state(&google, &agent).await);

    let token = sign_in(&app, &google.uri(), "google-123").await;

    for expected_remaining in [2, 1, 0] {
        let (status, body) = send_request(
            &app,
            http::Method::POST,
            "/chat",
            Some(&token),
            Some(json!({ "message": "what should I look at today?" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["response"], AGENT_REPLY);
        assert_eq!(body["queries_remaining"], expected_remaining);
        assert_eq!(body["user_id"], "google-123");
        assert!(body["message_id"].as_str().unwrap().starts_with("msg_"));
    }

    // Fourth call of the day: quota 429, distinguishable from rate limiting
    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/chat",
        Some(&token),
        Some(json!({ "message": "one more?" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["type"], "quota_exceeded");
}

#[tokio::test]
async fn test_chat_day_rollover_grants_fresh_allowance() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    mount_agent(&agent).await;
    let state = create_test_state(&google, &agent).await;
    let app = app(state.clone());

    let token = sign_in(&app, &google.uri(), "google-123").await;

    // Yesterday ended with the allowance exhausted
    let yesterday = Utc::now().date_naive().pred_opt().unwrap();
    state
        .users
        .update_usage("google-123", 3, Some(yesterday))
        .unwrap();

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/chat",
        Some(&token),
        Some(json!({ "message": "good morning" })),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queries_remaining"], 2);
}

#[tokio::test]
async fn test_chat_requires_session() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let app = app(create_test_state(&google, &agent).await);

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/chat",
        None,
        Some(json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "invalid_session");
}

#[tokio::test]
async fn test_chat_rejects_expired_session() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let state = create_test_state(&google, &agent).await;
    let app = app(state.clone());

    let now = Utc::now().timestamp();
    let claims = SessionClaims {
        sub: "google-123".to_string(),
        email: None,
        iat: now - 7200,
        exp: now - 3600,
    };
    let expired = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.config.session_secret.as_bytes()),
    )
    .unwrap();

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/chat",
        Some(&expired),
        Some(json!({ "message": "hello" })),
    )
    .await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["type"], "expired_session");
}

#[tokio::test]
async fn test_chat_validates_message_and_spends_nothing() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    mount_agent(&agent).await;
    let state = create_test_state(&google, &agent).await;
    let app = app(state.clone());

    let token = sign_in(&app, &google.uri(), "google-123").await;

    for message in ["", &"x".repeat(1001)] {
        let (status, body) = send_request(
            &app,
            http::Method::POST,
            "/chat",
            Some(&token),
            Some(json!({ "message": message })),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"]["type"], "validation_error");
    }

    // Rejected messages never reach the quota
    let user = state.users.get("google-123").unwrap().unwrap();
    assert_eq!(user.queries_used_today, 0);
}

#[tokio::test]
async fn test_rate_limited_429_is_distinguishable() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let app = app(create_test_state(&google, &agent).await);

    // Limit is 10/minute per IP; the first ten are ordinary 401s
    for _ in 0..10 {
        let (status, _) = send_request(
            &app,
            http::Method::POST,
            "/auth/google",
            None,
            Some(json!({ "id_token": "garbage" })),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/auth/google",
        None,
        Some(json!({ "id_token": "garbage" })),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["type"], "rate_limited");
}

#[tokio::test]
async fn test_profile_reports_usage_without_spending() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    mount_agent(&agent).await;
    let app = app(create_test_state(&google, &agent).await);

    let token = sign_in(&app, &google.uri(), "google-123").await;

    send_request(
        &app,
        http::Method::POST,
        "/chat",
        Some(&token),
        Some(json!({ "message": "hello" })),
    )
    .await;

    for _ in 0..2 {
        let (status, body) =
            send_request(&app, http::Method::GET, "/auth/profile", Some(&token), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], "google-123");
        assert_eq!(body["queries_used_today"], 1);
        assert_eq!(body["queries_remaining"], 2);
        assert!(body["last_query_date"].is_string());
    }
}

#[tokio::test]
async fn test_profile_exhausted_reports_zero_not_429() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    let state = create_test_state(&google, &agent).await;
    let app = app(state.clone());

    let token = sign_in(&app, &google.uri(), "google-123").await;
    state
        .users
        .update_usage("google-123", 3, Some(Utc::now().date_naive()))
        .unwrap();

    let (status, body) =
        send_request(&app, http::Method::GET, "/auth/profile", Some(&token), None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["queries_used_today"], 3);
    assert_eq!(body["queries_remaining"], 0);
}

#[tokio::test]
async fn test_agent_failure_does_not_refund_quota() {
    let google = MockServer::start().await;
    let agent = MockServer::start().await;
    mount_google(&google).await;
    Mock::given(method("POST"))
        .and(path("/run"))
        .respond_with(ResponseTemplate::new(500).set_body_string("agent crashed"))
        .mount(&agent)
        .await;

    let state = create_test_state(&google, &agent).await;
    let app = app(state.clone());

    let token = sign_in(&app, &google.uri(), "google-123").await;

    let (status, body) = send_request(
        &app,
        http::Method::POST,
        "/chat",
        Some(&token),
        Some(json!({ "message": "hello" })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(body["error"]["type"], "internal_error");

    // Accepted trade-off: the charge stays spent
    let user = state.users.get("google-123").unwrap().unwrap();
    assert_eq!(user.queries_used_today, 1);
}
