//! End-to-end login and bearer flows against a mocked identity provider.

use std::collections::HashMap;
use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use mcpgate_server::storage::{self, Db};
use mcpgate_server::verifier::IdTokenVerifier;
use mcpgate_server::{AppConfig, AppState, build_router};

const SECRET: &[u8] = b"mcpgate-test-signing-secret-0001";
const KID: &str = "test-key";
const CLIENT_ID: &str = "client-123";
const BASE_URL: &str = "https://app.example.com";

struct Harness {
    idp: MockServer,
    db: Db,
    app: Router,
}

async fn harness() -> Harness {
    let idp = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/.well-known/jwks.json"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "keys": [{
                "kty": "oct",
                "kid": KID,
                "alg": "HS256",
                "k": URL_SAFE_NO_PAD.encode(SECRET),
            }]
        })))
        .mount(&idp)
        .await;

    let env: HashMap<&str, String> = HashMap::from([
        ("OAUTH_PROVIDER", "oidc".to_string()),
        ("OIDC_ISSUER", idp.uri()),
        ("OIDC_CLIENT_ID", CLIENT_ID.to_string()),
        ("OIDC_CLIENT_SECRET", "s3cret".to_string()),
        ("APP_BASE_URL", BASE_URL.to_string()),
    ]);
    let config = AppConfig::from_lookup(|key| env.get(key).cloned()).unwrap();

    let dir = tempfile::tempdir().unwrap();
    let db = storage::init_db(&dir.keep()).unwrap();

    let verifier = IdTokenVerifier::new(Arc::new(config.provider.clone()), reqwest::Client::new())
        .with_algorithms(vec![Algorithm::HS256]);
    let state = AppState::new(db.clone(), config)
        .unwrap()
        .with_verifier(verifier);

    Harness {
        idp,
        db,
        app: build_router(state),
    }
}

fn id_token(issuer: &str, nonce: Option<&str>, email: &str) -> String {
    let now = chrono::Utc::now().timestamp();
    let mut claims = json!({
        "iss": issuer,
        "aud": CLIENT_ID,
        "sub": "user-1",
        "email": email,
        "email_verified": true,
        "name": "Alice",
        "iat": now,
        "exp": now + 300,
    });
    if let Some(nonce) = nonce {
        claims["nonce"] = json!(nonce);
    }
    let mut header = Header::new(Algorithm::HS256);
    header.kid = Some(KID.to_string());
    encode(&header, &claims, &EncodingKey::from_secret(SECRET)).unwrap()
}

async fn get(app: &Router, uri: &str) -> axum::response::Response {
    app.clone()
        .oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Run `/auth/login` and return `(state, nonce)` from the redirect.
async fn start_login(app: &Router) -> (String, String) {
    let response = get(app, "/auth/login").await;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert!(response.headers().get(header::SET_COOKIE).is_none());

    let location = response.headers()[header::LOCATION].to_str().unwrap();
    let url = url::Url::parse(location).unwrap();
    let params: HashMap<String, String> = url.query_pairs().into_owned().collect();
    assert_eq!(params["client_id"], CLIENT_ID);
    assert_eq!(params["redirect_uri"], format!("{BASE_URL}/auth/callback"));
    assert_eq!(params["response_type"], "code");
    (params["state"].clone(), params["nonce"].clone())
}

#[tokio::test]
async fn unknown_state_is_rejected() {
    let h = harness().await;
    let response = get(&h.app, "/auth/callback?state=unknown&code=abc").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("session expired"));
}

#[tokio::test]
async fn provider_error_is_rejected_before_state() {
    let h = harness().await;
    let (state, _) = start_login(&h.app).await;
    let response = get(
        &h.app,
        &format!("/auth/callback?error=access_denied&state={state}"),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_string(response).await.contains("Authentication failed"));
}

#[tokio::test]
async fn missing_code_is_rejected() {
    let h = harness().await;
    let (state, _) = start_login(&h.app).await;
    let response = get(&h.app, &format!("/auth/callback?state={state}")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn failed_exchange_renders_error_and_persists_nothing() {
    let h = harness().await;
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({"error": "invalid_grant"})))
        .mount(&h.idp)
        .await;

    let (state, _) = start_login(&h.app).await;
    let response = get(&h.app, &format!("/auth/callback?state={state}&code=abc")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(!body_string(response).await.contains("invalid_grant"));
    assert_eq!(h.db.count_users().unwrap(), 0);
    assert_eq!(h.db.count_accounts().unwrap(), 0);
}

#[tokio::test]
async fn nonce_mismatch_fails_login() {
    let h = harness().await;
    let (state, _) = start_login(&h.app).await;
    let token = id_token(&h.idp.uri(), Some("not-the-nonce"), "alice@example.com");
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"id_token": token})))
        .mount(&h.idp)
        .await;

    let response = get(&h.app, &format!("/auth/callback?state={state}&code=abc")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(h.db.count_users().unwrap(), 0);
}

#[tokio::test]
async fn full_login_then_bearer_call() {
    let h = harness().await;
    let (state, nonce) = start_login(&h.app).await;
    let token = id_token(&h.idp.uri(), Some(&nonce), "alice@example.com");
    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "access_token": "at",
            "id_token": token,
            "token_type": "Bearer"
        })))
        .expect(1)
        .mount(&h.idp)
        .await;

    let callback = format!("/auth/callback?state={state}&code=abc");
    let response = get(&h.app, &callback).await;
    assert_eq!(response.status(), StatusCode::OK);
    let csp = response.headers()[header::CONTENT_SECURITY_POLICY]
        .to_str()
        .unwrap()
        .to_string();
    assert!(csp.contains("script-src 'unsafe-inline'"));
    let page = body_string(response).await;
    assert!(page.contains("authorization_response"));
    assert!(page.contains(&token));
    assert!(page.contains(BASE_URL));
    assert_eq!(h.db.count_users().unwrap(), 1);
    assert_eq!(h.db.count_accounts().unwrap(), 1);

    // state is single use
    let replay = get(&h.app, &callback).await;
    assert_eq!(replay.status(), StatusCode::BAD_REQUEST);

    let rpc = json!({
        "jsonrpc": "2.0",
        "id": 1,
        "method": "tools/call",
        "params": { "name": "whoami" }
    });
    let response = h
        .app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header(header::AUTHORIZATION, format!("bearer {token}"))
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(rpc.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    let text = body["result"]["content"][0]["text"].as_str().unwrap();
    assert!(text.contains("alice@example.com"));
    assert_eq!(h.db.count_users().unwrap(), 1);
}

#[tokio::test]
async fn mcp_requires_bearer() {
    let h = harness().await;
    let response = h
        .app
        .clone()
        .oneshot(Request::post("/mcp").body(Body::from("{}")).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert_eq!(
        challenge,
        format!("Bearer resource_metadata=\"{BASE_URL}/.well-known/oauth-protected-resource\"")
    );
}

#[tokio::test]
async fn invalid_bearer_is_401_and_subpaths_are_protected() {
    let h = harness().await;
    let response = h
        .app
        .clone()
        .oneshot(
            Request::get("/mcp/anything")
                .header(header::AUTHORIZATION, "Bearer not.a.jwt")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
    assert!(challenge.contains("error=\"invalid_token\""));
    assert_eq!(h.db.count_users().unwrap(), 0);
}

#[tokio::test]
async fn trailing_slash_is_protected() {
    let h = harness().await;
    for request in [
        Request::post("/mcp/").body(Body::from("{}")).unwrap(),
        Request::get("/mcp/").body(Body::empty()).unwrap(),
    ] {
        let response = h.app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let challenge = response.headers()[header::WWW_AUTHENTICATE].to_str().unwrap();
        assert!(challenge.starts_with("Bearer resource_metadata="));
    }

    let token = id_token(&h.idp.uri(), None, "carol@example.com");
    let response = h
        .app
        .clone()
        .oneshot(
            Request::post("/mcp/")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn null_id_gets_a_response() {
    let h = harness().await;
    let token = id_token(&h.idp.uri(), None, "dave@example.com");
    let response = h
        .app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "id": null, "method": "ping"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["id"], Value::Null);
    assert!(body.get("result").is_some());
}

#[tokio::test]
async fn notifications_are_accepted() {
    let h = harness().await;
    let token = id_token(&h.idp.uri(), None, "bob@example.com");
    let response = h
        .app
        .clone()
        .oneshot(
            Request::post("/mcp")
                .header(header::AUTHORIZATION, format!("Bearer {token}"))
                .body(Body::from(
                    json!({"jsonrpc": "2.0", "method": "notifications/initialized"}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
}

#[tokio::test]
async fn protected_resource_metadata() {
    let h = harness().await;
    for uri in [
        "/.well-known/oauth-protected-resource",
        "/.well-known/oauth-protected-resource/mcp",
    ] {
        let response = get(&h.app, uri).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-store");
        let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(body["resource"], format!("{BASE_URL}/mcp"));
        assert_eq!(body["authorization_servers"], json!([h.idp.uri()]));
    }
}

#[tokio::test]
async fn health_and_security_headers() {
    let h = harness().await;
    let response = get(&h.app, "/health").await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::X_CONTENT_TYPE_OPTIONS], "nosniff");
    assert_eq!(
        response.headers()[header::CONTENT_SECURITY_POLICY],
        mcpgate_server::routes::security::DEFAULT_CSP
    );
    let body: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(body["status"], "ok");
}
