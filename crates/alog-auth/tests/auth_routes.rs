//! End-to-end tests for the `/auth/*` routes against a mocked identity
//! provider.

use std::sync::Arc;

use alog_auth::federation::HttpIdentityProvider;
use alog_auth::handlers;
use alog_auth::middleware::AuthStorage;
use alog_auth::{AuthConfig, AuthState, ProviderConfig};
use alog_core::{NewUser, UserStorage};
use alog_db_memory::MemoryStore;
use axum::Router;
use axum::body::{Body, to_bytes};
use axum::http::{Request, StatusCode, header};
use axum::response::Response;
use base64::{Engine, engine::general_purpose::STANDARD};
use cookie::Cookie;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
    _idp: MockServer,
}

async fn mock_provider(sub: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/oauth2/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "idp-access",
            "token_type": "Bearer",
            "expires_in": 3600
        })))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/userinfo"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "sub": sub,
            "email": "kim@example.com",
            "email_verified": true,
            "name": "Kim",
            "preferred_username": "kim"
        })))
        .mount(&server)
        .await;
    server
}

async fn test_app() -> TestApp {
    let idp = mock_provider("1").await;
    let store = Arc::new(MemoryStore::new());
    UserStorage::create(
        store.as_ref(),
        NewUser {
            id: 1,
            name: "Kim".into(),
            handle: "kim".into(),
            profile_image: String::new(),
            email: None,
        },
    )
    .await
    .unwrap();

    let config = AuthConfig {
        signing_secret: Some(STANDARD.encode([11u8; 48])),
        provider: ProviderConfig {
            base_url: idp.uri(),
            client_id: "alog".into(),
            client_secret: Some("s3cret".into()),
            ..Default::default()
        },
        ..Default::default()
    };
    let provider = Arc::new(HttpIdentityProvider::new(&config.provider).unwrap());
    let storage = AuthStorage {
        users: store.clone(),
        oauth_states: store.clone(),
        sessions: store.clone(),
        refresh_tokens: store.clone(),
    };
    let state = AuthState::from_config(&config, storage, provider).unwrap();

    TestApp {
        router: handlers::routes().with_state(state),
        store,
        _idp: idp,
    }
}

async fn send(router: &Router, request: Request<Body>) -> Response {
    router.clone().oneshot(request).await.unwrap()
}

async fn json_body(response: Response) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn set_cookies(response: &Response) -> Vec<Cookie<'static>> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|v| Cookie::parse(v.to_str().unwrap().to_string()).unwrap())
        .collect()
}

fn cookie_value(cookies: &[Cookie<'static>], name: &str) -> String {
    cookies
        .iter()
        .find(|c| c.name() == name)
        .map(|c| c.value().to_string())
        .unwrap()
}

fn init_request(path: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn login(app: &TestApp) -> Vec<Cookie<'static>> {
    let response = send(
        &app.router,
        init_request("/auth/login/init", r#"{"redirectUri":"https://app.example/after"}"#),
    )
    .await;
    let state = json_body(response).await["state"]
        .as_str()
        .unwrap()
        .to_string();

    let response = send(
        &app.router,
        Request::get(format!("/auth/callback?code=abc&state={state}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    set_cookies(&response)
}

#[tokio::test]
async fn test_login_flow_sets_cookies_and_redirects() {
    let app = test_app().await;

    let response = send(
        &app.router,
        init_request("/auth/login/init", r#"{"redirectUri":"https://app.example/after"}"#),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json_body(response).await;
    let state = body["state"].as_str().unwrap().to_string();
    let url = body["authorizationUrl"].as_str().unwrap();
    assert!(state.len() >= 22);
    assert!(url.contains("code_challenge_method=S256"));
    assert!(url.contains("/oauth2/authorize?"));

    let response = send(
        &app.router,
        Request::get(format!("/auth/callback?code=abc&state={state}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(
        response.headers()[header::LOCATION],
        "https://app.example/after"
    );

    let cookies = set_cookies(&response);
    assert_eq!(cookies.len(), 2);
    for cookie in &cookies {
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.same_site(), Some(cookie::SameSite::Lax));
    }
    let access = cookies.iter().find(|c| c.name() == "alog_tkn").unwrap();
    assert_eq!(access.max_age(), Some(time::Duration::seconds(4 * 3600 - 60)));
    let refresh = cookies.iter().find(|c| c.name() == "refresh_tkn").unwrap();
    assert!(refresh.expires().is_some());

    // state is single use
    let response = send(
        &app.router,
        Request::get(format!("/auth/callback?code=abc&state={state}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_init_requires_redirect_uri() {
    let app = test_app().await;
    let response = send(&app.router, init_request("/auth/signup/init", "{}")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json_body(response).await;
    assert_eq!(body["code"], "bad_request");

    let response = send(&app.router, init_request("/auth/login/init", "not json")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_callback_requires_code_and_state() {
    let app = test_app().await;
    let response = send(
        &app.router,
        Request::get("/auth/callback?code=abc")
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_signup_for_existing_account_conflicts() {
    let app = test_app().await;
    let response = send(
        &app.router,
        init_request("/auth/signup/init", r#"{"redirectUri":"https://app.example/"}"#),
    )
    .await;
    let state = json_body(response).await["state"]
        .as_str()
        .unwrap()
        .to_string();

    let response = send(
        &app.router,
        Request::get(format!("/auth/callback?code=abc&state={state}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn test_refresh_rotates_and_rejects_reuse() {
    let app = test_app().await;
    let cookies = login(&app).await;
    let old_refresh = cookie_value(&cookies, "refresh_tkn");

    let refresh = |token: String| {
        Request::put("/auth/token")
            .header(header::COOKIE, format!("refresh_tkn={token}"))
            .body(Body::empty())
            .unwrap()
    };

    let response = send(&app.router, refresh(old_refresh.clone())).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    let rotated = set_cookies(&response);
    assert_ne!(cookie_value(&rotated, "refresh_tkn"), old_refresh);
    assert!(!cookie_value(&rotated, "alog_tkn").is_empty());

    let response = send(&app.router, refresh(old_refresh)).await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app.router,
        Request::put("/auth/token").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_logout_clears_cookies_and_revokes() {
    let app = test_app().await;
    let cookies = login(&app).await;
    let refresh = cookie_value(&cookies, "refresh_tkn");
    assert_eq!(app.store.refresh_token_count(), 1);

    let response = send(
        &app.router,
        Request::delete("/auth/token")
            .header(header::COOKIE, format!("refresh_tkn={refresh}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    for cookie in set_cookies(&response) {
        assert_eq!(cookie.max_age(), Some(time::Duration::ZERO));
        assert_eq!(cookie.value(), "");
    }
    assert_eq!(app.store.refresh_token_count(), 0);
}

#[tokio::test]
async fn test_session_lifecycle() {
    let app = test_app().await;
    let cookies = login(&app).await;
    let access = cookie_value(&cookies, "alog_tkn");

    let response = send(
        &app.router,
        Request::post("/auth/session")
            .header(header::COOKIE, format!("alog_tkn={access}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let token = json_body(response).await["sessionToken"]
        .as_str()
        .unwrap()
        .to_string();

    let delete = || {
        Request::delete("/auth/session")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap()
    };
    assert_eq!(
        send(&app.router, delete()).await.status(),
        StatusCode::NO_CONTENT
    );
    assert_eq!(
        send(&app.router, delete()).await.status(),
        StatusCode::UNAUTHORIZED
    );

    let response = send(
        &app.router,
        Request::post("/auth/session").body(Body::empty()).unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_session_cannot_open_another_session() {
    let app = test_app().await;
    let cookies = login(&app).await;
    let access = cookie_value(&cookies, "alog_tkn");

    let response = send(
        &app.router,
        Request::post("/auth/session")
            .header(header::COOKIE, format!("alog_tkn={access}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
    let token = json_body(response).await["sessionToken"]
        .as_str()
        .unwrap()
        .to_string();

    let response = send(
        &app.router,
        Request::post("/auth/session")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = send(
        &app.router,
        Request::post("/auth/session")
            .header(header::AUTHORIZATION, format!("Bearer {token}"))
            .header(header::COOKIE, format!("alog_tkn={access}"))
            .body(Body::empty())
            .unwrap(),
    )
    .await;
    assert_eq!(response.status(), StatusCode::CREATED);
}
