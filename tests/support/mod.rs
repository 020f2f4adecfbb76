//! Fake OAuth providers served on an ephemeral port, plus helpers for
//! driving the gateway router.

#![allow(dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    Form, Json, Router,
    body::Body,
    extract::{Query, State},
    http::{HeaderMap, Request, StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde_json::{Value, json};
use social_login::{
    AppState, FacebookProvider, GithubProvider, GoogleProvider, IdentityStore, InstagramProvider,
    MemoryIdentityStore, OAuthClient, OAuthClientConfig, OAuthProvider, ProviderEndpoints,
    ProviderKind, ProviderRegistry, SessionCodec, router,
};
use tokio::net::TcpListener;
use tower::ServiceExt;
use tower_cookies::Key;

pub const GITHUB_TOKEN: &str = "gho_fake_token";
pub const FACEBOOK_TOKEN: &str = "fb_fake_token";
pub const GOOGLE_TOKEN: &str = "ya29.fake_token";
pub const INSTAGRAM_TOKEN: &str = "ig_fake_token";
/// Accepted by every profile endpoint, which then answers 500.
pub const BROKEN_TOKEN: &str = "broken_token";
/// Exchanges to [`BROKEN_TOKEN`] at any token endpoint.
pub const BROKEN_CODE: &str = "code-broken";
/// Token endpoints stall for [`SLOW_DELAY`] before answering this code.
pub const SLOW_CODE: &str = "code-slow";
pub const SLOW_DELAY: Duration = Duration::from_secs(2);

pub const SHARED_EMAIL: &str = "octo@example.com";

#[derive(Default)]
pub struct FakeState {
    used_codes: Mutex<HashSet<String>>,
}

impl FakeState {
    pub fn used_codes(&self) -> usize {
        self.used_codes.lock().unwrap().len()
    }
}

/// A running fake provider host; `base` is its `http://127.0.0.1:port`.
#[derive(Clone)]
pub struct FakeProviders {
    pub base: String,
    pub state: Arc<FakeState>,
}

impl FakeProviders {
    pub async fn start() -> Self {
        let state = Arc::new(FakeState::default());
        let app = Router::new()
            .route("/{provider}/token", post(token))
            .route("/github/api/user", get(github_user))
            .route("/github/api/user/emails", get(github_emails))
            .route("/facebook/api/me", get(facebook_me))
            .route("/google/api/oauth2/v2/userinfo", get(google_userinfo))
            .route("/instagram/api/me", get(instagram_me))
            .with_state(state.clone());

        Self {
            base: spawn(app).await,
            state,
        }
    }

    pub fn endpoints(&self, kind: ProviderKind) -> ProviderEndpoints {
        ProviderEndpoints::new(
            format!("{}/{kind}/authorize", self.base),
            format!("{}/{kind}/token", self.base),
            format!("{}/{kind}/api", self.base),
        )
    }

    pub fn github(&self) -> GithubProvider {
        GithubProvider::new().with_endpoints(self.endpoints(ProviderKind::Github))
    }

    pub fn facebook(&self) -> FacebookProvider {
        FacebookProvider::new().with_endpoints(self.endpoints(ProviderKind::Facebook))
    }

    pub fn google(&self) -> GoogleProvider {
        GoogleProvider::new().with_endpoints(self.endpoints(ProviderKind::Google))
    }

    pub fn instagram(&self) -> InstagramProvider {
        InstagramProvider::new().with_endpoints(self.endpoints(ProviderKind::Instagram))
    }
}

pub async fn spawn(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub fn client_for(provider: impl OAuthProvider + 'static) -> OAuthClient {
    let kind = provider.kind();
    let config = OAuthClientConfig::new(
        format!("{kind}-client"),
        format!("http://localhost:3000/oauth2/callback/{kind}"),
    )
    .with_client_secret(format!("{kind}-secret"))
    .with_timeout(Duration::from_secs(5));
    OAuthClient::new(provider, config).unwrap()
}

/// Gateway wired to the fake providers. Google is deliberately left
/// unconfigured.
pub struct Gateway {
    pub app: Router,
    pub store: Arc<MemoryIdentityStore>,
    pub fake: FakeProviders,
}

impl Gateway {
    pub async fn start() -> Self {
        Self::start_with_timeout(Duration::from_secs(10)).await
    }

    pub async fn start_with_timeout(request_timeout: Duration) -> Self {
        let fake = FakeProviders::start().await;
        let store = Arc::new(MemoryIdentityStore::new());
        Self {
            app: gateway_router(&fake, store.clone(), request_timeout),
            store,
            fake,
        }
    }

    /// Rewires the router onto `store`; `self.store` is then unused.
    pub fn with_store(mut self, store: Arc<dyn IdentityStore>) -> Self {
        self.app = gateway_router(&self.fake, store, Duration::from_secs(10));
        self
    }

    pub async fn get(&self, uri: &str, cookies: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookies) = cookies {
            request = request.header(header::COOKIE, cookies);
        }
        self.app
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    pub async fn send_json(&self, method: &str, uri: &str, body: Value) -> Response {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap();
        self.app.clone().oneshot(request).await.unwrap()
    }

    /// Completes a login and returns the session as a `Cookie` header value.
    pub async fn sign_in(&self, kind: ProviderKind, code: &str) -> String {
        let response = self
            .get(
                &format!("/oauth2/callback/{kind}?code={code}&state=state-{kind}"),
                None,
            )
            .await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        cookie_header(&response)
    }
}

fn gateway_router(
    fake: &FakeProviders,
    store: Arc<dyn IdentityStore>,
    request_timeout: Duration,
) -> Router {
    let registry = ProviderRegistry::new()
        .with_client(client_for(fake.github()))
        .with_client(client_for(fake.facebook()))
        .with_client(client_for(fake.instagram()));
    let state = AppState::new(registry, store, SessionCodec::new(Key::generate()));
    router(state, request_timeout)
}

pub fn set_cookies(response: &Response) -> Vec<String> {
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| value.to_str().unwrap().to_string())
        .collect()
}

/// Turns the response's `Set-Cookie` headers into a request `Cookie` header.
pub fn cookie_header(response: &Response) -> String {
    set_cookies(response)
        .iter()
        .filter_map(|cookie| cookie.split(';').next())
        .collect::<Vec<_>>()
        .join("; ")
}

pub fn location(response: &Response) -> String {
    response
        .headers()
        .get(header::LOCATION)
        .unwrap()
        .to_str()
        .unwrap()
        .to_string()
}

pub async fn body_text(response: Response) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> Value {
    serde_json::from_str(&body_text(response).await).unwrap()
}

async fn token(
    State(state): State<Arc<FakeState>>,
    axum::extract::Path(provider): axum::extract::Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let code = form.get("code").cloned().unwrap_or_default();
    if code == SLOW_CODE {
        tokio::time::sleep(SLOW_DELAY).await;
    }
    let expected_client = format!("{provider}-client");
    let grant_ok = form.get("grant_type").map(String::as_str) == Some("authorization_code")
        && form.get("client_id") == Some(&expected_client)
        && form.get("client_secret") == Some(&format!("{provider}-secret"))
        && form.contains_key("redirect_uri");

    // Codes are single use, like real authorization servers.
    let fresh = code.starts_with("code-") && state.used_codes.lock().unwrap().insert(code.clone());
    if !grant_ok || !fresh {
        return match provider.as_str() {
            "github" => Json(json!({
                "error": "bad_verification_code",
                "error_description": "The code passed is incorrect or expired."
            }))
            .into_response(),
            _ => (
                StatusCode::BAD_REQUEST,
                Json(json!({"error": "invalid_grant"})),
            )
                .into_response(),
        };
    }

    let access_token = match (code.as_str(), provider.as_str()) {
        (BROKEN_CODE, _) => BROKEN_TOKEN,
        (_, "github") => GITHUB_TOKEN,
        (_, "facebook") => FACEBOOK_TOKEN,
        (_, "google") => GOOGLE_TOKEN,
        (_, "instagram") => INSTAGRAM_TOKEN,
        _ => return StatusCode::NOT_FOUND.into_response(),
    };

    match provider.as_str() {
        "github" => Json(json!({
            "access_token": access_token,
            "token_type": "bearer",
            "scope": "read:user,user:email"
        }))
        .into_response(),
        "instagram" => Json(json!({
            "access_token": access_token,
            "user_id": 17841400000u64
        }))
        .into_response(),
        "google" => Json(json!({
            "access_token": access_token,
            "token_type": "Bearer",
            "expires_in": 3599,
            "refresh_token": "1//google-refresh"
        }))
        .into_response(),
        _ => Json(json!({
            "access_token": access_token,
            "token_type": "bearer",
            "expires_in": 5183944
        }))
        .into_response(),
    }
}

fn bearer(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")
}

fn check_token(presented: Option<&str>, expected: &str) -> Result<(), StatusCode> {
    match presented {
        Some(BROKEN_TOKEN) => Err(StatusCode::INTERNAL_SERVER_ERROR),
        Some(token) if token == expected => Ok(()),
        _ => Err(StatusCode::UNAUTHORIZED),
    }
}

async fn github_user(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    if headers.get(header::USER_AGENT).is_none() {
        return Err(StatusCode::FORBIDDEN);
    }
    check_token(bearer(&headers), GITHUB_TOKEN)?;
    Ok(Json(json!({
        "id": 583231,
        "login": "octocat",
        "name": null,
        "avatar_url": "https://avatars.githubusercontent.com/u/583231"
    })))
}

async fn github_emails(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    check_token(bearer(&headers), GITHUB_TOKEN)?;
    Ok(Json(json!([
        { "email": "octo@users.noreply.github.com", "primary": false, "verified": true },
        { "email": SHARED_EMAIL, "primary": true, "verified": true }
    ])))
}

async fn facebook_me(
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    check_token(query.get("access_token").map(String::as_str), FACEBOOK_TOKEN)?;
    if query.get("fields").map(String::as_str) != Some("id,name,email,picture") {
        return Err(StatusCode::BAD_REQUEST);
    }
    Ok(Json(json!({
        "id": "10158000000000001",
        "name": "Octo Cat",
        "email": SHARED_EMAIL,
        "picture": {
            "data": { "url": "https://graph.facebook.com/pic.jpg", "is_silhouette": false }
        }
    })))
}

async fn google_userinfo(headers: HeaderMap) -> Result<Json<Value>, StatusCode> {
    check_token(bearer(&headers), GOOGLE_TOKEN)?;
    Ok(Json(json!({
        "id": "108000000000000000001",
        "email": "grace@example.com",
        "verified_email": true,
        "name": "Grace Hopper",
        "picture": "https://lh3.googleusercontent.com/a/photo.jpg"
    })))
}

async fn instagram_me(
    Query(query): Query<HashMap<String, String>>,
) -> Result<Json<Value>, StatusCode> {
    check_token(query.get("access_token").map(String::as_str), INSTAGRAM_TOKEN)?;
    Ok(Json(json!({
        "id": "17841400000",
        "username": "insta_octo",
        "account_type": "PERSONAL"
    })))
}
