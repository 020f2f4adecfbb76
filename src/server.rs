//! HTTP surface: login, callback, logout, the home page and the users API.

mod auth;
mod middleware;
mod users;

use std::sync::Arc;
use std::time::Duration;

use axum::{
    Json, Router,
    http::StatusCode,
    routing::{get, post},
};
use serde_json::json;
use tower::ServiceBuilder;
use tower_cookies::CookieManagerLayer;
use tower_http::timeout::TimeoutLayer;

pub use middleware::request_logger;

use crate::{HtmlRenderer, IdentityStore, ProviderRegistry, Renderer, SessionCodec};

/// Shared by every handler; cloning is cheap.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ProviderRegistry>,
    pub store: Arc<dyn IdentityStore>,
    pub sessions: SessionCodec,
    pub renderer: Arc<dyn Renderer>,
}

impl AppState {
    pub fn new(
        registry: ProviderRegistry,
        store: Arc<dyn IdentityStore>,
        sessions: SessionCodec,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            sessions,
            renderer: Arc::new(HtmlRenderer),
        }
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Arc::new(renderer);
        self
    }
}

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/", get(auth::home))
        .route("/login/", get(auth::missing_provider))
        .route("/login/{*provider}", get(auth::login))
        .route("/oauth2/callback/", get(auth::missing_provider))
        .route("/oauth2/callback/{*provider}", get(auth::callback))
        .route("/logout", get(auth::logout))
        .route("/users", post(users::create).get(users::list))
        .route(
            "/users/{id}",
            get(users::show).patch(users::update).delete(users::remove),
        )
        .fallback(|| async {
            (
                StatusCode::NOT_FOUND,
                Json(json!({"message": "Endpoint not found"})),
            )
        })
        .layer(
            ServiceBuilder::new()
                .layer(axum::middleware::from_fn(request_logger))
                .layer(CookieManagerLayer::new())
                .layer(TimeoutLayer::with_status_code(
                    StatusCode::REQUEST_TIMEOUT,
                    request_timeout,
                )),
        )
        .with_state(state)
}
