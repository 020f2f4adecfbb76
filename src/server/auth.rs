use axum::{
    extract::{Path, Query, State},
    response::{Html, Redirect},
};
use chrono::Utc;
use tower_cookies::Cookies;

use super::AppState;
use crate::{
    AuthorizationResponse, CallbackQuery, GatewayError, OAuthError, ProviderKind, Session,
};

fn callback_state(kind: ProviderKind) -> String {
    format!("state-{kind}")
}

pub(super) async fn home(
    State(state): State<AppState>,
    cookies: Cookies,
) -> Result<Html<String>, GatewayError> {
    let user = match state.sessions.read(&cookies) {
        Some(session) => state.store.find_user(session.user_id).await?,
        None => None,
    };

    let providers = state.registry.kinds();
    Ok(Html(state.renderer.render_home(user.as_ref(), &providers)))
}

// Wildcard routes never match an empty segment.
pub(super) async fn missing_provider() -> GatewayError {
    GatewayError::UnknownProvider(String::new())
}

pub(super) async fn login(
    State(state): State<AppState>,
    Path(provider): Path<String>,
) -> Result<Redirect, GatewayError> {
    let client = state.registry.resolve(&provider)?;
    let request = client
        .authorization_url(&callback_state(client.kind()))
        .map_err(GatewayError::ProviderConfig)?;

    Ok(Redirect::temporary(&request.authorization_url))
}

/// Exchanges the code, loads the profile, links it to a local user and
/// starts the session. Nothing is persisted unless every step succeeds.
pub(super) async fn callback(
    State(state): State<AppState>,
    cookies: Cookies,
    Path(provider): Path<String>,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, GatewayError> {
    let client = state.registry.resolve(&provider)?;
    let kind = client.kind();

    let response =
        AuthorizationResponse::from_query(query).map_err(GatewayError::InvalidCallback)?;
    let token = client
        .exchange_code(response, Some(&callback_state(kind)))
        .await
        .map_err(|err| match err {
            OAuthError::StateMismatch { .. } => GatewayError::InvalidCallback(err),
            other => GatewayError::TokenExchange(other),
        })?;

    let now = Utc::now();
    let expires_at = token.expires_at(now);
    tracing::info!(
        provider = %kind,
        token_type = token.token_type.as_deref().unwrap_or("unknown"),
        expiration = ?expires_at,
        "completed oauth exchange"
    );

    let tokens = token.into_tokens(now);
    let profile = client.fetch_profile(&tokens.access_token).await?;

    let user_id = state
        .store
        .reconcile(kind, &profile, &tokens)
        .await
        .map_err(GatewayError::Reconciliation)?;

    tracing::info!(provider = %kind, user_id, "user signed in");

    state
        .sessions
        .issue(&cookies, &Session::new(tokens.access_token, user_id));

    Ok(Redirect::temporary("/"))
}

pub(super) async fn logout(State(state): State<AppState>, cookies: Cookies) -> Redirect {
    state.sessions.clear(&cookies);
    Redirect::to("/")
}
