use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::store::StoreError;

/// Errors raised while talking to a provider's authorization server.
#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header: {name}={value}")]
    InvalidHeader { name: String, value: String },

    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },

    // The body may hold tokens, so it is kept out of the message.
    #[error("invalid response: {message}")]
    InvalidResponse { message: String, body: String },

    #[error("token endpoint rejected the grant: {error}")]
    TokenRejected {
        error: String,
        description: Option<String>,
    },

    #[error("missing authorization code in callback")]
    MissingAuthorizationCode,

    #[error("provider denied authorization: {0}")]
    AuthorizationDenied(String),

    #[error("state mismatch (expected={expected}, received={received})")]
    StateMismatch { expected: String, received: String },
}

/// Errors raised while loading a user's profile from a provider API.
#[derive(Debug, Error)]
pub enum ProviderFetchError {
    #[error("request to {provider} failed: {source}")]
    Http {
        provider: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("invalid {provider} api url: {source}")]
    InvalidUrl {
        provider: &'static str,
        #[source]
        source: url::ParseError,
    },

    #[error("{provider} returned http status {status}")]
    Status { provider: &'static str, status: u16 },

    #[error("failed to decode {provider} response: {source}")]
    Decode {
        provider: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything a gateway handler can fail with, mapped onto an HTTP status.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    #[error("invalid oauth callback: {0}")]
    InvalidCallback(#[source] OAuthError),

    #[error("provider configuration error: {0}")]
    ProviderConfig(#[source] OAuthError),

    #[error("token exchange failed: {0}")]
    TokenExchange(#[source] OAuthError),

    #[error("profile fetch failed: {0}")]
    ProviderFetch(#[from] ProviderFetchError),

    #[error("reconciliation failed: {0}")]
    Reconciliation(#[source] StoreError),

    #[error("profile is incomplete: {0}")]
    ProfileIncomplete(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("store error: {0}")]
    Store(#[source] StoreError),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::UnknownProvider(_)
            | GatewayError::InvalidCallback(_)
            | GatewayError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::ProfileIncomplete(_) => StatusCode::UNPROCESSABLE_ENTITY,
            GatewayError::ProviderConfig(_)
            | GatewayError::TokenExchange(_)
            | GatewayError::ProviderFetch(_)
            | GatewayError::Reconciliation(_)
            | GatewayError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<StoreError> for GatewayError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::UserNotFound(id) => GatewayError::NotFound(format!("user {id}")),
            StoreError::EmailTaken(email) => {
                GatewayError::Conflict(format!("email {email} is already taken"))
            }
            StoreError::ProfileIncomplete => {
                GatewayError::ProfileIncomplete(StoreError::ProfileIncomplete.to_string())
            }
            other => GatewayError::Store(other),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
            "An internal server error occurred".to_string()
        } else {
            tracing::warn!(error = %self, "request rejected");
            self.to_string()
        };

        (status, Json(json!({ "message": message }))).into_response()
    }
}
