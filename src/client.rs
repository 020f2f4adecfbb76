use std::sync::Arc;
use std::time::Duration;

use reqwest::{
    Client, RequestBuilder,
    header::{HeaderName, HeaderValue},
};
use url::Url;

use crate::{
    AuthorizationRequest, AuthorizationResponse, CanonicalProfile, OAuthError, OAuthProvider,
    ProviderFetchError, ProviderKind, TokenResponse,
};

#[derive(Debug, Clone)]
pub struct OAuthClientConfig {
    pub client_id: String,
    pub client_secret: Option<String>,
    pub redirect_uri: String,
    pub scope: Option<String>,
    pub authorize_params: Vec<(String, String)>,
    pub timeout: Option<Duration>,
}

impl OAuthClientConfig {
    pub fn new(client_id: impl Into<String>, redirect_uri: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: None,
            redirect_uri: redirect_uri.into(),
            scope: None,
            authorize_params: Vec::new(),
            timeout: None,
        }
    }

    pub fn with_client_secret(mut self, client_secret: impl Into<String>) -> Self {
        self.client_secret = Some(client_secret.into());
        self
    }

    pub fn with_scope(mut self, scope: impl Into<String>) -> Self {
        self.scope = Some(scope.into());
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn with_authorize_param(
        mut self,
        key: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        self.authorize_params.push((key.into(), value.into()));
        self
    }
}

/// A configured provider: consent URL builder, code exchange and profile fetch.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    provider: Arc<dyn OAuthProvider>,
    config: OAuthClientConfig,
    http: Client,
}

impl OAuthClient {
    pub fn new(
        provider: impl OAuthProvider + 'static,
        config: OAuthClientConfig,
    ) -> Result<Self, OAuthError> {
        let mut builder = Client::builder();
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;
        Ok(Self {
            provider: Arc::new(provider),
            config,
            http,
        })
    }

    pub fn with_http_client(
        provider: Arc<dyn OAuthProvider>,
        config: OAuthClientConfig,
        http: Client,
    ) -> Self {
        Self {
            provider,
            config,
            http,
        }
    }

    pub fn provider(&self) -> &dyn OAuthProvider {
        self.provider.as_ref()
    }

    pub fn kind(&self) -> ProviderKind {
        self.provider.kind()
    }

    pub fn config(&self) -> &OAuthClientConfig {
        &self.config
    }

    pub fn authorization_url(&self, state: &str) -> Result<AuthorizationRequest, OAuthError> {
        let scope = self
            .config
            .scope
            .as_deref()
            .unwrap_or(self.provider.default_scope());

        let mut params = self.provider.authorize_params();
        for (key, value) in &self.config.authorize_params {
            set_param(&mut params, key, value.clone());
        }

        set_param(&mut params, "response_type", "code".to_string());
        set_param(&mut params, "client_id", self.config.client_id.clone());
        set_param(&mut params, "redirect_uri", self.config.redirect_uri.clone());
        set_param(&mut params, "scope", scope.to_string());
        set_param(&mut params, "state", state.to_string());

        let mut url = Url::parse(self.provider.authorize_url())?;
        {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &params {
                pairs.append_pair(key, value);
            }
        }

        Ok(AuthorizationRequest {
            authorization_url: url.to_string(),
            state: state.to_string(),
            scope: scope.to_string(),
        })
    }

    pub async fn exchange_code(
        &self,
        response: AuthorizationResponse,
        expected_state: Option<&str>,
    ) -> Result<TokenResponse, OAuthError> {
        let AuthorizationResponse { code, state } = response;

        if let (Some(expected), Some(returned)) = (expected_state, state.as_deref()) {
            if expected != returned {
                return Err(OAuthError::StateMismatch {
                    expected: expected.to_string(),
                    received: returned.to_string(),
                });
            }
        }

        let mut payload = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), code),
            ("client_id".to_string(), self.config.client_id.clone()),
            ("redirect_uri".to_string(), self.config.redirect_uri.clone()),
        ];

        if let Some(secret) = &self.config.client_secret {
            payload.push(("client_secret".to_string(), secret.clone()));
        }

        self.send_token_request(payload).await
    }

    pub async fn fetch_profile(
        &self,
        access_token: &str,
    ) -> Result<CanonicalProfile, ProviderFetchError> {
        self.provider.fetch_profile(&self.http, access_token).await
    }

    async fn send_token_request(
        &self,
        payload: Vec<(String, String)>,
    ) -> Result<TokenResponse, OAuthError> {
        let headers = self.provider.token_headers();
        let builder = apply_headers(self.http.post(self.provider.token_url()), &headers)?;
        let response = builder.form(&payload).send().await?;

        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(OAuthError::HttpStatus {
                status: status.as_u16(),
                body,
            });
        }

        parse_token_response(body)
    }
}

// GitHub answers a bad grant with 200 and an `error` field.
fn parse_token_response(body: String) -> Result<TokenResponse, OAuthError> {
    let value: serde_json::Value =
        serde_json::from_str(&body).map_err(|err| OAuthError::InvalidResponse {
            message: err.to_string(),
            body: String::new(),
        })?;

    if let Some(error) = value.get("error").and_then(|error| error.as_str()) {
        return Err(OAuthError::TokenRejected {
            error: error.to_string(),
            description: value
                .get("error_description")
                .and_then(|description| description.as_str())
                .map(str::to_string),
        });
    }

    serde_json::from_value(value).map_err(|err| OAuthError::InvalidResponse {
        message: err.to_string(),
        body,
    })
}

fn set_param(params: &mut Vec<(String, String)>, key: &str, value: String) {
    if let Some((_, existing)) = params.iter_mut().find(|(param, _)| param == key) {
        *existing = value;
    } else {
        params.push((key.to_string(), value));
    }
}

fn apply_headers(
    mut builder: RequestBuilder,
    headers: &[(String, String)],
) -> Result<RequestBuilder, OAuthError> {
    for (name, value) in headers {
        let name =
            HeaderName::from_bytes(name.as_bytes()).map_err(|_| OAuthError::InvalidHeader {
                name: name.clone(),
                value: value.clone(),
            })?;
        let value = HeaderValue::from_str(value).map_err(|_| OAuthError::InvalidHeader {
            name: name.to_string(),
            value: value.clone(),
        })?;
        builder = builder.header(name, value);
    }
    Ok(builder)
}
