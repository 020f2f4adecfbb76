use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;

use super::{ProviderEndpoints, get_json};
use crate::{CanonicalProfile, OAuthProvider, ProviderFetchError, ProviderKind};

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const API_BASE: &str = "https://www.googleapis.com";

const DEFAULT_SCOPE: &str = "openid email profile";
const USERINFO_PATH: &str = "/oauth2/v2/userinfo";

#[derive(Debug, Deserialize)]
struct GoogleUser {
    id: String,
    email: Option<String>,
    name: Option<String>,
    picture: Option<String>,
}

impl From<GoogleUser> for CanonicalProfile {
    fn from(user: GoogleUser) -> Self {
        let display_name = user
            .name
            .filter(|name| !name.trim().is_empty())
            .or_else(|| user.email.clone())
            .unwrap_or_else(|| user.id.clone());

        CanonicalProfile::new(user.id, display_name)
            .with_email(user.email)
            .with_avatar_url(user.picture)
    }
}

#[derive(Debug, Clone)]
pub struct GoogleProvider {
    endpoints: ProviderEndpoints,
}

impl Default for GoogleProvider {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::new(AUTHORIZE_URL, TOKEN_URL, API_BASE),
        }
    }
}

impl GoogleProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl OAuthProvider for GoogleProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Google
    }

    fn authorize_url(&self) -> &str {
        &self.endpoints.authorize_url
    }

    fn token_url(&self) -> &str {
        &self.endpoints.token_url
    }

    fn default_scope(&self) -> &'static str {
        DEFAULT_SCOPE
    }

    // Google only issues a refresh token for offline access.
    fn authorize_params(&self) -> Vec<(String, String)> {
        vec![("access_type".to_string(), "offline".to_string())]
    }

    async fn fetch_profile(
        &self,
        http: &Client,
        access_token: &str,
    ) -> Result<CanonicalProfile, ProviderFetchError> {
        let request = http
            .get(format!("{}{}", self.endpoints.api_base, USERINFO_PATH))
            .bearer_auth(access_token);
        let user: GoogleUser = get_json(self.kind().as_str(), request).await?;
        Ok(user.into())
    }
}
