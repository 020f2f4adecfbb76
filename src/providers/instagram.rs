use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{ProviderEndpoints, get_json};
use crate::{CanonicalProfile, OAuthProvider, ProviderFetchError, ProviderKind};

const AUTHORIZE_URL: &str = "https://api.instagram.com/oauth/authorize";
const TOKEN_URL: &str = "https://api.instagram.com/oauth/access_token";
const API_BASE: &str = "https://graph.instagram.com";

const DEFAULT_SCOPE: &str = "user_profile user_media";
const PROFILE_FIELDS: &str = "id,username,account_type";

// Basic Display exposes neither email nor avatar.
#[derive(Debug, Deserialize)]
struct InstagramUser {
    id: String,
    username: String,
}

impl From<InstagramUser> for CanonicalProfile {
    fn from(user: InstagramUser) -> Self {
        CanonicalProfile::new(user.id, user.username)
    }
}

#[derive(Debug, Clone)]
pub struct InstagramProvider {
    endpoints: ProviderEndpoints,
}

impl Default for InstagramProvider {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::new(AUTHORIZE_URL, TOKEN_URL, API_BASE),
        }
    }
}

impl InstagramProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }
}

#[async_trait]
impl OAuthProvider for InstagramProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Instagram
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

    async fn fetch_profile(
        &self,
        http: &Client,
        access_token: &str,
    ) -> Result<CanonicalProfile, ProviderFetchError> {
        let id = self.kind().as_str();
        let mut url = Url::parse(&format!("{}/me", self.endpoints.api_base))
            .map_err(|source| ProviderFetchError::InvalidUrl { provider: id, source })?;
        url.query_pairs_mut()
            .append_pair("fields", PROFILE_FIELDS)
            .append_pair("access_token", access_token);

        let user: InstagramUser = get_json(id, http.get(url)).await?;
        Ok(user.into())
    }
}
