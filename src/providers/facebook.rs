use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use url::Url;

use super::{ProviderEndpoints, get_json};
use crate::{CanonicalProfile, OAuthProvider, ProviderFetchError, ProviderKind};

const AUTHORIZE_URL: &str = "https://www.facebook.com/v10.0/dialog/oauth";
const TOKEN_URL: &str = "https://graph.facebook.com/v10.0/oauth/access_token";
const API_BASE: &str = "https://graph.facebook.com";

const DEFAULT_SCOPE: &str = "email public_profile";
const PROFILE_FIELDS: &str = "id,name,email,picture";

#[derive(Debug, Deserialize)]
struct FacebookUser {
    id: String,
    name: String,
    email: Option<String>,
    picture: Option<FacebookPicture>,
}

#[derive(Debug, Deserialize)]
struct FacebookPicture {
    data: FacebookPictureData,
}

#[derive(Debug, Deserialize)]
struct FacebookPictureData {
    url: Option<String>,
}

impl From<FacebookUser> for CanonicalProfile {
    fn from(user: FacebookUser) -> Self {
        let avatar_url = user.picture.and_then(|picture| picture.data.url);
        CanonicalProfile::new(user.id, user.name)
            .with_email(user.email)
            .with_avatar_url(avatar_url)
    }
}

#[derive(Debug, Clone)]
pub struct FacebookProvider {
    endpoints: ProviderEndpoints,
}

impl Default for FacebookProvider {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::new(AUTHORIZE_URL, TOKEN_URL, API_BASE),
        }
    }
}

impl FacebookProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn profile_url(&self, access_token: &str) -> Result<Url, url::ParseError> {
        let mut url = Url::parse(&format!("{}/me", self.endpoints.api_base))?;
        url.query_pairs_mut()
            .append_pair("fields", PROFILE_FIELDS)
            .append_pair("access_token", access_token);
        Ok(url)
    }
}

#[async_trait]
impl OAuthProvider for FacebookProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Facebook
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
        let url = self
            .profile_url(access_token)
            .map_err(|source| ProviderFetchError::InvalidUrl { provider: id, source })?;
        let user: FacebookUser = get_json(id, http.get(url)).await?;
        Ok(user.into())
    }
}
