use async_trait::async_trait;
use reqwest::{
    Client, RequestBuilder,
    header::{ACCEPT, USER_AGENT},
};
use serde::Deserialize;

use super::{ProviderEndpoints, get_json};
use crate::{CanonicalProfile, OAuthProvider, ProviderFetchError, ProviderKind};

const AUTHORIZE_URL: &str = "https://github.com/login/oauth/authorize";
const TOKEN_URL: &str = "https://github.com/login/oauth/access_token";
const API_BASE: &str = "https://api.github.com";

const DEFAULT_SCOPE: &str = "read:user user:email";

// GitHub rejects API calls without a User-Agent.
const API_ACCEPT: &str = "application/vnd.github+json";
const API_USER_AGENT: &str = concat!("social-login/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Deserialize)]
struct GithubUser {
    id: i64,
    login: String,
    name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct GithubEmail {
    email: String,
    primary: bool,
    verified: bool,
}

#[derive(Debug, Clone)]
pub struct GithubProvider {
    endpoints: ProviderEndpoints,
}

impl Default for GithubProvider {
    fn default() -> Self {
        Self {
            endpoints: ProviderEndpoints::new(AUTHORIZE_URL, TOKEN_URL, API_BASE),
        }
    }
}

impl GithubProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_endpoints(mut self, endpoints: ProviderEndpoints) -> Self {
        self.endpoints = endpoints;
        self
    }

    fn api_request(&self, http: &Client, path: &str, access_token: &str) -> RequestBuilder {
        http.get(format!("{}{}", self.endpoints.api_base, path))
            .bearer_auth(access_token)
            .header(ACCEPT, API_ACCEPT)
            .header(USER_AGENT, API_USER_AGENT)
    }
}

#[async_trait]
impl OAuthProvider for GithubProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Github
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
        let user: GithubUser = get_json(id, self.api_request(http, "/user", access_token)).await?;
        let emails: Vec<GithubEmail> =
            get_json(id, self.api_request(http, "/user/emails", access_token)).await?;

        Ok(normalize(user, emails))
    }
}

fn normalize(user: GithubUser, emails: Vec<GithubEmail>) -> CanonicalProfile {
    let display_name = user
        .name
        .filter(|name| !name.trim().is_empty())
        .unwrap_or(user.login);

    CanonicalProfile::new(user.id.to_string(), display_name)
        .with_email(primary_verified_email(emails))
        .with_avatar_url(user.avatar_url)
}

fn primary_verified_email(emails: Vec<GithubEmail>) -> Option<String> {
    emails
        .into_iter()
        .find(|entry| entry.primary && entry.verified)
        .map(|entry| entry.email)
}
