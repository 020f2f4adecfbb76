mod facebook;
mod github;
mod google;
mod instagram;

use std::sync::Arc;

use reqwest::RequestBuilder;
use serde::de::DeserializeOwned;

pub use facebook::FacebookProvider;
pub use github::GithubProvider;
pub use google::GoogleProvider;
pub use instagram::InstagramProvider;

use crate::{OAuthProvider, ProviderFetchError, ProviderKind};

/// Where a provider lives. Overridable so a provider can be pointed at a
/// staging host or a local fake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub authorize_url: String,
    pub token_url: String,
    pub api_base: String,
}

impl ProviderEndpoints {
    pub fn new(
        authorize_url: impl Into<String>,
        token_url: impl Into<String>,
        api_base: impl Into<String>,
    ) -> Self {
        Self {
            authorize_url: authorize_url.into(),
            token_url: token_url.into(),
            api_base: api_base.into().trim_end_matches('/').to_string(),
        }
    }
}

/// Production provider for `kind`, using its public endpoints.
pub fn default_provider(kind: ProviderKind) -> Arc<dyn OAuthProvider> {
    match kind {
        ProviderKind::Github => Arc::new(GithubProvider::new()),
        ProviderKind::Facebook => Arc::new(FacebookProvider::new()),
        ProviderKind::Google => Arc::new(GoogleProvider::new()),
        ProviderKind::Instagram => Arc::new(InstagramProvider::new()),
    }
}

pub(crate) async fn get_json<T: DeserializeOwned>(
    provider: &'static str,
    request: RequestBuilder,
) -> Result<T, ProviderFetchError> {
    // Graph API urls carry the access token, so urls are stripped from errors.
    let response = request
        .send()
        .await
        .map_err(|err| ProviderFetchError::Http {
            provider,
            source: err.without_url(),
        })?;

    let status = response.status();
    if !status.is_success() {
        return Err(ProviderFetchError::Status {
            provider,
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|err| ProviderFetchError::Http {
            provider,
            source: err.without_url(),
        })?;

    serde_json::from_str(&body).map_err(|source| ProviderFetchError::Decode { provider, source })
}
