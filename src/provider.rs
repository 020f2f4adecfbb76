use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::{CanonicalProfile, GatewayError, ProviderFetchError};

/// The identity providers a user can sign in with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    Github,
    Facebook,
    Google,
    Instagram,
}

impl ProviderKind {
    pub const ALL: [ProviderKind; 4] = [
        ProviderKind::Github,
        ProviderKind::Facebook,
        ProviderKind::Google,
        ProviderKind::Instagram,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderKind::Github => "github",
            ProviderKind::Facebook => "facebook",
            ProviderKind::Google => "google",
            ProviderKind::Instagram => "instagram",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            ProviderKind::Github => "GitHub",
            ProviderKind::Facebook => "Facebook",
            ProviderKind::Google => "Google",
            ProviderKind::Instagram => "Instagram",
        }
    }

    /// Prefix used for this provider's environment variables, e.g. `GITHUB`.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            ProviderKind::Github => "GITHUB",
            ProviderKind::Facebook => "FACEBOOK",
            ProviderKind::Google => "GOOGLE",
            ProviderKind::Instagram => "INSTAGRAM",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = GatewayError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ProviderKind::ALL
            .into_iter()
            .find(|kind| kind.as_str() == name)
            .ok_or_else(|| GatewayError::UnknownProvider(name.to_string()))
    }
}

#[async_trait]
pub trait OAuthProvider: fmt::Debug + Send + Sync {
    fn kind(&self) -> ProviderKind;
    fn authorize_url(&self) -> &str;
    fn token_url(&self) -> &str;
    fn default_scope(&self) -> &'static str;

    /// Extra consent-URL parameters this provider needs.
    fn authorize_params(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    fn token_headers(&self) -> Vec<(String, String)> {
        vec![("Accept".to_string(), "application/json".to_string())]
    }

    /// Loads the user behind `access_token` and maps it onto the canonical profile.
    async fn fetch_profile(
        &self,
        http: &Client,
        access_token: &str,
    ) -> Result<CanonicalProfile, ProviderFetchError>;
}
