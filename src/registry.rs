use std::collections::HashMap;
use std::sync::Arc;

use reqwest::Client;

use crate::providers::default_provider;
use crate::{
    GatewayConfig, GatewayError, OAuthClient, OAuthClientConfig, OAuthError, ProviderKind,
};

/// Maps provider names to their configured clients.
#[derive(Debug, Clone, Default)]
pub struct ProviderRegistry {
    clients: HashMap<ProviderKind, Arc<OAuthClient>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers every provider with credentials in `config`, sharing one
    /// HTTP client whose timeout bounds each outbound call.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, OAuthError> {
        let http = Client::builder().timeout(config.http_timeout).build()?;

        let mut registry = Self::new();
        for credentials in &config.providers {
            let client_config =
                OAuthClientConfig::new(&credentials.client_id, &credentials.redirect_url)
                    .with_client_secret(&credentials.client_secret)
                    .with_timeout(config.http_timeout);
            registry.register(OAuthClient::with_http_client(
                default_provider(credentials.kind),
                client_config,
                http.clone(),
            ));
        }
        Ok(registry)
    }

    pub fn register(&mut self, client: OAuthClient) {
        self.clients.insert(client.kind(), Arc::new(client));
    }

    pub fn with_client(mut self, client: OAuthClient) -> Self {
        self.register(client);
        self
    }

    pub fn get(&self, kind: ProviderKind) -> Option<Arc<OAuthClient>> {
        self.clients.get(&kind).cloned()
    }

    /// Looks up a provider by its path segment. Names that are unknown or
    /// not configured are both rejected as unknown providers.
    pub fn resolve(&self, name: &str) -> Result<Arc<OAuthClient>, GatewayError> {
        let kind: ProviderKind = name.parse()?;
        self.get(kind)
            .ok_or_else(|| GatewayError::UnknownProvider(name.to_string()))
    }

    pub fn kinds(&self) -> Vec<ProviderKind> {
        let mut kinds: Vec<ProviderKind> = self.clients.keys().copied().collect();
        kinds.sort();
        kinds
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
