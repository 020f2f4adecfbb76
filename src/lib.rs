//! Social login gateway.
//!
//! Signs users in through GitHub, Facebook, Google or Instagram using the
//! OAuth 2.0 authorization code flow, reconciles each provider profile with a
//! local user and starts a first-party cookie session. Each provider's
//! endpoints and profile mapping live behind the [`OAuthProvider`] trait.

mod client;
mod config;
mod error;
mod profile;
mod provider;
mod providers;
mod registry;
mod server;
mod session;
mod store;
mod types;
mod view;

pub use client::{OAuthClient, OAuthClientConfig};
pub use config::{ConfigError, GatewayConfig, ProviderCredentials};
pub use error::{GatewayError, OAuthError, ProviderFetchError};
pub use profile::CanonicalProfile;
pub use provider::{OAuthProvider, ProviderKind};
pub use providers::{
    FacebookProvider, GithubProvider, GoogleProvider, InstagramProvider, ProviderEndpoints,
    default_provider,
};
pub use registry::ProviderRegistry;
pub use server::{AppState, request_logger, router};
pub use session::{ACCESS_TOKEN_COOKIE, Session, SessionCodec, USER_ID_COOKIE};
pub use store::{
    IdentityStore, LocalUser, MIGRATOR, MemoryIdentityStore, NewUser, PgIdentityStore,
    ProviderIdentity, StoreError, UserPatch,
};
pub use types::{
    AuthorizationRequest, AuthorizationResponse, CallbackQuery, ProviderTokens, TokenResponse,
};
pub use view::{HtmlRenderer, Renderer};
