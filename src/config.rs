//! Gateway settings read from the process environment (and `.env`).

use std::time::Duration;

use base64::{Engine as _, engine::general_purpose::STANDARD};
use thiserror::Error;
use tower_cookies::Key;

use crate::ProviderKind;

const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:3000";
const DEFAULT_PUBLIC_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_MAX_CONNECTIONS: u32 = 25;
const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value for {name}: {message}")]
    Invalid { name: String, message: String },
}

/// Client registration for one provider.
#[derive(Debug, Clone)]
pub struct ProviderCredentials {
    pub kind: ProviderKind,
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub listen_addr: String,
    pub public_base_url: String,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub session_secret: Option<String>,
    pub secure_cookies: bool,
    pub http_timeout: Duration,
    pub request_timeout: Duration,
    pub providers: Vec<ProviderCredentials>,
}

impl GatewayConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let public_base_url = get("PUBLIC_BASE_URL")
            .unwrap_or_else(|| DEFAULT_PUBLIC_BASE_URL.to_string())
            .trim_end_matches('/')
            .to_string();

        let secure_cookies = match get("SECURE_COOKIES") {
            Some(value) => parse_bool("SECURE_COOKIES", &value)?,
            None => public_base_url.starts_with("https://"),
        };

        let mut providers = Vec::new();
        for kind in ProviderKind::ALL {
            let prefix = kind.env_prefix();
            let Some(client_id) = get(&format!("{prefix}_CLIENT_ID")) else {
                continue;
            };
            let client_secret = get(&format!("{prefix}_CLIENT_SECRET")).ok_or_else(|| {
                ConfigError::Invalid {
                    name: format!("{prefix}_CLIENT_SECRET"),
                    message: format!("required when {prefix}_CLIENT_ID is set"),
                }
            })?;
            let redirect_url = get(&format!("{prefix}_REDIRECT_URL"))
                .unwrap_or_else(|| format!("{public_base_url}/oauth2/callback/{kind}"));

            providers.push(ProviderCredentials {
                kind,
                client_id,
                client_secret,
                redirect_url,
            });
        }

        Ok(Self {
            listen_addr: get("LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string()),
            database_url: get("DATABASE_URL").or_else(|| get("POSTGRES_DSN")),
            database_max_connections: parse_or(
                "DATABASE_MAX_CONNECTIONS",
                get("DATABASE_MAX_CONNECTIONS"),
                DEFAULT_MAX_CONNECTIONS,
            )?,
            session_secret: get("SESSION_SECRET"),
            secure_cookies,
            http_timeout: Duration::from_secs(parse_or(
                "HTTP_TIMEOUT_SECS",
                get("HTTP_TIMEOUT_SECS"),
                DEFAULT_HTTP_TIMEOUT_SECS,
            )?),
            request_timeout: Duration::from_secs(parse_or(
                "REQUEST_TIMEOUT_SECS",
                get("REQUEST_TIMEOUT_SECS"),
                DEFAULT_REQUEST_TIMEOUT_SECS,
            )?),
            public_base_url,
            providers,
        })
    }

    pub fn database_url(&self) -> Result<&str, ConfigError> {
        self.database_url
            .as_deref()
            .ok_or(ConfigError::Missing("DATABASE_URL"))
    }

    /// Key used to sign session cookies.
    ///
    /// Without `SESSION_SECRET` a random key is generated, so sessions do not
    /// survive a restart.
    pub fn cookie_key(&self) -> Result<Key, ConfigError> {
        let Some(secret) = &self.session_secret else {
            tracing::warn!("SESSION_SECRET is not set; using a random cookie signing key");
            return Ok(Key::generate());
        };

        let bytes = STANDARD
            .decode(secret.trim())
            .map_err(|err| ConfigError::Invalid {
                name: "SESSION_SECRET".to_string(),
                message: err.to_string(),
            })?;

        Key::try_from(bytes.as_slice()).map_err(|_| ConfigError::Invalid {
            name: "SESSION_SECRET".to_string(),
            message: "must decode to at least 64 bytes".to_string(),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    name: &str,
    value: Option<String>,
    default: T,
) -> Result<T, ConfigError>
where
    T::Err: std::fmt::Display,
{
    match value {
        Some(value) => value.trim().parse().map_err(|err: T::Err| ConfigError::Invalid {
            name: name.to_string(),
            message: err.to_string(),
        }),
        None => Ok(default),
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ConfigError::Invalid {
            name: name.to_string(),
            message: format!("expected a boolean, got {other:?}"),
        }),
    }
}
