use crate::error::AppError;
use crate::websocket::PresenceScope;
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageBackend {
    Postgres {
        database_url: String,
        max_connections: u32,
    },
    Memory,
}

/// Key material for verifying bearer tokens.
#[derive(Clone, PartialEq, Eq)]
pub enum JwtKey {
    RsaPublicPem(String),
    /// HS256 shared secret, for local development.
    Secret(String),
}

impl std::fmt::Debug for JwtKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JwtKey::RsaPublicPem(_) => f.write_str("JwtKey::RsaPublicPem(..)"),
            JwtKey::Secret(_) => f.write_str("JwtKey::Secret(<redacted>)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub storage: StorageBackend,
    pub jwt_key: JwtKey,
    pub edit_window_minutes: i64,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    pub presence_scope: PresenceScope,
    pub ws_heartbeat_interval: Duration,
    pub ws_client_timeout: Duration,
}

impl Config {
    pub fn from_env() -> Result<Self, AppError> {
        dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the config from any key lookup; `from_env` passes the process
    /// environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let port = parse_or(&lookup, "PORT", 3000u16)?;

        let storage = match lookup("STORAGE_BACKEND")
            .unwrap_or_else(|| "postgres".into())
            .to_ascii_lowercase()
            .as_str()
        {
            "postgres" => StorageBackend::Postgres {
                database_url: lookup("DATABASE_URL")
                    .ok_or_else(|| AppError::Config("DATABASE_URL missing".into()))?,
                max_connections: parse_or(&lookup, "DATABASE_MAX_CONNECTIONS", 10u32)?,
            },
            "memory" => StorageBackend::Memory,
            other => {
                return Err(AppError::Config(format!(
                    "STORAGE_BACKEND must be 'postgres' or 'memory', got '{other}'"
                )))
            }
        };

        let jwt_key = if let Some(pem) = lookup("JWT_PUBLIC_KEY_PEM") {
            JwtKey::RsaPublicPem(pem)
        } else if let Some(path) = lookup("JWT_PUBLIC_KEY_FILE") {
            let pem = std::fs::read_to_string(&path).map_err(|e| {
                AppError::Config(format!("failed to read JWT_PUBLIC_KEY_FILE {path}: {e}"))
            })?;
            JwtKey::RsaPublicPem(pem)
        } else if let Some(secret) = lookup("JWT_SECRET") {
            JwtKey::Secret(secret)
        } else {
            return Err(AppError::Config(
                "one of JWT_PUBLIC_KEY_PEM, JWT_PUBLIC_KEY_FILE or JWT_SECRET is required".into(),
            ));
        };

        let edit_window_minutes = parse_or(&lookup, "EDIT_WINDOW_MINUTES", 15i64)?;
        if edit_window_minutes < 0 {
            return Err(AppError::Config("EDIT_WINDOW_MINUTES must not be negative".into()));
        }

        let default_page_limit = parse_or(&lookup, "DEFAULT_PAGE_LIMIT", 50u32)?;
        let max_page_limit = parse_or(&lookup, "MAX_PAGE_LIMIT", 100u32)?;
        if default_page_limit == 0 || default_page_limit > max_page_limit {
            return Err(AppError::Config(
                "DEFAULT_PAGE_LIMIT must be between 1 and MAX_PAGE_LIMIT".into(),
            ));
        }

        let presence_scope = match lookup("PRESENCE_SCOPE") {
            Some(raw) => raw.parse::<PresenceScope>()?,
            None => PresenceScope::default(),
        };

        let heartbeat_secs = parse_or(&lookup, "WS_HEARTBEAT_INTERVAL_SECS", 5u64)?;
        let timeout_secs = parse_or(&lookup, "WS_CLIENT_TIMEOUT_SECS", 30u64)?;
        if heartbeat_secs == 0 || heartbeat_secs >= timeout_secs {
            return Err(AppError::Config(
                "WS_HEARTBEAT_INTERVAL_SECS must be positive and below WS_CLIENT_TIMEOUT_SECS"
                    .into(),
            ));
        }

        Ok(Self {
            port,
            storage,
            jwt_key,
            edit_window_minutes,
            default_page_limit,
            max_page_limit,
            presence_scope,
            ws_heartbeat_interval: Duration::from_secs(heartbeat_secs),
            ws_client_timeout: Duration::from_secs(timeout_secs),
        })
    }

    pub fn edit_window(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.edit_window_minutes)
    }

    /// Defaults with an in-memory store and the given HS256 secret.
    pub fn for_memory(secret: &str) -> Self {
        Self {
            port: 3000,
            storage: StorageBackend::Memory,
            jwt_key: JwtKey::Secret(secret.to_string()),
            edit_window_minutes: 15,
            default_page_limit: 50,
            max_page_limit: 100,
            presence_scope: PresenceScope::All,
            ws_heartbeat_interval: Duration::from_secs(5),
            ws_client_timeout: Duration::from_secs(30),
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, AppError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| AppError::Config(format!("{key} has invalid value '{raw}'"))),
    }
}
