use crate::{
    config::{Config, JwtKey, StorageBackend},
    db,
    directory::{Directory, PgDirectory, StaticDirectory},
    error::AppError,
    repository::{ChatStore, InMemoryChatStore, PgChatStore},
    websocket::RealtimeHub,
};
use actix_middleware::JwtValidator;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ChatStore>,
    /// Read-only user and property catalog
    pub directory: Arc<dyn Directory>,
    pub hub: RealtimeHub,
    pub config: Arc<Config>,
    pub jwt: Arc<JwtValidator>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ChatStore>,
        directory: Arc<dyn Directory>,
    ) -> Result<Self, AppError> {
        let jwt = match &config.jwt_key {
            JwtKey::RsaPublicPem(pem) => JwtValidator::from_rsa_pem(pem)
                .map_err(|e| AppError::Config(format!("invalid JWT public key: {e}")))?,
            JwtKey::Secret(secret) => JwtValidator::from_secret(secret.as_bytes()),
        };
        let hub = RealtimeHub::new(store.clone(), directory.clone(), config.presence_scope);

        Ok(Self {
            store,
            directory,
            hub,
            config: Arc::new(config),
            jwt: Arc::new(jwt),
        })
    }

    /// Wire the configured storage backend.
    pub async fn from_config(config: Config) -> Result<Self, AppError> {
        match &config.storage {
            StorageBackend::Postgres {
                database_url,
                max_connections,
            } => {
                let pool = db::init_pool(database_url, *max_connections)
                    .await
                    .map_err(|e| AppError::StartServer(format!("database connection failed: {e}")))?;
                db::run_migrations(&pool).await?;

                let store = Arc::new(PgChatStore::new(pool.clone()));
                let directory = Arc::new(PgDirectory::new(pool));
                Self::new(config, store, directory)
            }
            StorageBackend::Memory => {
                tracing::warn!("using in-memory storage, data is lost on restart");
                Self::new(
                    config,
                    Arc::new(InMemoryChatStore::new()),
                    Arc::new(StaticDirectory::new()),
                )
            }
        }
    }
}
