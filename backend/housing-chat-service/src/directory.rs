//! Read-only lookups into the marketplace's user and property catalog.
//!
//! The chat service never writes these tables. A missing user or property
//! renders as an absent summary instead of failing the request.

use crate::error::AppResult;
use crate::models::{PropertySummary, UserSummary};
use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

#[async_trait]
pub trait Directory: Send + Sync {
    async fn users(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserSummary>>;

    async fn property(&self, id: Uuid) -> AppResult<Option<PropertySummary>>;

    async fn user(&self, id: Uuid) -> AppResult<Option<UserSummary>> {
        Ok(self.users(&[id]).await?.remove(&id))
    }
}

#[derive(Debug, FromRow)]
struct UserRecord {
    id: Uuid,
    name: String,
    email: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, FromRow)]
struct PropertyRecord {
    id: Uuid,
    title: String,
    images: Option<Vec<String>>,
    address: Option<String>,
}

/// Catalog reader over the shared marketplace database.
#[derive(Clone)]
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Directory for PgDirectory {
    async fn users(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserSummary>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }
        let rows: Vec<UserRecord> = sqlx::query_as(
            "SELECT id, name, email, avatar_url FROM users WHERE id = ANY($1)",
        )
        .bind(ids.to_vec())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| {
                (
                    r.id,
                    UserSummary {
                        id: r.id,
                        name: r.name,
                        email: r.email,
                        avatar_url: r.avatar_url,
                    },
                )
            })
            .collect())
    }

    async fn property(&self, id: Uuid) -> AppResult<Option<PropertySummary>> {
        let row: Option<PropertyRecord> = sqlx::query_as(
            "SELECT id, title, images, address FROM properties WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| PropertySummary {
            id: r.id,
            title: r.title,
            images: r.images.unwrap_or_default(),
            address: r.address,
        }))
    }
}

/// In-memory catalog for tests and `STORAGE_BACKEND=memory` runs.
#[derive(Default)]
pub struct StaticDirectory {
    users: RwLock<HashMap<Uuid, UserSummary>>,
    properties: RwLock<HashMap<Uuid, PropertySummary>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_user(&self, user: UserSummary) {
        self.users.write().await.insert(user.id, user);
    }

    pub async fn insert_property(&self, property: PropertySummary) {
        self.properties.write().await.insert(property.id, property);
    }
}

#[async_trait]
impl Directory for StaticDirectory {
    async fn users(&self, ids: &[Uuid]) -> AppResult<HashMap<Uuid, UserSummary>> {
        let guard = self.users.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| guard.get(id).map(|u| (*id, u.clone())))
            .collect())
    }

    async fn property(&self, id: Uuid) -> AppResult<Option<PropertySummary>> {
        Ok(self.properties.read().await.get(&id).cloned())
    }
}
