#![allow(dead_code)]

use actix_middleware::Claims;
use chrono::{DateTime, Utc};
use housing_chat_service::config::Config;
use housing_chat_service::directory::StaticDirectory;
use housing_chat_service::models::{Conversation, MessagePayload, UserSummary};
use housing_chat_service::repository::{ChatStore, InMemoryChatStore};
use housing_chat_service::services::ConversationService;
use housing_chat_service::state::AppState;
use jsonwebtoken::{encode, EncodingKey, Header};
use std::sync::Arc;
use uuid::Uuid;

pub const SECRET: &str = "integration-test-secret-at-least-32-bytes";

pub struct TestEnv {
    pub state: AppState,
    pub store: Arc<InMemoryChatStore>,
    pub directory: Arc<StaticDirectory>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self::with_config(Config::for_memory(SECRET))
    }

    pub fn with_config(config: Config) -> Self {
        let store = Arc::new(InMemoryChatStore::new());
        let directory = Arc::new(StaticDirectory::new());
        let state = AppState::new(config, store.clone(), directory.clone())
            .expect("state builds from memory config");
        Self {
            state,
            store,
            directory,
        }
    }

    pub fn store(&self) -> &dyn ChatStore {
        self.store.as_ref()
    }

    pub async fn user(&self, name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.directory
            .insert_user(UserSummary {
                id,
                name: name.to_string(),
                email: Some(format!("{}@campus.test", name.to_lowercase())),
                avatar_url: None,
            })
            .await;
        id
    }

    pub async fn conversation(&self, a: Uuid, b: Uuid) -> Conversation {
        ConversationService::find_or_create(self.store(), a, b, Uuid::new_v4(), Utc::now())
            .await
            .expect("conversation created")
    }

    pub async fn conversation_at(&self, a: Uuid, b: Uuid, at: DateTime<Utc>) -> Conversation {
        ConversationService::find_or_create(self.store(), a, b, Uuid::new_v4(), at)
            .await
            .expect("conversation created")
    }
}

pub fn token_for(user_id: Uuid) -> String {
    let now = Utc::now().timestamp();
    let claims = Claims {
        sub: user_id.to_string(),
        exp: now + 3600,
        iat: now,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(SECRET.as_bytes()),
    )
    .expect("encode token")
}

pub fn text(content: &str) -> MessagePayload {
    MessagePayload::text(content)
}
