use super::ClientError;
use crate::middleware::error_handling::ErrorResponse;
use crate::models::{MessagePayload, MessageView};
use async_trait::async_trait;
use reqwest::{Client, Response};
use uuid::Uuid;

/// REST operations the conversation screen needs.
#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageView>, ClientError>;

    async fn send_message(
        &self,
        conversation_id: Uuid,
        payload: &MessagePayload,
    ) -> Result<MessageView, ClientError>;
}

#[derive(Clone)]
pub struct HttpChatApi {
    client: Client,
    base_url: String,
    token: String,
}

impl HttpChatApi {
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v1{}", self.base_url, path)
    }

    async fn decode<T: serde::de::DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match serde_json::from_str::<ErrorResponse>(&body) {
            Ok(err) => ClientError::Api {
                status: status.as_u16(),
                code: err.code,
                message: err.message,
            },
            Err(_) => ClientError::Api {
                status: status.as_u16(),
                code: status.canonical_reason().unwrap_or("UNKNOWN").to_string(),
                message: body,
            },
        })
    }
}

#[async_trait]
impl ChatApi for HttpChatApi {
    async fn list_messages(
        &self,
        conversation_id: Uuid,
        page: u32,
        limit: u32,
    ) -> Result<Vec<MessageView>, ClientError> {
        let response = self
            .client
            .get(self.url(&format!("/conversations/{conversation_id}/messages")))
            .bearer_auth(&self.token)
            .query(&[("page", page), ("limit", limit)])
            .send()
            .await?;
        Self::decode(response).await
    }

    async fn send_message(
        &self,
        conversation_id: Uuid,
        payload: &MessagePayload,
    ) -> Result<MessageView, ClientError> {
        let response = self
            .client
            .post(self.url(&format!("/conversations/{conversation_id}/messages")))
            .bearer_auth(&self.token)
            .json(payload)
            .send()
            .await?;
        Self::decode(response).await
    }
}
