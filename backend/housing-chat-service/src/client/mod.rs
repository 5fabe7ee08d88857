//! Client-side conversation controller plus its HTTP and WebSocket adapters.

pub mod api;
pub mod link;
pub mod session;

pub use api::{ChatApi, HttpChatApi};
pub use link::{RealtimeLink, WsRealtimeLink};
pub use session::ChatSession;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server rejected request ({status} {code}): {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("realtime transport error: {0}")]
    Transport(String),

    #[error("realtime link closed")]
    Closed,

    #[error("invalid payload: {0}")]
    Decode(#[from] serde_json::Error),
}
