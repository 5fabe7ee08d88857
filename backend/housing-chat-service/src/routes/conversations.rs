use crate::{
    error::AppError,
    middleware::guards::User,
    models::MessagePayload,
    services::{ConversationService, MessageService, Page},
    state::AppState,
};
use actix_web::{get, post, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Default, Deserialize)]
pub struct PageQuery {
    pub page: Option<u32>,
    pub limit: Option<u32>,
}

impl PageQuery {
    fn resolve(&self, state: &AppState) -> Result<Page, AppError> {
        Page::resolve(
            self.page,
            self.limit,
            state.config.default_page_limit,
            state.config.max_page_limit,
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct CreateConversationRequest {
    pub other_user_id: Uuid,
    pub property_id: Uuid,
}

/// GET /conversations
/// Conversations of the caller, most recent activity first
#[get("/conversations")]
pub async fn list_conversations(
    state: web::Data<AppState>,
    user: User,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = if query.page.is_some() || query.limit.is_some() {
        Some(query.resolve(&state)?)
    } else {
        None
    };
    let conversations = ConversationService::list_for_user(
        state.store.as_ref(),
        state.directory.as_ref(),
        user.id,
        page,
    )
    .await?;
    Ok(HttpResponse::Ok().json(conversations))
}

/// POST /conversations
/// Find or start the conversation with another user about a property
#[post("/conversations")]
pub async fn create_conversation(
    state: web::Data<AppState>,
    user: User,
    body: web::Json<CreateConversationRequest>,
) -> Result<HttpResponse, AppError> {
    let conversation = ConversationService::find_or_create(
        state.store.as_ref(),
        user.id,
        body.other_user_id,
        body.property_id,
        Utc::now(),
    )
    .await?;
    let view = ConversationService::view(
        state.store.as_ref(),
        state.directory.as_ref(),
        conversation,
        user.id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(view))
}

#[post("/conversations/{id}/read")]
pub async fn mark_conversation_read(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let conversation =
        ConversationService::mark_read(state.store.as_ref(), conversation_id.into_inner(), user.id)
            .await?;
    let view = ConversationService::view(
        state.store.as_ref(),
        state.directory.as_ref(),
        conversation,
        user.id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// GET /conversations/{id}/messages
/// One page in chronological order; marks the page's conversation as read
#[get("/conversations/{id}/messages")]
pub async fn list_messages(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    query: web::Query<PageQuery>,
) -> Result<HttpResponse, AppError> {
    let page = query.resolve(&state)?;
    let messages = MessageService::list(
        state.store.as_ref(),
        state.directory.as_ref(),
        conversation_id.into_inner(),
        user.id,
        page,
    )
    .await?;
    Ok(HttpResponse::Ok().json(messages))
}

#[post("/conversations/{id}/messages")]
pub async fn send_message(
    state: web::Data<AppState>,
    user: User,
    conversation_id: web::Path<Uuid>,
    body: web::Json<MessagePayload>,
) -> Result<HttpResponse, AppError> {
    let view = MessageService::send(
        state.store.as_ref(),
        state.directory.as_ref(),
        conversation_id.into_inner(),
        user.id,
        body.into_inner(),
        Utc::now(),
    )
    .await?;
    Ok(HttpResponse::Created().json(view))
}
