use crate::{
    error::AppError,
    middleware::guards::User,
    services::MessageService,
    state::AppState,
    websocket::WsOutboundEvent,
};
use actix_web::{delete, get, patch, post, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use uuid::Uuid;

#[derive(Debug, Deserialize)]
pub struct EditMessageRequest {
    pub content: String,
}

#[derive(Debug, Deserialize)]
pub struct AddReactionRequest {
    pub emoji: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeleteScope {
    #[default]
    ForMe,
    ForEveryone,
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    #[serde(default)]
    pub scope: DeleteScope,
}

/// Tell the other participant about a change made over REST. Failures are
/// logged only; the change itself is already stored.
async fn push_to_peer(state: &AppState, conversation_id: Uuid, actor: Uuid, event: WsOutboundEvent) {
    match state.store.find_conversation(conversation_id).await {
        Ok(Some(conversation)) => {
            state.hub.notify_peer(&conversation, actor, &event).await;
        }
        Ok(None) => {}
        Err(e) => {
            tracing::warn!(
                conversation_id = %conversation_id,
                event = event.name(),
                error = %e,
                "could not load conversation for realtime push"
            );
        }
    }
}

#[get("/messages/{id}")]
pub async fn get_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
) -> Result<HttpResponse, AppError> {
    let view = MessageService::find(
        state.store.as_ref(),
        state.directory.as_ref(),
        message_id.into_inner(),
        user.id,
    )
    .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// PATCH /messages/{id}
/// Edit a text message within the edit window
#[patch("/messages/{id}")]
pub async fn edit_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
    body: web::Json<EditMessageRequest>,
) -> Result<HttpResponse, AppError> {
    let view = MessageService::edit(
        state.store.as_ref(),
        state.directory.as_ref(),
        message_id.into_inner(),
        user.id,
        body.into_inner().content,
        state.config.edit_window(),
        Utc::now(),
    )
    .await?;

    let conversation_id = view.message.conversation_id;
    push_to_peer(
        &state,
        conversation_id,
        user.id,
        WsOutboundEvent::MessageEdited {
            conversation_id,
            message: view.clone(),
        },
    )
    .await;

    Ok(HttpResponse::Ok().json(view))
}

/// DELETE /messages/{id}?scope=for_me|for_everyone
#[delete("/messages/{id}")]
pub async fn delete_message(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
    query: web::Query<DeleteQuery>,
) -> Result<HttpResponse, AppError> {
    let message_id = message_id.into_inner();
    match query.scope {
        DeleteScope::ForMe => {
            MessageService::delete_for_me(state.store.as_ref(), message_id, user.id).await?;
        }
        DeleteScope::ForEveryone => {
            let deleted =
                MessageService::delete_for_everyone(state.store.as_ref(), message_id, user.id)
                    .await?;
            push_to_peer(
                &state,
                deleted.conversation_id,
                user.id,
                WsOutboundEvent::MessageDeleted {
                    conversation_id: deleted.conversation_id,
                    message_id: deleted.id,
                },
            )
            .await;
        }
    }
    Ok(HttpResponse::NoContent().finish())
}

/// POST /messages/{id}/reactions
#[post("/messages/{id}/reactions")]
pub async fn add_reaction(
    state: web::Data<AppState>,
    user: User,
    message_id: web::Path<Uuid>,
    body: web::Json<AddReactionRequest>,
) -> Result<HttpResponse, AppError> {
    let view = MessageService::react(
        state.store.as_ref(),
        state.directory.as_ref(),
        message_id.into_inner(),
        user.id,
        body.into_inner().emoji,
    )
    .await?;

    let conversation_id = view.message.conversation_id;
    push_to_peer(
        &state,
        conversation_id,
        user.id,
        WsOutboundEvent::ReactionAdded {
            conversation_id,
            message_id: view.id(),
            reactions: view.message.reactions.clone(),
        },
    )
    .await;

    Ok(HttpResponse::Ok().json(view))
}
