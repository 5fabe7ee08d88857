use crate::{error::AppError, state::AppState, websocket::WsSession};
use actix_middleware::bearer_token;
use actix_web::{get, web, Error, HttpRequest, HttpResponse, ResponseError};
use actix_web_actors::ws;
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: Option<String>,
}

/// GET /ws?token=...
/// The token is checked before the upgrade; the socket then waits for `join`.
#[get("/ws")]
pub async fn ws_handler(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    query: web::Query<WsParams>,
) -> Result<HttpResponse, Error> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer_token(req.headers()));

    let Some(token) = token else {
        tracing::warn!("websocket connection rejected: no token");
        return Ok(AppError::Unauthorized.error_response());
    };

    let user_id = match state.jwt.validate(token) {
        Ok(user_id) => user_id.0,
        Err(e) => {
            tracing::warn!(error = %e, "websocket connection rejected: invalid token");
            return Ok(AppError::Unauthorized.error_response());
        }
    };

    let session = WsSession::new(
        user_id,
        state.hub.clone(),
        state.config.ws_heartbeat_interval,
        state.config.ws_client_timeout,
    );
    ws::start(session, &req, stream)
}
