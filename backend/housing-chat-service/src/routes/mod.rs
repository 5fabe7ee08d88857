pub mod conversations;
pub mod health;
pub mod messages;
pub mod wsroute;

use crate::error::AppError;
use crate::metrics::metrics_handler;
use actix_middleware::{JwtAuthMiddleware, JwtValidator};
use actix_web::web;
use std::sync::Arc;

/// Mount every route. `/api/v1` requires a bearer token; `/ws` checks its own
/// token before upgrading.
pub fn configure(cfg: &mut web::ServiceConfig, jwt: Arc<JwtValidator>) {
    cfg.app_data(
        web::JsonConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::QueryConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .app_data(
        web::PathConfig::default()
            .error_handler(|err, _req| AppError::BadRequest(err.to_string()).into()),
    )
    .service(health::health)
    .route("/metrics", web::get().to(metrics_handler))
    .service(wsroute::ws_handler)
    .service(
        web::scope("/api/v1")
            .wrap(JwtAuthMiddleware::new(jwt))
            .service(conversations::list_conversations)
            .service(conversations::create_conversation)
            .service(conversations::mark_conversation_read)
            .service(conversations::list_messages)
            .service(conversations::send_message)
            .service(messages::get_message)
            .service(messages::edit_message)
            .service(messages::delete_message)
            .service(messages::add_reaction),
    );
}
