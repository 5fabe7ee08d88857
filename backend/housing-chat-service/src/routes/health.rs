use crate::state::AppState;
use actix_web::{get, web, HttpResponse};
use serde_json::json;

#[get("/health")]
pub async fn health(state: web::Data<AppState>) -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "ok",
        "online_users": state.hub.registry().online_count().await,
    }))
}
