use actix_middleware::MetricsMiddleware;
use actix_web::{middleware::Logger, web, App, HttpServer};
use housing_chat_service::{config, error, logging, metrics, routes, state::AppState};

#[actix_web::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    metrics::init();

    let cfg = config::Config::from_env()?;
    let port = cfg.port;
    let state = AppState::from_config(cfg).await?;
    tracing::info!(
        port,
        presence_scope = ?state.config.presence_scope,
        edit_window_minutes = state.config.edit_window_minutes,
        "starting housing-chat-service"
    );

    let jwt = state.jwt.clone();
    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(MetricsMiddleware)
            .wrap(Logger::default())
            .configure(|cfg| routes::configure(cfg, jwt.clone()))
    })
    .bind(("0.0.0.0", port))
    .map_err(|e| error::AppError::StartServer(format!("bind {port}: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(e.to_string()))
}
