use actix_web::{middleware, web, App, HttpServer};
use notification_relay_service::{
    config::Config,
    error::AppError,
    handlers, logging,
    services::{RedisBroker, RedisCredentialStore},
    state::AppState,
};
use redis_utils::RedisPool;
use std::sync::Arc;

#[actix_web::main]
async fn main() -> Result<(), AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    tracing::info!(
        credential_prefix = %cfg.credential_prefix,
        delegated_lookup = cfg.delegated_lookup_url.as_deref().unwrap_or("disabled"),
        broker_error_policy = ?cfg.broker_error_policy,
        "Starting notification relay service"
    );

    let redis_pool = RedisPool::connect(&cfg.redis_url)
        .await
        .map_err(|e| AppError::StartServer(format!("redis: {e:#}")))?;

    let state = AppState::new(
        cfg.clone(),
        Arc::new(RedisCredentialStore::new(redis_pool.manager())),
        Arc::new(RedisBroker::new(redis_pool.clone())),
    );

    let bind_addr = cfg.bind_addr();
    tracing::info!(%bind_addr, "listening for realtime connections");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .wrap(middleware::Logger::default())
            .configure(handlers::register_routes)
    })
    .bind(&bind_addr)
    .map_err(|e| AppError::StartServer(format!("bind {bind_addr}: {e}")))?
    .run()
    .await
    .map_err(|e| AppError::StartServer(format!("http server: {e}")))
}
