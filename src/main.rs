use std::sync::Arc;
use std::time::Duration;

use actix_web::{web, App, HttpServer};
use relay_service::{
    config::Config,
    db, error, logging, metrics, migrations, routes,
    services::{DeliveryEngine, SessionTracker},
    state::AppState,
    websocket::{pubsub::ChatEventPublisher, ConnectionRegistry},
};

#[tokio::main]
async fn main() -> Result<(), error::AppError> {
    logging::init_tracing();
    let cfg = Arc::new(Config::from_env()?);

    let db = db::init_pool(&cfg).await?;
    migrations::run_all(&db).await?;

    let redis = redis::Client::open(cfg.redis_url.as_str())
        .map_err(|e| error::AppError::Config(format!("redis url: {e}")))?;
    let publisher = ChatEventPublisher::new(redis);

    let registry = ConnectionRegistry::new(Duration::from_secs(cfg.heartbeat_interval_secs));
    let sessions = SessionTracker::new();
    let engine = DeliveryEngine::new(
        db.clone(),
        registry.clone(),
        sessions.clone(),
        publisher,
        cfg.notification_ttl_days,
    );

    let state = AppState {
        db,
        registry,
        sessions,
        engine,
        config: cfg.clone(),
    };

    let bind_addr = format!("{}:{}", cfg.host, cfg.port);
    tracing::info!(%bind_addr, "starting relay-service");

    HttpServer::new(move || {
        let cors = actix_cors::Cors::default()
            .allow_any_origin()
            .allow_any_method()
            .allow_any_header()
            .max_age(3600);

        App::new()
            .wrap(cors)
            .app_data(web::Data::new(state.clone()))
            .service(routes::ws::chat_ws)
            .service(routes::ws::notifications_ws)
            .service(routes::ws::unknown_purpose_ws)
            .service(routes::chat::start_chat)
            .service(routes::chat::end_chat)
            .service(routes::chat::chat_history)
            .service(routes::chat::chat_partners)
            .service(routes::chat::unread_count)
            .service(routes::chat::mark_read)
            .service(routes::notifications::send_notification)
            .service(routes::notifications::broadcast_notification)
            .service(routes::connections::connection_stats)
            .service(routes::connections::active_users)
            .service(routes::connections::health)
            .route("/metrics", web::get().to(metrics::metrics_handler))
    })
    .bind(&bind_addr)
    .map_err(|e| error::AppError::StartServer(format!("bind: {e}")))?
    .run()
    .await
    .map_err(|e| error::AppError::StartServer(format!("run: {e}")))
}
