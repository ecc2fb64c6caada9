//! Connection introspection and service health.

use actix_web::{get, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::models::{ClientClass, Purpose};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ActiveUsersQuery {
    pub purpose: Option<String>,
    pub client_type: Option<String>,
}

#[get("/connections/stats")]
pub async fn connection_stats(
    state: web::Data<AppState>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let stats = state.registry.stats().await;
    Ok(HttpResponse::Ok().json(json!({
        "total_connections": stats.total_connections,
        "by_purpose": stats.by_purpose,
        "by_client_class": stats.by_client_class,
        "active_heartbeats": stats.active_heartbeats,
        "session_cache_entries": state.sessions.cached_identities().await,
    })))
}

/// Connected user ids grouped by `purpose:client_class`, optionally
/// narrowed to one purpose or one class.
#[get("/connections/active-users")]
pub async fn active_users(
    state: web::Data<AppState>,
    query: web::Query<ActiveUsersQuery>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let purpose = match query.purpose.as_deref() {
        Some(raw) => Some(
            Purpose::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown purpose: {raw}")))?,
        ),
        None => None,
    };
    let class = match query.client_type.as_deref() {
        Some(raw) => Some(
            ClientClass::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("unknown client type: {raw}")))?,
        ),
        None => None,
    };
    let users = state.registry.active_users(purpose, class).await;
    Ok(HttpResponse::Ok().json(users))
}

#[get("/health")]
pub async fn health() -> HttpResponse {
    HttpResponse::Ok().json(json!({
        "status": "healthy",
        "service": "relay-service",
    }))
}
