//! Chat session and history management.

use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use serde_json::json;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::models::MessageView;
use crate::routes::parse_identity;
use crate::state::AppState;
use crate::store::MessageStore;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    pub limit: Option<i64>,
}

#[post("/chat/start/{from_type}/{from_id}/{to_type}/{to_id}")]
pub async fn start_chat(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String, String)>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let (from_type, from_id, to_type, to_id) = path.into_inner();
    let from = parse_identity(&from_type, &from_id)?;
    let to = parse_identity(&to_type, &to_id)?;
    state.sessions.start(&state.db, &from, &to).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "chat_started",
        "from": from.key(),
        "to": to.key(),
    })))
}

/// 404 when the pair has no active session.
#[post("/chat/end/{from_type}/{from_id}/{to_type}/{to_id}")]
pub async fn end_chat(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String, String)>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let (from_type, from_id, to_type, to_id) = path.into_inner();
    let from = parse_identity(&from_type, &from_id)?;
    let to = parse_identity(&to_type, &to_id)?;
    state.sessions.end(&state.db, &from, &to).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "chat_ended",
        "from": from.key(),
        "to": to.key(),
    })))
}

/// Both directions of a pair's conversation, newest first, deleted messages
/// masked.
#[get("/chat/history/{a_type}/{a_id}/{b_type}/{b_id}")]
pub async fn chat_history(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String, String)>,
    query: web::Query<HistoryQuery>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let (a_type, a_id, b_type, b_id) = path.into_inner();
    let a = parse_identity(&a_type, &a_id)?;
    let b = parse_identity(&b_type, &b_id)?;
    let limit = query
        .limit
        .unwrap_or(50)
        .clamp(1, state.config.history_limit_cap);

    let messages = MessageStore::history_between(&state.db, &a, &b, limit).await?;
    let messages: Vec<MessageView> = messages.iter().map(MessageView::from_message).collect();
    Ok(HttpResponse::Ok().json(json!({ "messages": messages })))
}

#[get("/chat/partners/{client_type}/{user_id}")]
pub async fn chat_partners(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let (client_type, user_id) = path.into_inner();
    let me = parse_identity(&client_type, &user_id)?;
    let partners = state.sessions.partners_of(&state.db, &me).await?;
    Ok(HttpResponse::Ok().json(json!({ "partners": partners })))
}

#[get("/chat/unread/{client_type}/{user_id}")]
pub async fn unread_count(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let (client_type, user_id) = path.into_inner();
    let me = parse_identity(&client_type, &user_id)?;
    let unread = MessageStore::unread_count(&state.db, &me).await?;
    Ok(HttpResponse::Ok().json(json!({ "unread_count": unread })))
}

/// Marks everything `from` sent `to` as read.
#[post("/chat/mark-read/{to_type}/{to_id}/{from_type}/{from_id}")]
pub async fn mark_read(
    state: web::Data<AppState>,
    path: web::Path<(String, String, String, String)>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let (to_type, to_id, from_type, from_id) = path.into_inner();
    let to = parse_identity(&to_type, &to_id)?;
    let from = parse_identity(&from_type, &from_id)?;
    let updated = MessageStore::mark_read(&state.db, &to, &from).await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "marked_read",
        "updated": updated,
    })))
}
