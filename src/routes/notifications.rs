//! Notification send and broadcast endpoints.

use actix_web::{post, web, HttpResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::AppError;
use crate::middleware::Caller;
use crate::models::{ClientClass, Purpose, Urgency};
use crate::routes::parse_identity;
use crate::state::AppState;
use crate::websocket::ServerEvent;

fn default_data() -> Value {
    json!({})
}

#[derive(Debug, Deserialize)]
pub struct NotificationRequest {
    pub title: String,
    pub body: String,
    #[serde(default = "default_data")]
    pub data: Value,
    #[serde(default)]
    pub urgency: Urgency,
}

/// Delivered live when the target has a NOTIFICATIONS connection, queued
/// durably otherwise.
#[post("/notifications/send/{to_type}/{to_id}")]
pub async fn send_notification(
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    body: web::Json<NotificationRequest>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let (to_type, to_id) = path.into_inner();
    let to = parse_identity(&to_type, &to_id)?;
    let request = body.into_inner();

    let receipt = state
        .engine
        .notify(&to, &request.title, &request.body, request.data, request.urgency)
        .await?;
    Ok(HttpResponse::Ok().json(json!({
        "status": "notification_sent",
        "notification_id": receipt.notification_id,
        "delivered_live": receipt.delivered_live,
    })))
}

/// Live-only fanout to every connected user of one class. Nothing is queued
/// for the absent.
#[post("/notifications/broadcast/{client_type}")]
pub async fn broadcast_notification(
    state: web::Data<AppState>,
    path: web::Path<String>,
    body: web::Json<NotificationRequest>,
    _caller: Caller,
) -> Result<HttpResponse, AppError> {
    let client_type = path.into_inner();
    let class = ClientClass::parse(&client_type)
        .ok_or_else(|| AppError::Validation(format!("invalid client type: {client_type}")))?;
    let request = body.into_inner();
    if request.title.trim().is_empty() || request.body.trim().is_empty() {
        return Err(AppError::Validation(
            "notification needs a title and a body".into(),
        ));
    }

    let event = ServerEvent::notification(
        &Uuid::new_v4().to_string(),
        &request.title,
        &request.body,
        &request.data,
        request.urgency,
        Utc::now(),
        false,
    );
    let results = state
        .engine
        .broadcast(Purpose::Notifications, class, &event)
        .await;
    let successful = results.values().filter(|delivered| **delivered).count();

    Ok(HttpResponse::Ok().json(json!({
        "status": "broadcast_sent",
        "total": results.len(),
        "successful": successful,
        "results": results,
    })))
}
