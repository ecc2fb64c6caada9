//! WebSocket establishment. The handle is opened and registered (with
//! backlog replay) before `ws::start`, so the actor only has to pump.

use actix_web::{get, web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::{ClientClass, Identity, Purpose};
use crate::state::AppState;
use crate::websocket::session::{ChatSocket, NotifySocket, RejectSocket};
use crate::websocket::ConnectionKey;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Externally-verified opaque identity token. Consumed, never parsed.
    pub token: Option<String>,
}

#[get("/ws/chat/{client_type}/{user_id}")]
pub async fn chat_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, Error> {
    let (client_type, user_id) = path.into_inner();
    let Some(class) = ClientClass::parse(&client_type) else {
        warn!(client_type = %client_type, "messaging socket with unknown client type");
        return ws::start(RejectSocket::invalid_client_type(), &req, stream);
    };
    let identity = Identity::new(class, user_id);
    if query.token.is_some() {
        debug!(user = %identity, "identity token presented");
    }

    let key = ConnectionKey::new(Purpose::Messaging, identity.clone());
    let (handle, rx) = state.engine.register_connection(key).await;

    let session = ChatSocket::new(identity, handle.clone(), rx, state.engine.clone());
    match ws::start(session, &req, stream) {
        Ok(response) => Ok(response),
        Err(error) => {
            state.engine.drop_connection(&handle).await;
            Err(error)
        }
    }
}

#[get("/ws/notifications/{client_type}/{user_id}")]
pub async fn notifications_ws(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
    path: web::Path<(String, String)>,
    query: web::Query<WsQuery>,
) -> Result<HttpResponse, Error> {
    let (client_type, user_id) = path.into_inner();
    let Some(class) = ClientClass::parse(&client_type) else {
        warn!(client_type = %client_type, "notifications socket with unknown client type");
        return ws::start(RejectSocket::invalid_client_type(), &req, stream);
    };
    let identity = Identity::new(class, user_id);
    if query.token.is_some() {
        debug!(user = %identity, "identity token presented");
    }

    let key = ConnectionKey::new(Purpose::Notifications, identity.clone());
    let (handle, rx) = state.engine.register_connection(key).await;

    let idle_timeout =
        std::time::Duration::from_secs(state.config.notification_idle_timeout_secs);
    let session = NotifySocket::new(
        identity,
        handle.clone(),
        rx,
        state.engine.clone(),
        idle_timeout,
    );
    match ws::start(session, &req, stream) {
        Ok(response) => Ok(response),
        Err(error) => {
            state.engine.drop_connection(&handle).await;
            Err(error)
        }
    }
}

/// Catch-all for `/ws/...` paths whose purpose segment is neither `chat`
/// nor `notifications`. The handshake still completes so the client sees an
/// application close code rather than a bare 404. Must be registered after
/// the concrete routes.
#[get("/ws/{purpose}/{client_type}/{user_id}")]
pub async fn unknown_purpose_ws(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<(String, String, String)>,
) -> Result<HttpResponse, Error> {
    let (purpose, ..) = path.into_inner();
    warn!(purpose = %purpose, "websocket with unknown purpose");
    ws::start(RejectSocket::invalid_purpose(), &req, stream)
}
