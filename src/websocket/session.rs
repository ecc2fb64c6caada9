//! WebSocket actor sessions, one actor per accepted socket.
//!
//! The route handler opens and registers the connection handle before
//! `ws::start`; the actor pumps the handle's outbound channel into the
//! socket and feeds inbound frames to the delivery engine.

use std::time::{Duration, Instant};

use actix::{
    Actor, ActorContext, AsyncContext, Handler, Message as ActixMessage, StreamHandler,
};
use actix_web_actors::ws;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedReceiver;
use tracing::{debug, info, warn};

use crate::error::AppResult;
use crate::models::{ClientClass, Identity};
use crate::services::{DeliveryEngine, OutgoingMessage};
use crate::websocket::frames::InboundFrame;
use crate::websocket::{ConnectionHandle, ConnectionState, ServerEvent};

/// How often the notifications idle watchdog wakes up.
const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Outbound(String);

/// MESSAGING-purpose session.
pub struct ChatSocket {
    identity: Identity,
    handle: ConnectionHandle,
    outbound: Option<UnboundedReceiver<String>>,
    engine: DeliveryEngine,
}

impl ChatSocket {
    pub fn new(
        identity: Identity,
        handle: ConnectionHandle,
        outbound: UnboundedReceiver<String>,
        engine: DeliveryEngine,
    ) -> Self {
        Self {
            identity,
            handle,
            outbound: Some(outbound),
            engine,
        }
    }

    fn handle_frame(&self, raw: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let frame = match InboundFrame::parse(raw) {
            Ok(frame) => frame,
            Err(error) => {
                let _ = self.handle.push_json(&error.to_payload());
                return;
            }
        };

        let engine = self.engine.clone();
        let handle = self.handle.clone();
        let identity = self.identity.clone();
        // wait() blocks this actor's mailbox until the frame is processed,
        // which keeps a sender's messages in store order.
        ctx.wait(actix::fut::wrap_future::<_, Self>(async move {
            if let Some(reply) = process_frame(&engine, &identity, frame).await {
                let _ = handle.push_json(&reply);
            }
        }));
    }
}

impl Actor for ChatSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(user = %self.identity, connection_id = %self.handle.id(), "messaging socket connected");
        if let Some(mut rx) = self.outbound.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    addr.do_send(Outbound(frame));
                }
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(user = %self.identity, connection_id = %self.handle.id(), "messaging socket disconnected");
        let engine = self.engine.clone();
        let handle = self.handle.clone();
        actix::spawn(async move {
            engine.drop_connection(&handle).await;
        });
    }
}

impl Handler<Outbound> for ChatSocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for ChatSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.handle_frame(&text, ctx),
            Ok(ws::Message::Ping(payload)) => ctx.pong(&payload),
            Ok(ws::Message::Pong(_)) => {}
            Ok(ws::Message::Binary(_)) => {
                debug!(user = %self.identity, "binary frames are not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(user = %self.identity, ?reason, "client closed messaging socket");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, user = %self.identity, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

async fn process_frame(
    engine: &DeliveryEngine,
    identity: &Identity,
    frame: InboundFrame,
) -> Option<Value> {
    match frame {
        InboundFrame::Pong => None,
        InboundFrame::Send(send) => {
            let Some(to_class) = ClientClass::parse(&send.to_type) else {
                return Some(json!({ "error": "Invalid to_type" }));
            };
            let outgoing = OutgoingMessage {
                from: identity.clone(),
                to: Identity::new(to_class, send.to_id),
                from_name: send.from_name,
                text: send.text,
                media_type: send.media_type,
                media_url: send.media_url,
                message_id: send.message_id,
            };
            match engine.send(outgoing).await {
                Ok(receipt) if receipt.duplicate => Some(json!({
                    "status": "sent",
                    "message_id": receipt.message_id,
                    "duplicate": true,
                })),
                Ok(receipt) => Some(json!({
                    "status": "sent",
                    "message_id": receipt.message_id,
                })),
                Err(error) => {
                    warn!(%error, from = %identity, "send failed");
                    Some(json!({ "status": "error", "error": "Failed to send message" }))
                }
            }
        }
        InboundFrame::Edit(edit) => status_reply(
            engine.edit(&edit.message_id, identity, &edit.new_text).await,
            "edited",
        ),
        InboundFrame::Delete(del) => {
            status_reply(engine.delete(&del.message_id, identity).await, "deleted")
        }
        InboundFrame::React(react) => status_reply(
            engine.react(&react.message_id, identity, &react.reaction).await,
            "reacted",
        ),
        InboundFrame::RemoveReact(react) => status_reply(
            engine.unreact(&react.message_id, identity, &react.reaction).await,
            "reaction_removed",
        ),
    }
}

fn status_reply(result: AppResult<bool>, ok: &'static str) -> Option<Value> {
    match result {
        Ok(true) => Some(json!({ "status": ok })),
        Ok(false) => Some(json!({ "status": "error" })),
        Err(error) => {
            warn!(%error, "message operation failed");
            Some(json!({ "status": "error" }))
        }
    }
}

/// NOTIFICATIONS-purpose session. Mostly write-only; the watchdog pings the
/// client after an idle period and pongs reset the clock.
pub struct NotifySocket {
    identity: Identity,
    handle: ConnectionHandle,
    outbound: Option<UnboundedReceiver<String>>,
    engine: DeliveryEngine,
    idle_timeout: Duration,
    last_seen: Instant,
}

impl NotifySocket {
    pub fn new(
        identity: Identity,
        handle: ConnectionHandle,
        outbound: UnboundedReceiver<String>,
        engine: DeliveryEngine,
        idle_timeout: Duration,
    ) -> Self {
        Self {
            identity,
            handle,
            outbound: Some(outbound),
            engine,
            idle_timeout,
            last_seen: Instant::now(),
        }
    }

    fn watch_idle(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(IDLE_CHECK_INTERVAL, |act, ctx| {
            if act.last_seen.elapsed() < act.idle_timeout {
                return;
            }
            if act.handle.push(&ServerEvent::ping()).is_err() {
                act.handle.set_state(ConnectionState::IdleTimeout);
                warn!(user = %act.identity, "idle notifications socket is dead, stopping");
                ctx.stop();
                return;
            }
            // One ping per idle period; silence just produces another.
            act.last_seen = Instant::now();
        });
    }
}

impl Actor for NotifySocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(user = %self.identity, connection_id = %self.handle.id(), "notifications socket connected");
        self.watch_idle(ctx);
        if let Some(mut rx) = self.outbound.take() {
            let addr = ctx.address();
            actix::spawn(async move {
                while let Some(frame) = rx.recv().await {
                    addr.do_send(Outbound(frame));
                }
            });
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!(user = %self.identity, connection_id = %self.handle.id(), "notifications socket disconnected");
        let engine = self.engine.clone();
        let handle = self.handle.clone();
        actix::spawn(async move {
            engine.drop_connection(&handle).await;
        });
    }
}

impl Handler<Outbound> for NotifySocket {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for NotifySocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            // Pongs and any text reset the idle clock; content is ignored.
            Ok(ws::Message::Text(_)) | Ok(ws::Message::Pong(_)) => {
                self.last_seen = Instant::now();
            }
            Ok(ws::Message::Ping(payload)) => {
                self.last_seen = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Close(reason)) => {
                debug!(user = %self.identity, ?reason, "client closed notifications socket");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(error) => {
                warn!(%error, user = %self.identity, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}

/// Completes the handshake, then closes with an application close code.
/// Used when the path carries a client type outside the closed set.
pub struct RejectSocket {
    code: u16,
    reason: &'static str,
}

impl RejectSocket {
    pub fn invalid_client_type() -> Self {
        Self {
            code: 4000,
            reason: "Invalid client type",
        }
    }

    pub fn invalid_purpose() -> Self {
        Self {
            code: 4001,
            reason: "Invalid purpose",
        }
    }
}

impl Actor for RejectSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!(code = self.code, reason = self.reason, "rejecting websocket after handshake");
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::from(self.code),
            description: Some(self.reason.to_string()),
        }));
        ctx.stop();
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for RejectSocket {
    fn handle(&mut self, _msg: Result<ws::Message, ws::ProtocolError>, _ctx: &mut Self::Context) {}
}
