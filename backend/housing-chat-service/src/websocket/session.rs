use super::hub::RealtimeHub;
use super::message_types::{WsInboundEvent, WsOutboundEvent};
use super::ConnectionId;
use crate::metrics;
use actix::{
    Actor, ActorContext, ActorFutureExt, AsyncContext, Handler, Message as ActixMessage,
    StreamHandler, WrapFuture,
};
use actix_web_actors::ws;
use chrono::Utc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_stream::{wrappers::UnboundedReceiverStream, StreamExt};
use uuid::Uuid;

/// Frame queued for this socket by the registry.
#[derive(ActixMessage)]
#[rtype(result = "()")]
struct Outbound(String);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Connected,
    Identified,
}

pub struct WsSession {
    /// Subject of the token presented at upgrade.
    user_id: Uuid,
    connection: ConnectionId,
    phase: Phase,
    hub: RealtimeHub,
    sender: UnboundedSender<String>,
    receiver: Option<UnboundedReceiver<String>>,
    hb: Instant,
    heartbeat_interval: Duration,
    client_timeout: Duration,
}

impl WsSession {
    pub fn new(
        user_id: Uuid,
        hub: RealtimeHub,
        heartbeat_interval: Duration,
        client_timeout: Duration,
    ) -> Self {
        let (sender, receiver) = unbounded_channel();
        Self {
            user_id,
            connection: ConnectionId::new(),
            phase: Phase::Connected,
            hub,
            sender,
            receiver: Some(receiver),
            hb: Instant::now(),
            heartbeat_interval,
            client_timeout,
        }
    }

    fn hb(&self, ctx: &mut ws::WebsocketContext<Self>) {
        let timeout = self.client_timeout;
        ctx.run_interval(self.heartbeat_interval, move |act, ctx| {
            if Instant::now().duration_since(act.hb) > timeout {
                tracing::warn!(user_id = %act.user_id, "websocket heartbeat failed, disconnecting");
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn reply(ctx: &mut ws::WebsocketContext<Self>, event: &WsOutboundEvent) {
        ctx.text(event.to_frame());
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        let event = match serde_json::from_str::<WsInboundEvent>(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(user_id = %self.user_id, error = %e, "failed to parse ws frame");
                Self::reply(ctx, &WsOutboundEvent::invalid_frame(e));
                return;
            }
        };

        match (self.phase, event) {
            (_, WsInboundEvent::Join { user_id }) if user_id != self.user_id => {
                tracing::warn!(
                    token_user = %self.user_id,
                    claimed_user = %user_id,
                    "join rejected, identity mismatch"
                );
                Self::reply(ctx, &WsOutboundEvent::identity_mismatch());
            }
            (_, WsInboundEvent::Join { user_id }) => {
                self.phase = Phase::Identified;
                let hub = self.hub.clone();
                let connection = self.connection;
                let sender = self.sender.clone();
                ctx.wait(
                    async move { hub.join(user_id, connection, sender).await }.into_actor(self),
                );
            }
            (Phase::Connected, other) => {
                tracing::debug!(event = other.name(), "event before join rejected");
                Self::reply(ctx, &WsOutboundEvent::not_joined());
            }
            (Phase::Identified, event) => {
                let hub = self.hub.clone();
                let user_id = self.user_id;
                // wait() holds back later frames until this one is handled
                ctx.wait(
                    async move { dispatch(&hub, user_id, event).await }
                        .into_actor(self)
                        .map(|reply, _act, ctx| {
                            if let Some(reply) = reply {
                                Self::reply(ctx, &reply);
                            }
                        }),
                );
            }
        }
    }
}

/// Handle one event from an identified connection. Returns the frame to send
/// back to the same socket, if any.
async fn dispatch(hub: &RealtimeHub, user_id: Uuid, event: WsInboundEvent) -> Option<WsOutboundEvent> {
    let name = event.name();
    let result = match event {
        WsInboundEvent::SendMessage {
            conversation_id,
            recipient_id,
            message,
        } => hub
            .relay_message(user_id, conversation_id, recipient_id, message.id)
            .await
            .map(|_| None),
        WsInboundEvent::Typing {
            conversation_id,
            recipient_id,
            is_typing,
        } => hub
            .relay_typing(user_id, conversation_id, recipient_id, is_typing)
            .await
            .map(|_| None),
        WsInboundEvent::RequestStatus { user_id: target } => Ok(Some(hub.status(target).await)),
        // identity checks happen before dispatch
        WsInboundEvent::Join { .. } => Ok(None),
    };

    match result {
        Ok(reply) => reply,
        Err(e) => {
            tracing::debug!(user_id = %user_id, event = name, error = %e, "ws event rejected");
            metrics::record_event(name, "rejected");
            Some(WsOutboundEvent::from(&e))
        }
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session started");
        metrics::WS_CONNECTIONS.inc();
        self.hb(ctx);

        if let Some(receiver) = self.receiver.take() {
            ctx.add_message_stream(UnboundedReceiverStream::new(receiver).map(Outbound));
        }
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        tracing::info!(user_id = %self.user_id, "websocket session stopped");
        metrics::WS_CONNECTIONS.dec();

        if self.phase == Phase::Identified {
            let hub = self.hub.clone();
            let user_id = self.user_id;
            let connection = self.connection;
            actix::spawn(async move {
                hub.disconnect(user_id, connection, Utc::now()).await;
            });
        }
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) {
        ctx.text(msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(msg)) => {
                self.hb = Instant::now();
                ctx.pong(&msg);
            }
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.hb = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Binary(_)) => {
                tracing::warn!("binary websocket messages not supported");
                Self::reply(ctx, &WsOutboundEvent::invalid_frame("binary frames are not supported"));
            }
            Ok(ws::Message::Close(reason)) => {
                tracing::debug!(reason = ?reason, "websocket close received");
                ctx.close(reason);
                ctx.stop();
            }
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "websocket protocol error");
                ctx.stop();
            }
        }
    }
}
