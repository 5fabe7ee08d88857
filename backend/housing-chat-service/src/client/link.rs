use super::ClientError;
use crate::websocket::{WsInboundEvent, WsOutboundEvent};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio_tungstenite::{connect_async, tungstenite::Message};

/// Outgoing half of the realtime channel.
#[async_trait]
pub trait RealtimeLink: Send + Sync {
    async fn emit(&self, event: WsInboundEvent) -> Result<(), ClientError>;
}

/// WebSocket link. Frames are written by a background task fed through a
/// channel; decoded server events arrive on the receiver returned by
/// [`WsRealtimeLink::connect`].
#[derive(Clone)]
pub struct WsRealtimeLink {
    outgoing: UnboundedSender<String>,
}

impl WsRealtimeLink {
    /// `ws_url` is the `/ws` endpoint, e.g. `ws://localhost:3000/ws`.
    pub async fn connect(
        ws_url: &str,
        token: &str,
    ) -> Result<(Self, UnboundedReceiver<WsOutboundEvent>), ClientError> {
        let (stream, _) = connect_async(format!("{ws_url}?token={token}"))
            .await
            .map_err(|e| ClientError::Transport(e.to_string()))?;
        let (mut write, mut read) = stream.split();

        let (out_tx, mut out_rx) = unbounded_channel::<String>();
        let (event_tx, event_rx) = unbounded_channel();

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                if let Err(e) = write.send(Message::text(frame)).await {
                    tracing::warn!(error = %e, "realtime write failed");
                    break;
                }
            }
            let _ = write.close().await;
        });

        tokio::spawn(async move {
            while let Some(frame) = read.next().await {
                match frame {
                    Ok(Message::Text(text)) => match serde_json::from_str::<WsOutboundEvent>(&text) {
                        Ok(event) => {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "undecodable realtime event"),
                    },
                    Ok(Message::Close(_)) => break,
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "realtime read failed");
                        break;
                    }
                }
            }
        });

        Ok((Self { outgoing: out_tx }, event_rx))
    }
}

#[async_trait]
impl RealtimeLink for WsRealtimeLink {
    async fn emit(&self, event: WsInboundEvent) -> Result<(), ClientError> {
        let frame = serde_json::to_string(&event)?;
        self.outgoing.send(frame).map_err(|_| ClientError::Closed)
    }
}
