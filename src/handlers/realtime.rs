//! WebSocket sessions on `/ws/:channel`.

use crate::broker::{Broker, Subscriber};
use crate::state::AppState;
use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Path, State,
    },
    response::IntoResponse,
};
use futures::{SinkExt, StreamExt};
use std::sync::Arc;

pub async fn subscribe(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(channel): Path<String>,
) -> impl IntoResponse {
    let broker = state.broker.clone();
    ws.on_upgrade(move |socket| session(socket, broker, channel))
}

/// Text relayed to the other subscribers of `channel`.
pub fn relay_text(channel: &str, text: &str) -> String {
    format!("{}: {}", channel, text)
}

async fn session(socket: WebSocket, broker: Arc<Broker>, channel: String) {
    let (subscriber, mut outbound) = Subscriber::channel();
    let id = subscriber.id();
    broker.connect(&channel, subscriber);
    tracing::info!(channel = %channel, connection = %id, "websocket connected");

    let (mut sink, mut stream) = socket.split();
    let mut forward = tokio::spawn(async move {
        while let Some(text) = outbound.recv().await {
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    broker.broadcast_from(&channel, id, &relay_text(&channel, &text));
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    tracing::debug!(channel = %channel, connection = %id, error = %e, "websocket read failed");
                    break;
                }
                Some(Ok(_)) => {}
            },
            _ = &mut forward => break,
        }
    }

    broker.disconnect(&channel, id);
    forward.abort();
    tracing::info!(channel = %channel, connection = %id, "websocket disconnected");
}
