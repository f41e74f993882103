use axum::extract::ws::{CloseFrame, Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, timeout};

use crate::state::AppState;
use crate::ws::{protocol, OUTBOUND_BUFFER};

/// Liveness check for one connection. A ping goes out every
/// `ping_interval`; a peer that has not answered within `pong_timeout` is
/// treated as gone, which catches half-open sockets left behind by abrupt
/// disconnects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Heartbeat {
    pub ping_interval: Duration,
    pub pong_timeout: Duration,
}

impl Default for Heartbeat {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            pong_timeout: Duration::from_secs(10),
        }
    }
}

/// Run the actor-per-connection pattern for one WebSocket session.
///
/// Splits the WebSocket into reader and writer halves:
/// - Writer task: owns the sink, forwards messages from an mpsc channel
/// - Ping task: checks liveness and stops the reader when the peer is gone
/// - Reader loop: processes incoming frames, dispatches to protocol handlers
///
/// The mpsc sender is what the registry hands to fanout, so any part of the
/// system can push to this client without touching the socket.
pub async fn run_connection(socket: WebSocket, state: AppState, user_id: String) {
    let (ws_sender, mut ws_receiver) = socket.split();
    let (tx, rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
    let heartbeat = state.heartbeat;

    let was_online = state.connections.is_online(&user_id);
    let connection_id = state.connections.register(&user_id, tx.clone());
    if !was_online {
        tracing::info!(user_id = %user_id, "User online");
    }

    tracing::info!(
        user_id = %user_id,
        connection = ?connection_id,
        "WebSocket actor started"
    );

    // Spawn writer task: forwards mpsc messages to WebSocket sink
    let writer_handle = tokio::spawn(writer_task(ws_sender, rx, user_id.clone()));

    // Track pong reception
    let (pong_tx, mut pong_rx) = mpsc::unbounded_channel::<()>();

    // Fires (or drops) when the ping task decides the peer is gone
    let (dead_tx, mut dead_rx) = oneshot::channel::<()>();

    // Spawn ping task: sends periodic pings and monitors pong responses
    let ping_tx = tx.clone();
    let ping_user = user_id.clone();
    let ping_handle = tokio::spawn(async move {
        let mut ping_timer = interval(heartbeat.ping_interval);
        // Skip the first immediate tick
        ping_timer.tick().await;

        loop {
            ping_timer.tick().await;

            if ping_tx.send(Message::Ping(vec![1, 2, 3, 4].into())).await.is_err() {
                // Writer task has died, connection is gone
                break;
            }

            match timeout(heartbeat.pong_timeout, pong_rx.recv()).await {
                Ok(Some(())) => {}
                _ => {
                    tracing::warn!(user_id = %ping_user, "Pong timeout, closing connection");
                    let _ = ping_tx.try_send(Message::Close(Some(CloseFrame {
                        code: 1001,
                        reason: "Pong timeout".into(),
                    })));
                    break;
                }
            }
        }
        let _ = dead_tx.send(());
    });

    // Reader loop: process incoming WebSocket messages
    loop {
        let next = tokio::select! {
            next = ws_receiver.next() => next,
            _ = &mut dead_rx => {
                tracing::info!(user_id = %user_id, "Peer unresponsive, dropping connection");
                break;
            }
        };
        match next {
            Some(Ok(msg)) => match msg {
                Message::Text(text) => {
                    protocol::handle_text_message(text.as_str(), &tx, &state, &user_id).await;
                }
                Message::Binary(data) => {
                    // Frames are JSON text; binary is not part of the protocol
                    tracing::debug!(
                        user_id = %user_id,
                        bytes = data.len(),
                        "Ignoring binary frame"
                    );
                }
                Message::Pong(_) => {
                    let _ = pong_tx.send(());
                }
                Message::Ping(data) => {
                    let _ = tx.try_send(Message::Pong(data));
                }
                Message::Close(frame) => {
                    tracing::info!(
                        user_id = %user_id,
                        reason = ?frame,
                        "Client initiated close"
                    );
                    break;
                }
            },
            Some(Err(e)) => {
                tracing::warn!(
                    user_id = %user_id,
                    error = %e,
                    "WebSocket receive error"
                );
                break;
            }
            None => {
                tracing::info!(user_id = %user_id, "WebSocket stream ended");
                break;
            }
        }
    }

    // Cleanup: abort writer and ping tasks. In-flight pushes are dropped.
    writer_handle.abort();
    ping_handle.abort();

    if state.connections.unregister(&user_id, connection_id) {
        tracing::info!(user_id = %user_id, "User offline");
    }

    tracing::info!(
        user_id = %user_id,
        connection = ?connection_id,
        "WebSocket actor stopped"
    );
}

/// Writer task: receives messages from mpsc channel and forwards them to the WebSocket sink.
/// Exits on the first failed write, which closes the channel and makes the
/// next fanout to this connection evict it.
async fn writer_task(
    mut ws_sender: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
    user_id: String,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = ws_sender.send(msg).await {
            tracing::debug!(user_id = %user_id, error = %e, "WebSocket send failed");
            break;
        }
    }
}
