//! Websocket transport for sessions.
//!
//! The socket is split: this task reads client frames into the session's
//! inbound channel while a writer task drains the session's outbound
//! channel. Server frames go out as binary JSON.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, warn};

use crate::session::{spawn_session, SessionHandle};
use crate::web::AppState;

pub async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let (mut sink, mut stream) = socket.split();
    let SessionHandle {
        inbound,
        mut outbound,
        task,
    } = spawn_session(state.engine.clone(), state.session_config.clone());
    state.sessions.fetch_add(1, Ordering::Relaxed);

    let writer = tokio::spawn(async move {
        while let Some(frame) = outbound.recv().await {
            if sink.send(Message::Binary(frame)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(Ok(msg)) = stream.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Binary(bytes) => match String::from_utf8(bytes) {
                Ok(text) => text,
                Err(_) => {
                    warn!("dropping non-UTF-8 binary frame");
                    continue;
                }
            },
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => continue,
        };
        if inbound.send(text).await.is_err() {
            break;
        }
    }
    debug!("websocket closed by client");

    // Closing inbound ends the session, which closes outbound and the writer.
    drop(inbound);
    let _ = task.await;
    let _ = writer.await;
    state.sessions.fetch_sub(1, Ordering::Relaxed);
}
