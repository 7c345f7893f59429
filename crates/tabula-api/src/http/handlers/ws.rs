//! WebSocket chat adapter for a live session.
//!
//! `/api/v1/ws/{id}` upgrades to a WebSocket bound to one registered
//! session. Inbound frames are JSON:
//!
//! - `{"type":"chat","text":"..."}` and `{"type":"export","filename":"..."}`
//!   go to the engine;
//! - `{"type":"ping"}` is answered with `{"type":"pong"}`.
//!
//! Engine outputs are forwarded as `{"type":"stats"|"chat","text":...}` and
//! failures as `{"type":"error","message":...}`. Frames are handled one at a
//! time under the session lock, so a message sent while a step runs waits
//! for it. The socket is still read during a step: closing it cancels the
//! step and evicts the session. Eviction from elsewhere (DELETE, idle
//! sweep) closes the socket.

use std::collections::VecDeque;

use axum::extract::ws::{Message, Utf8Bytes, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::IntoResponse;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};

use tabula_types::message::{EngineOutput, InboundMessage};
use tabula_types::session::SessionId;

use crate::http::error::AppError;
use crate::state::AppState;

use super::session::parse_session_id;

/// Frame sent by a WebSocket client.
#[derive(Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsInbound {
    Chat {
        text: String,
    },
    Export {
        #[serde(default)]
        filename: Option<String>,
    },
    Ping,
}

impl WsInbound {
    /// The engine message carried by this frame, if any.
    fn into_engine_message(self) -> Option<InboundMessage> {
        match self {
            WsInbound::Chat { text } => Some(InboundMessage::Chat { text }),
            WsInbound::Export { filename } => Some(InboundMessage::Export { filename }),
            WsInbound::Ping => None,
        }
    }
}

/// Control frames produced by the adapter itself.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WsControl {
    Error { message: String },
    Pong,
}

/// GET /api/v1/ws/{id} - Attach a WebSocket to an existing session.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<impl IntoResponse, AppError> {
    let id = parse_session_id(&session_id)?;
    state.sessions.get(&id)?;
    Ok(ws.on_upgrade(move |socket| handle_ws_connection(socket, state, id)))
}

async fn handle_ws_connection(socket: WebSocket, state: AppState, id: SessionId) {
    let Ok(slot) = state.sessions.get(&id) else {
        tracing::debug!(session_id = %id, "session gone before upgrade finished");
        return;
    };
    let cancel = slot.cancel_token().clone();
    let (mut sender, mut receiver) = socket.split();
    tracing::info!(session_id = %id, "websocket attached");

    // Text frames that arrived while a turn was running.
    let mut queued: VecDeque<Utf8Bytes> = VecDeque::new();

    loop {
        let text = match queued.pop_front() {
            Some(text) => text,
            None => {
                let frame = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => {
                        let _ = send_json(&mut sender, &WsControl::Error {
                            message: "session evicted".to_string(),
                        }).await;
                        break;
                    }
                    frame = receiver.next() => frame,
                };
                match read_frame(frame) {
                    FrameRead::Text(text) => text,
                    FrameRead::Skip => continue,
                    FrameRead::Closed => break,
                }
            }
        };

        let inbound = match serde_json::from_str::<WsInbound>(&text) {
            Ok(inbound) => inbound,
            Err(err) => {
                tracing::warn!(session_id = %id, error = %err, "malformed websocket frame");
                let reply = WsControl::Error {
                    message: format!("malformed message: {err}"),
                };
                if send_json(&mut sender, &reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        let Some(message) = inbound.into_engine_message() else {
            if send_json(&mut sender, &WsControl::Pong).await.is_err() {
                break;
            }
            continue;
        };

        let turn = async {
            let mut session = slot.lock().await;
            state.engine.respond(&mut session, message, &cancel).await
        };
        tokio::pin!(turn);

        // Keep reading while the turn runs so a disconnect cancels it.
        let mut disconnected = false;
        let result = loop {
            tokio::select! {
                result = &mut turn => break result,
                frame = receiver.next(), if !disconnected => match read_frame(frame) {
                    FrameRead::Text(text) => queued.push_back(text),
                    FrameRead::Skip => {}
                    FrameRead::Closed => {
                        tracing::info!(session_id = %id, "client disconnected mid-turn, cancelling");
                        disconnected = true;
                        cancel.cancel();
                    }
                },
            }
        };
        if disconnected {
            break;
        }

        let (outputs, terminal) = match result {
            Ok(turn) => {
                let terminal = turn.is_terminal();
                (turn.outputs, terminal)
            }
            Err(e) => {
                let reply = WsControl::Error {
                    message: e.to_string(),
                };
                if send_json(&mut sender, &reply).await.is_err() {
                    break;
                }
                continue;
            }
        };

        if send_outputs(&mut sender, &outputs).await.is_err() || terminal {
            break;
        }
    }

    let _ = sender.send(Message::Close(None)).await;
    if state.sessions.remove(&id).is_ok() {
        tracing::info!(session_id = %id, "websocket closed, session evicted");
    }
}

/// What one receive from the socket means for the connection.
#[derive(Debug, PartialEq)]
enum FrameRead {
    Text(Utf8Bytes),
    Skip,
    Closed,
}

fn read_frame(frame: Option<Result<Message, axum::Error>>) -> FrameRead {
    match frame {
        Some(Ok(Message::Text(text))) => FrameRead::Text(text),
        Some(Ok(Message::Close(_))) | None => FrameRead::Closed,
        Some(Err(err)) => {
            tracing::debug!(error = %err, "websocket receive error");
            FrameRead::Closed
        }
        Some(Ok(_)) => FrameRead::Skip,
    }
}

async fn send_outputs(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    outputs: &[EngineOutput],
) -> Result<(), axum::Error> {
    for output in outputs {
        send_json(&mut *sender, output).await?;
    }
    Ok(())
}

async fn send_json(
    sender: &mut (impl SinkExt<Message, Error = axum::Error> + Unpin),
    value: &impl Serialize,
) -> Result<(), axum::Error> {
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json.into())).await,
        Err(err) => {
            tracing::warn!(error = %err, "failed to serialize websocket frame");
            Ok(())
        }
    }
}
