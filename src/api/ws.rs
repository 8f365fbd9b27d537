// =============================================================================
// WebSocket Handler: Push-based chart updates
// =============================================================================
//
// Clients connect to `/api/v1/ws` and receive:
//   1. An immediate full StateSnapshot on connect.
//   2. A fresh snapshot every 500 ms whenever the combined state version has
//      changed since the last push.
//
// Clients may also send JSON text commands:
//   {"type": "select", "instrument_id": "...", "timeframe_days": 7, ...}
//   {"type": "retry"}
// Each command is answered with an `ack` or `error` frame; its effect shows
// up in the next pushed snapshot.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::time::{interval, Duration};
use tracing::{debug, info, warn};

use crate::api::rest::SelectionRequest;
use crate::app_state::AppState;
use crate::live::Epoch;

// =============================================================================
// Frames
// =============================================================================

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClientCommand {
    Select(SelectionRequest),
    Retry,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum CommandReply {
    Ack { epoch: Epoch },
    Error { message: String },
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    info!("WebSocket connection accepted, upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Manages a single WebSocket connection lifecycle.
///
/// `tokio::select!` multiplexes the 500 ms push check with incoming client
/// frames (commands, Ping/Pong, Close).
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>) {
    let (mut sender, mut receiver) = socket.split();
    let mut sequence: u64 = 0;

    if let Err(e) = send_snapshot(&mut sender, &state, &mut sequence).await {
        warn!(error = %e, "Failed to send initial WebSocket snapshot");
        return;
    }
    let mut last_sent_version = state.current_state_version();

    let mut push_interval = interval(Duration::from_millis(500));

    loop {
        tokio::select! {
            // ── Push: check for version changes every 500 ms ────────────
            _ = push_interval.tick() => {
                let current_version = state.current_state_version();
                if current_version != last_sent_version {
                    if let Err(e) = send_snapshot(&mut sender, &state, &mut sequence).await {
                        debug!(error = %e, "WebSocket send failed, disconnecting");
                        break;
                    }
                    last_sent_version = current_version;
                }
            }

            // ── Receive: commands and control frames ────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_command(&state, &text);
                        if let Err(e) = send_json(&mut sender, &reply).await {
                            debug!(error = %e, "Failed to send command reply, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong, disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Pong(_))) | Some(Ok(Message::Binary(_))) => {}
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received, disconnecting");
                        break;
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error, disconnecting");
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended");
                        break;
                    }
                }
            }
        }
    }

    info!(sent = sequence, "WebSocket connection closed");
}

// =============================================================================
// Helpers
// =============================================================================

fn handle_command(state: &Arc<AppState>, text: &str) -> CommandReply {
    let command: ClientCommand = match serde_json::from_str(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(error = %e, "unparseable WebSocket command");
            return CommandReply::Error {
                message: format!("Invalid command: {e}"),
            };
        }
    };

    match command {
        ClientCommand::Select(req) => {
            let change = match req.validate() {
                Ok(change) => change,
                Err(message) => return CommandReply::Error { message },
            };
            let epoch = state.session.apply_change(&change).unwrap_or_else(|| {
                state
                    .session
                    .select(change.merge(&state.default_selection()))
            });
            state.persist_selection();
            info!(epoch = %epoch, "selection changed via WebSocket");
            CommandReply::Ack { epoch }
        }
        ClientCommand::Retry => match state.session.retry() {
            Some(epoch) => CommandReply::Ack { epoch },
            None => CommandReply::Error {
                message: "No selection to retry".to_string(),
            },
        },
    }
}

async fn send_snapshot<S>(
    sender: &mut S,
    state: &Arc<AppState>,
    sequence: &mut u64,
) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
{
    let snapshot = state.build_snapshot();
    send_json(sender, &snapshot).await?;
    *sequence += 1;
    debug!(version = snapshot.state_version, seq = *sequence, "WebSocket snapshot sent");
    Ok(())
}

async fn send_json<S, T>(sender: &mut S, value: &T) -> Result<(), axum::Error>
where
    S: Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    match serde_json::to_string(value) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            // Serialisation errors are not network errors; keep the socket.
            warn!(error = %e, "Failed to serialize WebSocket frame");
            Ok(())
        }
    }
}
