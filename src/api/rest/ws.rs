use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use futures::SinkExt;
use futures::StreamExt;
use serde::Deserialize;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tracing::{info, warn};

use crate::auth::Session;
use crate::error::AppError;
use crate::models::notification::Recipient;
use crate::state::AppState;

/// Browsers cannot set headers on a WebSocket handshake, so the token comes
/// in the query string.
#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(params): Query<WsParams>,
) -> Result<impl IntoResponse, AppError> {
    let session = Session::resolve(&state, &params.token)?;
    let topic = session.topic();

    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, topic)))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>, topic: Recipient) {
    let (mut sender, mut receiver) = socket.split();
    let mut notifications = BroadcastStream::new(state.notification_tx.subscribe());

    info!(topic = ?topic, "websocket subscriber connected");

    let send_topic = topic.clone();
    let send_task = tokio::spawn(async move {
        while let Some(item) = notifications.next().await {
            let notification = match item {
                Ok(notification) => notification,
                Err(BroadcastStreamRecvError::Lagged(skipped)) => {
                    // Missed items stay unread and reach the client on its next poll.
                    warn!(topic = ?send_topic, skipped, "websocket subscriber lagged");
                    continue;
                }
            };
            if notification.recipient != send_topic {
                continue;
            }

            let json = match serde_json::to_string(&notification) {
                Ok(json) => json,
                Err(err) => {
                    warn!(error = %err, "failed to serialize notification for ws");
                    continue;
                }
            };

            if sender.send(Message::Text(json.into())).await.is_err() {
                break;
            }
        }
    });

    let recv_task = tokio::spawn(async move {
        while let Some(Ok(_msg)) = receiver.next().await {}
    });

    until_either_finishes(send_task, recv_task).await;

    info!(topic = ?topic, "websocket subscriber disconnected");
}

/// Waits for the first task to end and aborts the other one, so a closed
/// socket does not leave its forwarder parked on the broadcast channel.
async fn until_either_finishes(mut first: JoinHandle<()>, mut second: JoinHandle<()>) {
    tokio::select! {
        _ = &mut first => second.abort(),
        _ = &mut second => first.abort(),
    }
}
