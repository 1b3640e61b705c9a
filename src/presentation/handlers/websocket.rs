use axum::Json;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::SinkExt;
use futures::stream::{SplitSink, SplitStream, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tokio::time::{Instant, timeout};
use tracing::Instrument;

use crate::application::realtime::{ConnectionHandle, ConnectionId, DeviceConnection, OutboundFrame};
use crate::domain::DeviceId;
use crate::presentation::config::WebSocketSettings;
use crate::presentation::state::AppState;

#[derive(Debug, Deserialize)]
pub struct ConnectParams {
    pub device_id: Option<String>,
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

/// Upgrades a device's HTTP request to the realtime socket. The device
/// identifies itself with the `device_id` query parameter.
pub async fn websocket_handler(
    State(state): State<AppState>,
    Query(params): Query<ConnectParams>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let Some(device_id) = params
        .device_id
        .map(|id| id.trim().to_string())
        .filter(|id| !id.is_empty())
    else {
        return (
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "device_id query parameter is required".to_string(),
            }),
        )
            .into_response();
    };

    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => return rejection.into_response(),
    };

    let max_size = state.websocket.max_message_bytes;
    upgrade
        .max_message_size(max_size)
        .max_frame_size(max_size)
        .on_upgrade(move |socket| serve_socket(socket, state, DeviceId::new(device_id)))
}

async fn serve_socket(socket: WebSocket, state: AppState, device_id: DeviceId) {
    let connection_id = ConnectionId::new();
    let span = tracing::info_span!(
        "device_connection",
        device_id = %device_id,
        connection_id = %connection_id
    );

    async move {
        let settings = state.websocket.clone();
        let (sink, stream) = socket.split();
        let (outbound, outbound_rx) = mpsc::channel(settings.outbound_buffer.max(1));

        let handle = ConnectionHandle::new(connection_id, device_id.clone(), outbound.clone());
        if let Err(e) = state.hub.register(handle).await {
            tracing::error!(error = %e, "Failed to register connection");
            return;
        }

        let writer = tokio::spawn(
            write_pump(sink, outbound_rx, settings.clone()).instrument(tracing::Span::current()),
        );

        let closer = outbound.clone();
        let mut connection = DeviceConnection::new(
            connection_id,
            device_id.clone(),
            state.connection_services.clone(),
            outbound,
        );

        read_pump(stream, &mut connection, &settings).await;
        connection.teardown().await;

        if let Err(e) = state.hub.unregister(device_id, connection_id).await {
            tracing::warn!(error = %e, "Failed to unregister connection");
        }
        let _ = closer.try_send(OutboundFrame::Close);
        drop(closer);
        drop(connection);

        if let Err(e) = writer.await {
            tracing::error!(error = %e, "Write loop panicked");
        }
        tracing::info!("Device disconnected");
    }
    .instrument(span)
    .await
}

/// Only reads frames and drives the state machine. Any inbound frame,
/// including a pong, pushes the read deadline forward.
async fn read_pump(
    mut stream: SplitStream<WebSocket>,
    connection: &mut DeviceConnection,
    settings: &WebSocketSettings,
) {
    loop {
        let message = match timeout(settings.pong_wait(), stream.next()).await {
            Ok(Some(Ok(message))) => message,
            Ok(Some(Err(e))) => {
                tracing::debug!(error = %e, "Socket read failed");
                break;
            }
            Ok(None) => break,
            Err(_) => {
                tracing::info!(
                    pong_wait_secs = settings.pong_wait_secs,
                    "Read deadline exceeded, closing connection"
                );
                break;
            }
        };

        let outcome = match message {
            Message::Text(text) => connection.handle_text(text.as_str()).await,
            Message::Binary(data) => connection.handle_binary(data).await,
            Message::Ping(_) | Message::Pong(_) => Ok(()),
            Message::Close(_) => break,
        };
        if let Err(e) = outcome {
            tracing::debug!(error = %e, "Outbound queue closed, stopping read loop");
            break;
        }
    }
}

/// Only drains the outbound queue and sends keep-alive pings.
async fn write_pump(
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<OutboundFrame>,
    settings: WebSocketSettings,
) {
    let period = settings.ping_period();
    let mut ping = tokio::time::interval_at(Instant::now() + period, period);

    loop {
        let message = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(OutboundFrame::Text(text)) => Message::Text(text.into()),
                Some(OutboundFrame::Binary(data)) => Message::Binary(data),
                Some(OutboundFrame::Close) | None => {
                    let _ = timeout(settings.write_wait(), sink.send(Message::Close(None))).await;
                    break;
                }
            },
            _ = ping.tick() => Message::Ping(Bytes::new()),
        };

        match timeout(settings.write_wait(), sink.send(message)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::debug!(error = %e, "Socket write failed");
                break;
            }
            Err(_) => {
                tracing::warn!(
                    write_wait_secs = settings.write_wait_secs,
                    "Write deadline exceeded, closing connection"
                );
                break;
            }
        }
    }
}
