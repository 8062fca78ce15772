//! Axum routes for the gateway: the WebSocket ingress and `/health`.
//!
//! The access token is verified before the upgrade, so an unauthenticated
//! client never reaches the open state:
//! 1. Read the token from `Authorization: Bearer` or the `token` query
//! 2. Verify it (401 on rejection, 503 when the verifier is unavailable)
//! 3. Upgrade and run the ingress session until the socket ends

use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{
        ws::{Message, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

use super::connection::ClientConnection;
use super::ingress::{Inbound, IngressSession};
use super::registry::ConnectionRegistry;
use crate::application::HandlerRegistry;
use crate::domain::foundation::{AuthError, AuthenticatedUser};
use crate::ports::TokenVerifier;

/// How long a closing socket may take to flush queued frames.
const WRITER_DRAIN_TIMEOUT: Duration = Duration::from_secs(5);

/// Shared state of the gateway routes.
#[derive(Clone)]
pub struct GatewayState {
    pub registry: Arc<ConnectionRegistry>,
    pub handlers: Arc<HandlerRegistry>,
    pub verifier: Arc<dyn TokenVerifier>,
    /// Frames queued per client before it is considered too slow.
    pub client_buffer: usize,
}

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    token: Option<String>,
}

/// Routes: `GET <ws_path>` (WebSocket) and `GET /health`.
pub fn gateway_router(state: GatewayState, ws_path: &str) -> Router {
    Router::new()
        .route(ws_path, get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<GatewayState>,
    Query(query): Query<TokenQuery>,
    headers: HeaderMap,
) -> Response {
    let token = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .map(str::to_string)
        .or(query.token);

    let Some(token) = token else {
        return auth_error(&AuthError::MissingToken);
    };

    let user = match state.verifier.verify(&token).await {
        Ok(user) => user,
        Err(e) => return auth_error(&e),
    };

    ws.on_upgrade(move |socket| handle_socket(socket, state, user))
}

async fn health(State(state): State<GatewayState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "connections": state.registry.len(),
    }))
}

fn auth_error(error: &AuthError) -> Response {
    let (status, message) = match error {
        AuthError::MissingToken => (StatusCode::UNAUTHORIZED, "Missing access token"),
        AuthError::TokenExpired => (StatusCode::UNAUTHORIZED, "Token expired"),
        AuthError::InvalidToken => (StatusCode::UNAUTHORIZED, "Invalid token"),
        AuthError::ServiceUnavailable(reason) => {
            tracing::error!(%reason, "Token verification unavailable");
            (StatusCode::SERVICE_UNAVAILABLE, "Authentication service unavailable")
        }
    };
    tracing::debug!(status = status.as_u16(), message, "Rejected WebSocket upgrade");

    (
        status,
        Json(serde_json::json!({
            "error": message,
            "code": "AUTH_ERROR"
        })),
    )
        .into_response()
}

/// Runs one established socket until it ends.
async fn handle_socket(socket: WebSocket, state: GatewayState, user: AuthenticatedUser) {
    let (sink, stream) = socket.split();
    let (session, outbound) = IngressSession::open(
        state.registry.clone(),
        state.handlers.clone(),
        user,
        state.client_buffer,
    );
    let connection = session.connection().clone();

    let mut writer = tokio::spawn(write_frames(sink, outbound, connection.clone()));

    let inbound = stream.map(|result| match result {
        Ok(Message::Text(text)) => Inbound::Text(text),
        Ok(Message::Binary(_)) => Inbound::Binary,
        Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => Inbound::Control,
        Ok(Message::Close(_)) => Inbound::Close,
        Err(e) => Inbound::Error(e.to_string()),
    });

    let reason = session.run(inbound).await;
    tracing::info!(connection_id = %connection.id(), reason = ?reason, "Connection closed");

    if tokio::time::timeout(WRITER_DRAIN_TIMEOUT, &mut writer).await.is_err() {
        tracing::debug!(connection_id = %connection.id(), "Socket writer did not finish, aborting");
        writer.abort();
    }
}

/// Owns the socket's write half: drains queued frames until the connection
/// closes, then flushes what is left and sends a close frame.
async fn write_frames(
    mut sink: futures::stream::SplitSink<WebSocket, Message>,
    mut outbound: mpsc::Receiver<String>,
    connection: Arc<ClientConnection>,
) {
    loop {
        let text = tokio::select! {
            text = outbound.recv() => text,
            _ = connection.closed() => break,
        };
        let Some(text) = text else { break };

        if let Err(e) = sink.send(Message::Text(text)).await {
            tracing::debug!(connection_id = %connection.id(), error = %e, "Socket write failed");
            connection.request_close();
            return;
        }
    }

    while let Ok(text) = outbound.try_recv() {
        if sink.send(Message::Text(text)).await.is_err() {
            return;
        }
    }
    let _ = sink.close().await;
}
