// ============================================================================
// WebSocket Route
// ============================================================================
//
// GET /ws?user_id=<uuid>
//
// The identity is supplied by the caller and trusted as-is. It is checked
// before the upgrade: missing -> 401, malformed -> 400.
// ============================================================================

use axum::{
    extract::{
        ws::{rejection::WebSocketUpgradeRejection, WebSocket, WebSocketUpgrade},
        Query, State,
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use chat_config::MAX_MESSAGE_SIZE;
use chat_error::AppError;
use chat_types::UserId;
use futures_util::StreamExt;
use serde::Deserialize;
use tracing::{info, Instrument};

use crate::context::AppContext;
use crate::hub::Connection;
use crate::utils::loggable_user;

#[derive(Debug, Deserialize)]
pub struct WsQuery {
    pub user_id: Option<String>,
}

/// GET /ws
pub async fn ws_handler(
    State(ctx): State<AppContext>,
    Query(params): Query<WsQuery>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let user_id = match params.user_id.as_deref() {
        None | Some("") => return AppError::auth("user_id is required").into_response(),
        Some(raw) => match UserId::parse(raw) {
            Ok(user_id) => user_id,
            Err(e) => return AppError::validation(format!("user_id: {}", e)).into_response(),
        },
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    if ctx.shutdown.is_cancelled() {
        return (StatusCode::SERVICE_UNAVAILABLE, "Shutting down").into_response();
    }

    ws.max_message_size(MAX_MESSAGE_SIZE)
        .on_upgrade(move |socket| handle_socket(socket, ctx, user_id))
}

async fn handle_socket(socket: WebSocket, ctx: AppContext, user_id: UserId) {
    let (sink, stream) = socket.split();
    let connection = Connection::open(&ctx.hub, user_id, &ctx.shutdown).await;

    let span = tracing::info_span!(
        "websocket_connection",
        connection_id = %connection.id(),
        user = %loggable_user(&user_id, &ctx.config.logging),
    );
    span.in_scope(|| info!("Connection opened"));

    connection.run(sink, stream).instrument(span).await;
}
