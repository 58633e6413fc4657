use std::{net::SocketAddr, sync::Arc};

use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use bot::BotConfig;
use codecs::SvgQrEncoder;
use controller::{Codecs, ControllerContext};
use serde::Deserialize;
use shared::{
    domain::UserId,
    error::{ApiError, ErrorCode},
    protocol::{InboundEvent, Outbound},
};
use storage::Storage;
use tokio::sync::broadcast::error::RecvError;
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, info, warn};

mod app_state;
mod config;

use app_state::AppState;
use config::{load_settings, prepare_database_url};

/// Updates may carry a base64 photo of a QR code.
const MAX_UPDATE_BYTES: usize = 8 * 1024 * 1024;

#[derive(Debug, Deserialize)]
struct WsQuery {
    chat_id: Option<i64>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_env_filter("info").init();

    let settings = load_settings();
    let database_url = prepare_database_url(&settings.database_url)?;
    let storage = Storage::new(&database_url).await.map_err(|error| {
        error!(
            %database_url,
            %error,
            "failed to open SQLite database; verify parent directory exists and permissions are correct"
        );
        error
    })?;
    let codecs = Codecs {
        qr_encoder: Arc::new(SvgQrEncoder {
            min_size: settings.qr_min_size,
        }),
        ..Codecs::default()
    };
    let config = BotConfig {
        admin_ids: settings.admin_ids(),
    };
    let state = AppState::new(ControllerContext::new(storage, codecs), config)?;
    let app = build_router(Arc::new(state));

    let addr: SocketAddr = settings.server_bind.parse()?;
    info!(%addr, admins = settings.admin_ids.len(), "bot server listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/updates",
            post(handle_update).layer(RequestBodyLimitLayer::new(MAX_UPDATE_BYTES)),
        )
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn healthz(
    State(state): State<Arc<AppState>>,
) -> Result<&'static str, (StatusCode, Json<ApiError>)> {
    state
        .dispatcher
        .context()
        .storage
        .health_check()
        .await
        .map_err(|e| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ApiError::new(ErrorCode::Internal, e.to_string())),
            )
        })?;
    Ok("ok")
}

/// One inbound chat event in, the replies for its actor out.
async fn handle_update(
    State(state): State<Arc<AppState>>,
    Json(event): Json<InboundEvent>,
) -> Result<Json<Vec<Outbound>>, (StatusCode, Json<ApiError>)> {
    let replies = state.dispatcher.handle(event).await.map_err(|e| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ApiError::new(ErrorCode::Internal, e.to_string())),
        )
    })?;
    Ok(Json(replies))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(q): Query<WsQuery>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| ws_connection(state, socket, q.chat_id.map(UserId)))
}

/// Streams notifications as JSON, optionally only those for one chat.
async fn ws_connection(
    state: Arc<AppState>,
    socket: axum::extract::ws::WebSocket,
    chat_id: Option<UserId>,
) {
    use axum::extract::ws::Message;
    use futures::{SinkExt, StreamExt};

    let (mut sender, mut receiver) = socket.split();
    let mut notifications = state.notifications.subscribe();

    let send_task = tokio::spawn(async move {
        loop {
            let message = match notifications.recv().await {
                Ok(message) => message,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "notification subscriber lagged");
                    continue;
                }
                Err(RecvError::Closed) => break,
            };
            if chat_id.is_some_and(|id| id != message.chat_id) {
                continue;
            }
            let text = match serde_json::to_string(&message) {
                Ok(v) => v,
                Err(_) => continue,
            };
            if sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
    });

    while let Some(Ok(_msg)) = receiver.next().await {}

    send_task.abort();
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
