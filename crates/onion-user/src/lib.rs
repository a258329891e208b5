//! Onion user node HTTP surface.
//!
//! - `GET  /status`
//! - `POST /message`      `{message}` delivered by an exit relay
//! - `POST /sendMessage`  `{message, destinationUserId}` → 200 | 404 | 500
//! - `GET  /getLastReceivedMessage`
//! - `GET  /getLastSentMessage`
//! - `GET  /getLastCircuit`

#![forbid(unsafe_code)]

pub mod node;

use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use onion_common::{
    ErrorResponse, MessageRequest, ResultResponse, SendMessageRequest, SendMessageResponse,
};
use onion_core::NodeId;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use node::{SendError, SendSettings, UserNode, DEFAULT_SEND_ATTEMPTS, DEFAULT_SEND_TIMEOUT};

impl IntoResponse for SendError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            SendError::Directory(_) => (StatusCode::INTERNAL_SERVER_ERROR, "directory"),
            SendError::Circuit(_) => (StatusCode::INTERNAL_SERVER_ERROR, "circuit"),
            SendError::Wrap(_) => (StatusCode::INTERNAL_SERVER_ERROR, "wrap"),
            SendError::Undeliverable { .. } => (StatusCode::NOT_FOUND, "undeliverable"),
        };
        (status, Json(ErrorResponse::new(code, &self))).into_response()
    }
}

async fn status() -> &'static str {
    "live"
}

async fn message(State(node): State<Arc<UserNode>>, Json(req): Json<MessageRequest>) -> StatusCode {
    node.receive(req.message).await;
    StatusCode::OK
}

async fn send_message(
    State(node): State<Arc<UserNode>>,
    Json(req): Json<SendMessageRequest>,
) -> Result<Json<SendMessageResponse>, SendError> {
    let circuit = node
        .send_message(req.destination_user_id, &req.message)
        .await
        .map_err(|e| {
            warn!("user {} send failed: {}", node.user_id(), e);
            e
        })?;
    Ok(Json(SendMessageResponse { circuit }))
}

async fn last_received(State(node): State<Arc<UserNode>>) -> Json<ResultResponse<String>> {
    Json(ResultResponse::new(node.last_received().await))
}

async fn last_sent(State(node): State<Arc<UserNode>>) -> Json<ResultResponse<String>> {
    Json(ResultResponse::new(node.last_sent().await))
}

async fn last_circuit(State(node): State<Arc<UserNode>>) -> Json<ResultResponse<Vec<NodeId>>> {
    Json(ResultResponse::new(node.last_circuit().await))
}

pub fn router(node: Arc<UserNode>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/message", post(message))
        .route("/sendMessage", post(send_message))
        .route("/getLastReceivedMessage", get(last_received))
        .route("/getLastSentMessage", get(last_sent))
        .route("/getLastCircuit", get(last_circuit))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// Serve a user node on an already bound listener.
pub async fn serve(listener: TcpListener, node: Arc<UserNode>) -> std::io::Result<()> {
    axum::serve(listener, router(node)).await
}
