//! Onion relay - removes one layer per envelope and passes the rest on.
//!
//! The relay:
//! 1. Unwraps the layer addressed to it with its own private key
//! 2. Forwards the remainder to the next relay, or delivers plaintext at the exit
//! 3. Answers its caller only once the next hop has answered
//!
//! Routes:
//! - `GET  /status`
//! - `GET  /stats`
//! - `POST /message` `{message: <base64 envelope>}` → 200 | 400 | 502
//! - `GET  /getLastReceivedEncryptedMessage`
//! - `GET  /getLastReceivedDecryptedMessage`
//! - `GET  /getLastMessageDestination`

#![forbid(unsafe_code)]

pub mod node;
pub mod register;
pub mod state;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use onion_common::{
    ErrorResponse, LastDestination, MessageRequest, RelayStatsResponse, ResultResponse,
};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

pub use node::{ForwardError, RelayNode};
pub use register::{register_with_retry, RetryPolicy};
pub use state::{ForwardJob, Observations, RelayPhase, RelayStats};

impl IntoResponse for ForwardError {
    fn into_response(self) -> Response {
        let code = match &self {
            ForwardError::Encoding(_) => "encoding",
            ForwardError::LayerDecryption(_) => "layer_decryption",
            ForwardError::Malformed(_) => "malformed",
            ForwardError::UnknownHop(_) => "unknown_hop",
            ForwardError::Timeout(_) => "forward_timeout",
            ForwardError::Unreachable(_) => "unreachable",
            ForwardError::Downstream { .. } => "downstream_rejected",
        };
        let status = if self.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::BAD_GATEWAY
        };
        (status, Json(ErrorResponse::new(code, &self))).into_response()
    }
}

async fn status() -> &'static str {
    "live"
}

async fn stats(State(node): State<Arc<RelayNode>>) -> Json<RelayStatsResponse> {
    let stats = node.stats();
    Json(RelayStatsResponse {
        node_id: node.node_id(),
        in_flight: stats.in_flight(),
        forwarded: stats.forwarded(),
        delivered: stats.delivered(),
        rejected: stats.rejected(),
    })
}

async fn message(
    State(node): State<Arc<RelayNode>>,
    body: Result<Json<MessageRequest>, JsonRejection>,
) -> Result<StatusCode, ForwardError> {
    // A body without a string `message` is as malformed as a bad envelope
    let Json(req) = body.map_err(|e| ForwardError::Malformed(e.body_text()))?;
    node.handle_message(&req.message).await?;
    Ok(StatusCode::OK)
}

async fn last_encrypted(State(node): State<Arc<RelayNode>>) -> Json<ResultResponse<String>> {
    Json(ResultResponse::new(node.observations().last_envelope().await))
}

async fn last_decrypted(State(node): State<Arc<RelayNode>>) -> Json<ResultResponse<String>> {
    Json(ResultResponse::new(node.observations().last_decrypted().await))
}

async fn last_destination(State(node): State<Arc<RelayNode>>) -> Json<LastDestination> {
    Json(ResultResponse::new(node.observations().last_destination().await))
}

/// Build the relay router.
pub fn router(node: Arc<RelayNode>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/stats", get(stats))
        .route("/message", post(message))
        .route("/getLastReceivedEncryptedMessage", get(last_encrypted))
        .route("/getLastReceivedDecryptedMessage", get(last_decrypted))
        .route("/getLastMessageDestination", get(last_destination))
        .layer(TraceLayer::new_for_http())
        .with_state(node)
}

/// Serve a relay on an already bound listener.
pub async fn serve(listener: TcpListener, node: Arc<RelayNode>) -> std::io::Result<()> {
    axum::serve(listener, router(node)).await
}
