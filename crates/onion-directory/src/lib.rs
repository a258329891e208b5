//! Onion directory HTTP surface.
//!
//! - `GET  /status`          liveness
//! - `POST /registerNode`    `{nodeId, pubKey}` → 201 | 409 | 400
//! - `GET  /getNodeRegistry` `{nodes: [...]}`
//! - `GET  /nodes/:node_id`  single entry → 200 | 404

#![forbid(unsafe_code)]

pub mod registry;

use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use onion_common::{ErrorResponse, NodeRegistryResponse, RegisterNodeRequest};
use onion_core::NodeId;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::warn;

pub use registry::{DirectoryError, Registry};

impl IntoResponse for DirectoryError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            DirectoryError::DuplicateNode(_) => (StatusCode::CONFLICT, "duplicate_node"),
            DirectoryError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            DirectoryError::InvalidKey(_) => (StatusCode::BAD_REQUEST, "invalid_key"),
            DirectoryError::MalformedRequest(_) => (StatusCode::BAD_REQUEST, "malformed"),
        };
        (status, Json(ErrorResponse::new(code, &self))).into_response()
    }
}

async fn status() -> &'static str {
    "live"
}

async fn register_node(
    State(registry): State<Arc<Registry>>,
    body: Result<Json<RegisterNodeRequest>, JsonRejection>,
) -> Result<StatusCode, DirectoryError> {
    let Json(req) = body.map_err(|e| DirectoryError::MalformedRequest(e.body_text()))?;
    let node_id = req.node_id;
    registry.register(req).await.map_err(|e| {
        warn!("registration of node {} refused: {}", node_id, e);
        e
    })?;
    Ok(StatusCode::CREATED)
}

async fn node_registry(State(registry): State<Arc<Registry>>) -> Json<NodeRegistryResponse> {
    Json(NodeRegistryResponse {
        nodes: registry.list().await,
    })
}

async fn lookup_node(
    State(registry): State<Arc<Registry>>,
    Path(node_id): Path<u32>,
) -> Result<impl IntoResponse, DirectoryError> {
    Ok(Json(registry.lookup(NodeId(node_id)).await?))
}

/// Build the directory router around a shared registry.
pub fn router(registry: Arc<Registry>) -> Router {
    Router::new()
        .route("/status", get(status))
        .route("/registerNode", post(register_node))
        .route("/getNodeRegistry", get(node_registry))
        .route("/nodes/:node_id", get(lookup_node))
        .layer(TraceLayer::new_for_http())
        .with_state(registry)
}

/// Serve the directory on an already bound listener until the task is dropped.
pub async fn serve(listener: TcpListener, registry: Arc<Registry>) -> std::io::Result<()> {
    axum::serve(listener, router(registry)).await
}
