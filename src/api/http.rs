//! HTTP API Server
//!
//! REST API for status queries, membership inspection and local data
//! updates. Read-only except for the node's own data and prune locks.

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::cluster::ClusterManager;
use crate::config::ApiConfig;
use crate::error::{Error, Result};
use crate::state::{LocalRole, UserData};

/// Shared application state
pub struct AppState {
    /// Election manager for this node
    pub cluster: Arc<ClusterManager>,
}

/// HTTP API server
pub struct HttpServer {
    config: ApiConfig,
    state: Arc<AppState>,
}

impl HttpServer {
    /// Create a new HTTP server
    pub fn new(config: ApiConfig, cluster: Arc<ClusterManager>) -> Self {
        Self {
            config,
            state: Arc::new(AppState { cluster }),
        }
    }

    /// Create the router
    pub fn router(&self) -> Router {
        Self::create_router(Arc::clone(&self.state))
    }

    fn create_router(state: Arc<AppState>) -> Router {
        Router::new()
            // Status and info
            .route("/health", get(handle_health))
            .route("/status", get(handle_status))
            .route("/cluster/nodes", get(handle_nodes))
            .route("/cluster/nodes/:hostname", get(handle_node_info))
            // Local data
            .route("/data", get(handle_get_data).put(handle_put_data))
            // Admin operations
            .route("/cluster/nodes/:hostname/lock", post(handle_lock))
            .route("/cluster/nodes/:hostname/unlock", post(handle_unlock))
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Serve until the cluster manager shuts down
    pub async fn start(&self) -> Result<()> {
        if !self.config.enabled {
            tracing::info!("HTTP API disabled");
            return Ok(());
        }

        let app = self.router();
        let listener = tokio::net::TcpListener::bind(&self.config.bind_address).await?;
        tracing::info!("HTTP API listening on {}", self.config.bind_address);

        let mut shutdown = self.state.cluster.shutdown_signal();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                while !*shutdown.borrow() {
                    if shutdown.changed().await.is_err() {
                        break;
                    }
                }
            })
            .await
            .map_err(|e| Error::Network(format!("HTTP server error: {}", e)))?;

        Ok(())
    }
}

// ============ Response Types ============

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub healthy: bool,
    pub hostname: String,
    pub role: LocalRole,
}

/// Lock/unlock response
#[derive(Debug, Serialize)]
pub struct LockResponse {
    pub hostname: String,
    pub locked: bool,
}

/// Error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

fn error_response(error: Error) -> Response {
    let (status, code) = match &error {
        Error::NodeNotFound(_) => (StatusCode::NOT_FOUND, "NODE_NOT_FOUND"),
        Error::PayloadTooLarge { .. } => (StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE"),
        Error::Decode(_) | Error::Json(_) => (StatusCode::BAD_REQUEST, "INVALID_DATA"),
        Error::ShuttingDown => (StatusCode::SERVICE_UNAVAILABLE, "SHUTTING_DOWN"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL"),
    };

    (
        status,
        Json(ErrorResponse {
            error: error.to_string(),
            code: code.to_string(),
        }),
    )
        .into_response()
}

// ============ Handlers ============

async fn handle_health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        healthy: !state.cluster.is_shutting_down(),
        hostname: state.cluster.hostname().to_string(),
        role: state.cluster.role().await,
    })
}

async fn handle_status(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cluster.status().await)
}

async fn handle_nodes(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cluster.members().await)
}

async fn handle_node_info(
    State(state): State<Arc<AppState>>,
    Path(hostname): Path<String>,
) -> Response {
    match state.cluster.member(&hostname).await {
        Some(node) => Json(node).into_response(),
        None => error_response(Error::NodeNotFound(hostname)),
    }
}

async fn handle_get_data(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.cluster.data().await)
}

async fn handle_put_data(
    State(state): State<Arc<AppState>>,
    Json(value): Json<serde_json::Value>,
) -> Response {
    let limit = state.cluster.options().max_data_bytes;
    let result = match UserData::from_value(&value, limit) {
        Ok(data) => state.cluster.set_data(data).await,
        Err(e) => Err(e),
    };

    match result {
        Ok(()) => Json(state.cluster.data().await).into_response(),
        Err(e) => error_response(e),
    }
}

async fn handle_lock(state: State<Arc<AppState>>, hostname: Path<String>) -> Response {
    set_locked(state, hostname, true).await
}

async fn handle_unlock(state: State<Arc<AppState>>, hostname: Path<String>) -> Response {
    set_locked(state, hostname, false).await
}

async fn set_locked(
    State(state): State<Arc<AppState>>,
    Path(hostname): Path<String>,
    locked: bool,
) -> Response {
    match state.cluster.set_locked(&hostname, locked).await {
        Ok(()) => Json(LockResponse { hostname, locked }).into_response(),
        Err(e) => error_response(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::ClusterOptions;
    use crate::network::{DatagramHandler, Heartbeat, MemoryNetwork, Message};
    use std::net::SocketAddr;

    fn app_state() -> Arc<AppState> {
        let net = MemoryNetwork::new();
        let mut options = ClusterOptions::new("api-node", "10.0.0.1");
        options.max_data_bytes = 32;
        let endpoint = net.endpoint(SocketAddr::from(([10, 0, 0, 1], 3014)));
        Arc::new(AppState {
            cluster: Arc::new(ClusterManager::new(options, endpoint)),
        })
    }

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    async fn add_peer(state: &AppState, hostname: &str) {
        let datagram = Message::Heartbeat(Heartbeat {
            hostname: hostname.to_string(),
            ip: "10.0.0.2".to_string(),
            master: false,
            eligible: true,
            uptime: 3,
            data: UserData::empty(),
        })
        .encode()
        .unwrap();
        state
            .cluster
            .on_message(&datagram, SocketAddr::from(([10, 0, 0, 2], 3014)))
            .await;
    }

    #[tokio::test]
    async fn test_status_and_nodes() {
        let state = app_state();
        add_peer(&state, "peer-1").await;

        let status = body_json(handle_status(State(state.clone())).await.into_response()).await;
        assert_eq!(status["hostname"], "api-node");
        assert_eq!(status["role"], "unknown");
        assert_eq!(status["members"].as_array().unwrap().len(), 2);

        let nodes = body_json(handle_nodes(State(state.clone())).await.into_response()).await;
        assert_eq!(nodes[0]["hostname"], "api-node");
        assert_eq!(nodes[1]["hostname"], "peer-1");
    }

    #[tokio::test]
    async fn test_node_info_not_found() {
        let state = app_state();
        let response = handle_node_info(State(state), Path("ghost".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(body_json(response).await["code"], "NODE_NOT_FOUND");
    }

    #[tokio::test]
    async fn test_put_data_enforces_limit() {
        let state = app_state();

        let ok = handle_put_data(State(state.clone()), Json(serde_json::json!({"vip": 5}))).await;
        assert_eq!(ok.status(), StatusCode::OK);
        assert_eq!(body_json(ok).await, serde_json::json!({"vip": 5}));

        let big = serde_json::json!({"blob": "x".repeat(64)});
        let rejected = handle_put_data(State(state.clone()), Json(big)).await;
        assert_eq!(rejected.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(state.cluster.data().await.as_str(), r#"{"vip":5}"#);
    }

    #[tokio::test]
    async fn test_lock_and_unlock() {
        let state = app_state();
        add_peer(&state, "peer-1").await;

        let response = handle_lock(State(state.clone()), Path("peer-1".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(state.cluster.member("peer-1").await.unwrap().locked);

        let response = handle_unlock(State(state.clone()), Path("peer-1".to_string())).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(!state.cluster.member("peer-1").await.unwrap().locked);

        let response = handle_lock(State(state), Path("ghost".to_string())).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
