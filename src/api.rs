//! HTTP relay API for HashLedger
//!
//! Exposes the ledger to clients and to peer nodes. Peer-to-peer routes
//! (`/transaction`, `/receive-new-block`, `/register-node`,
//! `/register-nodes-bulk`, `/blockchain`) are what [`crate::network`] calls.

use axum::{
    extract::{Path, Request, State},
    http::{self, StatusCode},
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::RwLock;
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::error::ChainError;
use crate::network::{BulkNodesBody, LedgerView, NewBlockBody, NewNodeBody, NewTransactionBody};
use crate::node::{Node, NodeState};

/// Shared handler state: the node plus request accounting.
#[derive(Clone)]
pub struct ApiState {
    pub node: Arc<Node>,
    api_stats: Arc<RwLock<ApiStats>>,
}

impl ApiState {
    pub fn new(node: Arc<Node>) -> Self {
        Self {
            node,
            api_stats: Arc::new(RwLock::new(ApiStats::new())),
        }
    }
}

#[derive(Debug)]
struct ApiStats {
    total_requests: u64,
    successful_requests: u64,
    failed_requests: u64,
    start_time: Instant,
}

impl ApiStats {
    fn new() -> Self {
        ApiStats {
            total_requests: 0,
            successful_requests: 0,
            failed_requests: 0,
            start_time: Instant::now(),
        }
    }

    fn record_request(&mut self, success: bool) {
        self.total_requests += 1;
        if success {
            self.successful_requests += 1;
        } else {
            self.failed_requests += 1;
        }
    }
}

// ============================================================================
// API Error Handling
// ============================================================================

#[derive(Debug)]
pub enum ApiError {
    BlockchainError(ChainError),
    NotFound(String),
    PeerUnreachable(String),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BlockchainError(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::PeerUnreachable(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::InternalError(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        (status, Json(ErrorResponse { error: message })).into_response()
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::NetworkError(msg) => ApiError::PeerUnreachable(msg),
            ChainError::MiningError(msg) => ApiError::InternalError(msg),
            other => ApiError::BlockchainError(other),
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TransactionRequest {
    pub amount: f64,
    pub sender: String,
    pub recipient: String,
}

#[derive(Serialize)]
struct NoteResponse {
    note: String,
}

fn note(message: impl Into<String>) -> Json<NoteResponse> {
    Json(NoteResponse {
        note: message.into(),
    })
}

// ============================================================================
// Middleware
// ============================================================================

async fn stats_middleware(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let response = next.run(req).await;

    let success = response.status().is_success();
    state.api_stats.write().await.record_request(success);

    response
}

async fn logging_middleware(State(state): State<ApiState>, req: Request, next: Next) -> Response {
    let start = Instant::now();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = next.run(req).await;

    let node_state = state.node.state().await;
    tracing::info!(
        method = %method,
        path = %path,
        status = %response.status().as_u16(),
        duration_ms = %start.elapsed().as_millis(),
        node_state = ?node_state,
        "api.request"
    );

    response
}

// ============================================================================
// API Server
// ============================================================================

pub fn build_api_router(node: Arc<Node>) -> Router {
    let state = ApiState::new(node);

    let cors = CorsLayer::new()
        .allow_origin(AllowOrigin::mirror_request())
        .allow_methods(vec![
            http::Method::GET,
            http::Method::POST,
            http::Method::OPTIONS,
        ])
        .allow_headers(vec![http::header::CONTENT_TYPE])
        .allow_credentials(true);

    Router::new()
        // Ledger
        .route("/blockchain", get(get_blockchain))
        .route("/block/:hash", get(get_block))
        .route("/address/:address", get(get_address))
        // Transactions
        .route("/transaction", post(receive_transaction))
        .route("/transaction/broadcast", post(broadcast_transaction))
        .route("/transaction/:id", get(get_transaction))
        // Blocks
        .route("/mine", get(mine))
        .route("/receive-new-block", post(receive_new_block))
        // Network
        .route("/register-and-broadcast-node", post(register_and_broadcast_node))
        .route("/register-node", post(register_node))
        .route("/register-nodes-bulk", post(register_nodes_bulk))
        .route("/consensus", get(consensus))
        // System
        .route("/health", get(health_check))
        .route("/stats", get(get_api_stats))
        .layer(middleware::from_fn_with_state(state.clone(), logging_middleware))
        .layer(middleware::from_fn_with_state(state.clone(), stats_middleware))
        .with_state(state)
        .layer(cors)
}

/// Serve the API on an already bound listener.
pub async fn serve(
    node: Arc<Node>,
    listener: tokio::net::TcpListener,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_api_router(node);
    axum::serve(listener, app).await?;
    Ok(())
}

// ============================================================================
// Route Handlers
// ============================================================================

async fn get_blockchain(State(state): State<ApiState>) -> Json<LedgerView> {
    Json(state.node.ledger_view().await)
}

async fn receive_transaction(
    State(state): State<ApiState>,
    Json(body): Json<NewTransactionBody>,
) -> impl IntoResponse {
    let index = state.node.submit_transaction(body.new_transaction).await;
    note(format!("Transaction will be added in block {}.", index))
}

async fn broadcast_transaction(
    State(state): State<ApiState>,
    Json(req): Json<TransactionRequest>,
) -> impl IntoResponse {
    let (transaction, block_index, report) = state
        .node
        .create_and_broadcast_transaction(req.amount, req.sender, req.recipient)
        .await;

    Json(json!({
        "note": "Transaction created and broadcast successfully.",
        "transaction": transaction,
        "blockIndex": block_index,
        "broadcast": report,
    }))
}

async fn mine(State(state): State<ApiState>) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.node.mine_and_broadcast().await?;

    Ok(Json(json!({
        "note": "New block mined & broadcast successfully",
        "block": outcome.block,
        "reward": outcome.reward,
        "broadcast": {
            "block": outcome.block_broadcast,
            "reward": outcome.reward_broadcast,
        },
    })))
}

async fn receive_new_block(
    State(state): State<ApiState>,
    Json(body): Json<NewBlockBody>,
) -> Result<impl IntoResponse, ApiError> {
    state.node.receive_block(body.new_block.clone()).await?;

    Ok(Json(json!({
        "note": "New block received and accepted.",
        "newBlock": body.new_block,
    })))
}

async fn register_and_broadcast_node(
    State(state): State<ApiState>,
    Json(body): Json<NewNodeBody>,
) -> Result<impl IntoResponse, ApiError> {
    let report = state
        .node
        .register_and_broadcast_node(&body.new_node_url)
        .await?;

    Ok(Json(json!({
        "note": "New node registered with network successfully.",
        "broadcast": report,
    })))
}

async fn register_node(
    State(state): State<ApiState>,
    Json(body): Json<NewNodeBody>,
) -> impl IntoResponse {
    if state.node.network.register_node(&body.new_node_url) {
        note("New node registered successfully.")
    } else {
        note("Node already registered.")
    }
}

async fn register_nodes_bulk(
    State(state): State<ApiState>,
    Json(body): Json<BulkNodesBody>,
) -> impl IntoResponse {
    let added = state.node.network.register_nodes_bulk(&body.all_network_nodes);
    note(format!("Bulk registration successful ({} new).", added))
}

async fn consensus(State(state): State<ApiState>) -> impl IntoResponse {
    let outcome = state.node.run_consensus().await;
    let message = if outcome.replaced {
        "This chain has been replaced."
    } else {
        "Current chain has not been replaced."
    };

    Json(json!({
        "note": message,
        "replaced": outcome.replaced,
        "peersConsulted": outcome.peers_consulted,
        "chain": outcome.chain,
        "pendingTransactions": outcome.pending_transactions,
    }))
}

async fn get_block(
    State(state): State<ApiState>,
    Path(hash): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let blockchain = state.node.blockchain.read().await;
    let block = blockchain
        .get_block(&hash)
        .cloned()
        .ok_or_else(|| ApiError::NotFound(format!("Block {} not found", hash)))?;

    Ok(Json(json!({ "block": block })))
}

async fn get_transaction(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let blockchain = state.node.blockchain.read().await;
    let (transaction, block) = blockchain
        .get_transaction(&id)
        .ok_or_else(|| ApiError::NotFound(format!("Transaction {} not found", id)))?;

    Ok(Json(json!({
        "transaction": transaction,
        "block": block,
    })))
}

async fn get_address(
    State(state): State<ApiState>,
    Path(address): Path<String>,
) -> impl IntoResponse {
    let address_data = state.node.blockchain.read().await.get_address_data(&address);
    Json(json!({ "addressData": address_data }))
}

async fn health_check(State(state): State<ApiState>) -> impl IntoResponse {
    let node_state = state.node.state().await;
    let (status, label) = match node_state {
        NodeState::Ready => (StatusCode::OK, "healthy"),
        _ => (StatusCode::SERVICE_UNAVAILABLE, "unhealthy"),
    };

    (
        status,
        Json(json!({
            "status": label,
            "node_state": node_state,
            "timestamp": chrono::Utc::now().to_rfc3339(),
        })),
    )
}

async fn get_api_stats(State(state): State<ApiState>) -> impl IntoResponse {
    let stats = state.api_stats.read().await;
    let blockchain = state.node.blockchain.read().await;

    Json(json!({
        "total_requests": stats.total_requests,
        "successful_requests": stats.successful_requests,
        "failed_requests": stats.failed_requests,
        "uptime_seconds": stats.start_time.elapsed().as_secs(),
        "chain_length": blockchain.len(),
        "pending_transactions": blockchain.pending_transactions().len(),
        "peer_count": state.node.network.peer_count(),
        "node": state.node.counters(),
    }))
}
