//! Integration tests for the HashLedger relay API
//!
//! These tests drive a single node through its HTTP routes and check the
//! JSON bodies peers and clients rely on.

use axum_test::TestServer;
use hashledger::api::build_api_router;
use hashledger::blockchain::Blockchain;
use hashledger::config::Config;
use hashledger::node::{Node, NodeState};
use hashledger::transaction::Transaction;
use serde_json::{json, Value};
use std::sync::Arc;

fn test_config() -> Config {
    let mut config = Config::default();
    config.network.port = 3101;
    config.network.request_timeout_secs = 1;
    config.miner.difficulty_prefix = "00".to_string();
    config.miner.node_address = Some("node-under-test".to_string());
    config
}

async fn test_server() -> (TestServer, Arc<Node>) {
    let node = Arc::new(Node::new(test_config()).expect("Failed to create node"));
    node.set_state(NodeState::Ready).await;
    let server = TestServer::new(build_api_router(node.clone())).expect("Failed to create test server");
    (server, node)
}

#[tokio::test]
async fn test_health_reflects_node_state() {
    let node = Arc::new(Node::new(test_config()).unwrap());
    let server = TestServer::new(build_api_router(node.clone())).unwrap();

    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 503);
    let json: Value = response.json();
    assert_eq!(json["status"], "unhealthy");

    node.set_state(NodeState::Ready).await;
    let response = server.get("/health").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["status"], "healthy");
    assert!(json["timestamp"].is_string());
}

#[tokio::test]
async fn test_blockchain_starts_at_genesis() {
    let (server, _node) = test_server().await;

    let response = server.get("/blockchain").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["chain"].as_array().unwrap().len(), 1);
    assert_eq!(json["chain"][0]["index"], 1);
    assert_eq!(json["chain"][0]["nonce"], 100);
    assert_eq!(json["chain"][0]["hash"], "0");
    assert_eq!(json["chain"][0]["previousBlockHash"], "0");
    assert_eq!(json["pendingTransactions"], json!([]));
    assert_eq!(json["currentNodeUrl"], "http://localhost:3101");
    assert_eq!(json["networkNodes"], json!([]));
}

#[tokio::test]
async fn test_transaction_mine_and_lookups() {
    let (server, _node) = test_server().await;

    let tx = Transaction::new(100.0, "ALICE".to_string(), "BOB".to_string());
    let response = server
        .post("/transaction")
        .json(&json!({ "newTransaction": tx }))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["note"], "Transaction will be added in block 2.");

    let response = server
        .post("/transaction/broadcast")
        .json(&json!({ "amount": 7.5, "sender": "BOB", "recipient": "ALICE" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["blockIndex"], 2);
    assert_eq!(json["broadcast"]["delivered"], 0);
    let broadcast_id = json["transaction"]["id"].as_str().unwrap().to_string();

    let response = server.get("/mine").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["note"], "New block mined & broadcast successfully");
    assert_eq!(json["block"]["index"], 2);
    assert_eq!(json["block"]["transactions"].as_array().unwrap().len(), 2);
    assert!(json["block"]["hash"].as_str().unwrap().starts_with("00"));
    assert_eq!(json["reward"]["sender"], "00");
    assert_eq!(json["reward"]["recipient"], "node-under-test");
    let block_hash = json["block"]["hash"].as_str().unwrap().to_string();

    // The reward waits for the next block.
    let response = server.get("/blockchain").await;
    let json: Value = response.json();
    assert_eq!(json["chain"].as_array().unwrap().len(), 2);
    assert_eq!(json["pendingTransactions"].as_array().unwrap().len(), 1);
    assert_eq!(json["pendingTransactions"][0]["amount"], 12.5);

    let response = server.get(&format!("/block/{}", block_hash)).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["block"]["index"], 2);

    let response = server.get(&format!("/transaction/{}", broadcast_id)).await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["transaction"]["amount"], 7.5);
    assert_eq!(json["block"]["hash"], block_hash.as_str());

    let response = server.get("/address/ALICE").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["addressData"]["addressTransactions"].as_array().unwrap().len(), 2);
    assert_eq!(json["addressData"]["addressBalance"], -92.5);
}

#[tokio::test]
async fn test_unknown_block_and_transaction_are_404() {
    let (server, _node) = test_server().await;

    let response = server.get("/block/ffff").await;
    assert_eq!(response.status_code(), 404);
    let json: Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("ffff"));

    let response = server.get("/transaction/missing").await;
    assert_eq!(response.status_code(), 404);
}

#[tokio::test]
async fn test_receive_new_block_accepts_valid_and_rejects_invalid() {
    let (server, node) = test_server().await;

    // A block mined on another node's fresh chain extends our genesis too.
    let mut peer_chain = Blockchain::with_difficulty("00");
    peer_chain.add_transaction_to_pending(Transaction::new(3.0, "A".to_string(), "B".to_string()));
    let block = peer_chain.mine_block().unwrap();

    let response = server
        .post("/receive-new-block")
        .json(&json!({ "newBlock": block }))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["note"], "New block received and accepted.");
    assert_eq!(node.blockchain.read().await.len(), 2);

    // The same block no longer links to our tip.
    let response = server
        .post("/receive-new-block")
        .json(&json!({ "newBlock": block }))
        .await;
    assert_eq!(response.status_code(), 400);
    let json: Value = response.json();
    assert!(json["error"].is_string());
    assert_eq!(node.blockchain.read().await.len(), 2);
}

#[tokio::test]
async fn test_node_registration_routes() {
    let (server, node) = test_server().await;

    let response = server
        .post("/register-node")
        .json(&json!({ "newNodeUrl": "http://127.0.0.1:9" }))
        .await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["note"], "New node registered successfully.");

    let response = server
        .post("/register-nodes-bulk")
        .json(&json!({
            "allNetworkNodes": ["http://127.0.0.1:9", "http://localhost:3101", "http://127.0.0.1:10"]
        }))
        .await;
    assert_eq!(response.status_code(), 200);
    assert_eq!(
        node.network.list_peers(),
        vec!["http://127.0.0.1:9".to_string(), "http://127.0.0.1:10".to_string()]
    );

    // Unreachable peers are skipped and the local chain stays.
    let response = server.get("/consensus").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["note"], "Current chain has not been replaced.");
    assert_eq!(json["replaced"], false);
    assert_eq!(json["chain"].as_array().unwrap().len(), 1);

    // The new node itself must be reachable to receive the membership list.
    let response = server
        .post("/register-and-broadcast-node")
        .json(&json!({ "newNodeUrl": "http://127.0.0.1:11" }))
        .await;
    assert_eq!(response.status_code(), 502);
}

/// Serve a node's API on an ephemeral loopback port and return its base URL.
async fn spawn_peer(node: Arc<Node>) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("http://{}", listener.local_addr().unwrap());
    let app = build_api_router(node);
    tokio::spawn(async move { axum::serve(listener, app).await });
    url
}

#[tokio::test]
async fn test_consensus_adopts_longer_peer_chain() {
    tokio::time::timeout(std::time::Duration::from_secs(60), async {
        let (server, node) = test_server().await;
        node.submit_transaction(Transaction::new(1.0, "LOCAL".to_string(), "ONLY".to_string()))
            .await;

        let mut peer_config = test_config();
        peer_config.network.port = 3102;
        peer_config.miner.node_address = Some("peer-node".to_string());
        let peer = Arc::new(Node::new(peer_config).unwrap());
        for amount in [2.25, 118446.04418621163] {
            peer.submit_transaction(Transaction::new(amount, "P".to_string(), "Q".to_string()))
                .await;
            peer.mine().await.unwrap();
        }
        let peer_pending = Transaction::new(9.5, "Q".to_string(), "P".to_string());
        peer.submit_transaction(peer_pending.clone()).await;
        let peer_url = spawn_peer(peer.clone()).await;

        let response = server
            .post("/register-node")
            .json(&json!({ "newNodeUrl": peer_url }))
            .await;
        assert_eq!(response.status_code(), 200);

        let response = server.get("/consensus").await;
        assert_eq!(response.status_code(), 200);
        let json: Value = response.json();
        assert_eq!(json["note"], "This chain has been replaced.");
        assert_eq!(json["replaced"], true);
        assert_eq!(json["peersConsulted"], 1);

        let local = node.blockchain.read().await;
        let remote = peer.blockchain.read().await;
        assert_eq!(local.len(), 3);
        assert_eq!(local.chain(), remote.chain());
        assert_eq!(local.pending_transactions(), &[peer_pending][..]);
        assert_eq!(node.counters().chain_replacements, 1);
    })
    .await
    .expect("test_consensus_adopts_longer_peer_chain timed out");
}

#[tokio::test]
async fn test_stats_counts_requests() {
    let (server, _node) = test_server().await;

    server.get("/blockchain").await;
    server.get("/block/none").await;

    let response = server.get("/stats").await;
    assert_eq!(response.status_code(), 200);
    let json: Value = response.json();
    assert_eq!(json["total_requests"], 2);
    assert_eq!(json["successful_requests"], 1);
    assert_eq!(json["failed_requests"], 1);
    assert_eq!(json["chain_length"], 1);
    assert!(json["node"]["blocks_mined"].is_number());
}
