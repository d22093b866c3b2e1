//! Watcher and transaction sender behaviour against a stub JSON-RPC node

use std::sync::Arc;
use std::time::Duration;

use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, H256, U256};
use reqwest::Client;
use serde_json::{json, Value};
use tokio::sync::watch;
use wiremock::matchers::{body_partial_json, method};
use wiremock::{Mock, MockServer, ResponseTemplate};

use gmp_relayer::chain::{ChainProvider, EventWatcher};
use gmp_relayer::config::{ChainEndpoint, SupportedChain};
use gmp_relayer::coordination::CoordinationClient;
use gmp_relayer::tx::{ContractCall, DestinationChain, GasEstimator, TransactionSender};
use gmp_relayer::RelayerError;

const GWEI: u64 = 1_000_000_000;

fn rpc(rpc_method: &str) -> wiremock::MockBuilder {
    Mock::given(method("POST")).and(body_partial_json(json!({ "method": rpc_method })))
}

fn result(value: Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({ "jsonrpc": "2.0", "id": 1, "result": value }))
}

fn rpc_error(message: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": { "code": -32000, "message": message }
    }))
}

/// Bodies of every request the stub received for one JSON-RPC method
async fn calls(server: &MockServer, rpc_method: &str) -> Vec<Value> {
    server
        .received_requests()
        .await
        .unwrap()
        .iter()
        .map(|r| serde_json::from_slice::<Value>(&r.body).unwrap())
        .filter(|body| body["method"] == rpc_method)
        .collect()
}

fn provider(server: &MockServer, chain: SupportedChain) -> Arc<ChainProvider> {
    let endpoint = ChainEndpoint::new(chain, server.uri(), Address::repeat_byte(0xaa));
    Arc::new(ChainProvider::new(endpoint).unwrap())
}

fn relayer() -> Address {
    Address::repeat_byte(0x11)
}

fn sender(
    server: &MockServer,
    receipt_timeout: Option<Duration>,
    shutdown: watch::Receiver<bool>,
) -> TransactionSender {
    TransactionSender::new(
        provider(server, SupportedChain::TelcoinNetwork),
        relayer(),
        GasEstimator::new(20, 10, 500),
        Duration::from_millis(10),
        receipt_timeout,
        shutdown,
    )
}

fn call() -> ContractCall {
    ContractCall {
        to: Address::repeat_byte(0xab),
        data: Bytes::from(vec![0u8, 0u8]),
    }
}

fn hash(byte: u8) -> String {
    format!("{:?}", H256::repeat_byte(byte))
}

fn latest_block(base_fee: Option<U256>) -> Value {
    let mut block = json!({
        "number": "0x10",
        "hash": hash(0x01),
        "parentHash": hash(0x02),
        "sha3Uncles": hash(0x03),
        "miner": format!("{:?}", Address::zero()),
        "stateRoot": hash(0x04),
        "transactionsRoot": hash(0x05),
        "receiptsRoot": hash(0x06),
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "difficulty": "0x0",
        "totalDifficulty": "0x0",
        "gasLimit": "0x1c9c380",
        "gasUsed": "0x0",
        "timestamp": "0x6553f100",
        "extraData": "0x",
        "mixHash": hash(0x07),
        "nonce": "0x0000000000000000",
        "size": "0x220",
        "uncles": [],
        "transactions": []
    });
    if let Some(fee) = base_fee {
        block["baseFeePerGas"] = json!(format!("0x{:x}", fee));
    }
    block
}

fn receipt(tx_hash: H256) -> Value {
    json!({
        "transactionHash": format!("{:?}", tx_hash),
        "transactionIndex": "0x0",
        "blockHash": hash(0x01),
        "blockNumber": "0x10",
        "from": format!("{:?}", relayer()),
        "to": format!("{:?}", Address::repeat_byte(0xab)),
        "cumulativeGasUsed": "0x5208",
        "gasUsed": "0x5208",
        "effectiveGasPrice": "0x3b9aca00",
        "contractAddress": null,
        "logs": [],
        "logsBloom": format!("0x{}", "00".repeat(256)),
        "status": "0x1",
        "type": "0x2"
    })
}

#[tokio::test]
async fn failed_get_logs_keeps_cursor_and_range_is_bounded() {
    let server = MockServer::start().await;
    rpc("eth_blockNumber")
        .respond_with(result(json!("0x20")))
        .mount(&server)
        .await;
    rpc("eth_getLogs")
        .respond_with(rpc_error("query timeout"))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    rpc("eth_getLogs")
        .respond_with(result(json!([])))
        .mount(&server)
        .await;

    let coordination = CoordinationClient::with_client(&server.uri(), Client::new());
    let watcher = EventWatcher::new(
        provider(&server, SupportedChain::Ethereum),
        Arc::new(coordination),
        Some(10),
        Duration::from_secs(1),
        5,
    );

    assert!(watcher.poll_once().await.is_err());
    assert_eq!(watcher.next_block().await, Some(10));

    assert_eq!(watcher.poll_once().await.unwrap(), 0);
    assert_eq!(watcher.next_block().await, Some(15));

    let queries = calls(&server, "eth_getLogs").await;
    assert_eq!(queries.len(), 2);
    for query in &queries {
        let filter = &query["params"][0];
        assert_eq!(filter["fromBlock"], "0xa");
        assert_eq!(filter["toBlock"], "0xe");
    }

    assert_eq!(calls(&server, "eth_blockNumber").await.len(), 2);
}

#[tokio::test]
async fn range_stops_at_chain_head() {
    let server = MockServer::start().await;
    rpc("eth_blockNumber")
        .respond_with(result(json!("0xc")))
        .mount(&server)
        .await;
    rpc("eth_getLogs")
        .respond_with(result(json!([])))
        .mount(&server)
        .await;

    let coordination = CoordinationClient::with_client(&server.uri(), Client::new());
    let watcher = EventWatcher::new(
        provider(&server, SupportedChain::Ethereum),
        Arc::new(coordination),
        Some(10),
        Duration::from_secs(1),
        1000,
    );

    watcher.poll_once().await.unwrap();
    assert_eq!(watcher.next_block().await, Some(13));

    let queries = calls(&server, "eth_getLogs").await;
    assert_eq!(queries[0]["params"][0]["fromBlock"], "0xa");
    assert_eq!(queries[0]["params"][0]["toBlock"], "0xc");
}

#[tokio::test]
async fn prepare_uses_pending_nonce_and_padded_gas() {
    let server = MockServer::start().await;
    rpc("eth_getTransactionCount")
        .respond_with(result(json!("0x7")))
        .mount(&server)
        .await;
    rpc("eth_getBlockByNumber")
        .respond_with(result(latest_block(Some(U256::from(10 * GWEI)))))
        .mount(&server)
        .await;
    rpc("eth_estimateGas")
        .respond_with(result(json!("0x186a0")))
        .mount(&server)
        .await;

    let (_stop, shutdown) = watch::channel(false);
    let tx = sender(&server, None, shutdown)
        .prepare_transaction(&call())
        .await
        .unwrap();

    assert_eq!(tx.nonce(), Some(&U256::from(7)));
    assert_eq!(tx.gas(), Some(&U256::from(120_000)));
    assert_eq!(tx.to_addr(), Some(&Address::repeat_byte(0xab)));
    match tx {
        TypedTransaction::Eip1559(req) => {
            // (2 * 10 + 2) gwei and 2 gwei, both padded by 10%
            assert_eq!(req.max_fee_per_gas, Some(U256::from(24_200_000_000u64)));
            assert_eq!(req.max_priority_fee_per_gas, Some(U256::from(2_200_000_000u64)));
        }
        other => panic!("expected an EIP-1559 transaction, got {:?}", other),
    }

    let nonce_queries = calls(&server, "eth_getTransactionCount").await;
    assert_eq!(nonce_queries[0]["params"][1], "pending");
}

#[tokio::test]
async fn legacy_chain_price_is_padded_then_capped() {
    let server = MockServer::start().await;
    rpc("eth_getTransactionCount")
        .respond_with(result(json!("0x0")))
        .mount(&server)
        .await;
    rpc("eth_getBlockByNumber")
        .respond_with(result(latest_block(None)))
        .mount(&server)
        .await;
    rpc("eth_gasPrice")
        .respond_with(result(json!(format!("0x{:x}", U256::from(480 * GWEI)))))
        .mount(&server)
        .await;
    rpc("eth_estimateGas")
        .respond_with(result(json!("0x5208")))
        .mount(&server)
        .await;

    let (_stop, shutdown) = watch::channel(false);
    let tx = sender(&server, None, shutdown)
        .prepare_transaction(&call())
        .await
        .unwrap();

    assert!(matches!(tx, TypedTransaction::Legacy(_)));
    assert_eq!(tx.gas_price(), Some(U256::from(500 * GWEI)));
    assert_eq!(tx.gas(), Some(&U256::from(25_200)));
}

#[tokio::test]
async fn receipt_is_returned_once_mined() {
    let server = MockServer::start().await;
    let tx_hash = H256::repeat_byte(0x22);
    rpc("eth_getTransactionReceipt")
        .respond_with(result(Value::Null))
        .up_to_n_times(2)
        .mount(&server)
        .await;
    rpc("eth_getTransactionReceipt")
        .respond_with(result(receipt(tx_hash)))
        .mount(&server)
        .await;

    let (_stop, shutdown) = watch::channel(false);
    let receipt = sender(&server, Some(Duration::from_secs(5)), shutdown)
        .wait_for_receipt(tx_hash)
        .await
        .unwrap();

    assert_eq!(receipt.transaction_hash, tx_hash);
    assert_eq!(receipt.status.map(|s| s.as_u64()), Some(1));
    assert_eq!(calls(&server, "eth_getTransactionReceipt").await.len(), 3);
}

#[tokio::test]
async fn receipt_wait_times_out() {
    let server = MockServer::start().await;
    rpc("eth_getTransactionReceipt")
        .respond_with(result(Value::Null))
        .mount(&server)
        .await;

    let (_stop, shutdown) = watch::channel(false);
    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        sender(&server, Some(Duration::from_millis(50)), shutdown)
            .wait_for_receipt(H256::repeat_byte(0x22)),
    )
    .await
    .expect("receipt wait should give up on its own");

    assert!(matches!(outcome, Err(RelayerError::Timeout { .. })));
}

#[tokio::test]
async fn shutdown_abandons_unbounded_receipt_wait() {
    let server = MockServer::start().await;
    rpc("eth_getTransactionReceipt")
        .respond_with(result(Value::Null))
        .mount(&server)
        .await;

    let (stop, shutdown) = watch::channel(false);
    let sender = sender(&server, None, shutdown);

    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(50)).await;
        let _ = stop.send(true);
        // Keep the channel open so the wait sees the flag, not a closed sender
        tokio::time::sleep(Duration::from_secs(10)).await;
    });

    let outcome = tokio::time::timeout(
        Duration::from_secs(5),
        sender.wait_for_receipt(H256::repeat_byte(0x22)),
    )
    .await
    .expect("shutdown should end the receipt wait");

    assert!(matches!(outcome, Err(RelayerError::Cancelled { .. })));
}
