//! Per-task pipeline: build, sign, broadcast, await receipt, report, checkpoint

use crate::coordination::{EventSink, Task, TaskKind};
use crate::error::{RelayerError, RelayerResult};
use crate::events::{CompletionEvent, CompletionMeta, Event, ExecutionStatus};
use crate::signer::TransactionSigner;
use crate::state::CheckpointStore;
use crate::tx::{build_call, DestinationChain};

use ethers::types::{Address, TransactionReceipt, H256};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Executes coordination tasks on one destination chain
pub struct TaskProcessor {
    /// Destination chain access
    chain: Arc<dyn DestinationChain>,
    /// Signing capability
    signer: Arc<dyn TransactionSigner>,
    /// Completion events are posted here
    events: Arc<dyn EventSink>,
    /// Last completed task id
    checkpoint: Arc<dyn CheckpointStore>,
    /// Receives GATEWAY_TX calls
    target_contract: Address,
    /// API name of the destination chain; completion events are posted under it
    destination: String,
}

impl TaskProcessor {
    pub fn new(
        chain: Arc<dyn DestinationChain>,
        signer: Arc<dyn TransactionSigner>,
        events: Arc<dyn EventSink>,
        checkpoint: Arc<dyn CheckpointStore>,
        target_contract: Address,
        destination: impl Into<String>,
    ) -> Self {
        Self {
            chain,
            signer,
            events,
            checkpoint,
            target_contract,
            destination: destination.into(),
        }
    }

    pub fn destination(&self) -> &str {
        &self.destination
    }

    /// Process tasks strictly in order, one at a time.
    ///
    /// A failed task is logged and the next one is attempted. Stops between
    /// tasks once `shutdown` is set. Returns the id of the last task that was
    /// completed or skipped for an unknown type, so a batch of unknown types
    /// is not fetched again. Only completed tasks are checkpointed.
    pub async fn process_batch(
        &self,
        tasks: &[Task],
        shutdown: &watch::Receiver<bool>,
    ) -> Option<String> {
        let mut last_settled = None;

        for task in tasks {
            if *shutdown.borrow() {
                info!("Shutdown requested, leaving remaining tasks for the next run");
                break;
            }

            match self.process_task(task).await {
                Ok(status) => {
                    info!("Task {} completed with status {:?}", task.id, status);
                    last_settled = Some(task.id.clone());
                }
                Err(RelayerError::UnknownTaskType(kind)) => {
                    warn!("Skipping task {} of unknown type {}", task.id, kind);
                    last_settled = Some(task.id.clone());
                }
                Err(e) => {
                    error!("Task {} failed: {}", task.id, e);
                    crate::metrics::record_task_failed(&self.destination, &e);
                }
            }
        }

        last_settled
    }

    /// Run the full pipeline for one task
    pub async fn process_task(&self, task: &Task) -> RelayerResult<ExecutionStatus> {
        let started = Instant::now();
        info!("Processing {} task {}", task.kind, task.id);

        let call = build_call(task, self.target_contract)?;
        let tx = self.chain.prepare_transaction(&call).await?;

        let raw = self.signer.sign_transaction(&tx).await?;
        debug!(
            "Signed task {} for chain {} ({} bytes)",
            task.id,
            self.chain.chain_id(),
            raw.len()
        );

        let tx_hash = self.chain.send_raw_transaction(raw).await?;
        let receipt = self.chain.wait_for_receipt(tx_hash).await?;
        let status = execution_status(&receipt);
        if status == ExecutionStatus::Reverted {
            warn!("Transaction {:?} for task {} reverted", tx_hash, task.id);
        }

        let event = completion_event(task, &receipt, tx_hash, status);
        self.events
            .post_events(&self.destination, &[event])
            .await?;

        self.checkpoint.write(&task.id).await?;

        crate::metrics::record_task_completed(
            &self.destination,
            task.kind.as_str(),
            status_label(status),
        );
        crate::metrics::record_task_latency(&self.destination, started.elapsed().as_secs_f64());
        Ok(status)
    }
}

fn execution_status(receipt: &TransactionReceipt) -> ExecutionStatus {
    match receipt.status {
        Some(status) if status.is_zero() => ExecutionStatus::Reverted,
        _ => ExecutionStatus::Successful,
    }
}

fn status_label(status: ExecutionStatus) -> &'static str {
    match status {
        ExecutionStatus::Successful => "successful",
        ExecutionStatus::Reverted => "reverted",
    }
}

/// Completion report for a task included on chain
pub fn completion_event(
    task: &Task,
    receipt: &TransactionReceipt,
    tx_hash: H256,
    status: ExecutionStatus,
) -> Event {
    let message = task.message();
    let completion = CompletionEvent {
        event_id: task.id.clone(),
        message_id: message.map(|m| m.message_id.clone()),
        meta: CompletionMeta {
            from_address: ethers::utils::to_checksum(&receipt.from, None),
            tx_id: format!("{:?}", tx_hash),
            finalized: true,
        },
        source_chain: message.map(|m| m.source_chain.clone()),
        status,
    };

    match task.kind {
        TaskKind::Execute => Event::ExecuteCompleted(completion),
        _ => Event::GatewayTxCompleted(completion),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::GasPrice;
    use crate::coordination::{MockEventSink, TaskBody, TaskMessage};
    use crate::signer::MockTransactionSigner;
    use crate::state::MockCheckpointStore;
    use crate::tx::{build_transaction, ContractCall, MockDestinationChain};
    use ethers::types::transaction::eip2718::TypedTransaction;
    use ethers::types::{Bytes, U256, U64};

    fn target() -> Address {
        "0xABCDEFabcdefABCDEFabcdefABCDEFabcdefABCD".parse().unwrap()
    }

    fn relayer() -> Address {
        Address::repeat_byte(0x11)
    }

    fn gateway_task(id: &str, execute_data: &str) -> Task {
        Task {
            id: id.into(),
            timestamp: String::new(),
            kind: TaskKind::GatewayTx,
            task: TaskBody {
                execute_data: Some(execute_data.into()),
                message: Some(TaskMessage {
                    message_id: "0xdead-3".into(),
                    source_chain: "ethereum-sepolia".into(),
                    source_address: String::new(),
                    destination_address: format!("{:?}", target()),
                    payload_hash: None,
                }),
                payload: None,
            },
        }
    }

    fn unknown_task(id: &str) -> Task {
        Task {
            id: id.into(),
            timestamp: String::new(),
            kind: TaskKind::Other("REFUND".into()),
            task: TaskBody::default(),
        }
    }

    fn prepared(call: &ContractCall) -> RelayerResult<TypedTransaction> {
        Ok(build_transaction(
            2017,
            relayer(),
            call,
            U256::zero(),
            Some(U256::from(100_000)),
            &GasPrice::Legacy(U256::from(1_000_000_000u64)),
        ))
    }

    fn receipt(tx_hash: H256, status: u64) -> TransactionReceipt {
        TransactionReceipt {
            transaction_hash: tx_hash,
            from: relayer(),
            status: Some(U64::from(status)),
            ..Default::default()
        }
    }

    /// Destination chain that lands every transaction with the given receipt status
    fn chain(status: u64) -> MockDestinationChain {
        let mut chain = MockDestinationChain::new();
        chain.expect_chain_id().return_const(2017u64);
        chain
            .expect_prepare_transaction()
            .returning(|call| prepared(call));
        chain
            .expect_send_raw_transaction()
            .returning(|_| Ok(H256::repeat_byte(0x22)));
        chain
            .expect_wait_for_receipt()
            .returning(move |hash| Ok(receipt(hash, status)));
        chain
    }

    fn accepting_sink() -> MockEventSink {
        let mut sink = MockEventSink::new();
        sink.expect_post_events().returning(|_, _| Ok(()));
        sink
    }

    fn processor(
        chain: MockDestinationChain,
        signer: MockTransactionSigner,
        sink: MockEventSink,
        checkpoint: MockCheckpointStore,
    ) -> TaskProcessor {
        TaskProcessor::new(
            Arc::new(chain),
            Arc::new(signer),
            Arc::new(sink),
            Arc::new(checkpoint),
            target(),
            "telcoin-network",
        )
    }

    fn running() -> watch::Receiver<bool> {
        watch::channel(false).1
    }

    #[tokio::test]
    async fn test_gateway_task_signed_reported_and_checkpointed() {
        let mut signer = MockTransactionSigner::new();
        signer
            .expect_sign_transaction()
            .withf(|tx| {
                tx.to_addr() == Some(&target()) && tx.data() == Some(&Bytes::from(vec![0u8, 0u8]))
            })
            .times(1)
            .returning(|_| Ok(Bytes::from(vec![0xf8, 0x01])));

        let mut sink = MockEventSink::new();
        sink.expect_post_events()
            .withf(|chain, events| {
                chain == "telcoin-network"
                    && matches!(
                        &events[..],
                        [Event::GatewayTxCompleted(c)]
                            if c.event_id == "task-1"
                                && c.status == ExecutionStatus::Successful
                                && c.meta.finalized
                                && c.message_id.as_deref() == Some("0xdead-3")
                                && c.source_chain.as_deref() == Some("ethereum-sepolia")
                                && c.meta.tx_id == format!("{:?}", H256::repeat_byte(0x22))
                    )
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut checkpoint = MockCheckpointStore::new();
        checkpoint
            .expect_write()
            .withf(|id| id == "task-1")
            .times(1)
            .returning(|_| Ok(()));

        let processor = processor(chain(1), signer, sink, checkpoint);
        let last = processor
            .process_batch(&[gateway_task("task-1", "AAA=")], &running())
            .await;

        assert_eq!(last.as_deref(), Some("task-1"));
    }

    #[tokio::test]
    async fn test_signing_failure_skips_checkpoint_and_continues() {
        let mut signer = MockTransactionSigner::new();
        signer
            .expect_sign_transaction()
            .withf(|tx| tx.data() == Some(&Bytes::from(vec![0x01])))
            .times(1)
            .returning(|_| Err(RelayerError::Signing("malformed signature".into())));
        signer
            .expect_sign_transaction()
            .withf(|tx| tx.data() == Some(&Bytes::from(vec![0u8, 0u8])))
            .times(1)
            .returning(|_| Ok(Bytes::from(vec![0xf8, 0x01])));

        let mut checkpoint = MockCheckpointStore::new();
        checkpoint
            .expect_write()
            .withf(|id| id == "task-2")
            .times(1)
            .returning(|_| Ok(()));

        let processor = processor(chain(1), signer, accepting_sink(), checkpoint);
        let tasks = [gateway_task("task-1", "AQ=="), gateway_task("task-2", "AAA=")];
        let last = processor.process_batch(&tasks, &running()).await;

        assert_eq!(last.as_deref(), Some("task-2"));
    }

    #[tokio::test]
    async fn test_unknown_task_type_does_not_abort_batch() {
        let mut signer = MockTransactionSigner::new();
        signer
            .expect_sign_transaction()
            .times(1)
            .returning(|_| Ok(Bytes::from(vec![0xf8, 0x01])));

        let mut checkpoint = MockCheckpointStore::new();
        checkpoint
            .expect_write()
            .withf(|id| id == "task-2")
            .times(1)
            .returning(|_| Ok(()));

        let processor = processor(chain(1), signer, accepting_sink(), checkpoint);
        let tasks = [unknown_task("task-1"), gateway_task("task-2", "AAA=")];

        assert!(matches!(
            processor.process_task(&tasks[0]).await,
            Err(RelayerError::UnknownTaskType(kind)) if kind == "REFUND"
        ));
        assert_eq!(
            processor.process_batch(&tasks, &running()).await.as_deref(),
            Some("task-2")
        );
    }

    #[tokio::test]
    async fn test_batch_of_unknown_types_moves_cursor_without_checkpoint() {
        let mut signer = MockTransactionSigner::new();
        signer.expect_sign_transaction().never();
        let mut sink = MockEventSink::new();
        sink.expect_post_events().never();
        let mut checkpoint = MockCheckpointStore::new();
        checkpoint.expect_write().never();

        let processor = processor(MockDestinationChain::new(), signer, sink, checkpoint);
        let tasks = [unknown_task("task-1"), unknown_task("task-2")];

        assert_eq!(
            processor.process_batch(&tasks, &running()).await.as_deref(),
            Some("task-2")
        );
    }

    #[tokio::test]
    async fn test_unknown_type_after_failure_moves_cursor_past_both() {
        let mut signer = MockTransactionSigner::new();
        signer
            .expect_sign_transaction()
            .times(1)
            .returning(|_| Err(RelayerError::Signing("malformed signature".into())));
        let mut checkpoint = MockCheckpointStore::new();
        checkpoint.expect_write().never();

        let processor = processor(chain(1), signer, MockEventSink::new(), checkpoint);
        let tasks = [gateway_task("task-1", "AAA="), unknown_task("task-2")];

        assert_eq!(
            processor.process_batch(&tasks, &running()).await.as_deref(),
            Some("task-2")
        );
    }

    #[tokio::test]
    async fn test_reverted_receipt_is_reported_and_checkpointed() {
        let mut signer = MockTransactionSigner::new();
        signer
            .expect_sign_transaction()
            .returning(|_| Ok(Bytes::from(vec![0xf8, 0x01])));

        let mut sink = MockEventSink::new();
        sink.expect_post_events()
            .withf(|_, events| {
                matches!(&events[..], [Event::GatewayTxCompleted(c)] if c.status == ExecutionStatus::Reverted)
            })
            .times(1)
            .returning(|_, _| Ok(()));

        let mut checkpoint = MockCheckpointStore::new();
        checkpoint.expect_write().times(1).returning(|_| Ok(()));

        let processor = processor(chain(0), signer, sink, checkpoint);
        let status = processor
            .process_task(&gateway_task("task-1", "AAA="))
            .await
            .unwrap();

        assert_eq!(status, ExecutionStatus::Reverted);
    }

    #[tokio::test]
    async fn test_failed_completion_report_leaves_checkpoint() {
        let mut signer = MockTransactionSigner::new();
        signer
            .expect_sign_transaction()
            .returning(|_| Ok(Bytes::from(vec![0xf8, 0x01])));

        let mut sink = MockEventSink::new();
        sink.expect_post_events().returning(|_, _| {
            Err(RelayerError::UnexpectedStatus {
                status: 503,
                body: "unavailable".into(),
            })
        });

        let mut checkpoint = MockCheckpointStore::new();
        checkpoint.expect_write().never();

        let processor = processor(chain(1), signer, sink, checkpoint);
        let last = processor
            .process_batch(&[gateway_task("task-1", "AAA=")], &running())
            .await;

        assert_eq!(last, None);
    }

    #[tokio::test]
    async fn test_shutdown_stops_between_tasks() {
        let mut signer = MockTransactionSigner::new();
        signer.expect_sign_transaction().never();
        let mut checkpoint = MockCheckpointStore::new();
        checkpoint.expect_write().never();

        let (tx, rx) = watch::channel(false);
        tx.send(true).unwrap();

        let processor = processor(
            MockDestinationChain::new(),
            signer,
            MockEventSink::new(),
            checkpoint,
        );
        let last = processor
            .process_batch(&[gateway_task("task-1", "AAA=")], &rx)
            .await;

        assert_eq!(last, None);
    }

    #[test]
    fn test_execute_completion_uses_execute_type() {
        let mut task = gateway_task("task-9", "AAA=");
        task.kind = TaskKind::Execute;

        let event = completion_event(
            &task,
            &receipt(H256::repeat_byte(0x22), 1),
            H256::repeat_byte(0x22),
            ExecutionStatus::Successful,
        );

        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "EXECUTE");
        assert_eq!(json["eventID"], "task-9");
        assert_eq!(
            json["meta"]["fromAddress"],
            ethers::utils::to_checksum(&relayer(), None)
        );
    }
}
