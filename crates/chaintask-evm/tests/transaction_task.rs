//! End-to-end `TransactionTask::run` behaviour against a scripted node.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use chaintask_core::{
    dispatch_once, ChainNotifyConfig, DispatchError, DomainRecord, FieldError, KeyError, Mq,
    NodeConnector, NodeError, NodeSession, RunContext, Storage, StorageError, Task, TaskError,
    TipSet, TipSetKey,
};
use chaintask_evm::TransactionTask;
use chaintask_mq::MemoryQueue;
use chaintask_storage::InMemoryStorage;

// ─── Scripted node ────────────────────────────────────────────────────────────

#[derive(Clone)]
enum Reply {
    Block(Option<Vec<Value>>),
    Error,
    Hang,
}

struct ScriptedNode {
    reply: Reply,
    refuse: bool,
    open: Arc<AtomicUsize>,
    opened: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl ScriptedNode {
    fn replying(reply: Reply) -> Self {
        Self {
            reply,
            refuse: false,
            open: Arc::default(),
            opened: Arc::default(),
            requested: Arc::default(),
        }
    }

    fn with_transactions(txs: Vec<Value>) -> Self {
        Self::replying(Reply::Block(Some(txs)))
    }
}

struct ScriptedSession {
    reply: Reply,
    open: Arc<AtomicUsize>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl Drop for ScriptedSession {
    fn drop(&mut self) {
        self.open.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl NodeConnector for ScriptedNode {
    async fn connect(
        &self,
        _ctx: &RunContext,
        addr: &str,
    ) -> Result<Box<dyn NodeSession>, NodeError> {
        if self.refuse {
            return Err(NodeError::Connect(format!("{addr} refused")));
        }
        self.open.fetch_add(1, Ordering::SeqCst);
        self.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ScriptedSession {
            reply: self.reply.clone(),
            open: self.open.clone(),
            requested: self.requested.clone(),
        }))
    }
}

#[async_trait]
impl NodeSession for ScriptedSession {
    async fn block_transactions(
        &self,
        _ctx: &RunContext,
        block_hash: &str,
    ) -> Result<Option<Vec<Value>>, NodeError> {
        self.requested.lock().unwrap().push(block_hash.to_string());
        match &self.reply {
            Reply::Block(txs) => Ok(txs.clone()),
            Reply::Error => Err(NodeError::Rpc {
                code: -32603,
                message: "internal error".into(),
            }),
            Reply::Hang => std::future::pending().await,
        }
    }
}

struct BrokenStorage;

#[async_trait]
impl Storage for BrokenStorage {
    async fn write_many(
        &self,
        _ctx: &RunContext,
        _records: Vec<DomainRecord>,
    ) -> Result<(), StorageError> {
        Err(StorageError::Backend("disk full".into()))
    }
}

// ─── Fixtures ─────────────────────────────────────────────────────────────────

fn raw_tx(hash: &str, index: u64) -> Value {
    json!({
        "hash": hash,
        "blockHash": "0xdef",
        "from": "0x1",
        "value": "0x1c8",
        "maxFeePerGas": "0x5",
        "maxPriorityFeePerGas": "0x1",
        "chainId": "0x1",
        "nonce": "0x0",
        "blockNumber": "0x64",
        "transacionIndex": format!("0x{index:x}"),
        "type": "0x2",
        "gas": "0xc350",
        "v": "0x1b",
        "r": "0xaa",
        "s": "0xbb",
        "input": "0x"
    })
}

fn tipset() -> TipSet {
    TipSet::new(
        100,
        TipSetKey::new([
            "bafy2bzacea3wsdh6y3a36tb3skempjoxqpuyompjbmfeyf34fi3uy6uue42v4",
            "bafy2bzacecnamqgqmifpluoeldx7zzglxcljo6oja4vrmtj7432rphldpdmm2",
        ]),
    )
}

async fn run(
    node: ScriptedNode,
    storage: &dyn Storage,
) -> (Result<chaintask_core::RunReport, TaskError>, Arc<AtomicUsize>, Arc<AtomicUsize>) {
    let open = node.open.clone();
    let opened = node.opened.clone();
    let task = TransactionTask::new(Arc::new(node));
    let result = task
        .run(&RunContext::background(), "http://lotus:1234/rpc/v1", 1, &tipset(), storage)
        .await;
    (result, open, opened)
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn block_transactions_are_normalized_and_written_once() {
    let storage = InMemoryStorage::new();
    let node = ScriptedNode::with_transactions(vec![raw_tx("0xabc", 0)]);
    let requested = node.requested.clone();

    let (result, open, opened) = run(node, &storage).await;

    assert_eq!(result.unwrap().processed, 1);
    assert_eq!(storage.write_calls(), 1);
    let tx = &storage.transactions()[0];
    assert_eq!(tx.height, 100);
    assert_eq!(tx.value, "456");
    assert_eq!(tx.chain_id, 1);
    assert_eq!(tx.block_number, 100);
    assert_eq!(tx.tx_type, 2);
    assert_eq!(tx.gas, 50_000);
    assert_eq!(tx.to, "");
    assert_eq!(tx.gas_limit, 0);

    assert_eq!(
        requested.lock().unwrap().as_slice(),
        ["0xbe96f63c7c7f7f462ab805f04f290ca7d5ebf9cc8e30073decb3305afd1b3483"]
    );
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn output_order_matches_block_order() {
    let storage = InMemoryStorage::new();
    let txs = (0..10).map(|i| raw_tx(&format!("0x{i:02x}"), i)).collect();

    let (result, _, _) = run(ScriptedNode::with_transactions(txs), &storage).await;

    assert_eq!(result.unwrap().processed, 10);
    assert_eq!(storage.batch_sizes(), vec![10]);
    for (i, tx) in storage.transactions().iter().enumerate() {
        assert_eq!(tx.hash, format!("0x{i:02x}"));
        assert_eq!(tx.transaction_index, i as u64);
    }
}

#[tokio::test]
async fn empty_block_succeeds_without_write() {
    let storage = InMemoryStorage::new();
    let (result, open, _) = run(ScriptedNode::with_transactions(vec![]), &storage).await;

    assert_eq!(result.unwrap().processed, 0);
    assert_eq!(storage.write_calls(), 0);
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unknown_block_is_a_fetch_error() {
    let storage = InMemoryStorage::new();
    let (result, open, _) = run(ScriptedNode::replying(Reply::Block(None)), &storage).await;

    let err = result.unwrap_err();
    assert_eq!(err.stage(), "fetch");
    assert!(matches!(
        err,
        TaskError::Fetch(NodeError::BlockNotFound(ref hash)) if hash.starts_with("0x")
    ));
    assert_eq!(storage.write_calls(), 0);
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn one_bad_record_aborts_the_whole_tipset() {
    let storage = InMemoryStorage::new();
    let mut bad = raw_tx("0x02", 2);
    bad.as_object_mut().unwrap().remove("chainId");
    let node = ScriptedNode::with_transactions(vec![raw_tx("0x00", 0), raw_tx("0x01", 1), bad]);

    let (result, open, _) = run(node, &storage).await;

    match result.unwrap_err() {
        TaskError::Normalize(err) => {
            assert_eq!(err.index, 2);
            assert_eq!(err.source, FieldError::Missing { field: "chainId" });
        }
        other => panic!("unexpected error: {other:?}"),
    }
    assert_eq!(storage.write_calls(), 0);
    assert!(storage.is_empty());
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn non_object_transaction_is_a_fetch_error() {
    let storage = InMemoryStorage::new();
    let node = ScriptedNode::with_transactions(vec![json!("0xabc")]);

    let (result, _, _) = run(node, &storage).await;

    assert!(matches!(
        result,
        Err(TaskError::Fetch(NodeError::Malformed(_)))
    ));
    assert_eq!(storage.write_calls(), 0);
}

#[tokio::test]
async fn connection_failure_is_wrapped() {
    let storage = InMemoryStorage::new();
    let mut node = ScriptedNode::with_transactions(vec![raw_tx("0xabc", 0)]);
    node.refuse = true;

    let (result, _, opened) = run(node, &storage).await;

    let err = result.unwrap_err();
    assert_eq!(err.stage(), "connect");
    assert!(matches!(err, TaskError::Connection(NodeError::Connect(_))));
    assert_eq!(opened.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn fetch_failure_is_wrapped_and_session_released() {
    let storage = InMemoryStorage::new();
    let (result, open, opened) = run(ScriptedNode::replying(Reply::Error), &storage).await;

    assert!(matches!(
        result,
        Err(TaskError::Fetch(NodeError::Rpc { code: -32603, .. }))
    ));
    assert_eq!(opened.load(Ordering::SeqCst), 1);
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn unresolvable_key_fails_before_fetch() {
    let storage = InMemoryStorage::new();
    let node = ScriptedNode::with_transactions(vec![raw_tx("0xabc", 0)]);
    let requested = node.requested.clone();
    let open = node.open.clone();
    let task = TransactionTask::new(Arc::new(node));
    let empty = TipSet::new(5, TipSetKey::new(Vec::<String>::new()));

    let err = task
        .run(&RunContext::background(), "http://lotus", 1, &empty, &storage)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::KeyResolution(KeyError::Empty)));
    assert!(requested.lock().unwrap().is_empty());
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn storage_failure_is_wrapped() {
    let (result, open, _) = run(
        ScriptedNode::with_transactions(vec![raw_tx("0xabc", 0)]),
        &BrokenStorage,
    )
    .await;

    let err = result.unwrap_err();
    assert_eq!(err.stage(), "storage");
    assert!(matches!(err, TaskError::Storage(StorageError::Backend(ref m)) if m == "disk full"));
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn hanging_node_hits_the_deadline() {
    let storage = InMemoryStorage::new();
    let node = ScriptedNode::replying(Reply::Hang);
    let open = node.open.clone();
    let task = TransactionTask::new(Arc::new(node));
    let ctx = RunContext::background().with_timeout(Duration::from_secs(5));

    let err = task
        .run(&ctx, "http://lotus", 1, &tipset(), &storage)
        .await
        .unwrap_err();

    assert!(matches!(err, TaskError::DeadlineExceeded));
    assert!(err.is_interrupted());
    assert_eq!(open.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn cancelled_run_is_reported() {
    let storage = InMemoryStorage::new();
    let task = TransactionTask::new(Arc::new(ScriptedNode::replying(Reply::Hang)));
    let (ctx, handle) = RunContext::cancellable();
    let ts = tipset();

    let run = task.run(&ctx, "http://lotus", 1, &ts, &storage);
    let cancel = async {
        tokio::task::yield_now().await;
        handle.cancel();
    };
    let (result, ()) = tokio::join!(run, cancel);

    assert!(matches!(result, Err(TaskError::Cancelled)));
    assert_eq!(storage.write_calls(), 0);
}

// ─── Queue-driven runs ────────────────────────────────────────────────────────

#[tokio::test]
async fn redelivered_tipset_is_written_idempotently() {
    let storage = InMemoryStorage::new();
    let task = TransactionTask::new(Arc::new(ScriptedNode::with_transactions(vec![
        raw_tx("0x00", 0),
        raw_tx("0x01", 1),
    ])));
    let queue = MemoryQueue::new();
    let ctx = RunContext::background();
    queue
        .init_from_config(&ctx, &ChainNotifyConfig::default(), "tipsets")
        .await
        .unwrap();
    queue.publish(&tipset()).unwrap();

    // First delivery: processed, but the consumer "crashes" before committing.
    let message = queue.fetch_message(&ctx).await.unwrap();
    task.run(&ctx, "http://lotus", 1, &message.tipset().unwrap(), &storage)
        .await
        .unwrap();
    assert_eq!(queue.redeliver_uncommitted(), 1);

    // Redelivery goes through the full dispatch contract and is committed.
    let report = dispatch_once(&ctx, &queue, &task, "http://lotus", 1, &storage)
        .await
        .unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(queue.in_flight(), 0);
    assert_eq!(queue.pending(), 0);
    assert_eq!(storage.write_calls(), 2);
    assert_eq!(storage.len(), 2);
}

#[tokio::test]
async fn failed_run_leaves_message_for_redelivery() {
    let storage = InMemoryStorage::new();
    let task = TransactionTask::new(Arc::new(ScriptedNode::replying(Reply::Error)));
    let queue = MemoryQueue::new();
    let ctx = RunContext::background();
    queue
        .init_from_config(&ctx, &ChainNotifyConfig::default(), "tipsets")
        .await
        .unwrap();
    queue.publish(&tipset()).unwrap();

    let err = dispatch_once(&ctx, &queue, &task, "http://lotus", 1, &storage)
        .await
        .unwrap_err();

    assert!(matches!(err, DispatchError::Run { .. }));
    assert_eq!(queue.in_flight(), 1);
    assert_eq!(queue.redeliver_uncommitted(), 1);
    assert_eq!(queue.pending(), 1);
}

#[tokio::test]
async fn unknown_block_leaves_message_uncommitted() {
    let storage = InMemoryStorage::new();
    let task = TransactionTask::new(Arc::new(ScriptedNode::replying(Reply::Block(None))));
    let queue = MemoryQueue::new();
    let ctx = RunContext::background();
    queue
        .init_from_config(&ctx, &ChainNotifyConfig::default(), "tipsets")
        .await
        .unwrap();
    queue.publish(&tipset()).unwrap();

    let err = dispatch_once(&ctx, &queue, &task, "http://lotus", 1, &storage)
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        DispatchError::Run {
            source: TaskError::Fetch(NodeError::BlockNotFound(_)),
            ..
        }
    ));
    assert_eq!(queue.in_flight(), 1);
    assert_eq!(storage.write_calls(), 0);
}
