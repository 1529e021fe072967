//! End-to-end processing scenarios over the in-memory stream and store.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId};
use domain::{InMemoryOrderStore, LineItem, Order, OrderStatus, OrderStore, StoreError};
use order_stream::{
    EntryId, EntryRange, GroupStart, InMemoryOrderStream, OrderStream, OrderStreamExt,
    PendingEntry, StreamEntry, StreamError,
};
use processor::{OrderIntake, OrderProcessor, ProcessorConfig, ProcessorError, Scheduler};
use tokio::sync::RwLock;

const STREAM: &str = "orders";
const GROUP: &str = "order-processors";

fn config(consumer: &str) -> ProcessorConfig {
    ProcessorConfig::new(STREAM, GROUP, consumer).with_read_block(Duration::ZERO)
}

fn new_order() -> Order {
    Order::new(
        CustomerId::new("cust-1"),
        vec![LineItem::new("P001", 2), LineItem::new("P002", 1)],
    )
    .unwrap()
}

async fn submit(stream: &InMemoryOrderStream, store: &InMemoryOrderStore) -> OrderId {
    let intake = OrderIntake::new(stream.clone(), store.clone(), STREAM);
    let order = new_order();
    intake.submit(&order).await.unwrap();
    order.id
}

async fn setup() -> (InMemoryOrderStream, InMemoryOrderStore) {
    let stream = InMemoryOrderStream::new();
    stream
        .create_group(STREAM, GROUP, GroupStart::Beginning)
        .await
        .unwrap();
    (stream, InMemoryOrderStore::new())
}

// ============================================================================
// Fault injection
// ============================================================================

/// A side effect on the stream or the store, in the order it was issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Update,
    Ack(EntryId),
    Delete(EntryId),
}

type CallLog = Arc<RwLock<Vec<Call>>>;

/// Stream wrapper whose acknowledgments fail for selected entries.
#[derive(Clone)]
struct FlakyAckStream {
    inner: InMemoryOrderStream,
    failing: Arc<RwLock<HashSet<EntryId>>>,
    calls: CallLog,
}

impl FlakyAckStream {
    fn new(inner: InMemoryOrderStream) -> Self {
        Self {
            inner,
            failing: Arc::new(RwLock::new(HashSet::new())),
            calls: CallLog::default(),
        }
    }

    fn recording(mut self, calls: CallLog) -> Self {
        self.calls = calls;
        self
    }

    async fn fail_ack_for(&self, id: EntryId) {
        self.failing.write().await.insert(id);
    }

    async fn heal(&self) {
        self.failing.write().await.clear();
    }
}

#[async_trait]
impl OrderStream for FlakyAckStream {
    async fn append(&self, stream: &str, fields: &[(&str, &str)]) -> order_stream::Result<EntryId> {
        self.inner.append(stream, fields).await
    }

    async fn create_group(
        &self,
        stream: &str,
        group: &str,
        start: GroupStart,
    ) -> order_stream::Result<()> {
        self.inner.create_group(stream, group, start).await
    }

    async fn read_new(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> order_stream::Result<Vec<StreamEntry>> {
        self.inner
            .read_new(stream, group, consumer, count, block)
            .await
    }

    async fn list_pending(
        &self,
        stream: &str,
        group: &str,
        range: EntryRange,
        limit: usize,
    ) -> order_stream::Result<Vec<PendingEntry>> {
        self.inner.list_pending(stream, group, range, limit).await
    }

    async fn claim(
        &self,
        stream: &str,
        group: &str,
        consumer: &str,
        min_idle: Duration,
        ids: &[EntryId],
    ) -> order_stream::Result<Vec<StreamEntry>> {
        self.inner
            .claim(stream, group, consumer, min_idle, ids)
            .await
    }

    async fn acknowledge(
        &self,
        stream: &str,
        group: &str,
        id: &EntryId,
    ) -> order_stream::Result<bool> {
        self.calls.write().await.push(Call::Ack(*id));
        if self.failing.read().await.contains(id) {
            return Err(StreamError::MalformedReply("injected ack failure".to_string()));
        }
        self.inner.acknowledge(stream, group, id).await
    }

    async fn delete(&self, stream: &str, id: &EntryId) -> order_stream::Result<bool> {
        self.calls.write().await.push(Call::Delete(*id));
        self.inner.delete(stream, id).await
    }

    async fn len(&self, stream: &str) -> order_stream::Result<u64> {
        self.inner.len(stream).await
    }
}

/// Store wrapper whose status updates fail or hang until healed.
#[derive(Clone)]
struct FaultyStore {
    inner: InMemoryOrderStore,
    mode: Arc<RwLock<Fault>>,
    calls: CallLog,
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Fault {
    None,
    Fail,
    Hang,
}

impl FaultyStore {
    fn new(inner: InMemoryOrderStore, fault: Fault) -> Self {
        Self {
            inner,
            mode: Arc::new(RwLock::new(fault)),
            calls: CallLog::default(),
        }
    }

    fn recording(mut self, calls: CallLog) -> Self {
        self.calls = calls;
        self
    }

    async fn heal(&self) {
        *self.mode.write().await = Fault::None;
    }
}

#[async_trait]
impl OrderStore for FaultyStore {
    async fn insert(&self, order: &Order) -> domain::Result<()> {
        self.inner.insert(order).await
    }

    async fn get(&self, id: OrderId) -> domain::Result<Option<Order>> {
        self.inner.get(id).await
    }

    async fn transition_status(
        &self,
        ids: &[OrderId],
        from: OrderStatus,
        to: OrderStatus,
        at: DateTime<Utc>,
    ) -> domain::Result<u64> {
        self.calls.write().await.push(Call::Update);
        let fault = *self.mode.read().await;
        match fault {
            Fault::None => self.inner.transition_status(ids, from, to, at).await,
            Fault::Fail => Err(StoreError::CorruptRecord {
                id: "batch".to_string(),
                reason: "injected update failure".to_string(),
            }),
            Fault::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                self.inner.transition_status(ids, from, to, at).await
            }
        }
    }
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn single_order_is_processed_in_one_tick() {
    let (stream, store) = setup().await;
    let order_id = submit(&stream, &store).await;

    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    let report = processor.tick().await;

    assert!(report.is_clean());
    assert_eq!(report.digest.matched, 1);
    assert_eq!(
        store.status_of(order_id).await,
        Some(OrderStatus::Processing)
    );
    assert!(stream.is_empty(STREAM).await.unwrap());
    assert_eq!(stream.pending_count(STREAM, GROUP).await, 0);
}

#[tokio::test(start_paused = true)]
async fn crashed_consumer_work_is_reclaimed() {
    let (stream, store) = setup().await;
    let order_id = submit(&stream, &store).await;

    // Consumer A reads the entry and dies before digesting it.
    let delivered = stream
        .read_new(STREAM, GROUP, "consumer-a", 10, Duration::ZERO)
        .await
        .unwrap();
    assert_eq!(delivered.len(), 1);

    let survivor =
        OrderProcessor::new(stream.clone(), store.clone(), config("consumer-b")).unwrap();

    // Too recent to be considered abandoned.
    let report = survivor.tick().await;
    assert_eq!(report.reclaimed, 0);
    assert_eq!(store.status_of(order_id).await, Some(OrderStatus::Pending));

    tokio::time::advance(Duration::from_secs(31)).await;

    let report = survivor.tick().await;
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.digest.matched, 1);
    assert_eq!(
        store.status_of(order_id).await,
        Some(OrderStatus::Processing)
    );
    assert!(stream.is_empty(STREAM).await.unwrap());
    assert_eq!(stream.pending_count(STREAM, GROUP).await, 0);
}

#[tokio::test]
async fn duplicate_entries_for_one_order() {
    let (stream, store) = setup().await;
    let order_id = submit(&stream, &store).await;
    stream
        .append_order(STREAM, &order_id.to_string())
        .await
        .unwrap();

    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    let report = processor.tick().await;

    assert_eq!(report.read, 2);
    assert_eq!(report.digest.matched, 1);
    assert_eq!(report.digest.deleted, 2);
    assert!(stream.is_empty(STREAM).await.unwrap());
}

#[tokio::test]
async fn redelivered_order_is_not_transitioned_twice() {
    let (stream, store) = setup().await;
    let order_id = submit(&stream, &store).await;
    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    processor.tick().await;

    // A second work item for an order that already moved on.
    stream
        .append_order(STREAM, &order_id.to_string())
        .await
        .unwrap();
    let before = store.get(order_id).await.unwrap().unwrap();

    let report = processor.tick().await;
    assert_eq!(report.digest.matched, 0);
    assert_eq!(report.digest.deleted, 1);

    let after = store.get(order_id).await.unwrap().unwrap();
    assert_eq!(after.status, OrderStatus::Processing);
    assert_eq!(after.updated_at, before.updated_at);
}

#[tokio::test]
async fn cancelled_order_stays_cancelled() {
    let (stream, store) = setup().await;
    let mut order = new_order();
    order.status = OrderStatus::Cancelled;
    store.insert(&order).await.unwrap();
    stream
        .append_order(STREAM, &order.id.to_string())
        .await
        .unwrap();

    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    let report = processor.tick().await;

    assert_eq!(report.digest.matched, 0);
    assert_eq!(
        store.status_of(order.id).await,
        Some(OrderStatus::Cancelled)
    );
    assert!(stream.is_empty(STREAM).await.unwrap());
}

#[tokio::test]
async fn poison_entries_do_not_block_the_batch() {
    let (stream, store) = setup().await;
    stream.append_order(STREAM, "not-an-order").await.unwrap();
    let order_id = submit(&stream, &store).await;

    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    let report = processor.tick().await;

    assert_eq!(report.digest.poison, 1);
    assert_eq!(report.digest.matched, 1);
    assert_eq!(
        store.status_of(order_id).await,
        Some(OrderStatus::Processing)
    );
    assert!(stream.is_empty(STREAM).await.unwrap());
    assert_eq!(stream.pending_count(STREAM, GROUP).await, 0);
}

#[tokio::test]
async fn batch_of_only_poison_is_retired() {
    let (stream, store) = setup().await;
    stream.append_order(STREAM, "").await.unwrap();
    stream.append(STREAM, &[("customer", "c1")]).await.unwrap();

    let processor = OrderProcessor::new(stream.clone(), store, config("worker-1")).unwrap();
    let report = processor.tick().await;

    assert_eq!(report.digest.poison, 2);
    assert!(stream.is_empty(STREAM).await.unwrap());
    assert_eq!(stream.pending_count(STREAM, GROUP).await, 0);
}

#[tokio::test]
async fn update_precedes_ack_precedes_delete() {
    let (inner_stream, inner_store) = setup().await;
    let calls = CallLog::default();
    let stream = FlakyAckStream::new(inner_stream.clone()).recording(calls.clone());
    let store = FaultyStore::new(inner_store.clone(), Fault::None).recording(calls.clone());

    for _ in 0..3 {
        submit(&inner_stream, &inner_store).await;
    }
    inner_stream
        .append_order(STREAM, "not-an-order")
        .await
        .unwrap();
    let ids: Vec<EntryId> = inner_stream
        .entries(STREAM)
        .await
        .iter()
        .map(|entry| entry.id)
        .collect();

    let processor = OrderProcessor::new(stream, store, config("worker-1")).unwrap();
    let report = processor.tick().await;
    assert!(report.is_clean());
    assert_eq!(report.digest.matched, 3);
    assert_eq!(report.digest.deleted, 4);

    let calls = calls.read().await.clone();
    let position = |call: Call| {
        calls
            .iter()
            .position(|c| *c == call)
            .unwrap_or_else(|| panic!("{call:?} was never issued"))
    };

    assert_eq!(calls.iter().filter(|c| **c == Call::Update).count(), 1);
    let update = position(Call::Update);
    for id in ids {
        let ack = position(Call::Ack(id));
        let delete = position(Call::Delete(id));
        assert!(update < ack, "entry {id} acknowledged before the update");
        assert!(ack < delete, "entry {id} deleted before its acknowledgment");
    }
}

#[tokio::test(start_paused = true)]
async fn failed_ack_keeps_entry_for_reclaim() {
    let (inner, store) = setup().await;
    let stream = FlakyAckStream::new(inner.clone());
    let first = submit(&inner, &store).await;
    let second = submit(&inner, &store).await;

    let entries = inner.entries(STREAM).await;
    stream.fail_ack_for(entries[0].id).await;

    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    let report = processor.tick().await;

    assert_eq!(report.digest.matched, 2);
    assert_eq!(report.digest.ack_failures, 1);
    assert_eq!(report.digest.deleted, 1);
    assert!(!report.is_clean());

    // Both orders moved; the entry whose ack failed is still pending and
    // still in the stream.
    assert_eq!(store.status_of(first).await, Some(OrderStatus::Processing));
    assert_eq!(store.status_of(second).await, Some(OrderStatus::Processing));
    assert_eq!(inner.len(STREAM).await.unwrap(), 1);
    assert!(inner.is_pending(STREAM, GROUP, &entries[0].id).await.unwrap());

    stream.heal().await;
    tokio::time::advance(Duration::from_secs(31)).await;

    let report = processor.tick().await;
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.digest.matched, 0);
    assert_eq!(report.digest.deleted, 1);
    assert!(inner.is_empty(STREAM).await.unwrap());
    assert_eq!(inner.pending_count(STREAM, GROUP).await, 0);
}

#[tokio::test(start_paused = true)]
async fn failed_update_leaves_batch_pending() {
    let (stream, inner) = setup().await;
    let store = FaultyStore::new(inner.clone(), Fault::Fail);
    let order_id = submit(&stream, &inner).await;

    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    let report = processor.tick().await;

    assert_eq!(report.read, 1);
    assert_eq!(report.failed_phases, vec!["digest read"]);
    assert_eq!(inner.status_of(order_id).await, Some(OrderStatus::Pending));
    assert_eq!(stream.len(STREAM).await.unwrap(), 1);
    assert_eq!(stream.pending_count(STREAM, GROUP).await, 1);

    store.heal().await;
    tokio::time::advance(Duration::from_secs(31)).await;

    let report = processor.tick().await;
    assert!(report.is_clean());
    assert_eq!(report.reclaimed, 1);
    assert_eq!(report.digest.matched, 1);
    assert_eq!(
        inner.status_of(order_id).await,
        Some(OrderStatus::Processing)
    );
    assert!(stream.is_empty(STREAM).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn hung_update_times_out() {
    let (stream, inner) = setup().await;
    let store = FaultyStore::new(inner.clone(), Fault::Hang);
    let order_id = submit(&stream, &inner).await;

    let processor = OrderProcessor::new(stream.clone(), store, config("worker-1")).unwrap();
    let entries = processor.read_new().await.unwrap();
    let result = processor.digest(&entries).await;

    assert!(matches!(
        result,
        Err(ProcessorError::Timeout {
            operation: "transition status",
            ..
        })
    ));
    assert_eq!(inner.status_of(order_id).await, Some(OrderStatus::Pending));
    assert_eq!(stream.pending_count(STREAM, GROUP).await, 1);
}

#[tokio::test(start_paused = true)]
async fn two_consumers_split_the_work() {
    let (stream, store) = setup().await;
    let mut ids = Vec::new();
    for _ in 0..4 {
        ids.push(submit(&stream, &store).await);
    }

    let a = OrderProcessor::new(
        stream.clone(),
        store.clone(),
        config("consumer-a").with_read_batch_size(2),
    )
    .unwrap();
    let b = OrderProcessor::new(
        stream.clone(),
        store.clone(),
        config("consumer-b").with_read_batch_size(2),
    )
    .unwrap();

    let (ra, rb) = tokio::join!(a.tick(), b.tick());
    assert_eq!(ra.read + rb.read, 4);
    assert_eq!(ra.digest.matched + rb.digest.matched, 4);

    for id in ids {
        assert_eq!(store.status_of(id).await, Some(OrderStatus::Processing));
    }
    assert!(stream.is_empty(STREAM).await.unwrap());
}

#[tokio::test(start_paused = true)]
async fn scheduler_processes_orders_until_shutdown() {
    let (stream, store) = setup().await;
    let processor = OrderProcessor::new(stream.clone(), store.clone(), config("worker-1")).unwrap();
    let handle = Scheduler::new(processor).spawn();

    // Let the immediate first tick run on an empty stream.
    tokio::time::sleep(Duration::from_secs(1)).await;

    let order_id = submit(&stream, &store).await;
    assert_eq!(store.status_of(order_id).await, Some(OrderStatus::Pending));

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(
        store.status_of(order_id).await,
        Some(OrderStatus::Processing)
    );
    assert!(stream.is_empty(STREAM).await.unwrap());

    assert!(handle.shutdown(Duration::from_secs(10)).await);
}

#[tokio::test(start_paused = true)]
async fn scheduler_shutdown_aborts_a_stuck_tick() {
    let (stream, inner) = setup().await;
    let store = FaultyStore::new(inner.clone(), Fault::Hang);
    submit(&stream, &inner).await;

    let config = config("worker-1").with_call_timeout(Duration::from_secs(7200));
    let processor = OrderProcessor::new(stream.clone(), store, config).unwrap();
    let handle = Scheduler::new(processor).spawn();

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert!(!handle.shutdown(Duration::from_secs(5)).await);
}
