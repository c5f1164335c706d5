//! Integration-style scenarios for the relay, against mocked store and sink.

use async_trait::async_trait;
use chrono::Utc;
use mockall::mock;
use outbox_relay::error::{RelayError, RelayResult};
use outbox_relay::metrics::RelayMetrics;
use outbox_relay::model::{OutboxRow, SinkRecord};
use outbox_relay::registry::EventRegistry;
use outbox_relay::relay::RelayWorker;
use outbox_relay::sink::SinkClient;
use outbox_relay::store::{ClaimedBatch, OutboxStore};
use serde_json::json;
use sqlx::{Postgres, Transaction};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

mock! {
    pub Store {}

    #[async_trait]
    impl OutboxStore for Store {
        async fn append(
            &self,
            tx: &mut Transaction<'_, Postgres>,
            event_type: &str,
            environment: &str,
            event_context: &serde_json::Value,
            metadata_version: i32,
        ) -> RelayResult<i64>;
        async fn claim_batch(&self, limit: i64) -> RelayResult<Box<dyn ClaimedBatch>>;
        async fn pending_stats(&self) -> RelayResult<(i64, i64)>;
        async fn quarantine(&self, id: i64) -> RelayResult<()>;
    }
}

mock! {
    pub Sink {}

    #[async_trait]
    impl SinkClient for Sink {
        async fn insert(&self, records: &[SinkRecord], chunk_size: usize) -> RelayResult<()>;
    }
}

struct FakeClaim {
    rows: Vec<OutboxRow>,
    processed_ids: Arc<Mutex<Vec<i64>>>,
    aborted: Arc<Mutex<bool>>,
}

#[async_trait]
impl ClaimedBatch for FakeClaim {
    fn rows(&self) -> &[OutboxRow] {
        &self.rows
    }

    async fn mark_processed(self: Box<Self>) -> RelayResult<()> {
        self.processed_ids
            .lock()
            .unwrap()
            .extend(self.rows.iter().map(|r| r.id));
        Ok(())
    }

    async fn abort(self: Box<Self>) -> RelayResult<()> {
        *self.aborted.lock().unwrap() = true;
        Ok(())
    }
}

fn row(id: i64, event_type: &str, context: serde_json::Value) -> OutboxRow {
    OutboxRow {
        id,
        event_type: event_type.to_string(),
        event_date_time: Utc::now(),
        environment: "test".to_string(),
        event_context: context,
        metadata_version: 1,
        processed: false,
    }
}

fn user_created_context() -> serde_json::Value {
    json!({"email": "test@email.com", "first_name": "Test", "last_name": "Testovich"})
}

/// S1: happy path. One pending row, one tick, sink gets exactly one record.
#[tokio::test]
async fn s1_happy_path_delivers_and_marks_processed() {
    let rows = vec![row(1, "user_created", user_created_context())];
    let processed = Arc::new(Mutex::new(Vec::new()));
    let processed_clone = processed.clone();

    let mut store = MockStore::new();
    store.expect_claim_batch().times(1).returning(move |_| {
        Ok(Box::new(FakeClaim {
            rows: rows.clone(),
            processed_ids: processed_clone.clone(),
            aborted: Arc::new(Mutex::new(false)),
        }))
    });
    store.expect_pending_stats().returning(|| Ok((0, 0)));

    let delivered = Arc::new(Mutex::new(Vec::new()));
    let delivered_clone = delivered.clone();
    let mut sink = MockSink::new();
    sink.expect_insert().times(1).returning(move |records, _| {
        delivered_clone.lock().unwrap().extend_from_slice(records);
        Ok(())
    });

    let worker = RelayWorker::new(
        Arc::new(store),
        Arc::new(sink),
        EventRegistry::with_defaults(),
        RelayMetrics::new("s1"),
        100,
        1000,
    );

    let outcome = worker.tick().await.unwrap();
    assert_eq!(outcome.published, 1);
    assert_eq!(*processed.lock().unwrap(), vec![1]);
    let sent = delivered.lock().unwrap();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].event_type, "user_created");
    assert_eq!(sent[0].metadata_version, 1);
}

/// S4: sink fails on the first tick, both rows stay pending; second tick
/// succeeds and both are delivered.
#[tokio::test]
async fn s4_sink_failure_then_recovery() {
    let rows = vec![
        row(1, "user_created", user_created_context()),
        row(2, "user_created", user_created_context()),
    ];
    let aborted = Arc::new(Mutex::new(false));
    let processed = Arc::new(Mutex::new(Vec::new()));
    let attempt = Arc::new(AtomicUsize::new(0));

    let attempt_clone = attempt.clone();
    let rows_clone = rows.clone();
    let aborted_clone = aborted.clone();
    let processed_clone = processed.clone();
    let mut store = MockStore::new();
    store.expect_claim_batch().times(2).returning(move |_| {
        Ok(Box::new(FakeClaim {
            rows: rows_clone.clone(),
            processed_ids: processed_clone.clone(),
            aborted: aborted_clone.clone(),
        }))
    });
    store.expect_pending_stats().returning(|| Ok((2, 1)));

    let mut sink = MockSink::new();
    sink.expect_insert().times(2).returning(move |_, _| {
        if attempt_clone.fetch_add(1, Ordering::SeqCst) == 0 {
            Err(RelayError::SinkUnavailable("down".to_string()))
        } else {
            Ok(())
        }
    });

    let worker = RelayWorker::new(
        Arc::new(store),
        Arc::new(sink),
        EventRegistry::with_defaults(),
        RelayMetrics::new("s4"),
        100,
        1000,
    );

    let first = worker.tick().await;
    assert!(first.is_err());
    assert!(*aborted.lock().unwrap());
    assert!(processed.lock().unwrap().is_empty());

    let second = worker.tick().await.unwrap();
    assert_eq!(second.published, 2);
    assert_eq!(processed.lock().unwrap().len(), 2);
}

/// S6: a poison row aborts the whole claimed batch; nothing is marked
/// processed until the operator quarantines it out-of-band.
#[tokio::test]
async fn s6_poison_row_aborts_batch_until_quarantined() {
    let rows = vec![row(1, "unknown", json!({}))];
    let aborted = Arc::new(Mutex::new(false));
    let aborted_clone = aborted.clone();
    let processed = Arc::new(Mutex::new(Vec::new()));
    let processed_clone = processed.clone();

    let mut store = MockStore::new();
    store.expect_claim_batch().times(1).returning(move |_| {
        Ok(Box::new(FakeClaim {
            rows: rows.clone(),
            processed_ids: processed_clone.clone(),
            aborted: aborted_clone.clone(),
        }))
    });
    store.expect_pending_stats().returning(|| Ok((1, 10)));
    store.expect_quarantine().with(mockall::predicate::eq(1i64)).returning(|_| Ok(()));

    let sink = MockSink::new();
    let worker = RelayWorker::new(
        Arc::new(store),
        Arc::new(sink),
        EventRegistry::with_defaults(),
        RelayMetrics::new("s6"),
        100,
        1000,
    );

    let outcome = worker.tick().await.unwrap();
    assert!(outcome.poisoned);
    assert_eq!(outcome.published, 0);
    assert!(*aborted.lock().unwrap());
    assert!(processed.lock().unwrap().is_empty());
}
