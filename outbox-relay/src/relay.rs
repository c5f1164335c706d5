//! Relay worker: claims a batch, prepares each row's event context, ships it
//! to the sink, and marks the batch processed.
//!
//! A row that fails preparation (unknown event type, malformed context) is a
//! poison row. The whole claimed batch is aborted, not just the poison row:
//! partial progress that silently marks a poison row processed would drop
//! the event with no trace of it ever existing. The batch is reclaimed
//! unchanged on the next tick until an operator quarantines the offending
//! row with [`crate::store::OutboxStore::quarantine`].

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use crate::error::{RelayError, RelayResult};
use crate::metrics::RelayMetrics;
use crate::model::SinkRecord;
use crate::registry::EventRegistry;
use crate::sink::SinkClient;
use crate::store::OutboxStore;

/// Summary of one `tick()` call, used for logging and tests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub claimed: usize,
    pub published: usize,
    pub poisoned: bool,
}

pub struct RelayWorker {
    store: Arc<dyn OutboxStore>,
    sink: Arc<dyn SinkClient>,
    registry: EventRegistry,
    metrics: RelayMetrics,
    batch_limit: i64,
    chunk_size: usize,
}

impl RelayWorker {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        sink: Arc<dyn SinkClient>,
        registry: EventRegistry,
        metrics: RelayMetrics,
        batch_limit: i64,
        chunk_size: usize,
    ) -> Self {
        Self {
            store,
            sink,
            registry,
            metrics,
            batch_limit,
            chunk_size,
        }
    }

    /// Run one claim → prepare → ship → mark cycle and update metrics.
    pub async fn tick(&self) -> RelayResult<TickOutcome> {
        let started = Instant::now();
        let outcome = self.process_batch().await;
        let elapsed = started.elapsed();
        self.metrics.tick_duration_seconds.observe(elapsed.as_secs_f64());

        match &outcome {
            Ok(result) if result.claimed == 0 => {
                debug!("no outbox rows to deliver");
            }
            Ok(result) => {
                self.metrics.delivered_total.inc_by(result.published as u64);
                info!(
                    claimed_count = result.claimed,
                    published_count = result.published,
                    poisoned = result.poisoned,
                    elapsed_ms = elapsed.as_millis() as u64,
                    "relay tick completed"
                );
            }
            Err(e) => {
                error!(error = %e, elapsed_ms = elapsed.as_millis() as u64, "relay tick failed");
            }
        }

        if let Ok((pending, age)) = self.store.pending_stats().await {
            self.metrics.pending.set(pending);
            self.metrics.oldest_pending_age_seconds.set(age);
        }

        outcome
    }

    async fn process_batch(&self) -> RelayResult<TickOutcome> {
        let claim = self.store.claim_batch(self.batch_limit).await?;
        let rows = claim.rows().to_vec();

        if rows.is_empty() {
            claim.abort().await?;
            return Ok(TickOutcome::default());
        }

        let mut records = Vec::with_capacity(rows.len());
        for row in &rows {
            match self
                .registry
                .prepare(&row.event_type, row.metadata_version, &to_context(&row.event_context))
            {
                Ok(prepared) => records.push(SinkRecord {
                    event_type: row.event_type.clone(),
                    event_date_time: row.event_date_time,
                    environment: row.environment.clone(),
                    event_context: prepared.to_string(),
                    metadata_version: row.metadata_version as u16,
                }),
                Err(e) => {
                    warn!(
                        id = row.id,
                        event_type = %row.event_type,
                        error = %e,
                        "poison row found, aborting batch"
                    );
                    claim.abort().await?;
                    self.metrics.poison_row_total.inc();
                    return Ok(TickOutcome {
                        claimed: rows.len(),
                        published: 0,
                        poisoned: true,
                    });
                }
            }
        }

        if let Err(e) = self.sink.insert(&records, self.chunk_size).await {
            warn!(error = %e, count = rows.len(), "sink delivery failed, batch left pending");
            claim.abort().await?;
            return Err(e);
        }

        claim.mark_processed().await?;
        Ok(TickOutcome {
            claimed: rows.len(),
            published: rows.len(),
            poisoned: false,
        })
    }
}

fn to_context(value: &serde_json::Value) -> crate::model::EventContext {
    match value.as_object() {
        Some(map) => map.iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
        None => crate::model::EventContext::new(),
    }
}
