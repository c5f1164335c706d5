//! Sink client: delivery of prepared [`SinkRecord`]s to the columnar sink.
//!
//! The ClickHouse round trip is wrapped in a timeout and a circuit breaker
//! (see [`resilience::sink_config`]) so that a slow or down sink fails fast
//! instead of stalling a relay tick. No in-process retry is attempted here:
//! a failed batch is left unprocessed and re-claimed on the next tick.

use async_trait::async_trait;
use clickhouse::Client;
use resilience::{with_timeout_result, CircuitBreaker, CircuitBreakerError};
use tracing::{debug, warn};

use crate::error::{RelayError, RelayResult};
use crate::model::SinkRecord;

/// Inner failure kind for a single chunk write, before it is flattened by
/// the timeout and circuit breaker wrappers into a string.
#[derive(Debug, thiserror::Error)]
enum SinkWriteError {
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("unavailable: {0}")]
    Unavailable(String),
}

fn classify_breaker_error(err: CircuitBreakerError) -> RelayError {
    match err {
        CircuitBreakerError::Open => {
            RelayError::SinkUnavailable("circuit breaker is open".to_string())
        }
        CircuitBreakerError::CallFailed(msg) if msg.contains("rejected:") => {
            RelayError::SinkRejected(msg)
        }
        CircuitBreakerError::CallFailed(msg) => RelayError::SinkUnavailable(msg),
    }
}

/// Delivery contract toward the columnar sink.
#[async_trait]
pub trait SinkClient: Send + Sync {
    /// Write every record, chunked at `chunk_size`, as one logical batch.
    /// Either every record lands or none does from the caller's point of
    /// view: a failure partway through is surfaced as an error, the rows
    /// stay unprocessed, and a retried batch may duplicate earlier chunks
    /// (sink writes are not itself transactional, at-least-once is enough).
    async fn insert(&self, records: &[SinkRecord], chunk_size: usize) -> RelayResult<()>;
}

/// ClickHouse-backed [`SinkClient`], guarded by a circuit breaker and a
/// per-chunk timeout.
pub struct ClickHouseSinkClient {
    client: Client,
    table: String,
    breaker: CircuitBreaker,
}

impl ClickHouseSinkClient {
    pub fn new(host: &str, database: &str, user: &str, password: &str, table: &str) -> Self {
        let client = Client::default()
            .with_url(host)
            .with_database(database)
            .with_user(user)
            .with_password(password)
            .with_compression(clickhouse::Compression::Lz4);

        let config = resilience::sink_config();
        Self {
            client,
            table: table.to_string(),
            breaker: CircuitBreaker::new(config.circuit_breaker),
        }
    }

    async fn write_chunk(&self, chunk: &[SinkRecord]) -> RelayResult<()> {
        let table = self.table.clone();
        let client = self.client.clone();
        let records = chunk.to_vec();
        let timeout = resilience::sink_config().timeout;

        let result = self
            .breaker
            .call(|| {
                with_timeout_result(timeout, async move {
                    let mut insert = client
                        .insert(&table)
                        .map_err(|e| SinkWriteError::Rejected(e.to_string()))?;
                    for record in &records {
                        insert
                            .write(record)
                            .await
                            .map_err(|e| SinkWriteError::Rejected(e.to_string()))?;
                    }
                    insert
                        .end()
                        .await
                        .map_err(|e| SinkWriteError::Unavailable(e.to_string()))
                })
            })
            .await;

        match result {
            Ok(()) => Ok(()),
            Err(breaker_err) => Err(classify_breaker_error(breaker_err)),
        }
    }
}

#[async_trait]
impl SinkClient for ClickHouseSinkClient {
    async fn insert(&self, records: &[SinkRecord], chunk_size: usize) -> RelayResult<()> {
        if records.is_empty() {
            return Ok(());
        }

        for chunk in records.chunks(chunk_size.max(1)) {
            match self.write_chunk(chunk).await {
                Ok(()) => debug!(count = chunk.len(), "wrote chunk to sink"),
                Err(e) => {
                    warn!(error = %e, count = chunk.len(), "sink chunk write failed");
                    return Err(e);
                }
            }
        }

        Ok(())
    }
}
