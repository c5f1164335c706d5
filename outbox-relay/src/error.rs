//! Error taxonomy shared by the outbox store, the registry, and the sink client.

use thiserror::Error;

/// Result type alias for relay operations.
pub type RelayResult<T> = Result<T, RelayError>;

/// Errors that can occur anywhere in the outbox relay pipeline.
///
/// This is the single error currency between [`crate::store::OutboxStore`],
/// [`crate::registry::EventRegistry`], and [`crate::sink::SinkClient`] so the
/// relay worker can match on error kind without downcasting.
#[derive(Error, Debug)]
pub enum RelayError {
    /// Underlying relational database operation failed.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// `append` was called with data that violates a uniqueness or check
    /// constraint on the outbox table itself. This rolls back the caller's
    /// whole transaction, including the business write.
    #[error("outbox write conflict: {0}")]
    OutboxWriteConflict(String),

    /// A claimed row's `event_type` has no registered preparer. Poison row.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A claimed row's `event_context` is missing a required field or has
    /// the wrong shape for its registered preparer. Poison row.
    #[error("invalid context for event type {event_type}: {reason}")]
    InvalidContext { event_type: String, reason: String },

    /// The sink could not be reached, or timed out, or the circuit breaker
    /// protecting it is open. Retriable on the next tick.
    #[error("sink unavailable: {0}")]
    SinkUnavailable(String),

    /// The sink reached out and explicitly rejected a record (schema
    /// mismatch). Retriable, but likely needs operator intervention.
    #[error("sink rejected batch: {0}")]
    SinkRejected(String),

    /// Requested outbox row id does not exist.
    #[error("outbox row not found: {0}")]
    RowNotFound(i64),

    /// Failed to serialize a prepared payload to JSON.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Producer-facing validation failure. Distinct from [`RelayError`]: this is
/// never a system error, it is always returned as a structured response with
/// `error` populated rather than propagated as `Err`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct BusinessRejected(pub String);
