//! Data model shared by the outbox store, the registry, and the sink client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// A row in the operational outbox table.
///
/// Rows are created by producers inside their own transaction (see
/// [`crate::usecase`]), claimed under skip-locked row locking by the relay,
/// and flipped `processed` exactly once. They are never deleted here.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct OutboxRow {
    pub id: i64,
    pub event_type: String,
    pub event_date_time: DateTime<Utc>,
    pub environment: String,
    pub event_context: Value,
    pub metadata_version: i32,
    pub processed: bool,
}

/// A record as it is shipped to the columnar sink.
///
/// `event_context` here is already the JSON serialization of the *typed*
/// payload a preparer produced, not a raw copy of [`OutboxRow::event_context`].
#[derive(Debug, Clone, Serialize, Deserialize, clickhouse::Row)]
pub struct SinkRecord {
    pub event_type: String,
    pub event_date_time: DateTime<Utc>,
    pub environment: String,
    pub event_context: String,
    pub metadata_version: u16,
}

/// Generic context map carried on an [`OutboxRow`] before it is prepared.
pub type EventContext = HashMap<String, Value>;

/// Typed payload for the `user_created` event, `metadata_version = 1`.
///
/// This is the shape a preparer in [`crate::registry`] produces from a raw
/// [`EventContext`]; its JSON serialization becomes [`SinkRecord::event_context`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UserCreated {
    pub email: String,
    pub first_name: String,
    pub last_name: String,
}

/// Well-known event type tags. Extending the registry with a new event type
/// means adding a variant here and a matching preparer, nothing else.
pub mod event_type {
    pub const USER_CREATED: &str = "user_created";
}
