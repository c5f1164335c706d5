//! Transactional outbox relay.
//!
//! A producer writes a business row and an outbox row in one transaction
//! (see [`usecase`]). A background worker ([`relay::RelayWorker`]) claims
//! unprocessed outbox rows under `SELECT ... FOR UPDATE SKIP LOCKED`,
//! prepares each row's context into a typed payload via the
//! [`registry::EventRegistry`], and ships the batch to a columnar sink
//! through [`sink::SinkClient`]. A row is marked processed only after the
//! sink accepts the whole batch, guaranteeing at-least-once delivery.

pub mod config;
pub mod error;
pub mod metrics;
pub mod model;
pub mod registry;
pub mod relay;
pub mod sink;
pub mod store;
pub mod usecase;

pub use error::{BusinessRejected, RelayError, RelayResult};
pub use model::{EventContext, OutboxRow, SinkRecord};
pub use registry::EventRegistry;
pub use relay::{RelayWorker, TickOutcome};
pub use sink::{ClickHouseSinkClient, SinkClient};
pub use store::{OutboxStore, PgOutboxStore};
