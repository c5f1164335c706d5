//! Event Model Registry: maps an `event_type` tag to a preparer that turns a
//! raw [`EventContext`] into the typed payload shipped to the sink.
//!
//! The registry is built once at startup with [`EventRegistry::builder`] and
//! never mutated afterward, so concurrent relay workers can look up a
//! preparer without taking a lock.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use crate::error::{RelayError, RelayResult};
use crate::model::{event_type, EventContext, UserCreated};

/// A pure function from a generic context map to a typed event payload.
///
/// Implementations must fail with [`RelayError::InvalidContext`] if a
/// required field is missing or the wrong type; they must never panic on
/// attacker- or producer-controlled input.
pub trait Preparer: Send + Sync {
    /// The event type tag this preparer handles.
    fn event_type(&self) -> &'static str;

    /// The `metadata_version` this preparer expects.
    fn metadata_version(&self) -> i32;

    /// Build the typed payload and return it pre-serialized to JSON, ready
    /// to become [`crate::model::SinkRecord::event_context`].
    fn prepare(&self, context: &EventContext) -> RelayResult<Value>;
}

fn required_str(context: &EventContext, field: &str, event_type: &str) -> RelayResult<String> {
    context
        .get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| RelayError::InvalidContext {
            event_type: event_type.to_string(),
            reason: format!("missing or non-string field `{field}`"),
        })
}

/// Preparer for `user_created`, `metadata_version = 1`.
pub struct UserCreatedPreparer;

impl Preparer for UserCreatedPreparer {
    fn event_type(&self) -> &'static str {
        event_type::USER_CREATED
    }

    fn metadata_version(&self) -> i32 {
        1
    }

    fn prepare(&self, context: &EventContext) -> RelayResult<Value> {
        let payload = UserCreated {
            email: required_str(context, "email", self.event_type())?,
            first_name: required_str(context, "first_name", self.event_type())?,
            last_name: required_str(context, "last_name", self.event_type())?,
        };
        Ok(serde_json::to_value(payload)?)
    }
}

/// Process-wide, read-only registry of event type preparers.
#[derive(Clone)]
pub struct EventRegistry {
    preparers: Arc<HashMap<String, Arc<dyn Preparer>>>,
}

/// Builder used once at startup to assemble an [`EventRegistry`].
#[derive(Default)]
pub struct EventRegistryBuilder {
    preparers: HashMap<String, Arc<dyn Preparer>>,
}

impl EventRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a preparer for its declared event type tag.
    pub fn register(mut self, preparer: impl Preparer + 'static) -> Self {
        let tag = preparer.event_type().to_string();
        self.preparers.insert(tag, Arc::new(preparer));
        self
    }

    pub fn build(self) -> EventRegistry {
        EventRegistry {
            preparers: Arc::new(self.preparers),
        }
    }
}

impl EventRegistry {
    pub fn builder() -> EventRegistryBuilder {
        EventRegistryBuilder::new()
    }

    /// The default registry: every event type this repository currently
    /// knows how to prepare. Extending it is registering one more preparer.
    pub fn with_defaults() -> Self {
        Self::builder().register(UserCreatedPreparer).build()
    }

    /// Resolve the preparer for a tag, or `UnknownEventType`.
    pub fn lookup(&self, tag: &str) -> RelayResult<Arc<dyn Preparer>> {
        self.preparers
            .get(tag)
            .cloned()
            .ok_or_else(|| RelayError::UnknownEventType(tag.to_string()))
    }

    /// Look up the preparer for `event_type` and validate that the row's
    /// `metadata_version` matches what the preparer expects, then run it.
    pub fn prepare(
        &self,
        event_type: &str,
        metadata_version: i32,
        context: &EventContext,
    ) -> RelayResult<Value> {
        let preparer = self.lookup(event_type)?;
        if preparer.metadata_version() != metadata_version {
            return Err(RelayError::InvalidContext {
                event_type: event_type.to_string(),
                reason: format!(
                    "unsupported metadata_version {metadata_version}, expected {}",
                    preparer.metadata_version()
                ),
            });
        }
        debug!(event_type, metadata_version, "preparing event context");
        preparer.prepare(context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx(pairs: &[(&str, &str)]) -> EventContext {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), json!(v)))
            .collect()
    }

    #[test]
    fn prepares_registered_user_created() {
        let registry = EventRegistry::with_defaults();
        let context = ctx(&[
            ("email", "test@email.com"),
            ("first_name", "Test"),
            ("last_name", "Testovich"),
        ]);

        let value = registry.prepare(event_type::USER_CREATED, 1, &context).unwrap();
        let payload: UserCreated = serde_json::from_value(value).unwrap();
        assert_eq!(payload.email, "test@email.com");
        assert_eq!(payload.first_name, "Test");
        assert_eq!(payload.last_name, "Testovich");
    }

    #[test]
    fn unknown_event_type_is_refused() {
        let registry = EventRegistry::with_defaults();
        let err = registry.prepare("something_else", 1, &EventContext::new());
        assert!(matches!(err, Err(RelayError::UnknownEventType(tag)) if tag == "something_else"));
    }

    #[test]
    fn missing_field_is_invalid_context() {
        let registry = EventRegistry::with_defaults();
        let context = ctx(&[("email", "test@email.com")]);
        let err = registry.prepare(event_type::USER_CREATED, 1, &context);
        assert!(matches!(err, Err(RelayError::InvalidContext { .. })));
    }

    #[test]
    fn mismatched_metadata_version_is_invalid_context() {
        let registry = EventRegistry::with_defaults();
        let context = ctx(&[
            ("email", "test@email.com"),
            ("first_name", "Test"),
            ("last_name", "Testovich"),
        ]);
        let err = registry.prepare(event_type::USER_CREATED, 2, &context);
        assert!(matches!(err, Err(RelayError::InvalidContext { .. })));
    }
}
