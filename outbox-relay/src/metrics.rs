//! Prometheus metrics for the relay worker.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Opts};
use tracing::warn;

#[derive(Clone)]
pub struct RelayMetrics {
    pub pending: IntGauge,
    pub oldest_pending_age_seconds: IntGauge,
    pub delivered_total: IntCounter,
    pub poison_row_total: IntCounter,
    pub tick_duration_seconds: Histogram,
}

impl RelayMetrics {
    pub fn new(service: &str) -> Self {
        let registry = prometheus::default_registry();

        let pending = IntGauge::with_opts(
            Opts::new(
                "outbox_pending_count",
                "Number of unprocessed outbox rows currently pending",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_pending_count");

        let oldest_pending_age_seconds = IntGauge::with_opts(
            Opts::new(
                "outbox_oldest_pending_age_seconds",
                "Age in seconds of the oldest pending outbox row",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_oldest_pending_age_seconds");

        let delivered_total = IntCounter::with_opts(
            Opts::new(
                "outbox_delivered_total",
                "Total number of outbox rows delivered to the sink",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_delivered_total");

        let poison_row_total = IntCounter::with_opts(
            Opts::new(
                "outbox_poison_row_total",
                "Total number of ticks aborted by a poison row",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_poison_row_total");

        let tick_duration_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "outbox_tick_duration_seconds",
                "Wall-clock duration of a single relay tick",
            )
            .const_label("service", service.to_string()),
        )
        .expect("valid metric opts for outbox_tick_duration_seconds");

        for metric in [
            Box::new(pending.clone()) as Box<dyn prometheus::core::Collector>,
            Box::new(oldest_pending_age_seconds.clone()),
            Box::new(delivered_total.clone()),
            Box::new(poison_row_total.clone()),
            Box::new(tick_duration_seconds.clone()),
        ] {
            if let Err(e) = registry.register(metric) {
                warn!("failed to register relay metric: {}", e);
            }
        }

        Self {
            pending,
            oldest_pending_age_seconds,
            delivered_total,
            poison_row_total,
            tick_duration_seconds,
        }
    }
}
