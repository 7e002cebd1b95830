use lux_observe::metrics::{Counter, Gauge};

/// Shared run-wide scheduler counters, bumped by every worker.
#[derive(Debug, Default)]
pub struct RunMetrics {
    pub items_computed_total: Counter,
    pub grants_total: Counter,
    pub returns_total: Counter,
    pub tokens_issued_total: Counter,
    pub tokens_relayed_total: Counter,
    pub workers_done: Gauge,
}

impl RunMetrics {
    pub fn emit_snapshot(&self) {
        tracing::info!(
            target: "lux_metrics",
            items_computed_total = self.items_computed_total.get(),
            grants_total = self.grants_total.get(),
            returns_total = self.returns_total.get(),
            tokens_issued_total = self.tokens_issued_total.get(),
            tokens_relayed_total = self.tokens_relayed_total.get(),
            workers_done = self.workers_done.get(),
            "metrics"
        );
    }
}
