//! Counter/gauge registry for the metrics named in the external-interfaces
//! contract. Grounded in `monitoring/metrics.rs`'s `Counter` (an
//! `RwLock<f64>` behind a name/help pair) generalized into a small
//! `MetricsRegistry` that owns one instance of every named metric.

use parking_lot::RwLock;
use std::collections::HashMap;

#[derive(Debug, Default)]
pub struct Counter {
    value: RwLock<f64>,
}

impl Counter {
    pub fn inc(&self) {
        self.inc_by(1.0);
    }

    pub fn inc_by(&self, delta: f64) {
        *self.value.write() += delta;
    }

    pub fn get(&self) -> f64 {
        *self.value.read()
    }
}

#[derive(Debug, Default)]
pub struct Gauge {
    value: RwLock<f64>,
}

impl Gauge {
    pub fn set(&self, v: f64) {
        *self.value.write() = v;
    }

    pub fn add(&self, delta: f64) {
        *self.value.write() += delta;
    }

    pub fn get(&self) -> f64 {
        *self.value.read()
    }
}

macro_rules! counters {
    ($($field:ident => $name:literal),* $(,)?) => {
        pub struct MetricsRegistry {
            $(pub $field: Counter,)*
            pub memory_pool_bytes_total: Gauge,
        }

        impl Default for MetricsRegistry {
            fn default() -> Self {
                Self {
                    $($field: Counter::default(),)*
                    memory_pool_bytes_total: Gauge::default(),
                }
            }
        }

        impl MetricsRegistry {
            /// Snapshot every registered counter by its external name, for
            /// a future `/metrics` exposition endpoint.
            pub fn snapshot(&self) -> HashMap<&'static str, f64> {
                let mut out = HashMap::new();
                $(out.insert($name, self.$field.get());)*
                out.insert("memory_pool_bytes_total", self.memory_pool_bytes_total.get());
                out
            }
        }
    };
}

counters! {
    fragment_requests_total => "fragment_requests_total",
    fragment_request_duration_us => "fragment_request_duration_us",
    http_requests_total => "http_requests_total",
    http_request_duration_us => "http_request_duration_us",
    http_request_send_bytes => "http_request_send_bytes",
    query_scan_bytes => "query_scan_bytes",
    query_scan_rows => "query_scan_rows",
    ranges_processed_total => "ranges_processed_total",
    push_requests_success_total => "push_requests_success_total",
    push_requests_fail_total => "push_requests_fail_total",
    push_request_duration_us => "push_request_duration_us",
    push_request_write_bytes => "push_request_write_bytes",
    push_request_write_rows => "push_request_write_rows",
    create_tablet_requests_total => "create_tablet_requests_total",
    drop_tablet_requests_total => "drop_tablet_requests_total",
    create_tablet_requests_failed => "create_tablet_requests_failed",
    schema_change_requests_total => "schema_change_requests_total",
    schema_change_requests_failed => "schema_change_requests_failed",
    create_rollup_requests_total => "create_rollup_requests_total",
    create_rollup_requests_failed => "create_rollup_requests_failed",
    delete_requests_total => "delete_requests_total",
    delete_requests_failed => "delete_requests_failed",
    clone_requests_total => "clone_requests_total",
    clone_requests_failed => "clone_requests_failed",
    finish_task_requests_total => "finish_task_requests_total",
    finish_task_requests_failed => "finish_task_requests_failed",
    base_compaction_request_total => "base_compaction_request_total",
    base_compaction_request_failed => "base_compaction_request_failed",
    cumulative_compaction_request_total => "cumulative_compaction_request_total",
    cumulative_compaction_request_failed => "cumulative_compaction_request_failed",
    base_compaction_deltas_total => "base_compaction_deltas_total",
    base_compaction_bytes_total => "base_compaction_bytes_total",
    cumulative_compaction_deltas_total => "cumulative_compaction_deltas_total",
    cumulative_compaction_bytes_total => "cumulative_compaction_bytes_total",
    alter_task_success_total => "alter_task_success_total",
    alter_task_failed_total => "alter_task_failed_total",
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero_and_accumulate() {
        let registry = MetricsRegistry::default();
        assert_eq!(registry.push_requests_success_total.get(), 0.0);
        registry.push_requests_success_total.inc();
        registry.push_requests_success_total.inc_by(2.0);
        assert_eq!(registry.push_requests_success_total.get(), 3.0);
    }

    #[test]
    fn snapshot_includes_the_gauge() {
        let registry = MetricsRegistry::default();
        registry.memory_pool_bytes_total.set(4096.0);
        let snap = registry.snapshot();
        assert_eq!(snap["memory_pool_bytes_total"], 4096.0);
    }
}
