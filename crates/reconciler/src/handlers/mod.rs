//! Resource handlers for concrete remote kinds.

pub mod logs_metrics;
pub mod memory;

pub use logs_metrics::{LOGS_METRIC_KIND, LogsMetricsApi, LogsMetricsHandler};
pub use memory::InMemoryLogsMetrics;
