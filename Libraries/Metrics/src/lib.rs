mod metrics;
mod server;

pub use metrics::{get_metrics, Metrics, MetricsBuilder, PLAYBACK_GAUGES};
pub use server::{metrics_handler, router, start_server};
