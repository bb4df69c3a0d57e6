use once_cell::sync::Lazy;
use prometheus::{IntGauge, Opts, Registry};
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, RwLock},
};
use tracing::{debug, instrument, warn};

/// Global instance served by the `/metrics` endpoint.
pub static METRICS: Lazy<Mutex<Option<Metrics>>> = Lazy::new(|| Mutex::new(None));

/// Gauges every playback session reports, with their help text.
pub const PLAYBACK_GAUGES: [(&str, &str); 6] = [
    ("manifest_version", "Version of the current top-level manifest load"),
    ("layouts_resolved", "Number of layouts in the current manifest"),
    ("layout_switches", "Completed layout switches"),
    ("stall_recoveries", "Seeks issued to recover from a stalled playhead"),
    ("stall_escalations", "Reloads issued after repeated stall recoveries"),
    ("session_errors", "Times the session entered the error state"),
];

/// Prometheus registry with integer gauges keyed by name.
#[derive(Debug, Clone)]
pub struct Metrics {
    registry: Registry,
    common_labels: Arc<RwLock<Vec<(String, String)>>>,
    gauges: Arc<Mutex<HashMap<String, IntGauge>>>,
}

pub struct MetricsBuilder {
    common_labels: Vec<(String, String)>,
    gauges: Vec<(String, String)>,
}

impl Default for MetricsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsBuilder {
    #[instrument(skip_all)]
    pub fn new() -> Self {
        Self {
            common_labels: Vec::new(),
            gauges: Vec::new(),
        }
    }

    /// Add a common label to be applied to all metrics.
    #[instrument(skip_all)]
    pub fn add_label(mut self, key: &str, value: &str) -> Self {
        self.common_labels.push((key.to_string(), value.to_string()));
        self
    }

    /// Add a gauge by name and description.
    #[instrument(skip_all)]
    pub fn add_gauge(mut self, name: &str, description: &str) -> Self {
        self.gauges.push((name.to_string(), description.to_string()));
        self
    }

    /// Registers all of `PLAYBACK_GAUGES`.
    pub fn with_playback_gauges(self) -> Self {
        PLAYBACK_GAUGES
            .iter()
            .fold(self, |builder, (name, help)| builder.add_gauge(name, help))
    }

    #[instrument(skip_all)]
    pub fn build(self) -> Result<Metrics, String> {
        let metrics = Metrics {
            registry: Registry::new(),
            common_labels: Arc::new(RwLock::new(self.common_labels)),
            gauges: Arc::new(Mutex::new(HashMap::new())),
        };
        for (name, description) in &self.gauges {
            metrics.get_or_create_gauge(name, description)?;
        }

        debug!("Metrics built with {} gauges", self.gauges.len());
        Ok(metrics)
    }

    fn opts_with_labels(name: &str, help: &str, labels: &[(String, String)]) -> Opts {
        let mut opts = Opts::new(name, help);
        for (key, value) in labels {
            opts = opts.const_label(key.clone(), value.clone());
        }
        opts
    }
}

/// The globally installed instance, if any.
pub fn get_metrics() -> Option<Metrics> {
    METRICS.lock().ok().and_then(|guard| guard.clone())
}

impl Metrics {
    /// Makes this instance the one `get_metrics` and the HTTP handler use.
    #[instrument(skip_all)]
    pub fn install(&self) {
        match METRICS.lock() {
            Ok(mut guard) => {
                if guard.is_some() {
                    warn!("Replacing previously installed metrics instance");
                }
                *guard = Some(self.clone());
            }
            Err(_) => warn!("Metrics lock poisoned, instance not installed"),
        }
    }

    /// Add or get a gauge by name.
    #[instrument(skip_all)]
    pub fn get_or_create_gauge(&self, name: &str, description: &str) -> Result<IntGauge, String> {
        let mut gauges = self
            .gauges
            .lock()
            .map_err(|_| "Failed to lock gauges".to_string())?;
        if let Some(gauge) = gauges.get(name) {
            return Ok(gauge.clone());
        }

        let labels = self
            .common_labels
            .read()
            .map_err(|_| "Failed to lock common labels".to_string())?;
        let opts = MetricsBuilder::opts_with_labels(name, description, &labels);
        let gauge = IntGauge::with_opts(opts).map_err(|e| format!("Failed to create gauge: {}", e))?;
        self.registry
            .register(Box::new(gauge.clone()))
            .map_err(|e| format!("Failed to register gauge: {}", e))?;
        gauges.insert(name.to_string(), gauge.clone());
        Ok(gauge)
    }

    pub fn set(&self, name: &str, value: i64) {
        if let Some(gauge) = self.gauge(name) {
            gauge.set(value);
        }
    }

    pub fn inc(&self, name: &str) {
        if let Some(gauge) = self.gauge(name) {
            gauge.inc();
        }
    }

    pub fn value(&self, name: &str) -> Option<i64> {
        self.gauge(name).map(|g| g.get())
    }

    fn gauge(&self, name: &str) -> Option<IntGauge> {
        let gauge = self.gauges.lock().ok()?.get(name).cloned();
        if gauge.is_none() {
            debug!("Gauge '{}' is not registered", name);
        }
        gauge
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
