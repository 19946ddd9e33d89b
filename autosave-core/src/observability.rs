/*!
Observability for the autosave engine.

- Structured logging through `tracing`, with an env-filter and plain or JSON
  output
- Prometheus counters for saves, failures and skipped ticks (feature
  `metrics`)
*/

#[cfg(feature = "metrics")]
use prometheus::{Counter, Encoder, Histogram, HistogramOpts, Registry, TextEncoder};
#[cfg(feature = "metrics")]
use std::sync::OnceLock;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Registry as TracingRegistry};

use crate::{AutosaveError, Result};

/// Filter applied when `RUST_LOG` is unset
pub const DEFAULT_LOG_DIRECTIVE: &str = "autosave_core=info";

#[cfg(feature = "metrics")]
static METRICS: OnceLock<Option<AutosaveMetrics>> = OnceLock::new();

/// Prometheus metrics for autosave operations
#[cfg(feature = "metrics")]
#[derive(Debug)]
pub struct AutosaveMetrics {
    pub saves_total: Counter,
    pub save_failures_total: Counter,
    pub unchanged_skips_total: Counter,
    pub load_key_failures_total: Counter,
    pub snapshot_size_bytes: Histogram,

    registry: Registry,
}

#[cfg(feature = "metrics")]
fn counter(registry: &Registry, name: &str, help: &str) -> Result<Counter> {
    let counter = Counter::new(name, help)
        .map_err(|e| AutosaveError::config(format!("failed to create {name} metric: {e}")))?;
    registry
        .register(Box::new(counter.clone()))
        .map_err(|e| AutosaveError::config(format!("failed to register {name}: {e}")))?;
    Ok(counter)
}

#[cfg(feature = "metrics")]
impl AutosaveMetrics {
    fn new() -> Result<Self> {
        let registry = Registry::new();

        let saves_total = counter(
            &registry,
            "autosave_saves_total",
            "Snapshots written to disk",
        )?;
        let save_failures_total = counter(
            &registry,
            "autosave_save_failures_total",
            "Save attempts that failed",
        )?;
        let unchanged_skips_total = counter(
            &registry,
            "autosave_unchanged_skips_total",
            "Due save-files skipped because nothing changed",
        )?;
        let load_key_failures_total = counter(
            &registry,
            "autosave_load_key_failures_total",
            "Entries that could not be restored on load",
        )?;

        let snapshot_size_bytes = Histogram::with_opts(
            HistogramOpts::new(
                "autosave_snapshot_size_bytes",
                "Encoded size of written snapshots",
            )
            .buckets(prometheus::exponential_buckets(64.0, 4.0, 8).map_err(|e| {
                AutosaveError::config(format!("invalid snapshot size buckets: {e}"))
            })?),
        )
        .map_err(|e| AutosaveError::config(format!("failed to create snapshot_size_bytes: {e}")))?;
        registry
            .register(Box::new(snapshot_size_bytes.clone()))
            .map_err(|e| AutosaveError::config(format!("failed to register snapshot_size_bytes: {e}")))?;

        Ok(Self {
            saves_total,
            save_failures_total,
            unchanged_skips_total,
            load_key_failures_total,
            snapshot_size_bytes,
            registry,
        })
    }

    /// Get or initialize the global metrics instance
    ///
    /// Returns `None` if the metrics could not be registered; the failure is
    /// logged once.
    pub fn global() -> Option<&'static AutosaveMetrics> {
        METRICS
            .get_or_init(|| match Self::new() {
                Ok(metrics) => Some(metrics),
                Err(err) => {
                    tracing::error!(error = %err, "metrics disabled");
                    None
                }
            })
            .as_ref()
    }

    pub fn record_save(&self) {
        self.saves_total.inc();
    }

    pub fn record_save_failure(&self) {
        self.save_failures_total.inc();
    }

    pub fn record_unchanged(&self) {
        self.unchanged_skips_total.inc();
    }

    pub fn record_load_key_failure(&self) {
        self.load_key_failures_total.inc();
    }

    pub fn record_snapshot_size(&self, size_bytes: usize) {
        self.snapshot_size_bytes.observe(size_bytes as f64);
    }

    /// Gather metrics in Prometheus text format
    pub fn gather_metrics(&self) -> Result<String> {
        let encoder = TextEncoder::new();
        let mut buffer = Vec::new();
        encoder
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| AutosaveError::format(format!("failed to encode metrics: {e}")))?;
        String::from_utf8(buffer)
            .map_err(|e| AutosaveError::format(format!("metrics are not UTF-8: {e}")))
    }
}

/// Run `f` against the global metrics, if available
#[cfg(feature = "metrics")]
pub(crate) fn record<F: FnOnce(&AutosaveMetrics)>(f: F) {
    if let Some(metrics) = AutosaveMetrics::global() {
        f(metrics);
    }
}

/// Install the global tracing subscriber
///
/// `RUST_LOG` overrides [`DEFAULT_LOG_DIRECTIVE`]. With `json` set, events are
/// written as one JSON object per line.
///
/// # Errors
/// * `AutosaveError::Config` - If a subscriber is already installed
pub fn init_observability(json: bool) -> Result<()> {
    #[cfg(feature = "metrics")]
    AutosaveMetrics::global();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));
    let registry = TracingRegistry::default().with(filter);

    let installed = if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_target(false)
                    .with_current_span(false),
            )
            .try_init()
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_target(false))
            .try_init()
    };
    installed.map_err(|e| AutosaveError::config(format!("failed to set tracing subscriber: {e}")))?;

    tracing::debug!("autosave observability initialized");
    Ok(())
}
