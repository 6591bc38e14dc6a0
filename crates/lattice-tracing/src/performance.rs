//! Timing spans and structured performance events.
//!
//! Events are emitted at debug level with a stable `event` field so that
//! JSON logs can be filtered by kind (`allocation`, `throughput`, `scale`).

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Instant;
use tracing::Level;

/// Threshold value meaning "log every span".
const NO_THRESHOLD: u64 = u64::MAX;

static PERF_ENABLED: AtomicBool = AtomicBool::new(true);
static PERF_THRESHOLD_US: AtomicU64 = AtomicU64::new(NO_THRESHOLD);

/// Install the process-wide defaults used by `perf_span!`.
///
/// With `enabled = false`, spans opened afterwards never log on drop.
/// `threshold_us` becomes the threshold of spans opened without one.
pub fn configure(enabled: bool, threshold_us: Option<u64>) {
    PERF_ENABLED.store(enabled, Ordering::Relaxed);
    PERF_THRESHOLD_US.store(threshold_us.unwrap_or(NO_THRESHOLD), Ordering::Relaxed);
}

pub fn performance_tracing_enabled() -> bool {
    PERF_ENABLED.load(Ordering::Relaxed)
}

/// The configured default threshold, if any.
pub fn default_threshold_us() -> Option<u64> {
    match PERF_THRESHOLD_US.load(Ordering::Relaxed) {
        NO_THRESHOLD => None,
        t => Some(t),
    }
}

/// RAII timer. Logs `performance_span_complete` on drop when the elapsed
/// time reaches the optional threshold.
pub struct PerformanceSpan {
    name: String,
    threshold_us: Option<u64>,
    enabled: bool,
    start_time: Instant,
    span: tracing::Span,
}

impl PerformanceSpan {
    /// Start timing `name` under the process-wide settings from [`configure`].
    pub fn from_settings(name: impl Into<String>) -> Self {
        Self::new(name, default_threshold_us())
    }

    /// Start timing `name`. `threshold_us = None` always logs.
    pub fn new(name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        Self::with_level(Level::DEBUG, name, threshold_us)
    }

    /// Start timing `name` with the span created at `level`.
    pub fn with_level(level: Level, name: impl Into<String>, threshold_us: Option<u64>) -> Self {
        let name = name.into();
        let span = match level {
            Level::TRACE => tracing::trace_span!("perf", name = %name),
            Level::DEBUG => tracing::debug_span!("perf", name = %name),
            Level::INFO => tracing::info_span!("perf", name = %name),
            Level::WARN => tracing::warn_span!("perf", name = %name),
            Level::ERROR => tracing::error_span!("perf", name = %name),
        };

        Self {
            name,
            threshold_us,
            enabled: performance_tracing_enabled(),
            start_time: Instant::now(),
            span,
        }
    }

    /// Name the span was opened with.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Microseconds since the span was opened.
    pub fn elapsed_us(&self) -> u64 {
        self.start_time.elapsed().as_micros() as u64
    }

    /// Threshold the span was opened with.
    pub fn threshold_us(&self) -> Option<u64> {
        self.threshold_us
    }

    fn should_log(&self, elapsed_us: u64) -> bool {
        self.enabled && self.threshold_us.is_none_or(|t| elapsed_us >= t)
    }

    /// Enter the underlying `tracing` span.
    pub fn enter(&self) -> tracing::span::Entered<'_> {
        self.span.enter()
    }
}

impl Drop for PerformanceSpan {
    fn drop(&mut self) {
        let elapsed_us = self.elapsed_us();
        if self.should_log(elapsed_us) {
            let _entered = self.span.enter();
            tracing::debug!(
                duration_us = elapsed_us,
                duration_ms = elapsed_us as f64 / 1000.0,
                "performance_span_complete"
            );
        }
    }
}

/// Record an aligned allocation (`region` names what the bytes are for:
/// `"arena"`, `"boundary"`, `"hash_table"`).
pub fn record_allocation(size_bytes: usize, region: &str, alignment: usize, duration_us: u64) {
    tracing::debug!(
        event = "allocation",
        size_bytes = size_bytes,
        size_kb = size_bytes as f64 / 1024.0,
        region = region,
        alignment = alignment,
        duration_us = duration_us,
        "memory_allocation"
    );
}

/// Record how many elements an operation processed and how fast.
pub fn record_throughput(operation: &str, elements: usize, duration_us: u64) {
    let elements_per_sec = per_second(elements, duration_us);
    tracing::debug!(
        event = "throughput",
        operation = operation,
        elements = elements,
        duration_us = duration_us,
        elements_per_sec = elements_per_sec,
        "operation_throughput"
    );
}

/// Record a growth step of a scalable structure (`kind` is e.g. `"segments"`).
pub fn record_scale(kind: &str, from: usize, to: usize) {
    tracing::debug!(event = "scale", kind = kind, from = from, to = to, growth = to.saturating_sub(from), "scale_step");
}

fn per_second(count: usize, duration_us: u64) -> f64 {
    if duration_us == 0 {
        0.0
    } else {
        (count as f64 / duration_us as f64) * 1_000_000.0
    }
}
