//! Instrumentation macros.
//!
//! The macros expand to `tracing` calls through this crate's re-export, so
//! callers only need a dependency on `lattice-tracing`.

/// Open a [`crate::performance::PerformanceSpan`] that logs its duration
/// when dropped, using the settings installed by [`crate::init_global_tracing`].
///
/// ```rust
/// use lattice_tracing::perf_span;
///
/// {
///     let _span = perf_span!("scale_segments", from = 12, to = 24);
///     // ... work ...
/// }
/// ```
#[macro_export]
macro_rules! perf_span {
    ($name:expr) => {{
        $crate::performance::PerformanceSpan::from_settings($name)
    }};
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {{
        let _span = $crate::__tracing::debug_span!(
            "perf",
            name = $name,
            $($field = $value),+
        ).entered();
        $crate::performance::PerformanceSpan::from_settings($name)
    }};
}

/// Emit a debug-level event tagged with `event = name`.
///
/// ```rust
/// use lattice_tracing::perf_event;
///
/// perf_event!("boundary_created", segment_a = 0, segment_b = 1, size = 1024);
/// ```
#[macro_export]
macro_rules! perf_event {
    ($name:expr, $($field:tt = $value:expr),+ $(,)?) => {
        $crate::__tracing::debug!(
            event = $name,
            $($field = $value),+
        );
    };
}

/// Run a block and return `(result, duration_us)`.
///
/// ```rust
/// use lattice_tracing::timed_block;
///
/// let (sum, _duration_us) = timed_block!("sum", { (1..=100).sum::<u32>() });
/// assert_eq!(sum, 5050);
/// ```
#[macro_export]
macro_rules! timed_block {
    ($name:expr, $block:block) => {{
        let start = std::time::Instant::now();
        let result = $block;
        let duration_us = start.elapsed().as_micros() as u64;
        $crate::__tracing::debug!(
            operation = $name,
            duration_us = duration_us,
            duration_ms = duration_us as f64 / 1000.0,
            "timed_block_complete"
        );
        (result, duration_us)
    }};
}
