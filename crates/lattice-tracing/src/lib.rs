//! Tracing setup shared by the lattice substrate crates.
//!
//! Binaries, integration tests and benches install their `tracing`
//! subscriber through this crate so that every consumer of the substrate
//! produces the same log surface. The substrate itself only emits events;
//! whether anything is printed is decided here.

pub mod performance;

#[macro_use]
pub mod macros;

use std::env;
use std::error::Error;
use std::fmt;

pub use tracing::{debug, error, info, trace, warn};

#[doc(hidden)]
pub use tracing as __tracing;

use tracing::Subscriber;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt as tracing_fmt, EnvFilter, Registry};

/// Environment variable selecting a preset (`local`, `ci`, `performance`).
pub const ENV_PROFILE: &str = "LATTICE_TRACING_PROFILE";
/// Environment variable overriding the filter directives.
pub const ENV_DIRECTIVES: &str = "LATTICE_TRACING_DIRECTIVES";
/// Environment variable overriding the output format.
pub const ENV_FORMAT: &str = "LATTICE_TRACING_FORMAT";
/// Environment variable toggling performance spans.
pub const ENV_PERF_TRACING: &str = "LATTICE_PERF_TRACING";
/// Environment variable holding the performance span threshold in microseconds.
pub const ENV_PERF_THRESHOLD_US: &str = "LATTICE_PERF_THRESHOLD_US";

/// Configuration describing how the shared subscriber should behave.
#[derive(Clone, Debug)]
pub struct TracingConfig {
    /// Filter directives (e.g. `lattice_core=debug,info`). When absent the
    /// filter falls back to `RUST_LOG` and finally to [`Self::default_directive`].
    pub directives: Option<String>,
    /// Directive used when nothing else resolves.
    pub default_directive: String,
    /// Whether event targets (module paths) appear in output.
    pub include_targets: bool,
    /// ANSI colouring. Disabled for JSON output regardless of this flag.
    pub ansi: bool,
    /// Span lifecycle events to emit.
    pub span_events: FmtSpan,
    /// Formatter used for output.
    pub output: TracingOutput,
    /// When false, `perf_span!` spans never log their completion.
    pub enable_performance_tracing: bool,
    /// Minimum duration in microseconds before a `perf_span!` span is logged.
    pub performance_threshold_us: Option<u64>,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self::for_local()
    }
}

impl TracingConfig {
    /// Pretty, coloured output for a developer terminal.
    pub fn for_local() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: true,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Pretty,
            enable_performance_tracing: cfg!(debug_assertions),
            performance_threshold_us: None,
        }
    }

    /// JSON lines without colour, for log collectors.
    pub fn for_ci() -> Self {
        Self {
            directives: None,
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: false,
            span_events: FmtSpan::NONE,
            output: TracingOutput::Json,
            enable_performance_tracing: false,
            performance_threshold_us: None,
        }
    }

    /// JSON output with span lifecycle events and debug-level substrate logs.
    pub fn for_performance() -> Self {
        Self {
            directives: Some("lattice_core=debug,lattice_tracing=debug,info".to_string()),
            default_directive: "info".to_string(),
            include_targets: true,
            ansi: false,
            span_events: FmtSpan::ENTER | FmtSpan::EXIT | FmtSpan::CLOSE,
            output: TracingOutput::Json,
            enable_performance_tracing: true,
            performance_threshold_us: None,
        }
    }

    /// Build a configuration from environment hints.
    ///
    /// # Environment Variables
    ///
    /// - `LATTICE_TRACING_PROFILE` - `local` (default), `ci` or `performance`
    /// - `LATTICE_TRACING_DIRECTIVES` - filter directives
    /// - `LATTICE_TRACING_FORMAT` - `pretty`, `compact` or `json`
    /// - `LATTICE_PERF_TRACING` - `true`/`1`/`yes` enables performance spans
    /// - `LATTICE_PERF_THRESHOLD_US` - minimum span duration worth logging
    pub fn from_env() -> Self {
        let profile = env::var(ENV_PROFILE)
            .unwrap_or_else(|_| "local".to_string())
            .to_ascii_lowercase();

        let mut config = match profile.as_str() {
            "ci" => Self::for_ci(),
            "performance" => Self::for_performance(),
            _ => Self::for_local(),
        };

        if let Ok(directives) = env::var(ENV_DIRECTIVES) {
            if !directives.trim().is_empty() {
                config.directives = Some(directives);
            }
        }

        if let Ok(format) = env::var(ENV_FORMAT) {
            if let Some(parsed) = TracingOutput::from_env_value(&format) {
                config.output = parsed;
                if matches!(config.output, TracingOutput::Json) {
                    config.ansi = false;
                }
            }
        }

        if let Ok(flag) = env::var(ENV_PERF_TRACING) {
            config.enable_performance_tracing =
                flag.eq_ignore_ascii_case("true") || flag == "1" || flag.eq_ignore_ascii_case("yes");
        }

        if let Ok(threshold) = env::var(ENV_PERF_THRESHOLD_US) {
            if let Ok(threshold_us) = threshold.trim().parse::<u64>() {
                config.performance_threshold_us = Some(threshold_us);
            }
        }

        config
    }

    fn resolve_filter(&self) -> Result<EnvFilter, TracingSetupError> {
        match &self.directives {
            Some(directives) => {
                EnvFilter::try_new(directives).map_err(|err| TracingSetupError::InvalidFilter(err.to_string()))
            }
            None => Ok(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&self.default_directive))),
        }
    }

    /// Make the performance settings the defaults of `perf_span!`.
    pub fn apply_performance_settings(&self) {
        performance::configure(self.enable_performance_tracing, self.performance_threshold_us);
    }
}

/// Errors surfaced while installing the subscriber.
#[derive(Debug)]
pub enum TracingSetupError {
    /// The directive string could not be parsed.
    InvalidFilter(String),
    /// A global subscriber is already installed.
    SubscriberInit(tracing_subscriber::util::TryInitError),
}

impl fmt::Display for TracingSetupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracingSetupError::InvalidFilter(msg) => write!(f, "invalid tracing directive: {msg}"),
            TracingSetupError::SubscriberInit(err) => {
                write!(f, "failed to install global tracing subscriber: {err}")
            }
        }
    }
}

impl Error for TracingSetupError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            TracingSetupError::SubscriberInit(err) => Some(err),
            TracingSetupError::InvalidFilter(_) => None,
        }
    }
}

/// Build a subscriber without installing it.
pub fn build_subscriber(config: &TracingConfig) -> Result<impl Subscriber + Send + Sync, TracingSetupError> {
    let (filter, layer) = subscriber_layers(config)?;
    Ok(Registry::default().with(layer).with(filter))
}

/// Filter and formatting layer, for callers composing their own registry.
pub fn subscriber_layers(
    config: &TracingConfig,
) -> Result<(EnvFilter, Box<dyn Layer<Registry> + Send + Sync>), TracingSetupError> {
    let filter = config.resolve_filter()?;
    let span_events = config.span_events.clone();

    let layer: Box<dyn Layer<Registry> + Send + Sync> = match config.output {
        TracingOutput::Compact => Box::new(
            tracing_fmt::layer()
                .compact()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(span_events),
        ),
        TracingOutput::Pretty => Box::new(
            tracing_fmt::layer()
                .pretty()
                .with_target(config.include_targets)
                .with_ansi(config.ansi)
                .with_span_events(span_events),
        ),
        TracingOutput::Json => Box::new(
            tracing_fmt::layer()
                .json()
                .with_target(config.include_targets)
                .with_span_events(span_events)
                .with_ansi(false),
        ),
    };

    Ok((filter, layer))
}

/// Install the configured subscriber as the process-wide default and apply
/// its performance settings.
pub fn init_global_tracing(config: &TracingConfig) -> Result<(), TracingSetupError> {
    config.apply_performance_settings();
    build_subscriber(config)?
        .try_init()
        .map_err(TracingSetupError::SubscriberInit)
}

/// Install a subscriber built from [`TracingConfig::from_env`].
///
/// Returns `false` when a subscriber was already installed, which is the
/// normal case when several tests in one binary call this.
pub fn init_from_env() -> bool {
    init_global_tracing(&TracingConfig::from_env()).is_ok()
}

/// Output format of the formatter layer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TracingOutput {
    Compact,
    Pretty,
    Json,
}

impl TracingOutput {
    fn from_env_value(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Some(Self::Compact),
            "pretty" => Some(Self::Pretty),
            "json" => Some(Self::Json),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    // Environment is process-global; tests touching it take this lock.
    static ENV_LOCK: Mutex<()> = Mutex::new(());

    const ALL_KEYS: &[&str] = &[
        ENV_PROFILE,
        ENV_DIRECTIVES,
        ENV_FORMAT,
        ENV_PERF_TRACING,
        ENV_PERF_THRESHOLD_US,
        "RUST_LOG",
    ];

    fn reset_env() {
        for key in ALL_KEYS {
            env::remove_var(key);
        }
    }

    #[test]
    fn rejects_invalid_directive() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();
        let config = TracingConfig {
            directives: Some("=::invalid".to_string()),
            ..TracingConfig::default()
        };
        assert!(matches!(build_subscriber(&config), Err(TracingSetupError::InvalidFilter(_))));
    }

    #[test]
    fn builds_every_output_format() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();
        for output in [TracingOutput::Compact, TracingOutput::Pretty, TracingOutput::Json] {
            let config = TracingConfig {
                output,
                ..TracingConfig::default()
            };
            assert!(build_subscriber(&config).is_ok(), "{output:?} should build");
        }
    }

    #[test]
    fn from_env_respects_profile_and_format() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();

        env::set_var(ENV_PROFILE, "ci");
        env::set_var(ENV_FORMAT, "compact");
        env::set_var(ENV_DIRECTIVES, "lattice_core=trace");

        let config = TracingConfig::from_env();
        assert_eq!(config.directives.as_deref(), Some("lattice_core=trace"));
        assert!(!config.ansi);
        assert_eq!(config.output, TracingOutput::Compact);
        reset_env();
    }

    #[test]
    fn json_format_disables_ansi() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();

        env::set_var(ENV_FORMAT, "JSON");
        let config = TracingConfig::from_env();
        assert_eq!(config.output, TracingOutput::Json);
        assert!(!config.ansi);
        reset_env();
    }

    #[test]
    fn from_env_reads_performance_settings() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();

        env::set_var(ENV_PERF_TRACING, "yes");
        env::set_var(ENV_PERF_THRESHOLD_US, "250");

        let config = TracingConfig::from_env();
        assert!(config.enable_performance_tracing);
        assert_eq!(config.performance_threshold_us, Some(250));

        env::set_var(ENV_PERF_TRACING, "off");
        env::set_var(ENV_PERF_THRESHOLD_US, "not-a-number");
        let config = TracingConfig::from_env();
        assert!(!config.enable_performance_tracing);
        assert_eq!(config.performance_threshold_us, None);
        reset_env();
    }

    #[test]
    fn init_applies_performance_settings() {
        let _guard = performance::tests::SETTINGS_LOCK.lock().unwrap();
        let config = TracingConfig {
            enable_performance_tracing: true,
            performance_threshold_us: Some(1_000),
            ..TracingConfig::for_ci()
        };
        // A subscriber may already be installed by another test; the settings apply regardless.
        let _ = init_global_tracing(&config);
        assert!(performance::performance_tracing_enabled());
        assert_eq!(performance::default_threshold_us(), Some(1_000));

        let span = crate::perf_span!("scale_segments");
        assert_eq!(span.threshold_us(), Some(1_000));

        TracingConfig {
            enable_performance_tracing: false,
            ..TracingConfig::for_ci()
        }
        .apply_performance_settings();
        assert!(!performance::performance_tracing_enabled());
        assert_eq!(performance::default_threshold_us(), None);

        performance::configure(true, None);
    }

    #[test]
    fn performance_preset() {
        let config = TracingConfig::for_performance();
        assert!(config.enable_performance_tracing);
        assert_eq!(config.output, TracingOutput::Json);
        assert!(!config.ansi);
        assert!(config.directives.is_some());
    }

    #[test]
    fn unknown_profile_falls_back_to_local() {
        let _guard = ENV_LOCK.lock().unwrap();
        reset_env();
        env::set_var(ENV_PROFILE, "staging");
        let config = TracingConfig::from_env();
        assert_eq!(config.output, TracingOutput::Pretty);
        reset_env();
    }
}
