//! Subscriber setup for the injector's diagnostics
//!
//! The container emits `tracing` events under the `scoped_injector` target:
//! scope creation, registrations and close at `DEBUG`, cache hits and
//! construction at `TRACE`, closer failures at `WARN`. This module installs a
//! `tracing-subscriber` pipeline to print them.
//!
//! # Features
//!
//! - `logging` - emit events (default)
//! - `logging-json` - JSON output
//! - `logging-pretty` - multi-line human-readable output
//!
//! Without one of the two output features every `init*` function is a no-op.
//!
//! # Example
//!
//! ```rust,ignore
//! use scoped_injector::logging;
//!
//! logging::builder()
//!     .trace()
//!     .compact()
//!     .di_only()
//!     .init();
//! ```

use tracing::Level;

/// Event target used by every event the container emits.
pub const TARGET: &str = "scoped_injector";

/// Output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Json,
    Pretty,
    /// Single line per event
    Compact,
}

/// Builder for the global subscriber.
#[derive(Debug, Clone)]
pub struct LoggingBuilder {
    level: Level,
    format: LogFormat,
    target: Option<&'static str>,
    from_env: bool,
    with_file: bool,
    with_line_number: bool,
    with_thread_ids: bool,
    with_thread_names: bool,
}

impl Default for LoggingBuilder {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            format: LogFormat::Json,
            target: None,
            from_env: false,
            with_file: false,
            with_line_number: false,
            with_thread_ids: false,
            with_thread_names: false,
        }
    }
}

impl LoggingBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the minimum level
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn trace(self) -> Self {
        self.with_level(Level::TRACE)
    }

    pub fn debug(self) -> Self {
        self.with_level(Level::DEBUG)
    }

    pub fn info(self) -> Self {
        self.with_level(Level::INFO)
    }

    pub fn warn(self) -> Self {
        self.with_level(Level::WARN)
    }

    pub fn error(self) -> Self {
        self.with_level(Level::ERROR)
    }

    /// Only show events from `target` (and its submodules).
    pub fn with_target_filter(mut self, target: &'static str) -> Self {
        self.target = Some(target);
        self
    }

    /// Only show the container's own events.
    pub fn di_only(self) -> Self {
        self.with_target_filter(TARGET)
    }

    /// Prefer `RUST_LOG` when it is set; the configured level and target
    /// remain the fallback.
    pub fn from_env(mut self) -> Self {
        self.from_env = true;
        self
    }

    pub fn with_file(mut self) -> Self {
        self.with_file = true;
        self
    }

    pub fn with_line_number(mut self) -> Self {
        self.with_line_number = true;
        self
    }

    pub fn with_thread_ids(mut self) -> Self {
        self.with_thread_ids = true;
        self
    }

    pub fn with_thread_names(mut self) -> Self {
        self.with_thread_names = true;
        self
    }

    pub fn json(mut self) -> Self {
        self.format = LogFormat::Json;
        self
    }

    pub fn pretty(mut self) -> Self {
        self.format = LogFormat::Pretty;
        self
    }

    pub fn compact(mut self) -> Self {
        self.format = LogFormat::Compact;
        self
    }

    /// Filter directives for the configured level and target, in `RUST_LOG`
    /// syntax.
    pub fn directives(&self) -> String {
        let level = self.level.as_str().to_ascii_lowercase();
        match self.target {
            Some(target) => format!("{target}={level}"),
            None => level,
        }
    }

    /// Install the subscriber, failing if a global one is already set.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn try_init(self) -> Result<(), tracing_subscriber::util::TryInitError> {
        use tracing_subscriber::{EnvFilter, prelude::*};

        let fallback = self.directives();
        let filter = if self.from_env {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&fallback))
        } else {
            EnvFilter::new(&fallback)
        };

        tracing_subscriber::registry()
            .with(self.fmt_layer())
            .with(filter)
            .try_init()
    }

    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    fn fmt_layer(
        &self,
    ) -> Box<dyn tracing_subscriber::Layer<tracing_subscriber::Registry> + Send + Sync> {
        use tracing_subscriber::{Layer, fmt};

        let layer = fmt::layer()
            .with_file(self.with_file)
            .with_line_number(self.with_line_number)
            .with_thread_ids(self.with_thread_ids)
            .with_thread_names(self.with_thread_names)
            .with_target(true);

        match self.format {
            #[cfg(feature = "logging-json")]
            LogFormat::Json => layer.json().boxed(),
            // JSON output needs `logging-json`; fall back to the default format.
            #[cfg(not(feature = "logging-json"))]
            LogFormat::Json => layer.boxed(),
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
        }
    }

    /// No-op without an output feature.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn try_init(self) -> Result<(), std::convert::Infallible> {
        Ok(())
    }

    /// Install the subscriber, logging a warning through the existing one if
    /// a subscriber is already installed.
    #[cfg(any(feature = "logging-json", feature = "logging-pretty"))]
    pub fn init(self) {
        if let Err(err) = self.try_init() {
            tracing::warn!(
                target: TARGET,
                error = %err,
                "Subscriber already installed; keeping it"
            );
        }
    }

    /// No-op without an output feature.
    #[cfg(not(any(feature = "logging-json", feature = "logging-pretty")))]
    pub fn init(self) {}
}

pub fn builder() -> LoggingBuilder {
    LoggingBuilder::new()
}

/// Initialize with the default format: JSON when `logging-json` is enabled,
/// pretty otherwise. `RUST_LOG` overrides the level.
pub fn init() {
    #[cfg(feature = "logging-json")]
    builder().json().from_env().init();
    #[cfg(not(feature = "logging-json"))]
    builder().pretty().from_env().init();
}

/// JSON output at `DEBUG`.
///
/// ```json
/// {"timestamp":"2026-01-01T00:00:00.000Z","level":"DEBUG","fields":{"message":"Created container","scope_id":1,"depth":0,"parent_id":"None","registrations":3,"owns_registry":true},"target":"scoped_injector"}
/// ```
pub fn init_json() {
    builder().json().debug().init();
}

/// Pretty output at `DEBUG`.
pub fn init_pretty() {
    builder().pretty().debug().init();
}

/// Only the container's events, at `DEBUG`.
pub fn init_di_only() {
    builder().di_only().debug().init();
}
