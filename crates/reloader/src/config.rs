//! Loader configuration.

use std::time::Duration;

/// Environment variable overriding [`LoaderConfig::interval`], in whole seconds.
pub const INTERVAL_ENV: &str = "RELOADER_INTERVAL_SECS";
/// Environment variable overriding [`LoaderConfig::tick`], in milliseconds.
pub const TICK_ENV: &str = "RELOADER_TICK_MS";

#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Refresh period. Only used by `start_from_config`; `start` overrides it.
    pub interval: Duration,
    /// Granularity at which the publisher re-checks its stop flag and the
    /// refresh deadline.
    pub tick: Duration,
    /// Name of the publisher thread.
    pub thread_name: String,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(7200),
            tick: Duration::from_secs(1),
            thread_name: "reloader".to_string(),
        }
    }
}

impl LoaderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Defaults overridden by `RELOADER_INTERVAL_SECS` and `RELOADER_TICK_MS`.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(INTERVAL_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(secs) => config.interval = Duration::from_secs(secs),
                Err(e) => tracing::warn!(var = INTERVAL_ENV, value = %raw, error = %e, "Ignoring invalid interval"),
            }
        }

        if let Some(raw) = lookup(TICK_ENV) {
            match raw.trim().parse::<u64>() {
                Ok(0) => tracing::warn!(var = TICK_ENV, "Ignoring zero tick"),
                Ok(ms) => config.tick = Duration::from_millis(ms),
                Err(e) => tracing::warn!(var = TICK_ENV, value = %raw, error = %e, "Ignoring invalid tick"),
            }
        }

        config
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the tick. A zero tick is clamped to one millisecond.
    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick.max(Duration::from_millis(1));
        self
    }

    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}
