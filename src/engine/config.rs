//! Device configuration.
//!
//! [`DeviceConfig`] sizes the worker pool that plays the role of the device's
//! execution units and names the threads that back streams. It can be built
//! in code, deserialized from a host application's own configuration file
//! (`serde`), or read from the environment with [`DeviceConfig::from_env`].
//!
//! | Variable | Field |
//! |---|---|
//! | `STREAM_DISPATCH_WORKER_THREADS` | `worker_threads` |
//! | `STREAM_DISPATCH_MIN_GRAIN` | `min_grain` |
//! | `STREAM_DISPATCH_THREAD_PREFIX` | `thread_name_prefix` |

use serde::Deserialize;

/// Environment variable overriding [`DeviceConfig::worker_threads`].
pub const ENV_WORKER_THREADS: &str = "STREAM_DISPATCH_WORKER_THREADS";
/// Environment variable overriding [`DeviceConfig::min_grain`].
pub const ENV_MIN_GRAIN: &str = "STREAM_DISPATCH_MIN_GRAIN";
/// Environment variable overriding [`DeviceConfig::thread_name_prefix`].
pub const ENV_THREAD_PREFIX: &str = "STREAM_DISPATCH_THREAD_PREFIX";

/// Configuration for the device worker pool and stream threads.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Number of device worker threads. `None` lets rayon decide.
    pub worker_threads: Option<usize>,

    /// Minimum number of indices handed to one worker task.
    pub min_grain: usize,

    /// Prefix for device worker and stream thread names.
    pub thread_name_prefix: String,

    /// Stack size for stream threads, in bytes. `None` uses the platform default.
    pub stream_stack_size: Option<usize>,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            min_grain: 1,
            thread_name_prefix: "dispatch".to_owned(),
            stream_stack_size: None,
        }
    }
}

impl DeviceConfig {
    /// Defaults overridden by any `STREAM_DISPATCH_*` variables that are set.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_WORKER_THREADS) {
            match raw.trim().parse::<usize>() {
                Ok(threads) => config.worker_threads = Some(threads),
                Err(e) => tracing::warn!(variable = ENV_WORKER_THREADS, value = %raw, error = %e, "ignoring invalid value"),
            }
        }

        if let Some(raw) = lookup(ENV_MIN_GRAIN) {
            match raw.trim().parse::<usize>() {
                Ok(grain) => config.min_grain = grain,
                Err(e) => tracing::warn!(variable = ENV_MIN_GRAIN, value = %raw, error = %e, "ignoring invalid value"),
            }
        }

        if let Some(prefix) = lookup(ENV_THREAD_PREFIX) {
            if !prefix.is_empty() {
                config.thread_name_prefix = prefix;
            }
        }

        config
    }

    /// Sets the number of device worker threads.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Sets the minimum number of indices per worker task.
    pub fn with_min_grain(mut self, grain: usize) -> Self {
        self.min_grain = grain;
        self
    }

    /// Sets the thread name prefix.
    pub fn with_thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.thread_name_prefix = prefix.into();
        self
    }

    /// Grain clamped to at least one index per task.
    #[inline]
    pub(crate) fn effective_grain(&self) -> usize {
        self.min_grain.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_are_applied() {
        let config = DeviceConfig::from_lookup(lookup_from(&[
            (ENV_WORKER_THREADS, "3"),
            (ENV_MIN_GRAIN, " 64 "),
            (ENV_THREAD_PREFIX, "gpu"),
        ]));

        assert_eq!(config.worker_threads, Some(3));
        assert_eq!(config.min_grain, 64);
        assert_eq!(config.thread_name_prefix, "gpu");
    }

    #[test]
    fn invalid_env_values_keep_defaults() {
        let config = DeviceConfig::from_lookup(lookup_from(&[
            (ENV_WORKER_THREADS, "many"),
            (ENV_MIN_GRAIN, "-1"),
            (ENV_THREAD_PREFIX, ""),
        ]));

        assert_eq!(config, DeviceConfig::default());
    }

    #[test]
    fn zero_grain_is_clamped() {
        assert_eq!(DeviceConfig::default().with_min_grain(0).effective_grain(), 1);
    }
}
