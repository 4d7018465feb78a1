//! Tunable limits for the change cache, in the style of the rest of this
//! codebase's `knobs.rs`: every value has a hardcoded default and can be
//! overridden by setting an environment variable when running locally or in
//! an ops context. Tests should build a [`CacheOptions`] literal instead of
//! touching the environment.

use std::{
    env,
    str::FromStr,
    time::Duration,
};

/// Read an environment variable and parse it, falling back to `default` if
/// the variable is unset or fails to parse.
fn env_config<T: FromStr>(var_name: &str, default: T) -> T {
    match env::var(var_name) {
        Ok(s) => s.parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring malformed {var_name}={s:?}, using default");
            default
        }),
        Err(_) => default,
    }
}

/// Runtime configuration for a [`crate::ChangeCache`]. All fields have
/// production-sane defaults; construct with [`CacheOptions::from_env`] to
/// pick up environment overrides, or [`CacheOptions::default`] /
/// struct-literal construction in tests.
#[derive(Debug, Clone, Copy)]
pub struct CacheOptions {
    /// Max age of a pending head before its predecessor is declared skipped.
    pub pending_seq_max_wait: Duration,
    /// Max size of the pending heap before forced draining.
    pub pending_seq_max_num: usize,
    /// Max age of a skipped sequence before abandonment.
    pub skipped_seq_max_wait: Duration,
    /// Intake worker-pool capacity (semaphore permits). The intake queue is
    /// sized at `3 * max_processes`.
    pub max_processes: usize,
    /// Whether every non-placeholder entry also fans out to the `"*"`
    /// channel. Set once at `Init` time; never reassigned at runtime.
    pub enable_star_channel_log: bool,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            pending_seq_max_wait: Duration::from_secs(5),
            pending_seq_max_num: 10_000,
            skipped_seq_max_wait: Duration::from_secs(30 * 60),
            max_processes: 50_000,
            enable_star_channel_log: true,
        }
    }
}

impl CacheOptions {
    /// Build options from hardcoded defaults overridden by environment
    /// variables, the way `knobs.rs` configures the rest of this codebase.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            pending_seq_max_wait: Duration::from_secs(env_config(
                "CHANGE_CACHE_PENDING_SEQ_MAX_WAIT_SECS",
                defaults.pending_seq_max_wait.as_secs(),
            )),
            pending_seq_max_num: env_config(
                "CHANGE_CACHE_PENDING_SEQ_MAX_NUM",
                defaults.pending_seq_max_num,
            ),
            skipped_seq_max_wait: Duration::from_secs(env_config(
                "CHANGE_CACHE_SKIPPED_SEQ_MAX_WAIT_SECS",
                defaults.skipped_seq_max_wait.as_secs(),
            )),
            max_processes: env_config("CHANGE_CACHE_MAX_PROCESSES", defaults.max_processes),
            enable_star_channel_log: env_config(
                "CHANGE_CACHE_ENABLE_STAR_CHANNEL_LOG",
                defaults.enable_star_channel_log,
            ),
        }
    }

    pub fn intake_queue_size(&self) -> usize {
        3 * self.max_processes
    }
}
