//! Runtime configuration read from the environment, in the style of the
//! reference runner's `ExecutionLimits::from_env`: every field has a
//! sensible default and can be overridden by a single env var.

use std::time::Duration;

use crate::interpreter::RunnerLimits;

const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;
const DEFAULT_INTER_STEP_DELAY_MS: u64 = 0;
const DEFAULT_INTER_ITERATION_DELAY_MS: u64 = 0;

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub request_timeout: Duration,
    pub inter_step_delay: Duration,
    pub inter_iteration_delay: Duration,
    pub log_level: String,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            inter_step_delay: Duration::from_millis(DEFAULT_INTER_STEP_DELAY_MS),
            inter_iteration_delay: Duration::from_millis(DEFAULT_INTER_ITERATION_DELAY_MS),
            log_level: "info".to_string(),
        }
    }
}

impl RunnerConfig {
    /// Reads `FLOWRUNNER_REQUEST_TIMEOUT_SECS`, `FLOWRUNNER_INTER_STEP_DELAY_MS`,
    /// `FLOWRUNNER_INTER_ITERATION_DELAY_MS`, and `RUST_LOG`/`FLOWRUNNER_LOG_LEVEL`,
    /// falling back to defaults for anything unset or unparsable.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Some(secs) = env_u64("FLOWRUNNER_REQUEST_TIMEOUT_SECS") {
            config.request_timeout = Duration::from_secs(secs);
        }
        if let Some(ms) = env_u64("FLOWRUNNER_INTER_STEP_DELAY_MS") {
            config.inter_step_delay = Duration::from_millis(ms);
        }
        if let Some(ms) = env_u64("FLOWRUNNER_INTER_ITERATION_DELAY_MS") {
            config.inter_iteration_delay = Duration::from_millis(ms);
        }
        if let Ok(level) = std::env::var("FLOWRUNNER_LOG_LEVEL") {
            config.log_level = level;
        } else if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = level;
        }

        config
    }

    pub fn to_runner_limits(&self) -> RunnerLimits {
        RunnerLimits {
            request_timeout: self.request_timeout,
            inter_step_delay: self.inter_step_delay,
            inter_iteration_delay: self.inter_iteration_delay,
        }
    }
}

fn env_u64(key: &str) -> Option<u64> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}
