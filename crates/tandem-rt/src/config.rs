// SPDX-License-Identifier: (MIT OR Apache-2.0)
//! Executor configuration.
//!
//! Defaults to the wall clock. `TANDEM_CLOCK=virtual` switches to virtual
//! time, where the clock only moves when every task is parked and jumps
//! straight to the next timer deadline.

use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

/// Environment variable read by `ExecutorConfig::from_env`.
pub const CLOCK_ENV: &str = "TANDEM_CLOCK";

/// How the executor measures time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClockMode {
    /// Wall clock; the loop sleeps the thread until the next deadline.
    #[default]
    Real,
    /// Simulated clock; idle time is skipped instantly.
    Virtual,
}

impl FromStr for ClockMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "real" => Ok(ClockMode::Real),
            "virtual" => Ok(ClockMode::Virtual),
            _ => Err(ConfigError::UnknownClock(s.to_string())),
        }
    }
}

/// Settings for one `Executor`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorConfig {
    pub clock: ClockMode,
    /// Shows up in log records for this executor.
    pub name: String,
}

impl ExecutorConfig {
    /// Read overrides from the environment. Unset variables keep defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Ok(raw) = env::var(CLOCK_ENV) {
            config.clock = raw.parse()?;
        }
        Ok(config)
    }

    pub fn with_clock(mut self, clock: ClockMode) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            clock: ClockMode::Real,
            name: "tandem".to_string(),
        }
    }
}
