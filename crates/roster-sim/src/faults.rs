//! Latency and failure injection for the simulated backend.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{Result, bail};
use serde::{Deserialize, Serialize};

use crate::rng::DeterministicRng;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaultConfig {
    /// Lower bound of per-call latency.
    pub min_latency_ms: u64,
    /// Upper bound of per-call latency.
    pub max_latency_ms: u64,
    /// Percentage of page and lookup fetches answered with a 503.
    pub fetch_failure_percent: u8,
    /// Percentage of mutation calls answered with a 503.
    pub mutation_failure_percent: u8,
    /// Zero-based index of a mutation call that always fails.
    #[serde(default)]
    pub fail_mutation_at: Option<usize>,
}

impl Default for FaultConfig {
    fn default() -> Self {
        Self {
            min_latency_ms: 5,
            max_latency_ms: 250,
            fetch_failure_percent: 5,
            mutation_failure_percent: 10,
            fail_mutation_at: None,
        }
    }
}

impl FaultConfig {
    /// No latency spread and no failures.
    #[must_use]
    pub const fn quiet() -> Self {
        Self {
            min_latency_ms: 10,
            max_latency_ms: 10,
            fetch_failure_percent: 0,
            mutation_failure_percent: 0,
            fail_mutation_at: None,
        }
    }

    /// # Errors
    ///
    /// Returns an error if the latency bounds are inverted or a percentage
    /// exceeds 100.
    pub fn validate(&self) -> Result<()> {
        if self.min_latency_ms > self.max_latency_ms {
            bail!(
                "min_latency_ms ({}) must not exceed max_latency_ms ({})",
                self.min_latency_ms,
                self.max_latency_ms
            );
        }
        if self.fetch_failure_percent > 100 || self.mutation_failure_percent > 100 {
            bail!("failure percentages must be within 0..=100");
        }
        Ok(())
    }
}

/// Draws faults from a seeded stream. Draw order follows call order, which
/// is deterministic on a single-threaded paused runtime.
#[derive(Debug)]
pub struct FaultInjector {
    config: FaultConfig,
    rng: Mutex<DeterministicRng>,
    injected: Mutex<u64>,
}

impl FaultInjector {
    #[must_use]
    pub const fn new(config: FaultConfig, rng: DeterministicRng) -> Self {
        Self {
            config,
            rng: Mutex::new(rng),
            injected: Mutex::new(0),
        }
    }

    #[must_use]
    pub const fn config(&self) -> &FaultConfig {
        &self.config
    }

    pub fn latency(&self) -> Duration {
        let millis = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .between(self.config.min_latency_ms, self.config.max_latency_ms);
        Duration::from_millis(millis)
    }

    pub fn fetch_fails(&self) -> bool {
        self.roll(self.config.fetch_failure_percent)
    }

    /// Whether the mutation call with zero-based `index` fails.
    pub fn mutation_fails(&self, index: usize) -> bool {
        let rolled = self.roll(self.config.mutation_failure_percent);
        if self.config.fail_mutation_at == Some(index) && !rolled {
            *self
                .injected
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
            return true;
        }
        rolled
    }

    /// Failures injected so far.
    #[must_use]
    pub fn injected(&self) -> u64 {
        *self
            .injected
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    fn roll(&self, percent: u8) -> bool {
        let hit = self
            .rng
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .hit_rate_percent(percent);
        if hit {
            *self
                .injected
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner) += 1;
        }
        hit
    }
}
