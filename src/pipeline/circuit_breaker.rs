//! Circuit Breaker pattern implementation.
//!
//! Prevents a half-broken scrape from overwriting a sheet: when the fresh
//! scan is much smaller than what is stored, the write is aborted and the
//! stored task linkage survives until the next run.

use crate::error::{AppError, Result};
use crate::models::CircuitBreakerSettings;

/// Circuit breaker for preventing bad sheet updates.
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    settings: CircuitBreakerSettings,
}

/// Result of circuit breaker check.
#[derive(Debug, Clone, PartialEq)]
pub enum CircuitBreakerResult {
    /// Safe to proceed with the write
    Safe {
        current_count: usize,
        previous_count: usize,
    },
    /// Nothing stored yet or below baseline
    ColdStart { current_count: usize },
    /// Circuit breaker triggered - abort write
    Triggered {
        current_count: usize,
        previous_count: usize,
        drop_percent: f64,
    },
    /// Empty scan over a non-empty sheet
    EmptyResult,
}

impl CircuitBreaker {
    pub fn new(settings: CircuitBreakerSettings) -> Self {
        Self { settings }
    }

    pub fn is_enabled(&self) -> bool {
        self.settings.enabled
    }

    /// Classify a fresh row count against the stored one.
    pub fn check(&self, current_count: usize, previous_count: usize) -> CircuitBreakerResult {
        // Case 1: Empty current result
        if current_count == 0 {
            if previous_count == 0 {
                return CircuitBreakerResult::ColdStart { current_count };
            }
            return CircuitBreakerResult::EmptyResult;
        }

        // Case 2: Cold start (no previous data or below baseline)
        if previous_count < self.settings.min_baseline {
            return CircuitBreakerResult::ColdStart { current_count };
        }

        // Case 3: Check drop percentage
        if current_count < previous_count {
            let drop = previous_count - current_count;
            let drop_percent = (drop as f64 / previous_count as f64) * 100.0;

            if drop_percent > self.settings.max_drop_percent as f64 {
                return CircuitBreakerResult::Triggered {
                    current_count,
                    previous_count,
                    drop_percent,
                };
            }
        }

        CircuitBreakerResult::Safe {
            current_count,
            previous_count,
        }
    }

    /// Validate and return Ok if safe, Err if circuit breaker triggered.
    pub fn validate(&self, sheet: &str, current_count: usize, previous_count: usize) -> Result<()> {
        match self.check(current_count, previous_count) {
            CircuitBreakerResult::Safe {
                current_count,
                previous_count,
            } => {
                log::debug!(
                    "Circuit breaker [{}]: SAFE ({} rows, was {})",
                    sheet,
                    current_count,
                    previous_count
                );
                Ok(())
            }
            CircuitBreakerResult::ColdStart { current_count } => {
                log::debug!(
                    "Circuit breaker [{}]: COLD START ({} rows, below baseline)",
                    sheet,
                    current_count
                );
                Ok(())
            }
            CircuitBreakerResult::Triggered {
                current_count,
                previous_count,
                drop_percent,
            } => {
                log::error!(
                    "Circuit breaker [{}]: TRIGGERED! {} → {} rows ({:.1}% drop > {}% threshold)",
                    sheet,
                    previous_count,
                    current_count,
                    drop_percent,
                    self.settings.max_drop_percent
                );
                Err(AppError::CircuitBreakerTriggered {
                    current_count,
                    previous_count,
                    drop_percent,
                    threshold_percent: self.settings.max_drop_percent,
                })
            }
            CircuitBreakerResult::EmptyResult => {
                log::error!("Circuit breaker [{}]: EMPTY RESULT - aborting write", sheet);
                Err(AppError::EmptyScanResult)
            }
        }
    }
}

impl Default for CircuitBreaker {
    fn default() -> Self {
        Self::new(CircuitBreakerSettings::default())
    }
}
