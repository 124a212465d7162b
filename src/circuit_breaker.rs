//! # Circuit Breaker Module
//!
//! This module implements the circuit breaker pattern for recipe catalog
//! calls. When the catalog keeps failing at the transport level, the breaker
//! opens and further calls fail fast instead of each waiting for a timeout.

use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::config::RecoveryConfig;

#[derive(Debug, Default)]
struct BreakerState {
    failure_count: u32,
    last_failure_time: Option<Instant>,
}

/// Circuit breaker for catalog operations
///
/// # State Machine
///
/// - **Closed**: Normal operation, requests pass through
/// - **Open**: Failure threshold exceeded, requests fail fast
/// - **Half-Open**: Reset window elapsed, the next request is let through
///
/// # Configuration
///
/// Uses `RecoveryConfig` for:
/// - `circuit_breaker_threshold`: Failures before opening (default: 5)
/// - `circuit_breaker_reset_secs`: Time before attempting reset (default: 60s)
#[derive(Debug)]
pub struct CircuitBreaker {
    state: Mutex<BreakerState>,
    config: RecoveryConfig,
}

impl CircuitBreaker {
    /// Create a new circuit breaker with the given configuration
    ///
    /// ```rust
    /// use recipe_roulette::config::RecoveryConfig;
    /// use recipe_roulette::circuit_breaker::CircuitBreaker;
    ///
    /// let circuit_breaker = CircuitBreaker::new(RecoveryConfig::default());
    /// assert!(!circuit_breaker.is_open());
    /// ```
    pub fn new(config: RecoveryConfig) -> Self {
        Self {
            state: Mutex::new(BreakerState::default()),
            config,
        }
    }

    fn state(&self) -> MutexGuard<'_, BreakerState> {
        // The state is two plain counters, a poisoned lock still holds usable data
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Check if circuit breaker is open (blocking requests)
    ///
    /// Returns `true` when the failure count reached the threshold and the
    /// reset window has not elapsed yet. Once the window elapses the breaker
    /// closes again on its own.
    pub fn is_open(&self) -> bool {
        let mut state = self.state();

        if state.failure_count >= self.config.circuit_breaker_threshold {
            if let Some(last_time) = state.last_failure_time {
                if last_time.elapsed() < Duration::from_secs(self.config.circuit_breaker_reset_secs) {
                    return true;
                }
                *state = BreakerState::default();
            }
        }
        false
    }

    /// Record a failed catalog call
    pub fn record_failure(&self) {
        let mut state = self.state();
        state.failure_count += 1;
        state.last_failure_time = Some(Instant::now());
    }

    /// Record a successful catalog call, closing the breaker
    pub fn record_success(&self) {
        *self.state() = BreakerState::default();
    }

    pub fn failure_count(&self) -> u32 {
        self.state().failure_count
    }
}
