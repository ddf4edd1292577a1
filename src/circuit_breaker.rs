// Circuit breaker guarding calls to the upstream PMS. All state lives behind
// one mutex so transitions are atomic across concurrent callers.

use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use crate::config::CircuitBreakerConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

enum State {
    Closed { failures: u32 },
    Open { opened_at: Instant },
    HalfOpen,
}

pub struct CircuitBreaker {
    failure_threshold: u32,
    reset_timeout: Duration,
    state: Mutex<State>,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            failure_threshold: config.failure_threshold,
            reset_timeout: Duration::from_millis(config.reset_timeout_ms),
            state: Mutex::new(State::Closed { failures: 0 }),
        }
    }

    pub fn current_state(&self) -> CircuitState {
        match *self.state.lock() {
            State::Closed { .. } => CircuitState::Closed,
            State::Open { .. } => CircuitState::Open,
            State::HalfOpen => CircuitState::HalfOpen,
        }
    }

    pub fn is_closed(&self) -> bool {
        matches!(*self.state.lock(), State::Closed { .. })
    }

    // How long until an open breaker allows a trial call. Zero when not open.
    pub fn retry_after(&self) -> Duration {
        match *self.state.lock() {
            State::Open { opened_at } => self.reset_timeout.saturating_sub(opened_at.elapsed()),
            _ => Duration::ZERO,
        }
    }

    // Checked on every call attempt. While open, the recovery timeout elapsing
    // moves the breaker to half-open and lets exactly this caller try once.
    pub fn should_allow_call(&self) -> bool {
        let mut state = self.state.lock();
        match &*state {
            State::Closed { .. } => true,
            State::Open { opened_at } => {
                if opened_at.elapsed() >= self.reset_timeout {
                    *state = State::HalfOpen;
                    tracing::info!("circuit breaker half-open, allowing trial call");
                    true
                } else {
                    false
                }
            }
            State::HalfOpen => true,
        }
    }

    pub fn on_success(&self) {
        let mut state = self.state.lock();
        match &*state {
            State::HalfOpen => {
                tracing::info!("circuit breaker recovered, closing");
                *state = State::Closed { failures: 0 };
            }
            State::Closed { .. } => {
                *state = State::Closed { failures: 0 };
            }
            State::Open { .. } => {}
        }
    }

    pub fn on_failure(&self) {
        let mut state = self.state.lock();
        match &mut *state {
            State::Closed { failures } => {
                *failures += 1;
                if *failures >= self.failure_threshold {
                    tracing::warn!(failures = *failures, "circuit breaker tripped open");
                    *state = State::Open {
                        opened_at: Instant::now(),
                    };
                }
            }
            State::HalfOpen => {
                tracing::warn!("trial call failed, circuit breaker re-opened");
                *state = State::Open {
                    opened_at: Instant::now(),
                };
            }
            State::Open { .. } => {}
        }
    }
}
