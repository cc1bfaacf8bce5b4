//! Resilient wrapper for a generative backend
//!
//! Adds a per-call timeout, bounded retry with exponential backoff and a
//! circuit breaker around any [`GenerativeBackend`]. Callers that already
//! receive a hardened capability can skip this wrapper.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use onto_core::{BackendConfig, BackendError, GenerativeBackend};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BreakerState {
    Closed { failures: usize },
    Open { until: Instant },
    HalfOpen,
}

/// Observable circuit state, for logging and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct CircuitBreaker {
    state: Mutex<BreakerState>,
    failure_threshold: usize,
    cooldown: Duration,
}

impl CircuitBreaker {
    fn new(failure_threshold: usize, cooldown: Duration) -> Self {
        Self {
            state: Mutex::new(BreakerState::Closed { failures: 0 }),
            failure_threshold: failure_threshold.max(1),
            cooldown,
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut BreakerState) -> T) -> T {
        let mut guard = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }

    /// Whether a call may go through; moves Open to HalfOpen after the cooldown.
    /// A trial call is admitted with a guard that settles it if dropped.
    fn admit(&self) -> Option<TrialGuard<'_>> {
        self.with_state(|state| match *state {
            BreakerState::Closed { .. } => Some(TrialGuard {
                breaker: self,
                armed: false,
            }),
            BreakerState::HalfOpen => None,
            BreakerState::Open { until } => {
                if Instant::now() >= until {
                    *state = BreakerState::HalfOpen;
                    Some(TrialGuard {
                        breaker: self,
                        armed: true,
                    })
                } else {
                    None
                }
            }
        })
    }

    /// A trial ended without an outcome; the next caller gets a new trial
    fn abandon_trial(&self) {
        self.with_state(|state| {
            if *state == BreakerState::HalfOpen {
                debug!("Trial call abandoned, circuit reopened");
                *state = BreakerState::Open {
                    until: Instant::now(),
                };
            }
        });
    }

    fn record_success(&self) {
        self.with_state(|state| {
            if *state == BreakerState::HalfOpen {
                info!("Circuit closed after successful trial call");
            }
            *state = BreakerState::Closed { failures: 0 };
        });
    }

    fn record_failure(&self) {
        let cooldown = self.cooldown;
        let threshold = self.failure_threshold;
        self.with_state(|state| {
            let next = match *state {
                BreakerState::Closed { failures } if failures + 1 < threshold => {
                    BreakerState::Closed {
                        failures: failures + 1,
                    }
                }
                _ => {
                    warn!(cooldown_ms = cooldown.as_millis() as u64, "Circuit opened");
                    BreakerState::Open {
                        until: Instant::now() + cooldown,
                    }
                }
            };
            *state = next;
        });
    }

    fn state(&self) -> CircuitState {
        self.with_state(|state| match *state {
            BreakerState::Closed { .. } => CircuitState::Closed,
            BreakerState::Open { .. } => CircuitState::Open,
            BreakerState::HalfOpen => CircuitState::HalfOpen,
        })
    }
}

/// Reopens the circuit when a half-open trial is dropped before it settles
struct TrialGuard<'a> {
    breaker: &'a CircuitBreaker,
    armed: bool,
}

impl TrialGuard<'_> {
    fn settle(mut self, success: bool) {
        self.armed = false;
        if success {
            self.breaker.record_success();
        } else {
            self.breaker.record_failure();
        }
    }
}

impl Drop for TrialGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial();
        }
    }
}

/// Generative backend with timeout, retry and circuit breaking
pub struct ResilientBackend {
    inner: Arc<dyn GenerativeBackend>,
    call_timeout: Duration,
    max_retries: usize,
    initial_backoff: Duration,
    max_backoff: Duration,
    breaker: CircuitBreaker,
}

impl ResilientBackend {
    pub fn from_config(inner: Arc<dyn GenerativeBackend>, config: &BackendConfig) -> Self {
        Self {
            inner,
            call_timeout: Duration::from_millis(config.call_timeout_ms),
            max_retries: config.max_retries,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
            breaker: CircuitBreaker::new(
                config.failure_threshold,
                Duration::from_millis(config.cooldown_ms),
            ),
        }
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.breaker.state()
    }

    async fn attempt(&self, prompt: &str) -> Result<String, BackendError> {
        match timeout(self.call_timeout, self.inner.generate(prompt)).await {
            Ok(result) => result,
            Err(_) => Err(BackendError::Timeout {
                after_ms: self.call_timeout.as_millis() as u64,
            }),
        }
    }
}

#[async_trait]
impl GenerativeBackend for ResilientBackend {
    async fn generate(&self, prompt: &str) -> Result<String, BackendError> {
        let mut attempt = 0;
        let mut backoff = self.initial_backoff;

        loop {
            let Some(guard) = self.breaker.admit() else {
                debug!(backend = self.inner.name(), "Call rejected, circuit open");
                return Err(BackendError::CircuitOpen);
            };

            let outcome = self.attempt(prompt).await;
            guard.settle(outcome.is_ok());
            match outcome {
                Ok(text) => {
                    if attempt > 0 {
                        info!(
                            backend = self.inner.name(),
                            attempts = attempt + 1,
                            "Backend call succeeded after retries"
                        );
                    }
                    return Ok(text);
                }
                Err(e) => {
                    attempt += 1;
                    if !e.is_retryable() || attempt > self.max_retries {
                        warn!(
                            backend = self.inner.name(),
                            attempts = attempt,
                            error = %e,
                            "Backend call failed"
                        );
                        return Err(e);
                    }

                    warn!(
                        backend = self.inner.name(),
                        attempt,
                        max_retries = self.max_retries,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Backend call failed, retrying"
                    );
                    sleep(backoff).await;
                    backoff = std::cmp::min(backoff * 2, self.max_backoff);
                }
            }
        }
    }

    fn name(&self) -> &str {
        self.inner.name()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed sequence of results, then keeps returning the last one
    struct Sequence {
        results: Mutex<VecDeque<Result<String, BackendError>>>,
        calls: AtomicUsize,
        delay: Duration,
    }

    impl Sequence {
        fn new(results: Vec<Result<String, BackendError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
            })
        }

        fn slow(delay: Duration) -> Arc<Self> {
            Self::delayed(vec![Ok("late".to_string())], delay)
        }

        fn delayed(results: Vec<Result<String, BackendError>>, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicUsize::new(0),
                delay,
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerativeBackend for Sequence {
        async fn generate(&self, _prompt: &str) -> Result<String, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                sleep(self.delay).await;
            }
            let mut results = self.results.lock().unwrap();
            if results.len() > 1 {
                results.pop_front().unwrap()
            } else {
                results.front().cloned().unwrap()
            }
        }
    }

    fn config() -> BackendConfig {
        BackendConfig {
            call_timeout_ms: 200,
            max_retries: 2,
            initial_backoff_ms: 1,
            max_backoff_ms: 4,
            failure_threshold: 3,
            cooldown_ms: 30,
        }
    }

    #[tokio::test]
    async fn test_retries_then_succeeds() {
        let inner = Sequence::new(vec![
            Err(BackendError::Retryable("503".into())),
            Ok("ok".into()),
        ]);
        let backend = ResilientBackend::from_config(inner.clone(), &config());

        assert_eq!(backend.generate("p").await.unwrap(), "ok");
        assert_eq!(inner.calls(), 2);
        assert_eq!(backend.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_non_retryable_error_is_not_retried() {
        let inner = Sequence::new(vec![Err(BackendError::Rejected("bad prompt".into()))]);
        let backend = ResilientBackend::from_config(inner.clone(), &config());

        let err = backend.generate("p").await.unwrap_err();
        assert_eq!(err, BackendError::Rejected("bad prompt".into()));
        assert_eq!(inner.calls(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let inner = Sequence::new(vec![Err(BackendError::Unavailable("down".into()))]);
        let mut cfg = config();
        cfg.failure_threshold = 10;
        let backend = ResilientBackend::from_config(inner.clone(), &cfg);

        assert!(backend.generate("p").await.is_err());
        assert_eq!(inner.calls(), cfg.max_retries + 1);
    }

    #[tokio::test]
    async fn test_timeout_is_reported() {
        let inner = Sequence::slow(Duration::from_millis(500));
        let mut cfg = config();
        cfg.call_timeout_ms = 10;
        let backend = ResilientBackend::from_config(inner, &cfg);

        let err = backend.generate("p").await.unwrap_err();
        assert!(err.is_timeout());
    }

    #[tokio::test]
    async fn test_circuit_opens_and_recovers() {
        let inner = Sequence::new(vec![
            Err(BackendError::Rejected("x".into())),
            Err(BackendError::Rejected("x".into())),
            Err(BackendError::Rejected("x".into())),
            Ok("recovered".into()),
        ]);
        let backend = ResilientBackend::from_config(inner.clone(), &config());

        for _ in 0..3 {
            assert!(backend.generate("p").await.is_err());
        }
        assert_eq!(backend.circuit_state(), CircuitState::Open);

        let err = backend.generate("p").await.unwrap_err();
        assert_eq!(err, BackendError::CircuitOpen);
        assert_eq!(inner.calls(), 3);

        sleep(Duration::from_millis(40)).await;
        assert_eq!(backend.generate("p").await.unwrap(), "recovered");
        assert_eq!(backend.circuit_state(), CircuitState::Closed);
    }

    #[tokio::test]
    async fn test_failed_trial_reopens_circuit() {
        let inner = Sequence::new(vec![Err(BackendError::Rejected("x".into()))]);
        let mut cfg = config();
        cfg.failure_threshold = 1;
        let backend = ResilientBackend::from_config(inner.clone(), &cfg);

        assert!(backend.generate("p").await.is_err());
        assert_eq!(backend.circuit_state(), CircuitState::Open);

        sleep(Duration::from_millis(40)).await;
        assert!(backend.generate("p").await.is_err());
        assert_eq!(inner.calls(), 2);
        assert_eq!(backend.circuit_state(), CircuitState::Open);
    }

    #[tokio::test]
    async fn test_dropped_trial_does_not_wedge_circuit() {
        let inner = Sequence::delayed(
            vec![Err(BackendError::Rejected("x".into())), Ok("recovered".into())],
            Duration::from_millis(20),
        );
        let mut cfg = config();
        cfg.failure_threshold = 1;
        let backend = ResilientBackend::from_config(inner.clone(), &cfg);

        assert!(backend.generate("p").await.is_err());
        assert_eq!(backend.circuit_state(), CircuitState::Open);

        sleep(Duration::from_millis(40)).await;
        let cut_short = timeout(Duration::from_millis(5), backend.generate("p")).await;
        assert!(cut_short.is_err());
        assert_eq!(backend.circuit_state(), CircuitState::Open);

        assert_eq!(backend.generate("p").await.unwrap(), "recovered");
        assert_eq!(backend.circuit_state(), CircuitState::Closed);
        assert_eq!(inner.calls(), 3);
    }
}
