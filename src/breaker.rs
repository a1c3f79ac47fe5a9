// ============================================================================
// Circuit Breaker for Database Access
// ============================================================================
//
// Prevents cascading failures when the database is slow or unavailable.
//
// Problem:
// - If the database hangs, every request handler blocks on it
// - The worker pool gets exhausted and the whole API stops responding,
//   even endpoints that never touch the database
//
// Solution:
// - Track consecutive failures per protected resource
// - After the trip predicate fires, "open" the circuit and fail fast
// - After a cool-down, allow a limited number of probe requests through
//   ("half-open") to test recovery
//
// States:
// - CLOSED: normal operation, requests go through
// - OPEN: too many failures, reject immediately without touching the resource
// - HALF_OPEN: recovery test, a bounded number of probes allowed through
//
// ============================================================================

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

/// Circuit breaker state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Normal operation
    Closed,
    /// Rejecting requests until the cool-down elapses
    Open,
    /// Testing whether the resource recovered
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CircuitState::Closed => write!(f, "closed"),
            CircuitState::Open => write!(f, "open"),
            CircuitState::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Per-generation request tally. Cleared on every state transition and on
/// the rolling interval while closed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    pub requests: u32,
    pub total_successes: u32,
    pub total_failures: u32,
    pub consecutive_successes: u32,
    pub consecutive_failures: u32,
}

impl Counts {
    fn on_request(&mut self) {
        self.requests += 1;
    }

    fn on_success(&mut self) {
        self.total_successes += 1;
        self.consecutive_successes += 1;
        self.consecutive_failures = 0;
    }

    fn on_failure(&mut self) {
        self.total_failures += 1;
        self.consecutive_failures += 1;
        self.consecutive_successes = 0;
    }

    fn clear(&mut self) {
        *self = Counts::default();
    }
}

/// Circuit breaker error types
#[derive(Debug, thiserror::Error)]
pub enum BreakerError<E> {
    /// Circuit is open, the request was rejected without running the work
    #[error("circuit breaker '{0}' is open")]
    Open(String),

    /// The work ran and failed
    #[error("operation failed: {0}")]
    Inner(#[source] E),
}

type TripPredicate = dyn Fn(&Counts) -> bool + Send + Sync;
type StateChangeFn = dyn Fn(&str, CircuitState, CircuitState) + Send + Sync;

const DEFAULT_MAX_HALF_OPEN_REQUESTS: u32 = 5;
const DEFAULT_RESET_INTERVAL: Duration = Duration::from_secs(10);
const DEFAULT_OPEN_TIMEOUT: Duration = Duration::from_secs(5);
const DEFAULT_TRIP_THRESHOLD: u32 = 5;

/// Builder for [`CircuitBreaker`]. All options have defaults.
pub struct Builder {
    name: String,
    max_half_open_requests: u32,
    reset_interval: Option<Duration>,
    open_timeout: Duration,
    trip: Box<TripPredicate>,
    on_state_change: Option<Box<StateChangeFn>>,
}

impl Builder {
    fn new(name: String) -> Self {
        Self {
            name,
            max_half_open_requests: DEFAULT_MAX_HALF_OPEN_REQUESTS,
            reset_interval: Some(DEFAULT_RESET_INTERVAL),
            open_timeout: DEFAULT_OPEN_TIMEOUT,
            trip: Box::new(|counts| counts.consecutive_failures > DEFAULT_TRIP_THRESHOLD),
            on_state_change: None,
        }
    }

    /// Probe quota while half-open. Also the number of consecutive
    /// successful probes required to close the circuit again.
    pub fn max_half_open_requests(mut self, max: u32) -> Self {
        self.max_half_open_requests = max.max(1);
        self
    }

    /// Rolling window for resetting counts while closed.
    pub fn reset_interval(mut self, interval: Duration) -> Self {
        self.reset_interval = (!interval.is_zero()).then_some(interval);
        self
    }

    /// Cool-down before an open circuit allows probes through.
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.open_timeout = timeout;
        self
    }

    /// Predicate over [`Counts`], evaluated immediately after each failure
    /// while closed. Returning true opens the circuit.
    pub fn trip_when<F>(mut self, trip: F) -> Self
    where
        F: Fn(&Counts) -> bool + Send + Sync + 'static,
    {
        self.trip = Box::new(trip);
        self
    }

    /// Observer invoked synchronously on every state transition with
    /// `(name, from, to)`. It runs outside the breaker's critical section
    /// and must not block or panic.
    pub fn on_state_change<F>(mut self, observer: F) -> Self
    where
        F: Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static,
    {
        self.on_state_change = Some(Box::new(observer));
        self
    }

    pub fn build(self) -> CircuitBreaker {
        CircuitBreaker {
            name: self.name,
            max_half_open_requests: self.max_half_open_requests,
            reset_interval: self.reset_interval,
            open_timeout: self.open_timeout,
            trip: self.trip,
            on_state_change: self.on_state_change,
            shared: Mutex::new(Shared {
                state: CircuitState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: self.reset_interval.map(|d| Instant::now() + d),
            }),
        }
    }
}

struct Shared {
    state: CircuitState,
    /// Bumped on every transition and counter reset. Results of calls
    /// admitted under an older generation are discarded.
    generation: u64,
    counts: Counts,
    /// Closed: next rolling counter reset. Open: end of the cool-down.
    expiry: Option<Instant>,
}

type Transition = Option<(CircuitState, CircuitState)>;

/// Thread-safe circuit breaker protecting a single named resource.
///
/// The `Open -> HalfOpen` transition is time-driven but evaluated lazily on
/// the next call attempt, not by a background timer.
pub struct CircuitBreaker {
    name: String,
    max_half_open_requests: u32,
    reset_interval: Option<Duration>,
    open_timeout: Duration,
    trip: Box<TripPredicate>,
    on_state_change: Option<Box<StateChangeFn>>,
    shared: Mutex<Shared>,
}

impl CircuitBreaker {
    pub fn builder(name: impl Into<String>) -> Builder {
        Builder::new(name.into())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, resolving a lazy `Open -> HalfOpen` transition first.
    pub fn state(&self) -> CircuitState {
        let mut shared = self.lock();
        let (state, _, transition) = self.current(&mut shared, Instant::now());
        drop(shared);
        self.notify(transition);
        state
    }

    /// Snapshot of the current generation's counts.
    pub fn counts(&self) -> Counts {
        self.lock().counts
    }

    /// Execute `work` with circuit breaker protection. Success/failure is
    /// classified from the result.
    pub async fn call<F, T, E>(&self, work: F) -> Result<T, BreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
    {
        self.call_with(work, |result: &Result<T, E>| Some(result.is_ok()))
            .await
    }

    /// Execute `work`, classifying its outcome with `classify`. Returning
    /// `None` records the call as neither success nor failure - used for
    /// outcomes the resource never had a say in (e.g. caller cancellation).
    pub async fn call_with<F, T, E, C>(&self, work: F, classify: C) -> Result<T, BreakerError<E>>
    where
        F: std::future::Future<Output = Result<T, E>>,
        C: FnOnce(&Result<T, E>) -> Option<bool>,
    {
        let generation = match self.before_call() {
            Some(generation) => generation,
            None => return Err(BreakerError::Open(self.name.clone())),
        };

        let result = work.await;
        if let Some(success) = classify(&result) {
            self.after_call(generation, success);
        }
        result.map_err(BreakerError::Inner)
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.shared.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Resolves the state as of `now`: rolls the closed-state counter
    /// window and performs the lazy `Open -> HalfOpen` transition.
    fn current(&self, shared: &mut Shared, now: Instant) -> (CircuitState, u64, Transition) {
        let transition = match shared.state {
            CircuitState::Closed => {
                if shared.expiry.is_some_and(|expiry| expiry <= now) {
                    shared.generation += 1;
                    shared.counts.clear();
                    shared.expiry = self.reset_interval.map(|d| now + d);
                }
                None
            }
            CircuitState::Open if shared.expiry.is_some_and(|expiry| expiry <= now) => {
                self.set_state(shared, CircuitState::HalfOpen, now)
            }
            CircuitState::Open | CircuitState::HalfOpen => None,
        };
        (shared.state, shared.generation, transition)
    }

    fn set_state(&self, shared: &mut Shared, to: CircuitState, now: Instant) -> Transition {
        let from = shared.state;
        if from == to {
            return None;
        }
        shared.state = to;
        shared.generation += 1;
        shared.counts.clear();
        shared.expiry = match to {
            CircuitState::Closed => self.reset_interval.map(|d| now + d),
            CircuitState::Open => Some(now + self.open_timeout),
            CircuitState::HalfOpen => None,
        };
        Some((from, to))
    }

    /// Admission check. Returns the generation the call runs under, or
    /// `None` if the circuit rejects it.
    fn before_call(&self) -> Option<u64> {
        let now = Instant::now();
        let mut shared = self.lock();
        let (state, generation, transition) = self.current(&mut shared, now);

        let admitted = match state {
            CircuitState::Open => false,
            CircuitState::HalfOpen if shared.counts.requests >= self.max_half_open_requests => {
                false
            }
            _ => {
                shared.counts.on_request();
                true
            }
        };
        drop(shared);
        self.notify(transition);

        if !admitted {
            tracing::warn!(breaker = %self.name, %state, "circuit breaker rejecting request");
            return None;
        }
        Some(generation)
    }

    fn after_call(&self, generation: u64, success: bool) {
        let now = Instant::now();
        let mut shared = self.lock();
        let (state, current_generation, transition) = self.current(&mut shared, now);

        // The circuit transitioned while this call was in flight; its
        // result belongs to a generation that no longer exists.
        if current_generation != generation {
            drop(shared);
            self.notify(transition);
            return;
        }

        let transition = if success {
            shared.counts.on_success();
            if state == CircuitState::HalfOpen
                && shared.counts.consecutive_successes >= self.max_half_open_requests
            {
                self.set_state(&mut shared, CircuitState::Closed, now)
            } else {
                None
            }
        } else {
            shared.counts.on_failure();
            match state {
                CircuitState::Closed if (self.trip)(&shared.counts) => {
                    self.set_state(&mut shared, CircuitState::Open, now)
                }
                CircuitState::HalfOpen => self.set_state(&mut shared, CircuitState::Open, now),
                _ => None,
            }
        };
        drop(shared);
        self.notify(transition);
    }

    fn notify(&self, transition: Transition) {
        if let Some((from, to)) = transition {
            if let Some(observer) = &self.on_state_change {
                observer(&self.name, from, to);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn test_breaker(threshold: u32) -> CircuitBreaker {
        CircuitBreaker::builder("test-db")
            .max_half_open_requests(2)
            .reset_interval(Duration::from_secs(60))
            .open_timeout(Duration::from_millis(100))
            .trip_when(move |counts| counts.consecutive_failures > threshold)
            .build()
    }

    async fn fail(cb: &CircuitBreaker) {
        let _ = cb
            .call(async { Err::<i32, _>(anyhow::anyhow!("simulated failure")) })
            .await;
    }

    #[tokio::test]
    async fn stays_closed_below_trip_threshold() {
        let cb = test_breaker(3);

        for _ in 0..3 {
            fail(&cb).await;
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().consecutive_failures, 3);
    }

    #[tokio::test]
    async fn opens_after_threshold_and_rejects_without_running_work() {
        let cb = test_breaker(3);
        let invocations = Arc::new(AtomicU32::new(0));

        for _ in 0..4 {
            fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        let counter = invocations.clone();
        let result = cb
            .call(async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, anyhow::Error>(42)
            })
            .await;

        assert!(matches!(result, Err(BreakerError::Open(_))));
        assert_eq!(invocations.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn half_open_after_cooldown_regardless_of_rejected_calls() {
        let cb = test_breaker(1);

        for _ in 0..2 {
            fail(&cb).await;
        }
        assert_eq!(cb.state(), CircuitState::Open);

        // Calls during the cool-down are rejected, not queued.
        for _ in 0..5 {
            let result = cb.call(async { Ok::<_, anyhow::Error>(()) }).await;
            assert!(matches!(result, Err(BreakerError::Open(_))));
        }

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        let result = cb.call(async { Ok::<_, anyhow::Error>(7) }).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn closes_after_consecutive_successful_probes() {
        let cb = test_breaker(1);

        for _ in 0..2 {
            fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        // max_half_open_requests = 2 successful probes close the circuit.
        for _ in 0..2 {
            let result = cb.call(async { Ok::<_, anyhow::Error>(()) }).await;
            assert!(result.is_ok());
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts(), Counts::default());
    }

    #[tokio::test]
    async fn probe_failure_reopens_and_resets_cooldown() {
        let cb = test_breaker(1);

        for _ in 0..2 {
            fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cb.state(), CircuitState::HalfOpen);

        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Open);

        // Cool-down restarted, requests still rejected right away.
        let result = cb.call(async { Ok::<_, anyhow::Error>(()) }).await;
        assert!(matches!(result, Err(BreakerError::Open(_))));
    }

    #[tokio::test]
    async fn half_open_probe_quota_is_enforced() {
        let cb = Arc::new(
            CircuitBreaker::builder("test-db")
                .max_half_open_requests(1)
                .open_timeout(Duration::from_millis(100))
                .trip_when(|counts| counts.consecutive_failures > 1)
                .build(),
        );

        for _ in 0..2 {
            fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        // First probe occupies the quota while it is still running.
        let probe = {
            let cb = cb.clone();
            tokio::spawn(async move {
                cb.call(async {
                    tokio::time::sleep(Duration::from_millis(200)).await;
                    Ok::<_, anyhow::Error>(())
                })
                .await
            })
        };
        tokio::time::sleep(Duration::from_millis(50)).await;

        let result = cb.call(async { Ok::<_, anyhow::Error>(()) }).await;
        assert!(matches!(result, Err(BreakerError::Open(_))));

        assert!(probe.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn rolling_interval_resets_closed_counts() {
        let cb = CircuitBreaker::builder("test-db")
            .reset_interval(Duration::from_millis(100))
            .trip_when(|counts| counts.consecutive_failures > 3)
            .build();

        for _ in 0..3 {
            fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        // The window rolled over: earlier failures no longer accumulate.
        fail(&cb).await;
        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().total_failures, 1);
    }

    #[tokio::test]
    async fn classify_none_records_neither_success_nor_failure() {
        let cb = test_breaker(1);

        for _ in 0..10 {
            let _ = cb
                .call_with(
                    async { Err::<i32, _>(anyhow::anyhow!("abandoned")) },
                    |_| None,
                )
                .await;
        }

        assert_eq!(cb.state(), CircuitState::Closed);
        assert_eq!(cb.counts().total_failures, 0);
    }

    #[tokio::test]
    async fn observer_sees_every_transition() {
        let seen: Arc<std::sync::Mutex<Vec<(CircuitState, CircuitState)>>> =
            Arc::new(std::sync::Mutex::new(Vec::new()));
        let log = seen.clone();
        let cb = CircuitBreaker::builder("observed-db")
            .max_half_open_requests(1)
            .open_timeout(Duration::from_millis(100))
            .trip_when(|counts| counts.consecutive_failures > 1)
            .on_state_change(move |name, from, to| {
                assert_eq!(name, "observed-db");
                log.lock().unwrap().push((from, to));
            })
            .build();

        for _ in 0..2 {
            fail(&cb).await;
        }
        tokio::time::sleep(Duration::from_millis(150)).await;
        let result = cb.call(async { Ok::<_, anyhow::Error>(()) }).await;
        assert!(result.is_ok());

        let transitions = seen.lock().unwrap().clone();
        assert_eq!(
            transitions,
            vec![
                (CircuitState::Closed, CircuitState::Open),
                (CircuitState::Open, CircuitState::HalfOpen),
                (CircuitState::HalfOpen, CircuitState::Closed),
            ]
        );
    }
}
