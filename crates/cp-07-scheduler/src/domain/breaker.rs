//! Per-task-type circuit breaker.
//!
//! Protects downstream collaborators (storage, the AI producer) from retry
//! storms: once a task type fails repeatedly inside a short window, further
//! executions fail fast and re-enqueue with the breaker's cool-down delay
//! instead of hammering a broken dependency.
//!
//! ```text
//!       failures in window          cool-down elapsed
//! CLOSED ───────────────► OPEN ───────────────► HALF-OPEN
//!    ▲                                               │
//!    └───────────── probe succeeds ◄─────────────────┘
//!              (probe failure reopens)
//! ```

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::{info, warn};

/// Breaker state for one task type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// Normal operation.
    Closed,
    /// Failing fast until the cool-down passes.
    Open,
    /// One probe execution allowed through.
    HalfOpen,
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Open => write!(f, "open"),
            Self::HalfOpen => write!(f, "half-open"),
        }
    }
}

/// Breaker tuning.
#[derive(Debug, Clone)]
pub struct BreakerConfig {
    /// Consecutive failures inside `failure_window` that open the circuit.
    pub failure_threshold: u32,
    /// Window over which failures are counted.
    pub failure_window: Duration,
    /// How long the circuit stays open before a probe is allowed.
    pub cool_down: Duration,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 10,
            failure_window: Duration::minutes(1),
            cool_down: Duration::seconds(30),
        }
    }
}

struct TypeCircuit {
    state: BreakerState,
    consecutive_failures: u32,
    window_start: DateTime<Utc>,
    opened_at: Option<DateTime<Utc>>,
}

impl TypeCircuit {
    fn new(now: DateTime<Utc>) -> Self {
        Self {
            state: BreakerState::Closed,
            consecutive_failures: 0,
            window_start: now,
            opened_at: None,
        }
    }
}

/// Circuit breakers keyed by task type.
pub struct TypeCircuitBreaker {
    circuits: RwLock<HashMap<String, TypeCircuit>>,
    config: BreakerConfig,
}

impl TypeCircuitBreaker {
    #[must_use]
    pub fn new(config: BreakerConfig) -> Self {
        Self {
            circuits: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Whether an execution of `task_type` may proceed at `now`.
    ///
    /// An open circuit whose cool-down has elapsed flips to half-open and
    /// lets this one call through as the probe.
    pub fn should_allow(&self, task_type: &str, now: DateTime<Utc>) -> bool {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry(task_type.to_string())
            .or_insert_with(|| TypeCircuit::new(now));

        match circuit.state {
            BreakerState::Closed | BreakerState::HalfOpen => true,
            BreakerState::Open => {
                let elapsed = circuit
                    .opened_at
                    .map(|at| now - at)
                    .unwrap_or_else(Duration::zero);
                if elapsed >= self.config.cool_down {
                    info!(task_type, "Circuit breaker half-open, allowing probe");
                    circuit.state = BreakerState::HalfOpen;
                    true
                } else {
                    false
                }
            }
        }
    }

    /// Record a successful execution.
    pub fn record_success(&self, task_type: &str, now: DateTime<Utc>) {
        let mut circuits = self.circuits.write();
        let Some(circuit) = circuits.get_mut(task_type) else {
            return;
        };
        if circuit.state != BreakerState::Closed {
            info!(task_type, "Circuit breaker closing after success");
        }
        circuit.state = BreakerState::Closed;
        circuit.consecutive_failures = 0;
        circuit.window_start = now;
        circuit.opened_at = None;
    }

    /// Record a failed execution.
    pub fn record_failure(&self, task_type: &str, now: DateTime<Utc>) {
        let mut circuits = self.circuits.write();
        let circuit = circuits
            .entry(task_type.to_string())
            .or_insert_with(|| TypeCircuit::new(now));

        if circuit.state == BreakerState::HalfOpen {
            warn!(task_type, "Circuit breaker reopening after probe failure");
            circuit.state = BreakerState::Open;
            circuit.opened_at = Some(now);
            return;
        }

        // Failures age out of the counting window.
        if now - circuit.window_start > self.config.failure_window {
            circuit.window_start = now;
            circuit.consecutive_failures = 0;
        }

        circuit.consecutive_failures += 1;
        if circuit.consecutive_failures >= self.config.failure_threshold {
            warn!(
                task_type,
                failures = circuit.consecutive_failures,
                cool_down_secs = self.config.cool_down.num_seconds(),
                "Circuit breaker opening"
            );
            circuit.state = BreakerState::Open;
            circuit.opened_at = Some(now);
        }
    }

    /// Current state for a task type.
    #[must_use]
    pub fn state(&self, task_type: &str) -> BreakerState {
        self.circuits
            .read()
            .get(task_type)
            .map(|c| c.state)
            .unwrap_or(BreakerState::Closed)
    }

    /// The configured cool-down, used as the re-enqueue delay while open.
    #[must_use]
    pub fn cool_down(&self) -> Duration {
        self.config.cool_down
    }
}

impl Default for TypeCircuitBreaker {
    fn default() -> Self {
        Self::new(BreakerConfig::default())
    }
}
