use crate::error::{ThrottlerError, ThrottlerResult};
use crate::quota::{ActionId, QuotaSpec};
use crate::token_bucket::TokenBucket;
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::{self, Instant};
use tracing::debug;

/// Identifies the bucket a call draws from: one per action of each service.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct GateKey {
    pub service: String,
    pub action: ActionId,
}

impl GateKey {
    pub fn new(service: impl Into<String>, action: ActionId) -> Self {
        Self {
            service: service.into(),
            action,
        }
    }
}

impl fmt::Display for GateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.service, self.action)
    }
}

/// Proof of admission through a gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Admission {
    /// Time spent between arriving at the gate and being let through.
    pub waited: Duration,
}

impl Admission {
    pub fn immediate() -> Self {
        Self {
            waited: Duration::ZERO,
        }
    }

    pub fn was_delayed(&self) -> bool {
        !self.waited.is_zero()
    }
}

/// Token bucket admission control for a single action.
///
/// The bucket sits behind its own fair mutex. A caller that has to wait keeps
/// the lock while it sleeps, so queued callers are let through one at a time
/// in arrival order and each sees the bucket its predecessor left behind.
/// Bucket changes are only written once the wait has finished, which makes a
/// dropped `acquire` future free: it never consumes a token.
#[derive(Debug)]
pub struct ThrottleGate {
    key: GateKey,
    quota: QuotaSpec,
    bucket: Mutex<TokenBucket>,
    stats: GateCounters,
}

#[derive(Debug, Default)]
struct GateCounters {
    immediate: AtomicU64,
    delayed: AtomicU64,
    timeouts: AtomicU64,
    total_wait_micros: AtomicU64,
    pending: AtomicU64,
}

/// Counts a caller as pending for as long as it is inside `acquire`,
/// and stops counting it as soon as the future is dropped.
struct PendingGuard<'a>(&'a AtomicU64);

impl<'a> PendingGuard<'a> {
    fn enter(counter: &'a AtomicU64) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self(counter)
    }
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::Relaxed);
    }
}

impl ThrottleGate {
    pub fn new(key: GateKey, quota: QuotaSpec) -> Self {
        Self {
            bucket: Mutex::new(TokenBucket::new(&quota, Instant::now())),
            key,
            quota,
            stats: GateCounters::default(),
        }
    }

    pub fn key(&self) -> &GateKey {
        &self.key
    }

    pub fn quota(&self) -> &QuotaSpec {
        &self.quota
    }

    /// Wait until this gate admits one call.
    pub async fn acquire(&self) -> Admission {
        let arrived = Instant::now();
        let _pending = PendingGuard::enter(&self.stats.pending);
        let mut bucket = self.bucket.lock().await;

        let now = Instant::now();
        let wait = match bucket.try_consume(now) {
            Ok(()) => {
                let admission = Admission {
                    waited: now.duration_since(arrived),
                };
                self.record(false, &admission);
                return admission;
            }
            Err(wait) => wait,
        };

        debug!(
            gate = %self.key,
            wait_ms = wait.as_millis() as u64,
            "Call delayed by throttle"
        );

        // wait never exceeds the restore period, which quotas cap
        let deadline = now + wait;
        time::sleep_until(deadline).await;
        bucket.settle(deadline);

        let admission = Admission {
            waited: Instant::now().duration_since(arrived),
        };
        self.record(true, &admission);
        admission
    }

    /// Like [`acquire`](Self::acquire), but give up after `limit`.
    ///
    /// A timed out caller leaves the bucket exactly as it found it.
    pub async fn acquire_timeout(&self, limit: Duration) -> ThrottlerResult<Admission> {
        match time::timeout(limit, self.acquire()).await {
            Ok(admission) => Ok(admission),
            Err(_) => {
                self.stats.timeouts.fetch_add(1, Ordering::Relaxed);
                debug!(gate = %self.key, limit_ms = limit.as_millis() as u64, "Throttle wait timed out");
                Err(ThrottlerError::ThrottleTimeout {
                    service: self.key.service.clone(),
                    action: self.key.action.to_string(),
                    limit,
                })
            }
        }
    }

    /// Snapshot of the gate. Tokens read as zero while a caller holds the bucket.
    pub fn status(&self) -> GateStatus {
        let available_tokens = match self.bucket.try_lock() {
            Ok(mut bucket) => bucket.available_tokens(Instant::now()),
            Err(_) => 0.0,
        };

        GateStatus {
            service: self.key.service.clone(),
            action: self.key.action.to_string(),
            quota: self.quota,
            available_tokens,
            pending_callers: self.stats.pending.load(Ordering::Relaxed),
            admitted_immediately: self.stats.immediate.load(Ordering::Relaxed),
            admitted_after_wait: self.stats.delayed.load(Ordering::Relaxed),
            timeouts: self.stats.timeouts.load(Ordering::Relaxed),
            total_wait_ms: self.stats.total_wait_micros.load(Ordering::Relaxed) / 1_000,
        }
    }

    fn record(&self, throttled: bool, admission: &Admission) {
        if throttled {
            self.stats.delayed.fetch_add(1, Ordering::Relaxed);
            self.stats
                .total_wait_micros
                .fetch_add(admission.waited.as_micros() as u64, Ordering::Relaxed);
        } else {
            self.stats.immediate.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Gate status information
#[derive(Debug, Clone, Serialize)]
pub struct GateStatus {
    pub service: String,
    pub action: String,
    pub quota: QuotaSpec,
    pub available_tokens: f64,
    /// Callers currently waiting for admission.
    pub pending_callers: u64,
    pub admitted_immediately: u64,
    pub admitted_after_wait: u64,
    pub timeouts: u64,
    pub total_wait_ms: u64,
}
