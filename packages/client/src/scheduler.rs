//! Coalescing of frontend changes into bounded-rate render requests.
//!
//! The policy: at most one pending dispatch, minimum spacing between normal
//! updates, at most one request in flight, and a quick/force path that
//! preempts a waiting timer. A quick fire that lands while a request is in
//! flight folds into `needs_immediate` instead of starting a parallel
//! request.

use tokio::time::{Duration, Instant};

/// Minimum spacing between normal (non-quick) updates.
pub const DEFAULT_MAX_NORMAL_UPDATE_INTERVAL: Duration = Duration::from_millis(100);

/// Default dispatch delay for `queue_update`.
pub const DEFAULT_UPDATE_DELAY: Duration = Duration::from_millis(10);

#[derive(Debug, Clone, Copy)]
pub struct PendingUpdate {
    pub fire_at: Instant,
    pub quick: bool,
}

/// What to do when a pending timer fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FireDecision {
    /// Build and send a frontend update now.
    Dispatch,
    /// Nothing to send (disposed, unconfirmed route, or folded into an
    /// in-flight request).
    Skip,
}

/// Scheduler state for one model.
#[derive(Debug)]
pub struct UpdateScheduler {
    pub(crate) last_update: Option<Instant>,
    pub(crate) pending: Option<PendingUpdate>,
    pub(crate) in_flight: bool,
    pub(crate) needs_immediate: bool,
    pub(crate) disposed: bool,
    pub(crate) route_confirmed: bool,
    max_interval: Duration,
}

impl UpdateScheduler {
    pub fn new(max_interval: Duration) -> Self {
        UpdateScheduler {
            last_update: None,
            pending: None,
            in_flight: false,
            needs_immediate: false,
            disposed: false,
            route_confirmed: false,
            max_interval,
        }
    }

    /// Request a dispatch.
    ///
    /// Quick updates preempt a waiting normal timer and fire immediately;
    /// normal updates coalesce into one pending slot spaced at least
    /// `max_interval` after the previous dispatch.
    pub fn queue_update(&mut self, now: Instant, quick: bool, delay: Duration) {
        if self.disposed {
            return;
        }
        if quick {
            if matches!(&self.pending, Some(p) if p.quick) {
                return;
            }
            // cancel a waiting normal timer in favor of an immediate dispatch
            self.pending = Some(PendingUpdate {
                fire_at: now,
                quick: true,
            });
            return;
        }
        if self.pending.is_some() {
            return;
        }
        let fire_at = match self.last_update {
            Some(last) => {
                let elapsed = now.saturating_duration_since(last);
                if elapsed >= self.max_interval {
                    now + delay.min(self.max_interval)
                } else {
                    now + delay.max(self.max_interval - elapsed)
                }
            }
            None => now + delay.min(self.max_interval),
        };
        self.pending = Some(PendingUpdate {
            fire_at,
            quick: false,
        });
    }

    /// When the next pending dispatch should fire.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.map(|p| p.fire_at)
    }

    /// Consume the pending slot at fire time.
    pub fn on_fire(&mut self) -> FireDecision {
        let pending = match self.pending.take() {
            Some(p) => p,
            None => return FireDecision::Skip,
        };
        if self.disposed || !self.route_confirmed {
            return FireDecision::Skip;
        }
        if self.in_flight {
            // force-requests merge instead of starting a parallel request
            self.needs_immediate |= pending.quick;
            return FireDecision::Skip;
        }
        self.in_flight = true;
        FireDecision::Dispatch
    }

    /// Record request completion. Returns true when a merged force-request
    /// should be dispatched promptly.
    pub fn on_complete(&mut self, now: Instant) -> bool {
        self.in_flight = false;
        self.last_update = Some(now);
        std::mem::take(&mut self.needs_immediate)
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed
    }

    pub fn dispose(&mut self) {
        self.disposed = true;
        self.pending = None;
    }
}
