use std::time::Duration;

use tokio::time::Instant;

/// Which edge of a burst a throttle acts on.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Edge {
    /// Run the first call of a burst immediately, drop the rest of the interval.
    Leading,
    /// Run once at the end of the interval with the most recent call's value.
    Trailing,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RatePolicy {
    /// At most one release per interval.
    Throttle(Edge),
    /// Release once after `interval` of quiet; every call restarts the timer.
    Debounce,
}

/// Clock-free rate limiter shared by the fetch gate and the search box.
///
/// The limiter never reads the clock: every call is stamped by the caller, and
/// the caller is responsible for waking up at [`RateLimiter::deadline`] and
/// calling [`RateLimiter::poll`].
#[derive(Debug)]
pub struct RateLimiter<T> {
    policy: RatePolicy,
    interval: Duration,
    pending: Option<T>,
    deadline: Option<Instant>,
    last_release: Option<Instant>,
}

impl<T> RateLimiter<T> {
    pub fn new(policy: RatePolicy, interval: Duration) -> Self {
        Self {
            policy,
            interval,
            pending: None,
            deadline: None,
            last_release: None,
        }
    }

    pub fn throttle(edge: Edge, interval: Duration) -> Self {
        Self::new(RatePolicy::Throttle(edge), interval)
    }

    pub fn debounce(interval: Duration) -> Self {
        Self::new(RatePolicy::Debounce, interval)
    }

    /// Offers a call stamped at `now`.
    ///
    /// Returns the value back only when it must run immediately, which happens
    /// for a leading-edge throttle outside its cool-down. Every other policy
    /// keeps the value pending until [`RateLimiter::poll`] releases it.
    pub fn call(&mut self, now: Instant, value: T) -> Option<T> {
        match self.policy {
            RatePolicy::Throttle(Edge::Leading) => {
                let ready = self
                    .last_release
                    .is_none_or(|last| now >= last + self.interval);
                if !ready {
                    return None;
                }
                self.last_release = Some(now);
                Some(value)
            }
            RatePolicy::Throttle(Edge::Trailing) => {
                // The window opens on the first call and is not extended by later ones.
                if self.deadline.is_none() {
                    self.deadline = Some(now + self.interval);
                }
                self.pending = Some(value);
                None
            }
            RatePolicy::Debounce => {
                self.deadline = Some(now + self.interval);
                self.pending = Some(value);
                None
            }
        }
    }

    /// When the pending value becomes releasable.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn is_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn pending(&self) -> Option<&T> {
        self.pending.as_ref()
    }

    /// Releases the pending value if its deadline has been reached.
    pub fn poll(&mut self, now: Instant) -> Option<T> {
        let deadline = self.deadline?;
        if now < deadline {
            return None;
        }
        self.deadline = None;
        self.last_release = Some(now);
        self.pending.take()
    }

    /// Drops the pending value and disarms the timer.
    pub fn cancel(&mut self) -> Option<T> {
        self.deadline = None;
        self.pending.take()
    }
}
