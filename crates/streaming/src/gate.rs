use std::time::Duration;

use runtime::{Edge, RateLimiter};
use serde::Serialize;
use tokio::time::Instant;
use tracing::{debug, warn};

use crate::request::{FetchTicket, GeoQuery};
use crate::source::SourceError;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FetchState {
    #[default]
    Idle,
    Loading,
    Error,
}

/// Trailing-edge throttle in front of the geosearch fetch.
///
/// At most one ticket is released per interval and it carries the most recent
/// query. Only one ticket may be in flight; requests arriving meanwhile wait
/// until [`FetchGate::complete`] is called.
#[derive(Debug)]
pub struct FetchGate {
    limiter: RateLimiter<FetchTicket>,
    state: FetchState,
    next_generation: u64,
    in_flight: Option<FetchTicket>,
    released: u64,
}

impl FetchGate {
    pub fn new(interval: Duration) -> Self {
        Self {
            limiter: RateLimiter::throttle(Edge::Trailing, interval),
            state: FetchState::Idle,
            next_generation: 0,
            in_flight: None,
            released: 0,
        }
    }

    pub fn state(&self) -> FetchState {
        self.state
    }

    pub fn in_flight(&self) -> Option<&FetchTicket> {
        self.in_flight.as_ref()
    }

    pub fn pending(&self) -> Option<&FetchTicket> {
        self.limiter.pending()
    }

    /// Number of tickets released so far.
    pub fn released(&self) -> u64 {
        self.released
    }

    /// Queues `query`, replacing any query still waiting for the interval
    /// boundary. Returns the generation the eventual fetch will carry.
    pub fn request(&mut self, now: Instant, query: GeoQuery) -> u64 {
        self.next_generation += 1;
        let ticket = FetchTicket {
            generation: self.next_generation,
            query,
        };
        let released = self.limiter.call(now, ticket);
        debug_assert!(released.is_none(), "trailing throttle released on call");
        ticket.generation
    }

    /// When the driver should next call [`FetchGate::poll`]. `None` while a
    /// fetch is in flight or nothing is queued.
    pub fn deadline(&self) -> Option<Instant> {
        if self.in_flight.is_some() {
            return None;
        }
        self.limiter.deadline()
    }

    /// Releases the queued ticket once the interval boundary has passed.
    pub fn poll(&mut self, now: Instant) -> Option<FetchTicket> {
        if self.in_flight.is_some() {
            return None;
        }
        let ticket = self.limiter.poll(now)?;
        debug!(
            generation = ticket.generation,
            radius_m = ticket.query.radius_m,
            "fetch released"
        );
        self.state = FetchState::Loading;
        self.in_flight = Some(ticket);
        self.released += 1;
        Some(ticket)
    }

    /// Marks the in-flight fetch finished. Returns `false` for a ticket that
    /// is not the one in flight.
    pub fn complete(&mut self, generation: u64, outcome: Result<(), &SourceError>) -> bool {
        match self.in_flight {
            Some(ticket) if ticket.generation == generation => {}
            _ => return false,
        }
        self.in_flight = None;
        self.state = match outcome {
            Ok(()) => FetchState::Idle,
            Err(err) => {
                warn!(generation, error = %err, "geodata fetch failed");
                FetchState::Error
            }
        };
        true
    }

    /// Drops any queued query. An in-flight fetch is left to finish.
    pub fn cancel(&mut self) -> bool {
        self.limiter.cancel().is_some()
    }
}
