use std::collections::VecDeque;

use tokio::sync::mpsc;

/// How many recent events a bus keeps for inspection by default.
pub const DEFAULT_RETAINED_EVENTS: usize = 256;

/// Ordered event log with optional live subscribers.
///
/// Events are kept in emission order in a bounded ring so long sessions do not
/// grow without limit; subscribers receive every event regardless of the ring.
#[derive(Debug)]
pub struct EventBus<E> {
    retained: usize,
    events: VecDeque<E>,
    subscribers: Vec<mpsc::UnboundedSender<E>>,
}

impl<E: Clone> EventBus<E> {
    pub fn new() -> Self {
        Self::with_retained(DEFAULT_RETAINED_EVENTS)
    }

    pub fn with_retained(retained: usize) -> Self {
        Self {
            retained: retained.max(1),
            events: VecDeque::new(),
            subscribers: Vec::new(),
        }
    }

    pub fn emit(&mut self, payload: E) {
        self.subscribers
            .retain(|tx| tx.send(payload.clone()).is_ok());

        if self.events.len() == self.retained {
            self.events.pop_front();
        }
        self.events.push_back(payload);
    }

    /// Receives every event emitted after this call.
    pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<E> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.subscribers.push(tx);
        rx
    }

    /// Retained events, oldest first.
    pub fn events(&self) -> impl Iterator<Item = &E> + '_ {
        self.events.iter()
    }
}

impl<E: Clone> Default for EventBus<E> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::EventBus;

    #[test]
    fn records_events_in_order() {
        let mut bus = EventBus::new();
        bus.emit("a");
        bus.emit("b");
        let got: Vec<_> = bus.events().copied().collect();
        assert_eq!(got, vec!["a", "b"]);
    }

    #[test]
    fn ring_keeps_most_recent() {
        let mut bus = EventBus::with_retained(2);
        for i in 0..5 {
            bus.emit(i);
        }
        let got: Vec<_> = bus.events().copied().collect();
        assert_eq!(got, vec![3, 4]);
    }

    #[test]
    fn subscribers_see_later_events_and_are_dropped_when_closed() {
        let mut bus = EventBus::new();
        bus.emit("before");
        let mut rx = bus.subscribe();
        bus.emit("after");
        assert_eq!(rx.try_recv().ok(), Some("after"));
        assert!(rx.try_recv().is_err());

        drop(rx);
        bus.emit("orphaned");
        assert!(bus.subscribers.is_empty());
    }
}
