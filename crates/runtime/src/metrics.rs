use std::collections::BTreeMap;
use std::time::Duration;

/// Deterministic session counters and latency summaries.
///
/// Sorted maps keep snapshots in a stable order for logs and assertions.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Metrics {
    counters: BTreeMap<&'static str, u64>,
    latencies: BTreeMap<&'static str, Latency>,
}

/// Count, total, and extremes of recorded durations, in milliseconds.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Latency {
    pub count: u64,
    pub total_ms: u64,
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Latency {
    pub fn record(&mut self, elapsed: Duration) {
        let ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
        if self.count == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
        }
        self.count += 1;
        self.total_ms = self.total_ms.saturating_add(ms);
    }

    pub fn mean_ms(&self) -> Option<u64> {
        self.total_ms.checked_div(self.count)
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counter(&self, name: &str) -> u64 {
        self.counters.get(name).copied().unwrap_or(0)
    }

    pub fn inc(&mut self, name: &'static str) {
        *self.counters.entry(name).or_insert(0) += 1;
    }

    pub fn record_latency(&mut self, name: &'static str, elapsed: Duration) {
        self.latencies.entry(name).or_default().record(elapsed);
    }

    pub fn latency(&self, name: &str) -> Option<Latency> {
        self.latencies.get(name).copied()
    }

    pub fn counters(&self) -> impl Iterator<Item = (&'static str, u64)> + '_ {
        self.counters.iter().map(|(k, v)| (*k, *v))
    }

    pub fn latencies(&self) -> impl Iterator<Item = (&'static str, Latency)> + '_ {
        self.latencies.iter().map(|(k, v)| (*k, *v))
    }
}

#[cfg(test)]
mod tests {
    use super::{Latency, Metrics};
    use std::time::Duration;

    #[test]
    fn counters_accumulate() {
        let mut m = Metrics::new();
        m.inc("fetch.started");
        m.inc("fetch.started");
        assert_eq!(m.counter("fetch.started"), 2);
        assert_eq!(m.counter("missing"), 0);
    }

    #[test]
    fn latency_tracks_min_max_total() {
        let mut l = Latency::default();
        assert_eq!(l.mean_ms(), None);
        l.record(Duration::from_millis(40));
        l.record(Duration::from_millis(10));
        l.record(Duration::from_millis(70));
        assert_eq!(l.count, 3);
        assert_eq!(l.total_ms, 120);
        assert_eq!(l.min_ms, 10);
        assert_eq!(l.max_ms, 70);
        assert_eq!(l.mean_ms(), Some(40));
    }

    #[test]
    fn counters_iterate_sorted() {
        let mut m = Metrics::new();
        m.inc("b");
        m.inc("a");
        let names: Vec<_> = m.counters().map(|(k, _)| k).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn latencies_are_kept_per_name() {
        let mut m = Metrics::new();
        m.record_latency("fetch", Duration::from_millis(30));
        m.record_latency("fetch", Duration::from_millis(50));
        assert_eq!(m.latency("fetch").map(|l| l.count), Some(2));
        assert_eq!(m.latency("missing"), None);
        let all: Vec<_> = m.latencies().map(|(k, l)| (k, l.max_ms)).collect();
        assert_eq!(all, vec![("fetch", 50)]);
    }
}
