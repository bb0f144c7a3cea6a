use std::time::Duration;

use foundation::LatLon;
use runtime::RateLimiter;
use streaming::{PlaceSuggestion, SourceError};
use tokio::time::Instant;
use tracing::{debug, warn};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    Enter,
    Escape,
}

/// What a key press asks the driver to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyOutcome {
    /// Handled locally.
    Handled,
    /// Geocode this text and move there.
    Commit(String),
    /// The search box had nothing to do with the key.
    Unhandled,
}

/// Debounced suggestion lookup behind a search box.
#[derive(Debug)]
pub struct SearchSuggestionController {
    input: String,
    debounce: RateLimiter<String>,
    suggestions: Vec<PlaceSuggestion>,
    highlighted: Option<usize>,
    limit: usize,
    committing: Option<String>,
}

impl SearchSuggestionController {
    pub fn new(debounce: Duration, limit: usize) -> Self {
        Self {
            input: String::new(),
            debounce: RateLimiter::debounce(debounce),
            suggestions: Vec::new(),
            highlighted: None,
            limit,
            committing: None,
        }
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn suggestions(&self) -> &[PlaceSuggestion] {
        &self.suggestions
    }

    pub fn highlighted(&self) -> Option<usize> {
        self.highlighted
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    pub fn on_input_changed(&mut self, now: Instant, text: impl Into<String>) {
        self.input = text.into();
        if self.input.trim().is_empty() {
            self.debounce.cancel();
            self.clear_suggestions();
            return;
        }
        self.debounce.call(now, self.input.clone());
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.debounce.deadline()
    }

    /// The query to fetch suggestions for, once the input has been quiet
    /// for the debounce interval.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        self.debounce.poll(now)
    }

    /// Applies a suggestion response. Responses for anything but the current
    /// input are dropped; returns whether the list changed.
    pub fn on_suggestions(
        &mut self,
        query: &str,
        result: Result<Vec<PlaceSuggestion>, SourceError>,
    ) -> bool {
        if query != self.input {
            debug!(query, current = %self.input, "dropping stale suggestions");
            return false;
        }
        match result {
            Ok(mut list) => {
                list.truncate(self.limit);
                self.suggestions = list;
            }
            Err(err) => {
                warn!(query, error = %err, "suggestion lookup failed");
                self.suggestions.clear();
            }
        }
        self.highlighted = None;
        true
    }

    pub fn on_key(&mut self, key: Key) -> KeyOutcome {
        let len = self.suggestions.len();
        match key {
            Key::ArrowDown if len > 0 => {
                self.highlighted = Some(self.highlighted.map_or(0, |i| (i + 1).min(len - 1)));
                KeyOutcome::Handled
            }
            Key::ArrowUp if len > 0 => {
                self.highlighted = Some(self.highlighted.map_or(0, |i| i.saturating_sub(1)));
                KeyOutcome::Handled
            }
            Key::Enter => match self.highlighted {
                Some(index) => self.select(index).map_or(KeyOutcome::Unhandled, KeyOutcome::Commit),
                None => KeyOutcome::Unhandled,
            },
            Key::Escape if len > 0 => {
                self.clear_suggestions();
                KeyOutcome::Handled
            }
            _ => KeyOutcome::Unhandled,
        }
    }

    /// Commits the suggestion at `index`, as a click on it would.
    pub fn select(&mut self, index: usize) -> Option<String> {
        let name = self.suggestions.get(index)?.display_name.clone();
        Some(self.begin_commit(name))
    }

    /// Commits free text without going through suggestions.
    pub fn submit(&mut self, text: &str) -> Option<String> {
        let text = text.trim();
        if text.is_empty() {
            return None;
        }
        Some(self.begin_commit(text.to_string()))
    }

    /// Applies the geocoder's answer for a commit. Returns where to move.
    pub fn on_commit_located(
        &mut self,
        text: &str,
        result: Result<Option<LatLon>, SourceError>,
    ) -> Option<LatLon> {
        if self.committing.as_deref() != Some(text) {
            debug!(text, "dropping superseded search result");
            return None;
        }
        self.committing = None;
        match result {
            Ok(Some(position)) => {
                self.clear_suggestions();
                Some(position)
            }
            Ok(None) => {
                warn!(text, "no coordinates for search");
                None
            }
            Err(err) => {
                warn!(text, error = %err, "search geocoding failed");
                None
            }
        }
    }

    pub fn cancel(&mut self) -> bool {
        self.committing = None;
        self.debounce.cancel().is_some()
    }

    fn begin_commit(&mut self, text: String) -> String {
        self.debounce.cancel();
        self.input = text.clone();
        self.committing = Some(text.clone());
        text
    }

    fn clear_suggestions(&mut self) {
        self.suggestions.clear();
        self.highlighted = None;
    }
}

#[cfg(test)]
mod tests {
    use super::{Key, KeyOutcome, SearchSuggestionController};
    use foundation::LatLon;
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::time::Duration;
    use streaming::{PlaceSuggestion, SourceError};
    use tokio::time::Instant;

    const DEBOUNCE: Duration = Duration::from_millis(300);

    fn suggestion(name: &str) -> PlaceSuggestion {
        PlaceSuggestion {
            display_name: name.into(),
            position: LatLon::new(23.8, 90.4),
        }
    }

    fn with_suggestions(names: &[&str]) -> SearchSuggestionController {
        let mut c = SearchSuggestionController::new(DEBOUNCE, 5);
        c.on_input_changed(Instant::now(), "q");
        c.on_suggestions("q", Ok(names.iter().map(|n| suggestion(n)).collect()));
        c
    }

    #[test]
    fn typing_within_window_fetches_once_for_last_text() {
        let start = Instant::now();
        let mut c = SearchSuggestionController::new(DEBOUNCE, 5);
        c.on_input_changed(start, "Dhak");
        c.on_input_changed(start + Duration::from_millis(200), "Dhaka");
        assert_eq!(c.poll(start + Duration::from_millis(400)), None);
        assert_eq!(c.poll(start + Duration::from_millis(500)), Some("Dhaka".into()));
        assert_eq!(c.poll(start + Duration::from_millis(900)), None);
    }

    #[test]
    fn empty_input_clears_without_fetching() {
        let mut c = with_suggestions(&["a", "b"]);
        c.on_input_changed(Instant::now(), "   ");
        assert!(c.suggestions().is_empty());
        assert_eq!(c.deadline(), None);
    }

    #[test]
    fn stale_responses_are_dropped_and_lists_are_capped() {
        let mut c = SearchSuggestionController::new(DEBOUNCE, 2);
        c.on_input_changed(Instant::now(), "Dhaka");
        assert!(!c.on_suggestions("Dhak", Ok(vec![suggestion("old")])));
        assert!(c.on_suggestions(
            "Dhaka",
            Ok(vec![suggestion("a"), suggestion("b"), suggestion("c")])
        ));
        assert_eq!(c.suggestions().len(), 2);
    }

    #[test]
    fn failed_lookup_clears_suggestions() {
        let mut c = with_suggestions(&["a"]);
        c.on_suggestions("q", Err(SourceError::Timeout));
        assert!(c.suggestions().is_empty());
    }

    #[rstest]
    #[case(&[Key::ArrowDown], Some(0))]
    #[case(&[Key::ArrowDown, Key::ArrowDown, Key::ArrowDown, Key::ArrowDown], Some(2))]
    #[case(&[Key::ArrowUp], Some(0))]
    #[case(&[Key::ArrowDown, Key::ArrowDown, Key::ArrowUp], Some(0))]
    #[case(&[Key::ArrowDown, Key::ArrowUp, Key::ArrowUp], Some(0))]
    fn arrows_clamp_the_highlight(#[case] keys: &[Key], #[case] expected: Option<usize>) {
        let mut c = with_suggestions(&["a", "b", "c"]);
        for key in keys {
            c.on_key(*key);
        }
        assert_eq!(c.highlighted(), expected);
    }

    #[test]
    fn arrows_without_suggestions_do_nothing() {
        let mut c = SearchSuggestionController::new(DEBOUNCE, 5);
        assert_eq!(c.on_key(Key::ArrowDown), KeyOutcome::Unhandled);
        assert_eq!(c.highlighted(), None);
    }

    #[test]
    fn enter_commits_only_a_highlighted_suggestion() {
        let mut c = with_suggestions(&["Dhaka, Bangladesh", "Dhaka Division"]);
        assert_eq!(c.on_key(Key::Enter), KeyOutcome::Unhandled);
        c.on_key(Key::ArrowDown);
        c.on_key(Key::ArrowDown);
        assert_eq!(c.on_key(Key::Enter), KeyOutcome::Commit("Dhaka Division".into()));
        assert_eq!(c.input(), "Dhaka Division");
    }

    #[test]
    fn commit_success_clears_suggestions_and_stale_results_are_ignored() {
        let mut c = with_suggestions(&["First", "Second"]);
        let first = c.select(0).expect("first");
        let second = c.select(1).expect("second");

        let at = LatLon::new(23.8, 90.4);
        assert_eq!(c.on_commit_located(&first, Ok(Some(at))), None);
        assert_eq!(c.suggestions().len(), 2);

        assert_eq!(c.on_commit_located(&second, Ok(Some(at))), Some(at));
        assert!(c.suggestions().is_empty());
    }

    #[test]
    fn submit_ignores_blank_text() {
        let mut c = SearchSuggestionController::new(DEBOUNCE, 5);
        assert_eq!(c.submit("  "), None);
        assert_eq!(c.submit(" Sylhet "), Some("Sylhet".into()));
    }

    #[test]
    fn escape_dismisses_open_suggestions_first() {
        let mut c = with_suggestions(&["a"]);
        assert_eq!(c.on_key(Key::Escape), KeyOutcome::Handled);
        assert_eq!(c.on_key(Key::Escape), KeyOutcome::Unhandled);
    }
}
