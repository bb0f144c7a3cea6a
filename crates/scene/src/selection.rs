use foundation::LatLon;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::navigation::NavigationPort;
use crate::point::{PlaceholderPoint, Point};
use crate::world::PointSet;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Selection {
    Point(Point),
    Placeholder(PlaceholderPoint),
}

impl Selection {
    pub fn title(&self) -> &str {
        match self {
            Self::Point(p) => &p.title,
            Self::Placeholder(p) => &p.title,
        }
    }

    pub fn position(&self) -> LatLon {
        match self {
            Self::Point(p) => p.position,
            Self::Placeholder(p) => p.position,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OverlayMode {
    #[default]
    Closed,
    Preview,
    Expanded,
}

/// Where a selection was opened from; decides the initial overlay mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenContext {
    Preview,
    Full,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionStage {
    /// Waiting on the content source's coordinates for the title.
    TitleLookup,
    /// Title lookup came back empty; waiting on the geocoder.
    NameLookup,
    /// Recentered; waiting for a fetch at or after `generation` to land.
    AwaitingPoints {
        center: LatLon,
        generation: Option<u64>,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub title: String,
    pub stage: ResolutionStage,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum BinderPhase {
    #[default]
    Idle,
    ResolvingReference(Resolution),
}

/// What the driver should do after feeding the binder an input.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolutionStep {
    /// Selection now reflects the reference.
    Resolved,
    LookupTitle(String),
    LookupName(String),
    /// Move the viewport here and fetch around it.
    Recenter(LatLon),
    /// Nothing could be found for this title; the reference was removed.
    NotFound(String),
    /// Input did not match the current phase.
    Ignored,
}

/// Keeps selection, overlay mode and the navigation reference in step.
///
/// Outside `ResolvingReference`, a selection exists exactly when the
/// reference is present and names it. While resolving, the reference is
/// present and the selection is still empty.
pub struct SelectionBinder {
    selection: Option<Selection>,
    overlay: OverlayMode,
    phase: BinderPhase,
    nav: Box<dyn NavigationPort>,
    resolution_started: bool,
}

impl SelectionBinder {
    pub fn new(nav: Box<dyn NavigationPort>) -> Self {
        Self {
            selection: None,
            overlay: OverlayMode::Closed,
            phase: BinderPhase::Idle,
            nav,
            resolution_started: false,
        }
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    pub fn overlay(&self) -> OverlayMode {
        self.overlay
    }

    pub fn phase(&self) -> &BinderPhase {
        &self.phase
    }

    pub fn is_resolving(&self) -> bool {
        matches!(self.phase, BinderPhase::ResolvingReference(_))
    }

    pub fn navigation_reference(&self) -> Option<String> {
        self.nav.current()
    }

    /// Ignored for a blank title, which no reference could round-trip.
    pub fn select_by_user_click(&mut self, point: Point, context: OpenContext) {
        if point.title.trim().is_empty() {
            warn!("ignoring selection of a point without a title");
            return;
        }
        if self.is_resolving() {
            debug!("user selection interrupts reference resolution");
            self.phase = BinderPhase::Idle;
        }
        self.nav.replace(Some(&point.title));
        self.overlay = match context {
            OpenContext::Preview => OverlayMode::Preview,
            OpenContext::Full => OverlayMode::Expanded,
        };
        self.selection = Some(Selection::Point(point));
    }

    pub fn close_selection(&mut self) {
        self.phase = BinderPhase::Idle;
        self.selection = None;
        self.overlay = OverlayMode::Closed;
        self.nav.replace(None);
    }

    pub fn set_expanded(&mut self, expanded: bool) {
        if self.selection.is_none() {
            return;
        }
        self.overlay = if expanded {
            OverlayMode::Expanded
        } else {
            OverlayMode::Preview
        };
    }

    pub fn toggle_expanded(&mut self) {
        self.set_expanded(self.overlay != OverlayMode::Expanded);
    }

    /// Starts resolving the startup reference against `points`.
    ///
    /// Runs once per binder; later calls are ignored.
    pub fn resolve_from_navigation_reference(&mut self, points: &PointSet) -> ResolutionStep {
        if self.resolution_started {
            return ResolutionStep::Ignored;
        }
        self.resolution_started = true;

        let Some(title) = self.nav.current() else {
            return ResolutionStep::Ignored;
        };
        if let Some(point) = points.find_by_title(&title) {
            self.open_resolved(Selection::Point(point.clone()));
            return ResolutionStep::Resolved;
        }

        info!(%title, "resolving navigation reference");
        self.phase = BinderPhase::ResolvingReference(Resolution {
            title: title.clone(),
            stage: ResolutionStage::TitleLookup,
        });
        ResolutionStep::LookupTitle(title)
    }

    /// Result of the title-to-coordinates lookup. `None` covers both
    /// "not found" and a failed lookup.
    pub fn on_title_coordinates(&mut self, found: Option<LatLon>) -> ResolutionStep {
        let BinderPhase::ResolvingReference(resolution) = &mut self.phase else {
            return ResolutionStep::Ignored;
        };
        if resolution.stage != ResolutionStage::TitleLookup {
            return ResolutionStep::Ignored;
        }
        match found {
            Some(center) => {
                resolution.stage = ResolutionStage::AwaitingPoints {
                    center,
                    generation: None,
                };
                ResolutionStep::Recenter(center)
            }
            None => {
                debug!(title = %resolution.title, "no title coordinates, trying geocoder");
                resolution.stage = ResolutionStage::NameLookup;
                ResolutionStep::LookupName(resolution.title.clone())
            }
        }
    }

    pub fn on_name_coordinates(&mut self, found: Option<LatLon>) -> ResolutionStep {
        let BinderPhase::ResolvingReference(resolution) = &mut self.phase else {
            return ResolutionStep::Ignored;
        };
        if resolution.stage != ResolutionStage::NameLookup {
            return ResolutionStep::Ignored;
        }
        match found {
            Some(center) => {
                resolution.stage = ResolutionStage::AwaitingPoints {
                    center,
                    generation: None,
                };
                ResolutionStep::Recenter(center)
            }
            None => {
                let title = std::mem::take(&mut resolution.title);
                warn!(%title, "navigation reference not found");
                self.phase = BinderPhase::Idle;
                self.nav.replace(None);
                ResolutionStep::NotFound(title)
            }
        }
    }

    /// Records which fetch generation the recentered viewport requested.
    pub fn await_fetch(&mut self, generation: u64) {
        if let BinderPhase::ResolvingReference(Resolution {
            stage: ResolutionStage::AwaitingPoints { generation: g, .. },
            ..
        }) = &mut self.phase
        {
            g.get_or_insert(generation);
        }
    }

    /// A fetch landed. Completes the resolution once the awaited
    /// generation (or a newer one) has been applied.
    pub fn on_points_applied(&mut self, generation: u64, points: &PointSet) -> ResolutionStep {
        let Some((title, center)) = self.awaiting(generation) else {
            return ResolutionStep::Ignored;
        };
        let selection = match points.find_by_title(&title) {
            Some(point) => Selection::Point(point.clone()),
            None => {
                debug!(%title, "reference missing from fetched points, using placeholder");
                Selection::Placeholder(PlaceholderPoint {
                    title,
                    position: center,
                })
            }
        };
        self.open_resolved(selection);
        ResolutionStep::Resolved
    }

    /// The awaited fetch failed; the referenced place is still shown.
    pub fn on_fetch_failed(&mut self, generation: u64) -> ResolutionStep {
        let Some((title, center)) = self.awaiting(generation) else {
            return ResolutionStep::Ignored;
        };
        self.open_resolved(Selection::Placeholder(PlaceholderPoint {
            title,
            position: center,
        }));
        ResolutionStep::Resolved
    }

    /// Whether the selection and the reference currently agree.
    pub fn invariant_holds(&self) -> bool {
        match (&self.selection, self.nav.current()) {
            (Some(selection), Some(title)) => selection.title() == title,
            (None, None) => self.overlay == OverlayMode::Closed,
            (None, Some(_)) => self.is_resolving(),
            (Some(_), None) => false,
        }
    }

    fn awaiting(&self, generation: u64) -> Option<(String, LatLon)> {
        match &self.phase {
            BinderPhase::ResolvingReference(Resolution {
                title,
                stage:
                    ResolutionStage::AwaitingPoints {
                        center,
                        generation: Some(awaited),
                    },
            }) if generation >= *awaited => Some((title.clone(), *center)),
            _ => None,
        }
    }

    fn open_resolved(&mut self, selection: Selection) {
        self.phase = BinderPhase::Idle;
        self.nav.replace(Some(selection.title()));
        self.selection = Some(selection);
        self.overlay = OverlayMode::Preview;
    }
}

impl std::fmt::Debug for SelectionBinder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SelectionBinder")
            .field("selection", &self.selection)
            .field("overlay", &self.overlay)
            .field("phase", &self.phase)
            .field("reference", &self.nav.current())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{
        BinderPhase, OpenContext, OverlayMode, ResolutionStep, Selection, SelectionBinder,
    };
    use crate::navigation::{MemoryNavigation, UrlNavigation};
    use crate::point::Point;
    use crate::world::PointSet;
    use foundation::LatLon;
    use pretty_assertions::assert_eq;

    fn point(title: &str) -> Point {
        Point::new(title, LatLon::new(23.7, 90.4), "Full text.", None)
    }

    fn binder(reference: Option<&str>) -> SelectionBinder {
        SelectionBinder::new(Box::new(MemoryNavigation::new(reference.map(str::to_owned))))
    }

    fn points(titles: &[&str], generation: u64) -> PointSet {
        let mut set = PointSet::new();
        set.replace(titles.iter().map(|t| point(t)).collect(), generation);
        set
    }

    #[test]
    fn click_then_close_round_trips_the_reference() {
        let mut b = binder(None);
        b.select_by_user_click(point("Lalbagh Fort"), OpenContext::Preview);
        assert_eq!(b.navigation_reference().as_deref(), Some("Lalbagh Fort"));
        assert_eq!(b.overlay(), OverlayMode::Preview);
        assert!(b.invariant_holds());

        b.close_selection();
        assert_eq!(b.navigation_reference(), None);
        assert_eq!(b.overlay(), OverlayMode::Closed);
        assert!(b.selection().is_none());
        assert!(b.invariant_holds());
    }

    #[test]
    fn blank_title_click_leaves_state_untouched() {
        let nav = UrlNavigation::parse("https://locapedia.test/").expect("url");
        let mut b = SelectionBinder::new(Box::new(nav));
        b.select_by_user_click(point(""), OpenContext::Full);
        assert!(b.selection().is_none());
        assert_eq!(b.overlay(), OverlayMode::Closed);
        assert_eq!(b.navigation_reference(), None);
        assert!(b.invariant_holds());

        b.select_by_user_click(point("Lalbagh Fort"), OpenContext::Preview);
        b.select_by_user_click(point(" "), OpenContext::Preview);
        assert_eq!(b.selection().map(Selection::title), Some("Lalbagh Fort"));
        assert!(b.invariant_holds());
    }

    #[test]
    fn full_context_opens_expanded_and_toggle_leaves_reference_alone() {
        let mut b = binder(None);
        b.select_by_user_click(point("A"), OpenContext::Full);
        assert_eq!(b.overlay(), OverlayMode::Expanded);
        b.toggle_expanded();
        assert_eq!(b.overlay(), OverlayMode::Preview);
        assert_eq!(b.navigation_reference().as_deref(), Some("A"));
    }

    #[test]
    fn expanding_without_selection_is_a_no_op() {
        let mut b = binder(None);
        b.set_expanded(true);
        assert_eq!(b.overlay(), OverlayMode::Closed);
    }

    #[test]
    fn reference_present_in_points_resolves_immediately() {
        let mut b = binder(Some("B"));
        let set = points(&["A", "B"], 1);
        assert_eq!(b.resolve_from_navigation_reference(&set), ResolutionStep::Resolved);
        assert_eq!(b.selection().map(Selection::title), Some("B"));
        assert_eq!(b.resolve_from_navigation_reference(&set), ResolutionStep::Ignored);
    }

    #[test]
    fn missing_reference_goes_through_title_lookup_and_fetch() {
        let mut b = binder(Some("Star Mosque"));
        let step = b.resolve_from_navigation_reference(&PointSet::new());
        assert_eq!(step, ResolutionStep::LookupTitle("Star Mosque".into()));
        assert!(b.is_resolving());
        assert!(b.invariant_holds());

        let center = LatLon::new(23.7147, 90.4015);
        assert_eq!(b.on_title_coordinates(Some(center)), ResolutionStep::Recenter(center));
        b.await_fetch(4);

        // an older response does not finish the resolution
        assert_eq!(
            b.on_points_applied(3, &points(&["Other"], 3)),
            ResolutionStep::Ignored
        );
        assert!(b.is_resolving());

        assert_eq!(
            b.on_points_applied(4, &points(&["Star Mosque"], 4)),
            ResolutionStep::Resolved
        );
        assert!(matches!(b.selection(), Some(Selection::Point(_))));
        assert_eq!(b.phase(), &BinderPhase::Idle);
        assert!(b.invariant_holds());
    }

    #[test]
    fn title_absent_after_fetch_yields_placeholder_at_center() {
        let mut b = binder(Some("Hidden Place"));
        b.resolve_from_navigation_reference(&PointSet::new());
        assert_eq!(
            b.on_title_coordinates(None),
            ResolutionStep::LookupName("Hidden Place".into())
        );
        let center = LatLon::new(24.0, 90.0);
        assert_eq!(b.on_name_coordinates(Some(center)), ResolutionStep::Recenter(center));
        b.await_fetch(1);
        b.on_points_applied(1, &points(&["Elsewhere"], 1));

        match b.selection() {
            Some(Selection::Placeholder(p)) => {
                assert_eq!(p.title, "Hidden Place");
                assert_eq!(p.position, center);
            }
            other => panic!("expected placeholder, got {other:?}"),
        }
        assert_eq!(b.navigation_reference().as_deref(), Some("Hidden Place"));
    }

    #[test]
    fn failed_fetch_still_produces_placeholder() {
        let mut b = binder(Some("X"));
        b.resolve_from_navigation_reference(&PointSet::new());
        b.on_title_coordinates(Some(LatLon::new(1.0, 2.0)));
        b.await_fetch(2);
        assert_eq!(b.on_fetch_failed(2), ResolutionStep::Resolved);
        assert!(matches!(b.selection(), Some(Selection::Placeholder(_))));
    }

    #[test]
    fn not_found_everywhere_removes_reference() {
        let mut b = binder(Some("Nowhere"));
        b.resolve_from_navigation_reference(&PointSet::new());
        b.on_title_coordinates(None);
        assert_eq!(
            b.on_name_coordinates(None),
            ResolutionStep::NotFound("Nowhere".into())
        );
        assert!(b.selection().is_none());
        assert_eq!(b.navigation_reference(), None);
        assert!(!b.is_resolving());
        assert!(b.invariant_holds());
    }

    #[test]
    fn user_click_interrupts_resolution() {
        let mut b = binder(Some("Pending"));
        b.resolve_from_navigation_reference(&PointSet::new());
        b.select_by_user_click(point("Clicked"), OpenContext::Preview);
        assert!(!b.is_resolving());
        assert_eq!(b.on_title_coordinates(Some(LatLon::new(0.0, 0.0))), ResolutionStep::Ignored);
        assert_eq!(b.navigation_reference().as_deref(), Some("Clicked"));
    }
}
