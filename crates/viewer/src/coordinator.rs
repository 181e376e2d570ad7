use std::cell::RefCell;
use std::rc::Rc;

use foundation::BoundingBox;
use layers::{
    IncrementalFeatureLoader, LayerId, LayerSwapper, LoadError, OverlayParams, OverlaySpec,
    SharedMap, ZoomTransition, point_radius_for_zoom,
};
use runtime::{CancellationToken, EventKind, Journal};
use streaming::{FeatureQuery, FeatureSource, FetchError, OverlayPhase, PhaseEvent};
use tokio::sync::watch;
use tracing::{debug, info, trace, warn};

use crate::viewport::Viewport;

/// What a coordinator did with a viewport.
#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Decision {
    /// Zoom outside the overlay range; nothing is shown.
    Ineligible,
    /// The shown (or pending) data still covers the view.
    Skipped,
    /// A request for this box was issued.
    Fetching(BoundingBox),
}

#[derive(Debug)]
struct InFlight {
    seq: u64,
    bbox: BoundingBox,
    params: OverlayParams,
    token: CancellationToken,
}

#[derive(Debug)]
struct CoordinatorState {
    swapper: LayerSwapper,
    phase: OverlayPhase,
    params: OverlayParams,
    last_fetched: Option<(BoundingBox, OverlayParams)>,
    in_flight: Option<InFlight>,
    /// Zoom the point radius was last applied for.
    radius_zoom: Option<u8>,
    zoom: Option<u8>,
    viewport: Option<Viewport>,
    fetch_seq: u64,
}

/// Owns the data lifecycle of one overlay: eligibility, refetch decisions,
/// the single in-flight request and the staged swap into the visible layer.
pub struct RequestCoordinator<S> {
    spec: OverlaySpec,
    source: Rc<S>,
    map: SharedMap,
    loader: IncrementalFeatureLoader,
    state: RefCell<CoordinatorState>,
    token: CancellationToken,
    journal: Rc<RefCell<Journal>>,
}

impl<S: FeatureSource + 'static> RequestCoordinator<S> {
    /// Creates the overlay pane; no request is made until a viewport arrives.
    pub fn new(
        spec: OverlaySpec,
        source: Rc<S>,
        map: SharedMap,
        parent: &CancellationToken,
        journal: Rc<RefCell<Journal>>,
    ) -> Rc<Self> {
        let pane = map.borrow_mut().ensure_pane(&spec.pane);
        let params = spec.normalize_params(OverlayParams::default());
        Rc::new(Self {
            loader: IncrementalFeatureLoader::new(spec.tuning.batch),
            spec,
            source,
            map,
            state: RefCell::new(CoordinatorState {
                swapper: LayerSwapper::new(pane),
                phase: OverlayPhase::Idle,
                params,
                last_fetched: None,
                in_flight: None,
                radius_zoom: None,
                zoom: None,
                viewport: None,
                fetch_seq: 0,
            }),
            token: parent.child_token(),
            journal,
        })
    }

    pub fn spec(&self) -> &OverlaySpec {
        &self.spec
    }

    pub fn phase(&self) -> OverlayPhase {
        self.state.borrow().phase
    }

    pub fn params(&self) -> OverlayParams {
        self.state.borrow().params
    }

    pub fn current_layer(&self) -> Option<LayerId> {
        self.state.borrow().swapper.current()
    }

    pub fn staging_layer(&self) -> Option<LayerId> {
        self.state.borrow().swapper.staging()
    }

    /// Padded box of the data currently shown.
    pub fn last_fetched(&self) -> Option<BoundingBox> {
        self.state.borrow().last_fetched.map(|(bbox, _)| bbox)
    }

    pub fn is_fetching(&self) -> bool {
        self.state.borrow().in_flight.is_some()
    }

    /// Handles a settled viewport.
    pub fn on_viewport(self: &Rc<Self>, viewport: Viewport) -> Decision {
        self.state.borrow_mut().viewport = Some(viewport);
        if !self.apply_zoom(viewport.zoom) {
            return Decision::Ineligible;
        }

        let padded = viewport.bbox.pad(self.spec.tuning.padding_ratio);
        let target = match self.spec.extent.resolve(padded) {
            Ok(bbox) => bbox,
            Err(e) => {
                warn!(overlay = self.name(), error = %e, "overlay extent unusable");
                return Decision::Skipped;
            }
        };

        let params = self.state.borrow().params;
        if !self.needs_fetch(target, params) {
            trace!(overlay = self.name(), bbox = %target, "inside hysteresis band");
            self.emit(EventKind::FetchSkipped, format!("bbox={target}"));
            return Decision::Skipped;
        }
        self.start_fetch(target, params, viewport.zoom);
        Decision::Fetching(target)
    }

    /// Zoom-end handling, run synchronously with the zoom change.
    pub fn on_zoom_end(&self, zoom: u8) -> ZoomTransition {
        let prev = self.state.borrow().zoom;
        let transition = self.spec.zoom.transition(prev, zoom);
        self.apply_zoom(zoom);
        transition
    }

    /// Changes the display parameters and re-evaluates the last viewport.
    pub fn set_params(self: &Rc<Self>, params: OverlayParams) -> Option<Decision> {
        let params = self.spec.normalize_params(params);
        let viewport = {
            let mut state = self.state.borrow_mut();
            if state.params == params {
                return None;
            }
            state.params = params;
            state.viewport
        };
        debug!(overlay = self.name(), ?params, "overlay parameters changed");
        viewport.map(|vp| self.on_viewport(vp))
    }

    /// Cancels every task and removes the overlay's layers. The pane stays.
    pub fn unmount(&self) {
        self.token.cancel();
        let mut state = self.state.borrow_mut();
        state.in_flight = None;
        state.swapper.teardown(&mut *self.map.borrow_mut());
        state.last_fetched = None;
        state.radius_zoom = None;
        state.viewport = None;
        self.advance(&mut state, PhaseEvent::Reset);
        self.emit(EventKind::TornDown, "unmounted");
        info!(overlay = self.name(), "overlay unmounted");
    }

    /// Follows the viewport channel until unmount or until the sender is gone.
    pub async fn run(self: Rc<Self>, mut viewports: watch::Receiver<Option<Viewport>>) {
        let initial = *viewports.borrow_and_update();
        if let Some(vp) = initial {
            self.on_viewport(vp);
        }
        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                changed = viewports.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let next = *viewports.borrow_and_update();
                    if let Some(vp) = next {
                        self.on_viewport(vp);
                    }
                }
            }
        }
        trace!(overlay = self.name(), "coordinator loop finished");
    }

    /// Returns whether the overlay is eligible at `zoom`.
    fn apply_zoom(&self, zoom: u8) -> bool {
        let prev = self.state.borrow_mut().zoom.replace(zoom);
        match self.spec.zoom.transition(prev, zoom) {
            ZoomTransition::Left => {
                self.make_ineligible();
                false
            }
            ZoomTransition::Entered => {
                let mut state = self.state.borrow_mut();
                self.advance(&mut state, PhaseEvent::BecameEligible);
                debug!(overlay = self.name(), zoom, "overlay entered zoom range");
                true
            }
            ZoomTransition::Unchanged if self.spec.zoom.allows(zoom) => {
                self.adjust_radius(zoom);
                true
            }
            ZoomTransition::Unchanged => false,
        }
    }

    fn needs_fetch(&self, target: BoundingBox, params: OverlayParams) -> bool {
        let state = self.state.borrow();
        let reference = state
            .in_flight
            .as_ref()
            .map(|f| (f.bbox, f.params))
            .or(state.last_fetched);
        match reference {
            None => true,
            Some((_, old)) if old != params => true,
            Some(_) if self.spec.extent.is_fixed() => false,
            Some((bbox, _)) => {
                target.max_edge_displacement_ratio(&bbox) > self.spec.tuning.refetch_fraction
            }
        }
    }

    fn start_fetch(self: &Rc<Self>, bbox: BoundingBox, params: OverlayParams, zoom: u8) {
        let (seq, token) = {
            let mut state = self.state.borrow_mut();
            if let Some(prev) = state.in_flight.take() {
                prev.token.cancel();
                self.emit(EventKind::FetchCancelled, format!("fetch #{} superseded", prev.seq));
            }
            state.fetch_seq += 1;
            let seq = state.fetch_seq;
            let token = self.token.child_token();
            state.in_flight = Some(InFlight {
                seq,
                bbox,
                params,
                token: token.clone(),
            });
            self.advance(&mut state, PhaseEvent::FetchStarted);
            (seq, token)
        };

        let query = FeatureQuery::new(self.spec.endpoint, bbox, self.spec.cap.limit(zoom))
            .with_mode(params.mode);
        debug!(overlay = self.name(), seq, bbox = %bbox, limit = query.limit, "overlay fetch issued");
        self.emit(EventKind::FetchIssued, format!("#{seq} bbox={bbox}"));

        let this = Rc::clone(self);
        tokio::task::spawn_local(async move {
            this.run_fetch(seq, query, params, zoom, token).await;
        });
    }

    async fn run_fetch(
        self: Rc<Self>,
        seq: u64,
        query: FeatureQuery,
        params: OverlayParams,
        zoom: u8,
        token: CancellationToken,
    ) {
        let result = self.source.fetch_features(&query, &token).await;
        if token.is_cancelled() || matches!(result, Err(FetchError::Cancelled)) {
            self.emit(EventKind::FetchCancelled, format!("#{seq} response dropped"));
            return;
        }
        let features = match result {
            Ok(collection) => collection.into_features(),
            Err(e) => {
                self.fail(seq, &e);
                return;
            }
        };

        let layer = {
            let mut state = self.state.borrow_mut();
            self.advance(&mut state, PhaseEvent::DataReceived);
            state.swapper.begin_staging(&mut *self.map.borrow_mut())
        };
        let total = features.len();
        let loaded = self
            .loader
            .load(
                &*self.map,
                layer,
                features,
                |f| self.spec.style(f, &params, zoom),
                &token,
                |applied| {
                    self.emit(EventKind::BatchApplied, format!("#{seq} {applied}/{total}"));
                },
            )
            .await;

        let report = match loaded {
            Ok(report) if !token.is_cancelled() && self.owns(seq) => report,
            Ok(_) | Err(LoadError::Cancelled { .. }) => {
                let mut state = self.state.borrow_mut();
                if state.swapper.staging() == Some(layer) {
                    state.swapper.discard_staging(&mut *self.map.borrow_mut());
                }
                self.emit(EventKind::Discarded, format!("#{seq} staging dropped"));
                return;
            }
        };

        let mut state = self.state.borrow_mut();
        let Some(in_flight) = state.in_flight.take() else {
            return;
        };
        let committed = state.swapper.commit(&mut *self.map.borrow_mut());
        state.last_fetched = Some((in_flight.bbox, in_flight.params));
        self.advance(&mut state, PhaseEvent::Commit);
        state.radius_zoom = self.spec.scales_points.then_some(zoom);
        drop(state);

        info!(
            overlay = self.name(),
            seq,
            features = report.applied,
            skipped = report.skipped,
            batches = report.batches,
            "overlay committed"
        );
        self.emit(
            EventKind::Committed,
            format!(
                "#{seq} layer={} features={}",
                committed.map_or(0, |l| l.0),
                report.applied
            ),
        );

        // The user may have zoomed inside the range while the data was loading.
        let current_zoom = self.state.borrow().zoom;
        if let Some(z) = current_zoom {
            self.adjust_radius(z);
        }
    }

    fn owns(&self, seq: u64) -> bool {
        self.state.borrow().in_flight.as_ref().map(|f| f.seq) == Some(seq)
    }

    fn fail(&self, seq: u64, error: &FetchError) {
        if !self.owns(seq) {
            return;
        }
        let mut state = self.state.borrow_mut();
        state.in_flight = None;
        let has_layer = state.swapper.current().is_some();
        self.advance(&mut state, PhaseEvent::Aborted { has_layer });
        warn!(
            overlay = self.name(),
            seq,
            error = %error,
            transient = error.is_transient(),
            "overlay fetch failed; keeping previous layer"
        );
        self.emit(EventKind::FetchFailed, format!("#{seq} {error}"));
    }

    fn make_ineligible(&self) {
        let mut state = self.state.borrow_mut();
        if let Some(prev) = state.in_flight.take() {
            prev.token.cancel();
            self.emit(EventKind::FetchCancelled, format!("fetch #{} left zoom range", prev.seq));
        }
        let had_layers = state.swapper.current().is_some() || state.swapper.staging().is_some();
        state.swapper.teardown(&mut *self.map.borrow_mut());
        state.last_fetched = None;
        state.radius_zoom = None;
        self.advance(&mut state, PhaseEvent::BecameIneligible);
        if had_layers {
            debug!(overlay = self.name(), "overlay torn down on zoom");
            self.emit(EventKind::TornDown, "left zoom range");
        }
    }

    fn adjust_radius(&self, zoom: u8) {
        if !self.spec.scales_points {
            return;
        }
        let mut state = self.state.borrow_mut();
        if state.radius_zoom == Some(zoom) {
            return;
        }
        let Some(layer) = state.swapper.current() else {
            return;
        };
        let radius = point_radius_for_zoom(zoom);
        self.map.borrow_mut().set_point_radius(layer, radius);
        state.radius_zoom = Some(zoom);
        self.emit(EventKind::RadiusAdjusted, format!("zoom={zoom} radius={radius}"));
    }

    fn advance(&self, state: &mut CoordinatorState, event: PhaseEvent) {
        match state.phase.advance(event) {
            Ok(next) => state.phase = next,
            Err(e) => debug!(overlay = self.name(), error = %e, "phase unchanged"),
        }
    }

    fn emit(&self, kind: EventKind, message: impl Into<String>) {
        self.journal.borrow_mut().emit(self.name(), kind, message);
    }

    fn name(&self) -> &'static str {
        self.spec.kind.name()
    }
}

#[cfg(test)]
mod tests {
    use super::{Decision, RequestCoordinator};
    use crate::viewport::Viewport;
    use foundation::BoundingBox;
    use formats::{Feature, FeatureCollection, GeoPoint, Geometry};
    use layers::{
        CITY_EXTENT, HeadlessMap, MapOp, OverlayKind, OverlayParams, OverlaySpec, SharedMap,
        ZoomTransition,
    };
    use runtime::{CancellationToken, EventKind, Journal, sleep_or_cancel};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::rc::Rc;
    use std::time::Duration;
    use streaming::{CertificateMode, FeatureQuery, FeatureSource, FetchError, OverlayPhase};
    use tokio::task::LocalSet;

    struct FakeSource {
        count: usize,
        delay: Duration,
        failures: RefCell<VecDeque<FetchError>>,
        queries: RefCell<Vec<FeatureQuery>>,
    }

    impl FakeSource {
        fn new(count: usize) -> Self {
            Self {
                count,
                delay: Duration::from_millis(50),
                failures: RefCell::new(VecDeque::new()),
                queries: RefCell::new(Vec::new()),
            }
        }
    }

    impl FeatureSource for FakeSource {
        async fn fetch_features(
            &self,
            query: &FeatureQuery,
            token: &CancellationToken,
        ) -> Result<FeatureCollection, FetchError> {
            self.queries.borrow_mut().push(query.clone());
            sleep_or_cancel(token, self.delay).await?;
            if let Some(e) = self.failures.borrow_mut().pop_front() {
                return Err(e);
            }
            let (lon, lat) = query.bbox.center();
            Ok(FeatureCollection::new(
                (0..self.count)
                    .map(|_| Feature::new(Some(Geometry::Point(GeoPoint::new(lon, lat)))))
                    .collect(),
            ))
        }
    }

    struct Harness {
        map: Rc<RefCell<HeadlessMap>>,
        source: Rc<FakeSource>,
        journal: Rc<RefCell<Journal>>,
        coordinator: Rc<RequestCoordinator<FakeSource>>,
    }

    fn harness(kind: OverlayKind, source: FakeSource) -> Harness {
        let map = Rc::new(RefCell::new(HeadlessMap::new()));
        let shared: SharedMap = map.clone();
        let source = Rc::new(source);
        let journal = Rc::new(RefCell::new(Journal::new()));
        let coordinator = RequestCoordinator::new(
            OverlaySpec::for_kind(kind),
            source.clone(),
            shared,
            &CancellationToken::new(),
            journal.clone(),
        );
        Harness {
            map,
            source,
            journal,
            coordinator,
        }
    }

    fn vp(west: f64, zoom: u8) -> Viewport {
        Viewport {
            bbox: BoundingBox::new(west, 40.30, west + 0.01, 40.31).unwrap(),
            zoom,
        }
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_secs(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn first_viewport_fetches_padded_box_and_commits() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Shadows, FakeSource::new(10));
                assert_eq!(h.coordinator.phase(), OverlayPhase::Idle);
                let decision = h.coordinator.on_viewport(vp(-3.73, 17));
                let expected = vp(-3.73, 17).bbox.pad(0.10);
                assert_eq!(decision, Decision::Fetching(expected));
                assert_eq!(h.coordinator.phase(), OverlayPhase::Fetching);

                settle().await;
                assert_eq!(h.coordinator.phase(), OverlayPhase::Committed);
                assert_eq!(h.coordinator.last_fetched(), Some(expected));
                let layer = h.coordinator.current_layer().unwrap();
                let map = h.map.borrow();
                assert!(map.layer(layer).unwrap().visible);
                assert_eq!(map.layer(layer).unwrap().features.len(), 10);
                assert_eq!(h.source.queries.borrow()[0].limit, 100_000);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn small_pan_is_skipped_large_pan_refetches() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Shadows, FakeSource::new(3));
                h.coordinator.on_viewport(vp(-3.73, 17));
                settle().await;

                assert_eq!(h.coordinator.on_viewport(vp(-3.7297, 17)), Decision::Skipped);
                assert!(matches!(
                    h.coordinator.on_viewport(vp(-3.728, 17)),
                    Decision::Fetching(_)
                ));
                settle().await;
                assert_eq!(h.source.queries.borrow().len(), 2);
                assert_eq!(h.journal.borrow().count(EventKind::FetchSkipped), 1);
                assert_eq!(h.map.borrow().live_layer_count(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn pending_request_is_the_hysteresis_reference() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Shadows, FakeSource::new(3));
                h.coordinator.on_viewport(vp(-3.73, 17));
                assert_eq!(h.coordinator.on_viewport(vp(-3.7299, 17)), Decision::Skipped);
                settle().await;
                assert_eq!(h.source.queries.borrow().len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_fetch_never_touches_the_map() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Shadows, FakeSource::new(3));
                h.coordinator.on_viewport(vp(-3.73, 17));
                tokio::time::sleep(Duration::from_millis(10)).await;
                h.coordinator.on_viewport(vp(-3.70, 17));
                settle().await;

                let creates = h
                    .map
                    .borrow()
                    .ops()
                    .iter()
                    .filter(|op| matches!(op, MapOp::CreateLayer { .. }))
                    .count();
                assert_eq!(creates, 1);
                assert_eq!(h.journal.borrow().count(EventKind::Committed), 1);
                assert!(h.journal.borrow().count(EventKind::FetchCancelled) >= 1);
                let (lon, _) = h.coordinator.last_fetched().unwrap().center();
                assert!((lon - (-3.695)).abs() < 1e-9);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_zoom_range_tears_down_synchronously() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Shadows, FakeSource::new(3));
                h.coordinator.on_viewport(vp(-3.73, 17));
                settle().await;
                assert!(h.coordinator.current_layer().is_some());

                assert_eq!(h.coordinator.on_zoom_end(16), ZoomTransition::Left);
                assert_eq!(h.coordinator.current_layer(), None);
                assert_eq!(h.map.borrow().live_layer_count(), 0);
                assert_eq!(h.coordinator.phase(), OverlayPhase::EligibleNoData);
                assert!(h.map.borrow().pane("shadows-pane").is_some());

                // Re-entering does not fetch by itself.
                assert_eq!(h.coordinator.on_zoom_end(17), ZoomTransition::Entered);
                settle().await;
                assert_eq!(h.source.queries.borrow().len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn never_eligible_overlay_stays_idle() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Shadows, FakeSource::new(3));
                assert_eq!(h.coordinator.on_viewport(vp(-3.73, 15)), Decision::Ineligible);
                assert_eq!(h.coordinator.phase(), OverlayPhase::Idle);
                assert!(h.source.queries.borrow().is_empty());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failure_keeps_previous_layer() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Buildings, FakeSource::new(4));
                h.coordinator.on_viewport(vp(-3.73, 16));
                settle().await;
                let before = h.coordinator.current_layer();

                h.source
                    .failures
                    .borrow_mut()
                    .push_back(FetchError::Http { status: 500 });
                h.coordinator.on_viewport(vp(-3.70, 16));
                settle().await;
                assert_eq!(h.coordinator.current_layer(), before);
                assert_eq!(h.coordinator.phase(), OverlayPhase::Committed);
                assert_eq!(h.journal.borrow().count(EventKind::FetchFailed), 1);
                assert!(h.map.borrow().layer(before.unwrap()).unwrap().visible);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn failure_without_layer_returns_to_eligible_no_data() {
        LocalSet::new()
            .run_until(async {
                let source = FakeSource::new(4);
                source.failures.borrow_mut().push_back(FetchError::Timeout);
                let h = harness(OverlayKind::Buildings, source);
                h.coordinator.on_viewport(vp(-3.73, 16));
                settle().await;
                assert_eq!(h.coordinator.phase(), OverlayPhase::EligibleNoData);
                assert_eq!(h.map.borrow().live_layer_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn fixed_extent_fetches_once_per_mode() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Cels, FakeSource::new(2));
                let city = BoundingBox::new(CITY_EXTENT[0], CITY_EXTENT[1], CITY_EXTENT[2], CITY_EXTENT[3])
                    .unwrap();
                assert_eq!(h.coordinator.on_viewport(vp(-3.73, 15)), Decision::Fetching(city));
                settle().await;
                assert_eq!(h.coordinator.on_viewport(vp(-3.69, 16)), Decision::Skipped);
                assert_eq!(h.source.queries.borrow().len(), 1);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn certificate_mode_change_refetches_same_box() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Certificates, FakeSource::new(2));
                h.coordinator.on_viewport(vp(-3.73, 16));
                settle().await;
                assert_eq!(
                    h.coordinator.set_params(OverlayParams { mode: None }),
                    None
                );
                let decision = h.coordinator.set_params(OverlayParams {
                    mode: Some(CertificateMode::Co2),
                });
                assert!(matches!(decision, Some(Decision::Fetching(_))));
                settle().await;
                let queries = h.source.queries.borrow();
                assert_eq!(queries[0].mode, Some(CertificateMode::NoRenov));
                assert_eq!(queries[1].mode, Some(CertificateMode::Co2));
                assert_eq!(queries[0].bbox, queries[1].bbox);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn radius_follows_zoom_only_when_it_changes() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Irradiance, FakeSource::new(2));
                h.coordinator.on_viewport(vp(-3.73, 17));
                settle().await;
                h.coordinator.on_zoom_end(17);
                assert_eq!(h.journal.borrow().count(EventKind::RadiusAdjusted), 0);
                h.coordinator.on_zoom_end(18);
                assert_eq!(h.journal.borrow().count(EventKind::RadiusAdjusted), 1);
                let layer = h.coordinator.current_layer().unwrap();
                assert!(h.map.borrow().layer(layer).unwrap().point_radius.is_some());
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_cancels_and_removes_layers() {
        LocalSet::new()
            .run_until(async {
                let h = harness(OverlayKind::Shadows, FakeSource::new(3));
                h.coordinator.on_viewport(vp(-3.73, 17));
                settle().await;
                h.coordinator.on_viewport(vp(-3.60, 17));
                h.coordinator.unmount();
                settle().await;
                assert_eq!(h.map.borrow().live_layer_count(), 0);
                assert_eq!(h.coordinator.phase(), OverlayPhase::Idle);
                assert_eq!(h.journal.borrow().count(EventKind::Committed), 1);
                assert!(h.map.borrow().pane("shadows-pane").is_some());
            })
            .await;
    }
}
