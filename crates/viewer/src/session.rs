use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use formats::Feature;
use foundation::SelectionId;
use layers::{
    LIMITS_CASING_PANE, LIMITS_DASH_PANE, LayerId, OverlayKind, OverlayParams, OverlaySpec,
    SharedMap, StyledFeature, ZoomHint, boundary_casing_style, boundary_dash_style,
};
use runtime::{CancellationToken, Journal};
use scene::{SelectionError, SelectionHighlighter, SelectionState, StatsAggregationClient};
use streaming::{CertificateMode, FeatureSource, LookupSource, StatsSource};
use tracing::{debug, info};

use crate::config::ViewerConfig;
use crate::coordinator::RequestCoordinator;
use crate::search::{AddressSearch, BaseDataset, SearchError, SearchHit};
use crate::viewport::ViewportTracker;

/// Result of a user selection: the stats id and whether the map could frame it.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectOutcome {
    pub id: SelectionId,
    pub highlight: Result<LayerId, SelectionError>,
}

/// One mounted map: viewport tracking, the overlay coordinators, selection
/// and address search, all sharing one backend client.
///
/// Lives on a `LocalSet`; every background task is a child of the session token.
pub struct MapSession<C> {
    config: ViewerConfig,
    client: Rc<C>,
    map: SharedMap,
    token: CancellationToken,
    journal: Rc<RefCell<Journal>>,
    tracker: Option<ViewportTracker>,
    coordinators: BTreeMap<OverlayKind, Rc<RequestCoordinator<C>>>,
    params: OverlayParams,
    highlighter: SelectionHighlighter,
    stats: StatsAggregationClient<C>,
    search: AddressSearch<C>,
    boundary_layers: Vec<LayerId>,
}

impl<C> MapSession<C>
where
    C: FeatureSource + StatsSource + LookupSource + 'static,
{
    pub fn new(config: ViewerConfig, client: Rc<C>, map: SharedMap) -> Self {
        let token = CancellationToken::new();
        Self {
            highlighter: SelectionHighlighter::new(map.clone()),
            stats: StatsAggregationClient::new(client.clone(), token.clone()),
            search: AddressSearch::new(client.clone()),
            config,
            client,
            map,
            token,
            journal: Rc::new(RefCell::new(Journal::new())),
            tracker: None,
            coordinators: BTreeMap::new(),
            params: OverlayParams::default(),
            boundary_layers: Vec::new(),
        }
    }

    pub fn is_mounted(&self) -> bool {
        self.tracker.is_some()
    }

    /// Starts viewport tracking and one coordinator per overlay.
    pub fn mount(&mut self, overlays: &[OverlayKind]) {
        if self.is_mounted() {
            debug!("session already mounted");
            return;
        }
        if self.token.is_cancelled() {
            self.token = CancellationToken::new();
            self.stats = StatsAggregationClient::new(self.client.clone(), self.token.clone());
        }
        for pane in [LIMITS_CASING_PANE, LIMITS_DASH_PANE] {
            self.map.borrow_mut().ensure_pane(&pane);
        }
        self.tracker = Some(ViewportTracker::new(
            self.map.clone(),
            self.config.pipeline.debounce,
            self.token.clone(),
        ));
        for kind in overlays {
            self.start_overlay(*kind);
        }
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.mount();
        }
        info!(overlays = self.coordinators.len(), "map session mounted");
    }

    pub fn move_end(&mut self) {
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.on_move_end();
        }
    }

    /// Applies the zoom gates right away; fetching waits for the viewport.
    pub fn zoom_end(&mut self) {
        let zoom = self.map.borrow().zoom();
        for coordinator in self.coordinators.values() {
            coordinator.on_zoom_end(zoom);
        }
    }

    /// Guidance for every overlay that is out of range at the current zoom.
    pub fn zoom_hints(&self) -> Vec<(OverlayKind, ZoomHint)> {
        let zoom = self.map.borrow().zoom();
        self.coordinators
            .iter()
            .map(|(kind, c)| (*kind, c.spec().zoom.hint(zoom)))
            .filter(|(_, hint)| *hint != ZoomHint::InRange)
            .collect()
    }

    pub fn set_overlay_enabled(&mut self, kind: OverlayKind, enabled: bool) {
        match (enabled, self.coordinators.contains_key(&kind)) {
            (true, false) if self.is_mounted() => self.start_overlay(kind),
            (false, true) => {
                if let Some(coordinator) = self.coordinators.remove(&kind) {
                    coordinator.unmount();
                }
            }
            _ => {}
        }
    }

    pub fn set_certificate_mode(&mut self, mode: CertificateMode) {
        self.params.mode = Some(mode);
        for coordinator in self.coordinators.values() {
            coordinator.set_params(self.params);
        }
    }

    /// Highlights `feature` and starts its statistics.
    pub fn select_feature(
        &mut self,
        feature: Feature,
        reference: Option<String>,
        popup: Option<String>,
    ) -> SelectOutcome {
        let highlight = self.highlighter.highlight(&feature, popup);
        let request = self.stats.select(feature, reference);
        let id = request.id;
        tokio::task::spawn_local(request.run());
        SelectOutcome { id, highlight }
    }

    pub fn clear_selection(&mut self) {
        self.highlighter.clear();
        self.stats.clear();
    }

    pub fn stats(&self) -> SelectionState {
        self.stats.state()
    }

    pub async fn load_dataset(&self) -> Result<Rc<BaseDataset>, SearchError> {
        self.search.load_dataset(&self.token).await
    }

    /// Resolves the address and selects the building it points to.
    pub async fn search_address(
        &mut self,
        street: &str,
        number: &str,
    ) -> Result<(SearchHit, SelectOutcome), SearchError> {
        let hit = self.search.search(street, number, &self.token).await?;
        let outcome = self.select_feature(
            hit.feature.clone(),
            hit.reference.clone(),
            Some(hit.popup_text()),
        );
        Ok((hit, outcome))
    }

    pub fn search(&self) -> &AddressSearch<C> {
        &self.search
    }

    /// Draws the municipal boundary as a light casing under a dashed line.
    ///
    /// Returns the number of boundary features drawn; zero while the base
    /// dataset is not loaded.
    pub fn show_boundaries(&mut self) -> usize {
        self.hide_boundaries();
        let Some(limits) = self.search.dataset().and_then(|d| d.limits.clone()) else {
            return 0;
        };
        let features: Vec<Feature> = limits
            .into_features()
            .into_iter()
            .filter(|f| f.usable_geometry().is_some())
            .collect();

        let mut map = self.map.borrow_mut();
        for (pane, style) in [
            (LIMITS_CASING_PANE, boundary_casing_style()),
            (LIMITS_DASH_PANE, boundary_dash_style()),
        ] {
            let pane = map.ensure_pane(&pane);
            let layer = map.create_layer(&pane);
            map.append_features(
                layer,
                features
                    .iter()
                    .map(|f| StyledFeature {
                        feature: f.clone(),
                        style,
                    })
                    .collect(),
            );
            map.show_layer(layer);
            self.boundary_layers.push(layer);
        }
        features.len()
    }

    pub fn hide_boundaries(&mut self) {
        let mut map = self.map.borrow_mut();
        for layer in self.boundary_layers.drain(..) {
            map.destroy_layer(layer);
        }
    }

    /// Cancels every task and removes every layer the session created.
    pub fn unmount(&mut self) {
        if let Some(mut tracker) = self.tracker.take() {
            tracker.unmount();
        }
        for coordinator in std::mem::take(&mut self.coordinators).into_values() {
            coordinator.unmount();
        }
        self.clear_selection();
        self.hide_boundaries();
        self.token.cancel();
        info!("map session unmounted");
    }

    pub fn journal(&self) -> Rc<RefCell<Journal>> {
        self.journal.clone()
    }

    pub fn coordinator(&self, kind: OverlayKind) -> Option<&Rc<RequestCoordinator<C>>> {
        self.coordinators.get(&kind)
    }

    fn start_overlay(&mut self, kind: OverlayKind) {
        let Some(tracker) = self.tracker.as_ref() else {
            return;
        };
        let spec = OverlaySpec::for_kind(kind).with_tuning(self.config.pipeline);
        let coordinator = RequestCoordinator::new(
            spec,
            self.client.clone(),
            self.map.clone(),
            &self.token,
            self.journal.clone(),
        );
        coordinator.set_params(self.params);
        tokio::task::spawn_local(coordinator.clone().run(tracker.subscribe()));
        self.coordinators.insert(kind, coordinator);
        debug!(overlay = kind.name(), "overlay enabled");
    }
}
