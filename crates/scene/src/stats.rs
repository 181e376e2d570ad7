use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

use formats::{Feature, Geometry, GeoPoint};
use foundation::geodesy::circle_ring;
use foundation::{IdSequence, SelectionId};
use runtime::CancellationToken;
use serde_json::Value;
use streaming::{
    BuildingMetrics, CELS_FALLBACK_RADIUS_M, CelsHit, FetchError, StatsSource, ZonalSummary,
    ZonalTarget,
};
use thiserror::Error;
use tracing::{debug, warn};

/// Points are measured as a small disc around the point.
pub const POINT_BUFFER_M: f64 = 8.0;
pub const POINT_BUFFER_STEPS: usize = 48;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StatKind {
    ShadowZonal,
    IrradianceZonal,
    CelsMembership,
    BuildingMetrics,
}

impl StatKind {
    pub const ALL: [StatKind; 4] = [
        StatKind::ShadowZonal,
        StatKind::IrradianceZonal,
        StatKind::CelsMembership,
        StatKind::BuildingMetrics,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            StatKind::ShadowZonal => "shadow-zonal",
            StatKind::IrradianceZonal => "irradiance-zonal",
            StatKind::CelsMembership => "cels-membership",
            StatKind::BuildingMetrics => "building-metrics",
        }
    }

    fn needs_geometry(&self) -> bool {
        !matches!(self, StatKind::BuildingMetrics)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StatValue {
    Zonal(ZonalSummary),
    Cels(Vec<CelsHit>),
    Metrics(BuildingMetrics),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatError {
    #[error("selection has no usable geometry")]
    MissingGeometry,
    #[error("selection has no cadastral reference")]
    NoReference,
    #[error(transparent)]
    Fetch(#[from] FetchError),
}

impl StatError {
    /// Text shown in the statistics panel for a failed slot.
    pub fn user_message(&self, kind: StatKind) -> String {
        match (self, kind) {
            (StatError::Fetch(FetchError::NotFound), StatKind::BuildingMetrics) => {
                "Sin métricas".to_string()
            }
            (StatError::NoReference, _) => "Sin referencia catastral".to_string(),
            (StatError::MissingGeometry, _) => "Selección sin geometría".to_string(),
            (_, StatKind::ShadowZonal) => "No se pudieron calcular las sombras".to_string(),
            (_, StatKind::IrradianceZonal) => "No se pudo calcular la irradiancia".to_string(),
            (_, StatKind::CelsMembership) => "No se pudieron consultar los CELS".to_string(),
            (_, StatKind::BuildingMetrics) => "No se pudieron cargar las métricas".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub enum StatSlot {
    #[default]
    Idle,
    Loading,
    Ready(StatValue),
    Failed(StatError),
}

impl StatSlot {
    pub fn is_settled(&self) -> bool {
        matches!(self, StatSlot::Ready(_) | StatSlot::Failed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub id: SelectionId,
    pub feature: Feature,
    pub reference: Option<String>,
}

/// Current selection and one result slot per statistic.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectionState {
    pub selection: Option<Selection>,
    pub slots: BTreeMap<StatKind, StatSlot>,
}

impl SelectionState {
    pub fn slot(&self, kind: StatKind) -> StatSlot {
        self.slots.get(&kind).cloned().unwrap_or_default()
    }

    fn current_id(&self) -> Option<SelectionId> {
        self.selection.as_ref().map(|s| s.id)
    }

    /// Writes a result only while `id` is still the current selection.
    fn apply(&mut self, id: SelectionId, kind: StatKind, slot: StatSlot) -> bool {
        if self.current_id() != Some(id) {
            return false;
        }
        self.slots.insert(kind, slot);
        true
    }
}

/// Fetches the per-selection statistics, each kind independently.
pub struct StatsAggregationClient<S> {
    source: Rc<S>,
    state: Rc<RefCell<SelectionState>>,
    ids: IdSequence,
    parent: CancellationToken,
    token: Option<CancellationToken>,
}

/// In-flight statistics for one selection. Drive it with [`StatsRequest::run`].
pub struct StatsRequest<S> {
    pub id: SelectionId,
    source: Rc<S>,
    state: Rc<RefCell<SelectionState>>,
    token: CancellationToken,
    geometry: Option<Value>,
    reference: Option<String>,
}

impl<S: StatsSource> StatsAggregationClient<S> {
    pub fn new(source: Rc<S>, parent: CancellationToken) -> Self {
        Self {
            source,
            state: Rc::new(RefCell::new(SelectionState::default())),
            ids: IdSequence::new(),
            parent,
            token: None,
        }
    }

    pub fn state(&self) -> SelectionState {
        self.state.borrow().clone()
    }

    pub fn slot(&self, kind: StatKind) -> StatSlot {
        self.state.borrow().slot(kind)
    }

    /// Starts a new selection, superseding the previous one.
    ///
    /// Slots that cannot be computed fail immediately; the rest are `Loading`
    /// until the returned request runs.
    pub fn select(&mut self, feature: Feature, reference: Option<String>) -> StatsRequest<S> {
        self.cancel_pending();
        let id = SelectionId(self.ids.next());
        let token = self.parent.child_token();
        self.token = Some(token.clone());

        let reference = reference
            .filter(|r| !r.trim().is_empty())
            .or_else(|| feature.property_str("reference"));
        let geometry = feature.usable_geometry().map(zonal_geometry);

        let mut state = self.state.borrow_mut();
        state.selection = Some(Selection {
            id,
            feature,
            reference: reference.clone(),
        });
        state.slots.clear();
        for kind in StatKind::ALL {
            let slot = if kind.needs_geometry() && geometry.is_none() {
                StatSlot::Failed(StatError::MissingGeometry)
            } else if kind == StatKind::BuildingMetrics && reference.is_none() {
                StatSlot::Failed(StatError::NoReference)
            } else {
                StatSlot::Loading
            };
            state.slots.insert(kind, slot);
        }
        debug!(selection = id.0, "selection stats requested");

        StatsRequest {
            id,
            source: self.source.clone(),
            state: self.state.clone(),
            token,
            geometry,
            reference,
        }
    }

    /// Drops the selection and every pending result. Idempotent.
    pub fn clear(&mut self) {
        self.cancel_pending();
        *self.state.borrow_mut() = SelectionState::default();
    }

    fn cancel_pending(&mut self) {
        if let Some(token) = self.token.take() {
            token.cancel();
        }
    }
}

impl<S: StatsSource> StatsRequest<S> {
    /// Resolves every loading slot concurrently; stale results are discarded.
    pub async fn run(self) {
        let loading: Vec<StatKind> = {
            let state = self.state.borrow();
            StatKind::ALL
                .into_iter()
                .filter(|k| state.slot(*k) == StatSlot::Loading)
                .collect()
        };
        let wants = |kind| loading.contains(&kind);

        tokio::join!(
            self.resolve(StatKind::ShadowZonal, wants(StatKind::ShadowZonal)),
            self.resolve(StatKind::IrradianceZonal, wants(StatKind::IrradianceZonal)),
            self.resolve(StatKind::CelsMembership, wants(StatKind::CelsMembership)),
            self.resolve(StatKind::BuildingMetrics, wants(StatKind::BuildingMetrics)),
        );
    }

    async fn resolve(&self, kind: StatKind, wanted: bool) {
        if !wanted {
            return;
        }
        let result = self.fetch(kind).await;
        let slot = match result {
            Err(StatError::Fetch(ref e)) if e.is_cancelled() => return,
            Ok(value) => StatSlot::Ready(value),
            Err(e) => {
                if !matches!(e, StatError::Fetch(FetchError::NotFound)) {
                    warn!(selection = self.id.0, kind = kind.name(), error = %e, "statistic failed");
                }
                StatSlot::Failed(e)
            }
        };
        if self.token.is_cancelled() || !self.state.borrow_mut().apply(self.id, kind, slot) {
            debug!(selection = self.id.0, kind = kind.name(), "stale statistic dropped");
        }
    }

    async fn fetch(&self, kind: StatKind) -> Result<StatValue, StatError> {
        let source = self.source.as_ref();
        let token = &self.token;
        match kind {
            StatKind::ShadowZonal | StatKind::IrradianceZonal => {
                let geometry = self.geometry.as_ref().ok_or(StatError::MissingGeometry)?;
                let target = if kind == StatKind::ShadowZonal {
                    ZonalTarget::Shadows
                } else {
                    ZonalTarget::Irradiance
                };
                Ok(StatValue::Zonal(source.zonal(target, geometry, token).await?))
            }
            StatKind::CelsMembership => {
                let geometry = self.geometry.as_ref().ok_or(StatError::MissingGeometry)?;
                let hits = match source.cels_within_dynamic(geometry, token).await {
                    Err(FetchError::NotFound) => {
                        debug!(selection = self.id.0, "dynamic CELS lookup missing, using fixed radius");
                        source
                            .cels_within(geometry, CELS_FALLBACK_RADIUS_M, token)
                            .await?
                    }
                    other => other?,
                };
                Ok(StatValue::Cels(hits))
            }
            StatKind::BuildingMetrics => {
                let reference = self.reference.as_deref().ok_or(StatError::NoReference)?;
                Ok(StatValue::Metrics(
                    source.building_metrics(reference, token).await?,
                ))
            }
        }
    }
}

/// GeoJSON geometry sent to the zonal endpoints; points become an 8 m disc.
pub fn zonal_geometry(geometry: &Geometry) -> Value {
    match geometry {
        Geometry::Point(p) => {
            let ring = circle_ring(p.lon_deg, p.lat_deg, POINT_BUFFER_M, POINT_BUFFER_STEPS)
                .into_iter()
                .map(|(lon, lat)| GeoPoint::new(lon, lat))
                .collect();
            Geometry::Polygon(vec![ring]).to_geojson_value()
        }
        other => other.to_geojson_value(),
    }
}
