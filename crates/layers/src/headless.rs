use std::collections::BTreeMap;

use foundation::{BoundingBox, IdSequence};

use crate::layer::{LayerId, MapView, Renderer};
use crate::pane::{PaneHandle, PaneSpec};
use crate::symbology::StyledFeature;

/// Every mutation a [`HeadlessMap`] has seen, in call order.
#[derive(Debug, Clone, PartialEq)]
pub enum MapOp {
    CreatePane(String),
    PaneOpacity { pane: String, opacity: f64 },
    CreateLayer { layer: LayerId, pane: String },
    Append { layer: LayerId, count: usize },
    Show(LayerId),
    Destroy(LayerId),
    PointRadius { layer: LayerId, radius: f64 },
    SetView { lon: f64, lat: f64, zoom: u8 },
    FitBounds(BoundingBox),
    OpenPopup { lon: f64, lat: f64, content: String },
    ClosePopup,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PaneState {
    pub spec: PaneSpec,
    pub opacity: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerState {
    pub pane: String,
    pub visible: bool,
    pub features: Vec<StyledFeature>,
    pub point_radius: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Popup {
    pub lon: f64,
    pub lat: f64,
    pub content: String,
}

/// In-memory map used by tests and the command-line probe.
///
/// It keeps the full renderer state plus an operation log, so callers can
/// assert both on the end result and on the order of mutations.
#[derive(Debug)]
pub struct HeadlessMap {
    zoom: u8,
    bounds: Option<BoundingBox>,
    panes: BTreeMap<String, PaneState>,
    layers: BTreeMap<LayerId, LayerState>,
    layer_ids: IdSequence,
    popup: Option<Popup>,
    ops: Vec<MapOp>,
}

impl Default for HeadlessMap {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessMap {
    pub fn new() -> Self {
        Self {
            zoom: 0,
            bounds: None,
            panes: BTreeMap::new(),
            layers: BTreeMap::new(),
            layer_ids: IdSequence::new(),
            popup: None,
            ops: Vec::new(),
        }
    }

    pub fn with_viewport(bbox: BoundingBox, zoom: u8) -> Self {
        let mut map = Self::new();
        map.set_viewport(bbox, zoom);
        map
    }

    /// Moves the camera without logging an operation, as a user pan would.
    pub fn set_viewport(&mut self, bbox: BoundingBox, zoom: u8) {
        self.bounds = Some(bbox);
        self.zoom = zoom;
    }

    pub fn clear_viewport(&mut self) {
        self.bounds = None;
    }

    pub fn ops(&self) -> &[MapOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<MapOp> {
        std::mem::take(&mut self.ops)
    }

    pub fn pane(&self, name: &str) -> Option<&PaneState> {
        self.panes.get(name)
    }

    pub fn layer(&self, id: LayerId) -> Option<&LayerState> {
        self.layers.get(&id)
    }

    pub fn layers_in(&self, pane: &str) -> Vec<LayerId> {
        self.layers
            .iter()
            .filter(|(_, l)| l.pane == pane)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn visible_layers_in(&self, pane: &str) -> Vec<LayerId> {
        self.layers
            .iter()
            .filter(|(_, l)| l.pane == pane && l.visible)
            .map(|(id, _)| *id)
            .collect()
    }

    pub fn live_layer_count(&self) -> usize {
        self.layers.len()
    }

    pub fn popup(&self) -> Option<&Popup> {
        self.popup.as_ref()
    }
}

impl Renderer for HeadlessMap {
    fn ensure_pane(&mut self, spec: &PaneSpec) -> PaneHandle {
        if !self.panes.contains_key(spec.name) {
            self.panes.insert(
                spec.name.to_string(),
                PaneState {
                    spec: *spec,
                    opacity: 1.0,
                },
            );
            self.ops.push(MapOp::CreatePane(spec.name.to_string()));
        }
        PaneHandle::new(spec.name)
    }

    fn set_pane_opacity(&mut self, pane: &PaneHandle, opacity: f64) {
        if let Some(state) = self.panes.get_mut(pane.name()) {
            state.opacity = opacity;
            self.ops.push(MapOp::PaneOpacity {
                pane: pane.name().to_string(),
                opacity,
            });
        }
    }

    fn create_layer(&mut self, pane: &PaneHandle) -> LayerId {
        let id = LayerId(self.layer_ids.next());
        self.layers.insert(
            id,
            LayerState {
                pane: pane.name().to_string(),
                visible: false,
                features: Vec::new(),
                point_radius: None,
            },
        );
        self.ops.push(MapOp::CreateLayer {
            layer: id,
            pane: pane.name().to_string(),
        });
        id
    }

    fn append_features(&mut self, layer: LayerId, features: Vec<StyledFeature>) {
        if let Some(state) = self.layers.get_mut(&layer) {
            self.ops.push(MapOp::Append {
                layer,
                count: features.len(),
            });
            state.features.extend(features);
        }
    }

    fn show_layer(&mut self, layer: LayerId) {
        if let Some(state) = self.layers.get_mut(&layer) {
            state.visible = true;
            self.ops.push(MapOp::Show(layer));
        }
    }

    fn destroy_layer(&mut self, layer: LayerId) {
        if self.layers.remove(&layer).is_some() {
            self.ops.push(MapOp::Destroy(layer));
        }
    }

    fn set_point_radius(&mut self, layer: LayerId, radius: f64) {
        if let Some(state) = self.layers.get_mut(&layer) {
            state.point_radius = Some(radius);
            self.ops.push(MapOp::PointRadius { layer, radius });
        }
    }

    fn layer_feature_count(&self, layer: LayerId) -> usize {
        self.layers.get(&layer).map_or(0, |l| l.features.len())
    }
}

impl MapView for HeadlessMap {
    fn zoom(&self) -> u8 {
        self.zoom
    }

    fn bounds(&self) -> Option<BoundingBox> {
        self.bounds
    }

    /// Recentres on the point; the extent scales by a factor of two per zoom level.
    fn set_view(&mut self, lon: f64, lat: f64, zoom: u8) {
        if let Some(b) = self.bounds {
            let scale = 2f64.powi(i32::from(self.zoom) - i32::from(zoom));
            let half_w = b.width() * scale / 2.0;
            let half_h = b.height() * scale / 2.0;
            self.bounds = BoundingBox::new(lon - half_w, lat - half_h, lon + half_w, lat + half_h).ok();
        }
        self.zoom = zoom;
        self.ops.push(MapOp::SetView { lon, lat, zoom });
    }

    fn fit_bounds(&mut self, bbox: BoundingBox) {
        self.bounds = Some(bbox);
        self.ops.push(MapOp::FitBounds(bbox));
    }

    fn open_popup(&mut self, lon: f64, lat: f64, content: String) {
        self.popup = Some(Popup {
            lon,
            lat,
            content: content.clone(),
        });
        self.ops.push(MapOp::OpenPopup { lon, lat, content });
    }

    fn close_popup(&mut self) {
        if self.popup.take().is_some() {
            self.ops.push(MapOp::ClosePopup);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{HeadlessMap, MapOp};
    use crate::layer::{MapView, Renderer};
    use crate::pane::CERTIFICATES_PANE;
    use foundation::BoundingBox;

    #[test]
    fn ensure_pane_is_idempotent() {
        let mut map = HeadlessMap::new();
        let a = map.ensure_pane(&CERTIFICATES_PANE);
        let b = map.ensure_pane(&CERTIFICATES_PANE);
        assert_eq!(a, b);
        assert_eq!(map.ops(), &[MapOp::CreatePane("cert-pane".into())]);
    }

    #[test]
    fn set_view_scales_extent_with_zoom() {
        let bbox = BoundingBox::new(-3.74, 40.30, -3.72, 40.31).unwrap();
        let mut map = HeadlessMap::with_viewport(bbox, 17);
        map.set_view(-3.73, 40.305, 18);
        let b = map.bounds().unwrap();
        assert!((b.width() - 0.01).abs() < 1e-12);
        assert_eq!(map.zoom(), 18);
    }
}
