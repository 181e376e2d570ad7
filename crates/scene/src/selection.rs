use formats::{Feature, Geometry};
use layers::{
    FeatureStyle, LayerId, PaneHandle, Rgba, SELECTION_PANE, SharedMap, StyledFeature,
};
use thiserror::Error;
use tracing::debug;

/// Zoom used when centring on a selected point.
pub const POINT_FOCUS_ZOOM: u8 = 19;
/// Padding ratio around a selected shape when fitting the camera.
pub const FIT_PADDING: f64 = 0.4;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectionError {
    #[error("selected feature has no geometry")]
    MissingGeometry,
    #[error("selected geometry has no area to frame")]
    NoExtent,
}

/// Draws the selected feature on its own pane and frames the camera on it.
pub struct SelectionHighlighter {
    map: SharedMap,
    pane: PaneHandle,
    layer: Option<LayerId>,
    popup_open: bool,
}

impl SelectionHighlighter {
    pub fn new(map: SharedMap) -> Self {
        let pane = map.borrow_mut().ensure_pane(&SELECTION_PANE);
        Self {
            map,
            pane,
            layer: None,
            popup_open: false,
        }
    }

    pub fn layer(&self) -> Option<LayerId> {
        self.layer
    }

    /// Replaces any previous highlight. Nothing changes if the feature cannot be shown.
    pub fn highlight(
        &mut self,
        feature: &Feature,
        popup: Option<String>,
    ) -> Result<LayerId, SelectionError> {
        let geometry = feature
            .usable_geometry()
            .ok_or(SelectionError::MissingGeometry)?;
        let (focus, style) = match geometry.as_point() {
            Some(p) => ((p.lon_deg, p.lat_deg), point_style()),
            None => {
                let bounds = geometry.bounds().ok_or(SelectionError::NoExtent)?;
                (bounds.center(), shape_style())
            }
        };

        self.clear();
        let mut map = self.map.borrow_mut();
        match geometry {
            Geometry::Point(p) => map.set_view(p.lon_deg, p.lat_deg, POINT_FOCUS_ZOOM),
            other => {
                if let Some(bounds) = other.bounds() {
                    map.fit_bounds(bounds.pad(FIT_PADDING));
                }
            }
        }

        let layer = map.create_layer(&self.pane);
        map.append_features(
            layer,
            vec![StyledFeature {
                feature: feature.clone(),
                style,
            }],
        );
        map.show_layer(layer);
        if let Some(content) = popup {
            map.open_popup(focus.0, focus.1, content);
            self.popup_open = true;
        }
        self.layer = Some(layer);
        debug!(layer = layer.0, "selection highlighted");
        Ok(layer)
    }

    /// Safe to call any number of times.
    pub fn clear(&mut self) {
        let mut map = self.map.borrow_mut();
        if let Some(layer) = self.layer.take() {
            map.destroy_layer(layer);
        }
        if std::mem::take(&mut self.popup_open) {
            map.close_popup();
        }
    }
}

fn shape_style() -> FeatureStyle {
    FeatureStyle::default()
        .stroke(Rgba::rgb(0xff564d), 1.0)
        .fill(Rgba::rgb(0xff9f0a), 0.25)
}

fn point_style() -> FeatureStyle {
    FeatureStyle::default()
        .stroke(Rgba::rgb(0xff3b30), 3.0)
        .fill(Rgba::rgb(0xff9f0a), 0.6)
        .marker(8.0)
}

#[cfg(test)]
mod tests {
    use super::{FIT_PADDING, POINT_FOCUS_ZOOM, SelectionError, SelectionHighlighter};
    use formats::{Feature, GeoPoint, Geometry};
    use foundation::BoundingBox;
    use layers::{HeadlessMap, MapOp, SharedMap};
    use std::cell::RefCell;
    use std::rc::Rc;

    fn setup() -> (Rc<RefCell<HeadlessMap>>, SelectionHighlighter) {
        let bbox = BoundingBox::new(-3.74, 40.29, -3.71, 40.32).unwrap();
        let map = Rc::new(RefCell::new(HeadlessMap::with_viewport(bbox, 16)));
        let shared: SharedMap = map.clone();
        let highlighter = SelectionHighlighter::new(shared);
        (map, highlighter)
    }

    fn building() -> Feature {
        let ring = vec![
            GeoPoint::new(-3.73, 40.30),
            GeoPoint::new(-3.72, 40.30),
            GeoPoint::new(-3.72, 40.31),
            GeoPoint::new(-3.73, 40.31),
            GeoPoint::new(-3.73, 40.30),
        ];
        Feature::new(Some(Geometry::Polygon(vec![ring])))
    }

    #[test]
    fn point_selection_zooms_in_and_polygons_fit() {
        let (map, mut hl) = setup();
        let point = Feature::new(Some(Geometry::Point(GeoPoint::new(-3.725, 40.305))));
        hl.highlight(&point, None).unwrap();
        assert!(map.borrow().ops().contains(&MapOp::SetView {
            lon: -3.725,
            lat: 40.305,
            zoom: POINT_FOCUS_ZOOM
        }));

        hl.highlight(&building(), Some("1234501AB".into())).unwrap();
        let expected = BoundingBox::new(-3.73, 40.30, -3.72, 40.31)
            .unwrap()
            .pad(FIT_PADDING);
        let map = map.borrow();
        assert!(map.ops().contains(&MapOp::FitBounds(expected)));
        assert_eq!(map.visible_layers_in("selection").len(), 1);
        assert_eq!(map.popup().map(|p| p.content.as_str()), Some("1234501AB"));
    }

    #[test]
    fn clear_is_idempotent() {
        let (map, mut hl) = setup();
        hl.highlight(&building(), Some("x".into())).unwrap();
        hl.clear();
        let after_first = map.borrow().ops().len();
        hl.clear();
        hl.clear();
        assert_eq!(map.borrow().ops().len(), after_first);
        assert!(map.borrow().layers_in("selection").is_empty());
        assert!(map.borrow().popup().is_none());
    }

    #[test]
    fn rejects_missing_geometry_without_touching_prior_highlight() {
        let (map, mut hl) = setup();
        let layer = hl.highlight(&building(), None).unwrap();
        assert_eq!(
            hl.highlight(&Feature::new(None), None),
            Err(SelectionError::MissingGeometry)
        );
        assert_eq!(hl.layer(), Some(layer));
        assert!(map.borrow().layer(layer).is_some());
    }
}
