use std::cell::RefCell;
use std::rc::Rc;

use foundation::BoundingBox;

use crate::pane::{PaneHandle, PaneSpec};
use crate::symbology::StyledFeature;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LayerId(pub u64);

/// Feature layer operations of the map renderer.
///
/// Layers are created hidden on a pane, filled through repeated appends and
/// only become visible on `show_layer`. Destroying an unknown layer is a no-op.
pub trait Renderer {
    /// Creates the pane on first use; later calls return the same handle.
    fn ensure_pane(&mut self, spec: &PaneSpec) -> PaneHandle;
    fn set_pane_opacity(&mut self, pane: &PaneHandle, opacity: f64);
    fn create_layer(&mut self, pane: &PaneHandle) -> LayerId;
    fn append_features(&mut self, layer: LayerId, features: Vec<StyledFeature>);
    fn show_layer(&mut self, layer: LayerId);
    fn destroy_layer(&mut self, layer: LayerId);
    /// Resizes every point marker in the layer.
    fn set_point_radius(&mut self, layer: LayerId, radius: f64);
    fn layer_feature_count(&self, layer: LayerId) -> usize;
}

/// Camera and popup side of the map.
pub trait MapView {
    fn zoom(&self) -> u8;
    /// `None` while the map has no usable extent (e.g. zero-sized container).
    fn bounds(&self) -> Option<BoundingBox>;
    fn set_view(&mut self, lon: f64, lat: f64, zoom: u8);
    fn fit_bounds(&mut self, bbox: BoundingBox);
    fn open_popup(&mut self, lon: f64, lat: f64, content: String);
    fn close_popup(&mut self);
}

pub trait MapSurface: Renderer + MapView {}

impl<T: Renderer + MapView + ?Sized> MapSurface for T {}

/// The map as shared by every component of a session.
pub type SharedMap = Rc<RefCell<dyn MapSurface>>;
