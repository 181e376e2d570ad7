use tracing::debug;

use crate::layer::{LayerId, Renderer};
use crate::pane::PaneHandle;

/// Pane opacity during a swap. Never zero so the pane keeps its compositing layer.
pub const FADE_FLOOR: f64 = 0.01;

/// Double-buffered layer slot of one overlay: at most one visible layer and
/// one hidden staging layer on the overlay pane.
#[derive(Debug)]
pub struct LayerSwapper {
    pane: PaneHandle,
    current: Option<LayerId>,
    staging: Option<LayerId>,
}

impl LayerSwapper {
    pub fn new(pane: PaneHandle) -> Self {
        Self {
            pane,
            current: None,
            staging: None,
        }
    }

    pub fn pane(&self) -> &PaneHandle {
        &self.pane
    }

    pub fn current(&self) -> Option<LayerId> {
        self.current
    }

    pub fn staging(&self) -> Option<LayerId> {
        self.staging
    }

    /// Creates a fresh hidden layer, replacing any leftover staging layer.
    pub fn begin_staging<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> LayerId {
        self.discard_staging(renderer);
        let layer = renderer.create_layer(&self.pane);
        self.staging = Some(layer);
        layer
    }

    /// Replaces the visible layer with the staged one in a single step.
    ///
    /// The pane dips to `FADE_FLOOR` around the exchange and returns to full
    /// opacity, which the renderer animates as a fade-in. Returns the new
    /// current layer, or `None` if nothing was staged.
    pub fn commit<R: Renderer + ?Sized>(&mut self, renderer: &mut R) -> Option<LayerId> {
        let staged = self.staging.take()?;
        renderer.set_pane_opacity(&self.pane, FADE_FLOOR);
        if let Some(old) = self.current.take() {
            renderer.destroy_layer(old);
        }
        renderer.show_layer(staged);
        self.current = Some(staged);
        renderer.set_pane_opacity(&self.pane, 1.0);
        debug!(pane = self.pane.name(), layer = staged.0, "layer committed");
        Some(staged)
    }

    /// Drops the staging layer; the visible layer and pane opacity are untouched.
    pub fn discard_staging<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
        if let Some(layer) = self.staging.take() {
            renderer.destroy_layer(layer);
        }
    }

    pub fn teardown<R: Renderer + ?Sized>(&mut self, renderer: &mut R) {
        self.discard_staging(renderer);
        if let Some(layer) = self.current.take() {
            renderer.destroy_layer(layer);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{FADE_FLOOR, LayerSwapper};
    use crate::headless::{HeadlessMap, MapOp};
    use crate::layer::Renderer;
    use crate::pane::SHADOWS_PANE;

    #[test]
    fn commit_fades_and_replaces_in_one_step() {
        let mut map = HeadlessMap::new();
        let pane = map.ensure_pane(&SHADOWS_PANE);
        let mut swapper = LayerSwapper::new(pane.clone());

        let first = swapper.begin_staging(&mut map);
        assert_eq!(swapper.commit(&mut map), Some(first));
        let second = swapper.begin_staging(&mut map);
        // Old layer stays visible while the new one is staged.
        assert!(map.layer(first).unwrap().visible);
        assert!(!map.layer(second).unwrap().visible);

        map.take_ops();
        swapper.commit(&mut map);
        assert_eq!(
            map.take_ops(),
            vec![
                MapOp::PaneOpacity {
                    pane: "shadows-pane".into(),
                    opacity: FADE_FLOOR
                },
                MapOp::Destroy(first),
                MapOp::Show(second),
                MapOp::PaneOpacity {
                    pane: "shadows-pane".into(),
                    opacity: 1.0
                },
            ]
        );
        assert_eq!(swapper.current(), Some(second));
        assert_eq!(swapper.staging(), None);
    }

    #[test]
    fn discard_leaves_current_and_opacity() {
        let mut map = HeadlessMap::new();
        let pane = map.ensure_pane(&SHADOWS_PANE);
        let mut swapper = LayerSwapper::new(pane);
        let first = swapper.begin_staging(&mut map);
        swapper.commit(&mut map);
        let staged = swapper.begin_staging(&mut map);

        map.take_ops();
        swapper.discard_staging(&mut map);
        assert_eq!(map.take_ops(), vec![MapOp::Destroy(staged)]);
        assert_eq!(swapper.current(), Some(first));
        assert_eq!(swapper.commit(&mut map), None);
    }

    #[test]
    fn teardown_removes_both_layers() {
        let mut map = HeadlessMap::new();
        let pane = map.ensure_pane(&SHADOWS_PANE);
        let mut swapper = LayerSwapper::new(pane);
        swapper.begin_staging(&mut map);
        swapper.commit(&mut map);
        swapper.begin_staging(&mut map);
        swapper.teardown(&mut map);
        assert_eq!(map.live_layer_count(), 0);
        assert_eq!(swapper.current(), None);
        assert_eq!(swapper.staging(), None);
    }
}
