use std::cell::RefCell;

use formats::Feature;
use runtime::{BatchPlan, CancellationToken, sleep_or_cancel};
use thiserror::Error;
use tracing::{debug, trace};

use crate::layer::{LayerId, Renderer};
use crate::symbology::{FeatureStyle, StyledFeature};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct LoadReport {
    pub batches: usize,
    /// Features appended to the layer.
    pub applied: usize,
    /// Features without usable geometry or rejected by the styler.
    pub skipped: usize,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    #[error("load cancelled after {applied} features")]
    Cancelled { applied: usize },
}

/// Feeds a large feature set into a hidden layer a slice at a time.
#[derive(Debug, Copy, Clone, Default)]
pub struct IncrementalFeatureLoader {
    plan: BatchPlan,
}

impl IncrementalFeatureLoader {
    pub fn new(plan: BatchPlan) -> Self {
        Self { plan }
    }

    pub fn plan(&self) -> BatchPlan {
        self.plan
    }

    /// Appends `features` to `layer` in source order.
    ///
    /// The token is checked before every batch and raced against every pause,
    /// so nothing is appended once it fires. The future resolves only after
    /// the final batch is in the layer. `progress` receives the running
    /// applied count after each batch.
    pub async fn load<R, S, P>(
        &self,
        renderer: &RefCell<R>,
        layer: LayerId,
        features: Vec<Feature>,
        styler: S,
        token: &CancellationToken,
        mut progress: P,
    ) -> Result<LoadReport, LoadError>
    where
        R: Renderer + ?Sized,
        S: Fn(&Feature) -> Option<FeatureStyle>,
        P: FnMut(usize),
    {
        let total = features.len();
        let mut report = LoadReport::default();
        let mut remaining = features.into_iter();

        for range in self.plan.ranges(total) {
            if token.is_cancelled() {
                return Err(LoadError::Cancelled {
                    applied: report.applied,
                });
            }
            if report.batches > 0 && sleep_or_cancel(token, self.plan.delay()).await.is_err() {
                return Err(LoadError::Cancelled {
                    applied: report.applied,
                });
            }

            let mut styled = Vec::with_capacity(range.len());
            for feature in remaining.by_ref().take(range.len()) {
                if feature.usable_geometry().is_none() {
                    report.skipped += 1;
                    continue;
                }
                match styler(&feature) {
                    Some(style) => styled.push(StyledFeature { feature, style }),
                    None => report.skipped += 1,
                }
            }

            report.applied += styled.len();
            report.batches += 1;
            renderer.borrow_mut().append_features(layer, styled);
            trace!(layer = layer.0, batch = report.batches, applied = report.applied, "batch appended");
            progress(report.applied);
        }

        debug!(
            layer = layer.0,
            total,
            batches = report.batches,
            skipped = report.skipped,
            "layer staged"
        );
        Ok(report)
    }
}
