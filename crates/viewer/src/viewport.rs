use std::rc::Rc;
use std::time::Duration;

use foundation::BoundingBox;
use layers::SharedMap;
use runtime::{CancellationToken, Debouncer};
use tokio::sync::watch;
use tracing::{debug, trace};

/// Settled map view: what the overlays fetch against.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Viewport {
    pub bbox: BoundingBox,
    pub zoom: u8,
}

/// Turns bursts of move-end signals into one published viewport.
///
/// Subscribers receive `None` until the first viewport is published. Every
/// settled move-end notifies them, even when the view did not change.
pub struct ViewportTracker {
    map: SharedMap,
    tx: Option<Rc<watch::Sender<Option<Viewport>>>>,
    rx: watch::Receiver<Option<Viewport>>,
    debouncer: Debouncer,
}

impl ViewportTracker {
    pub fn new(map: SharedMap, debounce: Duration, parent: CancellationToken) -> Self {
        let (tx, rx) = watch::channel(None);
        Self {
            map,
            tx: Some(Rc::new(tx)),
            rx,
            debouncer: Debouncer::new(debounce, parent),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Viewport>> {
        self.rx.clone()
    }

    pub fn latest(&self) -> Option<Viewport> {
        *self.rx.borrow()
    }

    /// Publishes the current view without waiting for the debounce window.
    pub fn mount(&mut self) {
        if let Some(tx) = &self.tx {
            publish(&self.map, tx);
        }
    }

    /// Restarts the debounce window; the view is read when it closes.
    pub fn on_move_end(&mut self) {
        let Some(tx) = self.tx.clone() else {
            trace!("move end after unmount ignored");
            return;
        };
        let map = self.map.clone();
        self.debouncer.trigger(move || publish(&map, &tx));
    }

    pub fn is_pending(&self) -> bool {
        self.debouncer.is_pending()
    }

    /// Drops the pending timer and closes the channel once the timer task is gone.
    pub fn unmount(&mut self) {
        self.debouncer.cancel();
        self.tx = None;
    }
}

fn publish(map: &SharedMap, tx: &watch::Sender<Option<Viewport>>) {
    let (bounds, zoom) = {
        let map = map.borrow();
        (map.bounds(), map.zoom())
    };
    let Some(bbox) = bounds else {
        debug!(zoom, "map reported no usable bounds; viewport skipped");
        return;
    };
    let next = Viewport { bbox, zoom };
    // Sent even when unchanged: a zoom bounce inside one debounce window
    // settles on the view the overlays were torn down at.
    let previous = tx.send_replace(Some(next));
    if previous == Some(next) {
        trace!(bbox = %bbox, zoom, "viewport republished unchanged");
    } else {
        debug!(bbox = %bbox, zoom, "viewport published");
    }
}
