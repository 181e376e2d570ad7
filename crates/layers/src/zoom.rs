/// Closed integer zoom range in which an overlay is shown.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ZoomGate {
    pub min: u8,
    pub max: u8,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ZoomTransition {
    Entered,
    Left,
    Unchanged,
}

/// What the user has to do to bring an overlay into range.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ZoomHint {
    InRange,
    ZoomIn { levels: u8, target: u8 },
    ZoomOut { levels: u8, target: u8 },
}

impl ZoomGate {
    pub const fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }

    pub fn allows(&self, zoom: u8) -> bool {
        self.min <= zoom && zoom <= self.max
    }

    pub fn transition(&self, prev: Option<u8>, next: u8) -> ZoomTransition {
        let was = prev.is_some_and(|z| self.allows(z));
        match (was, self.allows(next)) {
            (false, true) => ZoomTransition::Entered,
            (true, false) => ZoomTransition::Left,
            _ => ZoomTransition::Unchanged,
        }
    }

    pub fn hint(&self, zoom: u8) -> ZoomHint {
        if zoom < self.min {
            ZoomHint::ZoomIn {
                levels: self.min - zoom,
                target: self.min,
            }
        } else if zoom > self.max {
            ZoomHint::ZoomOut {
                levels: zoom - self.max,
                target: self.max,
            }
        } else {
            ZoomHint::InRange
        }
    }
}
