/// How a pane composites onto the panes below it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default)]
pub enum BlendMode {
    #[default]
    Normal,
    Multiply,
}

/// Static description of a named z-ordered map pane.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct PaneSpec {
    pub name: &'static str,
    pub z_index: i32,
    pub blend: BlendMode,
    /// When `false` clicks fall through to the panes below.
    pub pointer_events: bool,
}

impl PaneSpec {
    pub const fn new(name: &'static str, z_index: i32) -> Self {
        Self {
            name,
            z_index,
            blend: BlendMode::Normal,
            pointer_events: true,
        }
    }

    pub const fn multiply(mut self) -> Self {
        self.blend = BlendMode::Multiply;
        self
    }

    pub const fn pointer_transparent(mut self) -> Self {
        self.pointer_events = false;
        self
    }
}

/// Renderer-side reference to a created pane. Panes live as long as the map.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PaneHandle {
    name: String,
}

impl PaneHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

pub const SHADOWS_PANE: PaneSpec = PaneSpec::new("shadows-pane", 420)
    .multiply()
    .pointer_transparent();
pub const IRRADIANCE_PANE: PaneSpec = PaneSpec::new("irradiance-pane", 430)
    .multiply()
    .pointer_transparent();
pub const BUILDINGS_PANE: PaneSpec = PaneSpec::new("buildings-pane", 440);
pub const BUILDING_IRRADIANCE_PANE: PaneSpec = PaneSpec::new("building-irradiance-pane", 445);
pub const LIMITS_CASING_PANE: PaneSpec = PaneSpec::new("limits-casing", 460).pointer_transparent();
pub const LIMITS_DASH_PANE: PaneSpec = PaneSpec::new("limits-dash", 461).pointer_transparent();
pub const CERTIFICATES_PANE: PaneSpec = PaneSpec::new("cert-pane", 470);
pub const SELECTION_PANE: PaneSpec = PaneSpec::new("selection", 500);
pub const CELS_PANE: PaneSpec = PaneSpec::new("cels-pane", 560).pointer_transparent();
