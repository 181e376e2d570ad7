use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use foundation::{BoundingBox, BoundsError};
use formats::Feature;
use runtime::{BatchPlan, DEFAULT_DEBOUNCE};
use streaming::{CertificateMode, Endpoint};

use crate::pane::{
    BUILDING_IRRADIANCE_PANE, BUILDINGS_PANE, CELS_PANE, CERTIFICATES_PANE, IRRADIANCE_PANE,
    PaneSpec, SHADOWS_PANE,
};
use crate::symbology::{
    FeatureStyle, Halo, Rgba, certificate_color, irradiance_scheme, point_radius_for_zoom,
    shadow_count_scheme,
};
use crate::zoom::ZoomGate;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OverlayKind {
    Buildings,
    Shadows,
    Irradiance,
    BuildingIrradiance,
    Certificates,
    Cels,
}

impl OverlayKind {
    pub const ALL: [OverlayKind; 6] = [
        OverlayKind::Buildings,
        OverlayKind::Shadows,
        OverlayKind::Irradiance,
        OverlayKind::BuildingIrradiance,
        OverlayKind::Certificates,
        OverlayKind::Cels,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            OverlayKind::Buildings => "buildings",
            OverlayKind::Shadows => "shadows",
            OverlayKind::Irradiance => "irradiance",
            OverlayKind::BuildingIrradiance => "building-irradiance",
            OverlayKind::Certificates => "certificates",
            OverlayKind::Cels => "cels",
        }
    }
}

impl fmt::Display for OverlayKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OverlayKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_ascii_lowercase().replace('_', "-");
        OverlayKind::ALL
            .into_iter()
            .find(|k| k.name() == s)
            .ok_or_else(|| format!("unknown overlay kind: {s}"))
    }
}

/// Maximum number of features requested per fetch.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ResultCap {
    Fixed(u32),
    ByZoom,
}

impl ResultCap {
    pub fn limit(&self, zoom: u8) -> u32 {
        match self {
            ResultCap::Fixed(n) => *n,
            ResultCap::ByZoom => limit_for_zoom(zoom),
        }
    }
}

pub fn limit_for_zoom(zoom: u8) -> u32 {
    match zoom {
        0..=12 => 8_000,
        13..=14 => 20_000,
        15..=16 => 50_000,
        _ => 100_000,
    }
}

/// Municipal extent queried by fixed-extent overlays, `[west, south, east, north]`.
pub const CITY_EXTENT: [f64; 4] = [
    -3.766250610351563,
    40.279394708323274,
    -3.685398101806641,
    40.32560453181949,
];

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum Extent {
    /// The padded viewport.
    Viewport,
    Fixed([f64; 4]),
}

impl Extent {
    pub fn resolve(&self, padded_viewport: BoundingBox) -> Result<BoundingBox, BoundsError> {
        match self {
            Extent::Viewport => Ok(padded_viewport),
            Extent::Fixed([w, s, e, n]) => BoundingBox::new(*w, *s, *e, *n),
        }
    }

    pub fn is_fixed(&self) -> bool {
        matches!(self, Extent::Fixed(_))
    }
}

/// User-controlled parameters that change what an overlay fetches.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct OverlayParams {
    pub mode: Option<CertificateMode>,
}

/// Refetch and loading tunables.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct PipelineTuning {
    /// Fraction of the viewport added on every side before fetching.
    pub padding_ratio: f64,
    /// Edge displacement, relative to the reference box, that triggers a refetch.
    pub refetch_fraction: f64,
    pub batch: BatchPlan,
    pub debounce: Duration,
}

impl Default for PipelineTuning {
    fn default() -> Self {
        Self {
            padding_ratio: 0.10,
            refetch_fraction: 0.12,
            batch: BatchPlan::default(),
            debounce: DEFAULT_DEBOUNCE,
        }
    }
}

pub type Styler = fn(&Feature, &OverlayParams, u8) -> Option<FeatureStyle>;

/// Everything that distinguishes one overlay kind from another.
#[derive(Debug, Clone)]
pub struct OverlaySpec {
    pub kind: OverlayKind,
    pub endpoint: Endpoint,
    pub zoom: ZoomGate,
    pub pane: PaneSpec,
    pub cap: ResultCap,
    pub extent: Extent,
    /// Point markers whose radius follows the zoom.
    pub scales_points: bool,
    pub styler: Styler,
    pub tuning: PipelineTuning,
}

impl OverlaySpec {
    pub fn for_kind(kind: OverlayKind) -> Self {
        let (endpoint, zoom, pane, cap, extent, scales_points, styler): (
            Endpoint,
            ZoomGate,
            PaneSpec,
            ResultCap,
            Extent,
            bool,
            Styler,
        ) = match kind {
            OverlayKind::Buildings => (
                Endpoint::BuildingFeatures,
                ZoomGate::new(14, 18),
                BUILDINGS_PANE,
                ResultCap::Fixed(50_000),
                Extent::Viewport,
                false,
                style_building as Styler,
            ),
            OverlayKind::Shadows => (
                Endpoint::ShadowFeatures,
                ZoomGate::new(17, 18),
                SHADOWS_PANE,
                ResultCap::Fixed(100_000),
                Extent::Viewport,
                true,
                style_shadow as Styler,
            ),
            OverlayKind::Irradiance => (
                Endpoint::IrradianceFeatures,
                ZoomGate::new(17, 18),
                IRRADIANCE_PANE,
                ResultCap::ByZoom,
                Extent::Viewport,
                true,
                style_irradiance as Styler,
            ),
            OverlayKind::BuildingIrradiance => (
                Endpoint::BuildingIrradiance,
                ZoomGate::new(16, 18),
                BUILDING_IRRADIANCE_PANE,
                ResultCap::ByZoom,
                Extent::Viewport,
                false,
                style_building_irradiance as Styler,
            ),
            OverlayKind::Certificates => (
                Endpoint::BuildingCertificates,
                ZoomGate::new(15, 18),
                CERTIFICATES_PANE,
                ResultCap::Fixed(50_000),
                Extent::Viewport,
                false,
                style_certificate as Styler,
            ),
            OverlayKind::Cels => (
                Endpoint::CelsFeatures,
                ZoomGate::new(14, 18),
                CELS_PANE,
                ResultCap::Fixed(20_000),
                Extent::Fixed(CITY_EXTENT),
                false,
                style_cels as Styler,
            ),
        };
        Self {
            kind,
            endpoint,
            zoom,
            pane,
            cap,
            extent,
            scales_points,
            styler,
            tuning: PipelineTuning::default(),
        }
    }

    pub fn with_tuning(mut self, tuning: PipelineTuning) -> Self {
        self.tuning = tuning;
        self
    }

    /// Certificate overlays always carry a display mode.
    pub fn normalize_params(&self, params: OverlayParams) -> OverlayParams {
        match self.kind {
            OverlayKind::Certificates => OverlayParams {
                mode: Some(params.mode.unwrap_or_default()),
            },
            _ => OverlayParams { mode: None },
        }
    }

    pub fn style(&self, feature: &Feature, params: &OverlayParams, zoom: u8) -> Option<FeatureStyle> {
        (self.styler)(feature, params, zoom)
    }
}

const SHADOW_FILL_OPACITY: f64 = 0.9;
const CERT_OUTLINE_ESTIMATED: Rgba = Rgba::rgba(0x00000025);
const CERT_OUTLINE: Rgba = Rgba::rgba(0x00000035);
const CELS_RING_RADIUS_M: f64 = 1000.0;

fn first_number(feature: &Feature, keys: &[&str]) -> Option<f64> {
    keys.iter().find_map(|k| feature.property_f64(k))
}

fn style_building(_: &Feature, _: &OverlayParams, _: u8) -> Option<FeatureStyle> {
    Some(
        FeatureStyle::default()
            .stroke(Rgba::rgb(0x6b7280), 0.6)
            .fill(Rgba::rgb(0xe5e7eb), 0.5),
    )
}

fn style_raster_point(color: Rgba, feature: &Feature, zoom: u8) -> FeatureStyle {
    let style = FeatureStyle::default().fill(color, SHADOW_FILL_OPACITY);
    let is_point = feature
        .geometry
        .as_ref()
        .and_then(|g| g.as_point())
        .is_some();
    if is_point {
        style.marker(point_radius_for_zoom(zoom))
    } else {
        style
    }
}

fn style_shadow(feature: &Feature, _: &OverlayParams, zoom: u8) -> Option<FeatureStyle> {
    let color = shadow_count_scheme().classify(feature.property_f64("shadow_count"));
    Some(style_raster_point(color, feature, zoom))
}

fn style_irradiance(feature: &Feature, _: &OverlayParams, zoom: u8) -> Option<FeatureStyle> {
    let value = first_number(feature, &["irradiance", "irr_kWhm2_y", "value"]);
    Some(style_raster_point(irradiance_scheme().classify(value), feature, zoom))
}

fn style_building_irradiance(feature: &Feature, _: &OverlayParams, _: u8) -> Option<FeatureStyle> {
    let value = first_number(feature, &["irr_mean_kWhm2_y", "irr_average"]);
    Some(
        FeatureStyle::default()
            .stroke(CERT_OUTLINE, 0.8)
            .fill(irradiance_scheme().classify(value), 0.75),
    )
}

fn style_certificate(feature: &Feature, params: &OverlayParams, _: u8) -> Option<FeatureStyle> {
    let (letter_key, estimated_key) = params.mode.unwrap_or_default().property_keys();
    let letter = feature.property_str(letter_key).unwrap_or_default();
    let estimated = feature.property_f64(estimated_key) == Some(1.0);
    let color = certificate_color(&letter);
    let style = if estimated {
        FeatureStyle::default()
            .stroke(CERT_OUTLINE_ESTIMATED, 0.8)
            .fill(color, 1.0)
            .hatched()
    } else {
        FeatureStyle::default()
            .stroke(CERT_OUTLINE, 0.8)
            .fill(color, 0.75)
    };
    Some(style)
}

fn style_cels(feature: &Feature, _: &OverlayParams, _: u8) -> Option<FeatureStyle> {
    let community = feature.property_f64("auto_CEL") == Some(2.0);
    let (stroke, fill) = if community {
        (Rgba::rgb(0xef4444), Rgba::rgb(0xfecaca))
    } else {
        (Rgba::rgb(0x2563eb), Rgba::rgb(0xc7d2fe))
    };
    Some(
        FeatureStyle::default()
            .stroke(stroke, 2.0)
            .fill(stroke, 1.0)
            .marker(4.0)
            .halo(Halo {
                radius_m: CELS_RING_RADIUS_M,
                stroke,
                fill,
                fill_opacity: 0.25,
            }),
    )
}
