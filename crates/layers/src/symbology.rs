use std::fmt;

use formats::Feature;
use thiserror::Error;

/// 8-bit sRGB colour with alpha.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    /// Opaque colour from `0xRRGGBB`.
    pub const fn rgb(hex: u32) -> Self {
        Self {
            r: (hex >> 16) as u8,
            g: (hex >> 8) as u8,
            b: hex as u8,
            a: 0xff,
        }
    }

    /// Colour from `0xRRGGBBAA`.
    pub const fn rgba(hex: u32) -> Self {
        Self {
            r: (hex >> 24) as u8,
            g: (hex >> 16) as u8,
            b: (hex >> 8) as u8,
            a: hex as u8,
        }
    }

    /// Parses `#rrggbb` or `#rrggbbaa`.
    pub fn parse_hex(s: &str) -> Option<Self> {
        let digits = s.strip_prefix('#')?;
        let value = u32::from_str_radix(digits, 16).ok()?;
        match digits.len() {
            6 => Some(Self::rgb(value)),
            8 => Some(Self::rgba(value)),
            _ => None,
        }
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{:02x}{:02x}{:02x}", self.r, self.g, self.b)?;
        if self.a != 0xff {
            write!(f, "{:02x}", self.a)?;
        }
        Ok(())
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Stroke {
    pub color: Rgba,
    pub weight: f64,
    /// Dash pattern in the renderer's `"on off"` notation.
    pub dash: Option<&'static str>,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Fill {
    pub color: Rgba,
    pub opacity: f64,
    /// Diagonal stripes instead of a solid fill.
    pub hatched: bool,
}

/// Geodesic circle drawn around a point feature.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct Halo {
    pub radius_m: f64,
    pub stroke: Rgba,
    pub fill: Rgba,
    pub fill_opacity: f64,
}

#[derive(Debug, Copy, Clone, PartialEq, Default)]
pub struct FeatureStyle {
    pub stroke: Option<Stroke>,
    pub fill: Option<Fill>,
    /// Screen radius for point geometries drawn as circle markers.
    pub marker_radius: Option<f64>,
    pub halo: Option<Halo>,
}

impl FeatureStyle {
    pub fn stroke(mut self, color: Rgba, weight: f64) -> Self {
        self.stroke = Some(Stroke {
            color,
            weight,
            dash: None,
        });
        self
    }

    pub fn dashed(mut self, dash: &'static str) -> Self {
        if let Some(stroke) = self.stroke.as_mut() {
            stroke.dash = Some(dash);
        }
        self
    }

    pub fn fill(mut self, color: Rgba, opacity: f64) -> Self {
        self.fill = Some(Fill {
            color,
            opacity,
            hatched: false,
        });
        self
    }

    pub fn hatched(mut self) -> Self {
        if let Some(fill) = self.fill.as_mut() {
            fill.hatched = true;
        }
        self
    }

    pub fn marker(mut self, radius: f64) -> Self {
        self.marker_radius = Some(radius);
        self
    }

    pub fn halo(mut self, halo: Halo) -> Self {
        self.halo = Some(halo);
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyledFeature {
    pub feature: Feature,
    pub style: FeatureStyle,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct ClassificationBin {
    pub min: f64,
    pub max: f64,
    pub color: Rgba,
}

impl ClassificationBin {
    pub const fn new(min: f64, max: f64, color: Rgba) -> Self {
        Self { min, max, color }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SchemeError {
    #[error("classification scheme has no bins")]
    Empty,
    #[error("bin {index} has non-finite bounds")]
    NonFinite { index: usize },
    #[error("bin {index} is empty or inverted")]
    EmptyBin { index: usize },
    #[error("bin {index} does not start where the previous bin ends")]
    NotContiguous { index: usize },
}

/// Ordered, contiguous value ranges mapped to colours.
///
/// The last bin is open-ended upwards; values below the first bin, NaN and
/// missing values take the fallback colour.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassificationScheme {
    bins: Vec<ClassificationBin>,
    fallback: Rgba,
}

impl ClassificationScheme {
    pub fn new(bins: Vec<ClassificationBin>, fallback: Rgba) -> Result<Self, SchemeError> {
        if bins.is_empty() {
            return Err(SchemeError::Empty);
        }
        for (index, bin) in bins.iter().enumerate() {
            if !(bin.min.is_finite() && bin.max.is_finite()) {
                return Err(SchemeError::NonFinite { index });
            }
            if bin.min >= bin.max {
                return Err(SchemeError::EmptyBin { index });
            }
            if index > 0 && bins[index - 1].max != bin.min {
                return Err(SchemeError::NotContiguous { index });
            }
        }
        Ok(Self { bins, fallback })
    }

    pub fn bins(&self) -> &[ClassificationBin] {
        &self.bins
    }

    pub fn fallback(&self) -> Rgba {
        self.fallback
    }

    pub fn classify(&self, value: Option<f64>) -> Rgba {
        let Some(v) = value.filter(|v| !v.is_nan()) else {
            return self.fallback;
        };
        if let Some(bin) = self.bins.iter().find(|b| b.min <= v && v < b.max) {
            return bin.color;
        }
        match self.bins.last() {
            Some(last) if v >= last.min => last.color,
            _ => self.fallback,
        }
    }
}

pub const NO_DATA: Rgba = Rgba::rgb(0xcccccc);

/// Hours of shadow per cell.
pub const SHADOW_COUNT_BINS: [ClassificationBin; 5] = [
    ClassificationBin::new(2.0, 4.0, Rgba::rgb(0xd1d5db)),
    ClassificationBin::new(4.0, 6.0, Rgba::rgb(0x9ca3af)),
    ClassificationBin::new(6.0, 8.0, Rgba::rgb(0x6b7280)),
    ClassificationBin::new(8.0, 10.0, Rgba::rgb(0x4b5563)),
    ClassificationBin::new(10.0, 17.0, Rgba::rgb(0x111827)),
];

/// Annual irradiance in kWh/m².
pub const IRRADIANCE_BINS: [ClassificationBin; 5] = [
    ClassificationBin::new(0.0, 600.0, Rgba::rgb(0xfff7bc)),
    ClassificationBin::new(600.0, 900.0, Rgba::rgb(0xfee391)),
    ClassificationBin::new(900.0, 1200.0, Rgba::rgb(0xfec44f)),
    ClassificationBin::new(1200.0, 1500.0, Rgba::rgb(0xfe9929)),
    ClassificationBin::new(1500.0, 1800.0, Rgba::rgb(0xd95f0e)),
];

pub fn shadow_count_scheme() -> ClassificationScheme {
    ClassificationScheme {
        bins: SHADOW_COUNT_BINS.to_vec(),
        fallback: NO_DATA,
    }
}

pub fn irradiance_scheme() -> ClassificationScheme {
    ClassificationScheme {
        bins: IRRADIANCE_BINS.to_vec(),
        fallback: NO_DATA,
    }
}

pub const CERTIFICATE_UNKNOWN: Rgba = Rgba::rgb(0xbdbdbd);

/// Energy certificate letter colour; anything outside A–G is unknown.
pub fn certificate_color(letter: &str) -> Rgba {
    match letter.trim().to_ascii_uppercase().as_str() {
        "A" => Rgba::rgb(0x4caf50),
        "B" => Rgba::rgb(0x8bc34a),
        "C" => Rgba::rgb(0xcddc39),
        "D" => Rgba::rgb(0xffeb3b),
        "E" => Rgba::rgb(0xffc107),
        "F" => Rgba::rgb(0xff9800),
        "G" => Rgba::rgb(0xf44336),
        _ => CERTIFICATE_UNKNOWN,
    }
}

/// Circle-marker radius in pixels for point overlays at `zoom`.
pub fn point_radius_for_zoom(zoom: u8) -> f64 {
    (0.8 + (f64::from(zoom) - 15.0) * 1.1).clamp(1.6, 5.0)
}

/// Wide light line under the dashed municipal boundary.
pub fn boundary_casing_style() -> FeatureStyle {
    FeatureStyle::default().stroke(Rgba::rgb(0xffffff), 4.0)
}

pub fn boundary_dash_style() -> FeatureStyle {
    FeatureStyle::default()
        .stroke(Rgba::rgb(0xc5c5c5), 2.0)
        .dashed("6 6")
}

#[cfg(test)]
mod tests {
    use super::{
        ClassificationBin, ClassificationScheme, NO_DATA, Rgba, SHADOW_COUNT_BINS, SchemeError,
        certificate_color, point_radius_for_zoom, shadow_count_scheme,
    };

    #[test]
    fn shadow_bins_validate_and_classify() {
        let checked = ClassificationScheme::new(SHADOW_COUNT_BINS.to_vec(), NO_DATA).unwrap();
        assert_eq!(checked, shadow_count_scheme());

        let s = shadow_count_scheme();
        assert_eq!(s.classify(Some(2.0)), Rgba::rgb(0xd1d5db));
        assert_eq!(s.classify(Some(3.99)), Rgba::rgb(0xd1d5db));
        assert_eq!(s.classify(Some(4.0)), Rgba::rgb(0x9ca3af));
        assert_eq!(s.classify(Some(16.9)), Rgba::rgb(0x111827));
        // Open-ended upper bin.
        assert_eq!(s.classify(Some(24.0)), Rgba::rgb(0x111827));
        assert_eq!(s.classify(Some(1.0)), NO_DATA);
        assert_eq!(s.classify(Some(f64::NAN)), NO_DATA);
        assert_eq!(s.classify(None), NO_DATA);
    }

    #[test]
    fn rejects_gaps_and_inverted_bins() {
        let c = Rgba::rgb(0);
        assert_eq!(
            ClassificationScheme::new(vec![], c),
            Err(SchemeError::Empty)
        );
        assert_eq!(
            ClassificationScheme::new(
                vec![
                    ClassificationBin::new(0.0, 1.0, c),
                    ClassificationBin::new(2.0, 3.0, c)
                ],
                c
            ),
            Err(SchemeError::NotContiguous { index: 1 })
        );
        assert_eq!(
            ClassificationScheme::new(vec![ClassificationBin::new(1.0, 1.0, c)], c),
            Err(SchemeError::EmptyBin { index: 0 })
        );
    }

    #[test]
    fn hex_round_trip_and_certificates() {
        assert_eq!(Rgba::parse_hex("#00000025"), Some(Rgba::rgba(0x00000025)));
        assert_eq!(Rgba::parse_hex("#ff564d").map(|c| c.to_string()).as_deref(), Some("#ff564d"));
        assert_eq!(Rgba::parse_hex("ff564d"), None);
        assert_eq!(certificate_color("c"), Rgba::rgb(0xcddc39));
        assert_eq!(certificate_color(""), Rgba::rgb(0xbdbdbd));
    }

    #[test]
    fn point_radius_is_clamped() {
        assert_eq!(point_radius_for_zoom(14), 1.6);
        assert!((point_radius_for_zoom(17) - 3.0).abs() < 1e-9);
        assert_eq!(point_radius_for_zoom(19), 5.0);
    }
}
