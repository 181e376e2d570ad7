use std::fmt;

use thiserror::Error;

/// Geographic bounding box in degrees, ordered `(west, south, east, north)`.
///
/// A box is an immutable value: every operation returns a new box.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BoundingBox {
    west: f64,
    south: f64,
    east: f64,
    north: f64,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BoundsError {
    #[error("bounding box has non-finite coordinates")]
    NonFinite,
    #[error("bounding box west ({west}) must be less than east ({east})")]
    InvertedLongitude { west: f64, east: f64 },
    #[error("bounding box south ({south}) must be less than north ({north})")]
    InvertedLatitude { south: f64, north: f64 },
    #[error("expected 4 comma separated numbers, got {0:?}")]
    Malformed(String),
}

impl BoundingBox {
    pub fn new(west: f64, south: f64, east: f64, north: f64) -> Result<Self, BoundsError> {
        if !(west.is_finite() && south.is_finite() && east.is_finite() && north.is_finite()) {
            return Err(BoundsError::NonFinite);
        }
        if west >= east {
            return Err(BoundsError::InvertedLongitude { west, east });
        }
        if south >= north {
            return Err(BoundsError::InvertedLatitude { south, north });
        }
        Ok(Self {
            west,
            south,
            east,
            north,
        })
    }

    /// Smallest box covering all `(lon, lat)` points, if they span a non-empty area.
    pub fn from_points<I>(points: I) -> Option<Self>
    where
        I: IntoIterator<Item = (f64, f64)>,
    {
        let mut acc: Option<[f64; 4]> = None;
        for (lon, lat) in points {
            let b = acc.get_or_insert([lon, lat, lon, lat]);
            b[0] = b[0].min(lon);
            b[1] = b[1].min(lat);
            b[2] = b[2].max(lon);
            b[3] = b[3].max(lat);
        }
        let [w, s, e, n] = acc?;
        Self::new(w, s, e, n).ok()
    }

    pub fn west(&self) -> f64 {
        self.west
    }

    pub fn south(&self) -> f64 {
        self.south
    }

    pub fn east(&self) -> f64 {
        self.east
    }

    pub fn north(&self) -> f64 {
        self.north
    }

    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    pub fn center(&self) -> (f64, f64) {
        (
            0.5 * (self.west + self.east),
            0.5 * (self.south + self.north),
        )
    }

    pub fn to_array(&self) -> [f64; 4] {
        [self.west, self.south, self.east, self.north]
    }

    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }

    pub fn union(&self, other: &Self) -> Self {
        Self {
            west: self.west.min(other.west),
            south: self.south.min(other.south),
            east: self.east.max(other.east),
            north: self.north.max(other.north),
        }
    }

    /// Expands every edge outward by `ratio` of the box width (west/east) or height
    /// (south/north). Negative ratios are clamped to zero.
    pub fn pad(&self, ratio: f64) -> Self {
        let ratio = ratio.max(0.0);
        let dx = self.width() * ratio;
        let dy = self.height() * ratio;
        Self {
            west: self.west - dx,
            south: self.south - dy,
            east: self.east + dx,
            north: self.north + dy,
        }
    }

    /// Largest edge displacement between `self` and `reference`, as a fraction of the
    /// reference extent along the same axis.
    ///
    /// West/east edges are measured against the reference width, south/north edges
    /// against the reference height.
    pub fn max_edge_displacement_ratio(&self, reference: &Self) -> f64 {
        let width = reference.width().max(1e-9);
        let height = reference.height().max(1e-9);
        let dw = (self.west - reference.west).abs() / width;
        let de = (self.east - reference.east).abs() / width;
        let ds = (self.south - reference.south).abs() / height;
        let dn = (self.north - reference.north).abs() / height;
        dw.max(de).max(ds).max(dn)
    }

    /// `west,south,east,north`, the form the backend accepts in `bbox=` parameters.
    pub fn to_query_string(&self) -> String {
        format!("{},{},{},{}", self.west, self.south, self.east, self.north)
    }
}

impl fmt::Display for BoundingBox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{:.6}, {:.6}, {:.6}, {:.6}]",
            self.west, self.south, self.east, self.north
        )
    }
}

impl std::str::FromStr for BoundingBox {
    type Err = BoundsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<f64> = s
            .split(',')
            .map(|p| p.trim().parse::<f64>())
            .collect::<Result<_, _>>()
            .map_err(|_| BoundsError::Malformed(s.to_string()))?;
        match parts.as_slice() {
            [w, so, e, n] => Self::new(*w, *so, *e, *n),
            _ => Err(BoundsError::Malformed(s.to_string())),
        }
    }
}
