use foundation::BoundingBox;
use serde_json::{Map, Value};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GeoPoint {
    pub lon_deg: f64,
    pub lat_deg: f64,
}

impl GeoPoint {
    pub fn new(lon_deg: f64, lat_deg: f64) -> Self {
        Self { lon_deg, lat_deg }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GeometryKind {
    Point,
    MultiPoint,
    LineString,
    MultiLineString,
    Polygon,
    MultiPolygon,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Geometry {
    Point(GeoPoint),
    MultiPoint(Vec<GeoPoint>),
    LineString(Vec<GeoPoint>),
    MultiLineString(Vec<Vec<GeoPoint>>),
    Polygon(Vec<Vec<GeoPoint>>),
    MultiPolygon(Vec<Vec<Vec<GeoPoint>>>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub id: Option<String>,
    pub properties: Map<String, Value>,
    /// `None` when the source carried `"geometry": null`.
    pub geometry: Option<Geometry>,
}

/// Ordered GeoJSON feature collection; order is the source order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureCollection {
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum FeatureParseError {
    #[error("JSON parse error: {0}")]
    Json(String),
    #[error("expected GeoJSON FeatureCollection")]
    NotAFeatureCollection,
    #[error("expected GeoJSON Feature: {0}")]
    NotAFeature(String),
    #[error("invalid feature at index {index}: {reason}")]
    InvalidFeature { index: usize, reason: String },
    #[error("invalid geometry: {0}")]
    InvalidGeometry(String),
}

impl Geometry {
    pub fn kind(&self) -> GeometryKind {
        match self {
            Geometry::Point(_) => GeometryKind::Point,
            Geometry::MultiPoint(_) => GeometryKind::MultiPoint,
            Geometry::LineString(_) => GeometryKind::LineString,
            Geometry::MultiLineString(_) => GeometryKind::MultiLineString,
            Geometry::Polygon(_) => GeometryKind::Polygon,
            Geometry::MultiPolygon(_) => GeometryKind::MultiPolygon,
        }
    }

    pub fn as_point(&self) -> Option<GeoPoint> {
        match self {
            Geometry::Point(p) => Some(*p),
            _ => None,
        }
    }

    /// Every vertex of the geometry, in storage order.
    pub fn positions(&self) -> Vec<GeoPoint> {
        match self {
            Geometry::Point(p) => vec![*p],
            Geometry::MultiPoint(ps) | Geometry::LineString(ps) => ps.clone(),
            Geometry::MultiLineString(lines) | Geometry::Polygon(lines) => {
                lines.iter().flatten().copied().collect()
            }
            Geometry::MultiPolygon(polys) => polys.iter().flatten().flatten().copied().collect(),
        }
    }

    /// A geometry with no vertices (or only empty rings) cannot be highlighted or
    /// sent to zonal endpoints.
    pub fn is_empty(&self) -> bool {
        match self {
            Geometry::Point(p) => !(p.lon_deg.is_finite() && p.lat_deg.is_finite()),
            _ => self.positions().is_empty(),
        }
    }

    /// Bounding box of all vertices; `None` for points and other zero-area shapes.
    pub fn bounds(&self) -> Option<BoundingBox> {
        BoundingBox::from_points(self.positions().into_iter().map(|p| (p.lon_deg, p.lat_deg)))
    }

    pub fn to_geojson_value(&self) -> Value {
        let mut obj = Map::new();
        let (ty, coords) = match self {
            Geometry::Point(p) => ("Point", point_coords(p)),
            Geometry::MultiPoint(ps) => ("MultiPoint", points_coords(ps)),
            Geometry::LineString(ps) => ("LineString", points_coords(ps)),
            Geometry::MultiLineString(lines) => ("MultiLineString", rings_coords(lines)),
            Geometry::Polygon(rings) => ("Polygon", rings_coords(rings)),
            Geometry::MultiPolygon(polys) => (
                "MultiPolygon",
                Value::Array(polys.iter().map(|rings| rings_coords(rings)).collect()),
            ),
        };
        obj.insert("type".to_string(), Value::String(ty.to_string()));
        obj.insert("coordinates".to_string(), coords);
        Value::Object(obj)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, FeatureParseError> {
        parse_geometry(value).map_err(FeatureParseError::InvalidGeometry)
    }
}

impl Feature {
    pub fn new(geometry: Option<Geometry>) -> Self {
        Self {
            id: None,
            properties: Map::new(),
            geometry,
        }
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Numeric attribute; numeric strings are accepted as the backend is not consistent.
    pub fn property_f64(&self, key: &str) -> Option<f64> {
        match self.properties.get(key)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// Geometry that can actually be drawn or measured.
    pub fn usable_geometry(&self) -> Option<&Geometry> {
        self.geometry.as_ref().filter(|g| !g.is_empty())
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, FeatureParseError> {
        parse_feature(value, GeometryPolicy::Strict).map_err(FeatureParseError::NotAFeature)
    }

    pub fn to_geojson_value(&self) -> Value {
        let mut fobj = Map::new();
        fobj.insert("type".to_string(), Value::String("Feature".to_string()));
        if let Some(id) = &self.id {
            fobj.insert("id".to_string(), Value::String(id.clone()));
        }
        fobj.insert(
            "properties".to_string(),
            Value::Object(self.properties.clone()),
        );
        fobj.insert(
            "geometry".to_string(),
            self.geometry
                .as_ref()
                .map(Geometry::to_geojson_value)
                .unwrap_or(Value::Null),
        );
        Value::Object(fobj)
    }
}

impl FeatureCollection {
    pub fn new(features: Vec<Feature>) -> Self {
        Self { features }
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }

    pub fn from_geojson_str(payload: &str) -> Result<Self, FeatureParseError> {
        let value: Value =
            serde_json::from_str(payload).map_err(|e| FeatureParseError::Json(e.to_string()))?;
        Self::from_geojson_value(&value)
    }

    pub fn from_geojson_value(value: &Value) -> Result<Self, FeatureParseError> {
        let obj = value
            .as_object()
            .ok_or(FeatureParseError::NotAFeatureCollection)?;
        let ty = obj
            .get("type")
            .and_then(|v| v.as_str())
            .ok_or(FeatureParseError::NotAFeatureCollection)?;
        if ty != "FeatureCollection" {
            return Err(FeatureParseError::NotAFeatureCollection);
        }

        // A collection without a features member is treated as empty.
        let Some(features_val) = obj.get("features").and_then(|v| v.as_array()) else {
            return Ok(Self::default());
        };

        let mut features = Vec::with_capacity(features_val.len());
        for (index, feat_val) in features_val.iter().enumerate() {
            let feature = parse_feature(feat_val, GeometryPolicy::DropInvalid(index))
                .map_err(|reason| FeatureParseError::InvalidFeature { index, reason })?;
            features.push(feature);
        }

        Ok(Self { features })
    }

    pub fn to_geojson_value(&self) -> Value {
        let mut root = Map::new();
        root.insert(
            "type".to_string(),
            Value::String("FeatureCollection".to_string()),
        );
        root.insert(
            "features".to_string(),
            Value::Array(self.features.iter().map(Feature::to_geojson_value).collect()),
        );
        Value::Object(root)
    }
}

/// What a bad `geometry` member does to the feature carrying it.
#[derive(Debug, Copy, Clone)]
enum GeometryPolicy {
    Strict,
    /// Keep the feature without geometry; the value is its index in the collection.
    DropInvalid(usize),
}

fn parse_feature(value: &Value, policy: GeometryPolicy) -> Result<Feature, String> {
    let feat_obj = value
        .as_object()
        .ok_or("feature must be an object".to_string())?;

    let feat_type = feat_obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("feature missing type".to_string())?;
    if feat_type != "Feature" {
        return Err(format!("unexpected feature type: {feat_type}"));
    }

    let id = match feat_obj.get("id") {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    };

    let properties = feat_obj
        .get("properties")
        .and_then(|v| v.as_object())
        .cloned()
        .unwrap_or_default();

    let geometry = match feat_obj.get("geometry") {
        None | Some(Value::Null) => None,
        Some(g) => match (parse_geometry(g), policy) {
            (Ok(geometry), _) => Some(geometry),
            (Err(reason), GeometryPolicy::Strict) => return Err(reason),
            (Err(reason), GeometryPolicy::DropInvalid(index)) => {
                debug!(index, %reason, "feature geometry unreadable; kept without geometry");
                None
            }
        },
    };

    Ok(Feature {
        id,
        properties,
        geometry,
    })
}

fn point_coords(p: &GeoPoint) -> Value {
    Value::Array(vec![Value::from(p.lon_deg), Value::from(p.lat_deg)])
}

fn points_coords(ps: &[GeoPoint]) -> Value {
    Value::Array(ps.iter().map(point_coords).collect())
}

fn rings_coords(rings: &[Vec<GeoPoint>]) -> Value {
    Value::Array(rings.iter().map(|ring| points_coords(ring)).collect())
}

fn parse_geometry(value: &Value) -> Result<Geometry, String> {
    let obj = value
        .as_object()
        .ok_or("geometry must be an object".to_string())?;
    let ty = obj
        .get("type")
        .and_then(|v| v.as_str())
        .ok_or("geometry missing type".to_string())?;

    let coords = obj
        .get("coordinates")
        .ok_or("geometry missing coordinates".to_string())?;

    match ty {
        "Point" => Ok(Geometry::Point(parse_point(coords)?)),
        "MultiPoint" => Ok(Geometry::MultiPoint(parse_points(coords)?)),
        "LineString" => Ok(Geometry::LineString(parse_points(coords)?)),
        "MultiLineString" => Ok(Geometry::MultiLineString(parse_rings(coords)?)),
        "Polygon" => Ok(Geometry::Polygon(parse_rings(coords)?)),
        "MultiPolygon" => {
            let polys = coords
                .as_array()
                .ok_or("MultiPolygon coordinates must be an array of polygons".to_string())?;
            polys
                .iter()
                .map(parse_rings)
                .collect::<Result<Vec<_>, _>>()
                .map(Geometry::MultiPolygon)
        }
        other => Err(format!("unsupported geometry type: {other}")),
    }
}

fn parse_point(coords: &Value) -> Result<GeoPoint, String> {
    let arr = coords
        .as_array()
        .ok_or("Point coordinates must be an array".to_string())?;
    if arr.len() < 2 {
        return Err("Point coordinates must have [lon, lat]".to_string());
    }
    let lon = arr[0]
        .as_f64()
        .ok_or("Point lon must be a number".to_string())?;
    let lat = arr[1]
        .as_f64()
        .ok_or("Point lat must be a number".to_string())?;
    Ok(GeoPoint::new(lon, lat))
}

fn parse_points(coords: &Value) -> Result<Vec<GeoPoint>, String> {
    let arr = coords
        .as_array()
        .ok_or("coordinates must be an array".to_string())?;
    arr.iter().map(parse_point).collect()
}

fn parse_rings(coords: &Value) -> Result<Vec<Vec<GeoPoint>>, String> {
    let rings = coords
        .as_array()
        .ok_or("coordinates must be an array of rings".to_string())?;
    rings.iter().map(parse_points).collect()
}
