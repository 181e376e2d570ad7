use formats::{Feature, FeatureParseError};
use serde::Deserialize;
use serde_json::{Map, Value};

/// Aggregate over the raster cells intersecting a zone.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ZonalSummary {
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub avg: Option<f64>,
    #[serde(default)]
    pub min: Option<f64>,
    #[serde(default)]
    pub max: Option<f64>,
}

/// One energy community or shared self-consumption scheme covering a building.
#[derive(Debug, Clone, PartialEq)]
pub struct CelsHit {
    pub id: Option<String>,
    pub name: Option<String>,
    pub reference: Option<String>,
    pub street: Option<String>,
    pub number: Option<String>,
    /// `true` for a CEL, `false` for shared self-consumption.
    pub is_cel: bool,
    /// Occupancy in percent; ratios in `(0, 1]` are scaled up.
    pub occupancy_pct: Option<f64>,
    pub distance_m: Option<f64>,
}

const OCCUPANCY_KEYS: [&str; 5] = [
    "por_ocupacion",
    "por_ocupacion_pct",
    "por_ocup",
    "occupancy_pct",
    "occupancy",
];

impl CelsHit {
    /// Accepts either a flat record or a GeoJSON feature carrying it in `properties`.
    pub fn from_value(value: &Value) -> Option<Self> {
        let outer = value.as_object()?;
        let props = outer
            .get("properties")
            .and_then(Value::as_object)
            .unwrap_or(outer);

        let mut occupancy_pct = OCCUPANCY_KEYS
            .iter()
            .find_map(|k| props.get(*k).and_then(number));
        if let Some(occ) = occupancy_pct
            && occ > 0.0
            && occ <= 1.0
        {
            occupancy_pct = Some(occ * 100.0);
        }

        Some(Self {
            id: props.get("id").and_then(text),
            name: props.get("nombre").and_then(text),
            reference: props.get("reference").and_then(text),
            street: ["street_norm", "street", "calle"]
                .iter()
                .find_map(|k| props.get(*k).and_then(text)),
            number: ["number_norm", "numero"]
                .iter()
                .find_map(|k| props.get(*k).and_then(text)),
            is_cel: props.get("auto_CEL").and_then(number) == Some(1.0),
            occupancy_pct,
            distance_m: props
                .get("distance_m")
                .or_else(|| outer.get("distance_m"))
                .and_then(number),
        })
    }

    /// A community with free capacity can still be joined.
    pub fn can_join(&self) -> bool {
        self.occupancy_pct.is_some_and(|occ| occ < 100.0)
    }

    /// Parses the hit list from any of the envelope shapes the backend returns.
    pub fn list_from_value(value: &Value) -> Vec<Self> {
        let items: &[Value] = match value {
            Value::Array(items) => items.as_slice(),
            Value::Object(obj) => ["hits", "results", "features", "items"]
                .iter()
                .find_map(|k| obj.get(*k).and_then(Value::as_array))
                .map(Vec::as_slice)
                .unwrap_or_default(),
            _ => &[],
        };
        items.iter().filter_map(Self::from_value).collect()
    }
}

/// Per-building solar and energy indicators keyed by backend column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BuildingMetrics(pub Map<String, Value>);

impl BuildingMetrics {
    pub fn get_f64(&self, key: &str) -> Option<f64> {
        self.0.get(key).and_then(number)
    }

    pub fn mean_irradiance(&self) -> Option<f64> {
        self.get_f64("irr_mean_kWhm2_y")
            .or_else(|| self.get_f64("irr_average"))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Result of resolving an address or cadastral reference.
#[derive(Debug, Clone, PartialEq)]
pub struct AddressLookup {
    pub reference: Option<String>,
    pub feature: Option<Feature>,
}

impl AddressLookup {
    /// `{reference, feature}` envelope, or a bare GeoJSON feature.
    pub fn from_value(value: &Value) -> Result<Self, FeatureParseError> {
        if value.get("type").and_then(Value::as_str) == Some("Feature") {
            let feature = Feature::from_geojson_value(value)?;
            let reference = feature.property_str("reference");
            return Ok(Self {
                reference,
                feature: Some(feature),
            });
        }
        let feature = match value.get("feature") {
            None | Some(Value::Null) => None,
            Some(f) => Some(Feature::from_geojson_value(f)?),
        };
        let reference = value
            .get("reference")
            .or_else(|| value.get("refcat"))
            .and_then(text)
            .or_else(|| feature.as_ref().and_then(|f| f.property_str("reference")));
        Ok(Self { reference, feature })
    }
}

fn number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}
