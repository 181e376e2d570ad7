use std::fmt;
use std::str::FromStr;

use foundation::BoundingBox;
use serde::{Deserialize, Serialize};

/// Bbox-filtered GeoJSON endpoints behind the map overlays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Endpoint {
    BuildingFeatures,
    BuildingCertificates,
    BuildingIrradiance,
    ShadowFeatures,
    IrradianceFeatures,
    CelsFeatures,
}

impl Endpoint {
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::BuildingFeatures => "/buildings/features",
            Endpoint::BuildingCertificates => "/buildings/certificates",
            Endpoint::BuildingIrradiance => "/buildings/irradiance",
            Endpoint::ShadowFeatures => "/shadows/features",
            Endpoint::IrradianceFeatures => "/irradiance/features",
            Endpoint::CelsFeatures => "/cels/features",
        }
    }
}

/// Which rating the certificate overlay colours buildings by.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CertificateMode {
    /// Non-renewable primary energy rating.
    #[default]
    NoRenov,
    Co2,
}

impl CertificateMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            CertificateMode::NoRenov => "norenov",
            CertificateMode::Co2 => "co2",
        }
    }

    /// Property holding the letter, and the one flagging it as estimated.
    pub fn property_keys(&self) -> (&'static str, &'static str) {
        match self {
            CertificateMode::NoRenov => ("cal_norenov", "cal_norenov_es_estimado"),
            CertificateMode::Co2 => ("certificadoCO2", "certificadoCO2_es_estimado"),
        }
    }
}

impl fmt::Display for CertificateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for CertificateMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "norenov" | "cal" => Ok(CertificateMode::NoRenov),
            "co2" => Ok(CertificateMode::Co2),
            other => Err(format!("unknown certificate mode: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FeatureQuery {
    pub endpoint: Endpoint,
    pub bbox: BoundingBox,
    pub mode: Option<CertificateMode>,
    pub limit: u32,
    pub offset: u32,
}

impl FeatureQuery {
    pub fn new(endpoint: Endpoint, bbox: BoundingBox, limit: u32) -> Self {
        Self {
            endpoint,
            bbox,
            mode: None,
            limit,
            offset: 0,
        }
    }

    pub fn with_mode(mut self, mode: Option<CertificateMode>) -> Self {
        self.mode = mode;
        self
    }

    /// Query string pairs in the order the backend documents them.
    pub fn query_pairs(&self) -> Vec<(&'static str, String)> {
        let mut pairs = vec![("bbox", self.bbox.to_query_string())];
        if let Some(mode) = self.mode {
            pairs.push(("mode", mode.as_str().to_string()));
        }
        pairs.push(("limit", self.limit.to_string()));
        pairs.push(("offset", self.offset.to_string()));
        pairs
    }
}

/// Raster-backed zonal statistics endpoints.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ZonalTarget {
    Shadows,
    Irradiance,
}

impl ZonalTarget {
    pub fn path(&self) -> &'static str {
        match self {
            ZonalTarget::Shadows => "/shadows/zonal",
            ZonalTarget::Irradiance => "/irradiance/zonal",
        }
    }
}

pub const CELS_WITHIN_DYNAMIC_PATH: &str = "/cels/within_dynamic";
pub const CELS_WITHIN_PATH: &str = "/cels/within";
pub const BUILDING_METRICS_PATH: &str = "/buildings/metrics";
pub const BUILDING_BY_REF_PATH: &str = "/buildings/by_ref";
pub const ADDRESS_LOOKUP_PATH: &str = "/address/lookup";
pub const CADASTRE_FEATURE_PATH: &str = "/cadastre/feature";
pub const DATASET_BUNDLE_PATH: &str = "/visor_emsv";

/// Radius used by the static CELS membership query, in metres.
pub const CELS_FALLBACK_RADIUS_M: f64 = 1000.0;

#[derive(Debug, Clone, Serialize)]
pub struct GeometryBody<'a> {
    pub geometry: &'a serde_json::Value,
}
