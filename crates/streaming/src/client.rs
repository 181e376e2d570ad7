use std::future::Future;
use std::time::{Duration, Instant};

use formats::{Feature, FeatureCollection};
use runtime::{CancellationToken, run_or_cancel};
use serde_json::Value;
use tracing::debug;

use crate::error::FetchError;
use crate::request::{
    ADDRESS_LOOKUP_PATH, BUILDING_BY_REF_PATH, BUILDING_METRICS_PATH, CADASTRE_FEATURE_PATH,
    CELS_WITHIN_DYNAMIC_PATH, CELS_WITHIN_PATH, DATASET_BUNDLE_PATH, FeatureQuery, GeometryBody,
    ZonalTarget,
};
use crate::response::{AddressLookup, BuildingMetrics, CelsHit, ZonalSummary};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(20);

const USER_AGENT: &str = concat!("emsv-viewer/", env!("CARGO_PKG_VERSION"));

/// Bbox-filtered GeoJSON collections for the map overlays.
///
/// Implementations must resolve to `FetchError::Cancelled` as soon as `token`
/// fires; the futures are polled on a single-threaded local task set.
pub trait FeatureSource {
    fn fetch_features(
        &self,
        query: &FeatureQuery,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<FeatureCollection, FetchError>>;
}

/// Per-selection aggregate endpoints. `geometry` is a GeoJSON geometry object.
pub trait StatsSource {
    fn zonal(
        &self,
        target: ZonalTarget,
        geometry: &Value,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<ZonalSummary, FetchError>>;

    fn cels_within_dynamic(
        &self,
        geometry: &Value,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<CelsHit>, FetchError>>;

    fn cels_within(
        &self,
        geometry: &Value,
        radius_m: f64,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<Vec<CelsHit>, FetchError>>;

    fn building_metrics(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<BuildingMetrics, FetchError>>;
}

/// Address and cadastral reference resolution.
pub trait LookupSource {
    fn cadastre_feature(
        &self,
        refcat: &str,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<AddressLookup, FetchError>>;

    fn address_lookup(
        &self,
        street: &str,
        number: &str,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<AddressLookup, FetchError>>;

    fn building_by_ref(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<Feature, FetchError>>;

    /// Raw base dataset bundle (boundaries plus the street index).
    fn dataset_bundle(
        &self,
        token: &CancellationToken,
    ) -> impl Future<Output = Result<Value, FetchError>>;
}

/// HTTP client for the viewer backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    api_base: String,
    dataset_base: String,
}

impl ApiClient {
    pub fn new(
        api_base: impl Into<String>,
        dataset_base: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, FetchError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| FetchError::Transport(format!("failed to create HTTP client: {e}")))?;
        Ok(Self {
            http,
            api_base: trim_base(api_base.into()),
            dataset_base: trim_base(dataset_base.into()),
        })
    }

    pub fn api_base(&self) -> &str {
        &self.api_base
    }

    fn api_url(&self, path: &str) -> String {
        format!("{}{}", self.api_base, path)
    }

    async fn get_json(
        &self,
        url: String,
        query: &[(&str, String)],
        token: &CancellationToken,
    ) -> Result<Value, FetchError> {
        self.execute(self.http.get(&url).query(query), &url, token)
            .await
    }

    async fn post_json(
        &self,
        url: String,
        query: &[(&str, String)],
        geometry: &Value,
        token: &CancellationToken,
    ) -> Result<Value, FetchError> {
        let request = self
            .http
            .post(&url)
            .query(query)
            .json(&GeometryBody { geometry });
        self.execute(request, &url, token).await
    }

    async fn execute(
        &self,
        request: reqwest::RequestBuilder,
        url: &str,
        token: &CancellationToken,
    ) -> Result<Value, FetchError> {
        let started = Instant::now();
        let body = run_or_cancel(token, async {
            let resp = request.send().await?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::from_status(status.as_u16()));
            }
            Ok::<_, FetchError>(resp.text().await?)
        })
        .await??;
        debug!(
            url,
            bytes = body.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "backend response"
        );
        Ok(serde_json::from_str(&body)?)
    }
}

fn trim_base(base: String) -> String {
    base.trim_end_matches('/').to_string()
}

impl FeatureSource for ApiClient {
    async fn fetch_features(
        &self,
        query: &FeatureQuery,
        token: &CancellationToken,
    ) -> Result<FeatureCollection, FetchError> {
        let value = self
            .get_json(self.api_url(query.endpoint.path()), &query.query_pairs(), token)
            .await?;
        Ok(FeatureCollection::from_geojson_value(&value)?)
    }
}

impl StatsSource for ApiClient {
    async fn zonal(
        &self,
        target: ZonalTarget,
        geometry: &Value,
        token: &CancellationToken,
    ) -> Result<ZonalSummary, FetchError> {
        let value = self
            .post_json(self.api_url(target.path()), &[], geometry, token)
            .await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn cels_within_dynamic(
        &self,
        geometry: &Value,
        token: &CancellationToken,
    ) -> Result<Vec<CelsHit>, FetchError> {
        let value = self
            .post_json(self.api_url(CELS_WITHIN_DYNAMIC_PATH), &[], geometry, token)
            .await?;
        Ok(CelsHit::list_from_value(&value))
    }

    async fn cels_within(
        &self,
        geometry: &Value,
        radius_m: f64,
        token: &CancellationToken,
    ) -> Result<Vec<CelsHit>, FetchError> {
        let query = [("radius_m", radius_m.to_string())];
        let value = self
            .post_json(self.api_url(CELS_WITHIN_PATH), &query, geometry, token)
            .await?;
        Ok(CelsHit::list_from_value(&value))
    }

    async fn building_metrics(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> Result<BuildingMetrics, FetchError> {
        let query = [("reference", reference.to_string())];
        match self
            .get_json(self.api_url(BUILDING_METRICS_PATH), &query, token)
            .await?
        {
            Value::Object(map) => Ok(BuildingMetrics(map)),
            other => Err(FetchError::Decode(format!(
                "expected metrics object, got {other}"
            ))),
        }
    }
}

impl LookupSource for ApiClient {
    async fn cadastre_feature(
        &self,
        refcat: &str,
        token: &CancellationToken,
    ) -> Result<AddressLookup, FetchError> {
        let query = [
            ("refcat", refcat.to_string()),
            ("include_feature", "true".to_string()),
        ];
        let value = self
            .get_json(self.api_url(CADASTRE_FEATURE_PATH), &query, token)
            .await?;
        Ok(AddressLookup::from_value(&value)?)
    }

    async fn address_lookup(
        &self,
        street: &str,
        number: &str,
        token: &CancellationToken,
    ) -> Result<AddressLookup, FetchError> {
        let query = [
            ("street", street.to_string()),
            ("number", number.to_string()),
            ("include_feature", "true".to_string()),
        ];
        let value = self
            .get_json(self.api_url(ADDRESS_LOOKUP_PATH), &query, token)
            .await?;
        Ok(AddressLookup::from_value(&value)?)
    }

    async fn building_by_ref(
        &self,
        reference: &str,
        token: &CancellationToken,
    ) -> Result<Feature, FetchError> {
        let query = [("ref", reference.to_string())];
        let value = self
            .get_json(self.api_url(BUILDING_BY_REF_PATH), &query, token)
            .await?;
        Ok(Feature::from_geojson_value(&value)?)
    }

    async fn dataset_bundle(&self, token: &CancellationToken) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.dataset_base, DATASET_BUNDLE_PATH);
        self.get_json(url, &[], token).await
    }
}
