#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use foundation::BoundingBox;
use layers::PipelineTuning;
use runtime::BatchPlan;
use serde_json::{Value, json};
use viewer::{Environment, ViewerConfig};

/// One request as the fake backend saw it.
#[derive(Debug, Clone)]
pub struct Hit {
    pub path: &'static str,
    pub query: HashMap<String, String>,
    pub body: Option<Value>,
}

#[derive(Default)]
struct Inner {
    hits: Mutex<Vec<Hit>>,
    points: AtomicUsize,
    delay_ms: AtomicU64,
    statuses: Mutex<HashMap<&'static str, u16>>,
}

/// In-process stand-in for the viewer backend and the dataset server.
#[derive(Clone, Default)]
pub struct Backend {
    inner: Arc<Inner>,
}

impl Backend {
    pub fn with_points(points: usize) -> Self {
        let backend = Self::default();
        backend.set_points(points);
        backend
    }

    pub fn set_points(&self, points: usize) {
        self.inner.points.store(points, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        self.inner
            .delay_ms
            .store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    /// Answers `path` with a bare status code from now on.
    pub fn fail(&self, path: &'static str, status: u16) {
        self.inner.statuses.lock().unwrap().insert(path, status);
    }

    pub fn hits(&self, path: &str) -> Vec<Hit> {
        self.inner
            .hits
            .lock()
            .unwrap()
            .iter()
            .filter(|h| h.path == path)
            .cloned()
            .collect()
    }

    fn record(
        &self,
        path: &'static str,
        query: HashMap<String, String>,
        body: Option<Value>,
    ) -> Option<StatusCode> {
        self.inner.hits.lock().unwrap().push(Hit { path, query, body });
        self.inner
            .statuses
            .lock()
            .unwrap()
            .get(path)
            .and_then(|s| StatusCode::from_u16(*s).ok())
    }

    async fn pause(&self) {
        let ms = self.inner.delay_ms.load(Ordering::SeqCst);
        if ms > 0 {
            tokio::time::sleep(Duration::from_millis(ms)).await;
        }
    }

    fn points_in(&self, query: &HashMap<String, String>) -> Value {
        let (lon, lat) = query
            .get("bbox")
            .and_then(|b| b.parse::<BoundingBox>().ok())
            .map_or((-3.725, 40.305), |b| b.center());
        let count = self.inner.points.load(Ordering::SeqCst);
        let features: Vec<Value> = (0..count)
            .map(|i| {
                json!({
                    "type": "Feature",
                    "properties": { "shadow_count": i % 10, "i": i },
                    "geometry": { "type": "Point", "coordinates": [lon, lat] }
                })
            })
            .collect();
        json!({ "type": "FeatureCollection", "features": features })
    }
}

type Params = Query<HashMap<String, String>>;

pub async fn spawn_backend(backend: Backend) -> SocketAddr {
    let app = Router::new()
        .route("/shadows/features", get(shadow_features))
        .route("/irradiance/features", get(irradiance_features))
        .route("/buildings/features", get(building_features))
        .route("/buildings/certificates", get(certificate_features))
        .route("/shadows/zonal", post(shadows_zonal))
        .route("/irradiance/zonal", post(irradiance_zonal))
        .route("/cels/within_dynamic", post(cels_within_dynamic))
        .route("/cels/within", post(cels_within))
        .route("/buildings/metrics", get(building_metrics))
        .route("/buildings/by_ref", get(building_by_ref))
        .route("/cadastre/feature", get(cadastre_feature))
        .route("/address/lookup", get(address_lookup))
        .route("/api/visor_emsv", get(dataset_bundle))
        .with_state(backend);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

pub fn config(addr: SocketAddr) -> ViewerConfig {
    let mut config = ViewerConfig::for_environment(Environment::Dev);
    config.api_base = format!("http://{addr}");
    config.dataset_base = format!("http://{addr}/api");
    config.request_timeout = Duration::from_secs(5);
    config.pipeline = PipelineTuning {
        batch: BatchPlan::new(2000, Duration::from_millis(2)),
        debounce: Duration::from_millis(20),
        ..PipelineTuning::default()
    };
    config
}

pub fn bbox(w: f64, s: f64, e: f64, n: f64) -> BoundingBox {
    BoundingBox::new(w, s, e, n).unwrap()
}

pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !condition() {
        assert!(Instant::now() < deadline, "condition not reached in time");
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

async fn shadow_features(State(b): State<Backend>, Query(q): Params) -> Response {
    collection(b, "/shadows/features", q).await
}

async fn irradiance_features(State(b): State<Backend>, Query(q): Params) -> Response {
    collection(b, "/irradiance/features", q).await
}

async fn building_features(State(b): State<Backend>, Query(q): Params) -> Response {
    collection(b, "/buildings/features", q).await
}

async fn certificate_features(State(b): State<Backend>, Query(q): Params) -> Response {
    collection(b, "/buildings/certificates", q).await
}

async fn collection(b: Backend, path: &'static str, q: HashMap<String, String>) -> Response {
    let status = b.record(path, q.clone(), None);
    b.pause().await;
    if let Some(status) = status {
        return status.into_response();
    }
    Json(b.points_in(&q)).into_response()
}

async fn shadows_zonal(State(b): State<Backend>, Json(body): Json<Value>) -> Response {
    zonal(b, "/shadows/zonal", body, json!({"count": 12, "avg": 3.5, "min": 1, "max": 7}))
}

async fn irradiance_zonal(State(b): State<Backend>, Json(body): Json<Value>) -> Response {
    zonal(
        b,
        "/irradiance/zonal",
        body,
        json!({"count": 12, "avg": 1480.2, "min": 900.0, "max": 1700.5}),
    )
}

fn zonal(b: Backend, path: &'static str, body: Value, answer: Value) -> Response {
    match b.record(path, HashMap::new(), Some(body)) {
        Some(status) => status.into_response(),
        None => Json(answer).into_response(),
    }
}

fn cels_hits() -> Value {
    json!({"hits": [{
        "id": "cel-7",
        "nombre": "CEL Getafe Norte",
        "auto_CEL": 1,
        "por_ocupacion": 0.4,
        "distance_m": 120.5
    }]})
}

async fn cels_within_dynamic(State(b): State<Backend>, Json(body): Json<Value>) -> Response {
    match b.record("/cels/within_dynamic", HashMap::new(), Some(body)) {
        Some(status) => status.into_response(),
        None => Json(cels_hits()).into_response(),
    }
}

async fn cels_within(
    State(b): State<Backend>,
    Query(q): Params,
    Json(body): Json<Value>,
) -> Response {
    match b.record("/cels/within", q, Some(body)) {
        Some(status) => status.into_response(),
        None => Json(cels_hits()).into_response(),
    }
}

async fn building_metrics(State(b): State<Backend>, Query(q): Params) -> Response {
    let reference = q.get("reference").cloned().unwrap_or_default();
    if let Some(status) = b.record("/buildings/metrics", q, None) {
        return status.into_response();
    }
    if reference == "1234501AB" {
        return (StatusCode::NOT_FOUND, Json(json!({"detail": "not found"}))).into_response();
    }
    Json(json!({"reference": reference, "irr_mean_kWhm2_y": 1320.5})).into_response()
}

fn building(reference: &str) -> Value {
    json!({
        "type": "Feature",
        "properties": { "reference": reference },
        "geometry": {
            "type": "Polygon",
            "coordinates": [[
                [-3.7301, 40.3001], [-3.7295, 40.3001], [-3.7295, 40.3006],
                [-3.7301, 40.3006], [-3.7301, 40.3001]
            ]]
        }
    })
}

async fn building_by_ref(State(b): State<Backend>, Query(q): Params) -> Response {
    let reference = q.get("ref").cloned().unwrap_or_default();
    match b.record("/buildings/by_ref", q, None) {
        Some(status) => status.into_response(),
        None => Json(building(&reference)).into_response(),
    }
}

async fn cadastre_feature(State(b): State<Backend>, Query(q): Params) -> Response {
    let refcat = q.get("refcat").cloned().unwrap_or_default();
    match b.record("/cadastre/feature", q, None) {
        Some(status) => status.into_response(),
        None => Json(json!({"refcat": refcat, "feature": building(&refcat)})).into_response(),
    }
}

async fn address_lookup(State(b): State<Backend>, Query(q): Params) -> Response {
    match b.record("/address/lookup", q, None) {
        Some(status) => status.into_response(),
        None => Json(json!({"reference": "9999999ZZ", "feature": building("9999999ZZ")}))
            .into_response(),
    }
}

async fn dataset_bundle(State(b): State<Backend>) -> Response {
    if let Some(status) = b.record("/api/visor_emsv", HashMap::new(), None) {
        return status.into_response();
    }
    Json(json!({
        "geo_limites_getafe_emsv": {
            "type": "FeatureCollection",
            "features": [{
                "type": "Feature",
                "properties": { "name": "Getafe" },
                "geometry": {
                    "type": "LineString",
                    "coordinates": [[-3.766, 40.279], [-3.646, 40.279], [-3.646, 40.338]]
                }
            }]
        },
        "geo_emsv_parcela_con_vivienda": { "type": "FeatureCollection", "features": [] },
        "geo_emsv_parcela_sin_vivienda": null,
        "json_emsv_calle_num_reference": {
            "Calle Madrid": { "10": "1111111AA", "12": "1234501AB" },
            "Avenida de Ángel": { "1": "4444444DD" }
        }
    }))
    .into_response()
}
