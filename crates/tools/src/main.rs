use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use formats::{Feature, GeoPoint, Geometry};
use foundation::BoundingBox;
use layers::{HeadlessMap, OverlayKind, OverlayParams, OverlaySpec, SharedMap};
use runtime::{CancellationToken, EventKind, Journal};
use scene::{StatKind, StatSlot, StatValue, StatsAggregationClient};
use serde::Serialize;
use serde_json::{Value, json};
use streaming::{ApiClient, CertificateMode, LookupSource, OverlayPhase};
use tokio::task::LocalSet;
use tracing::debug;
use viewer::{AddressSearch, Decision, RequestCoordinator, ViewerConfig, Viewport};

/// Probes the EMSV viewer backend the way the map does, without a browser.
#[derive(Debug, Parser)]
#[command(name = "emsv", version)]
struct Cli {
    /// Viewer API base URL; defaults to the configured environment.
    #[arg(long, env = "EMSV_API_BASE", global = true)]
    api_base: Option<String>,

    /// Dataset server base URL.
    #[arg(long, env = "EMSV_DATASET_BASE", global = true)]
    dataset_base: Option<String>,

    /// Log filter used when `RUST_LOG` is unset.
    #[arg(long, env = "EMSV_LOG", default_value = "warn", global = true)]
    log: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Runs one fetch, stage and commit cycle for an overlay.
    Overlay {
        #[arg(long)]
        kind: OverlayKind,
        /// west,south,east,north in degrees.
        #[arg(long, allow_hyphen_values = true)]
        bbox: BoundingBox,
        #[arg(long)]
        zoom: u8,
        /// Certificate rating; ignored by the other overlays.
        #[arg(long)]
        mode: Option<CertificateMode>,
    },
    /// Resolves a street and number to a building.
    Search {
        #[arg(long)]
        street: String,
        #[arg(long)]
        number: String,
        /// Skip the base dataset and ask the address lookup directly.
        #[arg(long)]
        no_index: bool,
    },
    /// Computes the selection statistics for a building or a point.
    Stats {
        #[arg(long)]
        reference: Option<String>,
        #[arg(long, requires = "lat", allow_hyphen_values = true)]
        lon: Option<f64>,
        #[arg(long, requires = "lon", allow_hyphen_values = true)]
        lat: Option<f64>,
    },
}

#[derive(Debug, Serialize)]
struct OverlaySummary {
    overlay: &'static str,
    pane: &'static str,
    zoom: u8,
    phase: String,
    decision: String,
    bbox: Option<String>,
    features: usize,
    batches: usize,
    failures: usize,
}

fn main() {
    if let Err(e) = real_main() {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn real_main() -> Result<(), String> {
    let cli = Cli::parse();
    viewer::logging::init(&cli.log);

    let mut config = ViewerConfig::from_env().map_err(|e| e.to_string())?;
    if let Some(base) = cli.api_base {
        config.api_base = base;
    }
    if let Some(base) = cli.dataset_base {
        config.dataset_base = base;
    }
    debug!(api = %config.api_base, dataset = %config.dataset_base, "probe configured");

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("start runtime: {e}"))?;
    let output = LocalSet::new().block_on(&runtime, run(config, cli.command))?;
    let text = serde_json::to_string_pretty(&output).map_err(|e| e.to_string())?;
    println!("{text}");
    Ok(())
}

async fn run(config: ViewerConfig, command: Command) -> Result<Value, String> {
    let client = Rc::new(config.api_client().map_err(|e| e.to_string())?);
    let token = CancellationToken::new();
    match command {
        Command::Overlay {
            kind,
            bbox,
            zoom,
            mode,
        } => cmd_overlay(&config, client, kind, bbox, zoom, mode, &token).await,
        Command::Search {
            street,
            number,
            no_index,
        } => cmd_search(client, &street, &number, no_index, &token).await,
        Command::Stats {
            reference,
            lon,
            lat,
        } => cmd_stats(client, reference, lon.zip(lat), &token).await,
    }
}

async fn cmd_overlay(
    config: &ViewerConfig,
    client: Rc<ApiClient>,
    kind: OverlayKind,
    bbox: BoundingBox,
    zoom: u8,
    mode: Option<CertificateMode>,
    token: &CancellationToken,
) -> Result<Value, String> {
    let headless = Rc::new(RefCell::new(HeadlessMap::with_viewport(bbox, zoom)));
    let map: SharedMap = headless.clone();
    let journal = Rc::new(RefCell::new(Journal::new()));
    let spec = OverlaySpec::for_kind(kind).with_tuning(config.pipeline);
    let pane = spec.pane.name;

    let coordinator = RequestCoordinator::new(spec, client, map, token, journal.clone());
    coordinator.set_params(OverlayParams { mode });
    let decision = coordinator.on_viewport(Viewport { bbox, zoom });
    if decision == Decision::Ineligible {
        let hint = coordinator.spec().zoom.hint(zoom);
        return Err(format!("{kind} is not shown at zoom {zoom}: {hint:?}"));
    }
    while coordinator.is_fetching() {
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let features = coordinator
        .current_layer()
        .and_then(|id| headless.borrow().layer(id).map(|l| l.features.len()))
        .unwrap_or(0);
    let failure = journal
        .borrow()
        .last(EventKind::FetchFailed)
        .map(|event| event.message.clone());
    let summary = OverlaySummary {
        overlay: kind.name(),
        pane,
        zoom,
        phase: format!("{:?}", coordinator.phase()),
        decision: format!("{decision:?}"),
        bbox: coordinator.last_fetched().map(|b| b.to_query_string()),
        features,
        batches: journal.borrow().count(EventKind::BatchApplied),
        failures: journal.borrow().count(EventKind::FetchFailed),
    };
    let committed = coordinator.phase() == OverlayPhase::Committed;
    coordinator.unmount();
    if !committed && let Some(message) = failure {
        return Err(format!("{kind}: {message}"));
    }
    serde_json::to_value(summary).map_err(|e| e.to_string())
}

async fn cmd_search(
    client: Rc<ApiClient>,
    street: &str,
    number: &str,
    no_index: bool,
    token: &CancellationToken,
) -> Result<Value, String> {
    let search = AddressSearch::new(client);
    if !no_index {
        let dataset = search.load_dataset(token).await.map_err(search_error)?;
        debug!(streets = dataset.index.len(), "address index ready");
    }
    let hit = search
        .search(street, number, token)
        .await
        .map_err(search_error)?;
    Ok(json!({
        "street": hit.street,
        "number": hit.number,
        "reference": hit.reference,
        "geometry": hit.feature.geometry.as_ref().map(|g| format!("{:?}", g.kind())),
        "popup": hit.popup_text(),
    }))
}

fn search_error(e: viewer::SearchError) -> String {
    e.user_message().unwrap_or_else(|| e.to_string())
}

async fn cmd_stats(
    client: Rc<ApiClient>,
    reference: Option<String>,
    point: Option<(f64, f64)>,
    token: &CancellationToken,
) -> Result<Value, String> {
    let feature = match (point, reference.as_deref()) {
        (Some((lon, lat)), _) => Feature::new(Some(Geometry::Point(GeoPoint::new(lon, lat)))),
        (None, Some(reference)) => client
            .building_by_ref(reference, token)
            .await
            .map_err(|e| format!("building {reference}: {e}"))?,
        (None, None) => return Err("stats needs --reference or --lon/--lat".to_string()),
    };

    let mut stats = StatsAggregationClient::new(client, token.clone());
    stats.select(feature, reference.clone()).run().await;
    let state = stats.state();

    let slots: serde_json::Map<String, Value> = StatKind::ALL
        .iter()
        .map(|kind| (kind.name().to_string(), slot_json(*kind, &state.slot(*kind))))
        .collect();
    Ok(json!({ "reference": reference, "stats": slots }))
}

fn slot_json(kind: StatKind, slot: &StatSlot) -> Value {
    match slot {
        StatSlot::Idle | StatSlot::Loading => json!({ "status": "pending" }),
        StatSlot::Failed(e) => json!({ "status": "failed", "message": e.user_message(kind) }),
        StatSlot::Ready(StatValue::Zonal(z)) => json!({
            "status": "ready",
            "count": z.count,
            "avg": z.avg,
            "min": z.min,
            "max": z.max,
        }),
        StatSlot::Ready(StatValue::Cels(hits)) => json!({
            "status": "ready",
            "hits": hits
                .iter()
                .map(|h| json!({
                    "name": h.name,
                    "cel": h.is_cel,
                    "occupancy_pct": h.occupancy_pct,
                    "distance_m": h.distance_m,
                    "can_join": h.can_join(),
                }))
                .collect::<Vec<_>>(),
        }),
        StatSlot::Ready(StatValue::Metrics(m)) => json!({
            "status": "ready",
            "mean_irradiance": m.mean_irradiance(),
            "fields": m.0.len(),
        }),
    }
}
