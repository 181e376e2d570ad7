mod common;

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use common::{Backend, bbox, config, spawn_backend, wait_until};
use formats::{Feature, GeoPoint, Geometry};
use layers::{HeadlessMap, MapOp, MapView, SharedMap};
use pretty_assertions::assert_eq;
use scene::{SelectionState, StatError, StatKind, StatSlot, StatValue};
use streaming::{ApiClient, FetchError};
use tokio::task::LocalSet;
use viewer::{MapSession, SearchError};

fn session(addr: std::net::SocketAddr) -> (Rc<RefCell<HeadlessMap>>, MapSession<ApiClient>) {
    let headless = Rc::new(RefCell::new(HeadlessMap::with_viewport(
        bbox(-3.73, 40.30, -3.72, 40.31),
        16,
    )));
    let map: SharedMap = headless.clone();
    let config = config(addr);
    let client = Rc::new(config.api_client().unwrap());
    (headless, MapSession::new(config, client, map))
}

fn building_point(reference: &str) -> Feature {
    Feature::new(Some(Geometry::Point(GeoPoint::new(-3.7298, 40.3003))))
        .with_property("reference", reference)
}

fn settled(state: &SelectionState) -> bool {
    StatKind::ALL.iter().all(|k| state.slot(*k).is_settled())
}

#[tokio::test]
async fn missing_metrics_do_not_block_other_statistics() {
    let backend = Backend::default();
    let addr = spawn_backend(backend.clone()).await;
    LocalSet::new()
        .run_until(async move {
            let (headless, mut session) = session(addr);
            let outcome = session.select_feature(building_point("1234501AB"), None, None);
            assert!(outcome.highlight.is_ok());
            assert_eq!(headless.borrow().zoom(), 19);

            wait_until(|| settled(&session.stats())).await;
            let state = session.stats();

            match state.slot(StatKind::BuildingMetrics) {
                StatSlot::Failed(e) => {
                    assert_eq!(e, StatError::Fetch(FetchError::NotFound));
                    assert_eq!(e.user_message(StatKind::BuildingMetrics), "Sin métricas");
                }
                other => panic!("unexpected metrics slot: {other:?}"),
            }
            match state.slot(StatKind::ShadowZonal) {
                StatSlot::Ready(StatValue::Zonal(summary)) => assert_eq!(summary.count, 12),
                other => panic!("unexpected shadow slot: {other:?}"),
            }
            match state.slot(StatKind::CelsMembership) {
                StatSlot::Ready(StatValue::Cels(hits)) => {
                    assert_eq!(hits.len(), 1);
                    assert_eq!(hits[0].name.as_deref(), Some("CEL Getafe Norte"));
                }
                other => panic!("unexpected CELS slot: {other:?}"),
            }
            assert!(matches!(
                state.slot(StatKind::IrradianceZonal),
                StatSlot::Ready(StatValue::Zonal(_))
            ));

            // Points are sent as a 48-step disc.
            let body = backend.hits("/shadows/zonal")[0].body.clone().unwrap();
            assert_eq!(body["geometry"]["type"], "Polygon");
            assert_eq!(body["geometry"]["coordinates"][0].as_array().unwrap().len(), 49);
            assert_eq!(
                backend.hits("/buildings/metrics")[0].query["reference"],
                "1234501AB"
            );
        })
        .await;
}

#[tokio::test]
async fn cels_falls_back_to_fixed_radius_on_404() {
    let backend = Backend::default();
    backend.fail("/cels/within_dynamic", 404);
    let addr = spawn_backend(backend.clone()).await;
    LocalSet::new()
        .run_until(async move {
            let (_headless, mut session) = session(addr);
            session.select_feature(building_point("1111111AA"), None, None);
            wait_until(|| settled(&session.stats())).await;

            assert!(matches!(
                session.stats().slot(StatKind::CelsMembership),
                StatSlot::Ready(StatValue::Cels(_))
            ));
            assert_eq!(backend.hits("/cels/within")[0].query["radius_m"], "1000");
        })
        .await;
}

#[tokio::test]
async fn clear_selection_is_idempotent_and_drops_late_results() {
    let backend = Backend::default();
    let addr = spawn_backend(backend.clone()).await;
    LocalSet::new()
        .run_until(async move {
            let (headless, mut session) = session(addr);
            session.select_feature(
                building_point("1111111AA"),
                None,
                Some("Edificio".to_string()),
            );
            assert!(headless.borrow().popup().is_some());
            assert_eq!(headless.borrow().layers_in("selection").len(), 1);

            session.clear_selection();
            session.clear_selection();
            assert!(headless.borrow().popup().is_none());
            assert!(headless.borrow().layers_in("selection").is_empty());
            let closes = headless
                .borrow()
                .ops()
                .iter()
                .filter(|op| **op == MapOp::ClosePopup)
                .count();
            assert_eq!(closes, 1);

            tokio::time::sleep(Duration::from_millis(200)).await;
            assert_eq!(session.stats(), SelectionState::default());
        })
        .await;
}

#[tokio::test]
async fn address_search_uses_the_index_and_selects_the_building() {
    let backend = Backend::default();
    let addr = spawn_backend(backend.clone()).await;
    LocalSet::new()
        .run_until(async move {
            let (headless, mut session) = session(addr);
            let dataset = session.load_dataset().await.unwrap();
            assert_eq!(dataset.index.streets(), &["Avenida de Ángel", "Calle Madrid"]);
            assert_eq!(dataset.index.numbers("Calle Madrid"), vec!["10", "12"]);

            let (hit, outcome) = session.search_address("calle madrid", "10").await.unwrap();
            assert_eq!(hit.reference.as_deref(), Some("1111111AA"));
            assert!(outcome.highlight.is_ok());
            assert!(backend.hits("/address/lookup").is_empty());
            let popup = headless.borrow().popup().cloned().unwrap();
            assert!(popup.content.starts_with("CALLE MADRID 10"));
            assert!(
                headless
                    .borrow()
                    .ops()
                    .iter()
                    .any(|op| matches!(op, MapOp::FitBounds(_)))
            );

            let err = session.search_address("Calle Madrid", "99").await.unwrap_err();
            assert_eq!(err, SearchError::NotIndexed);
            assert_eq!(
                err.user_message().as_deref(),
                Some("No hay referencia catastral en el índice para esa dirección.")
            );

            assert_eq!(session.show_boundaries(), 1);
            assert_eq!(headless.borrow().visible_layers_in("limits-casing").len(), 1);
            assert_eq!(headless.borrow().visible_layers_in("limits-dash").len(), 1);
            session.hide_boundaries();
            assert!(headless.borrow().layers_in("limits-dash").is_empty());
        })
        .await;
}

#[tokio::test]
async fn cadastre_failure_falls_back_to_address_lookup() {
    let backend = Backend::default();
    backend.fail("/cadastre/feature", 500);
    let addr = spawn_backend(backend.clone()).await;
    LocalSet::new()
        .run_until(async move {
            let (_headless, mut session) = session(addr);
            session.load_dataset().await.unwrap();
            let (hit, _) = session.search_address("Calle Madrid", "12").await.unwrap();
            assert_eq!(hit.reference.as_deref(), Some("1234501AB"));
            let lookups = backend.hits("/address/lookup");
            assert_eq!(lookups.len(), 1);
            assert_eq!(lookups[0].query["street"], "Calle Madrid");
            assert_eq!(lookups[0].query["number"], "12");
        })
        .await;
}
