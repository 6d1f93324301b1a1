use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{self, Request, StatusCode};
use chrono::{TimeDelta, Utc};
use route_tracker::config::{ReferencePaths, ReloadPolicy, RouteConfig, TrackerConfig};
use route_tracker::fetch::HttpClient;
use route_tracker::reference::{ReferenceStore, ReferenceTables};
use route_tracker::server::{AppState, ReferenceSource, api_router, app};
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;
use tower::ServiceExt;

const ROUTE: &str = "100162";
const TRIP: &str = "541208836";

/// Serves a canned feed response without touching the network.
struct StubFeed {
    status: u16,
    body: String,
}

#[async_trait]
impl HttpClient for StubFeed {
    async fn execute(&self, _req: reqwest::Request) -> reqwest::Result<reqwest::Response> {
        let resp = http::Response::builder()
            .status(self.status)
            .body(self.body.clone())
            .unwrap();
        Ok(reqwest::Response::from(resp))
    }
}

fn fixture(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests/fixtures")
        .join(name)
}

fn config(reload: ReloadPolicy) -> TrackerConfig {
    TrackerConfig {
        route: RouteConfig::new(ROUTE, TimeDelta::minutes(10)),
        feed_url: "http://feed.test/vehiclepositions_pb.json".to_string(),
        references: ReferencePaths {
            trips: fixture("trips.txt"),
            stops: fixture("stops.txt"),
        },
        reload,
    }
}

fn cached_state(stub: StubFeed) -> Arc<AppState<StubFeed>> {
    let config = config(ReloadPolicy::Never);
    let tables = ReferenceTables::load(&config.references, ROUTE).expect("fixtures load");
    Arc::new(AppState {
        client: stub,
        config,
        references: ReferenceSource::Cached(ReferenceStore::new(tables)),
    })
}

fn vehicle(label: &str, stop_id: &str, age: TimeDelta) -> Value {
    json!({
        "id": format!("vp-{label}"),
        "vehicle": {
            "trip": {
                "trip_id": TRIP,
                "direction_id": 0,
                "route_id": ROUTE,
                "schedule_relationship": "SCHEDULED"
            },
            "position": { "latitude": 47.6441, "longitude": -122.3041 },
            "current_status": "IN_TRANSIT_TO",
            "timestamp": (Utc::now() - age).timestamp(),
            "stop_id": stop_id,
            "vehicle": { "id": label, "label": label }
        }
    })
}

fn feed_of(entities: Vec<Value>) -> StubFeed {
    let doc = json!({
        "header": { "gtfs_realtime_version": "2.0", "incrementality": "FULL_DATASET" },
        "entity": entities
    });
    StubFeed {
        status: 200,
        body: doc.to_string(),
    }
}

async fn get(router: Router, uri: &str) -> (StatusCode, Vec<u8>) {
    let resp = router
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = resp.status();
    let body = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, body.to_vec())
}

async fn get_buses(router: Router) -> (StatusCode, Value) {
    let (status, body) = get(router, "/api/buses").await;
    (status, serde_json::from_slice(&body).expect("JSON body"))
}

#[tokio::test]
async fn test_fresh_bus_is_listed_with_stop_name() {
    let stub = feed_of(vec![vehicle("7028", "10912", TimeDelta::minutes(2))]);
    let (status, body) = get_buses(api_router(cached_state(stub))).await;

    assert_eq!(status, StatusCode::OK);
    let buses = body.as_array().unwrap();
    assert_eq!(buses.len(), 1);
    assert_eq!(buses[0]["label"], "7028");
    assert_eq!(buses[0]["direction"], "Eastbound");
    assert_eq!(buses[0]["stop"], "Montlake Fwy Station - Bay 2");
    assert_eq!(buses[0]["status"], "IN_TRANSIT_TO");
    assert_eq!(buses[0]["position"], json!({ "lat": 47.6441, "lon": -122.3041 }));
    assert!(buses[0]["last_updated"].is_string());
}

#[tokio::test]
async fn test_stale_bus_yields_empty_list() {
    let stub = feed_of(vec![vehicle("7028", "10912", TimeDelta::minutes(15))]);
    let (status, body) = get_buses(api_router(cached_state(stub))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
}

#[tokio::test]
async fn test_unknown_stop_is_labelled_unknown() {
    let stub = feed_of(vec![vehicle("7028", "424242", TimeDelta::minutes(1))]);
    let (status, body) = get_buses(api_router(cached_state(stub))).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["stop"], "Unknown");
}

#[tokio::test]
async fn test_feed_outage_is_a_server_error() {
    let stub = StubFeed {
        status: 503,
        body: "Service Unavailable".to_string(),
    };
    let (status, body) = get_buses(api_router(cached_state(stub))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let detail = body["detail"].as_str().unwrap();
    assert!(detail.starts_with("An error occurred:"));
    assert!(detail.contains("503"));
    assert!(body.as_object().unwrap().len() == 1);
}

#[tokio::test]
async fn test_malformed_feed_is_a_server_error() {
    let stub = StubFeed {
        status: 200,
        body: "{\"entity\": [{\"vehicle\": ".to_string(),
    };
    let (status, body) = get_buses(api_router(cached_state(stub))).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].is_string());
}

#[tokio::test]
async fn test_mixed_feed_keeps_only_active_route_buses() {
    let mut other_route = vehicle("8001", "10912", TimeDelta::minutes(1));
    other_route["vehicle"]["trip"]["route_id"] = json!("100252");
    let mut added = vehicle("7030", "10912", TimeDelta::minutes(1));
    added["vehicle"]["trip"]["schedule_relationship"] = json!("ADDED");
    let mut westbound = vehicle("7031", "67655", TimeDelta::minutes(4));
    westbound["vehicle"]["trip"]["trip_id"] = json!("541208840");

    let stub = feed_of(vec![
        vehicle("7028", "10912", TimeDelta::minutes(1)),
        other_route,
        added,
        json!({ "id": "broken", "vehicle": { "trip": { "route_id": ROUTE } } }),
        westbound,
    ]);
    let (status, body) = get_buses(api_router(cached_state(stub))).await;

    assert_eq!(status, StatusCode::OK);
    let labels: Vec<_> = body
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["label"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(labels, ["7028", "7031"]);
    assert_eq!(body[1]["direction"], "Westbound");
    assert_eq!(body[1]["stop"], "Bellevue Transit Center - Bay 9");
}

#[tokio::test]
async fn test_per_request_references_are_loaded() {
    let state = Arc::new(AppState {
        client: feed_of(vec![vehicle("7028", "67655", TimeDelta::minutes(1))]),
        config: config(ReloadPolicy::PerRequest),
        references: ReferenceSource::PerRequest,
    });
    let (status, body) = get_buses(api_router(state)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body[0]["stop"], "Bellevue Transit Center - Bay 9");
}

#[tokio::test]
async fn test_missing_reference_table_is_a_server_error() {
    let mut config = config(ReloadPolicy::PerRequest);
    config.references.trips = fixture("does-not-exist.txt");
    let state = Arc::new(AppState {
        client: feed_of(vec![vehicle("7028", "67655", TimeDelta::minutes(1))]),
        config,
        references: ReferenceSource::PerRequest,
    });
    let (status, body) = get_buses(api_router(state)).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body["detail"].as_str().unwrap().contains("does-not-exist.txt"));
}

#[tokio::test]
async fn test_landing_page_is_served() {
    let stub = feed_of(vec![]);
    let router = app(
        cached_state(stub),
        &fixture("index.html"),
        &fixture("static"),
    );
    let (status, body) = get(router, "/").await;

    assert_eq!(status, StatusCode::OK);
    assert!(String::from_utf8(body).unwrap().contains("Route 271 Buses"));
}
