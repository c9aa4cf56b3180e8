//! HTTP boundary, driven through the router without a listener.

mod common;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use common::{combined, interface_table, system_mib};
use http_body_util::BodyExt;
use serde_json::{Value as Json, json};
use snmp_monitor::client::oids;
use snmp_monitor::http::router;
use snmp_monitor::transport::MockTransport;
use snmp_monitor::{ClientConfig, SnmpClient};
use tower::ServiceExt;

fn target() -> SocketAddr {
    "192.0.2.20:161".parse().unwrap()
}

fn app() -> (MockTransport, Router) {
    let mock = MockTransport::new(target());
    mock.serve_mib(combined([system_mib(), interface_table(2)]));
    let client = SnmpClient::with_connector(mock.clone(), ClientConfig::default());
    (mock, router(Arc::new(client)))
}

fn v2c_device() -> Json {
    json!({
        "hostname": "192.0.2.20",
        "timeout": 1000,
        "retries": 0,
        "credentials": { "version": "v2c", "community": "public" }
    })
}

async fn call(app: &Router, method: &str, uri: &str, body: Option<Json>) -> (StatusCode, Json) {
    let request = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => request.body(Body::empty()).unwrap(),
    };
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json = if bytes.is_empty() {
        Json::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn health() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn get_returns_typed_varbinds() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/snmp/get",
        Some(json!({ "device": v2c_device(), "oids": ["1.3.6.1.2.1.1.5.0", "1.3.6.1.2.1.1.3.0"] })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["varbinds"][0]["oid"], "1.3.6.1.2.1.1.5.0");
    assert_eq!(body["varbinds"][0]["value"], "test-agent");
    assert_eq!(body["varbinds"][1]["type"], "TimeTicks");
    assert_eq!(body["varbinds"][1]["value"], 123456);
}

#[tokio::test]
async fn invalid_input_lists_every_problem() {
    let (mock, app) = app();
    let mut device = v2c_device();
    device["port"] = json!(70000);

    let (status, body) = call(
        &app,
        "POST",
        "/snmp/get",
        Some(json!({ "device": device, "oids": ["1.3.6.1.2.1.1.5.0", "1.3.x"] })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2, "{errors:?}");
    assert!(errors.iter().any(|e| e.as_str().unwrap().contains("1.3.x")));
    assert_eq!(mock.exchanges(), 0);
}

#[tokio::test]
async fn malformed_json_is_a_bad_request() {
    let (_, app) = app();
    let request = Request::builder()
        .method("POST")
        .uri("/snmp/get")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{\"device\":"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Json = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(body["success"], false);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn walk_reports_count() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/snmp/walk",
        Some(json!({ "device": v2c_device(), "oid": "1.3.6.1.2.1.2.2.1.2" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["count"], 2);
    assert_eq!(body["varbinds"][1]["value"], "eth2");
}

#[tokio::test]
async fn bulk_walk_on_v1_is_unprocessable() {
    let (mock, app) = app();
    let mut device = v2c_device();
    device["credentials"]["version"] = json!("v1");

    let (status, body) = call(
        &app,
        "POST",
        "/snmp/bulk-walk",
        Some(json!({ "device": device, "oid": "1.3.6.1.2.1.1", "maxRepetitions": 10 })),
    )
    .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["error"].as_str().unwrap().contains("v1"), "{body}");
    assert_eq!(mock.exchanges(), 0);
}

#[tokio::test]
async fn bulk_walk_range_checks() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/snmp/bulk-walk",
        Some(json!({ "device": v2c_device(), "oid": "1.3.6.1.2.1.1", "nonRepeaters": 101, "maxRepetitions": 0 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["errors"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn set_converts_typed_values() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/snmp/set",
        Some(json!({
            "device": v2c_device(),
            "varbinds": [{ "oid": "1.3.6.1.2.1.1.6.0", "type": "OCTET STRING", "value": "Row 4" }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);

    let (_, body) = call(
        &app,
        "POST",
        "/snmp/get",
        Some(json!({ "device": v2c_device(), "oids": ["1.3.6.1.2.1.1.6.0"] })),
    )
    .await;
    assert_eq!(body["varbinds"][0]["value"], "Row 4");
}

#[tokio::test]
async fn set_rejects_bad_values_by_position() {
    let (mock, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/snmp/set",
        Some(json!({
            "device": v2c_device(),
            "varbinds": [
                { "oid": "1.3.6.1.2.1.1.6.0", "type": "OCTET STRING", "value": "ok" },
                { "oid": "1.3.6.1.2.1.1.4.0", "type": "Gauge32", "value": "lots" }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["errors"][0].as_str().unwrap().starts_with("varbind 1:"), "{body}");
    assert_eq!(mock.exchanges(), 0);
}

#[tokio::test]
async fn test_connection_reports_reachability() {
    let (_, app) = app();
    let (status, body) = call(&app, "POST", "/snmp/test-connection", Some(json!({ "device": v2c_device() }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["reachable"], true);
    assert_eq!(body["authenticated"], true);
    assert!(body["responseTime"].is_u64());
}

#[tokio::test]
async fn silent_device_test_is_not_an_http_error() {
    let mock = MockTransport::new(target());
    let app = router(Arc::new(SnmpClient::with_connector(mock, ClientConfig::default())));

    let (status, body) = call(&app, "POST", "/snmp/test-connection", Some(json!({ "device": v2c_device() }))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], false);
    assert_eq!(body["reachable"], false);
    assert_eq!(body["authenticated"], false);
}

#[tokio::test]
async fn timeouts_map_to_gateway_timeout() {
    let mock = MockTransport::new(target());
    let app = router(Arc::new(SnmpClient::with_connector(mock, ClientConfig::default())));

    let (status, body) = call(
        &app,
        "POST",
        "/snmp/get",
        Some(json!({ "device": v2c_device(), "oids": ["1.3.6.1.2.1.1.5.0"] })),
    )
    .await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(body["success"], false);
    assert!(body.get("errors").is_none());
}

#[tokio::test]
async fn discover_with_sensors_notes_the_gap() {
    let (_, app) = app();
    let (status, body) = call(
        &app,
        "POST",
        "/snmp/discover",
        Some(json!({ "device": v2c_device(), "includeSensors": true })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["hostname"], "192.0.2.20");
    assert_eq!(body["systemInfo"]["sysName"], "test-agent");
    assert_eq!(body["interfaces"].as_array().unwrap().len(), 2);
    assert_eq!(body["sensors"], json!([]));
    assert!(body["error"].as_str().unwrap().contains("sensor"));
}

#[tokio::test]
async fn discover_can_skip_sections() {
    let (mock, app) = app();
    let (_, body) = call(
        &app,
        "POST",
        "/snmp/discover",
        Some(json!({ "device": v2c_device(), "includeInterfaces": false })),
    )
    .await;
    assert!(body.get("interfaces").is_none());
    assert!(body.get("sensors").is_none());
    assert!(body.get("error").is_none());
    assert_eq!(mock.exchanges(), 1);
}

#[tokio::test]
async fn cache_stats_and_clear() {
    let (_, app) = app();
    let get = json!({ "device": v2c_device(), "oids": ["1.3.6.1.2.1.1.1.0"] });
    call(&app, "POST", "/snmp/get", Some(get.clone())).await;
    call(&app, "POST", "/snmp/get", Some(get)).await;

    let (status, body) = call(&app, "GET", "/snmp/cache/stats", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["stats"]["hits"], 1);
    assert_eq!(body["stats"]["size"], 1);
    assert_eq!(body["stats"]["maxSize"], 1000);

    let (status, _) = call(&app, "POST", "/snmp/cache/clear", None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, body) = call(&app, "GET", "/snmp/cache/stats", None).await;
    assert_eq!(body["stats"]["size"], 0);
}

#[tokio::test]
async fn common_oids_catalog() {
    let (_, app) = app();
    let (status, body) = call(&app, "GET", "/snmp/oids/common", None).await;
    assert_eq!(status, StatusCode::OK);
    let catalog = body["oids"].as_array().unwrap();
    assert!(!catalog.is_empty());
    let sys_descr = oids::sys_descr().to_string();
    assert!(catalog.iter().any(|entry| entry["oid"] == sys_descr.as_str()), "{body}");
}

#[tokio::test]
async fn unknown_route_is_not_found() {
    let (_, app) = app();
    let (status, _) = call(&app, "GET", "/snmp/nothing", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
