use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Value as JsonValue, json};

use super::ApiError;
use crate::client::{COMMON_OIDS, ConnectionTest, InterfaceRecord, SetResult, SnmpClient, SystemInfo};
use crate::device::SnmpDevice;
use crate::error::Error;
use crate::oid::Oid;
use crate::transport::Connector;
use crate::validate::{ValidationReport, validate_bulk_parameters, validate_device, validate_oid_list};
use crate::value::Value;
use crate::varbind::VarBind;

type Client<C> = State<Arc<SnmpClient<C>>>;
type Reply = Result<Json<JsonValue>, ApiError>;

const SENSORS_UNSUPPORTED: &str = "sensor discovery is not yet supported";

fn default_max_repetitions() -> i64 {
    20
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetRequest {
    pub device: SnmpDevice,
    pub oids: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WalkRequest {
    pub device: SnmpDevice,
    pub oid: String,
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkWalkRequest {
    pub device: SnmpDevice,
    pub oid: String,
    #[serde(default)]
    pub non_repeaters: i64,
    #[serde(default = "default_max_repetitions")]
    pub max_repetitions: i64,
}

/// A varbind as sent by callers; the value is checked against `type`
/// only after the rest of the request validated.
#[derive(Debug, Clone, Deserialize)]
pub struct RawVarBind {
    pub oid: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub value: JsonValue,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetRequest {
    pub device: SnmpDevice,
    pub varbinds: Vec<RawVarBind>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceRequest {
    pub device: SnmpDevice,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverRequest {
    pub device: SnmpDevice,
    #[serde(default = "default_true")]
    pub include_system_info: bool,
    #[serde(default = "default_true")]
    pub include_interfaces: bool,
    #[serde(default)]
    pub include_sensors: bool,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscoverResponse {
    pub hostname: String,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_info: Option<SystemInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interfaces: Option<Vec<InterfaceRecord>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sensors: Option<Vec<JsonValue>>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

fn check(report: ValidationReport) -> Result<(), ApiError> {
    report.into_result().map_err(ApiError::from)
}

/// Parse OIDs that already passed the grammar check.
fn parse_oids(oids: &[String]) -> Result<Vec<Oid>, ApiError> {
    oids.iter()
        .map(|s| Oid::parse(s).map_err(ApiError::from))
        .collect()
}

fn bulk_value(value: i64) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

pub(super) async fn health() -> Json<JsonValue> {
    Json(json!({ "status": "ok" }))
}

pub(super) async fn get<C: Connector + 'static>(
    State(client): Client<C>,
    payload: Result<Json<GetRequest>, JsonRejection>,
) -> Reply {
    let Json(req) = payload?;
    check(validate_device(&req.device).merge(validate_oid_list(&req.oids)))?;
    let oids = parse_oids(&req.oids)?;

    let varbinds = client.get(&req.device, &oids).await?;
    Ok(Json(json!({ "success": true, "varbinds": varbinds })))
}

pub(super) async fn walk<C: Connector + 'static>(
    State(client): Client<C>,
    payload: Result<Json<WalkRequest>, JsonRejection>,
) -> Reply {
    let Json(req) = payload?;
    check(
        validate_device(&req.device)
            .merge(validate_oid_list(std::slice::from_ref(&req.oid)))
            .merge(validate_bulk_parameters(0, req.max_repetitions)),
    )?;
    let root = Oid::parse(&req.oid)?;

    let varbinds = client
        .walk(&req.device, &root, Some(bulk_value(req.max_repetitions)))
        .await?;
    Ok(Json(json!({ "success": true, "count": varbinds.len(), "varbinds": varbinds })))
}

pub(super) async fn bulk_walk<C: Connector + 'static>(
    State(client): Client<C>,
    payload: Result<Json<BulkWalkRequest>, JsonRejection>,
) -> Reply {
    let Json(req) = payload?;
    check(
        validate_device(&req.device)
            .merge(validate_oid_list(std::slice::from_ref(&req.oid)))
            .merge(validate_bulk_parameters(req.non_repeaters, req.max_repetitions)),
    )?;
    let root = Oid::parse(&req.oid)?;

    let varbinds = client
        .bulk_walk(
            &req.device,
            &root,
            bulk_value(req.non_repeaters),
            bulk_value(req.max_repetitions),
        )
        .await?;
    Ok(Json(json!({ "success": true, "count": varbinds.len(), "varbinds": varbinds })))
}

pub(super) async fn set<C: Connector + 'static>(
    State(client): Client<C>,
    payload: Result<Json<SetRequest>, JsonRejection>,
) -> Result<Json<SetResult>, ApiError> {
    let Json(req) = payload?;
    let oids: Vec<&str> = req.varbinds.iter().map(|vb| vb.oid.as_str()).collect();
    check(validate_device(&req.device).merge(validate_oid_list(&oids)))?;

    let mut varbinds = Vec::with_capacity(req.varbinds.len());
    let mut errors = Vec::new();
    for (position, raw) in req.varbinds.iter().enumerate() {
        match Value::from_typed(&raw.type_name, &raw.value) {
            Ok(value) => varbinds.push(VarBind::new(Oid::parse(&raw.oid)?, value)),
            Err(e) => match *e {
                Error::Validation { errors: found } => {
                    errors.extend(found.into_iter().map(|msg| format!("varbind {position}: {msg}")))
                }
                other => return Err(other.boxed().into()),
            },
        }
    }
    if !errors.is_empty() {
        return Err(Error::validation(errors).into());
    }

    Ok(Json(client.set(&req.device, varbinds).await?))
}

pub(super) async fn test_connection<C: Connector + 'static>(
    State(client): Client<C>,
    payload: Result<Json<DeviceRequest>, JsonRejection>,
) -> Result<Json<ConnectionTest>, ApiError> {
    let Json(req) = payload?;
    Ok(Json(client.test_connection(&req.device).await?))
}

pub(super) async fn discover<C: Connector + 'static>(
    State(client): Client<C>,
    payload: Result<Json<DiscoverRequest>, JsonRejection>,
) -> Result<Json<DiscoverResponse>, ApiError> {
    let Json(req) = payload?;
    check(validate_device(&req.device))?;

    let mut problems = Vec::new();
    let mut failed = false;
    let system_info = if req.include_system_info {
        match client.get_system_info(&req.device).await {
            Ok(info) => Some(info),
            Err(e) => {
                failed = true;
                problems.push(format!("system info: {e}"));
                None
            }
        }
    } else {
        None
    };
    let interfaces = if req.include_interfaces {
        match client.get_interface_info(&req.device).await {
            Ok(rows) => Some(rows),
            Err(e) => {
                failed = true;
                problems.push(format!("interfaces: {e}"));
                None
            }
        }
    } else {
        None
    };
    let sensors = req.include_sensors.then(|| {
        problems.push(SENSORS_UNSUPPORTED.to_owned());
        Vec::new()
    });

    tracing::debug!(target: "snmp_monitor::http", { snmp.target = %req.device.endpoint(), failed, problems = problems.len() }, "discovery finished");
    Ok(Json(DiscoverResponse {
        hostname: req.device.hostname.clone(),
        timestamp: Utc::now(),
        system_info,
        interfaces,
        sensors,
        success: !failed,
        error: (!problems.is_empty()).then(|| problems.join("; ")),
    }))
}

pub(super) async fn cache_stats<C: Connector + 'static>(State(client): Client<C>) -> Json<JsonValue> {
    Json(json!({ "success": true, "stats": client.cache_stats() }))
}

pub(super) async fn clear_cache<C: Connector + 'static>(State(client): Client<C>) -> Json<JsonValue> {
    client.clear_cache();
    tracing::info!(target: "snmp_monitor::http", "response cache cleared");
    Json(json!({ "success": true, "message": "cache cleared" }))
}

pub(super) async fn common_oids() -> Json<JsonValue> {
    Json(json!({ "success": true, "oids": COMMON_OIDS }))
}
