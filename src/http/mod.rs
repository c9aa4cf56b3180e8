//! HTTP boundary.
//!
//! JSON endpoints under `/snmp` that validate input and forward it to an
//! [`SnmpClient`]. Failures use one body shape,
//! `{ "success": false, "error": "...", "errors": [...] }`, with the status
//! derived from the error kind.

mod handlers;

pub use handlers::{
    BulkWalkRequest, DeviceRequest, DiscoverRequest, DiscoverResponse, GetRequest, RawVarBind, SetRequest,
    WalkRequest,
};

use std::sync::Arc;

use axum::Router;
use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::Json;
use serde::Serialize;
use tower_http::trace::TraceLayer;

use crate::client::SnmpClient;
use crate::error::Error;
use crate::transport::Connector;

/// Build the router around a shared client.
pub fn router<C: Connector + 'static>(client: Arc<SnmpClient<C>>) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/snmp/get", post(handlers::get::<C>))
        .route("/snmp/walk", post(handlers::walk::<C>))
        .route("/snmp/bulk-walk", post(handlers::bulk_walk::<C>))
        .route("/snmp/set", post(handlers::set::<C>))
        .route("/snmp/test-connection", post(handlers::test_connection::<C>))
        .route("/snmp/discover", post(handlers::discover::<C>))
        .route("/snmp/cache/stats", get(handlers::cache_stats::<C>))
        .route("/snmp/cache/clear", post(handlers::clear_cache::<C>))
        .route("/snmp/oids/common", get(handlers::common_oids))
        .layer(TraceLayer::new_for_http())
        .with_state(client)
}

/// HTTP status for an error.
pub fn status_code(error: &Error) -> StatusCode {
    match error {
        Error::Validation { .. } | Error::InvalidOid(_) => StatusCode::BAD_REQUEST,
        Error::Capability { .. } => StatusCode::UNPROCESSABLE_ENTITY,
        Error::Auth { .. } => StatusCode::UNAUTHORIZED,
        Error::Timeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        Error::Network { .. }
        | Error::Resolve { .. }
        | Error::MalformedResponse { .. }
        | Error::Snmp { .. }
        | Error::WalkAborted { .. } => StatusCode::BAD_GATEWAY,
        Error::Config(_) | Error::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub success: bool,
    pub error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            success: false,
            error: message.into(),
            errors,
        }
    }
}

impl From<Box<Error>> for ApiError {
    fn from(err: Box<Error>) -> Self {
        let status = status_code(&err);
        if status.is_server_error() {
            tracing::warn!(target: "snmp_monitor::http", { status = status.as_u16(), error = %err }, "request failed");
        }
        let errors = match *err {
            Error::Validation { ref errors } => errors.clone(),
            _ => Vec::new(),
        };
        Self {
            status,
            success: false,
            error: err.to_string(),
            errors,
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text(), Vec::new())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
