//! HTTP API for the testbed, health checks and Prometheus metrics

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{info, warn};
use twin_lib::{
    health::ComponentStatus, ConnectionRequest, CreatePodRequest, MetricType, Testbed, TwinError,
    Window,
};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub testbed: Arc<Testbed>,
}

impl AppState {
    pub fn new(testbed: Arc<Testbed>) -> Self {
        Self { testbed }
    }
}

/// [`TwinError`] rendered as `{success: false, error, kind}`
pub struct ApiError(pub TwinError);

impl From<TwinError> for ApiError {
    fn from(e: TwinError) -> Self {
        ApiError(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TwinError::Validation(_) => StatusCode::BAD_REQUEST,
            TwinError::NotFound(_) | TwinError::NoData(_) => StatusCode::NOT_FOUND,
            TwinError::Conflict(_) => StatusCode::CONFLICT,
            TwinError::Resource(_) => StatusCode::SERVICE_UNAVAILABLE,
            TwinError::Fetch(_) => StatusCode::BAD_GATEWAY,
            TwinError::Process(_) | TwinError::PartialFailure { .. } | TwinError::Storage(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(kind = self.0.kind(), error = %self.0, "Request failed");
        }

        let mut body = json!({
            "success": false,
            "error": self.0.to_string(),
            "kind": self.0.kind(),
        });
        if let TwinError::PartialFailure {
            completed, failed, ..
        } = &self.0
        {
            body["completed"] = json!(completed);
            body["failed"] = failed
                .iter()
                .map(|f| json!({"target": f.target, "reason": f.reason}))
                .collect();
        }
        (status, Json(body)).into_response()
    }
}

type ApiResult = Result<Json<Value>, ApiError>;

fn ok(value: Value) -> ApiResult {
    Ok(Json(value))
}

fn to_value<T: serde::Serialize>(value: T) -> Result<Value, ApiError> {
    serde_json::to_value(value).map_err(|e| ApiError(e.into()))
}

#[derive(Debug, Deserialize)]
pub struct SeriesQuery {
    pub metric: Option<String>,
    pub window: Option<String>,
}

impl SeriesQuery {
    fn parse(&self) -> Result<(MetricType, Window), ApiError> {
        let metric = match &self.metric {
            Some(m) => m.parse().map_err(|e| ApiError(TwinError::Validation(e)))?,
            None => MetricType::Cpu,
        };
        let window = match &self.window {
            Some(w) => w.parse().map_err(|e| ApiError(TwinError::Validation(e)))?,
            None => Window::default(),
        };
        Ok((metric, window))
    }
}

async fn topology(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(to_value(state.testbed.topology().snapshot().await?)?)
}

async fn topology_view(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(to_value(state.testbed.topology().view().await?)?)
}

async fn list_connections(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(to_value(state.testbed.connections().list())?)
}

async fn confirm_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectionRequest>,
) -> ApiResult {
    let connection = state.testbed.connections().confirm(&req.from, &req.to).await?;
    ok(json!({"success": true, "connection": to_value(connection)?}))
}

async fn remove_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectionRequest>,
) -> ApiResult {
    let report = state.testbed.connections().remove(&req.from, &req.to).await?;
    ok(json!({
        "success": true,
        "connection": to_value(report.connection)?,
        "deleted_pods": report.deleted_pods,
    }))
}

async fn initiate_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectionRequest>,
) -> ApiResult {
    let pending = state.testbed.connections().initiate(&req.from, &req.to).await?;
    ok(json!({"success": true, "pending": to_value(pending)?}))
}

async fn cancel_connection(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ConnectionRequest>,
) -> ApiResult {
    let cancelled = state.testbed.connections().cancel(&req.from, &req.to);
    ok(json!({"success": true, "cancelled": cancelled}))
}

async fn pending_connections(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(to_value(state.testbed.connections().pending())?)
}

async fn removal_plan(
    State(state): State<Arc<AppState>>,
    Query(req): Query<ConnectionRequest>,
) -> ApiResult {
    let pods = state.testbed.connections().removal_plan(&req.from, &req.to);
    ok(json!({"virtual_pods": to_value(pods)?}))
}

async fn list_virtual_pods(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(json!({"virtual_pods": to_value(state.testbed.pods().list())?}))
}

async fn create_virtual_pod(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreatePodRequest>,
) -> ApiResult {
    let pod = state.testbed.pods().create(req).await?;
    ok(json!({"success": true, "virtual_pod": to_value(pod)?}))
}

async fn delete_virtual_pod(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> ApiResult {
    let pod = state.testbed.pods().delete(&id).await?;
    ok(json!({"success": true, "virtual_pod": to_value(pod)?}))
}

async fn workload_templates(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(json!({"templates": to_value(state.testbed.catalog().list().await?)?}))
}

async fn node_timeseries(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult {
    let (metric, window) = query.parse()?;
    let series = state
        .testbed
        .metrics()
        .get_node_timeseries(&node, metric, window)
        .await?;
    ok(to_value(series)?)
}

async fn pod_timeseries(
    State(state): State<Arc<AppState>>,
    Path((node, namespace, pod)): Path<(String, String, String)>,
    Query(query): Query<SeriesQuery>,
) -> ApiResult {
    let (metric, window) = query.parse()?;
    let series = state
        .testbed
        .metrics()
        .get_pod_timeseries(&node, &namespace, &pod, metric, window)
        .await?;
    ok(to_value(series)?)
}

async fn current_load(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(to_value(state.testbed.topology().loads().await)?)
}

async fn cluster_info(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
) -> ApiResult {
    ok(to_value(state.testbed.cluster_info(&node).await?)?)
}

async fn emulation_config(
    State(state): State<Arc<AppState>>,
    Path(node): Path<String>,
) -> ApiResult {
    let resources = state.testbed.emulation_config(&node).await?;
    ok(json!({"node": node, "resources": to_value(resources)?}))
}

async fn containers(State(state): State<Arc<AppState>>) -> ApiResult {
    let containers = state.testbed.containers().await?;
    ok(json!({"containers": to_value(containers)?}))
}

async fn port_mappings(State(state): State<Arc<AppState>>) -> ApiResult {
    let mappings: Vec<Value> = state
        .testbed
        .containers()
        .await?
        .into_iter()
        .map(|c| {
            let ports: Vec<Value> = c
                .ports
                .iter()
                .map(|p| {
                    json!({
                        "service": p.service,
                        "container_port": p.container_port,
                        "host_port": p.host_port,
                        "protocol": p.protocol,
                        "mapping": p.mapping(),
                    })
                })
                .collect();
            json!({
                "node_name": c.node_name,
                "container_name": c.container_name,
                "status": c.state,
                "port_mappings": ports,
            })
        })
        .collect();
    ok(json!({"container_mappings": mappings}))
}

async fn system_status(State(state): State<Arc<AppState>>) -> ApiResult {
    ok(to_value(state.testbed.system_status().await)?)
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.testbed.health().health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.testbed.health().readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/topology", get(topology))
        .route("/api/topology/view", get(topology_view))
        .route(
            "/api/liqo-connections",
            get(list_connections)
                .post(confirm_connection)
                .delete(remove_connection),
        )
        .route("/api/liqo-connections/initiate", post(initiate_connection))
        .route("/api/liqo-connections/cancel", post(cancel_connection))
        .route("/api/liqo-connections/pending", get(pending_connections))
        .route("/api/liqo-connections/removal-plan", get(removal_plan))
        .route("/api/virtual-pods", get(list_virtual_pods))
        .route("/api/virtual-pods/create", post(create_virtual_pod))
        .route("/api/virtual-pods/:id", delete(delete_virtual_pod))
        .route("/api/workload-templates", get(workload_templates))
        .route("/api/node/:node/timeseries", get(node_timeseries))
        .route(
            "/api/node/:node/pod/:namespace/:pod/timeseries",
            get(pod_timeseries),
        )
        .route("/api/nodes/current-load", get(current_load))
        .route("/api/node/:node/cluster-info", get(cluster_info))
        .route("/api/node/:node/emulation-config", get(emulation_config))
        .route("/api/containers", get(containers))
        .route("/api/port-mappings", get(port_mappings))
        .route("/api/system/status", get(system_status))
        .route("/api/health", get(healthz))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server
pub async fn serve(addr: String, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
