/* Copyright (C) 2025 Pedro Henrique / phkaiser13
 *
 * File: crates/kubemon-facade/src/lib.rs
 *
 * The external facade (C8, spec §4.7): a set of `warp` filters exposing the
 * monitoring engine, context manager, alert manager, AI wrapper, and
 * broadcast hub over HTTP and WebSocket. Context injection follows
 * `autoheal_controller::with_context`'s `warp::any().map(move || ctx.clone())`
 * idiom; errors are mapped to a single `Reject` wrapper and recovered into a
 * JSON body with a matching status so no internal error type crosses the
 * boundary (spec §7).
 *
 * SPDX-License-Identifier: Apache-2.0
 */

use kubemon_ai::{AiError, AiInvoker};
use kubemon_alerts::AlertManager;
use kubemon_context::{ClusterContextManager, ContextError};
use kubemon_engine::MonitoringEngine;
use kubemon_broadcast::BroadcastHub;
use prometheus::Registry;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

const MAX_QUERY_BYTES: usize = 4096;

#[derive(Debug, Error)]
pub enum FacadeError {
    #[error("no check result named '{0}'")]
    NotFound(String),
    #[error("no active cluster context")]
    NoCurrentContext,
    #[error("unknown context '{0}'")]
    UnknownContext(String),
    #[error("failed to connect to context '{0}': {1}")]
    ConnectFailed(String, String),
    #[error("validation failed: {0}")]
    Validation(String),
    #[error("circuit breaker is open, AI wrapper is not accepting requests")]
    CircuitOpen,
    #[error("AI wrapper is not configured for this deployment")]
    AiUnavailable,
    #[error("AI response did not match the expected schema")]
    MalformedResponse,
    #[error("request exceeded its deadline")]
    Timeout,
    #[error("subscriber capacity reached")]
    Overload,
    #[error("internal error: {0}")]
    Internal(String),
}

impl warp::reject::Reject for FacadeError {}

impl From<ContextError> for FacadeError {
    fn from(e: ContextError) -> Self {
        match e {
            ContextError::NoCurrentContext => FacadeError::NoCurrentContext,
            ContextError::UnknownContext(name) => FacadeError::UnknownContext(name),
            ContextError::Connect(name, reason) => FacadeError::ConnectFailed(name, reason),
            ContextError::Load(e) => FacadeError::Internal(e.to_string()),
        }
    }
}

impl From<AiError> for FacadeError {
    fn from(e: AiError) -> Self {
        match e {
            AiError::CircuitOpen => FacadeError::CircuitOpen,
            AiError::Timeout => FacadeError::Timeout,
            AiError::MalformedResponse { .. } => FacadeError::MalformedResponse,
            AiError::PathValidation(_, _) | AiError::Spawn(_) | AiError::NonZeroExit(_, _) => {
                FacadeError::Internal(e.to_string())
            }
        }
    }
}

fn status_code(err: &FacadeError) -> StatusCode {
    match err {
        FacadeError::NotFound(_) | FacadeError::UnknownContext(_) => StatusCode::NOT_FOUND,
        FacadeError::NoCurrentContext => StatusCode::CONFLICT,
        FacadeError::ConnectFailed(_, _) => StatusCode::BAD_GATEWAY,
        FacadeError::Validation(_) => StatusCode::BAD_REQUEST,
        FacadeError::CircuitOpen => StatusCode::SERVICE_UNAVAILABLE,
        FacadeError::AiUnavailable => StatusCode::NOT_IMPLEMENTED,
        FacadeError::MalformedResponse => StatusCode::BAD_GATEWAY,
        FacadeError::Timeout => StatusCode::GATEWAY_TIMEOUT,
        FacadeError::Overload => StatusCode::SERVICE_UNAVAILABLE,
        FacadeError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

/// Recovers every rejection produced by this crate's handlers, plus warp's
/// own body-parsing/not-found rejections, into a JSON error body.
pub async fn recover(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if let Some(e) = err.find::<FacadeError>() {
        (status_code(e), e.to_string())
    } else if err.find::<warp::filters::body::BodyDeserializeError>().is_some() {
        (StatusCode::BAD_REQUEST, "malformed request body".to_string())
    } else if err.is_not_found() {
        (StatusCode::NOT_FOUND, "no such route".to_string())
    } else {
        (StatusCode::INTERNAL_SERVER_ERROR, "internal error".to_string())
    };

    Ok(warp::reply::with_status(warp::reply::json(&ErrorBody { error: message }), code))
}

/// Shared handles every route closes over. Constructed once at startup.
pub struct AppState {
    pub engine: Arc<MonitoringEngine>,
    pub context: Arc<ClusterContextManager>,
    pub alerts: Arc<AlertManager>,
    pub ai: Option<Arc<AiInvoker>>,
    pub broadcast: Arc<BroadcastHub>,
    pub metrics_registry: Arc<Registry>,
    pub max_subscribers: usize,
    pub version: &'static str,
    pub started_at: Instant,
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

#[derive(Serialize)]
struct HealthBody {
    status: &'static str,
    timestamp: chrono::DateTime<chrono::Utc>,
    version: &'static str,
    uptime_seconds: u64,
}

async fn health_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&HealthBody {
        status: "ok",
        timestamp: chrono::Utc::now(),
        version: state.version,
        uptime_seconds: state.started_at.elapsed().as_secs(),
    }))
}

async fn cluster_health_handler(
    query: HashMap<String, String>,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    if let Some(requested) = query.get("cluster") {
        let current = state.context.get_current_context().await.map_err(FacadeError::from)?;
        if &current.name != requested {
            return Err(warp::reject::custom(FacadeError::UnknownContext(requested.clone())));
        }
    }
    Ok(warp::reply::json(&state.engine.get_cluster_health().await))
}

async fn results_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.engine.get_results().await))
}

async fn result_handler(name: String, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    match state.engine.get_result(&name).await {
        Some(result) => Ok(warp::reply::json(&result)),
        None => Err(warp::reject::custom(FacadeError::NotFound(name))),
    }
}

async fn alerts_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.alerts.get_active_alerts().await))
}

async fn metrics_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let bytes = kubemon_metrics::encode(&state.metrics_registry)
        .map_err(|e| warp::reject::custom(FacadeError::Internal(e.to_string())))?;
    let body = String::from_utf8(bytes).map_err(|e| warp::reject::custom(FacadeError::Internal(e.to_string())))?;
    Ok(warp::reply::with_header(body, "Content-Type", "text/plain; version=0.0.4"))
}

async fn list_contexts_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&state.context.list_contexts().await))
}

async fn current_context_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let current = state.context.get_current_context().await.map_err(FacadeError::from)?;
    Ok(warp::reply::json(&current))
}

#[derive(Deserialize)]
struct SwitchContextRequest {
    name: String,
}

#[derive(Serialize)]
struct SwitchContextResponse {
    status: &'static str,
    current: String,
}

async fn switch_context_handler(
    body: SwitchContextRequest,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    state.context.switch_context(&body.name).await.map_err(FacadeError::from)?;
    Ok(warp::reply::json(&SwitchContextResponse { status: "ok", current: body.name }))
}

#[derive(Deserialize)]
struct AiQueryRequest {
    query: String,
    #[serde(default)]
    #[allow(dead_code)]
    cluster: Option<String>,
    #[serde(default)]
    #[allow(dead_code)]
    timeout: Option<u64>,
}

#[derive(Serialize)]
struct AiQueryResponse {
    answer: String,
    confidence: f64,
    actions: Vec<kubemon_ai::Action>,
    commands: Vec<String>,
    references: Vec<String>,
    followup: Option<String>,
}

async fn ai_query_handler(body: AiQueryRequest, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    if body.query.is_empty() || body.query.len() > MAX_QUERY_BYTES {
        return Err(warp::reject::custom(FacadeError::Validation(
            "query must be non-empty and at most 4 KiB".to_string(),
        )));
    }
    let ai = state.ai.as_ref().ok_or_else(|| warp::reject::custom(FacadeError::AiUnavailable))?;
    let response = ai.query_assistant(&body.query).await.map_err(FacadeError::from)?;

    Ok(warp::reply::json(&AiQueryResponse {
        answer: response.summary,
        confidence: response.confidence,
        actions: response.actions,
        commands: Vec::new(),
        references: Vec::new(),
        followup: (!response.diagnosis.is_empty()).then_some(response.diagnosis),
    }))
}

#[derive(Serialize)]
struct RemediationSuggestionsResponse {
    check: String,
    suggestions: Vec<kubemon_ai::Recommendation>,
}

async fn remediation_suggestions_handler(
    check_name: String,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    let result = state
        .engine
        .get_result(&check_name)
        .await
        .ok_or_else(|| warp::reject::custom(FacadeError::NotFound(check_name.clone())))?;

    let ai = state.ai.as_ref().ok_or_else(|| warp::reject::custom(FacadeError::AiUnavailable))?;
    let response = ai.analyze_healing(&result).await.map_err(FacadeError::from)?;

    Ok(warp::reply::json(&RemediationSuggestionsResponse {
        check: check_name,
        suggestions: response.recommendations,
    }))
}

#[derive(Deserialize)]
struct ExecuteRemediationRequest {
    #[serde(rename = "actionId")]
    action_id: String,
    #[serde(default, rename = "dryRun")]
    dry_run: bool,
}

#[derive(Serialize)]
struct ExecuteRemediationResponse {
    status: &'static str,
    #[serde(rename = "actionId")]
    action_id: String,
    #[serde(rename = "dryRun")]
    dry_run: bool,
}

/// Always returns a typed `not_implemented` placeholder (spec §4.7, §9 open
/// question (b)): no remediation is ever actually executed by this service.
async fn execute_remediation_handler(body: ExecuteRemediationRequest) -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&ExecuteRemediationResponse {
        status: "not_implemented",
        action_id: body.action_id,
        dry_run: body.dry_run,
    }))
}

/// Admission is checked against the configured capacity before the protocol
/// upgrade happens, since an HTTP error can no longer be returned once a
/// connection has switched to WebSocket; the check is therefore best-effort
/// against a concurrently-changing count, the same tolerance the context
/// manager accepts for its post-switch probe.
async fn subscribe_updates_handler(
    ws: warp::ws::Ws,
    state: Arc<AppState>,
) -> Result<impl Reply, Rejection> {
    if state.broadcast.subscriber_count().await >= state.max_subscribers {
        return Err(warp::reject::custom(FacadeError::Overload));
    }
    let hub = state.broadcast.clone();
    Ok(ws.on_upgrade(move |socket| async move {
        if let Err(e) = hub.admit(socket).await {
            tracing::warn!(error = %e, "subscriber admission failed after upgrade");
        }
    }))
}

/// Builds every facade route, combined and wrapped in the shared JSON error
/// recovery handler.
pub fn routes(state: Arc<AppState>) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    let health = warp::path("health")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(health_handler);

    let cluster_health = warp::path!("cluster-health")
        .and(warp::get())
        .and(warp::query::<HashMap<String, String>>())
        .and(with_state(state.clone()))
        .and_then(cluster_health_handler);

    let results = warp::path("results")
        .and(warp::get())
        .and(warp::path::end())
        .and(with_state(state.clone()))
        .and_then(results_handler);

    let result = warp::path!("results" / String)
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(result_handler);

    let alerts = warp::path("alerts")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(alerts_handler);

    let metrics = warp::path("metrics")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(metrics_handler);

    let list_contexts = warp::path("contexts")
        .and(warp::get())
        .and(warp::path::end())
        .and(with_state(state.clone()))
        .and_then(list_contexts_handler);

    let current_context = warp::path!("contexts" / "current")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(current_context_handler);

    let switch_context = warp::path!("contexts" / "switch")
        .and(warp::post())
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(switch_context_handler);

    let ai_query = warp::path!("ai" / "query")
        .and(warp::post())
        .and(warp::body::content_length_limit(MAX_QUERY_BYTES as u64 * 2))
        .and(warp::body::json())
        .and(with_state(state.clone()))
        .and_then(ai_query_handler);

    let remediation_suggestions = warp::path!("checks" / String / "remediation-suggestions")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(remediation_suggestions_handler);

    let execute_remediation = warp::path!("remediation" / "execute")
        .and(warp::post())
        .and(warp::body::json())
        .and_then(execute_remediation_handler);

    let subscribe_updates = warp::path("subscribe")
        .and(warp::get())
        .and(warp::ws())
        .and(with_state(state.clone()))
        .and_then(subscribe_updates_handler);

    health
        .or(cluster_health)
        .or(results)
        .or(result)
        .or(alerts)
        .or(metrics)
        .or(list_contexts)
        .or(current_context)
        .or(switch_context)
        .or(ai_query)
        .or(remediation_suggestions)
        .or(execute_remediation)
        .or(subscribe_updates)
        .recover(recover)
}

#[cfg(test)]
mod tests {
    use super::*;
    use kubemon_alerts::AlertManager;
    use kubemon_broadcast::BroadcastHub;
    use kubemon_checks::CheckRegistry;
    use kubemon_engine::EngineConfig;
    use std::io::Write;

    /// These tests never exercise an engine/context route, so a minimally
    /// valid but never-connected context manager and an empty engine are
    /// enough to build an `AppState`.
    async fn unreachable_context() -> Arc<ClusterContextManager> {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "clusters:\n  - name: test\n    kubeconfig: /dev/null\n").unwrap();
        Arc::new(ClusterContextManager::load(file.path().to_path_buf(), None).await.unwrap())
    }

    async fn unreachable_engine() -> Arc<MonitoringEngine> {
        Arc::new(MonitoringEngine::new(
            "test-cluster",
            Arc::new(CheckRegistry::new()),
            unreachable_context().await,
            Arc::new(AlertManager::new(10)),
            None,
            EngineConfig::default(),
        ))
    }

    #[test]
    fn status_codes_match_the_documented_error_taxonomy() {
        assert_eq!(status_code(&FacadeError::NotFound("x".into())), StatusCode::NOT_FOUND);
        assert_eq!(status_code(&FacadeError::NoCurrentContext), StatusCode::CONFLICT);
        assert_eq!(status_code(&FacadeError::Validation("x".into())), StatusCode::BAD_REQUEST);
        assert_eq!(status_code(&FacadeError::CircuitOpen), StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(status_code(&FacadeError::Timeout), StatusCode::GATEWAY_TIMEOUT);
    }

    #[tokio::test]
    async fn execute_remediation_is_always_a_typed_stub() {
        let filter = warp::path!("remediation" / "execute")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(execute_remediation_handler);

        let response = warp::test::request()
            .method("POST")
            .path("/remediation/execute")
            .json(&serde_json::json!({ "actionId": "restart-pod", "dryRun": true }))
            .reply(&filter)
            .await;

        assert_eq!(response.status(), StatusCode::OK);
        let text = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(text.contains("not_implemented"));
        assert!(text.contains("restart-pod"));
    }

    #[tokio::test]
    async fn unknown_route_is_recovered_into_a_json_404() {
        let state = Arc::new(AppState {
            engine: unreachable_engine().await,
            context: unreachable_context().await,
            alerts: Arc::new(AlertManager::new(10)),
            ai: None,
            broadcast: BroadcastHub::new(Default::default()),
            metrics_registry: Arc::new(Registry::new()),
            max_subscribers: 500,
            version: "test",
            started_at: Instant::now(),
        });

        let response = warp::test::request().path("/nonexistent").reply(&routes(state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let text = String::from_utf8(response.body().to_vec()).unwrap();
        assert!(text.contains("no such route"));
    }

    #[tokio::test]
    async fn result_for_an_unknown_check_is_a_json_404() {
        let state = Arc::new(AppState {
            engine: unreachable_engine().await,
            context: unreachable_context().await,
            alerts: Arc::new(AlertManager::new(10)),
            ai: None,
            broadcast: BroadcastHub::new(Default::default()),
            metrics_registry: Arc::new(Registry::new()),
            max_subscribers: 500,
            version: "test",
            started_at: Instant::now(),
        });

        let response = warp::test::request().path("/results/pods").reply(&routes(state)).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn ai_query_with_an_empty_query_is_rejected_before_invoking_the_wrapper() {
        let state = Arc::new(AppState {
            engine: unreachable_engine().await,
            context: unreachable_context().await,
            alerts: Arc::new(AlertManager::new(10)),
            ai: None,
            broadcast: BroadcastHub::new(Default::default()),
            metrics_registry: Arc::new(Registry::new()),
            max_subscribers: 500,
            version: "test",
            started_at: Instant::now(),
        });

        let response = warp::test::request()
            .method("POST")
            .path("/ai/query")
            .json(&serde_json::json!({ "query": "" }))
            .reply(&routes(state))
            .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
