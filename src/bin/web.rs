//! Hive Web：HTTP 运行控制 + SSE 遥测
//!
//! 启动: cargo run --bin hive-web --features web
//! 监听地址取自配置 [web] bind_addr（默认 127.0.0.1:8080）

#![cfg(feature = "web")]

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures_util::stream::{Stream, StreamExt};
use serde::Deserialize;

use hive::config::{load_config, AppConfig};
use hive::core::{create_run_manager, AgentError, RunManager, RunState};
use hive::observability;

type ApiError = (StatusCode, String);

fn api_error(e: AgentError) -> ApiError {
    let code = match &e {
        AgentError::AgentNotFound(_) | AgentError::RunNotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };
    (code, e.to_string())
}

#[derive(Deserialize)]
struct StartRunRequest {
    input: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LogsQuery {
    execution_id: String,
}

/// POST /api/agents/:id/runs：启动运行
async fn api_start_run(
    State(manager): State<Arc<RunManager>>,
    Path(agent_id): Path<String>,
    Json(req): Json<StartRunRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if req.input.trim().is_empty() {
        return Err((StatusCode::BAD_REQUEST, "input is required".to_string()));
    }
    let run_id = manager
        .start_run(&agent_id, &req.input)
        .await
        .map_err(api_error)?;
    Ok(Json(serde_json::json!({ "runId": run_id })))
}

/// POST /api/runs/:id/stop
async fn api_stop_run(
    State(manager): State<Arc<RunManager>>,
    Path(run_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let outcome = manager.stop_run(&run_id).await.map_err(api_error)?;
    Ok(Json(serde_json::json!({ "outcome": outcome })))
}

/// GET /api/runs/:id：运行状态快照
async fn api_get_run(
    State(manager): State<Arc<RunManager>>,
    Path(run_id): Path<String>,
) -> Result<Json<RunState>, ApiError> {
    manager.snapshot(&run_id).await.map(Json).map_err(api_error)
}

/// GET /api/runs：运行列表
async fn api_list_runs(State(manager): State<Arc<RunManager>>) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "runs": manager.list_runs().await }))
}

/// GET /api/agents/:id/logs?executionId=…：SSE 遥测，Last-Event-ID 断线续传
async fn api_run_logs_sse(
    State(manager): State<Arc<RunManager>>,
    Path(agent_id): Path<String>,
    Query(query): Query<LogsQuery>,
    headers: HeaderMap,
) -> Result<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>, ApiError> {
    let run = manager
        .snapshot(&query.execution_id)
        .await
        .map_err(api_error)?;
    if run.agent_id != agent_id {
        return Err((
            StatusCode::NOT_FOUND,
            format!("Run {} does not belong to agent {}", query.execution_id, agent_id),
        ));
    }

    let cursor = headers
        .get("last-event-id")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|seq| seq + 1)
        .unwrap_or(0);
    let sub = manager
        .subscribe_from(&query.execution_id, cursor)
        .await
        .map_err(api_error)?;

    let events = sub.into_stream().map(|ev| {
        Ok::<_, std::convert::Infallible>(Event::default()
            .id(ev.seq.to_string())
            .data(ev.event.monitor_payload().to_string()))
    });

    Ok(Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let cfg = load_config(None).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        AppConfig::default()
    });
    let manager = Arc::new(create_run_manager(&cfg)?);

    // 定期清理已结束的运行
    let pruner = Arc::clone(&manager);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(std::time::Duration::from_secs(60));
        loop {
            interval.tick().await;
            let retention = pruner.settings().retention;
            pruner.prune_finished(retention).await;
        }
    });

    let app = Router::new()
        .route("/api/health", get(|| async { "OK" }))
        .route("/api/runs", get(api_list_runs))
        .route("/api/agents/:id/runs", post(api_start_run))
        .route("/api/agents/:id/logs", get(api_run_logs_sse))
        .route("/api/runs/:id", get(api_get_run))
        .route("/api/runs/:id/stop", post(api_stop_run))
        .with_state(manager);

    let addr: std::net::SocketAddr = cfg.web.bind_addr.parse()?;
    tracing::info!("Hive Web: http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
