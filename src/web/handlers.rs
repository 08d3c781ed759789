//! HTTP request handlers.

use super::AppState;
use crate::compose::{scan_bundle_files, scan_bundles};
use crate::reconcile::local_status;
use crate::registry::NodeStatusReport;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Json, Redirect},
};
use std::collections::HashMap;

// ============================================================================
// Fleet registry
// ============================================================================

pub async fn handle_collect_status(
    State(state): State<AppState>,
    Path(host): Path<String>,
    body: Bytes,
) -> impl IntoResponse {
    let report: NodeStatusReport = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            tracing::warn!("Invalid status report from {}: {}", host, e);
            return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response();
        }
    };

    state.registry.ingest(&host, report).await;
    Json(true).into_response()
}

pub async fn handle_get_statuses(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.registry.read_all().await)
}

// ============================================================================
// Local node
// ============================================================================

pub async fn handle_compose_status(State(state): State<AppState>) -> impl IntoResponse {
    match local_status(state.runtime.as_ref(), &state.config.compose_dir).await {
        Ok(services) => Json(services).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_compose_plan(State(state): State<AppState>) -> impl IntoResponse {
    match scan_bundles(&state.config.compose_dir).await {
        Ok(bundles) => Json(bundles).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_containers(State(state): State<AppState>) -> impl IntoResponse {
    match state.runtime.list_containers().await {
        Ok(containers) => Json(containers).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

// ============================================================================
// Deployments
// ============================================================================

pub async fn handle_compose_up(State(state): State<AppState>) -> impl IntoResponse {
    let bundles = match scan_bundle_files(&state.config.compose_dir).await {
        Ok(b) => b,
        Err(e) => return (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    };

    match state.executor.compose_up(bundles).await {
        Ok(batch) => Json(batch).into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}

pub async fn handle_executions(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.executor.history().await)
}

// ============================================================================
// Pages
// ============================================================================

pub async fn handle_root() -> impl IntoResponse {
    Redirect::permanent("/status")
}

pub async fn handle_status() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "buildDate": option_env!("SQUID_BUILD_DATE").unwrap_or("dev"),
        "gitCommit": option_env!("SQUID_GIT_COMMIT").unwrap_or("dev"),
        "ok": "true",
        "status": 200,
    }))
}

/// Provisioning script for an agent, or for a collector with `?server`.
pub async fn handle_get_script(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> impl IntoResponse {
    let script = if params.contains_key("server") {
        server_script(&state.config.image, state.config.http_port)
    } else {
        agent_script(&state.config.image, &state.config.public_url)
    };

    ([(header::CONTENT_TYPE, "text/plain; charset=utf-8")], script)
}

fn agent_script(image: &str, collector: &str) -> String {
    format!(
        r#"echo "Get squid-agent...."
docker pull {image}
docker rm -f squid-agent 2> /dev/null || true
docker run -d \
  --name squid-agent \
  --hostname=$(hostname) \
  -v /var/run/docker.sock:/var/run/docker.sock \
  -v $(pwd)/compose:/app/compose \
  -e SQUID_COLLECTOR={collector} \
  --restart=always \
  {image}
"#
    )
}

fn server_script(image: &str, port: u16) -> String {
    format!(
        r#"echo "Get squid...."
docker pull {image}
docker rm -f squid 2> /dev/null || true
docker run -d \
  --name squid \
  --hostname=$(hostname) \
  -p {port}:{port} \
  --restart=always \
  {image}
"#
    )
}

// ============================================================================
// Static Assets
// ============================================================================

pub async fn handle_favicon() -> impl IntoResponse {
    let svg = r##"<svg xmlns="http://www.w3.org/2000/svg" viewBox="0 0 100 100">
        <circle cx="50" cy="50" r="45" fill="#2b7a78"/>
        <path d="M30 40 Q50 20 70 40 L65 75 M50 45 L50 80 M35 45 L35 75" stroke="white" stroke-width="5" fill="none"/>
    </svg>"##;

    ([(header::CONTENT_TYPE, "image/svg+xml")], svg)
}
