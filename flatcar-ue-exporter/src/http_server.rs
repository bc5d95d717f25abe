//! HTTP server for metrics and probes.
//!
//! Routes:
//! - `GET /` - landing page
//! - `GET /metrics` - Prometheus text exposition
//! - `GET /healthz` - liveness, 204 while the process is up
//! - `GET /readyz` - readiness, 204 once status data has flowed

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::{ConnectInfo, Request, State},
    http::{header, StatusCode},
    middleware::{self, Next},
    response::{Html, IntoResponse, Response},
    routing::get,
    Router,
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

use crate::aggregator::StatusAggregator;
use crate::lifecycle::OperatingMode;

const INDEX_TEMPLATE: &str = include_str!("index.html");

/// Body of a 503 from `/readyz`.
pub const NOT_READY_MESSAGE: &str = "not ready: no status received from update engine yet\n";

/// Shared state for HTTP handlers
pub struct AppState {
    /// Aggregator backing `/metrics` and `/readyz`
    pub aggregator: Arc<StatusAggregator>,
    /// Live or pretend
    pub mode: OperatingMode,
}

/// Build the application router with all routes
pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/metrics", get(metrics))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .with_state(state)
        .layer(middleware::from_fn(log_request))
        .layer(TraceLayer::new_for_http())
}

/// Serve until `cancel` fires, then drain open connections.
pub async fn run_http_server(
    listener: TcpListener,
    state: Arc<AppState>,
    cancel: CancellationToken,
) -> std::io::Result<()> {
    let app = build_router(state);

    if let Ok(addr) = listener.local_addr() {
        info!(listen_addr = %addr, "Starting HTTP server for metrics");
    }

    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await?;

    info!("HTTP server stopped");
    Ok(())
}

/// Log every request with client and user agent. Probes log at debug.
async fn log_request(request: Request, next: Next) -> Response {
    let client = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| addr.to_string())
        .unwrap_or_else(|| "unknown".to_string());
    let user_agent = request
        .headers()
        .get(header::USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    match path.as_str() {
        "/healthz" | "/readyz" => {
            debug!(client = %client, user_agent = %user_agent, method = %method, path = %path, "Probe request")
        }
        _ => info!(client = %client, user_agent = %user_agent, method = %method, path = %path, "HTTP request"),
    }

    next.run(request).await
}

/// GET / - landing page
async fn index(State(state): State<Arc<AppState>>) -> Html<String> {
    let notice = match state.mode {
        OperatingMode::Degraded => {
            "<p class=\"notice\">Pretend mode: update engine is not being observed.</p>"
        }
        OperatingMode::Live => "",
    };

    Html(
        INDEX_TEMPLATE
            .replace("{{MODE_NOTICE}}", notice)
            .replace("{{VERSION}}", env!("CARGO_PKG_VERSION")),
    )
}

/// GET /metrics - gather under the aggregator read lock and encode
async fn metrics(State(state): State<Arc<AppState>>) -> Response {
    match state.aggregator.render() {
        Ok(body) => ([(header::CONTENT_TYPE, prometheus::TEXT_FORMAT)], body).into_response(),
        Err(e) => {
            error!(error = %e, "Failed to encode metrics");
            (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
        }
    }
}

/// GET /healthz - the process answers, so it is alive
async fn healthz() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// GET /readyz
async fn readyz(State(state): State<Arc<AppState>>) -> Response {
    if state.aggregator.is_ready() {
        StatusCode::NO_CONTENT.into_response()
    } else {
        warn!("Ready request but not connected to update engine yet");
        (StatusCode::SERVICE_UNAVAILABLE, NOT_READY_MESSAGE).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::ExporterMetrics;
    use crate::status::{OperationState, StatusSnapshot};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use tower::ServiceExt;

    fn state(mode: OperatingMode) -> Arc<AppState> {
        let metrics = ExporterMetrics::with_uptime_provider(Box::new(|| Ok(42))).unwrap();
        Arc::new(AppState {
            aggregator: Arc::new(StatusAggregator::new(metrics)),
            mode,
        })
    }

    async fn get(state: Arc<AppState>, uri: &str) -> (StatusCode, String) {
        let response = build_router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn test_healthz_always_no_content() {
        let (status, body) = get(state(OperatingMode::Live), "/healthz").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
        assert!(body.is_empty());
    }

    #[tokio::test]
    async fn test_readyz_follows_first_event() {
        let state = state(OperatingMode::Live);

        let (status, body) = get(Arc::clone(&state), "/readyz").await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body, NOT_READY_MESSAGE);

        state.aggregator.apply(&StatusSnapshot::new(OperationState::Idle));
        let (status, _) = get(state, "/readyz").await;
        assert_eq!(status, StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn test_metrics_exposition() {
        let state = state(OperatingMode::Live);
        state.aggregator.apply(
            &StatusSnapshot::new(OperationState::Downloading)
                .with_progress(0.5)
                .with_last_checked_time(1000),
        );

        let response = build_router(Arc::clone(&state))
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers().get(header::CONTENT_TYPE).unwrap(),
            prometheus::TEXT_FORMAT
        );

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("flatcar_linux_update_engine_status{op=\"DOWNLOADING\"} 1"));
        assert!(text.contains("flatcar_linux_update_engine_status{op=\"IDLE\"} 0"));
        assert!(text.contains("flatcar_linux_update_engine_update_progress_pct 0.5"));
        assert!(text.contains("flatcar_linux_update_engine_last_checked_time_s 1000"));
        assert!(text.contains("flatcar_linux_update_engine_system_uptime_s 42"));
    }

    #[tokio::test]
    async fn test_landing_page_links_endpoints() {
        let (status, body) = get(state(OperatingMode::Degraded), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.contains("href=\"/metrics\""));
        assert!(body.contains("Pretend mode"));
        assert!(!body.contains("{{"));

        let (_, body) = get(state(OperatingMode::Live), "/").await;
        assert!(!body.contains("Pretend mode"));
    }

    #[tokio::test]
    async fn test_unknown_path_not_found() {
        let (status, _) = get(state(OperatingMode::Live), "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
