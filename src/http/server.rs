//! HTTP server setup and configuration.
//!
//! # Responsibilities
//! - Create Axum Router with the catch-all gateway handler
//! - Wire up middleware (tracing, limits, timeout, request ID, panic recovery)
//! - Bind server to listener with graceful shutdown
//! - Dispatch requests to the mounted configuration source

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{DefaultBodyLimit, State},
    http::{Request, StatusCode},
    response::{IntoResponse, Response},
    routing::any,
    Json, Router,
};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tower_http::{
    catch_panic::CatchPanicLayer,
    limit::RequestBodyLimitLayer,
    request_id::{PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::backend::BackendRegistry;
use crate::config::GatewaySettings;
use crate::http::request::{request_id, MakeRequestUuid, X_REQUEST_ID};
use crate::observability::metrics;
use crate::orchestrator::{GatewayRequest, RequestError, RequestOrchestrator};
use crate::routing::MountTable;

/// Application state injected into handlers.
#[derive(Clone)]
pub struct AppState {
    pub mounts: Arc<MountTable>,
    pub orchestrator: Arc<RequestOrchestrator>,
}

/// HTTP server for the gateway.
pub struct HttpServer {
    router: Router,
    mounts: Arc<MountTable>,
    orchestrator: Arc<RequestOrchestrator>,
}

impl HttpServer {
    /// Create a new HTTP server with the given settings and backends.
    pub fn new(settings: &GatewaySettings, registry: Arc<BackendRegistry>) -> Self {
        let mounts = Arc::new(MountTable::from_config(&settings.mounts));
        let orchestrator = Arc::new(RequestOrchestrator::new(registry, settings.parameters.clone()));

        let state = AppState {
            mounts: mounts.clone(),
            orchestrator: orchestrator.clone(),
        };

        let router = Self::build_router(settings, state);
        Self {
            router,
            mounts,
            orchestrator,
        }
    }

    /// Build the Axum router with all middleware layers.
    #[allow(deprecated)]
    fn build_router(settings: &GatewaySettings, state: AppState) -> Router {
        Router::new()
            .route("/{*path}", any(gateway_handler))
            .route("/", any(gateway_handler))
            .with_state(state)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(settings.security.max_body_size))
            .layer(TimeoutLayer::new(Duration::from_secs(settings.timeouts.request_secs)))
            .layer(CatchPanicLayer::new())
            .layer(TraceLayer::new_for_http().make_span_with(|request: &Request<Body>| {
                tracing::info_span!(
                    "request",
                    request_id = %request_id(request),
                    method = %request.method(),
                    path = %request.uri().path(),
                )
            }))
            .layer(PropagateRequestIdLayer::new(X_REQUEST_ID))
            .layer(SetRequestIdLayer::new(X_REQUEST_ID, MakeRequestUuid))
    }

    /// The configured router, for in-process use.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    pub fn orchestrator(&self) -> &Arc<RequestOrchestrator> {
        &self.orchestrator
    }

    pub fn mounts(&self) -> &Arc<MountTable> {
        &self.mounts
    }

    /// Run the server until `shutdown` fires.
    pub async fn run(self, listener: TcpListener, mut shutdown: broadcast::Receiver<()>) -> Result<(), std::io::Error> {
        let addr = listener.local_addr()?;
        tracing::info!(address = %addr, "HTTP server starting");

        axum::serve(listener, self.router)
            .with_graceful_shutdown(async move {
                let _ = shutdown.recv().await;
                tracing::info!("Shutdown signal received");
            })
            .await?;

        tracing::info!("HTTP server stopped");
        Ok(())
    }
}

/// Catch-all handler: mount lookup, then the orchestrator.
async fn gateway_handler(State(state): State<AppState>, request: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = request_id(&request);
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let query = request.uri().query().unwrap_or_default().to_string();

    let body = match axum::body::to_bytes(request.into_body(), usize::MAX).await {
        Ok(body) => body,
        Err(e) => {
            tracing::warn!(request_id = %request_id, error = %e, "Failed to read request body");
            metrics::record_request(&method, StatusCode::PAYLOAD_TOO_LARGE.as_u16(), start);
            let payload = json!({"error": "body", "message": e.to_string()});
            return (StatusCode::PAYLOAD_TOO_LARGE, Json(payload)).into_response();
        }
    };

    let result = match state.mounts.match_path(&path) {
        Some(mount) => {
            state
                .orchestrator
                .process(GatewayRequest {
                    source: mount.source,
                    method: &method,
                    path: mount.path,
                    query: &query,
                    body: &body,
                })
                .await
        }
        None => Err(RequestError::NotFound(format!("{method} {path}"))),
    };

    let response = match result {
        Ok(value) => (StatusCode::OK, Json(value)).into_response(),
        Err(e) => {
            tracing::warn!(
                request_id = %request_id,
                method = %method,
                path = %path,
                error = %e,
                "Request failed"
            );
            e.into_response()
        }
    };

    metrics::record_request(&method, response.status().as_u16(), start);
    response
}
