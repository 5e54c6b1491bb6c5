//! Server crate provides HTTP server functionality.
//!
//! This module exposes the purchase service over HTTP: nearby merchant search,
//! delivery estimates, order confirmation and order history, plus health and
//! Prometheus endpoints.

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::{
    Json, Router,
    extract::{MatchedPath, Path, Query, State, rejection::{JsonRejection, PathRejection, QueryRejection}},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use service::PurchaseService;
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{error, info};

mod dto;
mod error;
mod metrics;

pub use dto::{EstimateBody, ListQuery, NearbyResponse, OrderBody, OrderCreated, PageMeta, parse_coordinates};
pub use error::ApiError;
pub use metrics::Metrics;

/// Header carrying the opaque id of the calling user.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Server represents the HTTP front of the purchase service.
pub struct Server {
    port: u16,
    state: AppState,
}

/// Application state shared between request handlers
#[derive(Clone)]
struct AppState {
    service: Arc<dyn PurchaseService>,
    metrics: Arc<Metrics>,
    shutdown: CancellationToken,
}

impl AppState {
    /// A token for one request. It fires when the server shuts down or when the
    /// returned guard is dropped, which happens if the client disconnects.
    fn request_token(&self) -> (CancellationToken, DropGuard) {
        let token = self.shutdown.child_token();
        let guard = token.clone().drop_guard();
        (token, guard)
    }
}

impl Server {
    /// Creates a new Server instance.
    ///
    /// # Arguments
    ///
    /// * `port` - The port on which the server will listen
    /// * `service` - The purchase service handling every API call
    /// * `shutdown` - Cancelled to stop accepting requests and abort in-flight work
    ///
    /// # Errors
    ///
    /// Fails if the Prometheus collectors cannot be registered.
    pub fn new(port: u16, service: Arc<dyn PurchaseService>, shutdown: CancellationToken) -> Result<Self> {
        info!("Initializing HTTP server on port {}", port);
        let metrics = Metrics::new().context("Failed to register HTTP metrics")?;

        Ok(Self {
            port,
            state: AppState {
                service,
                metrics: Arc::new(metrics),
                shutdown,
            },
        })
    }

    /// Starts the server and blocks until the shutdown token is cancelled.
    pub async fn start(&self) -> Result<()> {
        let app = self.router();

        let listener = TcpListener::bind(("0.0.0.0", self.port))
            .await
            .context("Failed to bind to port")?;

        info!("HTTP server listening on port {}", self.port);

        axum::serve(listener, app)
            .with_graceful_shutdown(self.state.shutdown.clone().cancelled_owned())
            .await
            .context("Server error")?;

        info!("HTTP server shut down gracefully");
        Ok(())
    }

    /// The full route table with the metrics middleware applied.
    pub fn router(&self) -> Router {
        Router::new()
            .route("/merchants/nearby/{coords}", get(Self::handle_nearby))
            .route("/users/estimate", post(Self::handle_estimate))
            .route("/users/orders", post(Self::handle_confirm_order).get(Self::handle_order_history))
            .route("/health", get(Self::handle_health))
            .route("/metrics", get(Self::handle_metrics))
            .layer(axum::middleware::from_fn_with_state(
                self.state.metrics.clone(),
                Self::metrics_middleware,
            ))
            .with_state(self.state.clone())
    }

    /// Middleware for collecting metrics on HTTP requests
    async fn metrics_middleware(
        State(metrics): State<Arc<Metrics>>,
        req: axum::extract::Request,
        next: axum::middleware::Next,
    ) -> Response {
        let method = req.method().to_string();
        // Route templates keep label cardinality bounded.
        let endpoint = req
            .extensions()
            .get::<MatchedPath>()
            .map_or_else(|| "unmatched".to_string(), |p| p.as_str().to_string());

        if let Some(size) = content_length(req.headers()) {
            metrics.record_network_traffic("in", size);
        }

        let start = std::time::Instant::now();
        let response = next.run(req).await;
        let status = response.status();

        metrics.record_request(&method, &endpoint, status.as_u16(), start.elapsed());
        if status.is_client_error() {
            metrics.record_error("client", &endpoint);
        } else if status.is_server_error() {
            metrics.record_error("server", &endpoint);
        }

        if let Some(size) = content_length(response.headers()) {
            metrics.record_network_traffic("out", size);
        }

        response
    }

    async fn handle_nearby(
        State(state): State<AppState>,
        coords: Result<Path<String>, PathRejection>,
        query: Result<Query<ListQuery>, QueryRejection>,
    ) -> Result<Json<NearbyResponse>, ApiError> {
        let Path(coords) = coords?;
        let Query(query) = query?;
        let user_location = parse_coordinates(&coords)?;

        let (cancel, _guard) = state.request_token();
        let page = state
            .service
            .find_nearby(&cancel, &query.into_nearby(user_location))
            .await?;
        Ok(Json(page.into()))
    }

    async fn handle_estimate(
        State(state): State<AppState>,
        headers: HeaderMap,
        body: Result<Json<EstimateBody>, JsonRejection>,
    ) -> Result<Response, ApiError> {
        let user_id = user_id(&headers)?;
        let Json(body) = body?;
        let request = body.into_request(user_id)?;

        let (cancel, _guard) = state.request_token();
        let quote = state.service.create_estimate(&cancel, &request).await?;
        Ok((StatusCode::OK, Json(quote)).into_response())
    }

    async fn handle_confirm_order(
        State(state): State<AppState>,
        headers: HeaderMap,
        body: Result<Json<OrderBody>, JsonRejection>,
    ) -> Result<Response, ApiError> {
        user_id(&headers)?;
        let Json(body) = body?;

        let (cancel, _guard) = state.request_token();
        let order_id = state.service.confirm_order(&cancel, &body.estimate_id).await?;
        Ok((StatusCode::CREATED, Json(OrderCreated { order_id })).into_response())
    }

    async fn handle_order_history(
        State(state): State<AppState>,
        headers: HeaderMap,
        query: Result<Query<ListQuery>, QueryRejection>,
    ) -> Result<Response, ApiError> {
        let user_id = user_id(&headers)?;
        let Query(query) = query?;

        let (cancel, _guard) = state.request_token();
        let history = state
            .service
            .get_order_history(&cancel, &user_id, &query.into_history())
            .await?;
        Ok(Json(history).into_response())
    }

    async fn handle_health() -> &'static str {
        "OK"
    }

    async fn handle_metrics(State(state): State<AppState>) -> Response {
        match state.metrics.encode() {
            Ok(metrics_text) => (StatusCode::OK, metrics_text).into_response(),
            Err(e) => {
                error!("{}", e);
                (StatusCode::INTERNAL_SERVER_ERROR, "Failed to encode metrics").into_response()
            }
        }
    }
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(axum::http::header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<usize>().ok())
        .filter(|size| *size > 0)
}

fn user_id(headers: &HeaderMap) -> Result<String, ApiError> {
    headers
        .get(USER_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
        .ok_or(ApiError::Unauthorized)
}

/// Waits for a shutdown signal (Ctrl+C or SIGTERM).
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
