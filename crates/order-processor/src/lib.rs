//! Order processor service.
//!
//! Runs the processing scheduler in the background and exposes a small HTTP
//! surface for operators: health, Prometheus metrics and the current queue
//! size.

pub mod config;
pub mod error;
pub mod routes;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::get;
use metrics_exporter_prometheus::PrometheusHandle;
use order_stream::OrderStream;
use processor::SchedulerHandle;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

/// Shared state for the HTTP handlers.
pub struct AppState {
    pub stream: Arc<dyn OrderStream>,
    pub stream_key: String,
    /// Deadline for stream queries made by handlers.
    pub call_timeout: Duration,
}

impl AppState {
    pub fn new(stream: Arc<dyn OrderStream>, stream_key: impl Into<String>) -> Self {
        Self {
            stream,
            stream_key: stream_key.into(),
            call_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::get))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/queue/size", get(routes::queue::size))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Serves `app` on a bound `listener` until `shutdown` resolves, then stops
/// the scheduler, waiting up to `grace` for a tick in progress.
///
/// The scheduler is stopped whether or not the server exited cleanly.
pub async fn serve<F>(
    listener: TcpListener,
    app: Router,
    scheduler: SchedulerHandle,
    grace: Duration,
    shutdown: F,
) -> std::io::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await;

    if !scheduler.shutdown(grace).await {
        tracing::warn!("scheduler aborted mid-tick; its entries will be reclaimed");
    }
    served
}
