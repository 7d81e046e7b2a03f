//! # Query API
//!
//! Read-only HTTP JSON endpoints over the sample store, plus the on-demand
//! external health probe. The router is built around an [`AppState`] holding
//! the shared services; [`ApiServer`] serves it until shutdown.

use crate::alerts::ThresholdEvaluator;
use crate::config::Config;
use crate::core::{HealthProbe, HostInfo, MetricsStore};
use crate::internal_metrics::Metrics;
use axum::{routing::get, Router};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

mod error;
pub mod handlers;

pub use error::ApiError;

/// Services shared by every handler.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetricsStore>,
    pub host: Arc<dyn HostInfo>,
    pub probe: Arc<dyn HealthProbe>,
    pub evaluator: Arc<ThresholdEvaluator>,
    pub metrics: Arc<Metrics>,
    pub config: Arc<Config>,
}

/// Builds the API router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/system", get(handlers::system_info))
        .route("/api/metrics/latest", get(handlers::latest))
        .route("/api/history", get(handlers::history))
        .route("/api/alerts", get(handlers::alerts))
        .route("/api/odoo/health", get(handlers::probe))
        .layer(CorsLayer::very_permissive())
        .with_state(state)
}

/// Serves the API on an already bound listener.
pub struct ApiServer {
    listener: TcpListener,
    router: Router,
    shutdown_rx: watch::Receiver<bool>,
}

impl ApiServer {
    pub fn new(listener: TcpListener, state: AppState, shutdown_rx: watch::Receiver<bool>) -> Self {
        Self {
            listener,
            router: router(state),
            shutdown_rx,
        }
    }

    /// Returns a future that serves requests until a shutdown signal is received.
    pub fn run(self) -> impl Future<Output = ()> {
        let Self {
            listener,
            router,
            mut shutdown_rx,
        } = self;

        async move {
            let shutdown = async move {
                let _ = shutdown_rx.changed().await;
                info!("API server received shutdown signal.");
            };
            if let Err(e) = axum::serve(listener, router).with_graceful_shutdown(shutdown).await {
                error!("API server error: {}", e);
            }
            info!("API server finished.");
        }
    }
}
