//! gwscale-api — read-only status surface for a running controller.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/state` | Engine state of the managed pool |
//! | GET | `/api/v1/report` | Latest stored tick report (404 if none) |
//! | GET | `/api/v1/reports?limit=N` | Recent tick reports, newest first |
//! | GET | `/api/v1/pools` | Pools with stored state |
//! | GET | `/metrics` | Prometheus exposition |
//! | GET | `/healthz` | Liveness |

pub mod handlers;

use axum::Router;
use axum::routing::get;
use gwscale_state::StateStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: StateStore,
    /// Key of the pool this process manages.
    pub pool: String,
}

/// Build the complete router.
pub fn build_router(store: StateStore, pool: impl Into<String>) -> Router {
    let api_state = ApiState {
        store,
        pool: pool.into(),
    };

    let api_routes = Router::new()
        .route("/state", get(handlers::get_state))
        .route("/report", get(handlers::latest_report))
        .route("/reports", get(handlers::list_reports))
        .route("/pools", get(handlers::list_pools))
        .with_state(api_state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(api_state))
        .route("/healthz", get(handlers::healthz))
}
