//! fleetpulse-api — REST + SSE surface for FleetPulse.
//!
//! Provides axum route handlers over the live state store and the
//! durable store. Reads are served from whichever side owns the data:
//! snapshots and the stream from memory, incidents and outages from
//! storage.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/snapshot` | Point-in-time fleet snapshot |
//! | GET | `/api/v1/stream` | SSE: snapshot, then incremental updates |
//! | GET | `/api/v1/hosts` | List hosts (optionally `?group=`) |
//! | POST | `/api/v1/hosts` | Add or replace a host |
//! | DELETE | `/api/v1/hosts/{id}` | Remove a host |
//! | GET | `/api/v1/hosts/{id}/incidents` | Reconstruct outage history |
//! | GET | `/api/v1/hosts/{id}/state` | Confirmed row + trailing sample run |
//! | GET | `/api/v1/outages` | Hosts currently confirmed down |
//! | GET | `/healthz` | Liveness + degraded flag |

pub mod handlers;
pub mod stream;

use std::sync::Arc;

use axum::Router;
use axum::routing::get;

use fleetpulse_engine::DebouncePolicy;
use fleetpulse_live::LiveStateStore;
use fleetpulse_store::DurableStore;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub store: Arc<dyn DurableStore>,
    pub live: Arc<LiveStateStore>,
    /// Defaults for incident reconstruction when the query omits
    /// thresholds.
    pub policy: DebouncePolicy,
    pub min_incident_samples: usize,
}

/// Build the complete API router.
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/snapshot", get(handlers::get_snapshot))
        .route("/stream", get(stream::stream_updates))
        .route("/hosts", get(handlers::list_hosts).post(handlers::put_host))
        .route("/hosts/{id}", axum::routing::delete(handlers::delete_host))
        .route("/hosts/{id}/incidents", get(handlers::get_incidents))
        .route("/hosts/{id}/state", get(handlers::get_host_state))
        .route("/outages", get(handlers::list_outages))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/healthz", get(handlers::healthz).with_state(state))
}
