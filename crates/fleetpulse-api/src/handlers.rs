//! REST API handlers.
//!
//! Each handler reads via `LiveStateStore` or `DurableStore` and
//! returns JSON responses in a consistent envelope.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use fleetpulse_core::{Host, HostState, epoch_ms};
use fleetpulse_engine::{
    DebouncePolicy, ReconstructOptions, Sample, current_host_state, reconstruct,
};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> impl IntoResponse {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
}

// ── Snapshot ───────────────────────────────────────────────────

/// GET /api/v1/snapshot
pub async fn get_snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.live.snapshot().await)
}

// ── Hosts ──────────────────────────────────────────────────────

#[derive(serde::Deserialize)]
pub struct HostsQuery {
    pub group: Option<String>,
}

/// GET /api/v1/hosts
pub async fn list_hosts(
    State(state): State<ApiState>,
    Query(q): Query<HostsQuery>,
) -> impl IntoResponse {
    let result = match q.group.as_deref() {
        Some(group) => state.store.list_hosts(group),
        None => state.store.list_all_hosts(),
    };
    match result {
        Ok(hosts) => ApiResponse::ok(hosts).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// POST /api/v1/hosts
pub async fn put_host(
    State(state): State<ApiState>,
    Json(host): Json<Host>,
) -> impl IntoResponse {
    if host.id.is_empty() || host.ip.is_empty() || host.group.is_empty() {
        return error_response("host id, ip and group are required", StatusCode::BAD_REQUEST)
            .into_response();
    }
    // ':' delimits composite storage keys.
    if host.id.contains(':') {
        return error_response("host id must not contain ':'", StatusCode::BAD_REQUEST)
            .into_response();
    }
    match state.store.put_host(&host) {
        Ok(()) => (StatusCode::CREATED, ApiResponse::ok(host)).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

/// DELETE /api/v1/hosts/:id
pub async fn delete_host(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.store.remove_host(&id) {
        Ok(true) => ApiResponse::ok("deleted").into_response(),
        Ok(false) => error_response("host not found", StatusCode::NOT_FOUND).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Incidents ──────────────────────────────────────────────────

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

#[derive(serde::Deserialize)]
pub struct IncidentsQuery {
    pub start: Option<u64>,
    pub end: Option<u64>,
    pub fail_threshold: Option<u32>,
    pub recovery_threshold: Option<u32>,
}

/// GET /api/v1/hosts/:id/incidents
///
/// Replays stored raw samples through the consecutive-run
/// reconstructor. Defaults to the trailing 24 hours and the configured
/// thresholds; both are overridable per query.
pub async fn get_incidents(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(q): Query<IncidentsQuery>,
) -> impl IntoResponse {
    let end = q.end.unwrap_or_else(epoch_ms);
    let start = q.start.unwrap_or_else(|| end.saturating_sub(DAY_MS));
    if start > end {
        return error_response("start must not exceed end", StatusCode::BAD_REQUEST)
            .into_response();
    }

    let policy = DebouncePolicy {
        fail_threshold: q.fail_threshold.unwrap_or(state.policy.fail_threshold),
        recovery_threshold: q
            .recovery_threshold
            .unwrap_or(state.policy.recovery_threshold),
    };
    if let Err(e) = policy.validate() {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    // Seed the range from the durable state: an active Offline row from
    // before the range marks open incidents as ongoing-throughout.
    let initial_state = match state.store.current_state(&id) {
        Ok(Some(row)) if row.state == HostState::Offline && row.changed_at_ms <= start => {
            HostState::Offline
        }
        Ok(_) => HostState::Online,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let rows = match state.store.read_samples(&id, start, end) {
        Ok(rows) => rows,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    let samples: Vec<Sample> = rows
        .iter()
        .map(|r| Sample {
            at_ms: r.at_ms,
            success: r.alive,
        })
        .collect();

    let incidents = reconstruct(
        &samples,
        &ReconstructOptions {
            policy,
            min_samples: state.min_incident_samples,
            initial_state,
        },
    );

    ApiResponse::ok(serde_json::json!({
        "host_id": id,
        "start_ms": start,
        "end_ms": end,
        "sample_count": samples.len(),
        "incidents": incidents,
    }))
    .into_response()
}

// ── Current state ──────────────────────────────────────────────

const HOUR_MS: u64 = 60 * 60 * 1000;

#[derive(serde::Deserialize)]
pub struct StateQuery {
    /// How far back to look for the trailing run; default one hour.
    pub window_ms: Option<u64>,
    pub fail_threshold: Option<u32>,
    pub recovery_threshold: Option<u32>,
}

/// GET /api/v1/hosts/:id/state
///
/// The host's durable confirmed row next to the trailing run of its
/// recent stored samples. A confirmed trailing run means a state flip
/// already applies without waiting for another sample.
pub async fn get_host_state(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Query(q): Query<StateQuery>,
) -> impl IntoResponse {
    let policy = DebouncePolicy {
        fail_threshold: q.fail_threshold.unwrap_or(state.policy.fail_threshold),
        recovery_threshold: q
            .recovery_threshold
            .unwrap_or(state.policy.recovery_threshold),
    };
    if let Err(e) = policy.validate() {
        return error_response(&e.to_string(), StatusCode::BAD_REQUEST).into_response();
    }

    let confirmed = match state.store.current_state(&id) {
        Ok(row) => row,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };

    let end = epoch_ms();
    let start = end.saturating_sub(q.window_ms.unwrap_or(HOUR_MS));
    let rows = match state.store.read_samples(&id, start, end) {
        Ok(rows) => rows,
        Err(e) => {
            return error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR)
                .into_response();
        }
    };
    let samples: Vec<Sample> = rows
        .iter()
        .map(|r| Sample {
            at_ms: r.at_ms,
            success: r.alive,
        })
        .collect();
    let trailing = current_host_state(&samples, &policy);

    ApiResponse::ok(serde_json::json!({
        "host_id": id,
        "confirmed": confirmed,
        "trailing": trailing,
    }))
    .into_response()
}

// ── Outages ────────────────────────────────────────────────────

/// GET /api/v1/outages
pub async fn list_outages(State(state): State<ApiState>) -> impl IntoResponse {
    match state.store.current_outages() {
        Ok(rows) => ApiResponse::ok(rows).into_response(),
        Err(e) => error_response(&e.to_string(), StatusCode::INTERNAL_SERVER_ERROR).into_response(),
    }
}

// ── Health ─────────────────────────────────────────────────────

/// GET /healthz
pub async fn healthz(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(serde_json::json!({
        "status": "ok",
        "degraded": state.live.degraded().await,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use fleetpulse_live::LiveStateStore;
    use fleetpulse_store::{DurableStore, RedbStore, SampleRow};

    fn test_state() -> ApiState {
        ApiState {
            store: Arc::new(RedbStore::open_in_memory().unwrap()),
            live: Arc::new(LiveStateStore::new(500)),
            policy: DebouncePolicy {
                fail_threshold: 3,
                recovery_threshold: 3,
            },
            min_incident_samples: 20,
        }
    }

    fn test_host(id: &str, group: &str) -> Host {
        Host {
            id: id.to_string(),
            ip: "10.1.0.1".to_string(),
            name: format!("host {id}"),
            group: group.to_string(),
        }
    }

    async fn body_json(resp: axum::response::Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn snapshot_returns_ok() {
        let state = test_state();
        let resp = get_snapshot(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["success"], true);
        assert!(body["data"]["groups"].is_object());
    }

    #[tokio::test]
    async fn host_crud_roundtrip() {
        let state = test_state();
        let host = test_host("h1", "branches");

        let resp = put_host(State(state.clone()), Json(host.clone()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::CREATED);

        let resp = list_hosts(State(state.clone()), Query(HostsQuery { group: None }))
            .await
            .into_response();
        let body = body_json(resp).await;
        assert_eq!(body["data"].as_array().unwrap().len(), 1);

        let resp = delete_host(State(state.clone()), Path("h1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);

        let resp = delete_host(State(state), Path("h1".to_string()))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn put_host_rejects_blank_identity() {
        let state = test_state();
        let mut host = test_host("", "branches");
        host.ip = String::new();
        let resp = put_host(State(state), Json(host)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn put_host_rejects_colon_in_id() {
        let state = test_state();
        let host = test_host("h1:x", "branches");
        let resp = put_host(State(state), Json(host)).await.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn list_hosts_filters_by_group() {
        let state = test_state();
        state.store.put_host(&test_host("h1", "branches")).unwrap();
        state.store.put_host(&test_host("h2", "dvrs")).unwrap();

        let resp = list_hosts(
            State(state),
            Query(HostsQuery {
                group: Some("dvrs".to_string()),
            }),
        )
        .await
        .into_response();
        let body = body_json(resp).await;
        let hosts = body["data"].as_array().unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0]["id"], "h2");
    }

    #[tokio::test]
    async fn incidents_reconstructs_stored_samples() {
        let state = test_state();
        // Failing run at t=2..7s, recovery from t=8s.
        for i in 0..14u64 {
            let alive = !(2..=7).contains(&i);
            state
                .store
                .record_sample(&SampleRow {
                    host_id: "h1".to_string(),
                    at_ms: i * 1000,
                    alive,
                    latency_ms: 0.0,
                })
                .unwrap();
        }

        let q = IncidentsQuery {
            start: Some(0),
            end: Some(14_000),
            fail_threshold: Some(3),
            recovery_threshold: Some(3),
        };
        let resp = get_incidents(State(state), Path("h1".to_string()), Query(q))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        let incidents = body["data"]["incidents"].as_array().unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0]["status"], "resolved");
        assert_eq!(incidents[0]["started_at_ms"], 2000);
        assert_eq!(incidents[0]["ended_at_ms"], 7000);
    }

    #[tokio::test]
    async fn incidents_rejects_inverted_range() {
        let state = test_state();
        let q = IncidentsQuery {
            start: Some(10_000),
            end: Some(5_000),
            fail_threshold: None,
            recovery_threshold: None,
        };
        let resp = get_incidents(State(state), Path("h1".to_string()), Query(q))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn incidents_rejects_zero_thresholds() {
        let state = test_state();
        let q = IncidentsQuery {
            start: Some(0),
            end: Some(1_000),
            fail_threshold: Some(0),
            recovery_threshold: None,
        };
        let resp = get_incidents(State(state), Path("h1".to_string()), Query(q))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn incidents_seeds_offline_from_active_row() {
        let state = test_state();
        state
            .store
            .write_active_state("h1", HostState::Offline, 500)
            .unwrap();
        // Sparse failures, never enough successes to recover.
        for i in 0..6u64 {
            state
                .store
                .record_sample(&SampleRow {
                    host_id: "h1".to_string(),
                    at_ms: 1000 + i * 1000,
                    alive: i == 2,
                    latency_ms: 0.0,
                })
                .unwrap();
        }

        let q = IncidentsQuery {
            start: Some(1000),
            end: Some(10_000),
            fail_threshold: Some(3),
            recovery_threshold: Some(3),
        };
        let resp = get_incidents(State(state), Path("h1".to_string()), Query(q))
            .await
            .into_response();
        let body = body_json(resp).await;
        let incidents = body["data"]["incidents"].as_array().unwrap();
        assert_eq!(incidents.len(), 1);
        assert_eq!(incidents[0]["status"], "ongoing_throughout");
    }

    #[tokio::test]
    async fn host_state_reports_confirmed_trailing_run() {
        let state = test_state();
        state
            .store
            .write_active_state("h1", HostState::Online, 0)
            .unwrap();
        // Four trailing failures after a success, past the threshold.
        for i in 0..5u64 {
            state
                .store
                .record_sample(&SampleRow {
                    host_id: "h1".to_string(),
                    at_ms: 1000 + i * 1000,
                    alive: i == 0,
                    latency_ms: 0.0,
                })
                .unwrap();
        }

        let q = StateQuery {
            window_ms: Some(u64::MAX),
            fail_threshold: Some(3),
            recovery_threshold: Some(3),
        };
        let resp = get_host_state(State(state), Path("h1".to_string()), Query(q))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["confirmed"]["state"], "online");
        let trailing = &body["data"]["trailing"];
        assert_eq!(trailing["state"], "offline");
        assert_eq!(trailing["length"], 4);
        assert_eq!(trailing["since_ms"], 2000);
        // The run already meets the threshold: the flip applies now,
        // without waiting for another sample.
        assert_eq!(trailing["confirmed"], true);
    }

    #[tokio::test]
    async fn host_state_without_samples_has_no_trailing_run() {
        let state = test_state();
        let q = StateQuery {
            window_ms: None,
            fail_threshold: None,
            recovery_threshold: None,
        };
        let resp = get_host_state(State(state), Path("h1".to_string()), Query(q))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert!(body["data"]["confirmed"].is_null());
        assert!(body["data"]["trailing"].is_null());
    }

    #[tokio::test]
    async fn host_state_rejects_zero_thresholds() {
        let state = test_state();
        let q = StateQuery {
            window_ms: None,
            fail_threshold: Some(0),
            recovery_threshold: None,
        };
        let resp = get_host_state(State(state), Path("h1".to_string()), Query(q))
            .await
            .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn outages_lists_offline_active_rows() {
        let state = test_state();
        state
            .store
            .write_active_state("h1", HostState::Offline, 1000)
            .unwrap();
        state
            .store
            .write_active_state("h2", HostState::Online, 2000)
            .unwrap();

        let resp = list_outages(State(state)).await.into_response();
        let body = body_json(resp).await;
        let rows = body["data"].as_array().unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["host_id"], "h1");
    }

    #[tokio::test]
    async fn healthz_reports_degraded_flag() {
        let state = test_state();
        state.live.set_degraded(true, "store unreachable").await;
        let resp = healthz(State(state)).await.into_response();
        assert_eq!(resp.status(), StatusCode::OK);
        let body = body_json(resp).await;
        assert_eq!(body["data"]["degraded"], true);
    }
}
