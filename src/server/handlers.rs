/// API Request Handlers
/// Every handler reads the current snapshot; none of them trigger sampling

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::view::{self, Dashboard, SamplerStatus};
use super::AppState;
use crate::core::{HostFacts, Snapshot};
use crate::utils::format_duration;

// ============================================================================
// Response Types
// ============================================================================

#[derive(Serialize)]
pub struct ApiResponse<T> {
    success: bool,
    data: Option<T>,
    error: Option<String>,
}

impl<T> ApiResponse<T> {
    fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct DashboardQuery {
    /// Mount point to report under `disk`
    #[serde(default)]
    disk: Option<String>,
}

impl DashboardQuery {
    pub fn disk(self) -> Option<String> {
        self.disk.filter(|d| !d.is_empty())
    }
}

#[derive(Serialize)]
pub struct HealthInfo {
    status: &'static str,
    generation: u64,
    last_update_age_ms: Option<i64>,
    uptime: String,
    version: String,
}

// ============================================================================
// Dashboard Handlers
// ============================================================================

/// Formatted metrics consumed by the embedded dashboard
pub async fn get_dashboard(
    State(state): State<AppState>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<Dashboard>, StatusCode> {
    let snapshot = state.store.read();
    Ok(Json(view::dashboard(&snapshot, &state.facts, query.disk().as_deref())))
}

// ============================================================================
// Raw Data Handlers
// ============================================================================

pub async fn get_snapshot(State(state): State<AppState>) -> Result<Json<ApiResponse<Snapshot>>, StatusCode> {
    let snapshot = state.store.read();
    Ok(Json(ApiResponse::ok(Snapshot::clone(&snapshot))))
}

pub async fn get_host(State(state): State<AppState>) -> Result<Json<ApiResponse<HostFacts>>, StatusCode> {
    Ok(Json(ApiResponse::ok(HostFacts::clone(&state.facts))))
}

pub async fn get_sampler_status(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<SamplerStatus>>, StatusCode> {
    let snapshot = state.store.read();
    Ok(Json(ApiResponse::ok(view::sampler_status(&snapshot, &state.sampler))))
}

// ============================================================================
// Monitoring Handlers
// ============================================================================

pub async fn health_check(State(state): State<AppState>) -> Result<Json<ApiResponse<HealthInfo>>, StatusCode> {
    let snapshot = state.store.read();
    let now = chrono::Utc::now();
    let uptime = (now - state.started_at).num_seconds().max(0) as u64;

    let health = HealthInfo {
        status: if snapshot.is_empty() { "starting" } else { "healthy" },
        generation: snapshot.generation,
        last_update_age_ms: snapshot.updated_at.map(|t| (now - t).num_milliseconds().max(0)),
        uptime: format_duration(uptime),
        version: state.facts.monitor_version.clone(),
    };

    Ok(Json(ApiResponse::ok(health)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::facts::CpuFacts;
    use crate::core::payload::{MemoryStats, Payload};
    use crate::core::snapshot::{CategoryEntry, Failure};
    use crate::core::{MetricCategory, MetricValue, SamplerConfig, SnapshotStore};
    use crate::server::create_router;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use serde_json::Value;
    use std::time::Duration;
    use tower::ServiceExt;

    fn state() -> AppState {
        let facts = HostFacts {
            hostname: Some("box".to_string()),
            os_name: None,
            os_version: None,
            kernel_version: None,
            cpu: CpuFacts {
                brand: "Test CPU".to_string(),
                vendor: String::new(),
                logical_cores: 2,
                physical_cores: None,
                max_frequency_mhz: 0,
            },
            total_memory_bytes: 0,
            total_swap_bytes: 0,
            boot_time: 0,
            monitor_version: "test".to_string(),
        };
        AppState::new(SnapshotStore::new(), facts, SamplerConfig::default())
    }

    async fn get_json(state: AppState, uri: &str) -> (StatusCode, Value) {
        let response = create_router(state, false)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    fn seed(state: &AppState) {
        state.store.merge([
            (
                MetricCategory::Memory,
                CategoryEntry::new(
                    MetricValue::Ok(Payload::Memory(MemoryStats {
                        total_bytes: 1 << 30,
                        used_bytes: 1 << 29,
                        available_bytes: 1 << 29,
                        percent: 50.0,
                        swap_total_bytes: 0,
                        swap_used_bytes: 0,
                    })),
                    chrono::Utc::now(),
                    Duration::from_millis(1),
                ),
            ),
            (
                MetricCategory::Gpu,
                CategoryEntry::new(
                    MetricValue::Failed(Failure::unavailable("no GPU")),
                    chrono::Utc::now(),
                    Duration::from_millis(1),
                ),
            ),
        ]);
    }

    #[tokio::test]
    async fn test_dashboard_before_first_tick() {
        let (status, json) = get_json(state(), "/metrics").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["cpu"]["status"], "pending");
        assert_eq!(json["generation"], 0);
        assert!(json["timestamp"].is_null());
    }

    #[tokio::test]
    async fn test_dashboard_mixes_values_and_markers() {
        let state = state();
        seed(&state);

        let (status, json) = get_json(state, "/metrics?disk=/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(json["memory"]["percent"], 50.0);
        assert_eq!(json["memory"]["total"], "1.00 GB");
        assert_eq!(json["gpu"]["status"], "unavailable");
        assert_eq!(json["disk"]["status"], "pending");
        assert_eq!(json["hostname"], "box");
    }

    #[tokio::test]
    async fn test_snapshot_endpoint() {
        let state = state();
        seed(&state);

        let (_, json) = get_json(state, "/api/snapshot").await;
        assert_eq!(json["success"], true);
        assert_eq!(json["data"]["generation"], 1);
        assert_eq!(json["data"]["categories"]["memory"]["status"], "ok");
        assert_eq!(json["data"]["categories"]["gpu"]["status"], "failed");
    }

    #[tokio::test]
    async fn test_host_and_sampler_endpoints() {
        let (_, host) = get_json(state(), "/api/host").await;
        assert_eq!(host["data"]["cpu"]["brand"], "Test CPU");

        let (_, sampler) = get_json(state(), "/api/sampler").await;
        assert_eq!(sampler["data"]["base_interval_ms"], 1000);
        assert_eq!(sampler["data"]["categories"].as_array().unwrap().len(), MetricCategory::ALL.len());
    }

    #[tokio::test]
    async fn test_health_check() {
        let state = state();
        let (_, json) = get_json(state.clone(), "/api/health").await;
        assert_eq!(json["data"]["status"], "starting");

        seed(&state);
        let (_, json) = get_json(state, "/api/health").await;
        assert_eq!(json["data"]["status"], "healthy");
        assert_eq!(json["data"]["generation"], 1);
    }

    #[tokio::test]
    async fn test_index_served() {
        let response = create_router(state(), false)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let content_type = response.headers()[axum::http::header::CONTENT_TYPE].to_str().unwrap();
        assert!(content_type.starts_with("text/html"));
    }
}
