//! 可观测性模块
//!
//! 提供原子计数指标、Prometheus 文本端点和健康检查。

use axum::{Json, Router, extract::State, response::IntoResponse, routing::get};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};

// ===== Simple Metrics (using atomics for zero-dep implementation) =====

/// 应用指标
#[derive(Clone, Default)]
pub struct AppMetrics {
    pub active_connections: Arc<AtomicI64>,
    pub turns_total: Arc<AtomicU64>,
    pub generation_errors_total: Arc<AtomicU64>,
    pub special_replies_total: Arc<AtomicU64>,
    pub sessions_expired_total: Arc<AtomicU64>,
}

impl AppMetrics {
    /// 记录连接增减
    pub fn record_connection(&self, delta: i64) {
        self.active_connections.fetch_add(delta, Ordering::SeqCst);
    }

    /// 记录完成的对话轮次
    pub fn record_turn(&self) {
        self.turns_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录生成失败
    pub fn record_generation_error(&self) {
        self.generation_errors_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录短路应答
    pub fn record_special_reply(&self) {
        self.special_replies_total.fetch_add(1, Ordering::SeqCst);
    }

    /// 记录被清扫的空闲会话
    pub fn record_sessions_expired(&self, count: u64) {
        self.sessions_expired_total.fetch_add(count, Ordering::SeqCst);
    }

    /// 生成 Prometheus 格式指标
    pub fn gather(&self) -> String {
        format!(
            r#"# HELP chat_active_connections Active chat connections
# TYPE chat_active_connections gauge
chat_active_connections {}
# HELP chat_turns_total Completed chat turns
# TYPE chat_turns_total counter
chat_turns_total {}
# HELP chat_generation_errors_total Token generator failures
# TYPE chat_generation_errors_total counter
chat_generation_errors_total {}
# HELP chat_special_replies_total Short-circuited synthetic replies
# TYPE chat_special_replies_total counter
chat_special_replies_total {}
# HELP chat_sessions_expired_total Sessions reclaimed by the idle sweep
# TYPE chat_sessions_expired_total counter
chat_sessions_expired_total {}
"#,
            self.active_connections.load(Ordering::SeqCst),
            self.turns_total.load(Ordering::SeqCst),
            self.generation_errors_total.load(Ordering::SeqCst),
            self.special_replies_total.load(Ordering::SeqCst),
            self.sessions_expired_total.load(Ordering::SeqCst),
        )
    }
}

// ===== Health Check =====

/// 健康检查状态
#[derive(Debug, Serialize)]
pub struct HealthStatus {
    pub status: &'static str,
    pub service: String,
    pub version: String,
    pub started_at: DateTime<Utc>,
}

/// 可观测性路由状态
#[derive(Clone)]
pub struct ObservabilityState {
    pub metrics: AppMetrics,
    service: String,
    version: String,
    started_at: DateTime<Utc>,
}

impl ObservabilityState {
    pub fn new(service: &str, version: &str, metrics: AppMetrics) -> Self {
        Self {
            metrics,
            service: service.to_string(),
            version: version.to_string(),
            started_at: Utc::now(),
        }
    }
}

async fn healthz(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    Json(HealthStatus {
        status: "ok",
        service: state.service.clone(),
        version: state.version.clone(),
        started_at: state.started_at,
    })
}

async fn metrics(State(state): State<Arc<ObservabilityState>>) -> impl IntoResponse {
    state.metrics.gather()
}

/// 创建可观测性路由
pub fn create_observability_router(state: Arc<ObservabilityState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics))
        .with_state(state)
}
