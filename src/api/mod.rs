//! API 模块

pub mod app_state;
pub mod events;
pub mod ws;

pub use app_state::AppState;
pub use events::{ChatEvent, EventSink};

use axum::{Json, Router, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

/// 创建 API 路由
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(service_banner))
        .route("/ws/chat", get(ws::chat_ws_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn service_banner() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "Agrichat Server"
    }))
}
