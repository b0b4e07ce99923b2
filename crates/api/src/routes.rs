use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;

use choreo_dispatcher::ChoreographyInterpreter;
use choreo_domain::CompositionCodec;

use crate::handlers::{
    choreography::{construct, execute_choreography, invoke_method},
    health::health_check,
};

/// API应用状态
#[derive(Clone)]
pub struct AppState {
    pub interpreter: Arc<ChoreographyInterpreter>,
    pub codec: Arc<dyn CompositionCodec>,
}

/// 创建API路由
pub fn create_routes(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        // 组合执行与转发入口
        .route("/choreography", post(execute_choreography))
        // 单次调用
        .route("/{class}/__construct", post(construct))
        .route("/{class}/{id}/{method}", post(invoke_method))
        .with_state(state)
}
