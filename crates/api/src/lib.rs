//! # Choreo API
//!
//! 编排服务器的 HTTP 接口，基于 Axum 构建。
//!
//! ## API 端点
//!
//! - `POST /choreography` - 执行组合（或其中一个窗口），请求体为 `{composition, bound?, kwargs}`
//! - `POST /{class}/__construct` - 单次构造，请求体为 `{"i1": ..., "i2": ...}`
//! - `POST /{class}/{id}/{method}` - 在已持久化的实例上单次调用
//! - `GET /health` - 健康检查
//!
//! 所有调用都返回 `{"state": {...}}`，其中是执行结束后的完整状态表。
//!
//! ## 错误响应
//!
//! ```json
//! {
//!   "error": {
//!     "message": "组合结构错误: ...",
//!     "type": "MALFORMED_COMPOSITION",
//!     "code": 400,
//!     "timestamp": "2024-01-01T00:00:00Z"
//!   }
//! }
//! ```
//!
//! 结构错误返回 400，下游主机不可达返回 502。单个步骤的失败不会出现在这里，
//! 它们只记录日志，对应的输出不会写入状态表。

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod routes;

use axum::Router;
use std::sync::Arc;
use tower::ServiceBuilder;

use choreo_dispatcher::ChoreographyInterpreter;
use choreo_domain::CompositionCodec;
use middleware::{cors_layer, request_logging, trace_layer};
pub use routes::{create_routes, AppState};

/// 创建完整的API应用
pub fn create_app(interpreter: Arc<ChoreographyInterpreter>, codec: Arc<dyn CompositionCodec>) -> Router {
    let state = AppState { interpreter, codec };

    create_routes(state).layer(
        ServiceBuilder::new()
            .layer(trace_layer())
            .layer(cors_layer())
            .layer(axum::middleware::from_fn(request_logging)),
    )
}
