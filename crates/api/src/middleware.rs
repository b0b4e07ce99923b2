use std::fmt;
use std::time::Instant;

use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::Response,
};
use choreo_core::CONSTRUCTOR_METHOD;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::{HttpMakeClassifier, TraceLayer},
};
use tracing::{debug, info, warn};

/// 按路由区分的请求种类，只用于日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestKind {
    /// 组合执行，可能是调用方的首跳，也可能是上游转发来的一段窗口
    Choreography,
    Construct { class: String },
    Call { class: String, id: String, method: String },
    Health,
    Other,
}

impl RequestKind {
    pub fn classify(method: &Method, path: &str) -> Self {
        let segments: Vec<&str> = path.trim_matches('/').split('/').collect();
        if method == Method::GET {
            return match segments.as_slice() {
                ["health"] => RequestKind::Health,
                _ => RequestKind::Other,
            };
        }
        if method != Method::POST {
            return RequestKind::Other;
        }
        match segments.as_slice() {
            ["choreography"] => RequestKind::Choreography,
            [class, ctor] if *ctor == CONSTRUCTOR_METHOD => RequestKind::Construct {
                class: class.to_string(),
            },
            [class, id, method] => RequestKind::Call {
                class: class.to_string(),
                id: id.to_string(),
                method: method.to_string(),
            },
            _ => RequestKind::Other,
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RequestKind::Choreography => write!(f, "组合执行"),
            RequestKind::Construct { class } => write!(f, "单次构造 {class}"),
            RequestKind::Call { class, id, method } => write!(f, "单次调用 {class}/{id}::{method}"),
            RequestKind::Health => write!(f, "健康检查"),
            RequestKind::Other => write!(f, "其它请求"),
        }
    }
}

pub async fn request_logging(request: Request, next: Next) -> Response {
    let kind = RequestKind::classify(request.method(), request.uri().path());
    let uri = request.uri().clone();
    let start = Instant::now();

    if kind == RequestKind::Health {
        let response = next.run(request).await;
        debug!("{kind}: {}", response.status());
        return response;
    }

    info!("收到{kind}: {uri}");
    let response = next.run(request).await;
    let status = response.status();
    let elapsed = start.elapsed();

    match status {
        // 转发链上某一跳失败
        s if s == StatusCode::BAD_GATEWAY => warn!("{kind} 转发失败: {uri} - 耗时: {elapsed:?}"),
        s if s.is_client_error() || s.is_server_error() => {
            warn!("{kind} 被拒绝: {uri} - 状态: {s} - 耗时: {elapsed:?}")
        }
        s => info!("{kind} 完成: {uri} - 状态: {s} - 耗时: {elapsed:?}"),
    }
    response
}

/// 组合只通过 POST 提交
pub fn cors_layer() -> CorsLayer {
    CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
}

pub fn trace_layer() -> TraceLayer<HttpMakeClassifier> {
    TraceLayer::new_for_http()
}
