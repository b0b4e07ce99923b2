//! 主机之间的 HTTP 协议
//!
//! - **protocol**: `/choreography` 与单次调用的请求/响应体
//! - **outbound**: 转发剩余组合的 `OutboundCaller` 实现
//! - **client**: 面向调用方的编排客户端

pub mod client;
pub mod outbound;
pub mod protocol;

pub use client::ChoreographyClient;
pub use outbound::HttpOutboundCaller;
pub use protocol::{input_kwargs, ChoreographyRequest, ChoreographyResponse, CHOREOGRAPHY_PATH};
