//! 配置模块
//!
//! - **app_config**: 服务进程配置（监听地址、主机限定符、存储、日志），由 `config` 加载
//! - **classes**: 服务类配置（可构造的类、包装器、方法结果映射）

pub mod models;

pub use models::*;
