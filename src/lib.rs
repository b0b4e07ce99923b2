//! 编排服务器进程：配置装配、HTTP 服务与优雅关闭

pub mod app;
pub mod shutdown;
