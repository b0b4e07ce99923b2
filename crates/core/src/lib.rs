pub mod config;
pub mod errors;

pub use config::*;
pub use errors::*;

/// 构造函数在操作名中的方法名
pub const CONSTRUCTOR_METHOD: &str = "__construct";
