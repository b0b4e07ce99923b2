pub mod http;
pub mod storage;

pub use http::*;
pub use storage::*;
