//! 操作名寻址
//!
//! - `host/Class::__construct`：在 `host` 上构造新实例
//! - `host/Class/id::method`：调用 `host` 上已持久化的实例
//! - `var::method`：调用状态变量 `var` 中的服务句柄

use std::fmt;

use choreo_core::{ChoreoError, ChoreoResult, CONSTRUCTOR_METHOD};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationTarget {
    Construct {
        host: String,
        class: String,
    },
    Persisted {
        host: String,
        class: String,
        id: String,
        method: String,
    },
    StateVariable {
        variable: String,
        method: String,
    },
}

impl OperationTarget {
    pub fn parse(operation_name: &str) -> ChoreoResult<Self> {
        let (target, method) = operation_name.rsplit_once("::").ok_or_else(|| {
            ChoreoError::malformed(format!("操作名缺少 '::': {operation_name}"))
        })?;
        if method.is_empty() || target.is_empty() {
            return Err(ChoreoError::malformed(format!("操作名不完整: {operation_name}")));
        }

        let Some((host, path)) = target.split_once('/') else {
            if method == CONSTRUCTOR_METHOD {
                return Err(ChoreoError::malformed(format!(
                    "构造调用必须带主机限定符: {operation_name}"
                )));
            }
            return Ok(OperationTarget::StateVariable {
                variable: target.to_string(),
                method: method.to_string(),
            });
        };

        if host.is_empty() {
            return Err(ChoreoError::malformed(format!("主机限定符为空: {operation_name}")));
        }

        let segments: Vec<&str> = path.split('/').collect();
        match (segments.as_slice(), method == CONSTRUCTOR_METHOD) {
            ([class], true) if !class.is_empty() => Ok(OperationTarget::Construct {
                host: host.to_string(),
                class: class.to_string(),
            }),
            ([class, id], false) if !class.is_empty() && !id.is_empty() => {
                Ok(OperationTarget::Persisted {
                    host: host.to_string(),
                    class: class.to_string(),
                    id: id.to_string(),
                    method: method.to_string(),
                })
            }
            _ => Err(ChoreoError::malformed(format!(
                "无法识别的操作地址: {operation_name}"
            ))),
        }
    }

    /// 主机限定符，状态变量调用没有
    pub fn host(&self) -> Option<&str> {
        match self {
            OperationTarget::Construct { host, .. } | OperationTarget::Persisted { host, .. } => {
                Some(host)
            }
            OperationTarget::StateVariable { .. } => None,
        }
    }

    pub fn method(&self) -> &str {
        match self {
            OperationTarget::Construct { .. } => CONSTRUCTOR_METHOD,
            OperationTarget::Persisted { method, .. }
            | OperationTarget::StateVariable { method, .. } => method,
        }
    }

    pub fn is_constructor(&self) -> bool {
        matches!(self, OperationTarget::Construct { .. })
    }
}

impl fmt::Display for OperationTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationTarget::Construct { host, class } => {
                write!(f, "{host}/{class}::{CONSTRUCTOR_METHOD}")
            }
            OperationTarget::Persisted {
                host,
                class,
                id,
                method,
            } => write!(f, "{host}/{class}/{id}::{method}"),
            OperationTarget::StateVariable { variable, method } => write!(f, "{variable}::{method}"),
        }
    }
}
