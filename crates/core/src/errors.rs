use thiserror::Error;

/// 编排系统错误类型定义
#[derive(Debug, Error)]
pub enum ChoreoError {
    #[error("组合结构错误: {0}")]
    MalformedComposition(String),

    #[error("状态表中不存在变量: {name}")]
    UnboundVariable { name: String },

    #[error("服务实例未找到: {class}/{id}")]
    InstanceNotFound { class: String, id: String },

    #[error("持久化错误: {0}")]
    Persistence(String),

    #[error("类型转换失败: 语义类型 {semantic_type} 无法转换为 {target}")]
    TypeConversion {
        semantic_type: String,
        target: String,
    },

    #[error("没有匹配的方法: {class}::{method}({types})")]
    MethodResolution {
        class: String,
        method: String,
        types: String,
    },

    #[error("此服务器未配置类: {0}")]
    UnknownClass(String),

    #[error("此服务器未配置方法: {class}::{method}")]
    UnknownMethod { class: String, method: String },

    #[error("调用失败: {0}")]
    Invocation(String),

    #[error("转发失败: {0}")]
    Transport(String),

    #[error("配置错误: {0}")]
    Configuration(String),

    #[error("序列化错误: {0}")]
    Serialization(String),

    #[error("内部错误: {0}")]
    Internal(String),
}

impl ChoreoError {
    /// 结构性错误会终止整个请求，其余错误只影响当前步骤
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            ChoreoError::MalformedComposition(_)
                | ChoreoError::UnboundVariable { .. }
                | ChoreoError::Transport(_)
                | ChoreoError::Configuration(_)
        )
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        ChoreoError::MalformedComposition(message.into())
    }

    pub fn invocation(message: impl Into<String>) -> Self {
        ChoreoError::Invocation(message.into())
    }
}

impl From<serde_json::Error> for ChoreoError {
    fn from(e: serde_json::Error) -> Self {
        ChoreoError::Serialization(e.to_string())
    }
}

/// 统一的Result类型
pub type ChoreoResult<T> = std::result::Result<T, ChoreoError>;
