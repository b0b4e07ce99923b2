//! 判断一个调用能否在本地执行

use choreo_core::{ChoreoError, ChoreoResult, CONSTRUCTOR_METHOD};
use choreo_domain::{tags, OperationTarget, ServiceHandle, StateEntry, StateTable, TaggedValue};
use serde::Deserialize;

use crate::context::ServerContext;

/// 单个调用的执行计划
#[derive(Debug, Clone, PartialEq)]
pub enum StepPlan {
    /// 在本地构造新实例
    Construct { host: String, class: String },
    /// 在本地已持久化的实例上调用
    Persisted { class: String, id: String, method: String },
    /// 在本请求创建的实例上调用
    Live { handle: ServiceHandle, method: String },
    /// 本地无法执行，从这里开始交给 `address`
    ///
    /// 本机未配置的类也在这里停下，`address` 可能就是本机，由解释器判断。
    Forward { address: String },
    /// 拒绝执行，跳过这一步
    Refuse(RefuseReason),
}

#[derive(Debug, Clone, PartialEq)]
pub enum RefuseReason {
    /// 句柄不可持久化，只在创建它的进程内可用
    NonDurableHandle(String),
}

impl RefuseReason {
    pub fn into_error(self) -> ChoreoError {
        match self {
            RefuseReason::NonDurableHandle(address) => ChoreoError::InstanceNotFound {
                class: address,
                id: "none".to_string(),
            },
        }
    }
}

impl StepPlan {
    /// 配置中的 (类, 方法)，用于结果映射
    pub fn class_and_method(&self) -> Option<(&str, &str)> {
        match self {
            StepPlan::Construct { class, .. } => Some((class.as_str(), CONSTRUCTOR_METHOD)),
            StepPlan::Persisted { class, method, .. } => Some((class.as_str(), method.as_str())),
            StepPlan::Live { handle, method } => Some((handle.class.as_str(), method.as_str())),
            StepPlan::Forward { .. } | StepPlan::Refuse(_) => None,
        }
    }
}

/// 状态中以数据形式传入的句柄
#[derive(Debug, Deserialize)]
struct HandleData {
    host: String,
    class: String,
    id: Option<String>,
}

/// 根据操作地址和当前状态决定执行计划
pub fn plan_step(
    context: &ServerContext,
    is_known_class: impl Fn(&str) -> bool,
    target: OperationTarget,
    state: &StateTable,
) -> ChoreoResult<StepPlan> {
    match target {
        OperationTarget::Construct { host, class } => {
            if !context.is_local(&host) || !is_known_class(&class) {
                return Ok(StepPlan::Forward { address: host });
            }
            Ok(StepPlan::Construct { host, class })
        }
        OperationTarget::Persisted {
            host,
            class,
            id,
            method,
        } => {
            if !context.is_local(&host) {
                return Ok(StepPlan::Forward { address: host });
            }
            Ok(StepPlan::Persisted { class, id, method })
        }
        OperationTarget::StateVariable { variable, method } => match state.get(&variable) {
            Some(StateEntry::Service(handle)) => Ok(StepPlan::Live {
                handle: handle.clone(),
                method,
            }),
            Some(StateEntry::Data(value)) if value.is_service_handle() => {
                plan_passed_handle(context, &variable, value, method)
            }
            Some(StateEntry::Data(value)) => Err(ChoreoError::malformed(format!(
                "变量 {variable} 的类型是 {}, 不是服务句柄",
                value.semantic_type
            ))),
            None => Err(ChoreoError::UnboundVariable { name: variable }),
        },
    }
}

/// 从上游或调用方传来的句柄：本机的按持久化实例处理，其它主机的转发
fn plan_passed_handle(
    context: &ServerContext,
    variable: &str,
    value: &TaggedValue,
    method: String,
) -> ChoreoResult<StepPlan> {
    debug_assert_eq!(value.semantic_type, tags::SERVICE_HANDLE);
    let handle: HandleData = serde_json::from_value(value.data.clone())
        .map_err(|e| ChoreoError::malformed(format!("变量 {variable} 中的服务句柄无效: {e}")))?;

    if !context.is_local(&handle.host) {
        return Ok(StepPlan::Forward { address: handle.host });
    }
    match handle.id {
        Some(id) => Ok(StepPlan::Persisted {
            class: handle.class,
            id,
            method,
        }),
        None => Ok(StepPlan::Refuse(RefuseReason::NonDurableHandle(format!(
            "{}/{}",
            handle.host, handle.class
        )))),
    }
}
