//! 编排解释器：Resolve -> LocalExecute -> Forward | Respond
//!
//! 每个请求有自己的状态表和执行窗口。窗口内的调用依次执行，遇到本地无法执行的
//! 调用时停下，把普通数据连同剩余窗口转发给下游主机，再把下游返回的状态合并后应答。

use std::collections::BTreeMap;
use std::sync::Arc;

use choreo_core::{ChoreoError, ChoreoResult, ResultSource, CONSTRUCTOR_METHOD};
use choreo_domain::{
    ExecutionBound, InputValue, InstanceKey, LiteralParam, Operation, OperationInvocation, OperationTarget,
    OutboundCaller, SequentialComposition, StateEntry, StateTable, TaggedValue, VariableParam, WireState,
};
use choreo_worker::{CallOutcome, ServiceRegistry};
use tracing::{debug, error, info, warn};

use crate::context::ServerContext;
use crate::plan::{plan_step, StepPlan};

/// 一步执行后写入状态的值
enum StepOutput {
    Data(TaggedValue),
    Service(choreo_domain::ServiceHandle),
}

pub struct ChoreographyInterpreter {
    context: ServerContext,
    registry: Arc<ServiceRegistry>,
    outbound: Arc<dyn OutboundCaller>,
}

impl ChoreographyInterpreter {
    pub fn new(context: ServerContext, registry: Arc<ServiceRegistry>, outbound: Arc<dyn OutboundCaller>) -> Self {
        Self {
            context,
            registry,
            outbound,
        }
    }

    pub fn context(&self) -> &ServerContext {
        &self.context
    }

    pub fn registry(&self) -> &Arc<ServiceRegistry> {
        &self.registry
    }

    /// 执行组合在 `bound` 内的部分，缺省窗口为整个组合
    pub async fn execute(
        &self,
        composition: &SequentialComposition,
        bound: Option<ExecutionBound>,
        kwargs: WireState,
    ) -> ChoreoResult<WireState> {
        let bound = bound.unwrap_or_else(|| ExecutionBound::full(composition.len()));
        bound.check_within(composition.len())?;
        info!(
            "开始执行组合: {} 个调用, 窗口 {bound}, {} 个初始变量",
            composition.len(),
            kwargs.len()
        );

        let mut state = StateTable::from_wire(kwargs);
        let mut created = Vec::new();
        let result = self.run(composition, bound, &mut state, &mut created).await;

        // 本请求创建的实例只活到请求结束
        for key in created {
            self.registry.release(key);
        }

        match &result {
            Ok(wire) => info!("组合执行完成, 返回 {} 个变量", wire.len()),
            Err(e) => error!("组合执行中止: {e}"),
        }
        result
    }

    /// 单次调用：`i1..iN` 是位置参数，输出由结果映射决定
    pub async fn execute_bare(
        &self,
        class: &str,
        id: Option<&str>,
        method: &str,
        kwargs: WireState,
    ) -> ChoreoResult<WireState> {
        let host = self.context.primary_host();
        let name = match id {
            None if method == CONSTRUCTOR_METHOD => format!("{host}/{class}::{CONSTRUCTOR_METHOD}"),
            Some(id) if method != CONSTRUCTOR_METHOD => format!("{host}/{class}/{id}::{method}"),
            _ => return Err(ChoreoError::malformed(format!("无效的单次调用: {class}::{method}"))),
        };

        let arity = positional_arity(&kwargs)?;
        let inputs: Vec<VariableParam> = (1..=arity).map(|n| VariableParam::new(format!("i{n}"))).collect();
        let outputs: Vec<VariableParam> = self
            .registry
            .classes()
            .result_map(class, method)?
            .into_iter()
            .map(|(output, _)| VariableParam::new(output))
            .collect();

        let input_mapping: BTreeMap<VariableParam, InputValue> = inputs
            .iter()
            .map(|param| (param.clone(), InputValue::Variable(param.clone())))
            .collect();
        let output_mapping: BTreeMap<VariableParam, VariableParam> =
            outputs.iter().map(|param| (param.clone(), param.clone())).collect();

        let invocation = OperationInvocation::new(Operation::new(name, inputs, outputs), input_mapping, output_mapping)?;
        let composition = SequentialComposition::from_invocations(vec![invocation]);
        self.execute(&composition, None, kwargs).await
    }

    async fn run(
        &self,
        composition: &SequentialComposition,
        bound: ExecutionBound,
        state: &mut StateTable,
        created: &mut Vec<InstanceKey>,
    ) -> ChoreoResult<WireState> {
        for index in bound.low()..bound.high() {
            let invocation = composition
                .get(index)
                .ok_or_else(|| ChoreoError::malformed(format!("调用下标越界: {index}")))?;
            let target = OperationTarget::parse(invocation.operation().name())?;
            let plan = plan_step(&self.context, |class| self.registry.is_known_class(class), target, state)?;

            match plan {
                StepPlan::Forward { address } => {
                    let remaining = bound.resume_at(index)?;
                    // 转发给自己不会有进展，只会循环
                    if self.context.is_local(&address) {
                        return Err(ChoreoError::Transport(format!(
                            "第 {index} 个调用 {} 的类未在本机配置, 转发目标 {address} 是本机, 窗口 {remaining}",
                            invocation.operation().name()
                        )));
                    }
                    info!("第 {index} 个调用 {} 无法在本地执行, 转发到 {address}, 窗口 {remaining}", invocation.operation().name());
                    let returned = self
                        .outbound
                        .invoke(&address, composition, remaining, state.plain_data())
                        .await?;
                    state.splice(returned);
                    return Ok(state.to_wire());
                }
                StepPlan::Refuse(reason) => {
                    warn!("第 {index} 个调用 {} 被拒绝: {}", invocation.operation().name(), reason.into_error());
                }
                plan => match self.execute_step(invocation, &plan, state, created).await {
                    Ok(()) => debug!("第 {index} 个调用 {} 完成", invocation.operation().name()),
                    Err(e) if e.is_fatal() => return Err(e),
                    Err(e) => warn!("第 {index} 个调用 {} 没有产生结果: {e}", invocation.operation().name()),
                },
            }
        }
        Ok(state.to_wire())
    }

    /// 解析输入、检查结果映射、调用，然后一次性写入全部输出
    async fn execute_step(
        &self,
        invocation: &OperationInvocation,
        plan: &StepPlan,
        state: &mut StateTable,
        created: &mut Vec<InstanceKey>,
    ) -> ChoreoResult<()> {
        let values = resolve_inputs(invocation, state)?;
        let (class, method) = plan
            .class_and_method()
            .ok_or_else(|| ChoreoError::Internal("该计划不对应任何调用".to_string()))?;

        let classes = self.registry.classes();
        if !classes.is_known_class(class) {
            return Err(ChoreoError::UnknownClass(class.to_string()));
        }
        if !classes.is_method_known(class, method) {
            return Err(ChoreoError::UnknownMethod {
                class: class.to_string(),
                method: method.to_string(),
            });
        }
        let sources = output_sources(invocation, &classes.result_map(class, method)?, class, method)?;

        let outputs = match plan {
            StepPlan::Construct { host, class } => {
                let types = self.registry.promote_all(&values);
                let handle = self.registry.create(host, class, &types, &values).await?;
                created.push(handle.instance);
                sources
                    .into_iter()
                    .map(|(target, source)| -> ChoreoResult<(String, StepOutput)> {
                        let output = match source {
                            ResultSource::Return => StepOutput::Service(handle.clone()),
                            ResultSource::Input(n) => StepOutput::Data(supplied_input(&values, n)?),
                        };
                        Ok((target, output))
                    })
                    .collect::<ChoreoResult<Vec<_>>>()?
            }
            StepPlan::Persisted { class, id, method } => {
                let outcome = self.registry.invoke_persisted(class, id, method, &values).await?;
                self.collect_outputs(sources, &outcome, &values)?
            }
            StepPlan::Live { handle, method } => {
                let outcome = self.registry.invoke_live(handle, method, &values).await?;
                self.collect_outputs(sources, &outcome, &values)?
            }
            StepPlan::Forward { .. } | StepPlan::Refuse(_) => {
                return Err(ChoreoError::Internal("转发或拒绝的调用不能在本地执行".to_string()))
            }
        };

        for (target, output) in outputs {
            match output {
                StepOutput::Data(value) => state.insert_data(target, value),
                StepOutput::Service(handle) => state.insert_service(target, handle),
            }
        }
        Ok(())
    }

    /// 按结果映射取值：返回值，或调用后的第 N 个实参
    fn collect_outputs(
        &self,
        sources: Vec<(String, ResultSource)>,
        outcome: &CallOutcome,
        values: &[TaggedValue],
    ) -> ChoreoResult<Vec<(String, StepOutput)>> {
        let marshaller = self.registry.marshaller();
        sources
            .into_iter()
            .map(|(target, source)| -> ChoreoResult<(String, StepOutput)> {
                let value = match source {
                    ResultSource::Return => marshaller.to_semantic(&outcome.result)?,
                    ResultSource::Input(n) => match outcome.args.get(n - 1) {
                        Some(arg) => marshaller.to_semantic(arg)?,
                        // 超出方法形参个数的实参不会被修改
                        None => supplied_input(values, n)?,
                    },
                };
                Ok((target, StepOutput::Data(value)))
            })
            .collect()
    }
}

/// 按声明顺序解析输入：字面量直接取值，变量从状态表读取
pub fn resolve_inputs(invocation: &OperationInvocation, state: &StateTable) -> ChoreoResult<Vec<TaggedValue>> {
    invocation
        .ordered_inputs()
        .map(|(_, value)| match value {
            InputValue::Literal(literal) => Ok(literal_value(literal)),
            InputValue::Variable(variable) => match state.get(variable.name()) {
                Some(StateEntry::Data(value)) => Ok(value.clone()),
                Some(StateEntry::Service(handle)) => Ok(handle.to_tagged()),
                None => Err(ChoreoError::UnboundVariable {
                    name: variable.name().to_string(),
                }),
            },
        })
        .collect()
}

fn literal_value(literal: &LiteralParam) -> TaggedValue {
    match literal {
        LiteralParam::Int(v) => TaggedValue::number(*v),
        LiteralParam::Double(v) => TaggedValue::double(*v),
        LiteralParam::Str(v) => TaggedValue::string(v.clone()),
    }
}

/// 组合中的每个输出都必须出现在 (class, method) 的结果映射里
fn output_sources(
    invocation: &OperationInvocation,
    result_map: &[(String, ResultSource)],
    class: &str,
    method: &str,
) -> ChoreoResult<Vec<(String, ResultSource)>> {
    invocation
        .output_mapping()
        .iter()
        .map(|(output, target)| {
            result_map
                .iter()
                .find(|(name, _)| name == output.name())
                .map(|(_, source)| (target.name().to_string(), *source))
                .ok_or_else(|| {
                    ChoreoError::malformed(format!("输出 {output} 不在 {class}::{method} 的结果映射中"))
                })
        })
        .collect()
}

fn supplied_input(values: &[TaggedValue], n: usize) -> ChoreoResult<TaggedValue> {
    values
        .get(n - 1)
        .cloned()
        .ok_or_else(|| ChoreoError::invocation(format!("结果映射引用了不存在的参数 i{n}")))
}

/// 单次调用的位置参数必须是连续的 `i1..iN`
fn positional_arity(kwargs: &WireState) -> ChoreoResult<usize> {
    let mut indices: Vec<usize> = kwargs
        .keys()
        .filter_map(|key| key.strip_prefix('i')?.parse::<usize>().ok())
        .collect();
    indices.sort_unstable();
    for (expected, actual) in (1..).zip(&indices) {
        if expected != *actual {
            return Err(ChoreoError::malformed(format!("位置参数必须从 i1 连续编号, 缺少 i{expected}")));
        }
    }
    Ok(indices.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_positional_arity() {
        let mut kwargs = WireState::new();
        assert_eq!(positional_arity(&kwargs).unwrap(), 0);

        kwargs.insert("i1".into(), TaggedValue::number(1));
        kwargs.insert("i2".into(), TaggedValue::number(2));
        kwargs.insert("other".into(), TaggedValue::number(3));
        assert_eq!(positional_arity(&kwargs).unwrap(), 2);

        kwargs.insert("i4".into(), TaggedValue::number(4));
        assert!(positional_arity(&kwargs).is_err());
    }

    #[test]
    fn test_literal_values() {
        assert_eq!(literal_value(&LiteralParam::Int(3)), TaggedValue::number(3));
        assert_eq!(literal_value(&LiteralParam::Double(1.5)), TaggedValue::double(1.5));
        assert_eq!(
            literal_value(&LiteralParam::Str("a".into())),
            TaggedValue::string("a")
        );
    }
}
