//! 组合模型
//!
//! 一个 [`SequentialComposition`] 是按顺序执行的操作调用序列，构造后不可变。

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use choreo_core::{ChoreoError, ChoreoResult};

/// 命名参数槽位，按名称比较
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct VariableParam {
    name: String,
}

impl VariableParam {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for VariableParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// 直接写在组合文本中的字面量
#[derive(Debug, Clone, PartialEq)]
pub enum LiteralParam {
    Int(i64),
    Double(f64),
    Str(String),
}

impl LiteralParam {
    /// 按 "整数 → 浮点 → 带引号字符串" 的顺序解析一个字面量记号，不是字面量时返回 `None`
    pub fn parse(token: &str) -> Option<Self> {
        let token = token.trim();
        if token.len() >= 2 && token.starts_with('"') && token.ends_with('"') {
            return unescape(&token[1..token.len() - 1]).map(LiteralParam::Str);
        }
        let numeric_start = token
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '+' || c == '.');
        if !numeric_start {
            return None;
        }
        if !token.contains('.') {
            if let Ok(value) = token.parse::<i64>() {
                return Some(LiteralParam::Int(value));
            }
        }
        token
            .parse::<f64>()
            .ok()
            .filter(|value| value.is_finite())
            .map(LiteralParam::Double)
    }
}

impl fmt::Display for LiteralParam {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralParam::Int(value) => write!(f, "{value}"),
            // `{:?}` 保证浮点数总带小数点或指数，重新解析时仍是浮点
            LiteralParam::Double(value) => write!(f, "{value:?}"),
            LiteralParam::Str(value) => {
                f.write_str("\"")?;
                for c in value.chars() {
                    match c {
                        '"' => f.write_str("\\\"")?,
                        '\\' => f.write_str("\\\\")?,
                        other => write!(f, "{other}")?,
                    }
                }
                f.write_str("\"")
            }
        }
    }
}

fn unescape(raw: &str) -> Option<String> {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        match c {
            '\\' => out.push(chars.next()?),
            '"' => return None,
            other => out.push(other),
        }
    }
    Some(out)
}

/// 输入参数的取值：字面量或状态表中的变量
#[derive(Debug, Clone, PartialEq)]
pub enum InputValue {
    Literal(LiteralParam),
    Variable(VariableParam),
}

impl fmt::Display for InputValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InputValue::Literal(literal) => write!(f, "{literal}"),
            InputValue::Variable(variable) => write!(f, "{variable}"),
        }
    }
}

/// 操作定义：名称 + 声明的输入/输出参数名（类型在调用时动态确定）
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Operation {
    name: String,
    inputs: Vec<VariableParam>,
    outputs: Vec<VariableParam>,
}

impl Operation {
    pub fn new(name: impl Into<String>, inputs: Vec<VariableParam>, outputs: Vec<VariableParam>) -> Self {
        Self {
            name: name.into(),
            inputs,
            outputs,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn input_parameters(&self) -> &[VariableParam] {
        &self.inputs
    }

    pub fn output_parameters(&self) -> &[VariableParam] {
        &self.outputs
    }
}

/// 一次绑定了输入/输出映射的操作调用
#[derive(Debug, Clone, PartialEq)]
pub struct OperationInvocation {
    operation: Arc<Operation>,
    input_mapping: BTreeMap<VariableParam, InputValue>,
    output_mapping: BTreeMap<VariableParam, VariableParam>,
}

impl OperationInvocation {
    /// 输入映射必须覆盖所有声明的输入，输出映射只能使用声明的输出
    pub fn new(
        operation: Operation,
        input_mapping: BTreeMap<VariableParam, InputValue>,
        output_mapping: BTreeMap<VariableParam, VariableParam>,
    ) -> ChoreoResult<Self> {
        if let Some(missing) = operation
            .inputs
            .iter()
            .find(|input| !input_mapping.contains_key(input))
        {
            return Err(ChoreoError::malformed(format!(
                "{} 缺少输入参数 {missing} 的取值",
                operation.name
            )));
        }
        if let Some(extra) = input_mapping
            .keys()
            .find(|key| !operation.inputs.contains(key))
        {
            return Err(ChoreoError::malformed(format!(
                "{} 没有声明输入参数 {extra}",
                operation.name
            )));
        }
        if let Some(extra) = output_mapping
            .keys()
            .find(|key| !operation.outputs.contains(key))
        {
            return Err(ChoreoError::malformed(format!(
                "{} 没有声明输出参数 {extra}",
                operation.name
            )));
        }

        Ok(Self {
            operation: Arc::new(operation),
            input_mapping,
            output_mapping,
        })
    }

    pub fn operation(&self) -> &Operation {
        &self.operation
    }

    pub fn input_mapping(&self) -> &BTreeMap<VariableParam, InputValue> {
        &self.input_mapping
    }

    pub fn output_mapping(&self) -> &BTreeMap<VariableParam, VariableParam> {
        &self.output_mapping
    }

    /// 按声明顺序返回各输入参数的取值
    pub fn ordered_inputs(&self) -> impl Iterator<Item = (&VariableParam, &InputValue)> {
        self.operation
            .inputs
            .iter()
            .filter_map(|param| self.input_mapping.get(param).map(|value| (param, value)))
    }

    /// 声明的输出参数对应的状态变量名
    pub fn output_target(&self, output: &str) -> Option<&VariableParam> {
        self.output_mapping.get(&VariableParam::new(output))
    }
}

impl fmt::Display for OperationInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inputs: Vec<String> = self
            .ordered_inputs()
            .map(|(param, value)| format!("{param}={value}"))
            .collect();
        let outputs: Vec<String> = self
            .output_mapping
            .iter()
            .map(|(param, target)| format!("{param}:{target}"))
            .collect();
        write!(
            f,
            "{} = {}({})",
            outputs.join(", "),
            self.operation.name,
            inputs.join(", ")
        )
    }
}

/// 组合可引用的操作词汇
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompositionDomain {
    operations: BTreeSet<Operation>,
}

impl CompositionDomain {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_operation(&mut self, operation: Operation) {
        self.operations.insert(operation);
    }

    pub fn contains(&self, operation: &Operation) -> bool {
        self.operations.contains(operation)
    }

    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        self.operations.iter()
    }
}

/// 顺序组合
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SequentialComposition {
    domain: CompositionDomain,
    invocations: Vec<OperationInvocation>,
}

impl SequentialComposition {
    pub fn new(domain: CompositionDomain) -> Self {
        Self {
            domain,
            invocations: Vec::new(),
        }
    }

    /// 由调用序列构造组合，领域取所有调用用到的操作
    pub fn from_invocations(invocations: Vec<OperationInvocation>) -> Self {
        let mut domain = CompositionDomain::new();
        for invocation in &invocations {
            domain.add_operation(invocation.operation().clone());
        }
        Self {
            domain,
            invocations,
        }
    }

    pub fn add_invocation(&mut self, invocation: OperationInvocation) -> ChoreoResult<()> {
        if !self.domain.contains(invocation.operation()) {
            return Err(ChoreoError::malformed(format!(
                "操作 {} 不属于组合的领域",
                invocation.operation().name()
            )));
        }
        self.invocations.push(invocation);
        Ok(())
    }

    pub fn domain(&self) -> &CompositionDomain {
        &self.domain
    }

    pub fn iter(&self) -> std::slice::Iter<'_, OperationInvocation> {
        self.invocations.iter()
    }

    pub fn get(&self, index: usize) -> Option<&OperationInvocation> {
        self.invocations.get(index)
    }

    pub fn len(&self) -> usize {
        self.invocations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.invocations.is_empty()
    }
}

impl<'a> IntoIterator for &'a SequentialComposition {
    type Item = &'a OperationInvocation;
    type IntoIter = std::slice::Iter<'a, OperationInvocation>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(names: &[&str]) -> Vec<VariableParam> {
        names.iter().map(|name| VariableParam::new(*name)).collect()
    }

    fn counter_add() -> OperationInvocation {
        OperationInvocation::new(
            Operation::new("c::add", params(&["i1"]), params(&["out"])),
            BTreeMap::from([(VariableParam::new("i1"), InputValue::Literal(LiteralParam::Int(5)))]),
            BTreeMap::from([(VariableParam::new("out"), VariableParam::new("y"))]),
        )
        .unwrap()
    }

    #[test]
    fn test_literal_parsing() {
        assert_eq!(LiteralParam::parse("5"), Some(LiteralParam::Int(5)));
        assert_eq!(LiteralParam::parse("-3"), Some(LiteralParam::Int(-3)));
        assert_eq!(LiteralParam::parse("2.5"), Some(LiteralParam::Double(2.5)));
        assert_eq!(LiteralParam::parse("5.0"), Some(LiteralParam::Double(5.0)));
        assert_eq!(
            LiteralParam::parse("\"a \\\"b\\\"\""),
            Some(LiteralParam::Str("a \"b\"".to_string()))
        );
        assert_eq!(LiteralParam::parse("x"), None);
        assert_eq!(LiteralParam::parse("inf"), None);
        assert_eq!(LiteralParam::parse("\"unterminated"), None);
    }

    #[test]
    fn test_literal_display_reparses() {
        for literal in [
            LiteralParam::Int(42),
            LiteralParam::Double(1.0),
            LiteralParam::Double(1e21),
            LiteralParam::Str("quote \" and \\".to_string()),
        ] {
            assert_eq!(LiteralParam::parse(&literal.to_string()), Some(literal));
        }
    }

    #[test]
    fn test_invocation_requires_all_inputs() {
        let result = OperationInvocation::new(
            Operation::new("c::add", params(&["i1"]), params(&["out"])),
            BTreeMap::new(),
            BTreeMap::new(),
        );
        assert!(matches!(result, Err(ChoreoError::MalformedComposition(_))));
    }

    #[test]
    fn test_invocation_rejects_undeclared_output() {
        let result = OperationInvocation::new(
            Operation::new("c::get", vec![], params(&["out"])),
            BTreeMap::new(),
            BTreeMap::from([(VariableParam::new("other"), VariableParam::new("y"))]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_add_invocation_outside_domain_fails() {
        let mut composition = SequentialComposition::new(CompositionDomain::new());
        let result = composition.add_invocation(counter_add());
        assert!(matches!(result, Err(ChoreoError::MalformedComposition(_))));
    }

    #[test]
    fn test_iteration_is_restartable() {
        let composition = SequentialComposition::from_invocations(vec![counter_add(), counter_add()]);
        assert_eq!(composition.iter().count(), 2);
        assert_eq!(composition.iter().count(), 2);
        assert_eq!(composition.get(1).map(|i| i.operation().name()), Some("c::add"));
        assert!(composition.get(2).is_none());
    }

    #[test]
    fn test_output_target() {
        let invocation = counter_add();
        assert_eq!(invocation.output_target("out").map(|p| p.name()), Some("y"));
        assert!(invocation.output_target("missing").is_none());
    }
}
