//! 行式文本组合编解码
//!
//! 每个非空、非 `#` 开头的行是一个调用：
//!
//! ```text
//! x = 127.0.0.1:8000/demo.Counter::__construct()
//! y = x::add(5)
//! out:m, normalized:v2 = c::normalize(v)
//! x::reset()
//! ```
//!
//! 输入按位置绑定到 `i1, i2, ...`，也可以写成 `i2="text"`。单个不带参数名的输出绑定到
//! `out`，多个时依次绑定到 `out1, out2, ...`。

use std::collections::BTreeMap;

use choreo_core::{ChoreoError, ChoreoResult};

use crate::composition::{
    InputValue, LiteralParam, Operation, OperationInvocation, SequentialComposition,
    VariableParam,
};
use crate::ports::CompositionCodec;

#[derive(Debug, Clone, Copy, Default)]
pub struct TextCompositionCodec;

impl TextCompositionCodec {
    pub fn new() -> Self {
        Self
    }
}

impl CompositionCodec for TextCompositionCodec {
    fn parse(&self, text: &str) -> ChoreoResult<SequentialComposition> {
        let mut invocations = Vec::new();
        for (index, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let invocation = parse_line(line)
                .map_err(|e| ChoreoError::malformed(format!("第{}行: {e}", index + 1)))?;
            invocations.push(invocation);
        }
        Ok(SequentialComposition::from_invocations(invocations))
    }

    fn render(&self, composition: &SequentialComposition) -> String {
        let mut text = String::new();
        for invocation in composition {
            text.push_str(&render_invocation(invocation));
            text.push('\n');
        }
        text
    }
}

fn parse_line(line: &str) -> Result<OperationInvocation, String> {
    let open = line.find('(').ok_or("缺少 '('")?;
    let args = line[open + 1..]
        .strip_suffix(')')
        .ok_or("调用必须以 ')' 结尾")?;

    let head = &line[..open];
    let (outputs_text, operation_name) = match head.split_once('=') {
        Some((outputs, name)) => (Some(outputs), name.trim()),
        None => (None, head.trim()),
    };
    if operation_name.is_empty() || operation_name.contains(char::is_whitespace) {
        return Err(format!("操作名无效: '{operation_name}'"));
    }

    let outputs = match outputs_text {
        Some(text) => parse_outputs(text)?,
        None => Vec::new(),
    };
    let inputs = parse_inputs(args)?;

    let operation = Operation::new(
        operation_name,
        inputs.iter().map(|(param, _)| param.clone()).collect(),
        outputs.iter().map(|(param, _)| param.clone()).collect(),
    );
    OperationInvocation::new(
        operation,
        inputs.into_iter().collect(),
        outputs.into_iter().collect(),
    )
    .map_err(|e| e.to_string())
}

fn parse_outputs(text: &str) -> Result<Vec<(VariableParam, VariableParam)>, String> {
    let items: Vec<&str> = text.split(',').map(str::trim).collect();
    let single = items.len() == 1;
    let mut outputs: Vec<(VariableParam, VariableParam)> = Vec::new();

    for (position, item) in items.iter().enumerate() {
        let (param, variable) = match item.split_once(':') {
            Some((param, variable)) => (param.trim().to_string(), variable.trim()),
            None if single => ("out".to_string(), *item),
            None => (format!("out{}", position + 1), *item),
        };
        if !is_identifier(&param) || !is_identifier(variable) {
            return Err(format!("输出声明无效: '{item}'"));
        }
        if outputs.iter().any(|(existing, _)| existing.name() == param) {
            return Err(format!("输出参数重复: {param}"));
        }
        outputs.push((VariableParam::new(param), VariableParam::new(variable)));
    }
    Ok(outputs)
}

fn parse_inputs(args: &str) -> Result<Vec<(VariableParam, InputValue)>, String> {
    let mut indexed: BTreeMap<usize, InputValue> = BTreeMap::new();

    for (position, token) in split_arguments(args)?.into_iter().enumerate() {
        let (index, raw) = match named_argument(&token) {
            Some((index, raw)) => (index, raw),
            None => (position + 1, token.as_str()),
        };
        let value = match LiteralParam::parse(raw) {
            Some(literal) => InputValue::Literal(literal),
            None if is_identifier(raw.trim()) => {
                InputValue::Variable(VariableParam::new(raw.trim()))
            }
            None => return Err(format!("无法识别的参数值: '{}'", raw.trim())),
        };
        if indexed.insert(index, value).is_some() {
            return Err(format!("输入参数 i{index} 重复"));
        }
    }

    if indexed.keys().copied().ne(1..=indexed.len()) {
        return Err("输入参数必须是连续的 i1..iN".to_string());
    }
    Ok(indexed
        .into_iter()
        .map(|(index, value)| (VariableParam::new(format!("i{index}")), value))
        .collect())
}

/// 在引号外的逗号处切分参数列表
fn split_arguments(args: &str) -> Result<Vec<String>, String> {
    if args.trim().is_empty() {
        return Ok(Vec::new());
    }

    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;
    for c in args.chars() {
        match c {
            _ if escaped => {
                escaped = false;
                current.push(c);
            }
            '\\' if in_quotes => {
                escaped = true;
                current.push(c);
            }
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ',' if !in_quotes => tokens.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    if in_quotes {
        return Err("字符串缺少结束引号".to_string());
    }
    tokens.push(current);

    if tokens.iter().any(|token| token.trim().is_empty()) {
        return Err("参数列表中有空参数".to_string());
    }
    Ok(tokens)
}

/// `iN=value` 形式的命名参数
fn named_argument(token: &str) -> Option<(usize, &str)> {
    let token = token.trim();
    if token.starts_with('"') {
        return None;
    }
    let (name, value) = token.split_once('=')?;
    let index = name.trim().strip_prefix('i')?.parse::<usize>().ok()?;
    (index >= 1).then_some((index, value))
}

fn is_identifier(text: &str) -> bool {
    let mut chars = text.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn render_invocation(invocation: &OperationInvocation) -> String {
    let operation = invocation.operation();

    let mapped: Vec<(&VariableParam, &VariableParam)> = operation
        .output_parameters()
        .iter()
        .filter_map(|param| {
            invocation
                .output_mapping()
                .get(param)
                .map(|target| (param, target))
        })
        .collect();
    let bare = mapped.iter().enumerate().all(|(position, (param, _))| {
        if mapped.len() == 1 {
            param.name() == "out"
        } else {
            param.name() == format!("out{}", position + 1)
        }
    });
    let outputs: Vec<String> = mapped
        .iter()
        .map(|(param, target)| {
            if bare {
                target.to_string()
            } else {
                format!("{param}:{target}")
            }
        })
        .collect();

    let positional = operation
        .input_parameters()
        .iter()
        .enumerate()
        .all(|(position, param)| param.name() == format!("i{}", position + 1));
    let inputs: Vec<String> = invocation
        .ordered_inputs()
        .map(|(param, value)| {
            if positional {
                value.to_string()
            } else {
                format!("{param}={value}")
            }
        })
        .collect();

    let call = format!("{}({})", operation.name(), inputs.join(", "));
    if outputs.is_empty() {
        call
    } else {
        format!("{} = {call}", outputs.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
        # 构造并调用
        x = 127.0.0.1:8000/demo.Counter::__construct()
        y = x::add(5)
        out:m, normalized:v2 = c::normalize(v)
        s = x::label(i2=2.5, i1="a, \"quoted\" text")
        x::reset()
    "#;

    #[test]
    fn test_parse_sample() {
        let composition = TextCompositionCodec.parse(SAMPLE).unwrap();
        assert_eq!(composition.len(), 5);

        let construct = composition.get(0).unwrap();
        assert_eq!(
            construct.operation().name(),
            "127.0.0.1:8000/demo.Counter::__construct"
        );
        assert_eq!(construct.output_target("out").unwrap().name(), "x");
        assert!(construct.operation().input_parameters().is_empty());

        let add = composition.get(1).unwrap();
        let inputs: Vec<_> = add.ordered_inputs().collect();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0].1, &InputValue::Literal(LiteralParam::Int(5)));

        let normalize = composition.get(2).unwrap();
        assert_eq!(normalize.output_target("normalized").unwrap().name(), "v2");
        assert_eq!(
            normalize.ordered_inputs().next().unwrap().1,
            &InputValue::Variable(VariableParam::new("v"))
        );

        let label = composition.get(3).unwrap();
        let inputs: Vec<_> = label.ordered_inputs().collect();
        assert_eq!(inputs[0].0.name(), "i1");
        assert_eq!(
            inputs[0].1,
            &InputValue::Literal(LiteralParam::Str("a, \"quoted\" text".to_string()))
        );
        assert_eq!(inputs[1].1, &InputValue::Literal(LiteralParam::Double(2.5)));

        assert!(composition.get(4).unwrap().output_mapping().is_empty());
    }

    #[test]
    fn test_render_reparses_to_equal_composition() {
        let codec = TextCompositionCodec::new();
        let composition = codec.parse(SAMPLE).unwrap();
        let rendered = codec.render(&composition);
        assert_eq!(codec.parse(&rendered).unwrap(), composition);
    }

    #[test]
    fn test_multiple_bare_outputs() {
        let composition = TextCompositionCodec.parse("a, b = x::split(1)").unwrap();
        let invocation = composition.get(0).unwrap();
        assert_eq!(invocation.output_target("out1").unwrap().name(), "a");
        assert_eq!(invocation.output_target("out2").unwrap().name(), "b");
        assert_eq!(TextCompositionCodec.render(&composition).trim(), "a, b = x::split(1)");
    }

    #[test]
    fn test_malformed_lines_report_line_number() {
        for (text, line) in [
            ("x = h/demo.Counter::__construct(", 1),
            ("\ny = x::add(5, )", 2),
            ("y = x::add(i2=5)", 1),
            ("y = x::add(i1=5, i1=6)", 1),
            ("y = x::add(\"open)", 1),
            ("y = x::add(@)", 1),
            ("1y = x::add(5)", 1),
        ] {
            match TextCompositionCodec.parse(text) {
                Err(ChoreoError::MalformedComposition(message)) => {
                    assert!(message.starts_with(&format!("第{line}行")), "{message}");
                }
                other => panic!("{text:?} should be malformed, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_empty_text_is_empty_composition() {
        let composition = TextCompositionCodec.parse("\n  # only comments\n").unwrap();
        assert!(composition.is_empty());
    }
}
