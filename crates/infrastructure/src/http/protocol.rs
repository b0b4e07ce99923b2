use choreo_domain::{ExecutionBound, TaggedValue, WireState};
use serde::{Deserialize, Serialize};

pub const CHOREOGRAPHY_PATH: &str = "/choreography";

/// `POST /choreography` 的请求体
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChoreographyRequest {
    /// 文本形式的组合
    pub composition: String,
    /// 本次负责的执行窗口，缺省为整个组合
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bound: Option<ExecutionBound>,
    #[serde(default)]
    pub kwargs: WireState,
}

/// 所有调用共用的响应体
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChoreographyResponse {
    pub state: WireState,
}

/// 单次调用的位置参数写作 `i1..iN`
pub fn input_kwargs(args: impl IntoIterator<Item = TaggedValue>) -> WireState {
    args.into_iter()
        .enumerate()
        .map(|(index, value)| (format!("i{}", index + 1), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_wire_format() {
        let request = ChoreographyRequest {
            composition: "x = h/demo.Counter::__construct()".to_string(),
            bound: Some(ExecutionBound::new(1, 3).unwrap()),
            kwargs: input_kwargs([TaggedValue::number(5)]),
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["bound"], json!([1, 3]));
        assert_eq!(value["kwargs"]["i1"], json!({"type": "Number", "data": 5}));

        let minimal: ChoreographyRequest =
            serde_json::from_value(json!({"composition": ""})).unwrap();
        assert_eq!(minimal.bound, None);
        assert!(minimal.kwargs.is_empty());
    }
}
