use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::{ChoreoError, ChoreoResult, CONSTRUCTOR_METHOD};

/// 结果映射中一个输出的来源
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultSource {
    /// 方法返回值
    Return,
    /// 调用结束后第N个输入参数的值（从1开始）
    Input(usize),
}

impl ResultSource {
    pub fn parse(raw: &str) -> ChoreoResult<Self> {
        let raw = raw.trim();
        if raw == "return" {
            return Ok(ResultSource::Return);
        }
        raw.strip_prefix('i')
            .and_then(|digits| digits.parse::<usize>().ok())
            .filter(|index| *index >= 1)
            .map(ResultSource::Input)
            .ok_or_else(|| ChoreoError::Configuration(format!("无法解析结果映射项: {raw}")))
    }
}

impl fmt::Display for ResultSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultSource::Return => write!(f, "return"),
            ResultSource::Input(index) => write!(f, "i{index}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MethodConfig {
    /// 输出名 -> "return" | "i<N>"
    #[serde(default)]
    pub result_map: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClassConfig {
    /// 包装器名称，存在时构造出的实例由包装器持有
    #[serde(default)]
    pub wrapper: Option<String>,
    #[serde(default)]
    pub methods: BTreeMap<String, MethodConfig>,
}

/// 服务类配置
///
/// 只有出现在这里的类才能被构造或调用，无论组合请求了什么。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClassesConfiguration {
    classes: BTreeMap<String, ClassConfig>,
}

impl ClassesConfiguration {
    pub fn new(classes: BTreeMap<String, ClassConfig>) -> Self {
        Self { classes }
    }

    /// 按扩展名读取 TOML 或 JSON 格式的类配置文件
    pub fn from_file(path: &Path) -> ChoreoResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            ChoreoError::Configuration(format!("读取类配置文件失败 {}: {e}", path.display()))
        })?;
        let extension = path.extension().and_then(|ext| ext.to_str()).unwrap_or("");

        let config: ClassesConfiguration = match extension {
            "toml" => toml::from_str(&content)
                .map_err(|e| ChoreoError::Configuration(format!("TOML parse error: {e}")))?,
            "json" => serde_json::from_str(&content)
                .map_err(|e| ChoreoError::Configuration(format!("JSON parse error: {e}")))?,
            _ => {
                return Err(ChoreoError::Configuration(format!(
                    "Unsupported file format: {extension}"
                )))
            }
        };
        config.validate()?;
        Ok(config)
    }

    pub fn insert(&mut self, class: impl Into<String>, config: ClassConfig) {
        self.classes.insert(class.into(), config);
    }

    /// 合并另一份配置，同名类以后者为准
    pub fn merge(&mut self, other: ClassesConfiguration) {
        self.classes.extend(other.classes);
    }

    pub fn is_known_class(&self, class: &str) -> bool {
        self.classes.contains_key(class)
    }

    pub fn is_wrapped(&self, class: &str) -> bool {
        self.wrapper_for(class).is_some()
    }

    pub fn wrapper_for(&self, class: &str) -> Option<&str> {
        self.classes
            .get(class)
            .and_then(|config| config.wrapper.as_deref())
    }

    /// 构造函数对所有已配置的类隐式可用
    pub fn is_method_known(&self, class: &str, method: &str) -> bool {
        match self.classes.get(class) {
            Some(_) if method == CONSTRUCTOR_METHOD => true,
            Some(config) => config.methods.contains_key(method),
            None => false,
        }
    }

    /// 返回 (class, method) 的结果映射，未显式配置时为 `out = return`
    pub fn result_map(&self, class: &str, method: &str) -> ChoreoResult<Vec<(String, ResultSource)>> {
        let configured = self
            .classes
            .get(class)
            .and_then(|config| config.methods.get(method))
            .map(|method| &method.result_map)
            .filter(|map| !map.is_empty());

        match configured {
            Some(map) => map
                .iter()
                .map(|(output, raw)| Ok((output.clone(), ResultSource::parse(raw)?)))
                .collect(),
            None => Ok(vec![("out".to_string(), ResultSource::Return)]),
        }
    }

    pub fn class_names(&self) -> impl Iterator<Item = &str> {
        self.classes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    pub fn validate(&self) -> ChoreoResult<()> {
        for (class, config) in &self.classes {
            if class.trim().is_empty() {
                return Err(ChoreoError::Configuration("类名不能为空".to_string()));
            }
            for (method, method_config) in &config.methods {
                for raw in method_config.result_map.values() {
                    ResultSource::parse(raw).map_err(|_| {
                        ChoreoError::Configuration(format!(
                            "{class}::{method} 的结果映射项无效: {raw}"
                        ))
                    })?;
                }
            }
        }
        Ok(())
    }
}
