use std::path::Path;

use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};

use super::classes::ClassesConfiguration;

/// HTTP 服务配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub bind_address: String,
    /// 本进程对应的主机限定符（如 `127.0.0.1:8000`），用于判断一次调用是否在本地执行
    #[serde(default)]
    pub advertised_hosts: Vec<String>,
    /// 额外的类配置文件（TOML 或 JSON）
    #[serde(default)]
    pub classes_file: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    File,
    Memory,
}

/// 服务实例持久化配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub root_dir: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
}

/// System configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub observability: ObservabilityConfig,
    #[serde(default)]
    pub classes: ClassesConfiguration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                bind_address: "0.0.0.0:8000".to_string(),
                advertised_hosts: vec!["127.0.0.1:8000".to_string(), "localhost:8000".to_string()],
                classes_file: None,
            },
            storage: StorageConfig {
                backend: StorageBackend::File,
                root_dir: "http/objects".to_string(),
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
            },
            classes: ClassesConfiguration::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: CHOREO_, separator `__`)
    ///
    /// 类名包含 `.` 且区分大小写，因此 `[classes]` 表直接由 `toml` 解析，
    /// 不经过 `config` 的键规范化。
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("server.bind_address", defaults.server.bind_address.clone())?
            .set_default("server.advertised_hosts", defaults.server.advertised_hosts.clone())?
            .set_default("storage.backend", "file")?
            .set_default("storage.root_dir", defaults.storage.root_dir.clone())?
            .set_default("observability.log_level", defaults.observability.log_level.clone())?;

        let mut raw_file = None;
        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
            raw_file = Some(
                std::fs::read_to_string(path).with_context(|| format!("读取配置文件失败: {path}"))?,
            );
        }

        builder = builder.add_source(
            Environment::with_prefix("CHOREO")
                .prefix_separator("_")
                .separator("__")
                .list_separator(",")
                .with_list_parse_key("server.advertised_hosts")
                .try_parsing(true),
        );

        let settings = builder.build().context("构建配置失败")?;
        let mut config = AppConfig {
            server: settings.get("server").context("反序列化 server 配置失败")?,
            storage: settings.get("storage").context("反序列化 storage 配置失败")?,
            observability: settings
                .get("observability")
                .context("反序列化 observability 配置失败")?,
            classes: ClassesConfiguration::default(),
        };

        if let Some(content) = raw_file {
            config.classes = inline_classes(&content)?;
        }
        if let Some(path) = config.server.classes_file.clone() {
            let extra = ClassesConfiguration::from_file(Path::new(&path))
                .with_context(|| format!("加载类配置文件失败: {path}"))?;
            config.classes.merge(extra);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        if self.server.bind_address.trim().is_empty() {
            return Err(anyhow::anyhow!("server.bind_address 不能为空"));
        }
        if self.server.advertised_hosts.is_empty() {
            return Err(anyhow::anyhow!("server.advertised_hosts 至少需要一个主机"));
        }
        if self
            .server
            .advertised_hosts
            .iter()
            .any(|host| host.trim().is_empty() || host.contains('/'))
        {
            return Err(anyhow::anyhow!("server.advertised_hosts 含有无效主机"));
        }
        if self.storage.root_dir.trim().is_empty() && self.storage.backend == StorageBackend::File {
            return Err(anyhow::anyhow!("storage.root_dir 不能为空"));
        }
        self.classes.validate().context("类配置验证失败")?;
        Ok(())
    }
}

fn inline_classes(content: &str) -> Result<ClassesConfiguration> {
    #[derive(Deserialize)]
    struct ClassesOnly {
        #[serde(default)]
        classes: ClassesConfiguration,
    }

    let parsed: ClassesOnly = toml::from_str(content).context("解析 [classes] 配置失败")?;
    Ok(parsed.classes)
}
