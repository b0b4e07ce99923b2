use choreo_core::{ChoreoError, ChoreoResult, ServerConfig};

/// 本进程的服务上下文：对外应答的主机限定符
#[derive(Debug, Clone)]
pub struct ServerContext {
    advertised_hosts: Vec<String>,
}

impl ServerContext {
    /// 第一个主机限定符用于单次调用和新建句柄
    pub fn new(advertised_hosts: Vec<String>) -> ChoreoResult<Self> {
        let advertised_hosts: Vec<String> = advertised_hosts
            .into_iter()
            .map(|host| host.trim().to_string())
            .filter(|host| !host.is_empty())
            .collect();
        if advertised_hosts.is_empty() {
            return Err(ChoreoError::Configuration("至少需要一个主机限定符".to_string()));
        }
        Ok(Self { advertised_hosts })
    }

    pub fn from_config(config: &ServerConfig) -> ChoreoResult<Self> {
        Self::new(config.advertised_hosts.clone())
    }

    pub fn is_local(&self, host: &str) -> bool {
        self.advertised_hosts.iter().any(|h| h == host)
    }

    pub fn primary_host(&self) -> &str {
        &self.advertised_hosts[0]
    }

    pub fn hosts(&self) -> &[String] {
        &self.advertised_hosts
    }
}
