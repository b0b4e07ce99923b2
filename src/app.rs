use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use choreo_api::create_app;
use choreo_core::AppConfig;
use choreo_dispatcher::{ChoreographyInterpreter, ServerContext};
use choreo_domain::{CompositionCodec, DurableStore, TextCompositionCodec};
use choreo_infrastructure::{create_store, HttpOutboundCaller};
use choreo_worker::{builtin_catalog, SemanticTypeMarshaller, ServiceRegistry};
use tokio::{net::TcpListener, sync::broadcast};
use tracing::{error, info};

/// 组装好的编排服务器
pub struct Application {
    config: AppConfig,
    interpreter: Arc<ChoreographyInterpreter>,
    router: Router,
}

impl Application {
    /// 按配置创建存储后端
    pub fn new(config: AppConfig) -> Result<Self> {
        let store = create_store(&config.storage);
        Self::with_store(config, store)
    }

    pub fn with_store(config: AppConfig, store: Arc<dyn DurableStore>) -> Result<Self> {
        config.validate().context("配置验证失败")?;

        let codec: Arc<dyn CompositionCodec> = Arc::new(TextCompositionCodec::new());
        let catalog = builtin_catalog();
        info!("本进程实现的类: {}", catalog.class_names().join(", "));

        let registry = ServiceRegistry::new(
            Arc::new(config.classes.clone()),
            Arc::new(catalog),
            Arc::new(SemanticTypeMarshaller::with_builtin_types()),
            store,
        )
        .context("创建服务注册表失败")?;
        let context = ServerContext::from_config(&config.server).context("创建服务上下文失败")?;
        info!("主机限定符: {}", context.hosts().join(", "));

        let interpreter = Arc::new(ChoreographyInterpreter::new(
            context,
            Arc::new(registry),
            Arc::new(HttpOutboundCaller::new(codec.clone())),
        ));
        let router = create_app(interpreter.clone(), codec);

        Ok(Self {
            config,
            interpreter,
            router,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn interpreter(&self) -> &Arc<ChoreographyInterpreter> {
        &self.interpreter
    }

    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// 在已绑定的监听器上提供服务，直到收到关闭信号
    pub async fn run(self, listener: TcpListener, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
        let address = listener.local_addr().context("读取监听地址失败")?;
        info!("编排服务器启动在 http://{address}");

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.recv().await;
                info!("编排服务器收到关闭信号");
            })
            .await
            .map_err(|e| {
                error!("编排服务器运行失败: {e}");
                anyhow::anyhow!("编排服务器运行失败: {e}")
            })?;

        info!("编排服务器已停止");
        Ok(())
    }
}

/// 把本机主机名加入主机限定符，调用方常用它来寻址
pub fn add_hostname_alias(config: &mut AppConfig, port: u16) {
    let Ok(name) = hostname::get() else {
        return;
    };
    let Some(name) = name.to_str() else {
        return;
    };
    let alias = format!("{name}:{port}");
    if !config.server.advertised_hosts.contains(&alias) {
        config.server.advertised_hosts.push(alias);
    }
}
