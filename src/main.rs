use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use choreo::app::{add_hostname_alias, Application};
use choreo::shutdown::{wait_for_shutdown_signal, ShutdownManager};
use choreo_core::AppConfig;
use tokio::net::TcpListener;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("choreo")
        .version(env!("CARGO_PKG_VERSION"))
        .about("分布式服务编排服务器")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径"),
        )
        .arg(
            Arg::new("bind")
                .short('b')
                .long("bind")
                .value_name("ADDR")
                .help("监听地址，覆盖配置中的 server.bind_address"),
        )
        .arg(
            Arg::new("host")
                .long("host")
                .value_name("HOST")
                .action(clap::ArgAction::Append)
                .help("额外的主机限定符，可重复"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置中的 observability.log_level")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式")
                .value_parser(["json", "pretty"])
                .default_value("pretty"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let mut config = AppConfig::load(config_path)
        .with_context(|| format!("加载配置失败: {}", config_path.unwrap_or("<默认配置>")))?;

    let log_level = matches
        .get_one::<String>("log-level")
        .cloned()
        .unwrap_or_else(|| config.observability.log_level.clone());
    let log_format = matches
        .get_one::<String>("log-format")
        .map(String::as_str)
        .unwrap_or("pretty");
    init_logging(&log_level, log_format)?;

    info!("启动编排服务器");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    if let Some(bind) = matches.get_one::<String>("bind") {
        config.server.bind_address = bind.clone();
    }
    if let Some(hosts) = matches.get_many::<String>("host") {
        config.server.advertised_hosts.extend(hosts.cloned());
    }

    let listener = TcpListener::bind(&config.server.bind_address)
        .await
        .with_context(|| format!("绑定地址失败: {}", config.server.bind_address))?;
    let port = listener.local_addr().context("读取监听地址失败")?.port();
    add_hostname_alias(&mut config, port);

    let app = Application::new(config)?;
    let shutdown_manager = ShutdownManager::new();
    let shutdown_rx = shutdown_manager.subscribe();
    let server = tokio::spawn(app.run(listener, shutdown_rx));

    wait_for_shutdown_signal().await;
    info!("收到关闭信号，开始优雅关闭...");
    shutdown_manager.shutdown();

    // 正在转发的请求没有超时，关闭时最多等待 30 秒
    match tokio::time::timeout(Duration::from_secs(30), server).await {
        Ok(Ok(Ok(()))) => info!("编排服务器已优雅关闭"),
        Ok(Ok(Err(e))) => error!("编排服务器关闭时发生错误: {e}"),
        Ok(Err(e)) => error!("编排服务器任务异常退出: {e}"),
        Err(_) => warn!("关闭超时，强制退出"),
    }
    Ok(())
}

fn init_logging(log_level: &str, log_format: &str) -> Result<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        _ => return Err(anyhow::anyhow!("不支持的日志格式: {log_format}")),
    }

    Ok(())
}
