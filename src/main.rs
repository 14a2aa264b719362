use std::net::SocketAddr;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fanout_core::{
    config::{AppConfig, ObservabilityConfig},
    logging::init_logging,
    models::JobParams,
};
use metrics_exporter_prometheus::PrometheusBuilder;
use serde::Serialize;
use tokio::signal;
use tokio::sync::broadcast;
use tracing::{info, warn};

mod app;

use app::Application;

#[derive(Parser, Debug)]
#[command(name = "fanout")]
#[command(version)]
#[command(about = "分布式任务扇出与跟踪系统")]
struct Cli {
    /// 配置文件路径，未指定时依次查找默认位置
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<String>,

    /// 日志级别，覆盖配置文件
    #[arg(short, long, value_parser = ["trace", "debug", "info", "warn", "error"], global = true)]
    log_level: Option<String>,

    /// 日志格式，覆盖配置文件
    #[arg(long, value_parser = ["json", "pretty"], global = true)]
    log_format: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// 启动Worker进程池
    Supervise,
    /// 运行单个Worker进程
    Worker,
    /// 提交单个任务
    Dispatch(DispatchArgs),
    /// 向所有活跃节点扇出任务
    Fanout(FanoutArgs),
    /// 查询任务状态
    Status {
        /// 任务唯一ID
        uid: String,
    },
    /// 查询任务包及其任务
    Packet {
        packet_id: i64,
    },
    /// 队列管理状态
    QueueStatus,
    /// 资源锁
    Lock(LockArgs),
}

#[derive(Args, Debug)]
struct RequestArgs {
    /// 必需参数名，逗号分隔
    #[arg(short, long, value_delimiter = ',')]
    require: Vec<String>,

    /// 请求参数 `key=value`，可重复
    #[arg(short, long = "param", value_parser = parse_param)]
    params: Vec<(String, String)>,
}

impl RequestArgs {
    fn job_params(&self) -> JobParams {
        self.params
            .iter()
            .map(|(key, value)| (key.clone(), serde_json::Value::String(value.clone())))
            .collect()
    }
}

#[derive(Args, Debug)]
struct DispatchArgs {
    /// 队列函数名
    #[arg(short, long)]
    function: String,

    /// 写入参数的回调类型
    #[arg(long)]
    callback_type: String,

    #[command(flatten)]
    request: RequestArgs,
}

#[derive(Args, Debug)]
struct FanoutArgs {
    /// 函数模板，例如 `monitor_{node}`
    #[arg(short, long)]
    function: String,

    /// 任务包类型
    #[arg(long = "type")]
    packet_type: String,

    #[command(flatten)]
    request: RequestArgs,
}

#[derive(Args, Debug)]
struct LockArgs {
    #[command(subcommand)]
    action: LockAction,
}

#[derive(Subcommand, Debug)]
enum LockAction {
    /// 获取锁，已被持有时失败
    Acquire {
        key: String,
        /// 过期分钟数，默认使用 `cache.lock_expire`
        #[arg(long)]
        ttl_minutes: Option<u64>,
    },
    /// 检查锁是否被持有
    Check { key: String },
    /// 释放锁
    Release { key: String },
}

fn parse_param(value: &str) -> std::result::Result<(String, String), String> {
    let (key, value) = value
        .split_once('=')
        .ok_or_else(|| format!("参数格式应为 key=value: {value}"))?;
    if key.is_empty() {
        return Err("参数名不能为空".to_string());
    }
    Ok((key.to_string(), value.to_string()))
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let mut config = AppConfig::load(cli.config.as_deref()).context("加载配置失败")?;
    if let Some(level) = &cli.log_level {
        config.observability.log_level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        config.observability.log_format = format.clone();
    }

    init_logging(
        &config.observability.log_level,
        &config.observability.log_format,
    )?;
    install_metrics_exporter(&config.observability)?;

    let app = Application::new(config);

    match cli.command {
        Commands::Supervise => supervise(cli.config).await?,
        Commands::Worker => {
            let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
            let mut worker = tokio::spawn(async move { app.run_worker(shutdown_rx).await });

            tokio::select! {
                result = wait_for_shutdown_signal() => {
                    result?;
                    let _ = shutdown_tx.send(());
                    worker.await.context("Worker任务异常退出")??;
                }
                result = &mut worker => {
                    result.context("Worker任务异常退出")??;
                }
            }
        }
        Commands::Dispatch(args) => {
            let response = app
                .dispatch(
                    &args.request.job_params(),
                    &args.function,
                    &args.request.require,
                    &args.callback_type,
                )
                .await?;
            print_json(&response)?;
        }
        Commands::Fanout(args) => {
            let response = app
                .fanout(
                    &args.request.job_params(),
                    &args.function,
                    &args.request.require,
                    &args.packet_type,
                )
                .await?;
            print_json(&response)?;
            if !response.result {
                return Ok(ExitCode::FAILURE);
            }
        }
        Commands::Status { uid } => print_json(&app.status(&uid).await?)?,
        Commands::Packet { packet_id } => print_json(&app.packet(packet_id).await?)?,
        Commands::QueueStatus => print_json(&app.queue_status().await?)?,
        Commands::Lock(args) => {
            let report = match args.action {
                LockAction::Acquire { key, ttl_minutes } => {
                    app.lock_acquire(&key, ttl_minutes).await?
                }
                LockAction::Check { key } => app.lock_check(&key).await?,
                LockAction::Release { key } => app.lock_release(&key).await?,
            };
            print_json(&report)?;
        }
    }

    Ok(ExitCode::SUCCESS)
}

#[cfg(unix)]
async fn supervise(config_path: Option<String>) -> Result<()> {
    use std::sync::Arc;

    use fanout_worker::{ExeLauncher, ProcessSupervisor};

    let mut args = Vec::new();
    if let Some(path) = &config_path {
        args.push("--config".to_string());
        args.push(path.clone());
    }
    args.push("worker".to_string());

    let launcher = ExeLauncher::current_exe(args)?;
    let mut supervisor = ProcessSupervisor::new("fanout-worker", config_path, Arc::new(launcher))?;
    info!("启动Worker进程池: {}", supervisor.name());
    supervisor.run().await?;
    info!("Worker进程池已停止");
    Ok(())
}

#[cfg(not(unix))]
async fn supervise(_config_path: Option<String>) -> Result<()> {
    Err(anyhow::anyhow!("进程池需要Unix进程组支持"))
}

fn install_metrics_exporter(config: &ObservabilityConfig) -> Result<()> {
    if !config.metrics_enabled {
        return Ok(());
    }
    let address: SocketAddr = config
        .metrics_address
        .parse()
        .with_context(|| format!("无效的指标监听地址: {}", config.metrics_address))?;
    PrometheusBuilder::new()
        .with_http_listener(address)
        .install()
        .context("启动Prometheus指标导出失败")?;
    info!("Prometheus指标导出监听 {}", address);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// 等待关闭信号
async fn wait_for_shutdown_signal() -> Result<()> {
    let ctrl_c = async { signal::ctrl_c().await.context("安装Ctrl+C信号处理器失败") };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .context("安装SIGTERM信号处理器失败")?
            .recv()
            .await;
        Ok::<(), anyhow::Error>(())
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<Result<()>>();

    tokio::select! {
        result = ctrl_c => {
            info!("收到Ctrl+C信号");
            result
        },
        result = terminate => {
            warn!("收到SIGTERM信号，处理完当前任务后退出");
            result
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_param() {
        assert_eq!(
            parse_param("ip=10.0.0.1").unwrap(),
            ("ip".to_string(), "10.0.0.1".to_string())
        );
        assert_eq!(
            parse_param("query=a=b").unwrap(),
            ("query".to_string(), "a=b".to_string())
        );
        assert!(parse_param("novalue").is_err());
        assert!(parse_param("=x").is_err());
    }

    #[test]
    fn test_cli_parses_fanout() {
        let cli = Cli::try_parse_from([
            "fanout",
            "fanout",
            "-f",
            "monitor_{node}",
            "--type",
            "monitor",
            "-r",
            "ip,check",
            "-p",
            "server=s1",
            "-p",
            "ip=10.0.0.1",
        ])
        .unwrap();

        let Commands::Fanout(args) = cli.command else {
            panic!("expected fanout command");
        };
        assert_eq!(args.request.require, vec!["ip", "check"]);
        let params = args.request.job_params();
        assert_eq!(params.get_string("server").as_deref(), Some("s1"));
    }

    #[test]
    fn test_cli_parses_lock() {
        let cli = Cli::try_parse_from(["fanout", "lock", "acquire", "10.0.0.1", "--ttl-minutes", "2"])
            .unwrap();
        assert!(matches!(
            cli.command,
            Commands::Lock(LockArgs {
                action: LockAction::Acquire { ttl_minutes: Some(2), .. }
            })
        ));
    }
}
