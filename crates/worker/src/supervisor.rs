//! Worker进程池
//!
//! 所有Worker子进程加入同一个进程组：第一个子进程创建进程组，其余子进程加入。
//! 停止时向该进程组发送一次 `SIGTERM`，监督进程本身不在组内，不会被一并结束。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use fanout_core::{config::AppConfig, FanoutError, FanoutResult};
use nix::errno::Errno;
use nix::sys::signal::{killpg, Signal};
use nix::unistd::Pid;
use tokio::process::{Child, Command};
use tokio::signal::unix::{signal, SignalKind};
use tokio::time::timeout;
use tracing::{debug, error, info, instrument, warn};

/// 创建Worker子进程的启动命令
pub trait WorkerLauncher: Send + Sync {
    fn command(&self, index: usize, config: &AppConfig) -> Command;
}

/// 以指定可执行文件和参数启动Worker
pub struct ExeLauncher {
    program: PathBuf,
    args: Vec<String>,
}

impl ExeLauncher {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
        }
    }

    /// 使用当前可执行文件
    pub fn current_exe(args: Vec<String>) -> FanoutResult<Self> {
        let program = std::env::current_exe()
            .map_err(|e| FanoutError::Process(format!("无法获取当前可执行文件路径: {e}")))?;
        Ok(Self::new(program, args))
    }
}

impl WorkerLauncher for ExeLauncher {
    fn command(&self, _index: usize, _config: &AppConfig) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        command
    }
}

pub struct ProcessSupervisor {
    name: String,
    config_path: Option<String>,
    config: Option<AppConfig>,
    launcher: Arc<dyn WorkerLauncher>,
    children: Vec<Child>,
    pgid: Option<i32>,
    stop_timeout: Duration,
}

impl ProcessSupervisor {
    /// 创建进程池并加载配置，首次加载失败时无法启动
    pub fn new(
        name: impl Into<String>,
        config_path: Option<String>,
        launcher: Arc<dyn WorkerLauncher>,
    ) -> FanoutResult<Self> {
        let mut supervisor = Self {
            name: name.into(),
            config_path,
            config: None,
            launcher,
            children: Vec::new(),
            pgid: None,
            stop_timeout: Duration::from_secs(10),
        };
        supervisor.load_config()?;
        Ok(supervisor)
    }

    pub fn with_stop_timeout(mut self, stop_timeout: Duration) -> Self {
        self.stop_timeout = stop_timeout;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> Option<&AppConfig> {
        self.config.as_ref()
    }

    /// Worker进程组ID，没有运行中的Worker时为 `None`
    pub fn pgid(&self) -> Option<i32> {
        self.pgid
    }

    pub fn child_pids(&self) -> Vec<u32> {
        self.children.iter().filter_map(Child::id).collect()
    }

    /// 重新加载配置
    ///
    /// 从未成功加载过配置时返回致命错误；否则保留旧配置，记录错误后把错误交给调用方。
    pub fn load_config(&mut self) -> FanoutResult<&AppConfig> {
        match AppConfig::load(self.config_path.as_deref()) {
            Ok(config) => {
                info!("Apply config...");
                let config: &AppConfig = self.config.insert(config);
                Ok(config)
            }
            Err(e) => {
                error!("Unable to load config: [{}]", e);
                if self.config.is_none() {
                    return Err(FanoutError::ConfigLoad(format!(
                        "没有可用的配置，无法启动: {e}"
                    )));
                }
                error!("配置校验失败，继续使用旧配置");
                Err(e)
            }
        }
    }

    /// 按配置的进程数启动Worker
    #[instrument(skip(self), fields(name = %self.name))]
    pub fn start(&mut self) -> FanoutResult<()> {
        let config = self
            .config
            .clone()
            .ok_or_else(|| FanoutError::ConfigLoad("配置尚未加载".to_string()))?;

        for index in 0..config.worker.processes {
            let mut command = self.launcher.command(index, &config);
            command
                .process_group(self.pgid.unwrap_or(0))
                .kill_on_drop(true);

            let child = command
                .spawn()
                .map_err(|e| FanoutError::Process(format!("启动Worker进程失败: {e}")))?;
            let pid = child
                .id()
                .ok_or_else(|| FanoutError::Process("Worker进程启动后立即退出".to_string()))?;

            let pgid = *self.pgid.get_or_insert(pid as i32);
            info!("A new child [{}] group=[{}]", pid, pgid);
            self.children.push(child);
        }

        info!("{} 启动了 {} 个Worker进程", self.name, self.children.len());
        Ok(())
    }

    /// 向Worker进程组发送 `SIGTERM` 并等待子进程退出，没有进程组时什么也不做
    #[instrument(skip(self), fields(name = %self.name))]
    pub async fn stop(&mut self) -> FanoutResult<()> {
        let Some(pgid) = self.pgid else {
            info!("Nothing to kill");
            return Ok(());
        };

        info!("Start to shutdown workers");
        info!("Pid=[{}] Group PID=[{}]", std::process::id(), pgid);
        match killpg(Pid::from_raw(pgid), Signal::SIGTERM) {
            Ok(()) => {}
            Err(Errno::ESRCH) => debug!("进程组 {} 已不存在", pgid),
            Err(e) => {
                return Err(FanoutError::Process(format!(
                    "向进程组 {pgid} 发送SIGTERM失败: {e}"
                )))
            }
        }
        self.pgid = None;

        for mut child in std::mem::take(&mut self.children) {
            match timeout(self.stop_timeout, child.wait()).await {
                Ok(Ok(status)) => debug!("Worker {:?} 已退出: {}", child.id(), status),
                Ok(Err(e)) => warn!("等待Worker退出失败: {}", e),
                Err(_) => {
                    warn!(
                        "Worker {:?} 在 {:?} 内未退出，强制结束",
                        child.id(),
                        self.stop_timeout
                    );
                    if let Err(e) = child.start_kill() {
                        warn!("强制结束Worker失败: {}", e);
                    }
                    if let Err(e) = child.wait().await {
                        warn!("等待被强制结束的Worker退出失败: {}", e);
                    }
                }
            }
        }

        Ok(())
    }

    /// 启动Worker并处理信号：`SIGHUP` 重新加载配置并重启Worker，`SIGTERM`/`Ctrl+C` 停止
    pub async fn run(&mut self) -> FanoutResult<()> {
        let mut hangup = signal(SignalKind::hangup())
            .map_err(|e| FanoutError::Process(format!("注册SIGHUP处理失败: {e}")))?;
        let mut terminate = signal(SignalKind::terminate())
            .map_err(|e| FanoutError::Process(format!("注册SIGTERM处理失败: {e}")))?;

        if let Err(e) = self.start() {
            self.stop().await?;
            return Err(e);
        }

        loop {
            tokio::select! {
                _ = hangup.recv() => {
                    info!("收到SIGHUP，重新加载配置");
                    match self.load_config() {
                        Ok(_) => {
                            self.stop().await?;
                            self.start()?;
                        }
                        Err(e) => warn!("继续使用旧配置运行: {}", e),
                    }
                }
                _ = terminate.recv() => {
                    info!("收到SIGTERM");
                    break;
                }
                _ = tokio::signal::ctrl_c() => {
                    info!("收到Ctrl+C");
                    break;
                }
            }
        }

        self.stop().await
    }
}
