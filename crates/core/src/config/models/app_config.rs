use anyhow::Context;
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    broker::{CacheConfig, MainConfig},
    database::DatabaseConfig,
    observability::ObservabilityConfig,
    worker::{NodesConfig, WorkerConfig},
};
use crate::{FanoutError, FanoutResult};

/// System configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub main: MainConfig,
    pub cache: CacheConfig,
    pub database: DatabaseConfig,
    pub nodes: NodesConfig,
    pub worker: WorkerConfig,
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Default configuration
    /// 2. Config file (TOML format)
    /// 3. Environment variable overrides (prefix: FANOUT__, e.g. `FANOUT__MAIN__QUEUE_SERVER`)
    pub fn load(config_path: Option<&str>) -> FanoutResult<Self> {
        Self::load_inner(config_path).map_err(|e| FanoutError::ConfigLoad(format!("{e:#}")))
    }

    fn load_inner(config_path: Option<&str>) -> anyhow::Result<Self> {
        let defaults =
            ConfigBuilder::try_from(&AppConfig::default()).context("构建默认配置失败")?;
        let mut builder = ConfigBuilder::builder().add_source(defaults);

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else {
            let default_paths = ["config/fanout.toml", "fanout.toml", "/etc/fanout/config.toml"];
            if let Some(path) = default_paths.iter().find(|p| Path::new(p).exists()) {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            }
        }

        builder = builder.add_source(
            Environment::with_prefix("FANOUT")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("nodes.active")
                .with_list_parse_key("worker.functions"),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate_sections()?;
        Ok(config)
    }

    /// Load configuration from TOML string
    pub fn from_toml(toml_str: &str) -> FanoutResult<Self> {
        let config: AppConfig = toml::from_str(toml_str)
            .map_err(|e| FanoutError::ConfigLoad(format!("解析TOML配置失败: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Serialize configuration to TOML string
    pub fn to_toml(&self) -> FanoutResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| FanoutError::ConfigLoad(format!("序列化配置为TOML失败: {e}")))
    }

    pub fn validate(&self) -> FanoutResult<()> {
        self.validate_sections()
            .map_err(|e| FanoutError::ConfigLoad(format!("{e:#}")))
    }

    fn validate_sections(&self) -> anyhow::Result<()> {
        self.main.validate().context("队列配置验证失败")?;
        self.cache.validate().context("缓存配置验证失败")?;
        self.database.validate().context("数据库配置验证失败")?;
        self.nodes.validate().context("节点配置验证失败")?;
        self.worker.validate().context("Worker配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerKind;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cache.lock_ttl(), std::time::Duration::from_secs(300));
    }

    #[test]
    fn test_from_toml_partial_sections() {
        let config = AppConfig::from_toml(
            r#"
            [main]
            queue_server = "memory://"
            job_delete_timeout = 120

            [nodes]
            active = ["n1", "n2"]

            [worker]
            tracker = "cache"
            "#,
        )
        .unwrap();

        assert_eq!(config.main.queue_server, "memory://");
        assert_eq!(config.main.job_delete_timeout, 120);
        assert_eq!(config.nodes.active, vec!["n1", "n2"]);
        assert_eq!(config.worker.tracker, TrackerKind::Cache);
        assert_eq!(config.cache.lock_expire, 5);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = AppConfig::from_toml("[cache]\nlock_expire = 0\n").unwrap_err();
        assert!(matches!(err, FanoutError::ConfigLoad(_)));

        let err = AppConfig::from_toml("[nodes]\nactive = [\"a\", \"a\"]\n").unwrap_err();
        assert!(err.to_string().contains("节点"));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[database]\nurl = \"sqlite::memory:\"\n\n[worker]\nprocesses = 2\n"
        )
        .unwrap();

        let config = AppConfig::load(file.path().to_str()).unwrap();
        assert_eq!(config.database.url, "sqlite::memory:");
        assert_eq!(config.worker.processes, 2);
    }

    #[test]
    fn test_load_missing_file_fails() {
        let err = AppConfig::load(Some("/definitely/not/here.toml")).unwrap_err();
        assert!(matches!(err, FanoutError::ConfigLoad(_)));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = AppConfig::default();
        let text = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&text).unwrap();
        assert_eq!(parsed.main.queue_server, config.main.queue_server);
        assert_eq!(parsed.worker.functions, config.worker.functions);
    }
}
