use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    database::DatabaseConfig, engine::EngineConfig, observability::ObservabilityConfig,
};

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/tasktree.toml",
    "tasktree.toml",
    "/etc/tasktree/config.toml",
];

/// System configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from config file and environment variables
    ///
    /// Load order:
    /// 1. Built-in defaults
    /// 2. Config file (TOML format); explicit path or the first default path that exists
    /// 3. Environment variable overrides (`TASKTREE_DATABASE__URL` style)
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let defaults = AppConfig::default();
        let mut builder = ConfigBuilder::builder()
            .set_default("database.url", defaults.database.url.clone())?
            .set_default("database.max_connections", defaults.database.max_connections)?
            .set_default("database.min_connections", defaults.database.min_connections)?
            .set_default(
                "database.connection_timeout_seconds",
                defaults.database.connection_timeout_seconds,
            )?
            .set_default(
                "database.idle_timeout_seconds",
                defaults.database.idle_timeout_seconds,
            )?
            .set_default("engine.operation_timeout_ms", defaults.engine.operation_timeout_ms)?
            .set_default("engine.default_page_limit", defaults.engine.default_page_limit)?
            .set_default("engine.max_page_limit", defaults.engine.max_page_limit)?
            .set_default("engine.max_subtree_size", defaults.engine.max_subtree_size)?
            .set_default("observability.log_level", defaults.observability.log_level.clone())?
            .set_default("observability.log_format", defaults.observability.log_format.clone())?;

        if let Some(path) = config_path {
            if !Path::new(path).exists() {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        // 环境变量优先级最高
        builder = builder.add_source(
            Environment::with_prefix("TASKTREE")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

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

    /// 单进程内存数据库配置，用于测试与演示
    pub fn in_memory() -> Self {
        Self {
            database: DatabaseConfig::in_memory(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<()> {
        self.database.validate().context("数据库配置验证失败")?;
        self.engine.validate().context("引擎配置验证失败")?;
        self.observability
            .validate()
            .context("可观测性配置验证失败")?;
        Ok(())
    }
}
