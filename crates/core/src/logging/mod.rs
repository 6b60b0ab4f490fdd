pub mod log_level;

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use log_level::{LogFormat, LogLevel};

use crate::config::ObservabilityConfig;

/// 初始化日志系统；`RUST_LOG` 存在时覆盖配置中的级别。日志写入 stderr，stdout 留给命令输出
pub fn init_logging(config: &ObservabilityConfig) -> Result<()> {
    let level = config.level()?;
    let format = config.format()?;

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.as_str()));

    let registry = tracing_subscriber::registry().with(env_filter);

    match format {
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).json())
            .try_init()
            .context("初始化JSON日志格式失败")?,
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).pretty())
            .try_init()
            .context("初始化Pretty日志格式失败")?,
        LogFormat::Text => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr).compact())
            .try_init()
            .context("初始化文本日志格式失败")?,
    }

    Ok(())
}
