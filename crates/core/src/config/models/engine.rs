use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 任务树引擎配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// 单个操作（含事务）的超时时间
    pub operation_timeout_ms: u64,
    pub default_page_limit: u32,
    pub max_page_limit: u32,
    /// 整棵子树读取允许的最大后代数量
    pub max_subtree_size: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            operation_timeout_ms: 3000,
            default_page_limit: 10,
            max_page_limit: 100,
            max_subtree_size: 1000,
        }
    }
}

impl EngineConfig {
    pub fn operation_timeout(&self) -> Duration {
        Duration::from_millis(self.operation_timeout_ms)
    }

    /// 未指定时使用默认值，超出范围时截断到 1..=max_page_limit
    pub fn page_limit(&self, requested: Option<u32>) -> u32 {
        requested
            .unwrap_or(self.default_page_limit)
            .clamp(1, self.max_page_limit.max(1))
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.operation_timeout_ms == 0 {
            return Err(anyhow::anyhow!("操作超时时间必须大于0"));
        }

        if self.max_page_limit == 0 {
            return Err(anyhow::anyhow!("分页上限必须大于0"));
        }

        if self.default_page_limit == 0 || self.default_page_limit > self.max_page_limit {
            return Err(anyhow::anyhow!(
                "默认分页大小必须在 1 到 {} 之间",
                self.max_page_limit
            ));
        }

        Ok(())
    }
}
