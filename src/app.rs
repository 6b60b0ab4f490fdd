use std::sync::Arc;

use anyhow::{Context, Result};
use tasktree_application::TaskTreeService;
use tasktree_core::AppConfig;
use tasktree_infrastructure::{DatabaseManager, DatabaseType};
use tracing::info;

/// 主应用程序：数据库连接、迁移与任务树服务
pub struct Application {
    config: AppConfig,
    database: DatabaseManager,
    service: Arc<TaskTreeService>,
}

impl Application {
    /// 创建新的应用实例，连接数据库并执行迁移
    pub async fn new(config: AppConfig) -> Result<Self> {
        config.validate()?;
        info!("初始化应用程序");

        let database = DatabaseManager::new(&config.database)
            .await
            .context("创建数据库连接池失败")?;
        let store = database
            .migrated_tree_store()
            .await
            .context("运行数据库迁移失败")?;
        let service = Arc::new(TaskTreeService::new(store, config.engine.clone()));

        info!("应用程序初始化完成，数据库类型: {:?}", database.database_type());
        Ok(Self {
            config,
            database,
            service,
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn service(&self) -> Arc<TaskTreeService> {
        Arc::clone(&self.service)
    }

    pub fn database_type(&self) -> DatabaseType {
        self.database.database_type()
    }

    pub async fn health_check(&self) -> Result<()> {
        self.database
            .health_check()
            .await
            .context("数据库健康检查失败")
    }

    /// 关闭连接池
    pub async fn shutdown(self) {
        self.database.close().await;
        info!("应用程序已关闭");
    }
}
