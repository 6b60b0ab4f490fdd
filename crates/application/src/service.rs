//! 任务树引擎的对外入口
//!
//! 每个公开操作都在单棵树的一个事务中完成，并受统一的超时约束。
//! 写操作在事务开始时获取树锁；任何错误或超时都会回滚整个事务。

use std::future::Future;
use std::sync::Arc;

use tasktree_core::EngineConfig;
use tasktree_domain::{
    Contribution, CreatedTask, MoveTarget, MovedTask, NewTask, Page, SiblingPosition, Subtree,
    TaskId, TaskNode, TaskPatch, TaskTreeStore, TenantId, TreeScope, TreeTransaction,
};
use tasktree_errors::{TreeError, TreeResult};
use tracing::{info, instrument, warn};

use crate::project::AuditReport;
use crate::{contribution, mutator, navigator, project};

pub struct TaskTreeService {
    store: Arc<dyn TaskTreeStore>,
    config: EngineConfig,
}

impl TaskTreeService {
    pub fn new(store: Arc<dyn TaskTreeStore>, config: EngineConfig) -> Self {
        Self { store, config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// 创建项目及其根任务，返回的根任务ID即项目ID
    #[instrument(skip(self, new_task), fields(tenant = %tenant))]
    pub async fn create_project(
        &self,
        tenant: TenantId,
        new_task: NewTask,
    ) -> TreeResult<TaskNode> {
        let root = self
            .with_deadline(
                "create_project",
                project::create_project(self.store.as_ref(), tenant, new_task),
            )
            .await?;
        info!("项目创建成功: {}", root.entity_description());
        Ok(root)
    }

    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn delete_project(&self, scope: TreeScope) -> TreeResult<()> {
        self.with_deadline(
            "delete_project",
            project::delete_project(self.store.as_ref(), &scope),
        )
        .await?;
        info!("项目已删除: {}", scope);
        Ok(())
    }

    #[instrument(skip(self), fields(scope = %scope, task = %id))]
    pub async fn get(&self, scope: TreeScope, id: TaskId) -> TreeResult<TaskNode> {
        self.with_deadline("get", async {
            let mut tx = self.store.begin_read(&scope).await?;
            let result = navigator::require(tx.as_mut(), id).await;
            finish_read(tx, result).await
        })
        .await
    }

    /// 批量查询，不存在的ID被忽略
    #[instrument(skip(self, ids), fields(scope = %scope, count = ids.len()))]
    pub async fn get_many(&self, scope: TreeScope, ids: &[TaskId]) -> TreeResult<Vec<TaskNode>> {
        self.with_deadline("get_many", async {
            let mut tx = self.store.begin_read(&scope).await?;
            let result = tx.get_many(ids).await;
            finish_read(tx, result).await
        })
        .await
    }

    #[instrument(skip(self), fields(scope = %scope, task = %id))]
    pub async fn ancestors(
        &self,
        scope: TreeScope,
        id: TaskId,
        limit: Option<u32>,
    ) -> TreeResult<Page<TaskNode>> {
        let limit = self.config.page_limit(limit);
        self.with_deadline("ancestors", async {
            let mut tx = self.store.begin_read(&scope).await?;
            let result = navigator::ancestors(tx.as_mut(), id, limit).await;
            finish_read(tx, result).await
        })
        .await
    }

    #[instrument(skip(self), fields(scope = %scope, task = %id))]
    pub async fn children(
        &self,
        scope: TreeScope,
        id: TaskId,
        after: Option<TaskId>,
        limit: Option<u32>,
    ) -> TreeResult<Page<TaskNode>> {
        let limit = self.config.page_limit(limit);
        self.with_deadline("children", async {
            let mut tx = self.store.begin_read(&scope).await?;
            let result = navigator::children(tx.as_mut(), id, after, limit).await;
            finish_read(tx, result).await
        })
        .await
    }

    #[instrument(skip(self), fields(scope = %scope, task = %id))]
    pub async fn subtree(&self, scope: TreeScope, id: TaskId) -> TreeResult<Subtree> {
        let max_size = self.config.max_subtree_size;
        self.with_deadline("subtree", async {
            let mut tx = self.store.begin_read(&scope).await?;
            let result = navigator::subtree(tx.as_mut(), id, max_size).await;
            finish_read(tx, result).await
        })
        .await
    }

    #[instrument(skip(self, new_task), fields(scope = %scope, parent = %parent))]
    pub async fn insert(
        &self,
        scope: TreeScope,
        parent: TaskId,
        position: SiblingPosition,
        new_task: NewTask,
    ) -> TreeResult<CreatedTask> {
        let created = self
            .with_deadline("insert", async {
                let mut tx = self.store.begin_write(&scope).await?;
                let result = mutator::insert(tx.as_mut(), parent, position, new_task).await;
                finish(tx, result).await
            })
            .await?;
        info!("任务创建成功: {}", created.task.entity_description());
        Ok(created)
    }

    #[instrument(skip(self), fields(scope = %scope, task = %id))]
    pub async fn move_task(
        &self,
        scope: TreeScope,
        id: TaskId,
        target: MoveTarget,
    ) -> TreeResult<MovedTask> {
        let moved = self
            .with_deadline("move", async {
                let mut tx = self.store.begin_write(&scope).await?;
                let result = mutator::move_task(tx.as_mut(), id, target).await;
                finish(tx, result).await
            })
            .await?;
        info!(
            "任务移动成功: {} -> {}",
            moved.old_parent.id, moved.new_parent.id
        );
        Ok(moved)
    }

    /// 删除叶子任务，返回更新后的父任务
    #[instrument(skip(self), fields(scope = %scope, task = %id))]
    pub async fn delete(&self, scope: TreeScope, id: TaskId) -> TreeResult<TaskNode> {
        let parent = self
            .with_deadline("delete", async {
                let mut tx = self.store.begin_write(&scope).await?;
                let result = mutator::delete(tx.as_mut(), id).await;
                finish(tx, result).await
            })
            .await?;
        info!("任务删除成功: {}", id);
        Ok(parent)
    }

    #[instrument(skip(self, patch), fields(scope = %scope, task = %id))]
    pub async fn update(
        &self,
        scope: TreeScope,
        id: TaskId,
        patch: TaskPatch,
    ) -> TreeResult<TaskNode> {
        let task = self
            .with_deadline("update", async {
                let mut tx = self.store.begin_write(&scope).await?;
                let result = contribution::update(tx.as_mut(), id, patch).await;
                finish(tx, result).await
            })
            .await?;
        info!("任务更新成功: {}", task.entity_description());
        Ok(task)
    }

    /// 供时间、费用与文件记录调用，把子记录的变化计入任务
    #[instrument(skip(self), fields(scope = %scope, task = %id, kind = ?delta.kind))]
    pub async fn contribute(
        &self,
        scope: TreeScope,
        id: TaskId,
        delta: Contribution,
    ) -> TreeResult<TaskNode> {
        self.with_deadline("contribute", async {
            let mut tx = self.store.begin_write(&scope).await?;
            let result = contribution::contribute(tx.as_mut(), id, delta).await;
            finish(tx, result).await
        })
        .await
    }

    #[instrument(skip(self), fields(scope = %scope))]
    pub async fn audit(&self, scope: TreeScope) -> TreeResult<AuditReport> {
        let report = self
            .with_deadline("audit", async {
                let mut tx = self.store.begin_read(&scope).await?;
                let result = project::audit(tx.as_mut()).await;
                finish_read(tx, result).await
            })
            .await?;
        if !report.is_consistent() {
            warn!("任务树 {} 存在 {} 处不变量破坏", scope, report.violations.len());
        }
        Ok(report)
    }

    pub async fn revision(&self, scope: TreeScope) -> TreeResult<i64> {
        self.with_deadline("revision", async {
            let mut tx = self.store.begin_read(&scope).await?;
            let result = tx.revision().await;
            finish_read(tx, result).await
        })
        .await
    }

    async fn with_deadline<T, F>(&self, operation: &'static str, future: F) -> TreeResult<T>
    where
        F: Future<Output = TreeResult<T>>,
    {
        let timeout = self.config.operation_timeout();
        match tokio::time::timeout(timeout, future).await {
            Ok(result) => result,
            Err(_) => {
                warn!("操作 {} 超时，事务已回滚", operation);
                Err(TreeError::timeout(format!(
                    "{operation} 未在 {}ms 内完成",
                    timeout.as_millis()
                )))
            }
        }
    }
}

/// 成功则提交，失败则回滚并返回原始错误
async fn finish<T>(mut tx: Box<dyn TreeTransaction>, result: TreeResult<T>) -> TreeResult<T> {
    match result {
        Ok(value) => {
            tx.commit().await?;
            Ok(value)
        }
        Err(err) => {
            if let Err(rollback_err) = tx.rollback().await {
                warn!("回滚失败: {}", rollback_err);
            }
            Err(err)
        }
    }
}

async fn finish_read<T>(mut tx: Box<dyn TreeTransaction>, result: TreeResult<T>) -> TreeResult<T> {
    if let Err(rollback_err) = tx.rollback().await {
        warn!("结束只读事务失败: {}", rollback_err);
    }
    result
}
