#![allow(dead_code)]

use std::sync::Arc;

use anyhow::Result;
use tasktree_application::TaskTreeService;
use tasktree_core::EngineConfig;
use tasktree_domain::{NewTask, SiblingPosition, TaskId, TaskNode, TenantId, TreeScope, UserId};
use tasktree_infrastructure::SqliteTreeStore;

pub async fn memory_service() -> Result<TaskTreeService> {
    let store = SqliteTreeStore::new_embedded("sqlite::memory:").await?;
    Ok(TaskTreeService::new(Arc::new(store), EngineConfig::default()))
}

/// 内存库上的一个项目及常用操作
pub struct TestProject {
    pub service: TaskTreeService,
    pub scope: TreeScope,
    pub user: UserId,
}

impl TestProject {
    pub async fn new(parallel: bool) -> Result<Self> {
        let service = memory_service().await?;
        Self::create_in(service, parallel).await
    }

    pub async fn create_in(service: TaskTreeService, parallel: bool) -> Result<Self> {
        let user = UserId::new();
        let tenant = TenantId::new();
        let root = service
            .create_project(tenant, NewTask::new("项目", user).parallel(parallel))
            .await?;
        Ok(Self {
            service,
            scope: root.scope(),
            user,
        })
    }

    pub fn root(&self) -> TaskId {
        self.scope.project
    }

    /// 追加到父任务子链表的末尾
    pub async fn add(&self, parent: TaskId, name: &str, time_estimate: u64) -> Result<TaskNode> {
        let fields = NewTask::new(name, self.user).time_estimate(time_estimate);
        self.add_with(parent, fields).await
    }

    pub async fn add_with(&self, parent: TaskId, fields: NewTask) -> Result<TaskNode> {
        let last = self.child_ids(parent).await?.last().copied();
        let position = SiblingPosition::from_previous(last);
        let created = self
            .service
            .insert(self.scope, parent, position, fields)
            .await?;
        Ok(created.task)
    }

    pub async fn task(&self, id: TaskId) -> Result<TaskNode> {
        Ok(self.service.get(self.scope, id).await?)
    }

    /// 按链表顺序列出全部直接子任务
    pub async fn child_ids(&self, id: TaskId) -> Result<Vec<TaskId>> {
        let mut ids = Vec::new();
        let mut after = None;
        loop {
            let page = self
                .service
                .children(self.scope, id, after, Some(100))
                .await?;
            ids.extend(page.items.iter().map(|n| n.id));
            if !page.more {
                return Ok(ids);
            }
            after = ids.last().copied();
        }
    }

    pub async fn assert_consistent(&self) -> Result<()> {
        let report = self.service.audit(self.scope).await?;
        assert!(
            report.is_consistent(),
            "invariant violations: {:#?}",
            report.violations
        );
        Ok(())
    }
}
