//! 项目生命周期与不变量审计

use chrono::Utc;
use serde::Serialize;
use tasktree_domain::{
    tree_invariant_violations, NewTask, OwnMetrics, SubtreeMetrics, TaskId, TaskNode,
    TaskTreeStore, TenantId, TreeInvariantViolation, TreeScope, TreeTransaction,
};
use tasktree_errors::{TreeError, TreeResult};

/// 一次审计的结果
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub scope: TreeScope,
    pub revision: i64,
    pub task_count: usize,
    pub violations: Vec<TreeInvariantViolation>,
}

impl AuditReport {
    pub fn is_consistent(&self) -> bool {
        self.violations.is_empty()
    }
}

/// 根任务的ID同时作为项目ID
pub fn root_node(tenant: TenantId, fields: NewTask) -> TreeResult<TaskNode> {
    let fields = fields.normalized()?;
    if fields.assigned_user.is_some() {
        return Err(TreeError::validation_error("项目根任务不能指派用户"));
    }
    let id = TaskId::new();
    Ok(TaskNode {
        id,
        tenant,
        project: id,
        parent: None,
        first_child: None,
        next_sibling: None,
        name: fields.name,
        description: fields.description,
        created_by: fields.created_by,
        created_on: Utc::now(),
        assigned_user: None,
        is_parallel: fields.is_parallel,
        own: OwnMetrics {
            time_estimate: fields.time_estimate,
            cost_estimate: fields.cost_estimate,
            ..Default::default()
        },
        subtree: SubtreeMetrics::default(),
        child_count: 0,
        descendant_count: 0,
    })
}

pub async fn create_project(
    store: &dyn TaskTreeStore,
    tenant: TenantId,
    fields: NewTask,
) -> TreeResult<TaskNode> {
    let root = root_node(tenant, fields)?;
    store.create_tree(&root).await?;
    Ok(root)
}

/// 级联删除整棵树，不受只能删除叶子任务的限制
pub async fn delete_project(store: &dyn TaskTreeStore, scope: &TreeScope) -> TreeResult<()> {
    if store.delete_tree(scope).await? {
        Ok(())
    } else {
        Err(TreeError::project_not_found(scope.project))
    }
}

pub async fn audit(tx: &mut dyn TreeTransaction) -> TreeResult<AuditReport> {
    let scope = tx.scope();
    let revision = tx.revision().await?;
    let nodes = tx.all_nodes().await?;
    Ok(AuditReport {
        scope,
        revision,
        task_count: nodes.len(),
        violations: tree_invariant_violations(scope.project, &nodes),
    })
}
