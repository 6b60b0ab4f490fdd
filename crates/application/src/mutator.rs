//! 结构变更：插入、移动、删除
//!
//! 所有链表写入之前都重新读取相关行，摘除与接入因此可以任意组合，
//! 包括在同一父任务内把任务移到紧邻的位置。

use chrono::Utc;
use tasktree_domain::{
    ChainUpdate, CreatedTask, MoveTarget, MovedTask, NewTask, OwnMetrics, SiblingPosition,
    SubtreeMetrics, TaskId, TaskNode, TreeTransaction, MAX_TRAVERSAL_DEPTH,
};
use tasktree_errors::{TreeError, TreeResult};
use tracing::{debug, warn};

use crate::navigator::require;
use crate::reconciler::propagate;

/// 在 `parent` 下的 `position` 处创建新任务
pub async fn insert(
    tx: &mut dyn TreeTransaction,
    parent_id: TaskId,
    position: SiblingPosition,
    fields: NewTask,
) -> TreeResult<CreatedTask> {
    let fields = fields.normalized()?;
    let parent = require(tx, parent_id).await?;
    if let SiblingPosition::After(sibling_id) = position {
        require_child_of(tx, sibling_id, parent.id).await?;
    }

    let scope = tx.scope();
    let mut node = TaskNode {
        id: TaskId::new(),
        tenant: scope.tenant,
        project: scope.project,
        parent: Some(parent.id),
        first_child: None,
        next_sibling: None,
        name: fields.name,
        description: fields.description,
        created_by: fields.created_by,
        created_on: Utc::now(),
        assigned_user: fields.assigned_user,
        is_parallel: fields.is_parallel,
        own: OwnMetrics {
            time_estimate: fields.time_estimate,
            cost_estimate: fields.cost_estimate,
            ..Default::default()
        },
        subtree: SubtreeMetrics::default(),
        child_count: 0,
        descendant_count: 0,
    };

    link(tx, &mut node, parent.id, position).await?;
    tx.insert(&node).await?;
    propagate(tx, parent.id, ChainUpdate::attach(&node)).await?;

    debug!("已插入{} 到父任务 {}", node.entity_description(), parent.id);
    Ok(CreatedTask {
        parent: require(tx, parent.id).await?,
        task: require(tx, node.id).await?,
    })
}

/// 移动任务及其整棵子树；`target.parent` 为空时只在当前父任务内调整顺序
pub async fn move_task(
    tx: &mut dyn TreeTransaction,
    id: TaskId,
    target: MoveTarget,
) -> TreeResult<MovedTask> {
    let mut node = require(tx, id).await?;
    let old_parent_id = node
        .parent
        .ok_or_else(|| TreeError::invalid_move("项目根任务不能移动"))?;
    let new_parent_id = target.parent.unwrap_or(old_parent_id);
    if !tx.exists(new_parent_id).await? {
        return Err(TreeError::task_not_found(new_parent_id));
    }

    if new_parent_id == old_parent_id {
        let previous = tx.previous_sibling(id).await?.map(|n| n.id);
        if target.position == SiblingPosition::from_previous(previous) {
            return Err(TreeError::NoChange);
        }
    }

    if new_parent_id == id {
        warn!("拒绝移动: 任务 {} 不能成为自己的父任务", id);
        return Err(TreeError::invalid_move("检测到祖先环"));
    }
    let ancestors = tx.ancestors(new_parent_id, MAX_TRAVERSAL_DEPTH).await?;
    if ancestors.iter().any(|ancestor| ancestor.id == id) {
        warn!("拒绝移动: 任务 {} 是目标父任务 {} 的祖先", id, new_parent_id);
        return Err(TreeError::invalid_move("检测到祖先环"));
    }

    if let SiblingPosition::After(sibling_id) = target.position {
        if sibling_id == id {
            warn!("拒绝移动: 任务 {} 不能排在自己之后", id);
            return Err(TreeError::invalid_move("检测到兄弟环"));
        }
        require_child_of(tx, sibling_id, new_parent_id).await?;
    }

    unlink(tx, &mut node).await?;
    link(tx, &mut node, new_parent_id, target.position).await?;
    tx.save(&node).await?;

    if new_parent_id != old_parent_id {
        propagate(tx, old_parent_id, ChainUpdate::detach(&node)).await?;
        propagate(tx, new_parent_id, ChainUpdate::attach(&node)).await?;
        debug!(
            "已将{} 从 {} 移动到 {}",
            node.entity_description(),
            old_parent_id,
            new_parent_id
        );
    } else {
        debug!("已在父任务 {} 内重排{}", old_parent_id, node.entity_description());
    }

    Ok(MovedTask {
        task: require(tx, id).await?,
        old_parent: require(tx, old_parent_id).await?,
        new_parent: require(tx, new_parent_id).await?,
    })
}

/// 删除叶子任务，返回更新后的父任务
pub async fn delete(tx: &mut dyn TreeTransaction, id: TaskId) -> TreeResult<TaskNode> {
    let mut node = require(tx, id).await?;
    let parent_id = node.parent.ok_or_else(|| {
        TreeError::validation_error("项目根任务只能随项目一起删除")
    })?;
    if node.child_count > 0 {
        return Err(TreeError::not_empty(id, node.child_count));
    }

    unlink(tx, &mut node).await?;
    tx.delete(id).await?;
    propagate(tx, parent_id, ChainUpdate::detach(&node)).await?;

    debug!("已删除{}", node.entity_description());
    require(tx, parent_id).await
}

async fn require_child_of(
    tx: &mut dyn TreeTransaction,
    sibling_id: TaskId,
    parent_id: TaskId,
) -> TreeResult<TaskNode> {
    let sibling = require(tx, sibling_id).await?;
    if sibling.parent != Some(parent_id) {
        debug!("任务 {} 不是 {} 的子任务", sibling_id, parent_id);
        return Err(TreeError::task_not_found(sibling_id));
    }
    Ok(sibling)
}

/// 把 `node` 从当前父任务的子链表中摘除，前驱改为指向它原来的后继
async fn unlink(tx: &mut dyn TreeTransaction, node: &mut TaskNode) -> TreeResult<()> {
    match tx.previous_sibling(node.id).await? {
        Some(mut previous) => {
            previous.next_sibling = node.next_sibling;
            tx.save(&previous).await?;
        }
        None => {
            let parent_id = node
                .parent
                .ok_or_else(|| TreeError::internal("根任务不在任何子链表中"))?;
            let mut parent = require(tx, parent_id).await?;
            if parent.first_child != Some(node.id) {
                return Err(TreeError::internal(format!(
                    "任务 {} 不在父任务 {} 的子链表中",
                    node.id, parent_id
                )));
            }
            parent.first_child = node.next_sibling;
            tx.save(&parent).await?;
        }
    }
    node.next_sibling = None;
    Ok(())
}

/// 把 `node` 接入 `parent_id` 的子链表；`node` 自身的行由调用方写入
async fn link(
    tx: &mut dyn TreeTransaction,
    node: &mut TaskNode,
    parent_id: TaskId,
    position: SiblingPosition,
) -> TreeResult<()> {
    match position {
        SiblingPosition::First => {
            let mut parent = require(tx, parent_id).await?;
            node.next_sibling = parent.first_child;
            parent.first_child = Some(node.id);
            tx.save(&parent).await?;
        }
        SiblingPosition::After(previous_id) => {
            let mut previous = require(tx, previous_id).await?;
            node.next_sibling = previous.next_sibling;
            previous.next_sibling = Some(node.id);
            tx.save(&previous).await?;
        }
    }
    node.parent = Some(parent_id);
    Ok(())
}
