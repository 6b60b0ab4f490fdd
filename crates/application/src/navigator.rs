//! 只读的树遍历：单点查询、祖先链、子任务分页与整棵子树

use std::collections::HashMap;

use tasktree_domain::{Page, Subtree, TaskId, TaskNode, TreeTransaction};
use tasktree_errors::{TreeError, TreeResult};
use tracing::debug;

/// 查询任务，不存在时返回 `NotFound`
pub async fn require(tx: &mut dyn TreeTransaction, id: TaskId) -> TreeResult<TaskNode> {
    tx.get(id)
        .await?
        .ok_or_else(|| TreeError::task_not_found(id))
}

/// 从直接父任务到项目根任务，根任务自身没有祖先
pub async fn ancestors(
    tx: &mut dyn TreeTransaction,
    id: TaskId,
    limit: u32,
) -> TreeResult<Page<TaskNode>> {
    if !tx.exists(id).await? {
        return Err(TreeError::task_not_found(id));
    }
    let fetched = tx.ancestors(id, limit.saturating_add(1)).await?;
    Ok(Page::from_overfetch(fetched, limit))
}

/// 按兄弟链表顺序返回直接子任务；`after` 为游标，结果从它的下一个兄弟开始
pub async fn children(
    tx: &mut dyn TreeTransaction,
    id: TaskId,
    after: Option<TaskId>,
    limit: u32,
) -> TreeResult<Page<TaskNode>> {
    let parent = require(tx, id).await?;

    let start = match after {
        None => parent.first_child,
        Some(cursor) => {
            let sibling = require(tx, cursor).await?;
            if sibling.parent != Some(id) {
                debug!("游标任务 {} 不是 {} 的子任务", cursor, id);
                return Err(TreeError::task_not_found(cursor));
            }
            sibling.next_sibling
        }
    };

    match start {
        Some(first) => {
            let fetched = tx.sibling_chain(first, limit.saturating_add(1)).await?;
            Ok(Page::from_overfetch(fetched, limit))
        }
        None => Ok(Page {
            items: Vec::new(),
            more: false,
        }),
    }
}

/// 读取 `id` 及其全部后代；后代数量超过 `max_size` 时拒绝
pub async fn subtree(
    tx: &mut dyn TreeTransaction,
    id: TaskId,
    max_size: u64,
) -> TreeResult<Subtree> {
    let root = require(tx, id).await?;
    if root.descendant_count > max_size {
        return Err(TreeError::validation_error(format!(
            "子树包含 {} 个任务，超过上限 {}",
            root.descendant_count, max_size
        )));
    }

    let tasks: HashMap<TaskId, TaskNode> = tx
        .subtree(id)
        .await?
        .into_iter()
        .map(|node| (node.id, node))
        .collect();
    Ok(Subtree { root: id, tasks })
}
