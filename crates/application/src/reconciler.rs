//! 子树聚合的增量维护
//!
//! 每次变更只沿受影响任务的祖先链向上走一遍：可加字段直接加上增量，
//! `subtree.time_minimum` 在串行祖先上按增量调整，在并行祖先上根据直接子任务重算一层，
//! 再把该祖先自身贡献的变化继续向上传递。

use tasktree_domain::{
    apply_delta, combine_minimum, shift_sequential_minimum, ChainUpdate, ScheduleShift, TaskId,
    TaskNode, TreeTransaction, MAX_TRAVERSAL_DEPTH,
};
use tasktree_errors::{TreeError, TreeResult};
use tracing::debug;

/// 按 `node` 自身的并行标记，由其直接子任务的当前存储值计算子树最短时长
pub async fn recompute_minimum(tx: &mut dyn TreeTransaction, node: &TaskNode) -> TreeResult<u64> {
    let children = tx.children(node.id).await?;
    Ok(combine_minimum(
        node.is_parallel,
        children.iter().map(TaskNode::schedule_contribution),
    ))
}

/// 从 `start`（发生变化的任务的直接父任务）开始向上应用 `update`，返回被写入的祖先数量。
///
/// 调用前变化本身必须已经写入事务：并行祖先重算时读取的是子任务的当前行。
pub async fn propagate(
    tx: &mut dyn TreeTransaction,
    start: TaskId,
    update: ChainUpdate,
) -> TreeResult<usize> {
    let mut current = Some(start);
    let mut update = update;
    let mut touched = 0usize;

    while let Some(id) = current {
        if update.is_noop() {
            break;
        }
        if touched as u32 >= MAX_TRAVERSAL_DEPTH {
            return Err(TreeError::internal(format!(
                "祖先链超过 {MAX_TRAVERSAL_DEPTH} 层，任务树可能存在环"
            )));
        }

        let mut node = tx
            .get(id)
            .await?
            .ok_or_else(|| TreeError::task_not_found(id))?;
        let contribution_before = node.schedule_contribution();

        if update.child_count != 0 {
            node.child_count = apply_delta(node.child_count, update.child_count, "child_count")?;
        }
        node.descendant_count = apply_delta(
            node.descendant_count,
            update.sums.descendants,
            "descendant_count",
        )?;
        node.subtree.apply_sums(&update.sums)?;

        if !update.schedule.is_neutral() {
            node.subtree.time_minimum = if node.is_parallel {
                recompute_minimum(tx, &node).await?
            } else {
                shift_sequential_minimum(node.subtree.time_minimum, update.schedule)?
            };
        }

        tx.save(&node).await?;
        touched += 1;

        update = ChainUpdate {
            child_count: 0,
            sums: update.sums,
            schedule: ScheduleShift::new(contribution_before, node.schedule_contribution()),
        };
        current = node.parent;
    }

    debug!("聚合传播完成，更新了 {} 个祖先任务", touched);
    Ok(touched)
}
