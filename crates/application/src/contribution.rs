//! 任务自身指标的变更：子记录贡献与字段更新

use tasktree_domain::{
    normalize_description, normalize_name, ChainUpdate, Contribution, ContributionKind,
    EstimateChange, EstimateField, TaskId, TaskNode, TaskPatch, TreeTransaction,
};
use tasktree_errors::{TreeError, TreeResult};
use tracing::debug;

use crate::navigator::require;
use crate::reconciler::{propagate, recompute_minimum};

/// 把子记录的增量计入任务自身指标，并把变化传播到祖先
pub async fn contribute(
    tx: &mut dyn TreeTransaction,
    id: TaskId,
    contribution: Contribution,
) -> TreeResult<TaskNode> {
    let mut node = require(tx, id).await?;
    if contribution.is_empty() {
        return Ok(node);
    }
    let before = node.clone();

    let own = own_field_mut(&mut node, contribution.kind);
    *own = shift_own(*own, contribution.amount as i128, contribution.kind.own_field())?;

    if let Some(change) = contribution.estimate {
        let field = contribution.kind.estimate_field().ok_or_else(|| {
            TreeError::validation_error(format!(
                "{} 记录不能覆盖预估",
                contribution.kind.own_field()
            ))
        })?;
        let (estimate, name) = match field {
            EstimateField::TimeEstimate => (&mut node.own.time_estimate, "time_estimate"),
            EstimateField::CostEstimate => (&mut node.own.cost_estimate, "cost_estimate"),
        };
        *estimate = match change {
            EstimateChange::Set(value) => value,
            EstimateChange::Adjust(delta) => shift_own(*estimate, delta as i128, name)?,
        };
    }

    tx.save(&node).await?;
    if let Some(parent_id) = node.parent {
        propagate(tx, parent_id, ChainUpdate::value_change(&before, &node)).await?;
    }

    debug!(
        "{} 贡献已计入{}: {}",
        contribution.kind.own_field(),
        node.entity_description(),
        contribution.amount
    );
    Ok(node)
}

/// 更新任务字段；没有任何实际变化时返回 `NoChange`
pub async fn update(
    tx: &mut dyn TreeTransaction,
    id: TaskId,
    patch: TaskPatch,
) -> TreeResult<TaskNode> {
    if patch.is_empty() {
        return Err(TreeError::NoChange);
    }
    let mut node = require(tx, id).await?;
    let before = node.clone();

    if let Some(name) = patch.name {
        node.name = normalize_name(&name)?;
    }
    if let Some(description) = patch.description {
        node.description = normalize_description(&description)?;
    }
    if let Some(assigned_user) = patch.assigned_user {
        if node.is_root() && assigned_user.is_some() {
            return Err(TreeError::validation_error("项目根任务不能指派用户"));
        }
        node.assigned_user = assigned_user;
    }
    if let Some(is_parallel) = patch.is_parallel {
        node.is_parallel = is_parallel;
    }
    if let Some(time_estimate) = patch.time_estimate {
        node.own.time_estimate = time_estimate;
    }
    if let Some(cost_estimate) = patch.cost_estimate {
        node.own.cost_estimate = cost_estimate;
    }

    if node == before {
        return Err(TreeError::NoChange);
    }
    if node.is_parallel != before.is_parallel {
        node.subtree.time_minimum = recompute_minimum(tx, &node).await?;
    }

    tx.save(&node).await?;
    if let Some(parent_id) = node.parent {
        propagate(tx, parent_id, ChainUpdate::value_change(&before, &node)).await?;
    }

    debug!("已更新{}", node.entity_description());
    Ok(node)
}

fn own_field_mut(node: &mut TaskNode, kind: ContributionKind) -> &mut u64 {
    match kind {
        ContributionKind::TimeIncurred => &mut node.own.time_incurred,
        ContributionKind::CostIncurred => &mut node.own.cost_incurred,
        ContributionKind::FileCount => &mut node.own.file_count,
        ContributionKind::FileSize => &mut node.own.file_size,
    }
}

/// 自身指标不允许为负，越界属于调用方输入错误
fn shift_own(value: u64, delta: i128, field: &str) -> TreeResult<u64> {
    u64::try_from(value as i128 + delta).map_err(|_| {
        TreeError::validation_error(format!(
            "{field} 不能为负: 当前值 {value}, 增量 {delta}"
        ))
    })
}
