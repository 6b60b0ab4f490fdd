//! 子树聚合的纯计算部分
//!
//! 可加字段（预估、实耗、文件数量与大小、后代数量）通过有符号增量沿祖先链传播；
//! `subtree.time_minimum` 取决于每个祖先自身的并行标记，串行祖先按增量调整，
//! 并行祖先需要根据直接子任务重新计算一层。

use std::ops::Neg;

use serde::{Deserialize, Serialize};
use tasktree_errors::{TreeError, TreeResult};

use crate::entities::{OwnMetrics, SubtreeMetrics, TaskNode};

/// 可加聚合字段的有符号增量
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetricSums {
    pub time_estimate: i128,
    pub time_incurred: i128,
    pub cost_estimate: i128,
    pub cost_incurred: i128,
    pub file_count: i128,
    pub file_size: i128,
    pub descendants: i128,
}

impl MetricSums {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::zero()
    }

    /// 自身指标从 `old` 变为 `new` 时对祖先子树字段的增量
    pub fn own_change(old: &OwnMetrics, new: &OwnMetrics) -> Self {
        Self {
            time_estimate: new.time_estimate as i128 - old.time_estimate as i128,
            time_incurred: new.time_incurred as i128 - old.time_incurred as i128,
            cost_estimate: new.cost_estimate as i128 - old.cost_estimate as i128,
            cost_incurred: new.cost_incurred as i128 - old.cost_incurred as i128,
            file_count: new.file_count as i128 - old.file_count as i128,
            file_size: new.file_size as i128 - old.file_size as i128,
            descendants: 0,
        }
    }
}

impl Neg for MetricSums {
    type Output = Self;

    fn neg(self) -> Self {
        Self {
            time_estimate: -self.time_estimate,
            time_incurred: -self.time_incurred,
            cost_estimate: -self.cost_estimate,
            cost_incurred: -self.cost_incurred,
            file_count: -self.file_count,
            file_size: -self.file_size,
            descendants: -self.descendants,
        }
    }
}

/// 某个子任务对父任务关键路径贡献的变化：`before` 为变更前的贡献，`after` 为变更后的贡献。
/// 不存在的子任务贡献为 0。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleShift {
    pub before: u64,
    pub after: u64,
}

impl ScheduleShift {
    pub fn new(before: u64, after: u64) -> Self {
        Self { before, after }
    }

    pub fn is_neutral(&self) -> bool {
        self.before == self.after
    }
}

/// 沿一条祖先链应用的完整变更
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ChainUpdate {
    /// 只作用于链上第一个节点（直接父任务）
    pub child_count: i128,
    pub sums: MetricSums,
    pub schedule: ScheduleShift,
}

impl ChainUpdate {
    /// `child` 作为新的直接子任务挂入
    pub fn attach(child: &TaskNode) -> Self {
        Self {
            child_count: 1,
            sums: child.contribution(),
            schedule: child.schedule_attached(),
        }
    }

    /// `child` 从其直接父任务下摘除
    pub fn detach(child: &TaskNode) -> Self {
        Self {
            child_count: -1,
            sums: -child.contribution(),
            schedule: child.schedule_detached(),
        }
    }

    /// 同一任务的自身指标或子树最短时长发生了变化
    pub fn value_change(before: &TaskNode, after: &TaskNode) -> Self {
        Self {
            child_count: 0,
            sums: MetricSums::own_change(&before.own, &after.own),
            schedule: ScheduleShift::new(
                before.schedule_contribution(),
                after.schedule_contribution(),
            ),
        }
    }

    pub fn is_noop(&self) -> bool {
        self.child_count == 0 && self.sums.is_zero() && self.schedule.is_neutral()
    }
}

/// 将有符号增量加到计数器上，结果为负说明存储状态已被破坏
pub fn apply_delta(value: u64, delta: i128, field: &'static str) -> TreeResult<u64> {
    u64::try_from(value as i128 + delta).map_err(|_| {
        TreeError::internal(format!(
            "聚合字段 {field} 越界: 当前值 {value}, 增量 {delta}"
        ))
    })
}

/// 按父任务的并行标记组合各子任务的关键路径贡献；没有子任务时为 0
pub fn combine_minimum<I>(is_parallel: bool, contributions: I) -> u64
where
    I: IntoIterator<Item = u64>,
{
    let contributions = contributions.into_iter();
    if is_parallel {
        contributions.max().unwrap_or(0)
    } else {
        contributions.fold(0u64, |acc, c| acc.saturating_add(c))
    }
}

/// 串行父任务的最短时长按增量调整
pub fn shift_sequential_minimum(current: u64, shift: ScheduleShift) -> TreeResult<u64> {
    let delta = shift.after as i128 - shift.before as i128;
    apply_delta(current, delta, "subtree_time_minimum")
}

impl SubtreeMetrics {
    /// 应用可加字段的增量（不包括 `time_minimum`）
    pub fn apply_sums(&mut self, sums: &MetricSums) -> TreeResult<()> {
        self.time_estimate =
            apply_delta(self.time_estimate, sums.time_estimate, "subtree_time_estimate")?;
        self.time_incurred =
            apply_delta(self.time_incurred, sums.time_incurred, "subtree_time_incurred")?;
        self.cost_estimate =
            apply_delta(self.cost_estimate, sums.cost_estimate, "subtree_cost_estimate")?;
        self.cost_incurred =
            apply_delta(self.cost_incurred, sums.cost_incurred, "subtree_cost_incurred")?;
        self.file_count = apply_delta(self.file_count, sums.file_count, "subtree_file_count")?;
        self.file_size = apply_delta(self.file_size, sums.file_size, "subtree_file_size")?;
        Ok(())
    }
}

/// 由直接子任务的存储值计算一个任务应有的子树聚合与计数
pub fn expected_aggregates(
    parent: &TaskNode,
    children: &[&TaskNode],
) -> (SubtreeMetrics, u64, u64) {
    let mut subtree = SubtreeMetrics::default();
    let mut descendants = 0u64;
    for child in children {
        subtree.time_estimate = subtree
            .time_estimate
            .saturating_add(child.own.time_estimate)
            .saturating_add(child.subtree.time_estimate);
        subtree.time_incurred = subtree
            .time_incurred
            .saturating_add(child.own.time_incurred)
            .saturating_add(child.subtree.time_incurred);
        subtree.cost_estimate = subtree
            .cost_estimate
            .saturating_add(child.own.cost_estimate)
            .saturating_add(child.subtree.cost_estimate);
        subtree.cost_incurred = subtree
            .cost_incurred
            .saturating_add(child.own.cost_incurred)
            .saturating_add(child.subtree.cost_incurred);
        subtree.file_count = subtree
            .file_count
            .saturating_add(child.own.file_count)
            .saturating_add(child.subtree.file_count);
        subtree.file_size = subtree
            .file_size
            .saturating_add(child.own.file_size)
            .saturating_add(child.subtree.file_size);
        descendants = descendants.saturating_add(1 + child.descendant_count);
    }
    subtree.time_minimum = combine_minimum(
        parent.is_parallel,
        children.iter().map(|c| c.schedule_contribution()),
    );
    (subtree, children.len() as u64, descendants)
}
