use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tasktree_errors::{TreeError, TreeResult};

use crate::entities::{TaskId, TaskNode, UserId};

pub const MAX_NAME_CHARS: usize = 250;
pub const MAX_DESCRIPTION_CHARS: usize = 1250;

/// 新任务在父任务子链表中的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SiblingPosition {
    /// 成为父任务的第一个子任务
    First,
    /// 紧跟在指定兄弟任务之后
    After(TaskId),
}

impl SiblingPosition {
    pub fn from_previous(previous: Option<TaskId>) -> Self {
        match previous {
            Some(id) => SiblingPosition::After(id),
            None => SiblingPosition::First,
        }
    }

    pub fn previous(&self) -> Option<TaskId> {
        match self {
            SiblingPosition::First => None,
            SiblingPosition::After(id) => Some(*id),
        }
    }
}

/// 移动目标；`parent` 为空表示保持当前父任务，仅调整顺序
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveTarget {
    pub parent: Option<TaskId>,
    pub position: SiblingPosition,
}

impl MoveTarget {
    pub fn under(parent: TaskId, position: SiblingPosition) -> Self {
        Self {
            parent: Some(parent),
            position,
        }
    }

    pub fn reorder(position: SiblingPosition) -> Self {
        Self {
            parent: None,
            position,
        }
    }
}

/// Child record types that report into exactly one own metric of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionKind {
    TimeIncurred,
    CostIncurred,
    FileCount,
    FileSize,
}

/// 可被子记录覆盖的预估字段
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateField {
    TimeEstimate,
    CostEstimate,
}

impl ContributionKind {
    pub fn own_field(&self) -> &'static str {
        match self {
            ContributionKind::TimeIncurred => "time_incurred",
            ContributionKind::CostIncurred => "cost_incurred",
            ContributionKind::FileCount => "file_count",
            ContributionKind::FileSize => "file_size",
        }
    }

    /// 时间记录可以覆盖时间预估，费用记录可以覆盖费用预估，文件没有预估
    pub fn estimate_field(&self) -> Option<EstimateField> {
        match self {
            ContributionKind::TimeIncurred => Some(EstimateField::TimeEstimate),
            ContributionKind::CostIncurred => Some(EstimateField::CostEstimate),
            ContributionKind::FileCount | ContributionKind::FileSize => None,
        }
    }
}

/// 随子记录一起提交的预估调整
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EstimateChange {
    /// 直接设置为新值
    Set(u64),
    /// 在当前值上增减
    Adjust(i64),
}

/// 子记录对任务自身指标的一次贡献
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Contribution {
    pub kind: ContributionKind,
    pub amount: i64,
    pub estimate: Option<EstimateChange>,
}

impl Contribution {
    pub fn new(kind: ContributionKind, amount: i64) -> Self {
        Self {
            kind,
            amount,
            estimate: None,
        }
    }

    /// 子记录创建
    pub fn created(kind: ContributionKind, value: u64) -> TreeResult<Self> {
        Ok(Self::new(kind, to_signed(value)?))
    }

    /// 子记录的数值从 `old` 改为 `new`
    pub fn updated(kind: ContributionKind, old: u64, new: u64) -> TreeResult<Self> {
        Ok(Self::new(kind, to_signed(new)? - to_signed(old)?))
    }

    /// 子记录删除
    pub fn deleted(kind: ContributionKind, value: u64) -> TreeResult<Self> {
        Ok(Self::new(kind, -to_signed(value)?))
    }

    pub fn with_estimate(mut self, estimate: EstimateChange) -> Self {
        self.estimate = Some(estimate);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.amount == 0 && self.estimate.is_none()
    }
}

fn to_signed(value: u64) -> TreeResult<i64> {
    i64::try_from(value).map_err(|_| TreeError::validation_error(format!("数值过大: {value}")))
}

/// 创建任务（或项目根任务）时提供的字段
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewTask {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub created_by: UserId,
    #[serde(default)]
    pub assigned_user: Option<UserId>,
    #[serde(default)]
    pub is_parallel: bool,
    #[serde(default)]
    pub time_estimate: u64,
    #[serde(default)]
    pub cost_estimate: u64,
}

impl NewTask {
    pub fn new<S: Into<String>>(name: S, created_by: UserId) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            created_by,
            assigned_user: None,
            is_parallel: false,
            time_estimate: 0,
            cost_estimate: 0,
        }
    }

    pub fn parallel(mut self, is_parallel: bool) -> Self {
        self.is_parallel = is_parallel;
        self
    }

    pub fn time_estimate(mut self, minutes: u64) -> Self {
        self.time_estimate = minutes;
        self
    }

    pub fn cost_estimate(mut self, cost: u64) -> Self {
        self.cost_estimate = cost;
        self
    }

    pub fn description<S: Into<String>>(mut self, description: S) -> Self {
        self.description = description.into();
        self
    }

    pub fn assigned_to(mut self, user: UserId) -> Self {
        self.assigned_user = Some(user);
        self
    }

    /// 规范化名称与描述，并检查长度限制
    pub fn normalized(mut self) -> TreeResult<Self> {
        self.name = normalize_name(&self.name)?;
        self.description = normalize_description(&self.description)?;
        Ok(self)
    }
}

/// 字段更新；`None` 表示保持不变，`assigned_user: Some(None)` 表示取消指派
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPatch {
    pub name: Option<String>,
    pub description: Option<String>,
    pub assigned_user: Option<Option<UserId>>,
    pub is_parallel: Option<bool>,
    pub time_estimate: Option<u64>,
    pub cost_estimate: Option<u64>,
}

impl TaskPatch {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.assigned_user.is_none()
            && self.is_parallel.is_none()
            && self.time_estimate.is_none()
            && self.cost_estimate.is_none()
    }
}

pub fn normalize_name(name: &str) -> TreeResult<String> {
    let name = name.trim();
    let chars = name.chars().count();
    if chars == 0 || chars > MAX_NAME_CHARS {
        return Err(TreeError::validation_error(format!(
            "任务名称长度必须在 1 到 {MAX_NAME_CHARS} 个字符之间"
        )));
    }
    Ok(name.to_string())
}

pub fn normalize_description(description: &str) -> TreeResult<String> {
    let description = description.trim();
    if description.chars().count() > MAX_DESCRIPTION_CHARS {
        return Err(TreeError::validation_error(format!(
            "任务描述不能超过 {MAX_DESCRIPTION_CHARS} 个字符"
        )));
    }
    Ok(description.to_string())
}

/// 游标分页的一页结果，`more` 表示链表/祖先链尚未走完
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub more: bool,
}

impl<T> Page<T> {
    /// `fetched` 应比 `limit` 多取一条，用来判断是否还有更多
    pub fn from_overfetch(mut fetched: Vec<T>, limit: u32) -> Self {
        let limit = limit as usize;
        let more = fetched.len() > limit;
        fetched.truncate(limit);
        Self {
            items: fetched,
            more,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedTask {
    pub parent: TaskNode,
    pub task: TaskNode,
}

/// 纯重排时 `old_parent` 与 `new_parent` 是同一个任务
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MovedTask {
    pub task: TaskNode,
    pub old_parent: TaskNode,
    pub new_parent: TaskNode,
}

/// 以某个任务为根的整棵子树
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subtree {
    pub root: TaskId,
    pub tasks: HashMap<TaskId, TaskNode>,
}
