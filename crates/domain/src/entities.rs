use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::aggregation::{MetricSums, ScheduleShift};

macro_rules! uuid_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(s).map(Self)
            }
        }
    };
}

uuid_newtype!(
    /// 任务ID，项目根任务的ID同时也是项目ID
    TaskId
);
uuid_newtype!(
    /// 租户ID
    TenantId
);
uuid_newtype!(UserId);

/// 一棵任务树的寻址范围，所有读写都限定在单个 (tenant, project) 之内
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TreeScope {
    pub tenant: TenantId,
    pub project: TaskId,
}

impl TreeScope {
    pub fn new(tenant: TenantId, project: TaskId) -> Self {
        Self { tenant, project }
    }

    pub fn root_id(&self) -> TaskId {
        self.project
    }
}

impl fmt::Display for TreeScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.tenant, self.project)
    }
}

/// Metrics attributable to a single task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnMetrics {
    pub time_estimate: u64,
    pub time_incurred: u64,
    pub cost_estimate: u64,
    pub cost_incurred: u64,
    pub file_count: u64,
    pub file_size: u64,
}

/// Aggregates over all proper descendants of a task, excluding the task itself.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubtreeMetrics {
    /// 按并行/串行规则组合的关键路径时长
    pub time_minimum: u64,
    pub time_estimate: u64,
    pub time_incurred: u64,
    pub cost_estimate: u64,
    pub cost_incurred: u64,
    pub file_count: u64,
    pub file_size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskNode {
    pub id: TaskId,
    pub tenant: TenantId,
    pub project: TaskId,
    pub parent: Option<TaskId>,
    pub first_child: Option<TaskId>,
    pub next_sibling: Option<TaskId>,
    pub name: String,
    pub description: String,
    pub created_by: UserId,
    pub created_on: DateTime<Utc>,
    pub assigned_user: Option<UserId>,
    /// 决定该任务的 *子任务* 在排期上如何组合
    pub is_parallel: bool,
    pub own: OwnMetrics,
    pub subtree: SubtreeMetrics,
    pub child_count: u64,
    pub descendant_count: u64,
}

impl TaskNode {
    pub fn scope(&self) -> TreeScope {
        TreeScope::new(self.tenant, self.project)
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn is_leaf(&self) -> bool {
        self.child_count == 0
    }

    /// 该任务连同其整棵子树对父任务可加聚合字段的贡献
    pub fn contribution(&self) -> MetricSums {
        MetricSums {
            time_estimate: self.own.time_estimate as i128 + self.subtree.time_estimate as i128,
            time_incurred: self.own.time_incurred as i128 + self.subtree.time_incurred as i128,
            cost_estimate: self.own.cost_estimate as i128 + self.subtree.cost_estimate as i128,
            cost_incurred: self.own.cost_incurred as i128 + self.subtree.cost_incurred as i128,
            file_count: self.own.file_count as i128 + self.subtree.file_count as i128,
            file_size: self.own.file_size as i128 + self.subtree.file_size as i128,
            descendants: 1 + self.descendant_count as i128,
        }
    }

    /// 该任务对父任务关键路径的贡献：自身预估加上子树最短时长
    pub fn schedule_contribution(&self) -> u64 {
        self.own
            .time_estimate
            .saturating_add(self.subtree.time_minimum)
    }

    pub fn schedule_attached(&self) -> ScheduleShift {
        ScheduleShift::new(0, self.schedule_contribution())
    }

    pub fn schedule_detached(&self) -> ScheduleShift {
        ScheduleShift::new(self.schedule_contribution(), 0)
    }

    pub fn entity_description(&self) -> String {
        format!("任务 '{}' (ID: {})", self.name, self.id)
    }
}
