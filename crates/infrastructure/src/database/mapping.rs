//! 任务行与领域实体之间的映射，以及两种数据库共用的SQL
//!
//! SQLite 与 PostgreSQL 使用相同的列名和相同的 `$N` 占位符，
//! 只有建表语句与批量查询的写法不同。

use chrono::{DateTime, Utc};
use tasktree_domain::{OwnMetrics, SubtreeMetrics, TaskId, TaskNode, TenantId, UserId};
use tasktree_errors::{TreeError, TreeResult};
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct NodeRecord {
    pub tenant: Uuid,
    pub project: Uuid,
    pub id: Uuid,
    pub parent: Option<Uuid>,
    pub first_child: Option<Uuid>,
    pub next_sibling: Option<Uuid>,
    pub assigned_user: Option<Uuid>,
    pub name: String,
    pub description: String,
    pub created_by: Uuid,
    pub created_on: DateTime<Utc>,
    pub is_parallel: bool,
    pub time_estimate: i64,
    pub time_incurred: i64,
    pub cost_estimate: i64,
    pub cost_incurred: i64,
    pub file_count: i64,
    pub file_size: i64,
    pub subtree_time_minimum: i64,
    pub subtree_time_estimate: i64,
    pub subtree_time_incurred: i64,
    pub subtree_cost_estimate: i64,
    pub subtree_cost_incurred: i64,
    pub subtree_file_count: i64,
    pub subtree_file_size: i64,
    pub child_count: i64,
    pub descendant_count: i64,
}

fn to_column(value: u64, column: &'static str) -> TreeResult<i64> {
    i64::try_from(value)
        .map_err(|_| TreeError::validation_error(format!("{column} 超出可存储范围: {value}")))
}

fn from_column(value: i64, column: &'static str) -> TreeResult<u64> {
    u64::try_from(value)
        .map_err(|_| TreeError::internal(format!("数据库中 {column} 为负数: {value}")))
}

impl NodeRecord {
    pub fn from_node(node: &TaskNode) -> TreeResult<Self> {
        Ok(Self {
            tenant: node.tenant.0,
            project: node.project.0,
            id: node.id.0,
            parent: node.parent.map(|id| id.0),
            first_child: node.first_child.map(|id| id.0),
            next_sibling: node.next_sibling.map(|id| id.0),
            assigned_user: node.assigned_user.map(|id| id.0),
            name: node.name.clone(),
            description: node.description.clone(),
            created_by: node.created_by.0,
            created_on: node.created_on,
            is_parallel: node.is_parallel,
            time_estimate: to_column(node.own.time_estimate, "time_estimate")?,
            time_incurred: to_column(node.own.time_incurred, "time_incurred")?,
            cost_estimate: to_column(node.own.cost_estimate, "cost_estimate")?,
            cost_incurred: to_column(node.own.cost_incurred, "cost_incurred")?,
            file_count: to_column(node.own.file_count, "file_count")?,
            file_size: to_column(node.own.file_size, "file_size")?,
            subtree_time_minimum: to_column(node.subtree.time_minimum, "subtree_time_minimum")?,
            subtree_time_estimate: to_column(node.subtree.time_estimate, "subtree_time_estimate")?,
            subtree_time_incurred: to_column(node.subtree.time_incurred, "subtree_time_incurred")?,
            subtree_cost_estimate: to_column(node.subtree.cost_estimate, "subtree_cost_estimate")?,
            subtree_cost_incurred: to_column(node.subtree.cost_incurred, "subtree_cost_incurred")?,
            subtree_file_count: to_column(node.subtree.file_count, "subtree_file_count")?,
            subtree_file_size: to_column(node.subtree.file_size, "subtree_file_size")?,
            child_count: to_column(node.child_count, "child_count")?,
            descendant_count: to_column(node.descendant_count, "descendant_count")?,
        })
    }

    pub fn into_node(self) -> TreeResult<TaskNode> {
        Ok(TaskNode {
            id: TaskId(self.id),
            tenant: TenantId(self.tenant),
            project: TaskId(self.project),
            parent: self.parent.map(TaskId),
            first_child: self.first_child.map(TaskId),
            next_sibling: self.next_sibling.map(TaskId),
            name: self.name,
            description: self.description,
            created_by: UserId(self.created_by),
            created_on: self.created_on,
            assigned_user: self.assigned_user.map(UserId),
            is_parallel: self.is_parallel,
            own: OwnMetrics {
                time_estimate: from_column(self.time_estimate, "time_estimate")?,
                time_incurred: from_column(self.time_incurred, "time_incurred")?,
                cost_estimate: from_column(self.cost_estimate, "cost_estimate")?,
                cost_incurred: from_column(self.cost_incurred, "cost_incurred")?,
                file_count: from_column(self.file_count, "file_count")?,
                file_size: from_column(self.file_size, "file_size")?,
            },
            subtree: SubtreeMetrics {
                time_minimum: from_column(self.subtree_time_minimum, "subtree_time_minimum")?,
                time_estimate: from_column(self.subtree_time_estimate, "subtree_time_estimate")?,
                time_incurred: from_column(self.subtree_time_incurred, "subtree_time_incurred")?,
                cost_estimate: from_column(self.subtree_cost_estimate, "subtree_cost_estimate")?,
                cost_incurred: from_column(self.subtree_cost_incurred, "subtree_cost_incurred")?,
                file_count: from_column(self.subtree_file_count, "subtree_file_count")?,
                file_size: from_column(self.subtree_file_size, "subtree_file_size")?,
            },
            child_count: from_column(self.child_count, "child_count")?,
            descendant_count: from_column(self.descendant_count, "descendant_count")?,
        })
    }
}

pub fn records_into_nodes(records: Vec<NodeRecord>) -> TreeResult<Vec<TaskNode>> {
    records.into_iter().map(NodeRecord::into_node).collect()
}

/// 按 `NODE_COLUMNS` 的顺序绑定一条记录的全部列（$1..$27）
macro_rules! bind_record {
    ($query:expr, $record:expr) => {{
        let r = $record;
        $query
            .bind(r.tenant)
            .bind(r.project)
            .bind(r.id)
            .bind(r.parent)
            .bind(r.first_child)
            .bind(r.next_sibling)
            .bind(r.assigned_user)
            .bind(r.name)
            .bind(r.description)
            .bind(r.created_by)
            .bind(r.created_on)
            .bind(r.is_parallel)
            .bind(r.time_estimate)
            .bind(r.time_incurred)
            .bind(r.cost_estimate)
            .bind(r.cost_incurred)
            .bind(r.file_count)
            .bind(r.file_size)
            .bind(r.subtree_time_minimum)
            .bind(r.subtree_time_estimate)
            .bind(r.subtree_time_incurred)
            .bind(r.subtree_cost_estimate)
            .bind(r.subtree_cost_incurred)
            .bind(r.subtree_file_count)
            .bind(r.subtree_file_size)
            .bind(r.child_count)
            .bind(r.descendant_count)
    }};
}
pub(crate) use bind_record;

macro_rules! node_columns {
    ($p:literal) => {
        concat!(
            $p, "tenant, ", $p, "project, ", $p, "id, ", $p, "parent, ", $p, "first_child, ",
            $p, "next_sibling, ", $p, "assigned_user, ", $p, "name, ", $p, "description, ",
            $p, "created_by, ", $p, "created_on, ", $p, "is_parallel, ",
            $p, "time_estimate, ", $p, "time_incurred, ", $p, "cost_estimate, ",
            $p, "cost_incurred, ", $p, "file_count, ", $p, "file_size, ",
            $p, "subtree_time_minimum, ", $p, "subtree_time_estimate, ",
            $p, "subtree_time_incurred, ", $p, "subtree_cost_estimate, ",
            $p, "subtree_cost_incurred, ", $p, "subtree_file_count, ",
            $p, "subtree_file_size, ", $p, "child_count, ", $p, "descendant_count"
        )
    };
}

pub const NODE_COLUMNS: &str = node_columns!("");

/// 两种数据库通用的语句，`$1`/`$2` 始终是 tenant/project
pub mod sql {
    pub const LOCK_TREE: &str =
        "UPDATE task_trees SET revision = revision + 1 WHERE tenant = $1 AND project = $2";

    pub const TREE_REVISION: &str =
        "SELECT revision FROM task_trees WHERE tenant = $1 AND project = $2";

    pub const INSERT_TREE: &str =
        "INSERT INTO task_trees (tenant, project, revision, created_on) VALUES ($1, $2, 0, $3)";

    pub const DELETE_TREE_NODES: &str =
        "DELETE FROM task_nodes WHERE tenant = $1 AND project = $2";

    pub const DELETE_TREE: &str = "DELETE FROM task_trees WHERE tenant = $1 AND project = $2";

    pub const SELECT_NODE: &str = concat!(
        "SELECT ", node_columns!(""),
        " FROM task_nodes WHERE tenant = $1 AND project = $2 AND id = $3"
    );

    pub const NODE_EXISTS: &str =
        "SELECT 1 FROM task_nodes WHERE tenant = $1 AND project = $2 AND id = $3";

    pub const SELECT_PREVIOUS_SIBLING: &str = concat!(
        "SELECT ", node_columns!(""),
        " FROM task_nodes WHERE tenant = $1 AND project = $2 AND next_sibling = $3"
    );

    pub const SELECT_CHILDREN: &str = concat!(
        "SELECT ", node_columns!(""),
        " FROM task_nodes WHERE tenant = $1 AND project = $2 AND parent = $3"
    );

    pub const SELECT_ALL_NODES: &str = concat!(
        "SELECT ", node_columns!(""),
        " FROM task_nodes WHERE tenant = $1 AND project = $2"
    );

    /// 从直接父任务向上，$4 为最大深度
    pub const SELECT_ANCESTORS: &str = concat!(
        "WITH RECURSIVE chain (id, parent, depth) AS (",
        " SELECT id, parent, CAST(0 AS BIGINT) FROM task_nodes",
        " WHERE tenant = $1 AND project = $2 AND id = $3",
        " UNION ALL",
        " SELECT n.id, n.parent, c.depth + 1 FROM task_nodes n JOIN chain c ON n.id = c.parent",
        " WHERE n.tenant = $1 AND n.project = $2 AND c.depth < $4",
        ") SELECT ", node_columns!("t."),
        " FROM chain c JOIN task_nodes t ON t.tenant = $1 AND t.project = $2 AND t.id = c.id",
        " WHERE c.depth > 0 ORDER BY c.depth"
    );

    /// 从 $3 开始（包含）沿 next_sibling 走，$4 为最多返回的数量
    pub const SELECT_SIBLING_CHAIN: &str = concat!(
        "WITH RECURSIVE chain (id, next_sibling, depth) AS (",
        " SELECT id, next_sibling, CAST(1 AS BIGINT) FROM task_nodes",
        " WHERE tenant = $1 AND project = $2 AND id = $3",
        " UNION ALL",
        " SELECT n.id, n.next_sibling, c.depth + 1 FROM task_nodes n JOIN chain c ON n.id = c.next_sibling",
        " WHERE n.tenant = $1 AND n.project = $2 AND c.depth < $4",
        ") SELECT ", node_columns!("t."),
        " FROM chain c JOIN task_nodes t ON t.tenant = $1 AND t.project = $2 AND t.id = c.id",
        " ORDER BY c.depth"
    );

    /// $3 自身及其全部后代，$4 为最大深度
    pub const SELECT_SUBTREE: &str = concat!(
        "WITH RECURSIVE sub (id, depth) AS (",
        " SELECT id, CAST(0 AS BIGINT) FROM task_nodes",
        " WHERE tenant = $1 AND project = $2 AND id = $3",
        " UNION ALL",
        " SELECT n.id, s.depth + 1 FROM task_nodes n JOIN sub s ON n.parent = s.id",
        " WHERE n.tenant = $1 AND n.project = $2 AND s.depth < $4",
        ") SELECT ", node_columns!("t."),
        " FROM sub s JOIN task_nodes t ON t.tenant = $1 AND t.project = $2 AND t.id = s.id",
        " ORDER BY s.depth"
    );

    pub const INSERT_NODE: &str = concat!(
        "INSERT INTO task_nodes (", node_columns!(""), ") VALUES (",
        "$1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16, $17, $18, ",
        "$19, $20, $21, $22, $23, $24, $25, $26, $27)"
    );

    pub const UPDATE_NODE: &str = concat!(
        "UPDATE task_nodes SET parent = $4, first_child = $5, next_sibling = $6, ",
        "assigned_user = $7, name = $8, description = $9, created_by = $10, created_on = $11, ",
        "is_parallel = $12, time_estimate = $13, time_incurred = $14, cost_estimate = $15, ",
        "cost_incurred = $16, file_count = $17, file_size = $18, subtree_time_minimum = $19, ",
        "subtree_time_estimate = $20, subtree_time_incurred = $21, subtree_cost_estimate = $22, ",
        "subtree_cost_incurred = $23, subtree_file_count = $24, subtree_file_size = $25, ",
        "child_count = $26, descendant_count = $27 ",
        "WHERE tenant = $1 AND project = $2 AND id = $3"
    );

    pub const DELETE_NODE: &str =
        "DELETE FROM task_nodes WHERE tenant = $1 AND project = $2 AND id = $3";
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> TaskNode {
        TaskNode {
            id: TaskId::new(),
            tenant: TenantId::new(),
            project: TaskId::new(),
            parent: Some(TaskId::new()),
            first_child: None,
            next_sibling: Some(TaskId::new()),
            name: "编写文档".to_string(),
            description: "d".to_string(),
            created_by: UserId::new(),
            created_on: Utc::now(),
            assigned_user: None,
            is_parallel: true,
            own: OwnMetrics {
                time_estimate: 90,
                file_size: 4096,
                ..Default::default()
            },
            subtree: SubtreeMetrics {
                time_minimum: 30,
                ..Default::default()
            },
            child_count: 2,
            descendant_count: 5,
        }
    }

    #[test]
    fn test_record_preserves_every_field() {
        let node = sample();
        let back = NodeRecord::from_node(&node).unwrap().into_node().unwrap();
        assert_eq!(back, node);
    }

    #[test]
    fn test_out_of_range_counters_are_rejected() {
        let mut node = sample();
        node.own.file_size = u64::MAX;
        assert!(matches!(
            NodeRecord::from_node(&node),
            Err(TreeError::Validation(_))
        ));

        let mut record = NodeRecord::from_node(&sample()).unwrap();
        record.child_count = -1;
        assert!(matches!(record.into_node(), Err(TreeError::Internal(_))));
    }

    #[test]
    fn test_shared_statements_list_every_column() {
        assert_eq!(NODE_COLUMNS.split(", ").count(), 27);
        assert!(sql::SELECT_ANCESTORS.contains("t.descendant_count FROM chain c"));
        assert!(sql::INSERT_NODE.ends_with("$27)"));
    }
}
