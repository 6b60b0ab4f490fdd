//! 任务树存储抽象
//!
//! 所有读写都发生在某棵树的一个事务之内。写事务在开始时先获取该树的排他锁，
//! 事务提交或回滚之前其他写操作无法进入同一棵树。

use async_trait::async_trait;
use tasktree_errors::TreeResult;

use crate::entities::{TaskId, TaskNode, TreeScope};

/// 祖先链/兄弟链递归查询的深度上限，存储损坏形成环时保证查询终止
pub const MAX_TRAVERSAL_DEPTH: u32 = 100_000;

#[async_trait]
pub trait TaskTreeStore: Send + Sync {
    /// 创建表结构，可重复执行
    async fn migrate(&self) -> TreeResult<()>;

    /// 开始写事务并获取树锁，同时推进树的修订号；树不存在时返回 `NotFound`
    async fn begin_write(&self, scope: &TreeScope) -> TreeResult<Box<dyn TreeTransaction>>;

    /// 开始只读事务，不获取树锁
    async fn begin_read(&self, scope: &TreeScope) -> TreeResult<Box<dyn TreeTransaction>>;

    /// 在一个事务中创建树记录及其根任务
    async fn create_tree(&self, root: &TaskNode) -> TreeResult<()>;

    /// 级联删除整棵树，返回是否存在过
    async fn delete_tree(&self, scope: &TreeScope) -> TreeResult<bool>;
}

/// 绑定到单棵树的事务。`commit` 或 `rollback` 之后不能再使用。
#[async_trait]
pub trait TreeTransaction: Send {
    fn scope(&self) -> TreeScope;

    async fn revision(&mut self) -> TreeResult<i64>;

    async fn get(&mut self, id: TaskId) -> TreeResult<Option<TaskNode>>;

    /// 批量查询，不存在的ID被忽略，结果顺序不保证
    async fn get_many(&mut self, ids: &[TaskId]) -> TreeResult<Vec<TaskNode>>;

    async fn exists(&mut self, id: TaskId) -> TreeResult<bool>;

    /// `next_sibling` 指向 `id` 的兄弟任务
    async fn previous_sibling(&mut self, id: TaskId) -> TreeResult<Option<TaskNode>>;

    /// `parent` 为 `id` 的全部任务，不保证链表顺序
    async fn children(&mut self, id: TaskId) -> TreeResult<Vec<TaskNode>>;

    /// 从直接父任务开始向上，最多 `limit` 个
    async fn ancestors(&mut self, id: TaskId, limit: u32) -> TreeResult<Vec<TaskNode>>;

    /// 从 `start` 开始（包含）沿 `next_sibling` 走，最多 `limit` 个
    async fn sibling_chain(&mut self, start: TaskId, limit: u32) -> TreeResult<Vec<TaskNode>>;

    /// `id` 自身及其全部后代
    async fn subtree(&mut self, id: TaskId) -> TreeResult<Vec<TaskNode>>;

    async fn all_nodes(&mut self) -> TreeResult<Vec<TaskNode>>;

    async fn insert(&mut self, node: &TaskNode) -> TreeResult<()>;

    /// 覆盖写入一行的全部可变字段
    async fn save(&mut self, node: &TaskNode) -> TreeResult<()>;

    async fn delete(&mut self, id: TaskId) -> TreeResult<()>;

    async fn commit(&mut self) -> TreeResult<()>;

    async fn rollback(&mut self) -> TreeResult<()>;
}
