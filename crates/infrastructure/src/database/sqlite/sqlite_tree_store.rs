use async_trait::async_trait;
use chrono::Utc;
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool, Transaction};
use tasktree_domain::{
    TaskId, TaskNode, TaskTreeStore, TreeScope, TreeTransaction, MAX_TRAVERSAL_DEPTH,
};
use tasktree_errors::{TreeError, TreeResult};
use tracing::{debug, instrument};

use crate::database::mapping::{bind_record, records_into_nodes, sql, NodeRecord, NODE_COLUMNS};
use crate::error_handling::{is_unique_violation, RepositoryErrorHelpers, RepositoryOperation};

pub struct SqliteTreeStore {
    pool: SqlitePool,
}

impl SqliteTreeStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// 创建嵌入式SQLite任务树存储，自动初始化数据库
    pub async fn new_embedded(database_url: &str) -> TreeResult<Self> {
        use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
        use std::str::FromStr;

        debug!("创建嵌入式SQLite任务树存储: {}", database_url);

        let in_memory = database_url.contains(":memory:");
        let mut connect_options = SqliteConnectOptions::from_str(database_url)?
            .create_if_missing(true)
            .foreign_keys(true);
        if !in_memory {
            connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
        }

        // 内存数据库的每个连接都是独立的库，只能保留一个永不回收的连接
        let pool_options = if in_memory {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(5).min_connections(1)
        };
        let pool = pool_options.connect_with(connect_options).await?;

        let store = Self { pool };
        store.migrate().await?;

        debug!("嵌入式SQLite任务树存储创建成功");
        Ok(store)
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn run_migrations(pool: &SqlitePool) -> TreeResult<()> {
        debug!("运行SQLite数据库迁移");
        let map_err = RepositoryErrorHelpers::mapper(RepositoryOperation::Migrate);

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_trees (
                tenant BLOB NOT NULL,
                project BLOB NOT NULL,
                revision INTEGER NOT NULL DEFAULT 0,
                created_on TEXT NOT NULL,
                PRIMARY KEY (tenant, project)
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(&map_err)?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS task_nodes (
                tenant BLOB NOT NULL,
                project BLOB NOT NULL,
                id BLOB NOT NULL,
                parent BLOB,
                first_child BLOB,
                next_sibling BLOB,
                assigned_user BLOB,
                name TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_by BLOB NOT NULL,
                created_on TEXT NOT NULL,
                is_parallel INTEGER NOT NULL DEFAULT 0,
                time_estimate INTEGER NOT NULL DEFAULT 0,
                time_incurred INTEGER NOT NULL DEFAULT 0,
                cost_estimate INTEGER NOT NULL DEFAULT 0,
                cost_incurred INTEGER NOT NULL DEFAULT 0,
                file_count INTEGER NOT NULL DEFAULT 0,
                file_size INTEGER NOT NULL DEFAULT 0,
                subtree_time_minimum INTEGER NOT NULL DEFAULT 0,
                subtree_time_estimate INTEGER NOT NULL DEFAULT 0,
                subtree_time_incurred INTEGER NOT NULL DEFAULT 0,
                subtree_cost_estimate INTEGER NOT NULL DEFAULT 0,
                subtree_cost_incurred INTEGER NOT NULL DEFAULT 0,
                subtree_file_count INTEGER NOT NULL DEFAULT 0,
                subtree_file_size INTEGER NOT NULL DEFAULT 0,
                child_count INTEGER NOT NULL DEFAULT 0,
                descendant_count INTEGER NOT NULL DEFAULT 0,
                PRIMARY KEY (tenant, project, id),
                FOREIGN KEY (tenant, project) REFERENCES task_trees(tenant, project) ON DELETE CASCADE
            )
            "#,
        )
        .execute(pool)
        .await
        .map_err(&map_err)?;

        let indexes = [
            "CREATE INDEX IF NOT EXISTS idx_task_nodes_parent ON task_nodes(tenant, project, parent)",
            "CREATE INDEX IF NOT EXISTS idx_task_nodes_next_sibling ON task_nodes(tenant, project, next_sibling)",
        ];
        for index_sql in indexes {
            sqlx::query(index_sql)
                .execute(pool)
                .await
                .map_err(&map_err)?;
        }

        debug!("SQLite数据库迁移完成");
        Ok(())
    }

    async fn begin(&self, scope: &TreeScope) -> TreeResult<SqliteTreeTransaction> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Begin))?;
        Ok(SqliteTreeTransaction {
            scope: *scope,
            tx: Some(tx),
        })
    }
}

#[async_trait]
impl TaskTreeStore for SqliteTreeStore {
    async fn migrate(&self) -> TreeResult<()> {
        Self::run_migrations(&self.pool).await
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn begin_write(&self, scope: &TreeScope) -> TreeResult<Box<dyn TreeTransaction>> {
        let mut tx = self.begin(scope).await?;
        // 第一条语句即为写操作，SQLite 会立即获取写锁
        let result = sqlx::query(sql::LOCK_TREE)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .execute(tx.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Lock))?;
        if result.rows_affected() == 0 {
            tx.rollback().await?;
            return Err(TreeError::project_not_found(scope.project));
        }
        debug!("已获取任务树写锁");
        Ok(Box::new(tx))
    }

    async fn begin_read(&self, scope: &TreeScope) -> TreeResult<Box<dyn TreeTransaction>> {
        Ok(Box::new(self.begin(scope).await?))
    }

    #[instrument(skip(self, root), fields(project = %root.project))]
    async fn create_tree(&self, root: &TaskNode) -> TreeResult<()> {
        let mut tx = self.begin(&root.scope()).await?;
        let inserted = sqlx::query(sql::INSERT_TREE)
            .bind(root.tenant.0)
            .bind(root.project.0)
            .bind(Utc::now())
            .execute(tx.conn()?)
            .await;
        if let Err(err) = inserted {
            tx.rollback().await?;
            if is_unique_violation(&err) {
                return Err(TreeError::validation_error(format!(
                    "项目已存在: {}",
                    root.project
                )));
            }
            return Err(RepositoryErrorHelpers::database_error(
                RepositoryOperation::CreateTree,
                err,
            ));
        }
        tx.insert(root).await?;
        tx.commit().await?;
        debug!("任务树创建成功: {}", root.entity_description());
        Ok(())
    }

    #[instrument(skip(self), fields(scope = %scope))]
    async fn delete_tree(&self, scope: &TreeScope) -> TreeResult<bool> {
        let mut tx = self.begin(scope).await?;
        let map_err = RepositoryErrorHelpers::mapper(RepositoryOperation::DeleteTree);
        // 与写事务相同，先锁树行再动任务行
        let locked = sqlx::query(sql::LOCK_TREE)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .execute(tx.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Lock))?;
        if locked.rows_affected() == 0 {
            tx.rollback().await?;
            return Ok(false);
        }
        let nodes = sqlx::query(sql::DELETE_TREE_NODES)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .execute(tx.conn()?)
            .await
            .map_err(&map_err)?;
        let trees = sqlx::query(sql::DELETE_TREE)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .execute(tx.conn()?)
            .await
            .map_err(&map_err)?;
        tx.commit().await?;
        debug!("删除任务树: {} 个任务", nodes.rows_affected());
        Ok(trees.rows_affected() > 0)
    }
}

pub struct SqliteTreeTransaction {
    scope: TreeScope,
    tx: Option<Transaction<'static, Sqlite>>,
}

impl SqliteTreeTransaction {
    fn conn(&mut self) -> TreeResult<&mut SqliteConnection> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| TreeError::internal("事务已结束"))
    }

    async fn fetch_nodes(
        &mut self,
        statement: &'static str,
        id: TaskId,
        extra: Option<i64>,
    ) -> TreeResult<Vec<TaskNode>> {
        let scope = self.scope;
        let mut query = sqlx::query_as::<_, NodeRecord>(statement)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .bind(id.0);
        if let Some(extra) = extra {
            query = query.bind(extra);
        }
        let records = query
            .fetch_all(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Read))?;
        records_into_nodes(records)
    }

    async fn fetch_one(
        &mut self,
        statement: &'static str,
        id: TaskId,
    ) -> TreeResult<Option<TaskNode>> {
        let scope = self.scope;
        let record = sqlx::query_as::<_, NodeRecord>(statement)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .bind(id.0)
            .fetch_optional(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Read))?;
        record.map(NodeRecord::into_node).transpose()
    }
}

#[async_trait]
impl TreeTransaction for SqliteTreeTransaction {
    fn scope(&self) -> TreeScope {
        self.scope
    }

    async fn revision(&mut self) -> TreeResult<i64> {
        let scope = self.scope;
        let row = sqlx::query(sql::TREE_REVISION)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .fetch_optional(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Read))?;
        match row {
            Some(row) => Ok(row.try_get("revision")?),
            None => Err(TreeError::project_not_found(scope.project)),
        }
    }

    async fn get(&mut self, id: TaskId) -> TreeResult<Option<TaskNode>> {
        self.fetch_one(sql::SELECT_NODE, id).await
    }

    async fn get_many(&mut self, ids: &[TaskId]) -> TreeResult<Vec<TaskNode>> {
        if ids.is_empty() {
            return Ok(vec![]);
        }
        let scope = self.scope;
        let placeholders: Vec<String> = (3..ids.len() + 3).map(|i| format!("${i}")).collect();
        let statement = format!(
            "SELECT {NODE_COLUMNS} FROM task_nodes WHERE tenant = $1 AND project = $2 AND id IN ({})",
            placeholders.join(", ")
        );
        let mut query = sqlx::query_as::<_, NodeRecord>(&statement)
            .bind(scope.tenant.0)
            .bind(scope.project.0);
        for id in ids {
            query = query.bind(id.0);
        }
        let records = query
            .fetch_all(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Read))?;
        records_into_nodes(records)
    }

    async fn exists(&mut self, id: TaskId) -> TreeResult<bool> {
        let scope = self.scope;
        let row = sqlx::query(sql::NODE_EXISTS)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .bind(id.0)
            .fetch_optional(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Read))?;
        Ok(row.is_some())
    }

    async fn previous_sibling(&mut self, id: TaskId) -> TreeResult<Option<TaskNode>> {
        self.fetch_one(sql::SELECT_PREVIOUS_SIBLING, id).await
    }

    async fn children(&mut self, id: TaskId) -> TreeResult<Vec<TaskNode>> {
        self.fetch_nodes(sql::SELECT_CHILDREN, id, None).await
    }

    async fn ancestors(&mut self, id: TaskId, limit: u32) -> TreeResult<Vec<TaskNode>> {
        self.fetch_nodes(sql::SELECT_ANCESTORS, id, Some(limit as i64))
            .await
    }

    async fn sibling_chain(&mut self, start: TaskId, limit: u32) -> TreeResult<Vec<TaskNode>> {
        self.fetch_nodes(sql::SELECT_SIBLING_CHAIN, start, Some(limit as i64))
            .await
    }

    async fn subtree(&mut self, id: TaskId) -> TreeResult<Vec<TaskNode>> {
        self.fetch_nodes(sql::SELECT_SUBTREE, id, Some(MAX_TRAVERSAL_DEPTH as i64))
            .await
    }

    async fn all_nodes(&mut self) -> TreeResult<Vec<TaskNode>> {
        let scope = self.scope;
        let records = sqlx::query_as::<_, NodeRecord>(sql::SELECT_ALL_NODES)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .fetch_all(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Read))?;
        records_into_nodes(records)
    }

    async fn insert(&mut self, node: &TaskNode) -> TreeResult<()> {
        let record = NodeRecord::from_node(node)?;
        bind_record!(sqlx::query(sql::INSERT_NODE), record)
            .execute(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Insert))?;
        Ok(())
    }

    async fn save(&mut self, node: &TaskNode) -> TreeResult<()> {
        let record = NodeRecord::from_node(node)?;
        let result = bind_record!(sqlx::query(sql::UPDATE_NODE), record)
            .execute(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Update))?;
        if result.rows_affected() == 0 {
            return Err(TreeError::task_not_found(node.id));
        }
        Ok(())
    }

    async fn delete(&mut self, id: TaskId) -> TreeResult<()> {
        let scope = self.scope;
        let result = sqlx::query(sql::DELETE_NODE)
            .bind(scope.tenant.0)
            .bind(scope.project.0)
            .bind(id.0)
            .execute(self.conn()?)
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Delete))?;
        if result.rows_affected() == 0 {
            return Err(TreeError::task_not_found(id));
        }
        Ok(())
    }

    async fn commit(&mut self) -> TreeResult<()> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| TreeError::internal("事务已结束"))?;
        tx.commit()
            .await
            .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Commit))
    }

    async fn rollback(&mut self) -> TreeResult<()> {
        match self.tx.take() {
            Some(tx) => tx
                .rollback()
                .await
                .map_err(RepositoryErrorHelpers::mapper(RepositoryOperation::Rollback)),
            None => Ok(()),
        }
    }
}
