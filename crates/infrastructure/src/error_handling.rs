//! 存储层错误分类
//!
//! 锁等待、繁忙、序列化失败与连接池超时都意味着同一棵树正在被并发修改，
//! 统一映射为 `Conflict`，调用方可以整体重试。

use std::fmt;

use tasktree_errors::TreeError;
use tracing::{debug, warn};

/// Operation context for repository operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepositoryOperation {
    Migrate,
    Begin,
    Lock,
    Read,
    Insert,
    Update,
    Delete,
    Commit,
    Rollback,
    CreateTree,
    DeleteTree,
}

impl fmt::Display for RepositoryOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryOperation::Migrate => write!(f, "迁移"),
            RepositoryOperation::Begin => write!(f, "开启事务"),
            RepositoryOperation::Lock => write!(f, "获取树锁"),
            RepositoryOperation::Read => write!(f, "查询"),
            RepositoryOperation::Insert => write!(f, "创建"),
            RepositoryOperation::Update => write!(f, "更新"),
            RepositoryOperation::Delete => write!(f, "删除"),
            RepositoryOperation::Commit => write!(f, "提交事务"),
            RepositoryOperation::Rollback => write!(f, "回滚事务"),
            RepositoryOperation::CreateTree => write!(f, "创建任务树"),
            RepositoryOperation::DeleteTree => write!(f, "删除任务树"),
        }
    }
}

// SQLite: BUSY, BUSY_RECOVERY, BUSY_SNAPSHOT, LOCKED, LOCKED_SHAREDCACHE
// PostgreSQL: serialization_failure, deadlock_detected, lock_not_available
const CONFLICT_CODES: [&str; 8] = ["5", "261", "517", "6", "262", "40001", "40P01", "55P03"];

pub fn is_conflict(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::PoolTimedOut => true,
        sqlx::Error::Database(db) => db
            .code()
            .map(|code| CONFLICT_CODES.contains(&&*code))
            .unwrap_or(false),
        _ => false,
    }
}

pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

pub struct RepositoryErrorHelpers;

impl RepositoryErrorHelpers {
    /// 将sqlx错误转换为领域错误并记录日志
    pub fn database_error(operation: RepositoryOperation, err: sqlx::Error) -> TreeError {
        if is_conflict(&err) {
            debug!("{}时发生并发冲突: {}", operation, err);
            TreeError::conflict(format!("{operation}: {err}"))
        } else {
            warn!("{}时发生数据库错误: {}", operation, err);
            TreeError::Database(err)
        }
    }

    pub fn mapper(operation: RepositoryOperation) -> impl Fn(sqlx::Error) -> TreeError {
        move |err| Self::database_error(operation, err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pool_timeout_is_conflict() {
        let err = RepositoryErrorHelpers::database_error(
            RepositoryOperation::Lock,
            sqlx::Error::PoolTimedOut,
        );
        assert!(matches!(err, TreeError::Conflict(_)));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_other_errors_stay_database_errors() {
        let err = RepositoryErrorHelpers::database_error(
            RepositoryOperation::Read,
            sqlx::Error::RowNotFound,
        );
        assert!(matches!(err, TreeError::Database(_)));
        assert!(err.is_retryable());
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_operation_display() {
        assert_eq!(RepositoryOperation::Lock.to_string(), "获取树锁");
        assert_eq!(RepositoryOperation::DeleteTree.to_string(), "删除任务树");
    }
}
