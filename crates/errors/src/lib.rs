use thiserror::Error;

#[derive(Debug, Error)]
pub enum TreeError {
    #[error("{entity}未找到: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("无效的移动: {0}")]
    InvalidMove(String),
    #[error("任务 {id} 仍有 {child_count} 个子任务，无法删除")]
    NotEmpty { id: String, child_count: u64 },
    #[error("目标位置与当前位置相同，无需变更")]
    NoChange,
    #[error("并发冲突: {0}")]
    Conflict(String),
    #[error("数据验证失败: {0}")]
    Validation(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("数据库错误: {0}")]
    Database(#[from] sqlx::Error),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type TreeResult<T> = Result<T, TreeError>;

impl TreeError {
    pub fn not_found<I: ToString>(entity: &'static str, id: I) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }
    pub fn task_not_found<I: ToString>(id: I) -> Self {
        Self::not_found("任务", id)
    }
    pub fn project_not_found<I: ToString>(id: I) -> Self {
        Self::not_found("项目", id)
    }
    pub fn invalid_move<S: Into<String>>(msg: S) -> Self {
        Self::InvalidMove(msg.into())
    }
    pub fn not_empty<I: ToString>(id: I, child_count: u64) -> Self {
        Self::NotEmpty {
            id: id.to_string(),
            child_count,
        }
    }
    pub fn conflict<S: Into<String>>(msg: S) -> Self {
        Self::Conflict(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
    pub fn timeout<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }
    pub fn is_fatal(&self) -> bool {
        matches!(self, TreeError::Internal(_) | TreeError::Configuration(_))
    }
    /// 仅存储层的瞬时故障可整体重试，逻辑错误必须直接报告给调用方
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TreeError::Conflict(_) | TreeError::Timeout(_) | TreeError::Database(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            TreeError::NotFound { .. } => "请求的任务不存在",
            TreeError::InvalidMove(_) => "不能将任务移动到自身或其子任务之下",
            TreeError::NotEmpty { .. } => "请先删除该任务的所有子任务",
            TreeError::NoChange => "没有需要变更的内容",
            TreeError::Validation(_) => "输入数据验证失败",
            TreeError::Conflict(_) => "任务树正在被其他操作修改，请重试",
            TreeError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logical_errors_are_not_retryable() {
        assert!(!TreeError::invalid_move("ancestor loop").is_retryable());
        assert!(!TreeError::not_empty("a", 2).is_retryable());
        assert!(!TreeError::task_not_found("a").is_retryable());
        assert!(!TreeError::NoChange.is_retryable());
        assert!(!TreeError::validation_error("name").is_retryable());
    }

    #[test]
    fn test_transient_errors_are_retryable() {
        assert!(TreeError::conflict("busy").is_retryable());
        assert!(TreeError::timeout("3000ms").is_retryable());
        assert!(TreeError::Database(sqlx::Error::PoolTimedOut).is_retryable());
    }

    #[test]
    fn test_sqlx_errors_convert_to_database() {
        fn lookup() -> TreeResult<()> {
            Err::<(), _>(sqlx::Error::RowNotFound)?;
            Ok(())
        }
        let err = lookup().unwrap_err();
        assert!(matches!(err, TreeError::Database(sqlx::Error::RowNotFound)));
        assert_eq!(err.user_message(), "系统繁忙，请稍后重试");
    }

    #[test]
    fn test_messages() {
        let err = TreeError::not_empty("abc", 3);
        assert_eq!(err.to_string(), "任务 abc 仍有 3 个子任务，无法删除");
        assert_eq!(err.user_message(), "请先删除该任务的所有子任务");
        assert_eq!(
            TreeError::project_not_found("p1").to_string(),
            "项目未找到: p1"
        );
        assert!(TreeError::internal("x").is_fatal());
        assert!(!TreeError::NoChange.is_fatal());
    }
}
