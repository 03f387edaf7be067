// ==========================================
// 会员数据导入同步 - 仓储层错误类型
// ==========================================
// 工具: thiserror 派生宏
// 分类: 行级约束错误（唯一 / 非空 / 外键 / CHECK）由路由按行处理
//       其余均视为基础设施错误，中止本次运行
// ==========================================

use thiserror::Error;

/// 仓储层错误类型
#[derive(Error, Debug)]
pub enum RepositoryError {
    // ===== 行级约束错误 =====
    #[error("唯一约束违反: {0}")]
    UniqueViolation(String),

    #[error("约束违反: {0}")]
    ConstraintViolation(String),

    // ===== 数据库错误 =====
    #[error("记录未找到: {entity} with id={id}")]
    NotFound { entity: String, id: String },

    #[error("非法标识符: {0}")]
    InvalidIdentifier(String),

    #[error("数据库锁获取失败: {0}")]
    LockError(String),

    #[error("数据库事务失败: {0}")]
    DatabaseTransactionError(String),

    #[error("数据库查询失败: {0}")]
    DatabaseQueryError(String),

    #[error("序列化失败: {0}")]
    SerializationError(String),

    // ===== 通用错误 =====
    #[error("内部错误: {0}")]
    InternalError(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RepositoryError {
    /// 是否为单行数据导致的错误（不影响后续行）
    pub fn is_row_level(&self) -> bool {
        matches!(
            self,
            RepositoryError::UniqueViolation(_) | RepositoryError::ConstraintViolation(_)
        )
    }

    /// 行错误对外消息（约束错误取数据库原文）
    pub fn row_message(&self) -> String {
        match self {
            RepositoryError::UniqueViolation(msg) | RepositoryError::ConstraintViolation(msg) => {
                msg.clone()
            }
            other => other.to_string(),
        }
    }
}

// 实现 From<rusqlite::Error>
impl From<rusqlite::Error> for RepositoryError {
    fn from(err: rusqlite::Error) -> Self {
        match err {
            rusqlite::Error::SqliteFailure(_, Some(msg)) => {
                if msg.contains("UNIQUE") {
                    RepositoryError::UniqueViolation(msg)
                } else if msg.contains("NOT NULL")
                    || msg.contains("FOREIGN KEY")
                    || msg.contains("CHECK constraint")
                {
                    RepositoryError::ConstraintViolation(msg)
                } else {
                    RepositoryError::DatabaseQueryError(msg)
                }
            }
            rusqlite::Error::SqliteFailure(code, None)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                RepositoryError::ConstraintViolation(code.to_string())
            }
            rusqlite::Error::QueryReturnedNoRows => RepositoryError::NotFound {
                entity: "Unknown".to_string(),
                id: "Unknown".to_string(),
            },
            _ => RepositoryError::DatabaseQueryError(err.to_string()),
        }
    }
}

// 实现 From<serde_json::Error>
impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::SerializationError(err.to_string())
    }
}

/// Result 类型别名
pub type RepositoryResult<T> = Result<T, RepositoryError>;
