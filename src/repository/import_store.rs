// ==========================================
// 会员数据导入同步 - 导入存储 Trait
// ==========================================
// 职责: 定义管道所需的数据访问接口（不包含业务逻辑）
// 红线: 存储层不含清洗 / 路由规则，只做数据 CRUD
// ==========================================

use crate::domain::data_source::{DataSource, DataSourceSyncUpdate};
use crate::domain::import_table::{ImportTable, TableColumn};
use crate::domain::sync_log::SyncLog;
use crate::domain::types::DataSourceStatus;
use crate::domain::value::Record;
use crate::repository::error::RepositoryResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

// ==========================================
// ImportStore Trait
// ==========================================
// 实现者: SqliteImportStore（使用 rusqlite）
// 表名 / 列名须为合法标识符，否则返回 InvalidIdentifier
#[async_trait]
pub trait ImportStore: Send + Sync {
    // ===== 行写入与查询 =====

    /// 插入单行
    ///
    /// # 返回
    /// - Err(UniqueViolation / ConstraintViolation): 行级约束错误
    /// - Err(其他): 基础设施错误
    async fn insert_row(&self, table: &str, row: &Record) -> RepositoryResult<()>;

    /// 批量插入（单事务，任一行失败则整批回滚）
    ///
    /// # 返回
    /// - Ok(usize): 写入行数
    async fn insert_rows(&self, table: &str, rows: &[Record]) -> RepositoryResult<usize>;

    /// 按列等值条件查询首条记录（Null 条件匹配 IS NULL）
    async fn find_one(&self, table: &str, criteria: &Record) -> RepositoryResult<Option<Record>>;

    /// 分页读取（按插入顺序）
    async fn query_rows(&self, table: &str, limit: usize, offset: usize)
        -> RepositoryResult<Vec<Record>>;

    async fn count_rows(&self, table: &str) -> RepositoryResult<i64>;

    // ===== 动态表结构 =====

    /// 建表（自动追加 id TEXT 主键与 imported_at 列）
    async fn create_table(&self, table: &str, columns: &[TableColumn]) -> RepositoryResult<()>;

    async fn drop_table(&self, table: &str) -> RepositoryResult<()>;

    /// 清空表
    ///
    /// # 返回
    /// - Ok(usize): 删除行数
    async fn truncate_table(&self, table: &str) -> RepositoryResult<usize>;

    async fn table_exists(&self, table: &str) -> RepositoryResult<bool>;

    /// 列结构（含 id / imported_at）
    async fn table_columns(&self, table: &str) -> RepositoryResult<Vec<TableColumn>>;

    async fn add_column(&self, table: &str, column: &TableColumn) -> RepositoryResult<()>;

    // ===== 导入表注册表 =====

    async fn register_import_table(&self, table: &ImportTable) -> RepositoryResult<()>;

    /// # 返回
    /// - Ok(true): 已删除注册；Ok(false): 未注册
    async fn deregister_import_table(&self, table_name: &str) -> RepositoryResult<bool>;

    async fn get_import_table(&self, table_name: &str) -> RepositoryResult<Option<ImportTable>>;

    async fn list_import_tables(&self) -> RepositoryResult<Vec<ImportTable>>;

    async fn set_import_table_row_count(
        &self,
        table_name: &str,
        row_count: i64,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    // ===== 运行日志 =====

    async fn upsert_sync_log(&self, log: &SyncLog) -> RepositoryResult<()>;

    async fn get_sync_log(&self, log_id: &str) -> RepositoryResult<Option<SyncLog>>;

    /// 按开始时间倒序
    async fn list_sync_logs(&self, data_source_id: &str, limit: usize)
        -> RepositoryResult<Vec<SyncLog>>;

    // ===== 数据源 =====

    async fn upsert_data_source(&self, source: &DataSource) -> RepositoryResult<()>;

    async fn get_data_source(&self, data_source_id: &str) -> RepositoryResult<Option<DataSource>>;

    async fn set_data_source_status(
        &self,
        data_source_id: &str,
        status: DataSourceStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;

    async fn update_data_source_sync(
        &self,
        data_source_id: &str,
        update: &DataSourceSyncUpdate,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()>;
}
