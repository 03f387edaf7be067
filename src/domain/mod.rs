// ==========================================
// 会员数据导入同步 - 领域层
// ==========================================
// 职责: 实体与值类型定义，不含 IO
// ==========================================

pub mod column;
pub mod data_source;
pub mod import_table;
pub mod mapping;
pub mod rule;
pub mod schedule;
pub mod sync_log;
pub mod types;
pub mod value;

// 重导出核心类型
pub use column::{
    ColumnConfiguration, ColumnPreview, ColumnSetting, FilterAction, FilterOperator, RowFilter,
};
pub use data_source::{DataSource, DataSourceSyncUpdate};
pub use import_table::{BatchProgress, ImportTable, RowPage, TableColumn};
pub use mapping::{destination_fields, DestinationField, FieldMapping};
pub use rule::{CleaningRule, OnInvalid};
pub use schedule::{Frequency, ScheduleConfiguration};
pub use sync_log::{RowError, SyncLog, SyncResult, MAX_REPORTED_ERRORS};
pub use types::{
    ColumnType, DataSourceStatus, DestinationType, DuplicateHandling, SyncPhase, SyncStatus,
};
pub use value::{record_from, CellValue, Record};
