// ==========================================
// 会员数据导入同步 - 引擎层
// ==========================================
// 职责: 目标路由 / 导入表管理 / 同步编排 / 定时与重试计算
// 红线: 引擎不拼 SQL，数据访问全部经 ImportStore
// ==========================================

pub mod cron;
pub mod import_table_manager;
pub mod orchestrator;
pub mod router;
pub mod schedule;

// 重导出核心引擎
pub use cron::{CronParseError, CronSchedule};
pub use import_table_manager::{
    sanitize_column_names, BatchInsertAborted, BatchInsertReport, ImportTableManager,
};
pub use orchestrator::{SyncError, SyncOrchestrator, SyncRequest};
pub use router::{DestinationRouter, RouteAborted, RouteContext, RouteOutcome};
pub use schedule::{
    calculate_next_sync_time, calculate_retry_delay, plan_next_run, should_retry,
    validate_schedule_config, NextRunPlan, ScheduleIssue,
};
