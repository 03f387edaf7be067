// ==========================================
// 会员数据导入同步 - 同步运行记录
// ==========================================
// 职责: 单次管道执行的审计日志与对外结果
// 生命周期: 运行开始时创建（started），结束时落定终态
// ==========================================

use crate::domain::types::SyncStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 对外报告的行错误上限
pub const MAX_REPORTED_ERRORS: usize = 50;

/// 行级错误（row 为批次内 1 起始行号）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowError {
    pub row: usize,
    pub message: String,
}

impl RowError {
    pub fn new(row: usize, message: impl Into<String>) -> Self {
        Self {
            row,
            message: message.into(),
        }
    }
}

// ==========================================
// SyncLog - 运行日志（持久化）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncLog {
    pub log_id: String,
    pub data_source_id: String,
    pub status: SyncStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub records_processed: usize,
    pub records_imported: usize,
    pub records_skipped: usize,
    pub records_failed: usize,
    pub errors: Vec<RowError>, // 已截断至上限
    pub error_message: Option<String>,
}

impl SyncLog {
    pub fn started(log_id: String, data_source_id: &str, started_at: DateTime<Utc>) -> Self {
        Self {
            log_id,
            data_source_id: data_source_id.to_string(),
            status: SyncStatus::Started,
            started_at,
            completed_at: None,
            records_processed: 0,
            records_imported: 0,
            records_skipped: 0,
            records_failed: 0,
            errors: Vec::new(),
            error_message: None,
        }
    }
}

// ==========================================
// SyncResult - 单次运行结果（返回调用方）
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SyncResult {
    pub log_id: String,
    pub data_source_id: String,
    pub status: SyncStatus,
    pub records_processed: usize,
    pub records_imported: usize,
    pub records_skipped: usize,
    pub records_failed: usize,
    pub errors: Vec<RowError>,
    pub error_message: Option<String>,
    pub started_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
    pub next_sync_at: Option<DateTime<Utc>>,
}

impl SyncResult {
    pub fn is_success(&self) -> bool {
        self.status == SyncStatus::Success
    }
}

/// 截断错误列表至上限
pub fn cap_errors(mut errors: Vec<RowError>, limit: usize) -> Vec<RowError> {
    errors.truncate(limit);
    errors
}
