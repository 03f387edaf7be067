// ==========================================
// 会员数据导入同步 - 领域类型定义
// ==========================================
// 序列化格式: snake_case（与存储 JSON / 数据库一致）
// ==========================================

use serde::{Deserialize, Serialize};
use std::fmt;

// ==========================================
// 列语义类型 (Column Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Email,
    Url,
    Phone,
    Boolean,
    Integer,
    Number,
    Date,
    Text,
}

impl ColumnType {
    /// 动态建表时的 SQLite 列类型
    pub fn sql_type(&self) -> &'static str {
        match self {
            ColumnType::Integer | ColumnType::Boolean => "INTEGER",
            ColumnType::Number => "REAL",
            ColumnType::Email
            | ColumnType::Url
            | ColumnType::Phone
            | ColumnType::Date
            | ColumnType::Text => "TEXT",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ColumnType::Email => "email",
            ColumnType::Url => "url",
            ColumnType::Phone => "phone",
            ColumnType::Boolean => "boolean",
            ColumnType::Integer => "integer",
            ColumnType::Number => "number",
            ColumnType::Date => "date",
            ColumnType::Text => "text",
        }
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 目标表类型 (Destination Type)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationType {
    Members,
    Transactions,
    Visits,
    Custom,
}

impl DestinationType {
    /// 固定目标表名（custom 由导入表管理器生成）
    pub fn fixed_table(&self) -> Option<&'static str> {
        match self {
            DestinationType::Members => Some("members"),
            DestinationType::Transactions => Some("transactions"),
            DestinationType::Visits => Some("visits"),
            DestinationType::Custom => None,
        }
    }
}

impl fmt::Display for DestinationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DestinationType::Members => write!(f, "members"),
            DestinationType::Transactions => write!(f, "transactions"),
            DestinationType::Visits => write!(f, "visits"),
            DestinationType::Custom => write!(f, "custom"),
        }
    }
}

// ==========================================
// 重复处理策略 (Duplicate Handling)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DuplicateHandling {
    #[default]
    KeepAll,
    KeepFirst,
    KeepLast,
    SkipAll,
}

// ==========================================
// 同步运行状态 (Sync Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStatus {
    Started,
    Success,
    Partial,
    Failed,
}

impl SyncStatus {
    /// 由导入数与错误数判定终态
    pub fn from_counts(imported: usize, error_count: usize) -> Self {
        match (imported, error_count) {
            (0, _) => SyncStatus::Failed,
            (_, 0) => SyncStatus::Success,
            _ => SyncStatus::Partial,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStatus::Started => "started",
            SyncStatus::Success => "success",
            SyncStatus::Partial => "partial",
            SyncStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "started" => SyncStatus::Started,
            "success" => SyncStatus::Success,
            "partial" => SyncStatus::Partial,
            _ => SyncStatus::Failed,
        }
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ==========================================
// 运行阶段 (Sync Phase)
// ==========================================
// started → cleaning → mapping → routing → 终态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncPhase {
    Started,
    Cleaning,
    Mapping,
    Routing,
    Finished,
}

impl fmt::Display for SyncPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncPhase::Started => write!(f, "started"),
            SyncPhase::Cleaning => write!(f, "cleaning"),
            SyncPhase::Mapping => write!(f, "mapping"),
            SyncPhase::Routing => write!(f, "routing"),
            SyncPhase::Finished => write!(f, "finished"),
        }
    }
}

// ==========================================
// 数据源状态 (Data Source Status)
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSourceStatus {
    #[default]
    Idle,
    Syncing,
    Success,
    Failed,
}

impl DataSourceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSourceStatus::Idle => "idle",
            DataSourceStatus::Syncing => "syncing",
            DataSourceStatus::Success => "success",
            DataSourceStatus::Failed => "failed",
        }
    }

    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "syncing" => DataSourceStatus::Syncing,
            "success" => DataSourceStatus::Success,
            "failed" => DataSourceStatus::Failed,
            _ => DataSourceStatus::Idle,
        }
    }
}

impl From<SyncStatus> for DataSourceStatus {
    fn from(status: SyncStatus) -> Self {
        match status {
            SyncStatus::Started => DataSourceStatus::Syncing,
            SyncStatus::Success | SyncStatus::Partial => DataSourceStatus::Success,
            SyncStatus::Failed => DataSourceStatus::Failed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sync_status_from_counts() {
        assert_eq!(SyncStatus::from_counts(5, 0), SyncStatus::Success);
        assert_eq!(SyncStatus::from_counts(5, 2), SyncStatus::Partial);
        assert_eq!(SyncStatus::from_counts(0, 2), SyncStatus::Failed);
        assert_eq!(SyncStatus::from_counts(0, 0), SyncStatus::Failed);
    }

    #[test]
    fn test_serde_snake_case() {
        let json = serde_json::to_string(&DuplicateHandling::KeepFirst).unwrap();
        assert_eq!(json, "\"keep_first\"");
        let parsed: DestinationType = serde_json::from_str("\"transactions\"").unwrap();
        assert_eq!(parsed, DestinationType::Transactions);
    }

    #[test]
    fn test_data_source_status_from_sync() {
        assert_eq!(
            DataSourceStatus::from(SyncStatus::Partial),
            DataSourceStatus::Success
        );
        assert_eq!(
            DataSourceStatus::from(SyncStatus::Failed),
            DataSourceStatus::Failed
        );
    }
}
