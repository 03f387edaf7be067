// ==========================================
// 会员数据导入同步 - 数据源模型
// ==========================================
// 职责: 数据源的持久化配置（列清洗配置 / 字段映射 / 定时策略）
//       及同步状态（最近运行 / 下次运行 / 重试次数）
// ==========================================

use crate::domain::column::ColumnConfiguration;
use crate::domain::mapping::FieldMapping;
use crate::domain::schedule::ScheduleConfiguration;
use crate::domain::types::{DataSourceStatus, DestinationType, SyncStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataSource {
    pub data_source_id: String,
    pub name: String,
    pub site_id: Option<String>,
    pub destination_type: DestinationType,
    pub table_name: Option<String>,
    pub column_config: ColumnConfiguration,
    pub field_mappings: Vec<FieldMapping>,
    pub schedule: ScheduleConfiguration,
    pub status: DataSourceStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub retry_attempt: u32, // 连续失败后已安排的重试次数
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DataSource {
    pub fn new(
        data_source_id: &str,
        name: &str,
        destination_type: DestinationType,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            data_source_id: data_source_id.to_string(),
            name: name.to_string(),
            site_id: None,
            destination_type,
            table_name: None,
            column_config: ColumnConfiguration::default(),
            field_mappings: Vec::new(),
            schedule: ScheduleConfiguration::default(),
            status: DataSourceStatus::Idle,
            last_sync_at: None,
            last_sync_status: None,
            next_sync_at: None,
            retry_attempt: 0,
            created_at: now,
            updated_at: now,
        }
    }
}

/// 运行结束后的数据源状态回写
#[derive(Debug, Clone, PartialEq)]
pub struct DataSourceSyncUpdate {
    pub status: DataSourceStatus,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub last_sync_status: Option<SyncStatus>,
    pub next_sync_at: Option<DateTime<Utc>>,
    pub retry_attempt: u32,
}
