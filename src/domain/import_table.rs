// ==========================================
// 会员数据导入同步 - 动态导入表模型
// ==========================================
// 用途: custom 目标的动态建表元数据（import_table 注册表）
// 生命周期: 创建后持续存在，直至显式删除
// ==========================================

use crate::domain::value::Record;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// 动态表列定义
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableColumn {
    pub name: String,
    pub sql_type: String,
    #[serde(default)]
    pub source_name: Option<String>,
}

impl TableColumn {
    pub fn new(name: &str, sql_type: &str) -> Self {
        Self {
            name: name.to_string(),
            sql_type: sql_type.to_string(),
            source_name: None,
        }
    }
}

/// 导入表元数据（注册表行）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportTable {
    pub table_name: String,
    pub label: String,
    pub data_source_id: Option<String>,
    pub columns: Vec<TableColumn>,
    pub row_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// 分页查询结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPage {
    pub rows: Vec<Record>,
    pub total: i64,
    pub page: usize,
    pub page_size: usize,
}

/// 分批写入进度（每批回调一次）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    pub batch_index: usize, // 1 起始
    pub batch_count: usize,
    pub inserted: usize,    // 累计已写入
    pub total: usize,
}
