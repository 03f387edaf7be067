// ==========================================
// 会员数据导入同步 - 列配置模型
// ==========================================
// 职责: 列预览 / 列清洗配置 / 行过滤条件
// 生命周期: 每个数据源构建一次，跨多次同步复用
// ==========================================

use crate::domain::rule::CleaningRule;
use crate::domain::types::{ColumnType, DuplicateHandling};
use serde::{Deserialize, Serialize};

// ==========================================
// ColumnPreview - 列形态推断结果
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnPreview {
    pub name: String,
    pub detected_type: ColumnType,
    pub confidence: f64,         // 多数类型在非空样本中的占比（0..1）
    pub sample_values: Vec<String>, // ≤5 个非空样本
    pub null_count: usize,
    pub unique_count: usize,
}

// ==========================================
// ColumnSetting - 单列清洗配置
// ==========================================
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSetting {
    pub source_name: String,
    pub target_name: String,
    #[serde(rename = "type")]
    pub column_type: ColumnType,
    #[serde(default = "default_true")]
    pub included: bool,
    #[serde(default)]
    pub cleaning_rules: Vec<CleaningRule>,
}

fn default_true() -> bool {
    true
}

impl ColumnSetting {
    /// 原样透传的列（无规则）
    pub fn passthrough(name: &str, column_type: ColumnType) -> Self {
        Self {
            source_name: name.to_string(),
            target_name: name.to_string(),
            column_type,
            included: true,
            cleaning_rules: Vec::new(),
        }
    }
}

// ==========================================
// ColumnConfiguration - 一次导入的完整清洗配置
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnConfiguration {
    pub columns: Vec<ColumnSetting>,
    #[serde(default)]
    pub row_filters: Vec<RowFilter>,
    #[serde(default)]
    pub duplicate_key_columns: Vec<String>,
    #[serde(default)]
    pub duplicate_handling: DuplicateHandling,
}

// ==========================================
// RowFilter - 行级过滤条件
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    StartsWith,
    EndsWith,
    IsEmpty,
    IsNotEmpty,
    GreaterThan,
    LessThan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterAction {
    #[default]
    Include,
    Exclude,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowFilter {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub action: FilterAction,
}
