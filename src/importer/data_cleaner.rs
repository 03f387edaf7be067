// ==========================================
// 会员数据导入同步 - 行清洗处理器
// ==========================================
// 职责: 单元格规则 → 丢弃 skip 行 → 行过滤 → 去重
// 输出: 记录以 target_name 为键，排除列不输出
// ==========================================

use crate::domain::column::{ColumnConfiguration, ColumnPreview, ColumnSetting};
use crate::domain::rule::{CleaningRule, OnInvalid};
use crate::domain::types::{ColumnType, DuplicateHandling};
use crate::domain::value::{CellValue, Record};
use crate::importer::cleaning_rules::apply_column_rules;
use crate::importer::conflict_handler::duplicate_keep_mask;
use crate::importer::field_mapper::normalize_identifier;
use crate::importer::row_filter::should_include_row;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// 低于该置信度的列按 text 建议规则
const SUGGESTION_MIN_CONFIDENCE: f64 = 0.8;

/// 行清洗结果
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessedRows {
    pub cleaned_rows: Vec<Record>,
    pub skipped_count: usize, // 输入中未出现在输出的行数
    /// 每条输出行对应的输入行号（从 1 开始）
    #[serde(default)]
    pub source_rows: Vec<usize>,
}


/// 按列配置清洗单行
///
/// # 返回
/// - Some(记录): 清洗后的行（以 target_name 为键）
/// - None: 某单元格规则要求跳过该行
pub fn clean_row(row: &Record, columns: &[ColumnSetting]) -> Option<Record> {
    if columns.is_empty() {
        return Some(row.clone());
    }

    let mut cleaned = Record::new();
    for column in columns.iter().filter(|c| c.included) {
        let value = row
            .get(&column.source_name)
            .cloned()
            .unwrap_or(CellValue::Null);
        let outcome = apply_column_rules(value, &column.cleaning_rules);
        if outcome.skip {
            return None;
        }
        cleaned.insert(column.target_name.clone(), outcome.value);
    }
    Some(cleaned)
}

/// 批量清洗
///
/// # 流程
/// 1. 逐单元格执行规则，任一单元格 skip → 丢弃整行
/// 2. 行过滤（按 target_name 取值）
/// 3. 按键列去重
///
/// 未配置任何列时行原样透传
pub fn process_rows(rows: &[Record], config: &ColumnConfiguration) -> ProcessedRows {
    let input_count = rows.len();

    // (输入行号, 清洗后记录)
    let cleaned: Vec<(usize, Record)> = rows
        .iter()
        .enumerate()
        .filter_map(|(idx, row)| clean_row(row, &config.columns).map(|r| (idx + 1, r)))
        .collect();
    let after_rules = cleaned.len();

    let filtered: Vec<(usize, Record)> = cleaned
        .into_iter()
        .filter(|(_, row)| should_include_row(row, &config.row_filters))
        .collect();
    let after_filters = filtered.len();

    let (row_numbers, records): (Vec<usize>, Vec<Record>) = filtered.into_iter().unzip();
    let keep = duplicate_keep_mask(
        &records,
        &config.duplicate_key_columns,
        config.duplicate_handling,
    );
    let (source_rows, cleaned_rows): (Vec<usize>, Vec<Record>) = row_numbers
        .into_iter()
        .zip(records)
        .zip(keep)
        .filter_map(|(pair, kept)| kept.then_some(pair))
        .unzip();

    debug!(
        input = input_count,
        skipped_by_rules = input_count - after_rules,
        skipped_by_filters = after_rules - after_filters,
        skipped_as_duplicates = after_filters - cleaned_rows.len(),
        "行清洗完成"
    );

    ProcessedRows {
        skipped_count: input_count - cleaned_rows.len(),
        cleaned_rows,
        source_rows,
    }
}

/// 按识别类型给出默认清洗规则
pub fn default_rules_for(column_type: ColumnType) -> Vec<CleaningRule> {
    let mut rules = vec![CleaningRule::Trim];
    match column_type {
        ColumnType::Email => rules.extend([
            CleaningRule::Lowercase,
            CleaningRule::ValidateEmail {
                on_invalid: OnInvalid::Null,
            },
        ]),
        ColumnType::Phone => rules.push(CleaningRule::ValidatePhone {
            on_invalid: OnInvalid::Keep,
            default_country_code: None,
        }),
        ColumnType::Url => rules.push(CleaningRule::ValidateUrl {
            on_invalid: OnInvalid::Keep,
        }),
        ColumnType::Boolean => rules.push(CleaningRule::ParseBoolean {
            true_values: None,
            false_values: None,
        }),
        ColumnType::Integer | ColumnType::Number => {
            rules.push(CleaningRule::ParseNumber { strip_chars: None })
        }
        ColumnType::Date => rules.push(CleaningRule::ParseDate { format: None }),
        ColumnType::Text => rules.extend([
            CleaningRule::CollapseWhitespace,
            CleaningRule::EmptyToNull,
        ]),
    }
    rules
}

/// 由列预览建议列配置（目标列名规范化，去重策略默认 keep_all）
pub fn suggest_column_configuration(previews: &[ColumnPreview]) -> ColumnConfiguration {
    let mut used_targets: Vec<String> = Vec::new();

    let columns = previews
        .iter()
        .map(|preview| {
            let column_type = if preview.confidence >= SUGGESTION_MIN_CONFIDENCE {
                preview.detected_type
            } else {
                ColumnType::Text
            };

            let base = match normalize_identifier(&preview.name) {
                name if name.is_empty() => "column".to_string(),
                name => name,
            };
            let mut target_name = base.clone();
            let mut suffix = 2;
            while used_targets.contains(&target_name) {
                target_name = format!("{}_{}", base, suffix);
                suffix += 1;
            }
            used_targets.push(target_name.clone());

            ColumnSetting {
                source_name: preview.name.clone(),
                target_name,
                column_type,
                included: true,
                cleaning_rules: default_rules_for(column_type),
            }
        })
        .collect();

    ColumnConfiguration {
        columns,
        row_filters: Vec::new(),
        duplicate_key_columns: Vec::new(),
        duplicate_handling: DuplicateHandling::KeepAll,
    }
}
