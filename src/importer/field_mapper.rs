// ==========================================
// 会员数据导入同步 - 字段映射器
// ==========================================
// 职责: 清洗后记录 → 目标表字段记录
//       字段映射建议（列名别名匹配）与映射校验
// ==========================================

use crate::domain::mapping::{destination_fields, FieldMapping};
use crate::domain::types::DestinationType;
use crate::domain::value::Record;
use crate::importer::error::{ImportError, ImportResult};
use std::collections::HashSet;

/// 列名规范化为标识符形式
///
/// 小写，非字母数字连续段折叠为 '_'，去除首尾 '_'
/// 例: "First Name" → "first_name"，"E-mail Address " → "e_mail_address"
pub fn normalize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for c in raw.trim().chars() {
        if c.is_alphanumeric() {
            if pending_sep && !out.is_empty() {
                out.push('_');
            }
            pending_sep = false;
            out.extend(c.to_lowercase());
        } else {
            pending_sep = true;
        }
    }
    out
}

/// 按映射提取目标字段
///
/// 仅保留源键存在的已映射字段（Null 视为存在）
pub fn map_row_to_destination(record: &Record, mappings: &[FieldMapping]) -> Record {
    mappings
        .iter()
        .filter(|m| !m.is_unmapped())
        .filter_map(|m| {
            record
                .get(m.source_column.trim())
                .map(|v| (m.target_field.clone(), v.clone()))
        })
        .collect()
}

/// 去除未映射项（源列为空）
pub fn normalize_mappings(mappings: &[FieldMapping]) -> Vec<FieldMapping> {
    mappings
        .iter()
        .filter(|m| !m.is_unmapped())
        .map(|m| FieldMapping {
            source_column: m.source_column.trim().to_string(),
            target_field: m.target_field.clone(),
            required: m.required,
        })
        .collect()
}

/// 按列名别名建议字段映射
///
/// # 返回
/// - 固定目标: 每个目标字段一项，无匹配列时 source_column 为空
/// - custom: 每列一项，目标字段为规范化列名
pub fn suggest_field_mappings(headers: &[String], destination: DestinationType) -> Vec<FieldMapping> {
    if destination == DestinationType::Custom {
        return headers
            .iter()
            .filter(|h| !h.trim().is_empty())
            .map(|h| FieldMapping::new(h, &normalize_identifier(h)))
            .collect();
    }

    let normalized: Vec<String> = headers.iter().map(|h| normalize_identifier(h)).collect();
    let mut used: HashSet<usize> = HashSet::new();

    destination_fields(destination)
        .iter()
        .map(|field| {
            // 别名按声明顺序优先
            let matched = field.aliases.iter().find_map(|alias| {
                normalized
                    .iter()
                    .enumerate()
                    .find(|(idx, h)| !used.contains(idx) && h.as_str() == *alias)
                    .map(|(idx, _)| idx)
            });

            let source_column = match matched {
                Some(idx) => {
                    used.insert(idx);
                    headers[idx].clone()
                }
                None => String::new(),
            };

            FieldMapping {
                source_column,
                target_field: field.name.to_string(),
                required: field.required,
            }
        })
        .collect()
}

/// 映射配置校验（行处理前执行）
///
/// # 错误
/// - MissingTableName: custom 目标未配置表名
/// - RequiredFieldUnmapped: 固定目标的必填字段未映射
pub fn validate_mappings(
    destination: DestinationType,
    mappings: &[FieldMapping],
    table_name: Option<&str>,
) -> ImportResult<()> {
    if destination == DestinationType::Custom {
        return match table_name.map(str::trim) {
            Some(name) if !name.is_empty() => Ok(()),
            _ => Err(ImportError::MissingTableName),
        };
    }

    for field in destination_fields(destination).iter().filter(|f| f.required) {
        let mapped = mappings
            .iter()
            .any(|m| m.target_field == field.name && !m.is_unmapped());
        if !mapped {
            return Err(ImportError::RequiredFieldUnmapped {
                destination: destination.to_string(),
                field: field.name.to_string(),
            });
        }
    }
    Ok(())
}
