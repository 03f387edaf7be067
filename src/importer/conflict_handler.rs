// ==========================================
// 会员数据导入同步 - 重复行处理
// ==========================================
// 职责: 按键列检测批次内重复行并按策略去重
// 键: 键列值以 '|' 连接，缺失列为空段
// ==========================================

use crate::domain::types::DuplicateHandling;
use crate::domain::value::{CellValue, Record};
use std::collections::{HashMap, HashSet};

/// 行键（键列值以 '|' 连接）
pub fn get_row_key(record: &Record, key_columns: &[String]) -> String {
    key_columns
        .iter()
        .map(|col| {
            record
                .get(col)
                .map(CellValue::to_plain_string)
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join("|")
}

/// 检测批次内重复行
///
/// # 返回
/// - Vec<(行下标, 行键)>: 重复记录列表（不包括第一次出现）
pub fn detect_duplicates(rows: &[Record], key_columns: &[String]) -> Vec<(usize, String)> {
    if key_columns.is_empty() {
        return Vec::new();
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut duplicates = Vec::new();
    for (idx, row) in rows.iter().enumerate() {
        let key = get_row_key(row, key_columns);
        if !seen.insert(key.clone()) {
            duplicates.push((idx, key));
        }
    }
    duplicates
}

/// 按策略计算保留掩码（与输入行一一对应）
///
/// # 规则
/// - keep_all: 全部保留
/// - keep_first: 每个键保留首次出现
/// - keep_last: 每个键保留最后一次出现（位于其原位置）
/// - skip_all: 键出现多于一次的行全部丢弃
/// - 无键列: 全部保留
pub fn duplicate_keep_mask(
    rows: &[Record],
    key_columns: &[String],
    handling: DuplicateHandling,
) -> Vec<bool> {
    if key_columns.is_empty() || handling == DuplicateHandling::KeepAll {
        return vec![true; rows.len()];
    }

    let keys: Vec<String> = rows.iter().map(|r| get_row_key(r, key_columns)).collect();

    match handling {
        DuplicateHandling::KeepAll => vec![true; rows.len()],
        DuplicateHandling::KeepFirst => {
            let mut seen: HashSet<&str> = HashSet::new();
            keys.iter().map(|k| seen.insert(k.as_str())).collect()
        }
        DuplicateHandling::KeepLast => {
            let last: HashMap<&str, usize> = keys
                .iter()
                .enumerate()
                .map(|(idx, k)| (k.as_str(), idx))
                .collect();
            keys.iter()
                .enumerate()
                .map(|(idx, k)| last.get(k.as_str()) == Some(&idx))
                .collect()
        }
        DuplicateHandling::SkipAll => {
            let mut counts: HashMap<&str, usize> = HashMap::new();
            for k in &keys {
                *counts.entry(k.as_str()).or_insert(0) += 1;
            }
            keys.iter()
                .map(|k| counts.get(k.as_str()) == Some(&1))
                .collect()
        }
    }
}

/// 按策略去重（规则见 duplicate_keep_mask）
pub fn deduplicate(
    rows: Vec<Record>,
    key_columns: &[String],
    handling: DuplicateHandling,
) -> Vec<Record> {
    let keep = duplicate_keep_mask(&rows, key_columns, handling);
    rows.into_iter()
        .zip(keep)
        .filter_map(|(row, kept)| kept.then_some(row))
        .collect()
}
