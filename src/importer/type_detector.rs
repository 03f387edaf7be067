// ==========================================
// 会员数据导入同步 - 列类型识别
// ==========================================
// 职责: 按采样值推断列语义类型（仅用于预览与配置建议）
// 约定: 判定顺序固定为 DETECTION_ORDER，先命中者优先
//       例: "1" 同时匹配 boolean 与 integer，按顺序判为 boolean
// ==========================================

use crate::domain::column::ColumnPreview;
use crate::domain::types::ColumnType;
use crate::importer::file_parser::ParsedTable;
use chrono::{NaiveDate, NaiveDateTime};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// 预览默认采样行数
pub const DEFAULT_SAMPLE_SIZE: usize = 100;

/// 每列保留的样本值个数上限
const MAX_SAMPLE_VALUES: usize = 5;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid email regex")
});

static URL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("Invalid url regex"));

static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s\-().]+$").expect("Invalid phone regex"));

static INTEGER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+$").expect("Invalid integer regex"));

static NUMBER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[-+]?[$€£¥]?\s?(\d{1,3}(,\d{3})+|\d+)?(\.\d+)?$").expect("Invalid number regex")
});

const BOOLEAN_TOKENS: &[&str] = &["true", "false", "yes", "no", "1", "0"];

/// 日期识别支持的格式（ISO 优先，其次常见人工格式）
pub(crate) const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%Y/%m/%d",
    "%m/%d/%Y",
    "%m-%d-%Y",
    "%m/%d/%y",
    "%d.%m.%Y",
    "%b %d, %Y",
    "%B %d, %Y",
    "%d %b %Y",
    "%d %B %Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

pub fn is_email(value: &str) -> bool {
    EMAIL_REGEX.is_match(value)
}

pub fn is_url(value: &str) -> bool {
    URL_REGEX.is_match(value)
}

/// 电话: 仅数字与 +()-. 空格，数字位数 10..=15
pub fn is_phone(value: &str) -> bool {
    if !PHONE_REGEX.is_match(value) {
        return false;
    }
    let digits = value.chars().filter(char::is_ascii_digit).count();
    (10..=15).contains(&digits)
}

pub fn is_boolean(value: &str) -> bool {
    let lower = value.to_lowercase();
    BOOLEAN_TOKENS.contains(&lower.as_str())
}

pub fn is_integer(value: &str) -> bool {
    INTEGER_REGEX.is_match(value)
}

/// 数字: 容忍货币符号与千分位
pub fn is_number(value: &str) -> bool {
    value.chars().any(|c| c.is_ascii_digit()) && NUMBER_REGEX.is_match(value)
}

/// 按已知格式解析日期（含带时间的 ISO 形式、RFC 3339）
pub fn parse_date_any(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(value, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
                .map(|dt| dt.date())
        })
        .or_else(|| {
            chrono::DateTime::parse_from_rfc3339(value)
                .ok()
                .map(|dt| dt.date_naive())
        })
}

pub fn is_date(value: &str) -> bool {
    parse_date_any(value).is_some()
}

/// 判定顺序（契约）
pub const DETECTION_ORDER: &[(fn(&str) -> bool, ColumnType)] = &[
    (is_email, ColumnType::Email),
    (is_url, ColumnType::Url),
    (is_phone, ColumnType::Phone),
    (is_boolean, ColumnType::Boolean),
    (is_integer, ColumnType::Integer),
    (is_number, ColumnType::Number),
    (is_date, ColumnType::Date),
];

/// 单值类型识别，空值为 text
pub fn detect_value_type(value: &str) -> ColumnType {
    let value = value.trim();
    if value.is_empty() {
        return ColumnType::Text;
    }

    DETECTION_ORDER
        .iter()
        .find(|(predicate, _)| predicate(value))
        .map(|(_, column_type)| *column_type)
        .unwrap_or(ColumnType::Text)
}

fn order_rank(column_type: ColumnType) -> usize {
    DETECTION_ORDER
        .iter()
        .position(|(_, t)| *t == column_type)
        .unwrap_or(DETECTION_ORDER.len())
}

/// 列类型识别
///
/// # 返回
/// - (多数类型, 置信度)；置信度 = 多数类型计数 / 非空样本数
/// - 无非空样本时返回 (text, 0)
pub fn detect_column_type<S: AsRef<str>>(values: &[S]) -> (ColumnType, f64) {
    let mut counts: HashMap<ColumnType, usize> = HashMap::new();
    let mut non_null = 0usize;

    for value in values {
        let value = value.as_ref().trim();
        if value.is_empty() {
            continue;
        }
        non_null += 1;
        *counts.entry(detect_value_type(value)).or_insert(0) += 1;
    }

    if non_null == 0 {
        return (ColumnType::Text, 0.0);
    }

    // 计数相同按判定顺序取前者
    let (majority, count) = counts
        .into_iter()
        .max_by(|(ta, ca), (tb, cb)| ca.cmp(cb).then(order_rank(*tb).cmp(&order_rank(*ta))))
        .unwrap_or((ColumnType::Text, 0));

    (majority, count as f64 / non_null as f64)
}

/// 为每个表头生成列预览（采样前 sample_size 行）
pub fn analyze_columns(table: &ParsedTable, sample_size: usize) -> Vec<ColumnPreview> {
    let sample_rows = &table.rows[..table.rows.len().min(sample_size)];

    table
        .headers
        .iter()
        .enumerate()
        .map(|(idx, name)| {
            let values: Vec<&str> = sample_rows
                .iter()
                .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
                .collect();

            let non_null: Vec<&str> = values
                .iter()
                .map(|v| v.trim())
                .filter(|v| !v.is_empty())
                .collect();

            let (detected_type, confidence) = detect_column_type(&values);
            let unique_count = non_null.iter().collect::<HashSet<_>>().len();

            ColumnPreview {
                name: name.clone(),
                detected_type,
                confidence,
                sample_values: non_null
                    .iter()
                    .take(MAX_SAMPLE_VALUES)
                    .map(|v| v.to_string())
                    .collect(),
                null_count: values.len() - non_null.len(),
                unique_count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::importer::file_parser::parse_csv;

    #[test]
    fn test_detect_value_type_order() {
        assert_eq!(detect_value_type("ann@example.com"), ColumnType::Email);
        assert_eq!(detect_value_type("https://example.com/a"), ColumnType::Url);
        assert_eq!(detect_value_type("+1 (555) 123-4567"), ColumnType::Phone);
        assert_eq!(detect_value_type("Yes"), ColumnType::Boolean);
        assert_eq!(detect_value_type("1"), ColumnType::Boolean);
        assert_eq!(detect_value_type("42"), ColumnType::Integer);
        assert_eq!(detect_value_type("-7"), ColumnType::Integer);
        assert_eq!(detect_value_type("$1,234.56"), ColumnType::Number);
        assert_eq!(detect_value_type("3.14"), ColumnType::Number);
        assert_eq!(detect_value_type("2024-01-15"), ColumnType::Date);
        assert_eq!(detect_value_type("01/15/2024"), ColumnType::Date);
        assert_eq!(detect_value_type("Jan 15, 2024"), ColumnType::Date);
        assert_eq!(detect_value_type("hello world"), ColumnType::Text);
        assert_eq!(detect_value_type("   "), ColumnType::Text);
    }

    #[test]
    fn test_short_digit_runs_are_not_phones() {
        assert_eq!(detect_value_type("12345"), ColumnType::Integer);
        assert_eq!(detect_value_type("5551234567"), ColumnType::Phone);
    }

    #[test]
    fn test_all_email_column_full_confidence() {
        let values = vec!["a@x.com", "b@y.org", "c@z.net"];
        assert_eq!(detect_column_type(&values), (ColumnType::Email, 1.0));
    }

    #[test]
    fn test_mixed_column_confidence() {
        let values = vec!["10", "20", "abc", "", "30"];
        let (column_type, confidence) = detect_column_type(&values);
        assert_eq!(column_type, ColumnType::Integer);
        assert!((confidence - 0.75).abs() < 1e-9);
    }

    #[test]
    fn test_empty_column() {
        let values: Vec<&str> = vec!["", "  "];
        assert_eq!(detect_column_type(&values), (ColumnType::Text, 0.0));
        let none: Vec<String> = Vec::new();
        assert_eq!(detect_column_type(&none), (ColumnType::Text, 0.0));
    }

    #[test]
    fn test_tie_breaks_by_detection_order() {
        let values = vec!["a@x.com", "hello"];
        assert_eq!(detect_column_type(&values).0, ColumnType::Email);
    }

    #[test]
    fn test_analyze_columns() {
        let table = parse_csv(
            "email,age,notes\na@x.com,31,\nb@x.com,42,hi\nb@x.com,,hi\nd@x.com,7,\ne@x.com,8,\nf@x.com,9,\n",
        )
        .unwrap();

        let previews = analyze_columns(&table, DEFAULT_SAMPLE_SIZE);
        assert_eq!(previews.len(), 3);

        let email = &previews[0];
        assert_eq!(email.detected_type, ColumnType::Email);
        assert_eq!(email.sample_values.len(), 5);
        assert_eq!(email.unique_count, 5);
        assert_eq!(email.null_count, 0);

        let age = &previews[1];
        assert_eq!(age.detected_type, ColumnType::Integer);
        assert_eq!(age.null_count, 1);

        let notes = &previews[2];
        assert_eq!(notes.detected_type, ColumnType::Text);
        assert_eq!(notes.sample_values, vec!["hi", "hi"]);
        assert_eq!(notes.unique_count, 1);
    }

    #[test]
    fn test_analyze_respects_sample_size() {
        let table = parse_csv("n\n1\n2\nx\ny\nz\n").unwrap();
        let previews = analyze_columns(&table, 2);
        assert_eq!(previews[0].detected_type, ColumnType::Boolean);
        assert_eq!(previews[0].null_count, 0);
    }
}
