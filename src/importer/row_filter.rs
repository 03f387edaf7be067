// ==========================================
// 会员数据导入同步 - 行过滤器
// ==========================================
// 职责: 按 RowFilter 条件决定清洗后的行是否保留
// 规则: include 条件不满足 → 丢弃；exclude 条件满足 → 丢弃
//       文本比较大小写不敏感；数值比较任一侧非数字 → 不匹配
// ==========================================

use crate::domain::column::{FilterAction, FilterOperator, RowFilter};
use crate::domain::value::{CellValue, Record};

/// 单个条件是否成立（与 action 无关）
pub fn matches_filter(record: &Record, filter: &RowFilter) -> bool {
    let cell = record.get(&filter.column).unwrap_or(&CellValue::Null);
    let expected = filter.value.as_deref().unwrap_or("").trim();

    match filter.operator {
        FilterOperator::IsEmpty => cell.is_blank(),
        FilterOperator::IsNotEmpty => !cell.is_blank(),
        FilterOperator::GreaterThan => compare_numeric(cell, expected, |a, b| a > b),
        FilterOperator::LessThan => compare_numeric(cell, expected, |a, b| a < b),
        op => {
            let actual = cell.to_plain_string().trim().to_lowercase();
            let expected = expected.to_lowercase();
            match op {
                FilterOperator::Equals => actual == expected,
                FilterOperator::NotEquals => actual != expected,
                FilterOperator::Contains => actual.contains(&expected),
                FilterOperator::NotContains => !actual.contains(&expected),
                FilterOperator::StartsWith => actual.starts_with(&expected),
                FilterOperator::EndsWith => actual.ends_with(&expected),
                // 已在外层分支处理
                _ => false,
            }
        }
    }
}

fn compare_numeric(cell: &CellValue, expected: &str, cmp: impl Fn(f64, f64) -> bool) -> bool {
    match (cell.as_f64(), expected.parse::<f64>().ok()) {
        (Some(actual), Some(bound)) => cmp(actual, bound),
        _ => false,
    }
}

/// 行是否通过全部过滤条件
pub fn should_include_row(record: &Record, filters: &[RowFilter]) -> bool {
    filters.iter().all(|filter| {
        let matched = matches_filter(record, filter);
        match filter.action {
            FilterAction::Include => matched,
            FilterAction::Exclude => !matched,
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::record_from;

    fn filter(column: &str, operator: FilterOperator, value: Option<&str>) -> RowFilter {
        RowFilter {
            column: column.to_string(),
            operator,
            value: value.map(str::to_string),
            action: FilterAction::Include,
        }
    }

    fn sample() -> Record {
        let mut record = record_from([("status", "Active"), ("email", "Ann@Example.com")]);
        record.insert("age".to_string(), CellValue::Int(34));
        record.insert("notes".to_string(), CellValue::Null);
        record
    }

    #[test]
    fn test_text_operators_case_insensitive() {
        let record = sample();
        assert!(matches_filter(&record, &filter("status", FilterOperator::Equals, Some("active"))));
        assert!(!matches_filter(&record, &filter("status", FilterOperator::NotEquals, Some("ACTIVE"))));
        assert!(matches_filter(&record, &filter("email", FilterOperator::Contains, Some("example"))));
        assert!(matches_filter(&record, &filter("email", FilterOperator::NotContains, Some("gmail"))));
        assert!(matches_filter(&record, &filter("email", FilterOperator::StartsWith, Some("ann@"))));
        assert!(matches_filter(&record, &filter("email", FilterOperator::EndsWith, Some(".COM"))));
    }

    #[test]
    fn test_empty_operators() {
        let record = sample();
        assert!(matches_filter(&record, &filter("notes", FilterOperator::IsEmpty, None)));
        assert!(matches_filter(&record, &filter("missing", FilterOperator::IsEmpty, None)));
        assert!(matches_filter(&record, &filter("status", FilterOperator::IsNotEmpty, None)));
    }

    #[test]
    fn test_numeric_operators() {
        let record = sample();
        assert!(matches_filter(&record, &filter("age", FilterOperator::GreaterThan, Some("18"))));
        assert!(!matches_filter(&record, &filter("age", FilterOperator::LessThan, Some("18"))));
        // 非数字 → 不匹配
        assert!(!matches_filter(&record, &filter("status", FilterOperator::GreaterThan, Some("1"))));
        assert!(!matches_filter(&record, &filter("age", FilterOperator::LessThan, Some("abc"))));
    }

    #[test]
    fn test_should_include_row_combines_actions() {
        let record = sample();
        let include_active = filter("status", FilterOperator::Equals, Some("active"));
        let mut exclude_example = filter("email", FilterOperator::Contains, Some("example"));
        exclude_example.action = FilterAction::Exclude;

        assert!(should_include_row(&record, &[]));
        assert!(should_include_row(&record, &[include_active.clone()]));
        assert!(!should_include_row(&record, &[include_active, exclude_example]));

        let include_inactive = filter("status", FilterOperator::Equals, Some("inactive"));
        assert!(!should_include_row(&record, &[include_inactive]));
    }
}
