// ==========================================
// 会员数据导入同步 - 清洗规则引擎
// ==========================================
// 职责: 对单个单元格值依次执行声明式清洗 / 校验规则
// 约束: apply 为纯函数且对所有输入有定义
//       skip = true 时终止该单元格后续规则，整行随后被丢弃
// ==========================================

use crate::domain::rule::{CleaningRule, OnInvalid};
use crate::domain::value::CellValue;
use crate::importer::type_detector::{is_email, is_url, parse_date_any};
use chrono::NaiveDate;
use regex::Regex;
use std::sync::LazyLock;
use tracing::warn;

/// parse_number 默认剔除的字符（货币符号 / 千分位 / 空白）
const DEFAULT_NUMBER_STRIP: &str = "$€£¥, ";

const DEFAULT_TRUE_VALUES: &[&str] = &["true", "yes", "y", "1", "t", "on"];
const DEFAULT_FALSE_VALUES: &[&str] = &["false", "no", "n", "0", "f", "off"];

const DEFAULT_COUNTRY_CODE: &str = "1";

static WHITESPACE_RUN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s+").expect("Invalid whitespace regex"));

static PHONE_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+?[\d\s\-().]+$").expect("Invalid phone regex"));

/// 单条规则执行结果
#[derive(Debug, Clone, PartialEq)]
pub struct RuleOutcome {
    pub value: CellValue,
    pub skip: bool,
}

impl RuleOutcome {
    pub fn keep(value: CellValue) -> Self {
        Self { value, skip: false }
    }

    pub fn skip(value: CellValue) -> Self {
        Self { value, skip: true }
    }
}

impl CleaningRule {
    /// 执行单条规则
    pub fn apply(&self, value: &CellValue) -> RuleOutcome {
        match self {
            // ===== 空白 =====
            CleaningRule::Trim => map_text(value, |s| s.trim().to_string()),
            CleaningRule::CollapseWhitespace => {
                map_text(value, |s| WHITESPACE_RUN.replace_all(s, " ").into_owned())
            }

            // ===== 大小写 =====
            CleaningRule::Lowercase => map_text(value, str::to_lowercase),
            CleaningRule::Uppercase => map_text(value, str::to_uppercase),
            CleaningRule::TitleCase => map_text(value, title_case),

            // ===== 空值处理 =====
            CleaningRule::NullToDefault { default } => {
                if value.is_empty() {
                    RuleOutcome::keep(CellValue::Text(default.clone()))
                } else {
                    RuleOutcome::keep(value.clone())
                }
            }
            CleaningRule::EmptyToNull => {
                if value.is_blank() {
                    RuleOutcome::keep(CellValue::Null)
                } else {
                    RuleOutcome::keep(value.clone())
                }
            }
            CleaningRule::SkipIfEmpty => {
                if value.is_blank() {
                    RuleOutcome::skip(value.clone())
                } else {
                    RuleOutcome::keep(value.clone())
                }
            }

            // ===== 类型转换（无法解析 → Null，不跳过）=====
            CleaningRule::ParseNumber { strip_chars } => {
                RuleOutcome::keep(parse_number(value, strip_chars.as_deref()))
            }
            CleaningRule::ParseBoolean {
                true_values,
                false_values,
            } => RuleOutcome::keep(parse_boolean(
                value,
                true_values.as_deref(),
                false_values.as_deref(),
            )),
            CleaningRule::ParsePercentage { as_decimal } => {
                RuleOutcome::keep(parse_percentage(value, *as_decimal))
            }
            CleaningRule::ParseDate { format } => {
                RuleOutcome::keep(parse_date(value, format.as_deref()))
            }

            // ===== 校验（空值放行）=====
            CleaningRule::ValidateEmail { on_invalid } => validate(value, *on_invalid, |s| {
                let candidate = s.trim();
                is_email(candidate).then(|| candidate.to_lowercase())
            }),
            CleaningRule::ValidatePhone {
                on_invalid,
                default_country_code,
            } => validate(value, *on_invalid, |s| {
                normalize_phone(
                    s,
                    default_country_code
                        .as_deref()
                        .unwrap_or(DEFAULT_COUNTRY_CODE),
                )
            }),
            CleaningRule::ValidateUrl { on_invalid } => validate(value, *on_invalid, |s| {
                let candidate = s.trim();
                is_url(candidate).then(|| candidate.to_string())
            }),

            // ===== 变换 =====
            CleaningRule::FindReplace {
                find,
                replace,
                use_regex,
            } => find_replace(value, find, replace, *use_regex),
            CleaningRule::Split { delimiter, index } => split(value, delimiter, *index),
            CleaningRule::Prefix { value: prefix } => {
                map_scalar(value, |s| format!("{}{}", prefix, s))
            }
            CleaningRule::Suffix { value: suffix } => {
                map_scalar(value, |s| format!("{}{}", s, suffix))
            }
        }
    }
}

/// 执行单条规则（自由函数形式）
pub fn apply_rule(value: &CellValue, rule: &CleaningRule) -> RuleOutcome {
    rule.apply(value)
}

/// 按顺序执行一列的全部规则，遇 skip 立即停止
pub fn apply_column_rules(value: CellValue, rules: &[CleaningRule]) -> RuleOutcome {
    let mut outcome = RuleOutcome::keep(value);
    for rule in rules {
        outcome = rule.apply(&outcome.value);
        if outcome.skip {
            break;
        }
    }
    outcome
}

// ==========================================
// 辅助函数
// ==========================================

/// 仅作用于文本，其他值原样返回
fn map_text(value: &CellValue, f: impl FnOnce(&str) -> String) -> RuleOutcome {
    match value {
        CellValue::Text(s) => RuleOutcome::keep(CellValue::Text(f(s))),
        other => RuleOutcome::keep(other.clone()),
    }
}

/// 作用于任意非空标量（先转为字符串），Null 原样返回
fn map_scalar(value: &CellValue, f: impl FnOnce(&str) -> String) -> RuleOutcome {
    match value {
        CellValue::Null => RuleOutcome::keep(CellValue::Null),
        other => RuleOutcome::keep(CellValue::Text(f(&other.to_plain_string()))),
    }
}

fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_whitespace() {
            at_word_start = true;
            out.push(c);
        } else if at_word_start {
            out.extend(c.to_uppercase());
            at_word_start = false;
        } else {
            out.extend(c.to_lowercase());
        }
    }
    out
}

fn parse_number(value: &CellValue, strip_chars: Option<&str>) -> CellValue {
    let raw = match value {
        CellValue::Int(_) | CellValue::Float(_) => return value.clone(),
        CellValue::Text(s) => s,
        _ => return CellValue::Null,
    };

    let strip = strip_chars.unwrap_or(DEFAULT_NUMBER_STRIP);
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !strip.contains(*c) && !c.is_whitespace())
        .collect();

    if cleaned.is_empty() {
        return CellValue::Null;
    }
    if let Ok(i) = cleaned.parse::<i64>() {
        return CellValue::Int(i);
    }
    match cleaned.parse::<f64>() {
        Ok(f) if f.is_finite() => CellValue::Float(f),
        _ => CellValue::Null,
    }
}

fn parse_boolean(
    value: &CellValue,
    true_values: Option<&[String]>,
    false_values: Option<&[String]>,
) -> CellValue {
    let token = match value {
        CellValue::Bool(_) => return value.clone(),
        CellValue::Int(i) => i.to_string(),
        CellValue::Text(s) => s.trim().to_lowercase(),
        _ => return CellValue::Null,
    };

    let matches = |custom: Option<&[String]>, defaults: &[&str]| match custom {
        Some(list) => list.iter().any(|v| v.trim().to_lowercase() == token),
        None => defaults.contains(&token.as_str()),
    };

    if matches(true_values, DEFAULT_TRUE_VALUES) {
        CellValue::Bool(true)
    } else if matches(false_values, DEFAULT_FALSE_VALUES) {
        CellValue::Bool(false)
    } else {
        CellValue::Null
    }
}

fn parse_percentage(value: &CellValue, as_decimal: bool) -> CellValue {
    let number = match value {
        CellValue::Int(i) => Some(*i as f64),
        CellValue::Float(f) => Some(*f),
        CellValue::Text(s) => s.trim().trim_end_matches('%').trim().parse::<f64>().ok(),
        _ => None,
    };

    match number {
        Some(n) if n.is_finite() => CellValue::Float(if as_decimal { n / 100.0 } else { n }),
        _ => CellValue::Null,
    }
}

/// 声明格式（如 "MM/DD/YYYY"）转为 chrono 格式串；已含 % 的直接使用
fn to_chrono_format(format: &str) -> String {
    if format.contains('%') {
        return format.to_string();
    }
    format
        .replace("YYYY", "%Y")
        .replace("YY", "%y")
        .replace("MM", "%m")
        .replace("DD", "%d")
}

fn parse_date(value: &CellValue, format: Option<&str>) -> CellValue {
    let raw = match value {
        CellValue::Date(_) => return value.clone(),
        CellValue::Text(s) => s.trim(),
        _ => return CellValue::Null,
    };
    if raw.is_empty() {
        return CellValue::Null;
    }

    let parsed = match format.map(str::trim).filter(|f| !f.is_empty()) {
        Some(fmt) => NaiveDate::parse_from_str(raw, &to_chrono_format(fmt)).ok(),
        None => parse_date_any(raw),
    };

    parsed.map(CellValue::Date).unwrap_or(CellValue::Null)
}

/// 通用校验: normalize 返回 Some(规范值) 表示有效；空值放行
fn validate(
    value: &CellValue,
    on_invalid: OnInvalid,
    normalize: impl FnOnce(&str) -> Option<String>,
) -> RuleOutcome {
    if value.is_blank() {
        return RuleOutcome::keep(value.clone());
    }

    let text = value.to_plain_string();
    match normalize(&text) {
        Some(normalized) => RuleOutcome::keep(CellValue::Text(normalized)),
        None => match on_invalid {
            OnInvalid::Skip => RuleOutcome::skip(value.clone()),
            OnInvalid::Null => RuleOutcome::keep(CellValue::Null),
            OnInvalid::Keep => RuleOutcome::keep(value.clone()),
        },
    }
}

/// 电话号码规范化为 E.164（+国家码+号码）
///
/// - 带 '+': 8..=15 位数字
/// - 不带 '+': 10 位补默认国家码；11..=15 位视为已含国家码
pub fn normalize_phone(raw: &str, default_country_code: &str) -> Option<String> {
    let trimmed = raw.trim();
    if !PHONE_CHARS.is_match(trimmed) {
        return None;
    }

    let digits: String = trimmed.chars().filter(char::is_ascii_digit).collect();
    if trimmed.starts_with('+') {
        return (8..=15).contains(&digits.len()).then(|| format!("+{}", digits));
    }

    match digits.len() {
        10 => Some(format!("+{}{}", default_country_code, digits)),
        11..=15 => Some(format!("+{}", digits)),
        _ => None,
    }
}

fn find_replace(value: &CellValue, find: &str, replace: &str, use_regex: bool) -> RuleOutcome {
    if find.is_empty() {
        return RuleOutcome::keep(value.clone());
    }
    if !use_regex {
        return map_text(value, |s| s.replace(find, replace));
    }

    match Regex::new(find) {
        Ok(re) => map_text(value, |s| re.replace_all(s, replace).into_owned()),
        Err(e) => {
            warn!(pattern = %find, error = %e, "find_replace 正则无效，保留原值");
            RuleOutcome::keep(value.clone())
        }
    }
}

fn split(value: &CellValue, delimiter: &str, index: usize) -> RuleOutcome {
    match value {
        CellValue::Text(s) if !delimiter.is_empty() => {
            let part = s.split(delimiter).nth(index);
            RuleOutcome::keep(
                part.map(|p| CellValue::Text(p.trim().to_string()))
                    .unwrap_or(CellValue::Null),
            )
        }
        other => RuleOutcome::keep(other.clone()),
    }
}
