// ==========================================
// 会员数据导入同步 - 清洗规则定义
// ==========================================
// 存储: data_source.column_config_json（按数据源持久化）
// 执行: importer::cleaning_rules
// ==========================================

use serde::{Deserialize, Serialize};

/// 校验失败时的处理策略
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OnInvalid {
    /// 跳过整行
    Skip,
    /// 置空
    #[default]
    Null,
    /// 保留原值
    Keep,
}

// ==========================================
// CleaningRule - 单步清洗规则
// ==========================================
// JSON 形如 {"type": "parse_number", "strip_chars": "$,"}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CleaningRule {
    // ===== 空白 =====
    Trim,
    CollapseWhitespace,

    // ===== 大小写 =====
    Lowercase,
    Uppercase,
    TitleCase,

    // ===== 空值处理 =====
    NullToDefault {
        default: String,
    },
    EmptyToNull,
    SkipIfEmpty,

    // ===== 类型转换 =====
    ParseNumber {
        #[serde(default)]
        strip_chars: Option<String>,
    },
    ParseBoolean {
        #[serde(default)]
        true_values: Option<Vec<String>>,
        #[serde(default)]
        false_values: Option<Vec<String>>,
    },
    ParsePercentage {
        #[serde(default)]
        as_decimal: bool,
    },
    ParseDate {
        /// 源格式，如 "MM/DD/YYYY"；缺省自动识别
        #[serde(default)]
        format: Option<String>,
    },

    // ===== 校验 =====
    ValidateEmail {
        #[serde(default)]
        on_invalid: OnInvalid,
    },
    ValidatePhone {
        #[serde(default)]
        on_invalid: OnInvalid,
        /// 10 位本地号码补全的国家码，缺省 "1"
        #[serde(default)]
        default_country_code: Option<String>,
    },
    ValidateUrl {
        #[serde(default)]
        on_invalid: OnInvalid,
    },

    // ===== 变换 =====
    FindReplace {
        find: String,
        #[serde(default)]
        replace: String,
        #[serde(default)]
        use_regex: bool,
    },
    Split {
        delimiter: String,
        #[serde(default)]
        index: usize,
    },
    Prefix {
        value: String,
    },
    Suffix {
        value: String,
    },
}
