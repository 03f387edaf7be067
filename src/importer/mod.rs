// ==========================================
// 会员数据导入同步 - 导入层
// ==========================================
// 职责: 文件解析 → 类型识别 → 单元格清洗 → 行过滤/去重 → 字段映射
// 支持: CSV / TSV / TXT / Excel (.xlsx)
// ==========================================

// 模块声明
pub mod cleaning_rules;
pub mod conflict_handler;
pub mod data_cleaner;
pub mod error;
pub mod field_mapper;
pub mod file_parser;
pub mod row_filter;
pub mod type_detector;

// 重导出核心类型
pub use cleaning_rules::{apply_column_rules, apply_rule, RuleOutcome};
pub use conflict_handler::{deduplicate, detect_duplicates, duplicate_keep_mask, get_row_key};
pub use data_cleaner::{process_rows, suggest_column_configuration, ProcessedRows};
pub use error::{ImportError, ImportResult};
pub use field_mapper::{
    map_row_to_destination, normalize_mappings, suggest_field_mappings, validate_mappings,
};
pub use file_parser::{
    parse_csv, parse_delimited, CsvParser, ExcelParser, FileParser, ParsedTable,
    UniversalFileParser,
};
pub use row_filter::{matches_filter, should_include_row};
pub use type_detector::{analyze_columns, detect_column_type, detect_value_type};
