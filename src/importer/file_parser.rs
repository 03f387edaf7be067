// ==========================================
// 会员数据导入同步 - 文件解析器实现
// ==========================================
// 职责: 分隔文本 / Excel → 表头 + 数据行
// 支持: 引号字段（含分隔符、换行、"" 转义），\n 与 \r\n 行尾
// ==========================================

use crate::domain::value::{CellValue, Record};
use crate::importer::error::{ImportError, ImportResult};
use calamine::{open_workbook, Reader, Xlsx};
use csv::{ReaderBuilder, WriterBuilder};
use serde::{Deserialize, Serialize};
use std::path::Path;

// ==========================================
// ParsedTable - 解析结果
// ==========================================
// 不变式: 每个数据行的列数 == headers.len()
//        全空行不进入 rows，但计入 total_rows
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParsedTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub total_rows: usize,
}

impl ParsedTable {
    /// 按表头转为文本行记录
    pub fn records(&self) -> Vec<Record> {
        self.rows
            .iter()
            .map(|row| {
                self.headers
                    .iter()
                    .zip(row.iter())
                    .map(|(h, v)| (h.clone(), CellValue::Text(v.clone())))
                    .collect()
            })
            .collect()
    }

    /// 第 idx 列的全部值
    pub fn column_values(&self, idx: usize) -> Vec<&str> {
        self.rows
            .iter()
            .filter_map(|row| row.get(idx).map(String::as_str))
            .collect()
    }
}

/// 解析分隔文本
///
/// # 参数
/// - text: 原始文本
/// - delimiter: 分隔符（默认 ','，须为 ASCII）
///
/// # 返回
/// - Ok(ParsedTable): 首个非空行为表头
/// - Err: 分隔符无效 / 记录格式错误
pub fn parse_delimited(text: &str, delimiter: char) -> ImportResult<ParsedTable> {
    if !delimiter.is_ascii() {
        return Err(ImportError::InvalidDelimiter(delimiter));
    }

    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true) // 允许行长度不一致，后续补齐/截断
        .delimiter(delimiter as u8)
        .from_reader(text.as_bytes());

    let mut table = ParsedTable::default();
    let mut header_seen = false;

    for result in reader.records() {
        let record = result?;
        let all_empty = record.iter().all(|field| field.trim().is_empty());

        if !header_seen {
            // 表头: 首个非空行
            if all_empty {
                continue;
            }
            table.headers = record.iter().map(|h| h.trim().to_string()).collect();
            header_seen = true;
            continue;
        }

        table.total_rows += 1;

        // 跳过完全空白的行
        if all_empty {
            continue;
        }

        let mut row: Vec<String> = record.iter().map(str::to_string).collect();
        row.resize(table.headers.len(), String::new());
        table.rows.push(row);
    }

    Ok(table)
}

/// 以逗号解析
pub fn parse_csv(text: &str) -> ImportResult<ParsedTable> {
    parse_delimited(text, ',')
}

/// 解析 CSV 文本为行记录
///
/// columns 非空时按位置命名各列（首行视为表头并跳过）；为空时沿用文本表头
pub fn from_csv_string(text: &str, columns: &[String]) -> ImportResult<Vec<Record>> {
    let mut table = parse_csv(text)?;
    if !columns.is_empty() {
        let width = table.headers.len();
        table.headers = columns.to_vec();
        table.headers.resize(width.max(columns.len()), String::new());
        for row in &mut table.rows {
            row.resize(table.headers.len(), String::new());
        }
    }
    Ok(table.records())
}

/// 行记录输出为 CSV 文本（首行为表头，缺失列输出空串）
pub fn to_csv_string(records: &[Record], columns: &[String]) -> ImportResult<String> {
    let mut writer = WriterBuilder::new().from_writer(Vec::new());
    writer.write_record(columns)?;
    for record in records {
        let values: Vec<String> = columns
            .iter()
            .map(|col| {
                record
                    .get(col)
                    .map(CellValue::to_plain_string)
                    .unwrap_or_default()
            })
            .collect();
        writer.write_record(&values)?;
    }
    let bytes = writer
        .into_inner()
        .map_err(|e| ImportError::CsvParseError(e.to_string()))?;
    String::from_utf8(bytes).map_err(|e| ImportError::CsvParseError(e.to_string()))
}

// ==========================================
// FileParser Trait
// ==========================================
// 实现者: CsvParser, ExcelParser
pub trait FileParser: Send + Sync {
    fn parse_file(&self, file_path: &Path) -> ImportResult<ParsedTable>;
}

fn ensure_exists(path: &Path) -> ImportResult<()> {
    if !path.exists() {
        return Err(ImportError::FileNotFound(path.display().to_string()));
    }
    Ok(())
}

fn extension_of(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase()
}

// ==========================================
// CSV Parser 实现
// ==========================================
pub struct CsvParser {
    pub delimiter: char,
}

impl Default for CsvParser {
    fn default() -> Self {
        Self { delimiter: ',' }
    }
}

impl FileParser for CsvParser {
    fn parse_file(&self, file_path: &Path) -> ImportResult<ParsedTable> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if !matches!(ext.as_str(), "csv" | "txt" | "tsv") {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let text = std::fs::read_to_string(file_path)?;
        // 去除 UTF-8 BOM
        let text = text.strip_prefix('\u{feff}').unwrap_or(&text);
        parse_delimited(text, self.delimiter)
    }
}

// ==========================================
// Excel Parser 实现
// ==========================================
pub struct ExcelParser;

impl FileParser for ExcelParser {
    fn parse_file(&self, file_path: &Path) -> ImportResult<ParsedTable> {
        ensure_exists(file_path)?;

        let ext = extension_of(file_path);
        if ext != "xlsx" {
            return Err(ImportError::UnsupportedFormat(ext));
        }

        let mut workbook: Xlsx<_> = open_workbook(file_path)?;

        // 读取第一个 sheet
        let sheet_name = workbook
            .sheet_names()
            .first()
            .cloned()
            .ok_or_else(|| ImportError::ExcelParseError("Excel 文件无工作表".to_string()))?;
        let range = workbook.worksheet_range(&sheet_name)?;

        let mut table = ParsedTable::default();
        let mut header_seen = false;

        for data_row in range.rows() {
            let cells: Vec<String> = data_row.iter().map(|cell| cell.to_string()).collect();
            let all_empty = cells.iter().all(|c| c.trim().is_empty());

            if !header_seen {
                if all_empty {
                    continue;
                }
                table.headers = cells.iter().map(|h| h.trim().to_string()).collect();
                header_seen = true;
                continue;
            }

            table.total_rows += 1;
            if all_empty {
                continue;
            }

            let mut row = cells;
            row.resize(table.headers.len(), String::new());
            table.rows.push(row);
        }

        Ok(table)
    }
}

// ==========================================
// 通用文件解析器（根据扩展名自动选择）
// ==========================================
pub struct UniversalFileParser;

impl UniversalFileParser {
    pub fn parse<P: AsRef<Path>>(&self, file_path: P) -> ImportResult<ParsedTable> {
        let path = file_path.as_ref();
        match extension_of(path).as_str() {
            "csv" | "txt" => CsvParser::default().parse_file(path),
            "tsv" => CsvParser { delimiter: '\t' }.parse_file(path),
            "xlsx" => ExcelParser.parse_file(path),
            other => Err(ImportError::UnsupportedFormat(other.to_string())),
        }
    }
}
