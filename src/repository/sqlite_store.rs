// ==========================================
// 会员数据导入同步 - SQLite 导入存储实现
// ==========================================
// 职责: 实现 ImportStore（使用 rusqlite）
// 红线: 存储层不含业务规则，只做数据 CRUD
// 约束: 动态表名 / 列名经白名单正则校验后以双引号引用，值一律参数化
// ==========================================

use crate::db::{configure_sqlite_connection, init_schema, open_sqlite_connection};
use crate::domain::column::ColumnConfiguration;
use crate::domain::data_source::{DataSource, DataSourceSyncUpdate};
use crate::domain::import_table::{ImportTable, TableColumn};
use crate::domain::mapping::FieldMapping;
use crate::domain::schedule::ScheduleConfiguration;
use crate::domain::sync_log::{RowError, SyncLog};
use crate::domain::types::{DataSourceStatus, DestinationType, SyncStatus};
use crate::domain::value::{CellValue, Record};
use crate::perf::{install_sqlite_tracing, PerfGuard};
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_store::ImportStore;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use rusqlite::types::{FromSql, FromSqlResult, ToSqlOutput, Value, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OptionalExtension, Params, Statement, ToSql};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard};
use tracing::debug;

static IDENTIFIER_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]{0,62}$").expect("Invalid identifier regex")
});

const ALLOWED_SQL_TYPES: &[&str] = &["TEXT", "INTEGER", "REAL", "NUMERIC", "BLOB"];

// ==========================================
// CellValue <-> SQLite 值
// ==========================================
// Bool 存为 0/1，Date 存为 ISO 文本
impl ToSql for CellValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            CellValue::Null => ToSqlOutput::Owned(Value::Null),
            CellValue::Bool(b) => ToSqlOutput::Owned(Value::Integer(i64::from(*b))),
            CellValue::Int(i) => ToSqlOutput::Owned(Value::Integer(*i)),
            CellValue::Float(f) => ToSqlOutput::Owned(Value::Real(*f)),
            CellValue::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
            CellValue::Date(d) => {
                ToSqlOutput::Owned(Value::Text(d.format("%Y-%m-%d").to_string()))
            }
        })
    }
}

impl FromSql for CellValue {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        Ok(match value {
            ValueRef::Null => CellValue::Null,
            ValueRef::Integer(i) => CellValue::Int(i),
            ValueRef::Real(f) => CellValue::Float(f),
            ValueRef::Text(t) | ValueRef::Blob(t) => {
                CellValue::Text(String::from_utf8_lossy(t).into_owned())
            }
        })
    }
}

/// 校验并引用标识符
pub fn quote_ident(name: &str) -> RepositoryResult<String> {
    if !IDENTIFIER_REGEX.is_match(name) {
        return Err(RepositoryError::InvalidIdentifier(name.to_string()));
    }
    Ok(format!("\"{}\"", name))
}

fn checked_sql_type(sql_type: &str) -> RepositoryResult<&'static str> {
    let upper = sql_type.trim().to_uppercase();
    ALLOWED_SQL_TYPES
        .iter()
        .find(|t| **t == upper)
        .copied()
        .ok_or_else(|| RepositoryError::InvalidIdentifier(sql_type.to_string()))
}

fn enum_to_str<T: Serialize>(value: &T) -> RepositoryResult<String> {
    match serde_json::to_value(value)? {
        serde_json::Value::String(s) => Ok(s),
        other => Ok(other.to_string()),
    }
}

fn enum_from_str<T: DeserializeOwned>(raw: &str) -> RepositoryResult<T> {
    Ok(serde_json::from_value(serde_json::Value::String(
        raw.to_string(),
    ))?)
}

/// 按列名读取结果集为行记录
fn collect_records<P: Params>(stmt: &mut Statement<'_>, params: P) -> RepositoryResult<Vec<Record>> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let rows = stmt.query_map(params, |row| {
        let mut record = Record::new();
        for (idx, name) in names.iter().enumerate() {
            record.insert(name.clone(), row.get::<_, CellValue>(idx)?);
        }
        Ok(record)
    })?;
    Ok(rows.collect::<Result<Vec<_>, _>>()?)
}

fn insert_sql(table: &str, row: &Record) -> RepositoryResult<String> {
    let table = quote_ident(table)?;
    if row.is_empty() {
        return Ok(format!("INSERT INTO {} DEFAULT VALUES", table));
    }

    let columns = row
        .keys()
        .map(|k| quote_ident(k))
        .collect::<RepositoryResult<Vec<_>>>()?;
    let placeholders: Vec<String> = (1..=columns.len()).map(|i| format!("?{}", i)).collect();

    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table,
        columns.join(", "),
        placeholders.join(", ")
    ))
}

// ==========================================
// 持久化行结构（JSON 列解析前）
// ==========================================
struct SyncLogRow {
    log_id: String,
    data_source_id: String,
    status: String,
    started_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    records_processed: i64,
    records_imported: i64,
    records_skipped: i64,
    records_failed: i64,
    errors: String,
    error_message: Option<String>,
}

impl SyncLogRow {
    const COLUMNS: &'static str = "log_id, data_source_id, status, started_at, completed_at, \
        records_processed, records_imported, records_skipped, records_failed, errors, error_message";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            log_id: row.get(0)?,
            data_source_id: row.get(1)?,
            status: row.get(2)?,
            started_at: row.get(3)?,
            completed_at: row.get(4)?,
            records_processed: row.get(5)?,
            records_imported: row.get(6)?,
            records_skipped: row.get(7)?,
            records_failed: row.get(8)?,
            errors: row.get(9)?,
            error_message: row.get(10)?,
        })
    }

    fn into_domain(self) -> RepositoryResult<SyncLog> {
        let errors: Vec<RowError> = serde_json::from_str(&self.errors)?;
        Ok(SyncLog {
            log_id: self.log_id,
            data_source_id: self.data_source_id,
            status: SyncStatus::parse(&self.status),
            started_at: self.started_at,
            completed_at: self.completed_at,
            records_processed: self.records_processed.max(0) as usize,
            records_imported: self.records_imported.max(0) as usize,
            records_skipped: self.records_skipped.max(0) as usize,
            records_failed: self.records_failed.max(0) as usize,
            errors,
            error_message: self.error_message,
        })
    }
}

struct DataSourceRow {
    data_source_id: String,
    name: String,
    site_id: Option<String>,
    destination_type: String,
    table_name: Option<String>,
    column_config: String,
    field_mappings: String,
    schedule: String,
    status: String,
    last_sync_at: Option<DateTime<Utc>>,
    last_sync_status: Option<String>,
    next_sync_at: Option<DateTime<Utc>>,
    retry_attempt: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl DataSourceRow {
    const COLUMNS: &'static str = "data_source_id, name, site_id, destination_type, table_name, \
        column_config, field_mappings, schedule, status, last_sync_at, last_sync_status, \
        next_sync_at, retry_attempt, created_at, updated_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            data_source_id: row.get(0)?,
            name: row.get(1)?,
            site_id: row.get(2)?,
            destination_type: row.get(3)?,
            table_name: row.get(4)?,
            column_config: row.get(5)?,
            field_mappings: row.get(6)?,
            schedule: row.get(7)?,
            status: row.get(8)?,
            last_sync_at: row.get(9)?,
            last_sync_status: row.get(10)?,
            next_sync_at: row.get(11)?,
            retry_attempt: row.get(12)?,
            created_at: row.get(13)?,
            updated_at: row.get(14)?,
        })
    }

    fn into_domain(self) -> RepositoryResult<DataSource> {
        let destination_type: DestinationType = enum_from_str(&self.destination_type)?;
        let column_config: ColumnConfiguration = serde_json::from_str(&self.column_config)?;
        let field_mappings: Vec<FieldMapping> = serde_json::from_str(&self.field_mappings)?;
        let schedule: ScheduleConfiguration = serde_json::from_str(&self.schedule)?;

        Ok(DataSource {
            data_source_id: self.data_source_id,
            name: self.name,
            site_id: self.site_id,
            destination_type,
            table_name: self.table_name,
            column_config,
            field_mappings,
            schedule,
            status: DataSourceStatus::parse(&self.status),
            last_sync_at: self.last_sync_at,
            last_sync_status: self.last_sync_status.as_deref().map(SyncStatus::parse),
            next_sync_at: self.next_sync_at,
            retry_attempt: self.retry_attempt.max(0) as u32,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

struct ImportTableRow {
    table_name: String,
    label: String,
    data_source_id: Option<String>,
    columns: String,
    row_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl ImportTableRow {
    const COLUMNS: &'static str =
        "table_name, label, data_source_id, columns, row_count, created_at, updated_at";

    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            table_name: row.get(0)?,
            label: row.get(1)?,
            data_source_id: row.get(2)?,
            columns: row.get(3)?,
            row_count: row.get(4)?,
            created_at: row.get(5)?,
            updated_at: row.get(6)?,
        })
    }

    fn into_domain(self) -> RepositoryResult<ImportTable> {
        Ok(ImportTable {
            table_name: self.table_name,
            label: self.label,
            data_source_id: self.data_source_id,
            columns: serde_json::from_str(&self.columns)?,
            row_count: self.row_count,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

// ==========================================
// SqliteImportStore
// ==========================================
pub struct SqliteImportStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteImportStore {
    /// 打开数据库文件并建表
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn open(db_path: &str) -> RepositoryResult<Self> {
        let mut conn = open_sqlite_connection(db_path)?;
        install_sqlite_tracing(&mut conn);
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 内存数据库（测试用）
    pub fn open_in_memory() -> RepositoryResult<Self> {
        let conn = Connection::open_in_memory()?;
        configure_sqlite_connection(&conn)?;
        init_schema(&conn)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建（会再次应用统一 PRAGMA 并建表，均幂等）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> RepositoryResult<Self> {
        {
            let guard = conn
                .lock()
                .map_err(|e| RepositoryError::LockError(e.to_string()))?;
            configure_sqlite_connection(&guard)?;
            init_schema(&guard)?;
        }
        Ok(Self { conn })
    }

    /// 共享连接（供 ConfigManager 等复用）
    pub fn connection(&self) -> Arc<Mutex<Connection>> {
        Arc::clone(&self.conn)
    }

    fn lock(&self) -> RepositoryResult<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|e| RepositoryError::LockError(e.to_string()))
    }
}

#[async_trait]
impl ImportStore for SqliteImportStore {
    async fn insert_row(&self, table: &str, row: &Record) -> RepositoryResult<()> {
        let sql = insert_sql(table, row)?;
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(&sql)?;
        stmt.execute(params_from_iter(row.values()))?;
        Ok(())
    }

    async fn insert_rows(&self, table: &str, rows: &[Record]) -> RepositoryResult<usize> {
        let _perf = PerfGuard::new("store_insert_rows");
        let statements = rows
            .iter()
            .map(|row| insert_sql(table, row))
            .collect::<RepositoryResult<Vec<_>>>()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        for (sql, row) in statements.iter().zip(rows) {
            let mut stmt = tx.prepare_cached(sql)?;
            stmt.execute(params_from_iter(row.values()))?;
        }
        tx.commit()?;

        debug!(table = %table, count = rows.len(), "批量写入完成");
        Ok(rows.len())
    }

    async fn find_one(&self, table: &str, criteria: &Record) -> RepositoryResult<Option<Record>> {
        let mut clauses = Vec::with_capacity(criteria.len());
        let mut values: Vec<&CellValue> = Vec::with_capacity(criteria.len());
        for (column, value) in criteria {
            let column = quote_ident(column)?;
            if value.is_null() {
                clauses.push(format!("{} IS NULL", column));
            } else {
                values.push(value);
                clauses.push(format!("{} = ?{}", column, values.len()));
            }
        }

        let where_clause = if clauses.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", clauses.join(" AND "))
        };
        let sql = format!(
            "SELECT * FROM {}{} ORDER BY rowid LIMIT 1",
            quote_ident(table)?,
            where_clause
        );

        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let mut records = collect_records(&mut stmt, params_from_iter(values))?;
        Ok(records.pop())
    }

    async fn query_rows(
        &self,
        table: &str,
        limit: usize,
        offset: usize,
    ) -> RepositoryResult<Vec<Record>> {
        let sql = format!(
            "SELECT * FROM {} ORDER BY rowid LIMIT ?1 OFFSET ?2",
            quote_ident(table)?
        );
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        collect_records(&mut stmt, params![limit as i64, offset as i64])
    }

    async fn count_rows(&self, table: &str) -> RepositoryResult<i64> {
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(table)?);
        let conn = self.lock()?;
        Ok(conn.query_row(&sql, [], |row| row.get(0))?)
    }

    async fn create_table(&self, table: &str, columns: &[TableColumn]) -> RepositoryResult<()> {
        let mut defs = vec![
            "\"id\" TEXT PRIMARY KEY NOT NULL".to_string(),
            "\"imported_at\" TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ', 'now'))"
                .to_string(),
        ];
        for column in columns {
            defs.push(format!(
                "{} {}",
                quote_ident(&column.name)?,
                checked_sql_type(&column.sql_type)?
            ));
        }
        let sql = format!("CREATE TABLE {} ({})", quote_ident(table)?, defs.join(", "));

        let conn = self.lock()?;
        conn.execute_batch(&sql)?;
        debug!(table = %table, columns = columns.len(), "动态表已创建");
        Ok(())
    }

    async fn drop_table(&self, table: &str) -> RepositoryResult<()> {
        let sql = format!("DROP TABLE IF EXISTS {}", quote_ident(table)?);
        let conn = self.lock()?;
        conn.execute_batch(&sql)?;
        Ok(())
    }

    async fn truncate_table(&self, table: &str) -> RepositoryResult<usize> {
        let sql = format!("DELETE FROM {}", quote_ident(table)?);
        let conn = self.lock()?;
        Ok(conn.execute(&sql, [])?)
    }

    async fn table_exists(&self, table: &str) -> RepositoryResult<bool> {
        let conn = self.lock()?;
        let exists = conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![table],
                |_row| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        Ok(exists)
    }

    async fn table_columns(&self, table: &str) -> RepositoryResult<Vec<TableColumn>> {
        let sql = format!("PRAGMA table_info({})", quote_ident(table)?);
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&sql)?;
        let columns = stmt
            .query_map([], |row| {
                let name: String = row.get(1)?;
                let sql_type: String = row.get(2)?;
                Ok(TableColumn::new(&name, &sql_type))
            })?
            .collect::<Result<Vec<_>, _>>()?;

        if columns.is_empty() {
            return Err(RepositoryError::NotFound {
                entity: "table".to_string(),
                id: table.to_string(),
            });
        }
        Ok(columns)
    }

    async fn add_column(&self, table: &str, column: &TableColumn) -> RepositoryResult<()> {
        let sql = format!(
            "ALTER TABLE {} ADD COLUMN {} {}",
            quote_ident(table)?,
            quote_ident(&column.name)?,
            checked_sql_type(&column.sql_type)?
        );
        let conn = self.lock()?;
        conn.execute_batch(&sql)?;
        Ok(())
    }

    async fn register_import_table(&self, table: &ImportTable) -> RepositoryResult<()> {
        let columns = serde_json::to_string(&table.columns)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO import_table (
                table_name, label, data_source_id, columns, row_count, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (table_name) DO UPDATE SET
                label = excluded.label,
                data_source_id = excluded.data_source_id,
                columns = excluded.columns,
                row_count = excluded.row_count,
                updated_at = excluded.updated_at
            "#,
            params![
                table.table_name,
                table.label,
                table.data_source_id,
                columns,
                table.row_count,
                table.created_at,
                table.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn deregister_import_table(&self, table_name: &str) -> RepositoryResult<bool> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "DELETE FROM import_table WHERE table_name = ?1",
            params![table_name],
        )?;
        Ok(affected > 0)
    }

    async fn get_import_table(&self, table_name: &str) -> RepositoryResult<Option<ImportTable>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!(
                    "SELECT {} FROM import_table WHERE table_name = ?1",
                    ImportTableRow::COLUMNS
                ),
                params![table_name],
                ImportTableRow::from_row,
            )
            .optional()?
        };
        raw.map(ImportTableRow::into_domain).transpose()
    }

    async fn list_import_tables(&self) -> RepositoryResult<Vec<ImportTable>> {
        let raws = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM import_table ORDER BY created_at, table_name",
                ImportTableRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map([], ImportTableRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        raws.into_iter().map(ImportTableRow::into_domain).collect()
    }

    async fn set_import_table_row_count(
        &self,
        table_name: &str,
        row_count: i64,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE import_table SET row_count = ?1, updated_at = ?2 WHERE table_name = ?3",
            params![row_count, updated_at, table_name],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "import_table".to_string(),
                id: table_name.to_string(),
            });
        }
        Ok(())
    }

    async fn upsert_sync_log(&self, log: &SyncLog) -> RepositoryResult<()> {
        let errors = serde_json::to_string(&log.errors)?;
        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO sync_log (
                log_id, data_source_id, status, started_at, completed_at,
                records_processed, records_imported, records_skipped, records_failed,
                errors, error_message
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            ON CONFLICT (log_id) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at,
                records_processed = excluded.records_processed,
                records_imported = excluded.records_imported,
                records_skipped = excluded.records_skipped,
                records_failed = excluded.records_failed,
                errors = excluded.errors,
                error_message = excluded.error_message
            "#,
            params![
                log.log_id,
                log.data_source_id,
                log.status.as_str(),
                log.started_at,
                log.completed_at,
                log.records_processed as i64,
                log.records_imported as i64,
                log.records_skipped as i64,
                log.records_failed as i64,
                errors,
                log.error_message,
            ],
        )?;
        Ok(())
    }

    async fn get_sync_log(&self, log_id: &str) -> RepositoryResult<Option<SyncLog>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!("SELECT {} FROM sync_log WHERE log_id = ?1", SyncLogRow::COLUMNS),
                params![log_id],
                SyncLogRow::from_row,
            )
            .optional()?
        };
        raw.map(SyncLogRow::into_domain).transpose()
    }

    async fn list_sync_logs(
        &self,
        data_source_id: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<SyncLog>> {
        let raws = {
            let conn = self.lock()?;
            let mut stmt = conn.prepare(&format!(
                "SELECT {} FROM sync_log WHERE data_source_id = ?1 \
                 ORDER BY started_at DESC, rowid DESC LIMIT ?2",
                SyncLogRow::COLUMNS
            ))?;
            let rows = stmt
                .query_map(params![data_source_id, limit as i64], SyncLogRow::from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };
        raws.into_iter().map(SyncLogRow::into_domain).collect()
    }

    async fn upsert_data_source(&self, source: &DataSource) -> RepositoryResult<()> {
        let destination_type = enum_to_str(&source.destination_type)?;
        let column_config = serde_json::to_string(&source.column_config)?;
        let field_mappings = serde_json::to_string(&source.field_mappings)?;
        let schedule = serde_json::to_string(&source.schedule)?;

        let conn = self.lock()?;
        conn.execute(
            r#"
            INSERT INTO data_source (
                data_source_id, name, site_id, destination_type, table_name,
                column_config, field_mappings, schedule, status, last_sync_at,
                last_sync_status, next_sync_at, retry_attempt, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)
            ON CONFLICT (data_source_id) DO UPDATE SET
                name = excluded.name,
                site_id = excluded.site_id,
                destination_type = excluded.destination_type,
                table_name = excluded.table_name,
                column_config = excluded.column_config,
                field_mappings = excluded.field_mappings,
                schedule = excluded.schedule,
                status = excluded.status,
                last_sync_at = excluded.last_sync_at,
                last_sync_status = excluded.last_sync_status,
                next_sync_at = excluded.next_sync_at,
                retry_attempt = excluded.retry_attempt,
                updated_at = excluded.updated_at
            "#,
            params![
                source.data_source_id,
                source.name,
                source.site_id,
                destination_type,
                source.table_name,
                column_config,
                field_mappings,
                schedule,
                source.status.as_str(),
                source.last_sync_at,
                source.last_sync_status.map(|s| s.as_str()),
                source.next_sync_at,
                source.retry_attempt,
                source.created_at,
                source.updated_at,
            ],
        )?;
        Ok(())
    }

    async fn get_data_source(&self, data_source_id: &str) -> RepositoryResult<Option<DataSource>> {
        let raw = {
            let conn = self.lock()?;
            conn.query_row(
                &format!(
                    "SELECT {} FROM data_source WHERE data_source_id = ?1",
                    DataSourceRow::COLUMNS
                ),
                params![data_source_id],
                DataSourceRow::from_row,
            )
            .optional()?
        };
        raw.map(DataSourceRow::into_domain).transpose()
    }

    async fn set_data_source_status(
        &self,
        data_source_id: &str,
        status: DataSourceStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let affected = conn.execute(
            "UPDATE data_source SET status = ?1, updated_at = ?2 WHERE data_source_id = ?3",
            params![status.as_str(), updated_at, data_source_id],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "data_source".to_string(),
                id: data_source_id.to_string(),
            });
        }
        Ok(())
    }

    async fn update_data_source_sync(
        &self,
        data_source_id: &str,
        update: &DataSourceSyncUpdate,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        let conn = self.lock()?;
        let affected = conn.execute(
            r#"
            UPDATE data_source SET
                status = ?1,
                last_sync_at = ?2,
                last_sync_status = ?3,
                next_sync_at = ?4,
                retry_attempt = ?5,
                updated_at = ?6
            WHERE data_source_id = ?7
            "#,
            params![
                update.status.as_str(),
                update.last_sync_at,
                update.last_sync_status.map(|s| s.as_str()),
                update.next_sync_at,
                update.retry_attempt,
                updated_at,
                data_source_id,
            ],
        )?;
        if affected == 0 {
            return Err(RepositoryError::NotFound {
                entity: "data_source".to_string(),
                id: data_source_id.to_string(),
            });
        }
        Ok(())
    }
}
