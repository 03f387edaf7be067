// ==========================================
// 会员数据导入同步 - 导入表管理器
// ==========================================
// 职责: custom 目标的动态建表 / 注册 / 分页查询 / 分批写入
// 红线: 不拼业务 SQL，表结构操作全部经 ImportStore
// ==========================================

use crate::domain::column::ColumnPreview;
use crate::domain::import_table::{BatchProgress, ImportTable, RowPage, TableColumn};
use crate::domain::sync_log::RowError;
use crate::domain::types::ColumnType;
use crate::domain::value::{CellValue, Record};
use crate::ids::IdGenerator;
use crate::importer::field_mapper::normalize_identifier;
use crate::repository::error::{RepositoryError, RepositoryResult};
use crate::repository::import_store::ImportStore;
use crate::repository::sqlite_store::quote_ident;
use chrono::Utc;
use std::collections::{BTreeSet, HashSet};
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// 表名主体最大长度（不含后缀）
const MAX_TABLE_SLUG_LEN: usize = 48;

/// 列名最大长度（标识符上限 63，预留去重后缀）
const MAX_COLUMN_NAME_LEN: usize = 56;

/// 每张动态表自带的列
pub const RESERVED_COLUMNS: &[&str] = &["id", "imported_at"];

/// 分页查询单页上限
pub const MAX_PAGE_SIZE: usize = 1000;

// ==========================================
// 分批写入结果
// ==========================================
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchInsertReport {
    pub inserted: usize,
    pub failed: Vec<RowError>, // 行号为输入中的 1 起始序号
    pub batches_run: usize,
    pub stopped_early: bool, // 进度回调要求停止
}

/// 基础设施错误中止分批写入（已提交批次不回滚）
#[derive(Debug, Error)]
#[error("分批写入中止（已写入 {} 行）: {source}", .report.inserted)]
pub struct BatchInsertAborted {
    pub report: BatchInsertReport,
    #[source]
    pub source: RepositoryError,
}

/// 转为 ASCII 标识符片段（非 ASCII 字母数字折叠为 '_'）
fn ascii_slug(raw: &str) -> String {
    let ascii: String = normalize_identifier(raw)
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    normalize_identifier(&ascii)
}

fn truncate_slug(slug: &str, max_len: usize) -> String {
    if slug.len() <= max_len {
        return slug.to_string();
    }
    slug[..max_len].trim_end_matches('_').to_string()
}

/// 列名规范化与去重
///
/// 空名 → "column"，数字开头加 "c_" 前缀；
/// 与保留列或已有列冲突时追加 "_2"、"_3" …
pub fn sanitize_column_names<S: AsRef<str>>(names: &[S], existing: &[String]) -> Vec<String> {
    let mut used: HashSet<String> = RESERVED_COLUMNS.iter().map(|c| c.to_string()).collect();
    used.extend(existing.iter().map(|c| c.to_lowercase()));

    names
        .iter()
        .map(|name| {
            let mut base = ascii_slug(name.as_ref());
            if base.is_empty() {
                base = "column".to_string();
            }
            if base.starts_with(|c: char| c.is_ascii_digit()) {
                base = format!("c_{}", base);
            }
            let base = truncate_slug(&base, MAX_COLUMN_NAME_LEN);

            let mut candidate = base.clone();
            let mut n = 2;
            while used.contains(&candidate) {
                candidate = format!("{}_{}", base, n);
                n += 1;
            }
            used.insert(candidate.clone());
            candidate
        })
        .collect()
}

// ==========================================
// ImportTableManager - 导入表管理器
// ==========================================
pub struct ImportTableManager {
    store: Arc<dyn ImportStore>,
    ids: Arc<dyn IdGenerator>,
}

impl ImportTableManager {
    pub fn new(store: Arc<dyn ImportStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { store, ids }
    }

    /// 由标签生成表名
    ///
    /// 例: "Spring Members 2024" → "spring_members_2024_3fa9c1"
    pub fn generate_table_name(&self, label: &str) -> String {
        let mut slug = ascii_slug(label);
        if slug.is_empty() {
            slug = "import".to_string();
        }
        if slug.starts_with(|c: char| c.is_ascii_digit()) {
            slug = format!("t_{}", slug);
        }
        format!(
            "{}_{}",
            truncate_slug(&slug, MAX_TABLE_SLUG_LEN),
            self.ids.short_suffix()
        )
    }

    /// 按列预览建表并注册
    ///
    /// # 参数
    /// - label: 展示名称（同时用于生成表名）
    /// - previews: 列预览（列类型决定 SQL 类型）
    /// - data_source_id: 归属数据源
    ///
    /// # 返回
    /// 已注册的表元数据
    #[instrument(skip(self, previews), fields(columns = previews.len()))]
    pub async fn create_table(
        &self,
        label: &str,
        previews: &[ColumnPreview],
        data_source_id: Option<&str>,
    ) -> RepositoryResult<ImportTable> {
        let table_name = self.generate_table_name(label);
        let names: Vec<&str> = previews.iter().map(|p| p.name.as_str()).collect();
        let sanitized = sanitize_column_names(&names, &[]);

        let columns: Vec<TableColumn> = previews
            .iter()
            .zip(sanitized)
            .map(|(preview, name)| TableColumn {
                name,
                sql_type: preview.detected_type.sql_type().to_string(),
                source_name: Some(preview.name.clone()),
            })
            .collect();

        self.store.create_table(&table_name, &columns).await?;

        let now = Utc::now();
        let table = ImportTable {
            table_name,
            label: label.to_string(),
            data_source_id: data_source_id.map(str::to_string),
            columns,
            row_count: 0,
            created_at: now,
            updated_at: now,
        };
        self.register(&table).await?;

        info!(table = %table.table_name, columns = table.columns.len(), "导入表已创建");
        Ok(table)
    }

    /// 写入或覆盖注册表项
    pub async fn register(&self, table: &ImportTable) -> RepositoryResult<()> {
        self.store.register_import_table(table).await
    }

    pub async fn get(&self, table_name: &str) -> RepositoryResult<Option<ImportTable>> {
        self.store.get_import_table(table_name).await
    }

    pub async fn list(&self) -> RepositoryResult<Vec<ImportTable>> {
        self.store.list_import_tables().await
    }

    /// 按实际行数刷新注册表
    ///
    /// # 返回
    /// 当前行数（未注册的表只返回行数）
    pub async fn update_row_count(&self, table_name: &str) -> RepositoryResult<i64> {
        let count = self.store.count_rows(table_name).await?;
        if self.store.get_import_table(table_name).await?.is_some() {
            self.store
                .set_import_table_row_count(table_name, count, Utc::now())
                .await?;
        }
        Ok(count)
    }

    /// 注销并删除表
    ///
    /// # 返回
    /// - Ok(true): 表曾注册
    pub async fn drop_table(&self, table_name: &str) -> RepositoryResult<bool> {
        quote_ident(table_name)?;
        let was_registered = self.store.deregister_import_table(table_name).await?;
        self.store.drop_table(table_name).await?;
        info!(table = %table_name, was_registered, "导入表已删除");
        Ok(was_registered)
    }

    /// 清空表（注册表行数归零）
    pub async fn truncate(&self, table_name: &str) -> RepositoryResult<usize> {
        let removed = self.store.truncate_table(table_name).await?;
        if self.store.get_import_table(table_name).await?.is_some() {
            self.store
                .set_import_table_row_count(table_name, 0, Utc::now())
                .await?;
        }
        info!(table = %table_name, removed, "导入表已清空");
        Ok(removed)
    }

    /// 分页查询
    ///
    /// # 参数
    /// - page: 1 起始（0 视为 1）
    /// - page_size: 限定在 1..=1000
    pub async fn query(
        &self,
        table_name: &str,
        page: usize,
        page_size: usize,
    ) -> RepositoryResult<RowPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1).saturating_mul(page_size);

        let rows = self.store.query_rows(table_name, page_size, offset).await?;
        let total = self.store.count_rows(table_name).await?;
        Ok(RowPage {
            rows,
            total,
            page,
            page_size,
        })
    }

    pub async fn columns(&self, table_name: &str) -> RepositoryResult<Vec<TableColumn>> {
        self.store.table_columns(table_name).await
    }

    /// 追加列（名称规范化，已注册时同步更新注册表）
    pub async fn add_column(
        &self,
        table_name: &str,
        name: &str,
        column_type: ColumnType,
    ) -> RepositoryResult<TableColumn> {
        let existing: Vec<String> = self
            .store
            .table_columns(table_name)
            .await?
            .into_iter()
            .map(|c| c.name)
            .collect();
        let sanitized = sanitize_column_names(&[name], &existing)
            .pop()
            .unwrap_or_else(|| "column".to_string());

        let column = TableColumn {
            name: sanitized,
            sql_type: column_type.sql_type().to_string(),
            source_name: Some(name.to_string()),
        };
        self.store.add_column(table_name, &column).await?;

        if let Some(mut registered) = self.store.get_import_table(table_name).await? {
            registered.columns.push(column.clone());
            registered.updated_at = Utc::now();
            self.store.register_import_table(&registered).await?;
        }

        debug!(table = %table_name, column = %column.name, "列已追加");
        Ok(column)
    }

    /// 可写入列（不含 id / imported_at）
    async fn writable_columns(&self, table_name: &str) -> RepositoryResult<HashSet<String>> {
        Ok(self
            .store
            .table_columns(table_name)
            .await?
            .into_iter()
            .map(|c| c.name)
            .filter(|name| !RESERVED_COLUMNS.contains(&name.as_str()))
            .collect())
    }

    /// 补充 id / imported_at，丢弃表中不存在的列
    fn prepare_row(
        &self,
        row: &Record,
        writable: &HashSet<String>,
        imported_at: &str,
        dropped: &mut BTreeSet<String>,
    ) -> Record {
        let mut prepared = Record::new();
        for (key, value) in row {
            if writable.contains(key) {
                prepared.insert(key.clone(), value.clone());
            } else {
                dropped.insert(key.clone());
            }
        }
        prepared.insert("id".to_string(), CellValue::Text(self.ids.next_id()));
        prepared.insert("imported_at".to_string(), CellValue::text(imported_at));
        prepared
    }

    fn warn_dropped(table_name: &str, dropped: &BTreeSet<String>) {
        if !dropped.is_empty() {
            warn!(
                table = %table_name,
                columns = ?dropped,
                "记录包含表中不存在的列，已忽略"
            );
        }
    }

    /// 单批写入（单事务，任一行失败整批回滚）
    pub async fn insert_rows(&self, table_name: &str, rows: &[Record]) -> RepositoryResult<usize> {
        let writable = self.writable_columns(table_name).await?;
        let imported_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let mut dropped = BTreeSet::new();

        let prepared: Vec<Record> = rows
            .iter()
            .map(|row| self.prepare_row(row, &writable, &imported_at, &mut dropped))
            .collect();
        Self::warn_dropped(table_name, &dropped);

        self.store.insert_rows(table_name, &prepared).await
    }

    /// 分批写入
    ///
    /// # 参数
    /// - batch_size: 每批行数（0 视为 1）
    /// - on_progress: 每批结束回调一次，返回 Break 停止后续批次
    ///
    /// # 行为
    /// - 每批一个事务；批内出现行级约束错误时逐行重试，失败行记入 failed
    /// - 基础设施错误立即中止，已提交批次保留
    /// - 结束后刷新注册表行数
    #[instrument(skip(self, rows, on_progress), fields(total = rows.len()))]
    pub async fn insert_batched<F>(
        &self,
        table_name: &str,
        rows: &[Record],
        batch_size: usize,
        mut on_progress: F,
    ) -> Result<BatchInsertReport, BatchInsertAborted>
    where
        F: FnMut(&BatchProgress) -> ControlFlow<()> + Send,
    {
        let mut report = BatchInsertReport::default();

        let writable = match self.writable_columns(table_name).await {
            Ok(columns) => columns,
            Err(source) => return Err(BatchInsertAborted { report, source }),
        };

        let batch_size = batch_size.max(1);
        let batch_count = rows.len().div_ceil(batch_size);
        let imported_at = Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string();
        let mut dropped = BTreeSet::new();

        for (batch_idx, chunk) in rows.chunks(batch_size).enumerate() {
            let base_row = batch_idx * batch_size;
            let prepared: Vec<Record> = chunk
                .iter()
                .map(|row| self.prepare_row(row, &writable, &imported_at, &mut dropped))
                .collect();

            match self.store.insert_rows(table_name, &prepared).await {
                Ok(n) => report.inserted += n,
                Err(e) if e.is_row_level() => {
                    debug!(batch = batch_idx + 1, error = %e, "批内存在约束错误，逐行重试");
                    for (offset, row) in prepared.iter().enumerate() {
                        match self.store.insert_row(table_name, row).await {
                            Ok(()) => report.inserted += 1,
                            Err(e) if e.is_row_level() => {
                                report
                                    .failed
                                    .push(RowError::new(base_row + offset + 1, e.row_message()));
                            }
                            Err(source) => {
                                Self::warn_dropped(table_name, &dropped);
                                return Err(BatchInsertAborted { report, source });
                            }
                        }
                    }
                }
                Err(source) => {
                    Self::warn_dropped(table_name, &dropped);
                    return Err(BatchInsertAborted { report, source });
                }
            }
            report.batches_run += 1;

            let progress = BatchProgress {
                batch_index: batch_idx + 1,
                batch_count,
                inserted: report.inserted,
                total: rows.len(),
            };
            if on_progress(&progress).is_break() && batch_idx + 1 < batch_count {
                report.stopped_early = true;
                break;
            }
        }
        Self::warn_dropped(table_name, &dropped);

        if let Err(e) = self.update_row_count(table_name).await {
            warn!(table = %table_name, error = %e, "注册表行数刷新失败");
        }

        info!(
            table = %table_name,
            inserted = report.inserted,
            failed = report.failed.len(),
            batches = report.batches_run,
            stopped_early = report.stopped_early,
            "分批写入完成"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::record_from;
    use crate::ids::SequentialIdGenerator;
    use crate::repository::sqlite_store::SqliteImportStore;

    fn preview(name: &str, detected_type: ColumnType) -> ColumnPreview {
        ColumnPreview {
            name: name.to_string(),
            detected_type,
            confidence: 1.0,
            sample_values: Vec::new(),
            null_count: 0,
            unique_count: 0,
        }
    }

    fn manager() -> (ImportTableManager, Arc<SqliteImportStore>) {
        let store = Arc::new(SqliteImportStore::open_in_memory().unwrap());
        let ids = Arc::new(SequentialIdGenerator::new("row"));
        (ImportTableManager::new(store.clone(), ids), store)
    }

    fn rows(n: usize) -> Vec<Record> {
        (1..=n)
            .map(|i| record_from([("email", format!("user{}@example.com", i))]))
            .collect()
    }

    #[test]
    fn test_generate_table_name() {
        let (manager, _) = manager();
        assert_eq!(
            manager.generate_table_name("Spring Members 2024"),
            "spring_members_2024_000001"
        );
        assert_eq!(manager.generate_table_name("2024 Leads"), "t_2024_leads_000002");
        assert_eq!(manager.generate_table_name("  ***  "), "import_000003");
        assert_eq!(manager.generate_table_name("Café Réservations"), "caf_r_servations_000004");

        let long = manager.generate_table_name(&"x".repeat(100));
        assert_eq!(long.len(), MAX_TABLE_SLUG_LEN + 7);
    }

    #[test]
    fn test_sanitize_column_names() {
        let names = ["First Name", "first name", "", "2nd Phone", "ID", "imported_at"];
        let sanitized = sanitize_column_names(&names, &[]);
        assert_eq!(
            sanitized,
            vec![
                "first_name",
                "first_name_2",
                "column",
                "c_2nd_phone",
                "id_2",
                "imported_at_2"
            ]
        );

        let existing = vec!["email".to_string()];
        assert_eq!(sanitize_column_names(&["Email"], &existing), vec!["email_2"]);
    }

    #[tokio::test]
    async fn test_create_table_and_query() {
        let (manager, _) = manager();
        let table = manager
            .create_table(
                "Leads",
                &[
                    preview("Email", ColumnType::Email),
                    preview("Visits", ColumnType::Integer),
                    preview("Spend", ColumnType::Number),
                    preview("Active", ColumnType::Boolean),
                ],
                Some("ds-1"),
            )
            .await
            .unwrap();

        assert_eq!(table.table_name, "leads_000001");
        let types: Vec<(&str, &str)> = table
            .columns
            .iter()
            .map(|c| (c.name.as_str(), c.sql_type.as_str()))
            .collect();
        assert_eq!(
            types,
            vec![
                ("email", "TEXT"),
                ("visits", "INTEGER"),
                ("spend", "REAL"),
                ("active", "INTEGER")
            ]
        );

        let columns = manager.columns(&table.table_name).await.unwrap();
        assert_eq!(columns.len(), 6);
        assert_eq!(columns[0].name, "id");
        assert_eq!(columns[1].name, "imported_at");

        let inserted = manager.insert_rows(&table.table_name, &rows(25)).await.unwrap();
        assert_eq!(inserted, 25);

        let page = manager.query(&table.table_name, 3, 10).await.unwrap();
        assert_eq!(page.total, 25);
        assert_eq!(page.rows.len(), 5);
        assert_eq!(
            page.rows[0].get("email"),
            Some(&CellValue::text("user21@example.com"))
        );
        assert!(page.rows[0].contains_key("id"));

        let clamped = manager.query(&table.table_name, 0, 0).await.unwrap();
        assert_eq!(clamped.page, 1);
        assert_eq!(clamped.page_size, 1);
        assert_eq!(clamped.rows.len(), 1);
    }

    #[tokio::test]
    async fn test_insert_drops_unknown_columns() {
        let (manager, _) = manager();
        let table = manager
            .create_table("Plain", &[preview("email", ColumnType::Email)], None)
            .await
            .unwrap();

        let row = record_from([("email", "a@example.com"), ("ghost", "x")]);
        manager.insert_rows(&table.table_name, &[row]).await.unwrap();

        let page = manager.query(&table.table_name, 1, 10).await.unwrap();
        assert!(!page.rows[0].contains_key("ghost"));
    }

    #[tokio::test]
    async fn test_insert_batched_with_progress_stop() {
        let (manager, _) = manager();
        let table = manager
            .create_table("Batches", &[preview("email", ColumnType::Email)], None)
            .await
            .unwrap();

        let mut seen = Vec::new();
        let report = manager
            .insert_batched(&table.table_name, &rows(5), 2, |p| {
                seen.push(*p);
                ControlFlow::Break(())
            })
            .await
            .unwrap();

        assert_eq!(report.inserted, 2);
        assert_eq!(report.batches_run, 1);
        assert!(report.stopped_early);
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].batch_count, 3);

        let registered = manager.get(&table.table_name).await.unwrap().unwrap();
        assert_eq!(registered.row_count, 2);
    }

    #[tokio::test]
    async fn test_insert_batched_row_level_fallback() {
        let (manager, store) = manager();
        let table = manager
            .create_table("Unique", &[preview("email", ColumnType::Email)], None)
            .await
            .unwrap();
        {
            let conn = store.connection();
            let conn = conn.lock().unwrap();
            conn.execute_batch(&format!(
                "CREATE UNIQUE INDEX ux_unique_email ON \"{}\"(email)",
                table.table_name
            ))
            .unwrap();
        }

        let mut input = rows(4);
        input.insert(2, record_from([("email", "user1@example.com")]));

        let mut batches = 0;
        let report = manager
            .insert_batched(&table.table_name, &input, 2, |_| {
                batches += 1;
                ControlFlow::Continue(())
            })
            .await
            .unwrap();

        assert_eq!(report.inserted, 4);
        assert_eq!(report.failed.len(), 1);
        assert_eq!(report.failed[0].row, 3);
        assert!(report.failed[0].message.contains("UNIQUE"));
        assert_eq!(report.batches_run, 3);
        assert_eq!(batches, 3);
        assert!(!report.stopped_early);
    }

    #[tokio::test]
    async fn test_truncate_drop_and_add_column() {
        let (manager, _) = manager();
        let table = manager
            .create_table("Lifecycle", &[preview("email", ColumnType::Email)], None)
            .await
            .unwrap();
        manager.insert_rows(&table.table_name, &rows(3)).await.unwrap();
        assert_eq!(manager.update_row_count(&table.table_name).await.unwrap(), 3);

        let added = manager
            .add_column(&table.table_name, "Loyalty Points", ColumnType::Integer)
            .await
            .unwrap();
        assert_eq!(added.name, "loyalty_points");
        let registered = manager.get(&table.table_name).await.unwrap().unwrap();
        assert_eq!(registered.columns.len(), 2);
        assert_eq!(registered.row_count, 3);

        assert_eq!(manager.truncate(&table.table_name).await.unwrap(), 3);
        let registered = manager.get(&table.table_name).await.unwrap().unwrap();
        assert_eq!(registered.row_count, 0);

        assert!(manager.drop_table(&table.table_name).await.unwrap());
        assert!(manager.get(&table.table_name).await.unwrap().is_none());
        assert!(manager.list().await.unwrap().is_empty());
        assert!(matches!(
            manager.drop_table("bad name; --").await,
            Err(RepositoryError::InvalidIdentifier(_))
        ));
    }
}
