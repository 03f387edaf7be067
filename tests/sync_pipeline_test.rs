// ==========================================
// 同步管道集成测试
// ==========================================
// 测试目标: 文件 → 清洗 → 映射 → 路由 → 运行日志 / 数据源状态 的完整流程
// ==========================================


use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use member_import_sync::config::PipelineSettings;
use member_import_sync::domain::{
    record_from, CellValue, DataSource, DataSourceStatus, DataSourceSyncUpdate, DestinationType,
    FieldMapping, Frequency, ImportTable, Record, ScheduleConfiguration, SyncLog, SyncStatus,
    TableColumn,
};
use member_import_sync::engine::{ImportTableManager, SyncOrchestrator, SyncRequest};
use member_import_sync::importer::{analyze_columns, parse_csv};
use member_import_sync::repository::{ImportStore, RepositoryError, RepositoryResult};
use member_import_sync::{logging, SequentialIdGenerator, SqliteImportStore, UniversalFileParser};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use test_helpers::{create_test_db, data_source_from_csv, open_store, save_data_source, write_csv};

const MEMBERS_CSV: &str = "First Name,Email Address,Notes\n\
John,JOHN@test.com ,\n\
,,walk-in\n\
Jane,jane@test.com,prefers mornings\n";

fn orchestrator(store: Arc<dyn ImportStore>, settings: PipelineSettings) -> SyncOrchestrator {
    SyncOrchestrator::new(store, Arc::new(SequentialIdGenerator::new("t")), settings)
}

fn by_email(email: &str) -> Record {
    record_from([("email", email)])
}

// ==========================================
// 写入若干行后失败的存储（模拟基础设施故障）
// ==========================================
struct FlakyStore {
    inner: Arc<SqliteImportStore>,
    inserts_before_failure: usize,
    inserts: AtomicUsize,
}

#[async_trait]
impl ImportStore for FlakyStore {
    async fn insert_row(&self, table: &str, row: &Record) -> RepositoryResult<()> {
        if self.inserts.fetch_add(1, Ordering::SeqCst) >= self.inserts_before_failure {
            return Err(RepositoryError::DatabaseQueryError("disk I/O error".to_string()));
        }
        self.inner.insert_row(table, row).await
    }

    async fn insert_rows(&self, table: &str, rows: &[Record]) -> RepositoryResult<usize> {
        self.inner.insert_rows(table, rows).await
    }

    async fn find_one(&self, table: &str, criteria: &Record) -> RepositoryResult<Option<Record>> {
        self.inner.find_one(table, criteria).await
    }

    async fn query_rows(
        &self,
        table: &str,
        limit: usize,
        offset: usize,
    ) -> RepositoryResult<Vec<Record>> {
        self.inner.query_rows(table, limit, offset).await
    }

    async fn count_rows(&self, table: &str) -> RepositoryResult<i64> {
        self.inner.count_rows(table).await
    }

    async fn create_table(&self, table: &str, columns: &[TableColumn]) -> RepositoryResult<()> {
        self.inner.create_table(table, columns).await
    }

    async fn drop_table(&self, table: &str) -> RepositoryResult<()> {
        self.inner.drop_table(table).await
    }

    async fn truncate_table(&self, table: &str) -> RepositoryResult<usize> {
        self.inner.truncate_table(table).await
    }

    async fn table_exists(&self, table: &str) -> RepositoryResult<bool> {
        self.inner.table_exists(table).await
    }

    async fn table_columns(&self, table: &str) -> RepositoryResult<Vec<TableColumn>> {
        self.inner.table_columns(table).await
    }

    async fn add_column(&self, table: &str, column: &TableColumn) -> RepositoryResult<()> {
        self.inner.add_column(table, column).await
    }

    async fn register_import_table(&self, table: &ImportTable) -> RepositoryResult<()> {
        self.inner.register_import_table(table).await
    }

    async fn deregister_import_table(&self, table_name: &str) -> RepositoryResult<bool> {
        self.inner.deregister_import_table(table_name).await
    }

    async fn get_import_table(&self, table_name: &str) -> RepositoryResult<Option<ImportTable>> {
        self.inner.get_import_table(table_name).await
    }

    async fn list_import_tables(&self) -> RepositoryResult<Vec<ImportTable>> {
        self.inner.list_import_tables().await
    }

    async fn set_import_table_row_count(
        &self,
        table_name: &str,
        row_count: i64,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.inner
            .set_import_table_row_count(table_name, row_count, updated_at)
            .await
    }

    async fn upsert_sync_log(&self, log: &SyncLog) -> RepositoryResult<()> {
        self.inner.upsert_sync_log(log).await
    }

    async fn get_sync_log(&self, log_id: &str) -> RepositoryResult<Option<SyncLog>> {
        self.inner.get_sync_log(log_id).await
    }

    async fn list_sync_logs(
        &self,
        data_source_id: &str,
        limit: usize,
    ) -> RepositoryResult<Vec<SyncLog>> {
        self.inner.list_sync_logs(data_source_id, limit).await
    }

    async fn upsert_data_source(&self, source: &DataSource) -> RepositoryResult<()> {
        self.inner.upsert_data_source(source).await
    }

    async fn get_data_source(&self, data_source_id: &str) -> RepositoryResult<Option<DataSource>> {
        self.inner.get_data_source(data_source_id).await
    }

    async fn set_data_source_status(
        &self,
        data_source_id: &str,
        status: DataSourceStatus,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.inner
            .set_data_source_status(data_source_id, status, updated_at)
            .await
    }

    async fn update_data_source_sync(
        &self,
        data_source_id: &str,
        update: &DataSourceSyncUpdate,
        updated_at: DateTime<Utc>,
    ) -> RepositoryResult<()> {
        self.inner
            .update_data_source_sync(data_source_id, update, updated_at)
            .await
    }
}

// ==========================================
// members
// ==========================================

#[tokio::test]
async fn test_members_file_sync_is_partial() {
    logging::init_test();

    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let source = save_data_source(
        &store,
        data_source_from_csv("ds-members", DestinationType::Members, MEMBERS_CSV),
    )
    .await;

    let csv = write_csv(MEMBERS_CSV);
    let table = UniversalFileParser.parse(csv.path()).unwrap();
    assert_eq!(table.total_rows, 3);

    let result = orchestrator(store.clone(), PipelineSettings::default())
        .run(SyncRequest::new(source, table.records()))
        .await
        .unwrap();

    assert_eq!(result.status, SyncStatus::Partial);
    assert_eq!(result.records_processed, 3);
    assert_eq!(result.records_imported, 2);
    assert_eq!(result.records_skipped, 1);
    assert_eq!(result.records_failed, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].row, 2);
    assert_eq!(result.errors[0].message, "Missing first_name and email");

    let john = store
        .find_one("members", &by_email("john@test.com"))
        .await
        .unwrap()
        .expect("john imported with normalised email");
    assert_eq!(john.get("first_name"), Some(&CellValue::text("John")));
    assert_eq!(john.get("data_source_id"), Some(&CellValue::text("ds-members")));

    let stored = store.get_data_source("ds-members").await.unwrap().unwrap();
    assert_eq!(stored.status, DataSourceStatus::Success);
    assert_eq!(stored.last_sync_status, Some(SyncStatus::Partial));
    assert_eq!(stored.retry_attempt, 0);

    let logs = store.list_sync_logs("ds-members", 10).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].log_id, result.log_id);
    assert_eq!(logs[0].records_imported, 2);
}

#[tokio::test]
async fn test_members_without_any_import_is_failed_and_schedules_retry() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);

    let mut source = data_source_from_csv("ds-empty", DestinationType::Members, MEMBERS_CSV);
    source.schedule = ScheduleConfiguration {
        time: Some("03:00".to_string()),
        retry_on_failure: true,
        max_retries: 3,
        retry_delay_minutes: 15,
        ..ScheduleConfiguration::new(Frequency::Daily)
    };
    let source = save_data_source(&store, source).await;

    let rows = parse_csv("First Name,Email Address,Notes\n,,a\n,,b\n")
        .unwrap()
        .records();
    let result = orchestrator(store.clone(), PipelineSettings::default())
        .run(SyncRequest::new(source, rows))
        .await
        .unwrap();

    assert_eq!(result.status, SyncStatus::Failed);
    assert_eq!(result.records_imported, 0);
    assert_eq!(result.records_skipped, 2);
    assert_eq!(
        result.next_sync_at,
        Some(result.completed_at + Duration::minutes(15))
    );

    let stored = store.get_data_source("ds-empty").await.unwrap().unwrap();
    assert_eq!(stored.status, DataSourceStatus::Failed);
    assert_eq!(stored.retry_attempt, 1);
    assert_eq!(stored.next_sync_at, result.next_sync_at);
}

#[tokio::test]
async fn test_second_failure_doubles_retry_delay() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);

    let mut source = data_source_from_csv("ds-retry", DestinationType::Members, MEMBERS_CSV);
    source.schedule = ScheduleConfiguration {
        retry_on_failure: true,
        ..ScheduleConfiguration::new(Frequency::Hourly)
    };
    source.retry_attempt = 2;
    let source = save_data_source(&store, source).await;

    let rows = vec![record_from([
        ("First Name", ""),
        ("Email Address", ""),
        ("Notes", "walk-in"),
    ])];
    let result = orchestrator(store.clone(), PipelineSettings::default())
        .run(SyncRequest::new(source, rows))
        .await
        .unwrap();

    // 第 3 次重试: 15 × 2^2
    assert_eq!(
        result.next_sync_at,
        Some(result.completed_at + Duration::minutes(60))
    );
    let stored = store.get_data_source("ds-retry").await.unwrap().unwrap();
    assert_eq!(stored.retry_attempt, 3);
}

// ==========================================
// transactions
// ==========================================

#[tokio::test]
async fn test_transactions_with_unknown_member() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let orchestrator = orchestrator(store.clone(), PipelineSettings::default());

    let members = save_data_source(
        &store,
        data_source_from_csv("ds-m", DestinationType::Members, MEMBERS_CSV),
    )
    .await;
    orchestrator
        .run(SyncRequest::new(members, parse_csv(MEMBERS_CSV).unwrap().records()))
        .await
        .unwrap();

    let csv = "Customer Email,Total,Purchase Date,Item\n\
jane@test.com,$19.99,2025-02-01,Class pack\n\
nobody@test.com,5.00,2025-02-02,Towel\n\
john@test.com,12.50,2025-02-03,Smoothie\n";
    let source = save_data_source(
        &store,
        data_source_from_csv("ds-t", DestinationType::Transactions, csv),
    )
    .await;
    let result = orchestrator
        .run(SyncRequest::new(source, parse_csv(csv).unwrap().records()))
        .await
        .unwrap();

    assert_eq!(result.status, SyncStatus::Partial);
    assert_eq!(result.records_imported, 2);
    assert_eq!(result.records_failed, 1);
    assert_eq!(
        result.errors[0].message,
        "Member not found for email: nobody@test.com"
    );
    assert_eq!(store.count_rows("transactions").await.unwrap(), 2);

    let tx = store
        .find_one("transactions", &by_email("jane@test.com"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(tx.get("amount"), Some(&CellValue::Float(19.99)));
    assert_eq!(tx.get("transaction_date"), Some(&CellValue::text("2025-02-01")));
}

#[tokio::test]
async fn test_transactions_missing_required_mapping() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);

    let csv = "Customer Email,Item\nann@test.com,Towel\n";
    let source = save_data_source(
        &store,
        data_source_from_csv("ds-bad", DestinationType::Transactions, csv),
    )
    .await;
    let result = orchestrator(store.clone(), PipelineSettings::default())
        .run(SyncRequest::new(source, parse_csv(csv).unwrap().records()))
        .await
        .unwrap();

    assert_eq!(result.status, SyncStatus::Failed);
    assert_eq!(result.records_imported, 0);
    assert!(result.error_message.is_some());

    let log = store.get_sync_log(&result.log_id).await.unwrap().unwrap();
    assert_eq!(log.status, SyncStatus::Failed);
    assert_eq!(log.error_message, result.error_message);
}

// ==========================================
// custom
// ==========================================

#[tokio::test]
async fn test_custom_destination_batches() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let ids = Arc::new(SequentialIdGenerator::new("c"));
    let tables = ImportTableManager::new(store.clone(), ids.clone());

    let csv = "Code,Score,Joined\nA1,10,2024-01-05\nB2,7,2024-02-11\nC3,12,2024-03-09\n";
    let parsed = parse_csv(csv).unwrap();
    let mut source = data_source_from_csv("ds-c", DestinationType::Custom, csv);

    let table = tables
        .create_table("Scores", &analyze_columns(&parsed, 100), Some("ds-c"))
        .await
        .unwrap();
    source.table_name = Some(table.table_name.clone());
    let source = save_data_source(&store, source).await;

    let settings = PipelineSettings {
        batch_size: 2,
        ..PipelineSettings::default()
    };
    let result = SyncOrchestrator::new(store.clone(), ids, settings)
        .run(SyncRequest::new(source, parsed.records()))
        .await
        .unwrap();

    assert_eq!(result.status, SyncStatus::Success);
    assert_eq!(result.records_imported, 3);

    let page = tables.query(&table.table_name, 1, 10).await.unwrap();
    assert_eq!(page.total, 3);
    assert_eq!(page.rows[0].get("code"), Some(&CellValue::text("A1")));
    assert_eq!(page.rows[0].get("score"), Some(&CellValue::Int(10)));

    let registered = tables.get(&table.table_name).await.unwrap().unwrap();
    assert_eq!(registered.row_count, 3);
}

#[tokio::test]
async fn test_custom_missing_table_is_infrastructure_failure() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);

    let csv = "Code\nA1\n";
    let mut source = data_source_from_csv("ds-x", DestinationType::Custom, csv);
    source.table_name = Some("missing_table".to_string());
    let source = save_data_source(&store, source).await;

    let result = orchestrator(store.clone(), PipelineSettings::default())
        .run(SyncRequest::new(source, parse_csv(csv).unwrap().records()))
        .await
        .unwrap();

    assert_eq!(result.status, SyncStatus::Failed);
    assert!(result.error_message.unwrap().contains("missing_table"));
}

// ==========================================
// 基础设施故障: 已提交行保留并计数
// ==========================================

#[tokio::test]
async fn test_store_failure_keeps_committed_rows() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let inner = open_store(&db_path);
    let flaky = Arc::new(FlakyStore {
        inner: inner.clone(),
        inserts_before_failure: 2,
        inserts: AtomicUsize::new(0),
    });

    let mut source = DataSource::new("ds-flaky", "Flaky", DestinationType::Members, Utc::now());
    source.field_mappings = vec![
        FieldMapping::new("name", "first_name"),
        FieldMapping::new("mail", "email"),
    ];
    let source = save_data_source(&inner, source).await;

    let rows = (1..=4)
        .map(|i| record_from([("name", format!("M{}", i)), ("mail", format!("m{}@test.com", i))]))
        .collect();
    let result = orchestrator(flaky, PipelineSettings::default())
        .run(SyncRequest::new(source, rows))
        .await
        .unwrap();

    assert_eq!(result.status, SyncStatus::Failed);
    assert_eq!(result.records_imported, 2);
    assert!(result.error_message.unwrap().contains("disk I/O error"));
    assert_eq!(inner.count_rows("members").await.unwrap(), 2);

    let stored = inner.get_data_source("ds-flaky").await.unwrap().unwrap();
    assert_eq!(stored.status, DataSourceStatus::Failed);
}

// ==========================================
// 并发多数据源
// ==========================================

#[tokio::test]
async fn test_run_all_independent_sources() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);

    let a = save_data_source(
        &store,
        data_source_from_csv("ds-a", DestinationType::Members, MEMBERS_CSV),
    )
    .await;
    let mut b = data_source_from_csv("ds-b", DestinationType::Members, MEMBERS_CSV);
    b.site_id = Some("site-2".to_string());
    let b = save_data_source(&store, b).await;

    let rows = parse_csv(MEMBERS_CSV).unwrap().records();
    let results = orchestrator(store.clone(), PipelineSettings::default())
        .run_all(vec![
            SyncRequest::new(a, rows.clone()),
            SyncRequest::new(b, rows),
        ])
        .await;

    assert_eq!(results.len(), 2);
    for result in results {
        let result = result.unwrap();
        assert_eq!(result.records_imported, 2);
        assert_eq!(result.status, SyncStatus::Partial);
    }
    // 不同站点下同一邮箱各自独立
    assert_eq!(store.count_rows("members").await.unwrap(), 4);
}

#[tokio::test]
async fn test_rerun_skips_existing_members() {
    let (_temp_file, db_path) = create_test_db().unwrap();
    let store = open_store(&db_path);
    let orchestrator = orchestrator(store.clone(), PipelineSettings::default());

    let source = save_data_source(
        &store,
        data_source_from_csv("ds-rerun", DestinationType::Members, MEMBERS_CSV),
    )
    .await;
    let rows = parse_csv(MEMBERS_CSV).unwrap().records();

    orchestrator
        .run(SyncRequest::new(source.clone(), rows.clone()))
        .await
        .unwrap();
    let second = orchestrator
        .run(SyncRequest::new(source, rows))
        .await
        .unwrap();

    assert_eq!(second.records_imported, 0);
    assert_eq!(second.records_skipped, 3);
    assert_eq!(second.status, SyncStatus::Failed);
    assert_eq!(store.list_sync_logs("ds-rerun", 10).await.unwrap().len(), 2);
}
