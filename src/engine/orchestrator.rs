// ==========================================
// 会员数据导入同步 - 同步编排器
// ==========================================
// 流程: started → cleaning → mapping → routing → success | partial | failed
// 职责: 协调清洗 / 映射 / 路由，落运行日志，回写数据源同步状态
// 红线: 管道非事务，中止时已提交行不回滚且计入 records_imported
// ==========================================

use crate::config::PipelineSettings;
use crate::domain::data_source::{DataSource, DataSourceSyncUpdate};
use crate::domain::sync_log::{cap_errors, RowError, SyncLog, SyncResult, MAX_REPORTED_ERRORS};
use crate::domain::types::{DataSourceStatus, SyncPhase, SyncStatus};
use crate::domain::value::Record;
use crate::engine::router::{DestinationRouter, RouteContext, RouteOutcome};
use crate::engine::schedule::plan_next_run;
use crate::ids::IdGenerator;
use crate::importer::data_cleaner::{process_rows, ProcessedRows};
use crate::importer::error::ImportError;
use crate::importer::field_mapper::{map_row_to_destination, normalize_mappings, validate_mappings};
use crate::perf::PerfGuard;
use crate::repository::error::RepositoryError;
use crate::repository::import_store::ImportStore;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

// ==========================================
// SyncRequest / SyncError
// ==========================================

/// 单次同步请求（数据源配置 + 原始行）
#[derive(Debug, Clone)]
pub struct SyncRequest {
    pub data_source: DataSource,
    pub rows: Vec<Record>,
    pub run_at: DateTime<Utc>,
}

impl SyncRequest {
    pub fn new(data_source: DataSource, rows: Vec<Record>) -> Self {
        Self {
            data_source,
            rows,
            run_at: Utc::now(),
        }
    }
}

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("映射配置错误: {0}")]
    Config(#[from] ImportError),

    #[error("存储错误: {0}")]
    Store(#[from] RepositoryError),
}

/// 运行中累计的计数
#[derive(Debug, Default)]
struct RunCounts {
    imported: usize,
    skipped: usize,
    failed: usize,
    errors: Vec<RowError>,
}

impl RunCounts {
    /// 合并路由结果；行号由批次内序号换算为输入行号
    fn absorb(&mut self, mut outcome: RouteOutcome, source_rows: &[usize]) {
        for error in &mut outcome.errors {
            if let Some(&source) = error.row.checked_sub(1).and_then(|i| source_rows.get(i)) {
                error.row = source;
            }
        }
        self.imported += outcome.imported;
        self.skipped += outcome.skipped;
        self.failed += outcome.failed;
        self.errors.extend(outcome.errors);
    }
}

// ==========================================
// SyncOrchestrator - 同步编排器
// ==========================================
pub struct SyncOrchestrator {
    store: Arc<dyn ImportStore>,
    ids: Arc<dyn IdGenerator>,
    router: DestinationRouter,
    settings: PipelineSettings,
}

impl SyncOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - store: 导入存储
    /// - ids: ID 生成器（运行日志 / 行 ID / 表名后缀）
    /// - settings: 管道配置快照
    pub fn new(
        store: Arc<dyn ImportStore>,
        ids: Arc<dyn IdGenerator>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            router: DestinationRouter::new(store.clone(), ids.clone()),
            store,
            ids,
            settings,
        }
    }

    pub fn settings(&self) -> &PipelineSettings {
        &self.settings
    }

    /// 执行一次完整同步
    ///
    /// # 返回
    /// - Ok(SyncResult): 运行已落定（含 failed）
    /// - Err(SyncError::Store): 无法写入初始运行日志，运行未开始
    #[instrument(skip(self, request), fields(
        data_source_id = %request.data_source.data_source_id,
        destination = %request.data_source.destination_type,
        rows = request.rows.len()
    ))]
    pub async fn run(&self, request: SyncRequest) -> Result<SyncResult, SyncError> {
        let _perf = PerfGuard::new("sync_run");
        let SyncRequest {
            data_source,
            rows,
            run_at,
        } = request;

        // ==========================================
        // 步骤1: 运行日志 + 数据源置为 syncing
        // ==========================================
        debug!(phase = %SyncPhase::Started, "步骤1: 创建运行日志");
        let mut log = SyncLog::started(self.ids.next_id(), &data_source.data_source_id, run_at);
        log.records_processed = rows.len();
        self.store.upsert_sync_log(&log).await?;

        if let Err(e) = self
            .store
            .set_data_source_status(&data_source.data_source_id, DataSourceStatus::Syncing, run_at)
            .await
        {
            warn!(error = %e, "数据源状态更新失败");
        }

        // ==========================================
        // 步骤2-4: 清洗 → 映射 → 路由
        // ==========================================
        let mut counts = RunCounts::default();
        let pipeline = self.execute(&data_source, &rows, run_at, &mut counts).await;

        // ==========================================
        // 步骤5: 判定终态并落定
        // ==========================================
        let (status, error_message) = match pipeline {
            Ok(()) => (
                SyncStatus::from_counts(counts.imported, counts.errors.len()),
                None,
            ),
            Err(e) => {
                error!(error = %e, imported = counts.imported, "同步中止");
                (SyncStatus::Failed, Some(e.to_string()))
            }
        };
        let completed_at = Utc::now().max(run_at);
        let errors = cap_errors(
            counts.errors,
            self.settings.max_reported_errors.min(MAX_REPORTED_ERRORS),
        );

        log.status = status;
        log.completed_at = Some(completed_at);
        log.records_imported = counts.imported;
        log.records_skipped = counts.skipped;
        log.records_failed = counts.failed;
        log.errors = errors.clone();
        log.error_message = error_message.clone();
        if let Err(e) = self.store.upsert_sync_log(&log).await {
            warn!(log_id = %log.log_id, error = %e, "运行日志落定失败");
        }

        // ==========================================
        // 步骤6: 下次运行 / 重试
        // ==========================================
        let mut schedule = data_source.schedule.clone();
        if schedule.retry_delay_minutes == 0 {
            schedule.retry_delay_minutes = self.settings.default_retry_delay_minutes;
        }
        let plan = plan_next_run(&schedule, status, data_source.retry_attempt, completed_at);

        let update = DataSourceSyncUpdate {
            status: DataSourceStatus::from(status),
            last_sync_at: Some(completed_at),
            last_sync_status: Some(status),
            next_sync_at: plan.next_sync_at,
            retry_attempt: plan.retry_attempt,
        };
        if let Err(e) = self
            .store
            .update_data_source_sync(&data_source.data_source_id, &update, completed_at)
            .await
        {
            warn!(error = %e, "数据源同步状态回写失败");
        }

        info!(
            log_id = %log.log_id,
            status = %status,
            processed = log.records_processed,
            imported = log.records_imported,
            skipped = log.records_skipped,
            failed = log.records_failed,
            next_sync_at = ?plan.next_sync_at,
            is_retry = plan.is_retry,
            "同步完成"
        );

        Ok(SyncResult {
            log_id: log.log_id,
            data_source_id: data_source.data_source_id,
            status,
            records_processed: log.records_processed,
            records_imported: log.records_imported,
            records_skipped: log.records_skipped,
            records_failed: log.records_failed,
            errors,
            error_message,
            started_at: run_at,
            completed_at,
            next_sync_at: plan.next_sync_at,
        })
    }

    /// 并发执行多个数据源的同步
    pub async fn run_all(&self, requests: Vec<SyncRequest>) -> Vec<Result<SyncResult, SyncError>> {
        info!(count = requests.len(), "批量同步开始");
        join_all(requests.into_iter().map(|r| self.run(r))).await
    }

    /// 清洗 → 映射 → 路由（计数写入 counts，中止时保留已提交部分）
    ///
    /// 映射列表为空时按清洗后的列名原样路由；必填字段校验照常执行，
    /// 因此只有无必填字段的 members 与 custom 可以不配置映射
    async fn execute(
        &self,
        data_source: &DataSource,
        rows: &[Record],
        run_at: DateTime<Utc>,
        counts: &mut RunCounts,
    ) -> Result<(), SyncError> {
        validate_mappings(
            data_source.destination_type,
            &data_source.field_mappings,
            data_source.table_name.as_deref(),
        )?;

        debug!(phase = %SyncPhase::Cleaning, "步骤2: 行清洗");
        let ProcessedRows {
            cleaned_rows,
            skipped_count,
            source_rows,
        } = process_rows(rows, &data_source.column_config);
        counts.skipped += skipped_count;

        debug!(
            phase = %SyncPhase::Mapping,
            cleaned = cleaned_rows.len(),
            "步骤3: 字段映射"
        );
        let mappings = normalize_mappings(&data_source.field_mappings);
        let mapped: Vec<Record> = if mappings.is_empty() {
            cleaned_rows
        } else {
            cleaned_rows
                .iter()
                .map(|row| map_row_to_destination(row, &mappings))
                .collect()
        };

        debug!(phase = %SyncPhase::Routing, rows = mapped.len(), "步骤4: 目标路由");
        let ctx = RouteContext {
            data_source_id: data_source.data_source_id.clone(),
            site_id: data_source.site_id.clone(),
            table_name: data_source.table_name.clone(),
            run_date: run_at.date_naive(),
            batch_size: self.settings.batch_size,
            now: run_at,
        };

        match self
            .router
            .route(data_source.destination_type, &mapped, &ctx)
            .await
        {
            Ok(outcome) => {
                counts.absorb(outcome, &source_rows);
                Ok(())
            }
            Err(aborted) => {
                counts.absorb(aborted.partial, &source_rows);
                Err(SyncError::Store(aborted.source))
            }
        }
    }
}
