// ==========================================
// 会员数据导入同步 - 目标路由器
// ==========================================
// 职责: 映射后记录 → 目标表（members / transactions / visits / custom）
// 红线: 行级问题只记录不中止；存储基础设施错误立即中止并带回已提交计数
// ==========================================

use crate::domain::mapping::destination_fields;
use crate::domain::sync_log::RowError;
use crate::domain::types::DestinationType;
use crate::domain::value::{CellValue, Record};
use crate::engine::import_table_manager::ImportTableManager;
use crate::ids::IdGenerator;
use crate::importer::type_detector::parse_date_any;
use crate::repository::error::RepositoryError;
use crate::repository::import_store::ImportStore;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, instrument};

/// 金额中允许出现的货币符号与千分位
const AMOUNT_STRIP_CHARS: &[char] = &['$', '€', '£', '¥', ','];

// ==========================================
// 路由上下文 / 结果
// ==========================================

/// 单次路由的运行参数
#[derive(Debug, Clone)]
pub struct RouteContext {
    pub data_source_id: String,
    pub site_id: Option<String>,
    pub table_name: Option<String>, // custom 目标表
    pub run_date: NaiveDate,        // visit_date 缺省值
    pub batch_size: usize,
    pub now: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RouteOutcome {
    pub imported: usize,
    pub skipped: usize,
    pub failed: usize,
    pub errors: Vec<RowError>,
}

impl RouteOutcome {
    fn skip(&mut self, row: usize, message: impl Into<String>) {
        self.skipped += 1;
        self.errors.push(RowError::new(row, message));
    }

    fn fail(&mut self, row: usize, message: impl Into<String>) {
        self.failed += 1;
        self.errors.push(RowError::new(row, message));
    }
}

/// 存储基础设施错误中止路由
#[derive(Debug, Error)]
#[error("路由中止（已导入 {} 行）: {source}", .partial.imported)]
pub struct RouteAborted {
    pub partial: RouteOutcome,
    #[source]
    pub source: RepositoryError,
}

// ==========================================
// 字段取值辅助
// ==========================================

/// 非空白文本（已去除首尾空白）
fn non_blank_text(record: &Record, key: &str) -> Option<String> {
    record
        .get(key)
        .filter(|v| !v.is_blank())
        .map(|v| v.to_plain_string().trim().to_string())
}

fn normalize_email(record: &Record) -> Option<String> {
    non_blank_text(record, "email").map(|e| e.to_lowercase())
}

fn missing_fields<'a>(record: &Record, fields: &[&'a str]) -> Vec<&'a str> {
    fields
        .iter()
        .filter(|f| record.get(**f).map_or(true, CellValue::is_blank))
        .copied()
        .collect()
}

fn parse_amount(value: &CellValue) -> Option<f64> {
    let amount = match value {
        CellValue::Int(i) => *i as f64,
        CellValue::Float(f) => *f,
        CellValue::Text(s) => {
            let stripped: String = s
                .chars()
                .filter(|c| !AMOUNT_STRIP_CHARS.contains(c) && !c.is_whitespace())
                .collect();
            stripped.parse::<f64>().ok()?
        }
        _ => return None,
    };
    amount.is_finite().then_some(amount)
}

fn parse_date_cell(value: &CellValue) -> Option<NaiveDate> {
    match value {
        CellValue::Date(d) => Some(*d),
        CellValue::Text(s) => parse_date_any(s.trim()),
        _ => None,
    }
}

fn parse_minutes(value: &CellValue) -> CellValue {
    match value {
        CellValue::Int(i) => CellValue::Int(*i),
        CellValue::Float(f) if f.is_finite() => CellValue::Int(f.round() as i64),
        CellValue::Text(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| {
                    s.parse::<f64>()
                        .ok()
                        .filter(|f| f.is_finite())
                        .map(|f| f.round() as i64)
                })
                .map_or(CellValue::Null, CellValue::Int)
        }
        _ => CellValue::Null,
    }
}

/// 标签字段 → JSON 数组字符串
///
/// 已是 JSON 数组的原样规范化；否则按 ',' / ';' 拆分
fn normalize_tags(value: &CellValue) -> CellValue {
    let Some(raw) = value.as_text().map(str::trim).filter(|s| !s.is_empty()) else {
        return if value.is_blank() {
            CellValue::Null
        } else {
            CellValue::Text(format!("[{}]", serde_json::Value::from(value.to_plain_string())))
        };
    };

    let tags: Vec<String> = match serde_json::from_str::<Vec<String>>(raw) {
        Ok(parsed) => parsed,
        Err(_) => raw.split([',', ';']).map(str::to_string).collect(),
    };
    let tags: Vec<String> = tags
        .into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect();

    match serde_json::to_string(&tags) {
        Ok(json) => CellValue::Text(json),
        Err(_) => CellValue::Null,
    }
}

// ==========================================
// DestinationRouter - 目标路由器
// ==========================================
pub struct DestinationRouter {
    store: Arc<dyn ImportStore>,
    tables: ImportTableManager,
    ids: Arc<dyn IdGenerator>,
}

impl DestinationRouter {
    pub fn new(store: Arc<dyn ImportStore>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            tables: ImportTableManager::new(store.clone(), ids.clone()),
            store,
            ids,
        }
    }

    /// 按目标类型分发到唯一的处理器
    ///
    /// # 参数
    /// - destination: 目标类型
    /// - rows: 已映射的目标字段记录
    /// - ctx: 运行上下文
    ///
    /// # 返回
    /// - Ok(RouteOutcome): 全部行已处理（含行级失败，行号为 rows 内序号，从 1 开始）
    /// - Err(RouteAborted): 存储基础设施错误，partial 为已提交计数
    #[instrument(skip(self, rows, ctx), fields(
        destination = %destination,
        rows = rows.len(),
        data_source_id = %ctx.data_source_id
    ))]
    pub async fn route(
        &self,
        destination: DestinationType,
        rows: &[Record],
        ctx: &RouteContext,
    ) -> Result<RouteOutcome, RouteAborted> {
        let outcome = match destination {
            DestinationType::Members => self.route_members(rows, ctx).await?,
            DestinationType::Transactions => self.route_transactions(rows, ctx).await?,
            DestinationType::Visits => self.route_visits(rows, ctx).await?,
            DestinationType::Custom => self.route_custom(rows, ctx).await?,
        };

        info!(
            imported = outcome.imported,
            skipped = outcome.skipped,
            failed = outcome.failed,
            errors = outcome.errors.len(),
            "路由完成"
        );
        Ok(outcome)
    }

    /// 公共列: id / site_id / data_source_id / created_at
    fn base_record(&self, ctx: &RouteContext) -> Record {
        let mut record = Record::new();
        record.insert("id".to_string(), CellValue::Text(self.ids.next_id()));
        record.insert("site_id".to_string(), ctx.site_id.clone().into());
        record.insert(
            "data_source_id".to_string(),
            CellValue::text(ctx.data_source_id.as_str()),
        );
        record.insert("created_at".to_string(), CellValue::Text(ctx.now.to_rfc3339()));
        record
    }

    /// 写入一行并按错误类型归类
    ///
    /// 唯一约束 → skipped（无错误信息）；其他约束 → failed；其余 → 中止
    async fn insert_classified(
        &self,
        table: &str,
        row_number: usize,
        record: &Record,
        outcome: &mut RouteOutcome,
    ) -> Result<(), RepositoryError> {
        match self.store.insert_row(table, record).await {
            Ok(()) => {
                outcome.imported += 1;
                Ok(())
            }
            Err(RepositoryError::UniqueViolation(msg)) => {
                debug!(table, row = row_number, reason = %msg, "重复记录，跳过");
                outcome.skipped += 1;
                Ok(())
            }
            Err(e) if e.is_row_level() => {
                outcome.fail(row_number, e.row_message());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// 按 email（及站点）解析会员 ID，单次运行内缓存
    async fn resolve_member(
        &self,
        email: &str,
        ctx: &RouteContext,
        cache: &mut HashMap<String, Option<String>>,
    ) -> Result<Option<String>, RepositoryError> {
        if let Some(hit) = cache.get(email) {
            return Ok(hit.clone());
        }

        let mut criteria = Record::new();
        criteria.insert("email".to_string(), CellValue::text(email));
        criteria.insert("site_id".to_string(), ctx.site_id.clone().into());

        let member_id = self
            .store
            .find_one("members", &criteria)
            .await?
            .and_then(|m| m.get("id").and_then(|v| v.as_text().map(str::to_string)));
        cache.insert(email.to_string(), member_id.clone());
        Ok(member_id)
    }

    // ==========================================
    // members
    // ==========================================
    async fn route_members(
        &self,
        rows: &[Record],
        ctx: &RouteContext,
    ) -> Result<RouteOutcome, RouteAborted> {
        let mut outcome = RouteOutcome::default();

        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 1;
            let email = normalize_email(row);
            if email.is_none() && non_blank_text(row, "first_name").is_none() {
                outcome.skip(row_number, "Missing first_name and email");
                continue;
            }

            let mut record = self.base_record(ctx);
            for field in destination_fields(DestinationType::Members) {
                let Some(value) = row.get(field.name) else {
                    continue;
                };
                let value = match field.name {
                    "email" => email.clone().into(),
                    "tags" => normalize_tags(value),
                    _ => value.clone(),
                };
                record.insert(field.name.to_string(), value);
            }

            if let Err(source) = self
                .insert_classified("members", row_number, &record, &mut outcome)
                .await
            {
                return Err(RouteAborted {
                    partial: outcome,
                    source,
                });
            }
        }
        Ok(outcome)
    }

    // ==========================================
    // transactions
    // ==========================================
    async fn route_transactions(
        &self,
        rows: &[Record],
        ctx: &RouteContext,
    ) -> Result<RouteOutcome, RouteAborted> {
        let mut outcome = RouteOutcome::default();
        let mut members = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 1;
            let missing = missing_fields(row, &["email", "amount", "transaction_date"]);
            if !missing.is_empty() {
                outcome.fail(
                    row_number,
                    format!("Missing required fields: {}", missing.join(", ")),
                );
                continue;
            }

            let Some(email) = normalize_email(row) else {
                outcome.fail(row_number, "Missing required fields: email");
                continue;
            };
            let raw_amount = row.get("amount").cloned().unwrap_or(CellValue::Null);
            let Some(amount) = parse_amount(&raw_amount) else {
                outcome.fail(row_number, format!("Invalid amount: {}", raw_amount));
                continue;
            };
            let raw_date = row
                .get("transaction_date")
                .cloned()
                .unwrap_or(CellValue::Null);
            let Some(transaction_date) = parse_date_cell(&raw_date) else {
                outcome.fail(row_number, format!("Invalid transaction_date: {}", raw_date));
                continue;
            };

            let member_id = match self.resolve_member(&email, ctx, &mut members).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    outcome.fail(row_number, format!("Member not found for email: {}", email));
                    continue;
                }
                Err(source) => {
                    return Err(RouteAborted {
                        partial: outcome,
                        source,
                    })
                }
            };

            let mut record = self.base_record(ctx);
            record.insert("member_id".to_string(), CellValue::Text(member_id));
            record.insert("email".to_string(), CellValue::Text(email));
            record.insert("amount".to_string(), CellValue::Float(amount));
            record.insert(
                "transaction_date".to_string(),
                CellValue::Date(transaction_date),
            );
            for key in ["description", "category", "payment_method"] {
                if let Some(value) = row.get(key) {
                    record.insert(key.to_string(), value.clone());
                }
            }

            if let Err(source) = self
                .insert_classified("transactions", row_number, &record, &mut outcome)
                .await
            {
                return Err(RouteAborted {
                    partial: outcome,
                    source,
                });
            }
        }
        Ok(outcome)
    }

    // ==========================================
    // visits
    // ==========================================
    async fn route_visits(
        &self,
        rows: &[Record],
        ctx: &RouteContext,
    ) -> Result<RouteOutcome, RouteAborted> {
        let mut outcome = RouteOutcome::default();
        let mut members = HashMap::new();

        for (idx, row) in rows.iter().enumerate() {
            let row_number = idx + 1;
            let Some(email) = normalize_email(row) else {
                outcome.fail(row_number, "Missing required fields: email");
                continue;
            };

            let visit_date = match row.get("visit_date").filter(|v| !v.is_blank()) {
                None => ctx.run_date,
                Some(raw) => match parse_date_cell(raw) {
                    Some(d) => d,
                    None => {
                        outcome.fail(row_number, format!("Invalid visit_date: {}", raw));
                        continue;
                    }
                },
            };

            let member_id = match self.resolve_member(&email, ctx, &mut members).await {
                Ok(Some(id)) => id,
                Ok(None) => {
                    outcome.fail(row_number, format!("Member not found for email: {}", email));
                    continue;
                }
                Err(source) => {
                    return Err(RouteAborted {
                        partial: outcome,
                        source,
                    })
                }
            };

            let mut record = self.base_record(ctx);
            record.insert("member_id".to_string(), CellValue::Text(member_id));
            record.insert("email".to_string(), CellValue::Text(email));
            record.insert("visit_date".to_string(), CellValue::Date(visit_date));
            if let Some(value) = row.get("duration_minutes") {
                record.insert("duration_minutes".to_string(), parse_minutes(value));
            }
            for key in ["location", "notes"] {
                if let Some(value) = row.get(key) {
                    record.insert(key.to_string(), value.clone());
                }
            }

            if let Err(source) = self
                .insert_classified("visits", row_number, &record, &mut outcome)
                .await
            {
                return Err(RouteAborted {
                    partial: outcome,
                    source,
                });
            }
        }
        Ok(outcome)
    }

    // ==========================================
    // custom
    // ==========================================
    async fn route_custom(
        &self,
        rows: &[Record],
        ctx: &RouteContext,
    ) -> Result<RouteOutcome, RouteAborted> {
        let Some(table_name) = ctx.table_name.as_deref().map(str::trim).filter(|t| !t.is_empty())
        else {
            return Err(RouteAborted {
                partial: RouteOutcome::default(),
                source: RepositoryError::InternalError("custom 目标缺少表名".to_string()),
            });
        };

        let result = self
            .tables
            .insert_batched(table_name, rows, ctx.batch_size, |progress| {
                debug!(
                    batch = progress.batch_index,
                    batch_count = progress.batch_count,
                    inserted = progress.inserted,
                    "批次完成"
                );
                ControlFlow::Continue(())
            })
            .await;

        match result {
            Ok(report) => Ok(RouteOutcome {
                imported: report.inserted,
                skipped: 0,
                failed: report.failed.len(),
                errors: report.failed,
            }),
            Err(aborted) => Err(RouteAborted {
                partial: RouteOutcome {
                    imported: aborted.report.inserted,
                    skipped: 0,
                    failed: aborted.report.failed.len(),
                    errors: aborted.report.failed,
                },
                source: aborted.source,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::value::record_from;
    use crate::ids::SequentialIdGenerator;
    use crate::repository::sqlite_store::SqliteImportStore;

    fn context() -> RouteContext {
        RouteContext {
            data_source_id: "ds-1".to_string(),
            site_id: None,
            table_name: None,
            run_date: NaiveDate::from_ymd_opt(2025, 3, 14).unwrap(),
            batch_size: 100,
            now: Utc::now(),
        }
    }

    fn router() -> (DestinationRouter, Arc<SqliteImportStore>) {
        let store = Arc::new(SqliteImportStore::open_in_memory().unwrap());
        let ids = Arc::new(SequentialIdGenerator::new("id"));
        (DestinationRouter::new(store.clone(), ids), store)
    }

    #[test]
    fn test_normalize_tags() {
        assert_eq!(
            normalize_tags(&CellValue::text("vip; gold , ,new")),
            CellValue::text(r#"["vip","gold","new"]"#)
        );
        assert_eq!(
            normalize_tags(&CellValue::text(r#"["a", " b "]"#)),
            CellValue::text(r#"["a","b"]"#)
        );
        assert_eq!(normalize_tags(&CellValue::text("  ")), CellValue::Null);
        assert_eq!(normalize_tags(&CellValue::Int(7)), CellValue::text(r#"["7"]"#));
    }

    #[test]
    fn test_parse_amount_and_minutes() {
        assert_eq!(parse_amount(&CellValue::text("$1,250.50")), Some(1250.5));
        assert_eq!(parse_amount(&CellValue::Int(20)), Some(20.0));
        assert_eq!(parse_amount(&CellValue::text("ten")), None);
        assert_eq!(parse_minutes(&CellValue::text("45")), CellValue::Int(45));
        assert_eq!(parse_minutes(&CellValue::Float(29.6)), CellValue::Int(30));
        assert_eq!(parse_minutes(&CellValue::text("n/a")), CellValue::Null);
    }

    #[tokio::test]
    async fn test_members_missing_identity_and_duplicates() {
        let (router, store) = router();
        let rows = vec![
            record_from([("first_name", "John"), ("email", " John@Test.com ")]),
            record_from([("first_name", ""), ("email", "")]),
            record_from([("first_name", "Johnny"), ("email", "john@test.com")]),
            record_from([("first_name", "Jane"), ("tags", "vip;yoga")]),
        ];

        let outcome = router
            .route(DestinationType::Members, &rows, &context())
            .await
            .unwrap();

        assert_eq!(outcome.imported, 2);
        assert_eq!(outcome.skipped, 2);
        assert_eq!(outcome.failed, 0);
        assert_eq!(outcome.errors, vec![RowError::new(2, "Missing first_name and email")]);

        let mut criteria = Record::new();
        criteria.insert("first_name".to_string(), CellValue::text("Jane"));
        let jane = store.find_one("members", &criteria).await.unwrap().unwrap();
        assert_eq!(jane.get("tags"), Some(&CellValue::text(r#"["vip","yoga"]"#)));
        assert_eq!(jane.get("data_source_id"), Some(&CellValue::text("ds-1")));

        criteria.insert("first_name".to_string(), CellValue::text("John"));
        let john = store.find_one("members", &criteria).await.unwrap().unwrap();
        assert_eq!(john.get("email"), Some(&CellValue::text("john@test.com")));
    }

    #[tokio::test]
    async fn test_transactions_resolve_member() {
        let (router, _) = router();
        let ctx = context();
        router
            .route(
                DestinationType::Members,
                &[record_from([("first_name", "Ann"), ("email", "ann@example.com")])],
                &ctx,
            )
            .await
            .unwrap();

        let rows = vec![
            record_from([
                ("email", "ANN@example.com"),
                ("amount", "$42.00"),
                ("transaction_date", "2025-03-01"),
                ("category", "retail"),
            ]),
            record_from([
                ("email", "ghost@example.com"),
                ("amount", "10"),
                ("transaction_date", "2025-03-01"),
            ]),
            record_from([("email", "ann@example.com"), ("amount", "")]),
            record_from([
                ("email", "ann@example.com"),
                ("amount", "lots"),
                ("transaction_date", "2025-03-01"),
            ]),
        ];
        let outcome = router
            .route(DestinationType::Transactions, &rows, &ctx)
            .await
            .unwrap();

        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.failed, 3);
        assert_eq!(
            outcome.errors,
            vec![
                RowError::new(2, "Member not found for email: ghost@example.com"),
                RowError::new(3, "Missing required fields: amount, transaction_date"),
                RowError::new(4, "Invalid amount: lots"),
            ]
        );
    }

    #[tokio::test]
    async fn test_visits_default_date() {
        let (router, store) = router();
        let ctx = context();
        router
            .route(
                DestinationType::Members,
                &[record_from([("email", "bo@example.com")])],
                &ctx,
            )
            .await
            .unwrap();

        let rows = vec![
            record_from([("email", "bo@example.com"), ("duration_minutes", "45")]),
            record_from([("email", ""), ("location", "Main")]),
        ];
        let outcome = router.route(DestinationType::Visits, &rows, &ctx).await.unwrap();
        assert_eq!(outcome.imported, 1);
        assert_eq!(outcome.failed, 1);

        let visit = store
            .find_one("visits", &record_from([("email", "bo@example.com")]))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(visit.get("visit_date"), Some(&CellValue::text("2025-03-14")));
        assert_eq!(visit.get("duration_minutes"), Some(&CellValue::Int(45)));
    }

    #[tokio::test]
    async fn test_custom_without_table_aborts() {
        let (router, _) = router();
        let result = router
            .route(
                DestinationType::Custom,
                &[record_from([("a", "1")])],
                &context(),
            )
            .await;
        let aborted = result.unwrap_err();
        assert_eq!(aborted.partial, RouteOutcome::default());
    }
}
