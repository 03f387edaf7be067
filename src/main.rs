// ==========================================
// 会员数据导入同步 - 命令行入口
// ==========================================
// 用法: member-import-sync [db_path] <data_source_id> <file>
//       未指定 db_path 时使用 MEMBER_IMPORT_DB_PATH 或用户数据目录
// 行为: 以已保存的数据源配置对文件执行一次同步并输出摘要
// ==========================================

use anyhow::{anyhow, Context, Result};
use member_import_sync::config::{ConfigManager, PipelineSettings};
use member_import_sync::db::get_default_db_path;
use member_import_sync::i18n::{t, t_with_args};
use member_import_sync::importer::analyze_columns;
use member_import_sync::{
    logging, ImportStore, SqliteImportStore, SyncOrchestrator, SyncRequest, SyncStatus,
    UniversalFileParser, UuidIdGenerator,
};
use std::sync::Arc;
use tracing::{debug, info};

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let (db_path, data_source_id, file_path) = match args.as_slice() {
        [db_path, data_source_id, file_path] => {
            (db_path.clone(), data_source_id, file_path)
        }
        [data_source_id, file_path] => (get_default_db_path(), data_source_id, file_path),
        _ => {
            eprintln!("{}", t("cli.usage"));
            std::process::exit(2);
        }
    };

    info!("==================================================");
    info!("{} v{}", member_import_sync::APP_NAME, member_import_sync::VERSION);
    info!("使用数据库: {}", db_path);
    info!("==================================================");

    let store = Arc::new(
        SqliteImportStore::open(&db_path).with_context(|| format!("无法打开数据库: {}", db_path))?,
    );
    let config = ConfigManager::from_connection(store.connection()).map_err(|e| anyhow!(e))?;
    let settings = PipelineSettings::load(&config).await.map_err(|e| anyhow!(e))?;

    let data_source = store
        .get_data_source(data_source_id)
        .await?
        .ok_or_else(|| {
            anyhow!(t_with_args(
                "cli.data_source_not_found",
                &[("id", data_source_id.as_str())]
            ))
        })?;

    let table = UniversalFileParser
        .parse(file_path)
        .with_context(|| format!("文件解析失败: {}", file_path))?;
    println!(
        "{}",
        t_with_args(
            "cli.parsed_file",
            &[
                ("path", file_path.as_str()),
                ("rows", table.rows.len().to_string().as_str()),
                ("columns", table.headers.len().to_string().as_str()),
            ]
        )
    );

    for preview in analyze_columns(&table, settings.preview_sample_size) {
        debug!(
            column = %preview.name,
            detected = %preview.detected_type,
            confidence = preview.confidence,
            nulls = preview.null_count,
            "列预览"
        );
    }

    let orchestrator = SyncOrchestrator::new(store.clone(), Arc::new(UuidIdGenerator), settings);
    let result = match orchestrator
        .run(SyncRequest::new(data_source, table.records()))
        .await
    {
        Ok(result) => result,
        Err(e) => {
            eprintln!(
                "{}",
                t_with_args("cli.run_error", &[("message", e.to_string().as_str())])
            );
            std::process::exit(1);
        }
    };

    println!(
        "{}",
        t_with_args(
            "cli.sync_summary",
            &[
                ("status", result.status.as_str()),
                ("imported", result.records_imported.to_string().as_str()),
                ("skipped", result.records_skipped.to_string().as_str()),
                ("failed", result.records_failed.to_string().as_str()),
            ]
        )
    );
    if let Some(message) = &result.error_message {
        println!("{}", t_with_args("cli.run_error", &[("message", message.as_str())]));
    }
    for error in &result.errors {
        println!(
            "{}",
            t_with_args(
                "cli.row_error",
                &[
                    ("row", error.row.to_string().as_str()),
                    ("message", error.message.as_str()),
                ]
            )
        );
    }
    if let Some(next) = result.next_sync_at {
        println!(
            "{}",
            t_with_args("cli.next_sync", &[("at", next.to_rfc3339().as_str())])
        );
    }

    if result.status == SyncStatus::Failed {
        std::process::exit(1);
    }
    Ok(())
}
