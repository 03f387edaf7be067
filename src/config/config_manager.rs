// ==========================================
// 会员数据导入同步 - 配置管理器
// ==========================================
// 职责: 配置加载、查询、覆写
// 存储: config_kv 表 (key-value + scope)
// ==========================================

use crate::config::import_config_trait::{ConfigResult, PipelineConfigReader};
use crate::db::open_sqlite_connection;
use crate::domain::sync_log::MAX_REPORTED_ERRORS;
use async_trait::async_trait;
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::BTreeMap;
use std::str::FromStr;
use std::sync::{Arc, Mutex};
use tracing::warn;

// ==========================================
// ConfigManager - 配置管理器
// ==========================================
pub struct ConfigManager {
    conn: Arc<Mutex<Connection>>,
}

impl ConfigManager {
    /// 创建新的 ConfigManager 实例
    ///
    /// # 参数
    /// - db_path: 数据库文件路径
    pub fn new(db_path: &str) -> ConfigResult<Self> {
        let conn = open_sqlite_connection(db_path)?;
        crate::db::init_schema(&conn)?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// 从已有连接创建 ConfigManager（与 SqliteImportStore 共享连接）
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> ConfigResult<Self> {
        {
            let conn_guard = conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
            crate::db::configure_sqlite_connection(&conn_guard)?;
        }

        Ok(Self { conn })
    }

    /// 从 config_kv 表读取配置值（scope_id='global'）
    ///
    /// # 返回
    /// - Some(String): 配置值
    /// - None: 配置不存在
    pub fn get_global_config_value(&self, key: &str) -> ConfigResult<Option<String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;

        let value = conn
            .query_row(
                "SELECT value FROM config_kv WHERE scope_id = 'global' AND key = ?1",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    /// 写入 global scope 配置（存在则覆盖）
    pub fn set_global_config_value(&self, key: &str, value: &str) -> ConfigResult<()> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        conn.execute(
            "INSERT INTO config_kv (scope_id, key, value, updated_at) VALUES ('global', ?1, ?2, ?3)
             ON CONFLICT(scope_id, key) DO UPDATE SET value = ?2, updated_at = ?3",
            params![key, value, chrono::Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    /// 全部 global 配置（按键排序）
    pub fn get_config_snapshot(&self) -> ConfigResult<BTreeMap<String, String>> {
        let conn = self.conn.lock().map_err(|e| format!("锁获取失败: {}", e))?;
        let mut stmt =
            conn.prepare("SELECT key, value FROM config_kv WHERE scope_id = 'global' ORDER BY key")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut snapshot = BTreeMap::new();
        for row in rows {
            let (key, value) = row?;
            snapshot.insert(key, value);
        }
        Ok(snapshot)
    }

    /// 读取并解析配置；缺失或格式错误时使用默认值
    fn get_parsed_or_default<T>(&self, key: &str, default: T) -> ConfigResult<T>
    where
        T: FromStr + Copy + PartialOrd + Default,
    {
        let Some(raw) = self.get_global_config_value(key)? else {
            return Ok(default);
        };

        match raw.trim().parse::<T>() {
            Ok(v) if v > T::default() => Ok(v),
            _ => {
                warn!(config_key = key, raw_value = %raw, "配置格式错误，使用默认值");
                Ok(default)
            }
        }
    }
}

// ==========================================
// PipelineConfigReader Trait 实现
// ==========================================
#[async_trait]
impl PipelineConfigReader for ConfigManager {
    async fn get_batch_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::BATCH_SIZE, 500)
    }

    async fn get_preview_sample_size(&self) -> ConfigResult<usize> {
        self.get_parsed_or_default(config_keys::PREVIEW_SAMPLE_SIZE, 100)
    }

    /// 上限为 MAX_REPORTED_ERRORS
    async fn get_max_reported_errors(&self) -> ConfigResult<usize> {
        let limit =
            self.get_parsed_or_default(config_keys::MAX_REPORTED_ERRORS, MAX_REPORTED_ERRORS)?;
        Ok(limit.min(MAX_REPORTED_ERRORS))
    }

    async fn get_default_retry_delay_minutes(&self) -> ConfigResult<u32> {
        self.get_parsed_or_default(config_keys::DEFAULT_RETRY_DELAY_MINUTES, 15)
    }
}

/// 配置键常量
pub mod config_keys {
    // 导入
    pub const BATCH_SIZE: &str = "import.batch_size";
    pub const PREVIEW_SAMPLE_SIZE: &str = "import.preview_sample_size";
    pub const MAX_REPORTED_ERRORS: &str = "import.max_reported_errors";

    // 定时同步
    pub const DEFAULT_RETRY_DELAY_MINUTES: &str = "sync.default_retry_delay_minutes";
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::import_config_trait::PipelineSettings;

    fn manager() -> ConfigManager {
        let conn = Connection::open_in_memory().unwrap();
        crate::db::init_schema(&conn).unwrap();
        ConfigManager::from_connection(Arc::new(Mutex::new(conn))).unwrap()
    }

    #[tokio::test]
    async fn test_defaults_when_missing() {
        let config = manager();
        let settings = PipelineSettings::load(&config).await.unwrap();
        assert_eq!(settings, PipelineSettings::default());
    }

    #[tokio::test]
    async fn test_overrides_and_invalid_values() {
        let config = manager();
        config.set_global_config_value(config_keys::BATCH_SIZE, "250").unwrap();
        config.set_global_config_value(config_keys::MAX_REPORTED_ERRORS, "abc").unwrap();
        config
            .set_global_config_value(config_keys::DEFAULT_RETRY_DELAY_MINUTES, "0")
            .unwrap();

        assert_eq!(config.get_batch_size().await.unwrap(), 250);
        assert_eq!(config.get_max_reported_errors().await.unwrap(), 50);
        assert_eq!(config.get_default_retry_delay_minutes().await.unwrap(), 15);

        config.set_global_config_value(config_keys::BATCH_SIZE, "1000").unwrap();
        assert_eq!(config.get_batch_size().await.unwrap(), 1000);

        config.set_global_config_value(config_keys::MAX_REPORTED_ERRORS, "500").unwrap();
        assert_eq!(config.get_max_reported_errors().await.unwrap(), MAX_REPORTED_ERRORS);

        let snapshot = config.get_config_snapshot().unwrap();
        assert_eq!(snapshot.len(), 3);
        assert_eq!(snapshot.get(config_keys::BATCH_SIZE).map(String::as_str), Some("1000"));
    }
}
