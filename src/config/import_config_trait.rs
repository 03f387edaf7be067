// ==========================================
// 会员数据导入同步 - 管道配置读取 Trait
// ==========================================
// 职责: 定义管道所需的配置读取接口（不包含实现）
// 红线: 不包含配置写入、不包含业务逻辑
// ==========================================

use async_trait::async_trait;
use std::error::Error;

/// 配置读取结果
pub type ConfigResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

// ==========================================
// PipelineConfigReader Trait
// ==========================================
// 实现者: ConfigManager（从 config_kv 表读取）
#[async_trait]
pub trait PipelineConfigReader: Send + Sync {
    /// 分批写入的每批行数
    ///
    /// # 默认值
    /// - 500
    async fn get_batch_size(&self) -> ConfigResult<usize>;

    /// 列预览采样行数
    ///
    /// # 默认值
    /// - 100
    async fn get_preview_sample_size(&self) -> ConfigResult<usize>;

    /// 运行结果中保留的行错误上限
    ///
    /// # 默认值
    /// - 50
    async fn get_max_reported_errors(&self) -> ConfigResult<usize>;

    /// 数据源未配置重试间隔时使用的基础间隔（分钟）
    ///
    /// # 默认值
    /// - 15
    async fn get_default_retry_delay_minutes(&self) -> ConfigResult<u32>;
}

// ==========================================
// PipelineSettings - 一次运行使用的配置快照
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineSettings {
    pub batch_size: usize,
    pub preview_sample_size: usize,
    pub max_reported_errors: usize,
    pub default_retry_delay_minutes: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            batch_size: 500,
            preview_sample_size: 100,
            max_reported_errors: crate::domain::sync_log::MAX_REPORTED_ERRORS,
            default_retry_delay_minutes: 15,
        }
    }
}

impl PipelineSettings {
    /// 从配置读取器加载快照
    pub async fn load<R: PipelineConfigReader + ?Sized>(reader: &R) -> ConfigResult<Self> {
        Ok(Self {
            batch_size: reader.get_batch_size().await?,
            preview_sample_size: reader.get_preview_sample_size().await?,
            max_reported_errors: reader.get_max_reported_errors().await?,
            default_retry_delay_minutes: reader.get_default_retry_delay_minutes().await?,
        })
    }
}
