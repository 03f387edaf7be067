// ==========================================
// 会员数据导入同步 - 配置层
// ==========================================
// 职责: 管道运行参数（批大小 / 采样数 / 错误上限 / 重试间隔）
// 存储: config_kv 表
// ==========================================

pub mod config_manager;
pub mod import_config_trait;

// 重导出核心配置管理器
pub use config_manager::{config_keys, ConfigManager};
pub use import_config_trait::{ConfigResult, PipelineConfigReader, PipelineSettings};
