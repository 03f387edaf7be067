// ==========================================
// 会员数据导入同步 - 核心库
// ==========================================
// 管道: 文件解析 → 类型识别 → 单元格清洗 → 行过滤/去重 → 字段映射 → 目标路由
// 技术栈: Rust + SQLite
// 定时同步: 下次运行时间 / 失败重试退避
// ==========================================

// 初始化国际化系统
rust_i18n::i18n!("locales", fallback = "zh-CN");

// ==========================================
// 模块声明
// ==========================================

// 领域层 - 实体与值类型
pub mod domain;

// 导入层 - 解析 / 清洗 / 映射
pub mod importer;

// 数据仓储层 - 数据访问
pub mod repository;

// 引擎层 - 路由 / 编排 / 定时
pub mod engine;

// 配置层 - 管道参数
pub mod config;

// 数据库基础设施（连接初始化/PRAGMA 统一）
pub mod db;

// ID 生成
pub mod ids;

// 日志系统
pub mod logging;

// SQL 性能埋点
pub mod perf;

// 国际化
pub mod i18n;

// ==========================================
// 重导出核心类型
// ==========================================

// 领域类型
pub use domain::{
    CellValue, ColumnConfiguration, ColumnType, DataSource, DestinationType, FieldMapping,
    Record, ScheduleConfiguration, SyncResult, SyncStatus,
};

// 导入
pub use importer::{ImportError, ImportResult, ParsedTable, UniversalFileParser};

// 仓储
pub use repository::{ImportStore, RepositoryError, RepositoryResult, SqliteImportStore};

// 引擎
pub use engine::{
    DestinationRouter, ImportTableManager, SyncError, SyncOrchestrator, SyncRequest,
};

// 配置
pub use config::{ConfigManager, PipelineSettings};

// ID
pub use ids::{IdGenerator, SequentialIdGenerator, UuidIdGenerator};

// ==========================================
// 常量定义
// ==========================================

// 系统版本
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// 系统名称
pub const APP_NAME: &str = "会员数据导入同步";
