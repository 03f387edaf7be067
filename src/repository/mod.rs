// ==========================================
// 会员数据导入同步 - 数据仓储层
// ==========================================
// 职责: 提供数据访问接口，屏蔽数据库细节
// 约束: 值一律参数化；动态标识符经白名单校验
// ==========================================

pub mod error;
pub mod import_store;
pub mod sqlite_store;

// 重导出核心仓储
pub use error::{RepositoryError, RepositoryResult};
pub use import_store::ImportStore;
pub use sqlite_store::{quote_ident, SqliteImportStore};
