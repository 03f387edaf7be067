// ==========================================
// 会员数据导入同步 - ID 生成器
// ==========================================
// 用途: 运行日志 ID / 行 ID / 动态表名后缀
// 实现: UuidIdGenerator（生产）、SequentialIdGenerator（测试可复现）
// ==========================================

use std::sync::atomic::{AtomicU64, Ordering};
use uuid::Uuid;

pub trait IdGenerator: Send + Sync {
    /// 全局唯一 ID
    fn next_id(&self) -> String;

    /// 6 位小写十六进制短后缀
    fn short_suffix(&self) -> String;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct UuidIdGenerator;

impl IdGenerator for UuidIdGenerator {
    fn next_id(&self) -> String {
        Uuid::new_v4().to_string()
    }

    fn short_suffix(&self) -> String {
        Uuid::new_v4().simple().to_string()[..6].to_string()
    }
}

/// 自增 ID（"{prefix}-000001" / "000001"）
#[derive(Debug)]
pub struct SequentialIdGenerator {
    prefix: String,
    counter: AtomicU64,
}

impl SequentialIdGenerator {
    pub fn new(prefix: &str) -> Self {
        Self {
            prefix: prefix.to_string(),
            counter: AtomicU64::new(0),
        }
    }

    fn next(&self) -> u64 {
        self.counter.fetch_add(1, Ordering::Relaxed) + 1
    }
}

impl IdGenerator for SequentialIdGenerator {
    fn next_id(&self) -> String {
        format!("{}-{:06}", self.prefix, self.next())
    }

    fn short_suffix(&self) -> String {
        format!("{:06x}", self.next() & 0xff_ffff)
    }
}
