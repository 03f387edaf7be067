// ==========================================
// 会员数据导入同步 - 定时同步配置
// ==========================================
// 计算: engine::schedule
// 约束: manual 永不产生下次运行时间；cron 需要表达式
// ==========================================

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Frequency {
    #[default]
    Manual,
    Hourly,
    Daily,
    Weekly,
    Monthly,
    Cron,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleConfiguration {
    pub frequency: Frequency,
    /// "HH:MM"（UTC）
    #[serde(default)]
    pub time: Option<String>,
    /// 0 = 周日
    #[serde(default)]
    pub day_of_week: Option<u32>,
    #[serde(default)]
    pub day_of_month: Option<u32>,
    #[serde(default)]
    pub cron_expression: Option<String>,
    #[serde(default)]
    pub retry_on_failure: bool,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: u32,
}

fn default_max_retries() -> u32 {
    3
}

fn default_retry_delay_minutes() -> u32 {
    15
}

impl Default for ScheduleConfiguration {
    fn default() -> Self {
        Self {
            frequency: Frequency::Manual,
            time: None,
            day_of_week: None,
            day_of_month: None,
            cron_expression: None,
            retry_on_failure: false,
            max_retries: default_max_retries(),
            retry_delay_minutes: default_retry_delay_minutes(),
        }
    }
}

impl ScheduleConfiguration {
    pub fn new(frequency: Frequency) -> Self {
        Self {
            frequency,
            ..Self::default()
        }
    }
}
