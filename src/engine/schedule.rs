// ==========================================
// 会员数据导入同步 - 定时与重试计算
// ==========================================
// 职责: 下次同步时间 / 重试退避 / 定时配置校验 / 运行后调度决策
// 约束: 纯函数，全部按 UTC 计算
// ==========================================

use crate::domain::schedule::{Frequency, ScheduleConfiguration};
use crate::domain::types::SyncStatus;
use crate::engine::cron::CronSchedule;
use crate::i18n::{t, t_with_args};
use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveTime, Timelike, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

pub const MAX_RETRIES_LIMIT: u32 = 10;
pub const MAX_RETRY_DELAY_MINUTES: u32 = 1440;

/// 两位小时 + 两位分钟
static TIME_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([01]\d|2[0-3]):[0-5]\d$").expect("Invalid time regex"));

/// "HH:MM"；缺省为 00:00
fn parse_time(time: Option<&str>) -> Option<NaiveTime> {
    match time.map(str::trim) {
        None | Some("") => NaiveTime::from_hms_opt(0, 0, 0),
        Some(raw) if TIME_REGEX.is_match(raw) => NaiveTime::parse_from_str(raw, "%H:%M").ok(),
        Some(_) => None,
    }
}

fn days_in_month(year: i32, month: u32) -> Option<u32> {
    let (next_y, next_m) = if month == 12 {
        (year + 1, 1)
    } else {
        (year, month + 1)
    };
    Some(NaiveDate::from_ymd_opt(next_y, next_m, 1)?.pred_opt()?.day())
}

/// 指定月份的第 day 日（超出月长取月末）
fn clamped_month_day(year: i32, month: u32, day: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(year, month, day.min(days_in_month(year, month)?))
}

/// 计算下次同步时间
///
/// # 参数
/// - config: 定时配置
/// - from: 基准时间
///
/// # 返回
/// - None: manual、配置无效或 cron 无匹配
pub fn calculate_next_sync_time(
    config: &ScheduleConfiguration,
    from: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    match config.frequency {
        Frequency::Manual => None,
        Frequency::Hourly => {
            let hour_start = from.date_naive().and_hms_opt(from.hour(), 0, 0)?;
            Some((hour_start + Duration::hours(1)).and_utc())
        }
        Frequency::Daily => {
            let time = parse_time(config.time.as_deref())?;
            let today = from.date_naive().and_time(time).and_utc();
            if today > from {
                Some(today)
            } else {
                Some(today + Duration::days(1))
            }
        }
        Frequency::Weekly => {
            let time = parse_time(config.time.as_deref())?;
            let target = config.day_of_week.unwrap_or(0);
            if target > 6 {
                return None;
            }
            let current = from.weekday().num_days_from_sunday();
            let days_ahead = (target + 7 - current) % 7;
            let candidate = (from.date_naive() + Duration::days(i64::from(days_ahead)))
                .and_time(time)
                .and_utc();
            if candidate > from {
                Some(candidate)
            } else {
                Some(candidate + Duration::days(7))
            }
        }
        Frequency::Monthly => {
            let time = parse_time(config.time.as_deref())?;
            let day = config.day_of_month.unwrap_or(1);
            if !(1..=31).contains(&day) {
                return None;
            }
            let this_month = clamped_month_day(from.year(), from.month(), day)?
                .and_time(time)
                .and_utc();
            if this_month > from {
                return Some(this_month);
            }
            let (y, m) = if from.month() == 12 {
                (from.year() + 1, 1)
            } else {
                (from.year(), from.month() + 1)
            };
            Some(clamped_month_day(y, m, day)?.and_time(time).and_utc())
        }
        Frequency::Cron => {
            let expression = config.cron_expression.as_deref()?;
            CronSchedule::parse(expression).ok()?.next_after(from)
        }
    }
}

/// 重试间隔（分钟）= base × 2^(attempt-1)
///
/// attempt 为 0 时按 1 计算，结果饱和于 u32::MAX
pub fn calculate_retry_delay(attempt: u32, base_delay_minutes: u32) -> u32 {
    let exponent = attempt.max(1) - 1;
    base_delay_minutes.saturating_mul(2u32.saturating_pow(exponent))
}

/// 是否继续重试（attempt 为已安排的重试次数）
pub fn should_retry(attempt: u32, config: &ScheduleConfiguration) -> bool {
    config.retry_on_failure && attempt < config.max_retries
}

// ==========================================
// 运行后调度决策
// ==========================================
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextRunPlan {
    pub next_sync_at: Option<DateTime<Utc>>,
    pub retry_attempt: u32,
    pub is_retry: bool,
}

/// 根据本次运行结果决定下次运行
///
/// # 规则
/// - failed 且允许重试: now + 退避间隔，重试次数 +1
/// - 其余（成功 / 部分成功 / 重试耗尽）: 常规下次时间，重试次数归零
pub fn plan_next_run(
    config: &ScheduleConfiguration,
    status: SyncStatus,
    retry_attempt: u32,
    now: DateTime<Utc>,
) -> NextRunPlan {
    if status == SyncStatus::Failed && should_retry(retry_attempt, config) {
        let attempt = retry_attempt + 1;
        let delay = calculate_retry_delay(attempt, config.retry_delay_minutes);
        return NextRunPlan {
            next_sync_at: Some(now + Duration::minutes(i64::from(delay))),
            retry_attempt: attempt,
            is_retry: true,
        };
    }

    NextRunPlan {
        next_sync_at: calculate_next_sync_time(config, now),
        retry_attempt: 0,
        is_retry: false,
    }
}

// ==========================================
// 定时配置校验
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScheduleIssue {
    pub field: &'static str,
    pub message: String,
}

impl ScheduleIssue {
    fn new(field: &'static str, message: String) -> Self {
        Self { field, message }
    }
}

/// 校验定时配置
///
/// # 返回
/// - Err(问题列表): 每个无效字段一项，消息按当前语言输出
pub fn validate_schedule_config(config: &ScheduleConfiguration) -> Result<(), Vec<ScheduleIssue>> {
    let mut issues = Vec::new();

    if config.frequency == Frequency::Cron {
        match config.cron_expression.as_deref().map(str::trim) {
            None | Some("") => {
                issues.push(ScheduleIssue::new(
                    "cron_expression",
                    t("schedule.cron_required"),
                ));
            }
            Some(expr) => {
                if let Err(e) = CronSchedule::parse(expr) {
                    issues.push(ScheduleIssue::new(
                        "cron_expression",
                        t_with_args(
                            "schedule.cron_invalid",
                            &[("expression", expr), ("reason", e.to_string().as_str())],
                        ),
                    ));
                }
            }
        }
    }

    if let Some(time) = config.time.as_deref() {
        if parse_time(Some(time)).is_none() {
            issues.push(ScheduleIssue::new(
                "time",
                t_with_args("schedule.time_invalid", &[("time", time)]),
            ));
        }
    }

    if let Some(day) = config.day_of_week {
        if day > 6 {
            issues.push(ScheduleIssue::new(
                "day_of_week",
                t_with_args("schedule.day_of_week_range", &[("value", day.to_string().as_str())]),
            ));
        }
    }

    if let Some(day) = config.day_of_month {
        if !(1..=31).contains(&day) {
            issues.push(ScheduleIssue::new(
                "day_of_month",
                t_with_args("schedule.day_of_month_range", &[("value", day.to_string().as_str())]),
            ));
        }
    }

    if config.max_retries > MAX_RETRIES_LIMIT {
        issues.push(ScheduleIssue::new(
            "max_retries",
            t_with_args(
                "schedule.max_retries_range",
                &[("value", config.max_retries.to_string().as_str())],
            ),
        ));
    }

    if !(1..=MAX_RETRY_DELAY_MINUTES).contains(&config.retry_delay_minutes) {
        issues.push(ScheduleIssue::new(
            "retry_delay_minutes",
            t_with_args(
                "schedule.retry_delay_range",
                &[("value", config.retry_delay_minutes.to_string().as_str())],
            ),
        ));
    }

    if issues.is_empty() {
        Ok(())
    } else {
        Err(issues)
    }
}
