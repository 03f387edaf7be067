// ==========================================
// 会员数据导入同步 - Cron 表达式
// ==========================================
// 格式: 分 时 日 月 周（5 段，UTC）
// 支持: * / 列表(,) / 范围(-) / 步长(/)；周 0 与 7 均为周日
// 日与周同时受限时按"或"匹配
// ==========================================

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, Timelike, Utc};
use thiserror::Error;

/// 向后搜索上限（年）
const SEARCH_YEARS: i32 = 5;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CronParseError {
    #[error("Cron 表达式需要 5 段，实际 {0} 段")]
    FieldCount(usize),

    #[error("Cron 字段 {field} 无效: {value}")]
    InvalidField { field: &'static str, value: String },
}

/// 单字段取值集合（位图）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FieldSet(u64);

impl FieldSet {
    fn contains(&self, value: u32) -> bool {
        value < 64 && self.0 & (1u64 << value) != 0
    }
}

struct FieldBounds {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldBounds = FieldBounds { name: "minute", min: 0, max: 59 };
const HOUR: FieldBounds = FieldBounds { name: "hour", min: 0, max: 23 };
const DAY_OF_MONTH: FieldBounds = FieldBounds { name: "day_of_month", min: 1, max: 31 };
const MONTH: FieldBounds = FieldBounds { name: "month", min: 1, max: 12 };
const DAY_OF_WEEK: FieldBounds = FieldBounds { name: "day_of_week", min: 0, max: 7 };

fn parse_field(raw: &str, bounds: &FieldBounds) -> Result<FieldSet, CronParseError> {
    let invalid = || CronParseError::InvalidField {
        field: bounds.name,
        value: raw.to_string(),
    };
    let number = |s: &str| -> Result<u32, CronParseError> {
        let n = s.parse::<u32>().map_err(|_| invalid())?;
        if n < bounds.min || n > bounds.max {
            return Err(invalid());
        }
        Ok(n)
    };

    let mut bits = 0u64;
    for part in raw.split(',') {
        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step.parse::<u32>().map_err(|_| invalid())?;
                if step == 0 || step > bounds.max {
                    return Err(invalid());
                }
                (range, step)
            }
            None => (part, 1),
        };

        let (start, end) = if range == "*" {
            (bounds.min, bounds.max)
        } else if let Some((a, b)) = range.split_once('-') {
            let (a, b) = (number(a)?, number(b)?);
            if a > b {
                return Err(invalid());
            }
            (a, b)
        } else {
            let a = number(range)?;
            // "a/step" 表示从 a 到上限
            if part.contains('/') {
                (a, bounds.max)
            } else {
                (a, a)
            }
        };

        let mut v = start;
        while v <= end {
            bits |= 1u64 << v;
            match v.checked_add(step) {
                Some(next) => v = next,
                None => break,
            }
        }
    }
    Ok(FieldSet(bits))
}

// ==========================================
// CronSchedule - 已解析的 Cron 表达式
// ==========================================
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CronSchedule {
    minutes: FieldSet,
    hours: FieldSet,
    days_of_month: FieldSet,
    months: FieldSet,
    days_of_week: FieldSet,
    dom_restricted: bool,
    dow_restricted: bool,
}

impl CronSchedule {
    pub fn parse(expression: &str) -> Result<Self, CronParseError> {
        let fields: Vec<&str> = expression.split_whitespace().collect();
        if fields.len() != 5 {
            return Err(CronParseError::FieldCount(fields.len()));
        }

        let mut days_of_week = parse_field(fields[4], &DAY_OF_WEEK)?;
        if days_of_week.contains(7) {
            days_of_week = FieldSet((days_of_week.0 | 1) & !(1u64 << 7));
        }

        Ok(Self {
            minutes: parse_field(fields[0], &MINUTE)?,
            hours: parse_field(fields[1], &HOUR)?,
            days_of_month: parse_field(fields[2], &DAY_OF_MONTH)?,
            months: parse_field(fields[3], &MONTH)?,
            days_of_week,
            dom_restricted: !fields[2].starts_with('*'),
            dow_restricted: !fields[4].starts_with('*'),
        })
    }

    fn day_matches(&self, date: NaiveDate) -> bool {
        let dom = self.days_of_month.contains(date.day());
        let dow = self
            .days_of_week
            .contains(date.weekday().num_days_from_sunday());
        match (self.dom_restricted, self.dow_restricted) {
            (true, true) => dom || dow,
            (true, false) => dom,
            (false, true) => dow,
            (false, false) => true,
        }
    }

    /// 严格晚于 from 的首个匹配分钟
    ///
    /// # 返回
    /// - None: 5 年内无匹配（如 2 月 30 日）
    pub fn next_after(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let start_secs = from.timestamp().div_euclid(60) * 60 + 60;
        let mut t: NaiveDateTime = DateTime::from_timestamp(start_secs, 0)?.naive_utc();
        let limit = t.checked_add_signed(Duration::days(366 * i64::from(SEARCH_YEARS)))?;

        while t <= limit {
            if !self.months.contains(t.month()) {
                let (y, m) = if t.month() == 12 {
                    (t.year() + 1, 1)
                } else {
                    (t.year(), t.month() + 1)
                };
                t = NaiveDate::from_ymd_opt(y, m, 1)?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.day_matches(t.date()) {
                t = t.date().succ_opt()?.and_hms_opt(0, 0, 0)?;
                continue;
            }
            if !self.hours.contains(t.hour()) {
                t = t.date().and_hms_opt(t.hour(), 0, 0)? + Duration::hours(1);
                continue;
            }
            if !self.minutes.contains(t.minute()) {
                t += Duration::minutes(1);
                continue;
            }
            return Some(t.and_utc());
        }
        None
    }
}
