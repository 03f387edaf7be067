// ==========================================
// 定时与重试集成测试
// ==========================================
// 测试目标: 各频率下次运行时间、重试退避、运行后调度决策、配置校验
// ==========================================

use chrono::{DateTime, Duration, TimeZone, Utc};
use member_import_sync::domain::{Frequency, ScheduleConfiguration, SyncStatus};
use member_import_sync::engine::{
    calculate_next_sync_time, calculate_retry_delay, plan_next_run, should_retry,
    validate_schedule_config,
};

fn at(y: i32, m: u32, d: u32, h: u32, min: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(y, m, d, h, min, 0).unwrap()
}

fn schedule(frequency: Frequency) -> ScheduleConfiguration {
    ScheduleConfiguration::new(frequency)
}

#[test]
fn test_retry_delay_doubles() {
    assert_eq!(calculate_retry_delay(1, 15), 15);
    assert_eq!(calculate_retry_delay(2, 15), 30);
    assert_eq!(calculate_retry_delay(3, 15), 60);
    assert_eq!(calculate_retry_delay(0, 15), 15);
    assert_eq!(calculate_retry_delay(40, 15), u32::MAX);
}

#[test]
fn test_next_time_is_after_from_and_deterministic() {
    let configs = vec![
        schedule(Frequency::Hourly),
        ScheduleConfiguration {
            time: Some("06:30".to_string()),
            ..schedule(Frequency::Daily)
        },
        ScheduleConfiguration {
            time: Some("09:00".to_string()),
            day_of_week: Some(1),
            ..schedule(Frequency::Weekly)
        },
        ScheduleConfiguration {
            day_of_month: Some(31),
            ..schedule(Frequency::Monthly)
        },
        ScheduleConfiguration {
            cron_expression: Some("*/20 8-17 * * 1-5".to_string()),
            ..schedule(Frequency::Cron)
        },
    ];
    let starts = [
        at(2025, 1, 1, 0, 0),
        at(2025, 2, 28, 23, 59),
        at(2025, 6, 15, 12, 30),
        at(2025, 12, 31, 18, 0),
    ];

    for config in &configs {
        for from in starts {
            let next = calculate_next_sync_time(config, from)
                .unwrap_or_else(|| panic!("{:?} from {}", config.frequency, from));
            assert!(next > from, "{:?}: {} !> {}", config.frequency, next, from);
            assert_eq!(calculate_next_sync_time(config, from), Some(next));
        }
    }
}

#[test]
fn test_next_time_examples() {
    let daily = ScheduleConfiguration {
        time: Some("03:00".to_string()),
        ..schedule(Frequency::Daily)
    };
    assert_eq!(
        calculate_next_sync_time(&daily, at(2025, 3, 10, 2, 0)),
        Some(at(2025, 3, 10, 3, 0))
    );
    assert_eq!(
        calculate_next_sync_time(&daily, at(2025, 3, 10, 3, 0)),
        Some(at(2025, 3, 11, 3, 0))
    );

    // 2025-03-10 为周一
    let weekly = ScheduleConfiguration {
        day_of_week: Some(0),
        ..schedule(Frequency::Weekly)
    };
    assert_eq!(
        calculate_next_sync_time(&weekly, at(2025, 3, 10, 8, 0)),
        Some(at(2025, 3, 16, 0, 0))
    );

    let monthly = ScheduleConfiguration {
        day_of_month: Some(31),
        time: Some("12:00".to_string()),
        ..schedule(Frequency::Monthly)
    };
    assert_eq!(
        calculate_next_sync_time(&monthly, at(2025, 1, 31, 13, 0)),
        Some(at(2025, 2, 28, 12, 0))
    );

    assert_eq!(
        calculate_next_sync_time(&schedule(Frequency::Manual), at(2025, 1, 1, 0, 0)),
        None
    );
}

#[test]
fn test_plan_after_failure_and_exhaustion() {
    let config = ScheduleConfiguration {
        retry_on_failure: true,
        max_retries: 2,
        retry_delay_minutes: 10,
        ..schedule(Frequency::Daily)
    };
    let now = at(2025, 4, 1, 10, 0);

    let first = plan_next_run(&config, SyncStatus::Failed, 0, now);
    assert!(first.is_retry);
    assert_eq!(first.retry_attempt, 1);
    assert_eq!(first.next_sync_at, Some(now + Duration::minutes(10)));

    let second = plan_next_run(&config, SyncStatus::Failed, 1, now);
    assert_eq!(second.next_sync_at, Some(now + Duration::minutes(20)));

    // 重试用尽 → 回到常规计划并归零
    assert!(!should_retry(2, &config));
    let exhausted = plan_next_run(&config, SyncStatus::Failed, 2, now);
    assert!(!exhausted.is_retry);
    assert_eq!(exhausted.retry_attempt, 0);
    assert_eq!(exhausted.next_sync_at, Some(at(2025, 4, 2, 0, 0)));

    let recovered = plan_next_run(&config, SyncStatus::Partial, 1, now);
    assert_eq!(recovered.retry_attempt, 0);
    assert!(!recovered.is_retry);
}

#[test]
fn test_validation_reports_each_field() {
    assert!(validate_schedule_config(&schedule(Frequency::Daily)).is_ok());

    let config = ScheduleConfiguration {
        time: Some("25:00".to_string()),
        day_of_week: Some(7),
        day_of_month: Some(0),
        cron_expression: None,
        max_retries: 11,
        retry_delay_minutes: 0,
        ..schedule(Frequency::Cron)
    };
    let issues = validate_schedule_config(&config).unwrap_err();
    let fields: Vec<&str> = issues.iter().map(|i| i.field).collect();
    assert_eq!(
        fields,
        vec![
            "cron_expression",
            "time",
            "day_of_week",
            "day_of_month",
            "max_retries",
            "retry_delay_minutes",
        ]
    );
    assert!(issues[1].message.contains("25:00"));

    for loose in ["9:30", "09:5"] {
        let config = ScheduleConfiguration {
            time: Some(loose.to_string()),
            ..schedule(Frequency::Daily)
        };
        let issues = validate_schedule_config(&config).unwrap_err();
        assert_eq!(issues.len(), 1, "{loose}");
        assert_eq!(issues[0].field, "time");
        assert!(issues[0].message.contains(loose));
    }

    let bad_cron = ScheduleConfiguration {
        cron_expression: Some("* * *".to_string()),
        ..schedule(Frequency::Cron)
    };
    let issues = validate_schedule_config(&bad_cron).unwrap_err();
    assert_eq!(issues.len(), 1);
    assert!(issues[0].message.contains("* * *"));
}
