//! 时间工具
//!
//! 任务参数与跟踪记录中的时间统一使用 `TIME_FORMAT` 格式的UTC时间，
//! 精确到秒。运行时长始终由记录下来的开始时间与结束时间相减得到。

use chrono::{NaiveDateTime, Timelike, Utc};

use crate::{FanoutError, FanoutResult};

/// 参数与缓存记录中使用的时间格式
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// 当前时间（截断到秒）
pub fn now() -> NaiveDateTime {
    let now = Utc::now().naive_utc();
    now.with_nanosecond(0).unwrap_or(now)
}

pub fn format_time(time: &NaiveDateTime) -> String {
    time.format(TIME_FORMAT).to_string()
}

pub fn parse_time(value: &str) -> FanoutResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, TIME_FORMAT)
        .map_err(|e| FanoutError::Serialization(format!("无效的时间格式 '{value}': {e}")))
}

/// 运行时长（秒）
pub fn run_time_seconds(start_time: &NaiveDateTime, end_time: &NaiveDateTime) -> i64 {
    (*end_time - *start_time).num_seconds()
}

/// 以 `H:MM:SS` 形式展示运行时长
pub fn format_run_time(seconds: i64) -> String {
    let sign = if seconds < 0 { "-" } else { "" };
    let seconds = seconds.abs();
    format!(
        "{sign}{}:{:02}:{:02}",
        seconds / 3600,
        (seconds % 3600) / 60,
        seconds % 60
    )
}
