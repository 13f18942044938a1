//! # 시계(Clock) 추상화
//!
//! 캐시 만료와 연속 기록(streak) 계산은 "지금"에 의존합니다.
//! 실제 서버는 `SystemClock`을, 테스트는 `ManualClock`을 주입해
//! 벽시계 대기(sleep) 없이 만료/날짜 경계를 검증합니다.

use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

/// 현재 시각을 제공하는 트레이트
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// 운영용 시계: `Utc::now()`
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// 수동으로 움직이는 시계
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }

    pub fn set(&self, to: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = to;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// DB에 저장하는 타임스탬프 형식. SQLite의 `strftime('%Y-%m-%dT%H:%M:%fZ', 'now')`와 같습니다.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.3fZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// 저장된 타임스탬프 문자열을 파싱합니다. 형식이 다르면 RFC 3339로 한 번 더 시도합니다.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    chrono::NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT)
        .map(|naive| naive.and_utc())
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
        })
}
