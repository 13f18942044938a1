//! # 과금 게이트(Billing Gate)
//!
//! 작업 제출 시 한 번만 묻는 "이 사용자가 작업을 더 만들 수 있는가?" 판정입니다.
//! 요금제 자체는 외부 관심사라서, 여기서는 UTC 하루 단위 할당량만 구현합니다.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use std::sync::Arc;

use crate::clock::{format_timestamp, Clock};
use crate::db;
use crate::error::AppError;

#[async_trait]
pub trait BillingGate: Send + Sync {
    async fn may_create_job(&self, user_id: &str) -> Result<bool, AppError>;
}

/// 제한 없음 (`DAILY_JOB_QUOTA=0`)
pub struct Unmetered;

#[async_trait]
impl BillingGate for Unmetered {
    async fn may_create_job(&self, _user_id: &str) -> Result<bool, AppError> {
        Ok(true)
    }
}

/// 오늘(UTC 자정 이후) 만든 작업 수가 한도 미만이면 허용합니다.
pub struct DailyQuotaGate {
    pool: SqlitePool,
    daily_limit: u32,
    clock: Arc<dyn Clock>,
}

impl DailyQuotaGate {
    pub fn new(pool: SqlitePool, daily_limit: u32, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            daily_limit,
            clock,
        }
    }
}

#[async_trait]
impl BillingGate for DailyQuotaGate {
    async fn may_create_job(&self, user_id: &str) -> Result<bool, AppError> {
        let since = format_timestamp(start_of_day(self.clock.now()));
        let used = db::count_jobs_since(&self.pool, user_id, &since).await?;
        Ok(used < i64::from(self.daily_limit))
    }
}

/// 한도에 맞는 게이트를 고릅니다.
pub fn gate_for_quota(pool: SqlitePool, daily_limit: u32, clock: Arc<dyn Clock>) -> Arc<dyn BillingGate> {
    if daily_limit == 0 {
        Arc::new(Unmetered)
    } else {
        Arc::new(DailyQuotaGate::new(pool, daily_limit, clock))
    }
}

fn start_of_day(now: DateTime<Utc>) -> DateTime<Utc> {
    now.date_naive()
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc())
        .unwrap_or(now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn quota_window_starts_at_utc_midnight() {
        let now = Utc.with_ymd_and_hms(2026, 7, 4, 17, 45, 12).unwrap();
        assert_eq!(
            format_timestamp(start_of_day(now)),
            "2026-07-04T00:00:00.000Z"
        );
    }
}
