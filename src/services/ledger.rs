//! # 게임화 원장(Gamification Ledger)
//!
//! 완료된 작업 하나의 결과를 사용자의 누적 진행도(`UserProgress`)에 접어 넣습니다.
//!
//! 계산 자체는 DB와 무관한 순수 함수(`apply_result` 등)이고,
//! `Ledger`는 그 결과를 저장하고 랭커를 호출하는 얇은 껍데기입니다.
//!
//! ## 동시성
//! 레벨업과 이동 평균 계산은 순서에 민감하므로, 같은 사용자의 완료 처리는
//! 사용자별 잠금으로 직렬화합니다. 잠금 순서는 언제나
//! 사용자 잠금 → 랭커 쓰기 잠금 → DB 트랜잭션입니다.
//!
//! ## 원자성
//! 진행도 저장, 리더보드 재정렬, `analyzing → completed` 전이는 한 트랜잭션으로
//! 커밋됩니다. 재정렬은 그 안의 savepoint에서 돌기 때문에, 재정렬만 실패하면
//! 그 부분만 되돌리고 진행도와 완료는 커밋한 뒤 재정렬을 다시 시도합니다.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use sqlx::{Connection, SqlitePool};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use crate::clock::{format_timestamp, parse_timestamp, Clock};
use crate::db;
use crate::error::AppError;
use crate::models::{AnalysisResult, JobStatus, LeaderboardPeriod, UserProgress};
use crate::services::cache::ScoreCache;
use crate::services::ranker::Ranker;

/// 개선율이 이 값 이상이면 높은 보상
pub const HIGH_IMPROVEMENT_CUTOFF: f64 = 70.0;
pub const HIGH_IMPROVEMENT_XP: i64 = 50;
pub const STANDARD_XP: i64 = 30;

const BASE_THRESHOLD: f64 = 100.0;
const THRESHOLD_GROWTH: f64 = 1.5;

const INLINE_RERANK_ATTEMPTS: u32 = 3;
const DEFERRED_RERANK_ATTEMPTS: u32 = 5;

/// 작업 하나에 대한 경험치 보상 (계단 함수)
pub fn experience_award(improvement_percentage: f64) -> i64 {
    if improvement_percentage >= HIGH_IMPROVEMENT_CUTOFF {
        HIGH_IMPROVEMENT_XP
    } else {
        STANDARD_XP
    }
}

/// `level`에서 다음 레벨로 가는 데 필요한 경험치: floor(100 * 1.5^(level-1))
pub fn threshold_for_level(level: i64) -> i64 {
    let exponent = i32::try_from(level.saturating_sub(1).max(0)).unwrap_or(i32::MAX);
    (BASE_THRESHOLD * THRESHOLD_GROWTH.powi(exponent)).floor() as i64
}

/// 경험치를 더하고 레벨업을 반복 적용합니다. 오른 레벨 수를 반환합니다.
///
/// 한 번에 주든 나눠서 주든 총량이 같으면 결과도 같습니다.
pub fn apply_experience(progress: &mut UserProgress, award: i64) -> i64 {
    progress.experience += award;
    let mut gained = 0;
    while progress.experience >= progress.experience_to_next_level {
        progress.experience -= progress.experience_to_next_level;
        progress.level += 1;
        progress.experience_to_next_level = threshold_for_level(progress.level);
        gained += 1;
    }
    gained
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreakChange {
    /// 이전 활동 기록 없음
    Started,
    /// 같은 날 두 번째 이후 활동. 아무 필드도 바뀌지 않습니다.
    SameDay,
    Extended,
    /// 하루 이상 비어 1로 초기화
    Reset,
}

/// UTC 달력 날짜 기준으로 연속 기록을 갱신합니다.
///
/// 같은 날 활동은 `last_activity_at`까지 포함해 완전히 no-op입니다.
pub fn update_streak(progress: &mut UserProgress, now: DateTime<Utc>) -> StreakChange {
    let last_day = progress
        .last_activity_at
        .as_deref()
        .and_then(parse_timestamp)
        .map(|at| at.date_naive());

    let change = match last_day {
        None => {
            progress.current_streak = 1;
            StreakChange::Started
        }
        Some(last) => match (now.date_naive() - last).num_days() {
            // 시계가 뒤로 간 경우도 같은 날로 봅니다.
            days if days <= 0 => return StreakChange::SameDay,
            1 => {
                progress.current_streak += 1;
                StreakChange::Extended
            }
            _ => {
                progress.current_streak = 1;
                StreakChange::Reset
            }
        },
    };

    progress.longest_streak = progress.longest_streak.max(progress.current_streak);
    progress.last_activity_at = Some(format_timestamp(now));
    change
}

/// 리더보드 점수: floor(jobs*10 + avg_improvement*5 + level*50 + streak*15 + avg_quality*2)
pub fn leaderboard_score(progress: &UserProgress) -> i64 {
    let raw = progress.total_jobs as f64 * 10.0
        + progress.average_improvement * 5.0
        + progress.level as f64 * 50.0
        + progress.current_streak as f64 * 15.0
        + progress.average_quality * 2.0;
    raw.floor() as i64
}

/// 원장 적용 결과
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerOutcome {
    pub progress: UserProgress,
    pub experience_awarded: i64,
    pub levels_gained: i64,
    pub streak: StreakChange,
    pub score: i64,
}

/// 작업 결과 하나를 진행도에 반영합니다 (순수 함수).
pub fn apply_result(
    mut progress: UserProgress,
    result: &AnalysisResult,
    now: DateTime<Utc>,
) -> LedgerOutcome {
    let improvement = result.improvement_percentage;

    let experience_awarded = experience_award(improvement);
    let levels_gained = apply_experience(&mut progress, experience_awarded);

    progress.total_jobs += 1;
    if improvement > 0.0 {
        progress.optimized_jobs += 1;
    }
    progress.total_improvement += improvement;
    let n = progress.total_jobs as f64;
    progress.average_improvement = progress.total_improvement / n;
    progress.average_quality = (progress.average_quality * (n - 1.0) + result.quality_score) / n;

    let streak = update_streak(&mut progress, now);
    progress.updated_at = format_timestamp(now);

    let score = leaderboard_score(&progress);
    LedgerOutcome {
        progress,
        experience_awarded,
        levels_gained,
        streak,
        score,
    }
}

/// 원장에 접어 넣을 완료 작업 하나
#[derive(Debug, Clone, Copy)]
pub struct CompletedJob<'a> {
    pub job_id: &'a str,
    pub user_id: &'a str,
    pub result: &'a AnalysisResult,
    /// `analysis_jobs.result`에 그대로 저장될 JSON
    pub result_json: &'a str,
    pub processing_time_ms: i64,
}

/// 원장 핸들. 진행도 저장과 랭커 호출, 캐시 무효화를 묶습니다.
#[derive(Clone)]
pub struct Ledger {
    pool: SqlitePool,
    ranker: Ranker,
    cache: ScoreCache,
    clock: Arc<dyn Clock>,
    user_locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
    deferred_backoff: Duration,
}

impl Ledger {
    pub fn new(pool: SqlitePool, ranker: Ranker, cache: ScoreCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            ranker,
            cache,
            clock,
            user_locks: Arc::new(DashMap::new()),
            deferred_backoff: Duration::from_secs(5),
        }
    }

    /// 백그라운드 재정렬의 n번째 재시도는 n × `backoff`만큼 기다립니다.
    pub fn with_deferred_backoff(mut self, backoff: Duration) -> Self {
        self.deferred_backoff = backoff;
        self
    }

    /// 지금 잡혀 있거나 대기 중인 사용자 잠금 수
    pub fn tracked_user_locks(&self) -> usize {
        self.user_locks.len()
    }

    fn user_lock(&self, user_id: &str) -> Arc<Mutex<()>> {
        self.user_locks
            .entry(user_id.to_string())
            .or_default()
            .clone()
    }

    /// 아무도 쓰지 않는 잠금은 맵에서 뺍니다. 가드를 먼저 놓은 뒤 호출합니다.
    fn release_user_lock(&self, user_id: &str, lock: Arc<Mutex<()>>) {
        drop(lock);
        self.user_locks
            .remove_if(user_id, |_, held| Arc::strong_count(held) == 1);
    }

    /// 완료된 작업의 결과를 사용자 진행도에 반영하고, 순위를 다시 계산하고,
    /// 작업을 `completed`로 바꿉니다.
    ///
    /// 작업이 아직 `analyzing`이 아니면(다른 경로에서 이미 끝남) 아무것도 바꾸지 않고
    /// `None`을 돌려줍니다.
    pub async fn apply_completion(
        &self,
        job: CompletedJob<'_>,
    ) -> Result<Option<LedgerOutcome>, AppError> {
        let lock = self.user_lock(job.user_id);
        let applied = {
            let _guard = lock.lock().await;
            self.apply_locked(job).await
        };
        self.release_user_lock(job.user_id, lock);
        applied
    }

    async fn apply_locked(&self, job: CompletedJob<'_>) -> Result<Option<LedgerOutcome>, AppError> {
        let now = self.clock.now();
        let stamp = format_timestamp(now);

        let writer = self.ranker.writer().await;
        let mut tx = self.pool.begin().await?;
        db::ensure_progress(&mut *tx, job.user_id, &stamp).await?;
        match db::get_job_status(&mut *tx, job.job_id).await? {
            Some(status) if status == JobStatus::Analyzing.as_str() => {}
            Some(status) => {
                tracing::debug!(job_id = job.job_id, %status, "job already resolved, ledger untouched");
                return Ok(None);
            }
            None => {
                return Err(AppError::JobFailed(format!(
                    "job {} disappeared",
                    job.job_id
                )))
            }
        }

        let current = db::get_progress(&mut *tx, job.user_id)
            .await?
            .unwrap_or_else(|| UserProgress::new(job.user_id, &stamp));
        let outcome = apply_result(current, job.result, now);
        db::save_progress(&mut *tx, &outcome.progress).await?;

        let ranked = {
            let mut savepoint = Connection::begin(&mut *tx).await?;
            match self
                .ranker
                .record_score_in(&mut *savepoint, job.user_id, LeaderboardPeriod::AllTime, outcome.score)
                .await
            {
                Ok(_) => {
                    savepoint.commit().await?;
                    true
                }
                Err(e) => {
                    tracing::warn!(user_id = job.user_id, error = %e, "re-rank failed, committing progress without it");
                    savepoint.rollback().await?;
                    false
                }
            }
        };

        // 같은 트랜잭션에서 analyzing을 확인했으므로 여기서 0행일 수 없습니다.
        if !db::complete_job(
            &mut *tx,
            job.job_id,
            job.result_json,
            job.processing_time_ms,
            &stamp,
        )
        .await?
        {
            return Err(AppError::JobFailed(format!(
                "job {} left analyzing state before completion",
                job.job_id
            )));
        }
        tx.commit().await?;
        drop(writer);

        self.cache.invalidate_user(job.user_id);
        if ranked {
            self.cache.invalidate_leaderboards();
        }
        tracing::info!(
            user_id = job.user_id,
            job_id = job.job_id,
            xp = outcome.experience_awarded,
            level = outcome.progress.level,
            streak = outcome.progress.current_streak,
            score = outcome.score,
            ranked,
            "ledger applied"
        );

        if !ranked {
            self.publish_score(job.user_id, outcome.score).await;
        }
        Ok(Some(outcome))
    }

    /// 재정렬을 몇 번 바로 재시도하고, 그래도 실패하면 백그라운드로 미룹니다.
    async fn publish_score(&self, user_id: &str, score: i64) {
        for attempt in 1..=INLINE_RERANK_ATTEMPTS {
            match self
                .ranker
                .record_score(user_id, LeaderboardPeriod::AllTime, score)
                .await
            {
                Ok(()) => return,
                Err(e) => {
                    tracing::warn!(user_id, attempt, error = %e, "re-rank failed");
                    tokio::time::sleep(Duration::from_millis(50 * u64::from(attempt))).await;
                }
            }
        }
        self.defer_rerank(user_id.to_string());
    }

    fn defer_rerank(&self, user_id: String) {
        let ledger = self.clone();
        tokio::spawn(async move {
            for attempt in 1..=DEFERRED_RERANK_ATTEMPTS {
                tokio::time::sleep(ledger.deferred_backoff * attempt).await;
                match ledger.rerank_from_stored(&user_id).await {
                    Ok(score) => {
                        tracing::info!(user_id = %user_id, attempt, score, "deferred re-rank succeeded");
                        return;
                    }
                    Err(e) => {
                        tracing::warn!(user_id = %user_id, attempt, error = %e, "deferred re-rank failed")
                    }
                }
            }
            tracing::error!(user_id = %user_id, "giving up on deferred re-rank");
        });
    }

    /// 그사이 다른 작업이 진행도를 바꿨을 수 있으므로 저장된 값에서 점수를 다시 계산합니다.
    async fn rerank_from_stored(&self, user_id: &str) -> Result<i64, AppError> {
        let lock = self.user_lock(user_id);
        let reranked = {
            let _guard = lock.lock().await;
            self.rerank_stored_locked(user_id).await
        };
        self.release_user_lock(user_id, lock);
        reranked
    }

    async fn rerank_stored_locked(&self, user_id: &str) -> Result<i64, AppError> {
        let progress = db::get_progress(&self.pool, user_id)
            .await?
            .ok_or(AppError::NotFound)?;
        let score = leaderboard_score(&progress);
        self.ranker
            .record_score(user_id, LeaderboardPeriod::AllTime, score)
            .await?;
        Ok(score)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn day(d: u32, hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, d, hour, 0, 0).unwrap()
    }

    fn fresh() -> UserProgress {
        UserProgress::new("u1", "2026-03-01T00:00:00.000Z")
    }

    fn result(improvement: f64, quality: f64) -> AnalysisResult {
        AnalysisResult {
            original_complexity: "O(n^2)".into(),
            optimized_complexity: "O(n)".into(),
            improvement_percentage: improvement,
            suggestions: vec![],
            quality_score: quality,
            readability_score: 70.0,
            optimized_code: None,
            used_fallback: false,
            fallback_reason: None,
        }
    }

    #[test]
    fn thresholds_grow_geometrically() {
        assert_eq!(threshold_for_level(1), 100);
        assert_eq!(threshold_for_level(2), 150);
        assert_eq!(threshold_for_level(3), 225);
        assert_eq!(threshold_for_level(4), 337);
    }

    #[test]
    fn award_is_a_step_function() {
        assert_eq!(experience_award(69.9), 30);
        assert_eq!(experience_award(70.0), 50);
        assert_eq!(experience_award(0.0), 30);
    }

    #[test]
    fn leveling_is_independent_of_how_the_award_is_split() {
        let mut lump = fresh();
        assert_eq!(apply_experience(&mut lump, 250), 2);

        let mut split = fresh();
        for award in [30, 50, 50, 30, 90] {
            apply_experience(&mut split, award);
        }

        for p in [&lump, &split] {
            assert_eq!(
                (p.level, p.experience, p.experience_to_next_level),
                (3, 0, 225)
            );
        }
    }

    #[test]
    fn experience_stays_below_threshold() {
        let mut p = fresh();
        apply_experience(&mut p, 10_000);
        assert!(p.experience < p.experience_to_next_level);
    }

    #[test]
    fn streak_transitions_follow_calendar_days() {
        let mut p = fresh();
        assert_eq!(update_streak(&mut p, day(10, 9)), StreakChange::Started);
        assert_eq!(p.current_streak, 1);

        let marker = p.last_activity_at.clone();
        assert_eq!(update_streak(&mut p, day(10, 23)), StreakChange::SameDay);
        assert_eq!(p.current_streak, 1);
        assert_eq!(p.last_activity_at, marker);

        // 23시간이 안 지났어도 날짜가 바뀌면 하루로 칩니다.
        assert_eq!(update_streak(&mut p, day(11, 1)), StreakChange::Extended);
        assert_eq!(p.current_streak, 2);
        assert_eq!(update_streak(&mut p, day(12, 8)), StreakChange::Extended);
        assert_eq!((p.current_streak, p.longest_streak), (3, 3));

        assert_eq!(update_streak(&mut p, day(15, 8)), StreakChange::Reset);
        assert_eq!((p.current_streak, p.longest_streak), (1, 3));
    }

    #[test]
    fn clock_going_backwards_is_treated_as_same_day() {
        let mut p = fresh();
        update_streak(&mut p, day(10, 9));
        assert_eq!(update_streak(&mut p, day(9, 9)), StreakChange::SameDay);
        assert_eq!(p.current_streak, 1);
    }

    #[test]
    fn first_high_improvement_job_scores_655() {
        let outcome = apply_result(fresh(), &result(80.0, 90.0), day(10, 9));
        let p = &outcome.progress;

        assert_eq!(outcome.experience_awarded, 50);
        assert_eq!((p.level, p.experience, p.experience_to_next_level), (1, 50, 100));
        assert_eq!((p.total_jobs, p.optimized_jobs), (1, 1));
        assert_eq!(p.average_improvement, 80.0);
        assert_eq!(p.average_quality, 90.0);
        assert_eq!(p.current_streak, 1);
        assert_eq!(outcome.score, 655);
    }

    #[test]
    fn averages_are_recomputed_from_totals() {
        let first = apply_result(fresh(), &result(80.0, 90.0), day(10, 9));
        let second = apply_result(first.progress, &result(0.0, 60.0), day(10, 10));
        let p = &second.progress;

        assert_eq!(p.total_jobs, 2);
        assert_eq!(p.optimized_jobs, 1);
        assert_eq!(p.total_improvement, 80.0);
        assert_eq!(p.average_improvement, 40.0);
        assert_eq!(p.average_quality, 75.0);
        assert_eq!(second.streak, StreakChange::SameDay);
    }

    #[test]
    fn score_does_not_drop_when_volume_level_or_streak_grows() {
        let mut base = fresh();
        base.total_jobs = 4;
        base.average_improvement = 35.5;
        base.average_quality = 61.2;
        base.current_streak = 2;
        let before = leaderboard_score(&base);

        for bump in 0..3 {
            let mut p = base.clone();
            match bump {
                0 => p.total_jobs += 1,
                1 => p.level += 1,
                _ => p.current_streak += 1,
            }
            assert!(leaderboard_score(&p) >= before);
        }
    }
}
