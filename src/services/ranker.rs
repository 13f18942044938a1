//! # 리더보드 랭커(Leaderboard Ranker)
//!
//! 기간별로 모든 사용자의 전역 순위를 유지합니다.
//!
//! ## 재정렬 규칙
//! 1. 점수가 바뀐 사용자의 항목을 upsert
//! 2. 기간의 **모든** 항목을 점수 내림차순, 동점이면 `seq`(생성 순서) 오름차순으로 정렬
//! 3. 1..N의 빈틈 없는(dense) 순위를 부여
//! 4. 각 항목: `previous_rank = 이전 순위`, `rank_change = 이전 순위 - 새 순위`
//!
//! 쓰기는 단일 작성자(write_lock) 뒤에서 하나의 트랜잭션으로 처리하므로,
//! 읽는 쪽은 순위가 절반만 바뀐 상태를 볼 수 없습니다.
//! 원장은 `writer()`를 먼저 잡고 자기 트랜잭션 안에서 `record_score_in`을 호출해,
//! 진행도와 순위, 작업 완료를 한 번에 커밋합니다.

use sqlx::{SqliteConnection, SqlitePool};
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};

use crate::clock::{format_timestamp, Clock};
use crate::db;
use crate::error::AppError;
use crate::models::{
    LeaderboardEntry, LeaderboardEntryView, LeaderboardPage, LeaderboardPeriod, LeaderboardSlice,
    Pagination,
};
use crate::services::cache::ScoreCache;

pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;

/// 재정렬 한 번에 쓰이는 항목 사본
#[derive(Debug, Clone, PartialEq)]
pub struct RankSlot {
    pub seq: i64,
    pub user_id: String,
    pub score: i64,
    /// None이면 아직 순위를 받은 적 없는 새 항목
    pub rank: Option<i64>,
    pub previous_rank: Option<i64>,
    pub rank_change: i64,
}

impl From<LeaderboardEntry> for RankSlot {
    fn from(entry: LeaderboardEntry) -> Self {
        Self {
            seq: entry.seq,
            user_id: entry.user_id,
            score: entry.score,
            rank: (entry.rank > 0).then_some(entry.rank),
            previous_rank: entry.previous_rank,
            rank_change: entry.rank_change,
        }
    }
}

/// 슬롯을 정렬하고 dense rank와 변동폭을 채웁니다.
///
/// 새 항목(이전 순위 없음)은 `previous_rank = None`, `rank_change = 0`입니다.
pub fn assign_ranks(slots: &mut [RankSlot]) {
    slots.sort_by(|a, b| b.score.cmp(&a.score).then(a.seq.cmp(&b.seq)));

    for (index, slot) in slots.iter_mut().enumerate() {
        let new_rank = index as i64 + 1;
        let old_rank = slot.rank;
        slot.previous_rank = old_rank;
        slot.rank_change = old_rank.map_or(0, |old| old - new_rank);
        slot.rank = Some(new_rank);
    }
}

/// 랭커 핸들. clone해도 같은 쓰기 잠금을 공유합니다.
#[derive(Clone)]
pub struct Ranker {
    pool: SqlitePool,
    cache: ScoreCache,
    clock: Arc<dyn Clock>,
    write_lock: Arc<Mutex<()>>,
}

impl Ranker {
    pub fn new(pool: SqlitePool, cache: ScoreCache, clock: Arc<dyn Clock>) -> Self {
        Self {
            pool,
            cache,
            clock,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    /// 사용자 점수를 기록하고 기간 전체를 다시 정렬합니다.
    pub async fn record_score(
        &self,
        user_id: &str,
        period: LeaderboardPeriod,
        score: i64,
    ) -> Result<(), AppError> {
        let _writer = self.writer().await;

        let mut tx = self.pool.begin().await?;
        let ranked = self.record_score_in(&mut *tx, user_id, period, score).await?;
        tx.commit().await?;

        self.cache.invalidate_leaderboards();
        tracing::debug!(user_id, %period, score, ranked, "leaderboard re-ranked");
        Ok(())
    }

    /// 단일 작성자 잠금. `record_score_in`을 부르기 전에 잡아야 합니다.
    pub async fn writer(&self) -> MutexGuard<'_, ()> {
        self.write_lock.lock().await
    }

    /// 호출자의 트랜잭션 안에서 점수를 upsert하고 재정렬합니다.
    /// 커밋과 리더보드 캐시 무효화는 호출자가 합니다.
    pub async fn record_score_in(
        &self,
        conn: &mut SqliteConnection,
        user_id: &str,
        period: LeaderboardPeriod,
        score: i64,
    ) -> Result<usize, AppError> {
        let now = format_timestamp(self.clock.now());
        db::upsert_leaderboard_score(&mut *conn, user_id, period.as_str(), score, &now).await?;
        rerank_in(conn, period).await
    }

    /// 점수 변경 없이 재정렬만 합니다. 같은 점수로 다시 돌리면 모든 변동폭이 0이 됩니다.
    pub async fn rerank(&self, period: LeaderboardPeriod) -> Result<usize, AppError> {
        let _writer = self.writer().await;

        let mut tx = self.pool.begin().await?;
        let ranked = rerank_in(&mut *tx, period).await?;
        tx.commit().await?;

        self.cache.invalidate_leaderboards();
        Ok(ranked)
    }

    /// 순위 오름차순 한 페이지. 요청자의 항목이 페이지 밖에 있으면 끝에 덧붙입니다.
    pub async fn page(
        &self,
        period: LeaderboardPeriod,
        page: u32,
        page_size: u32,
        requesting_user: &str,
    ) -> Result<LeaderboardPage, AppError> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);

        let slice = match self.cache.leaderboard_slice(period, page, page_size) {
            Some(slice) => slice,
            None => {
                let generation = self.cache.generation();
                let offset = i64::from(page - 1) * i64::from(page_size);
                let entries = db::fetch_leaderboard_page(
                    &self.pool,
                    period.as_str(),
                    i64::from(page_size),
                    offset,
                )
                .await?;
                let total = db::count_leaderboard_entries(&self.pool, period.as_str()).await?;
                let slice = LeaderboardSlice { entries, total };
                self.cache
                    .put_leaderboard_slice(generation, period, page, page_size, slice.clone());
                slice
            }
        };

        let mut entries = slice.entries;
        let mut found_self = false;
        for entry in entries.iter_mut() {
            if entry.user_id == requesting_user {
                entry.is_current_user = true;
                found_self = true;
            }
        }
        if !found_self {
            if let Some(mut own) = self.entry_for(period, requesting_user).await? {
                own.is_current_user = true;
                entries.push(own);
            }
        }

        Ok(LeaderboardPage {
            period,
            entries,
            pagination: Pagination {
                page,
                page_size,
                total: slice.total,
                has_more: i64::from(page) * i64::from(page_size) < slice.total,
            },
        })
    }

    /// 한 사용자의 항목 (캐시 경유). 완료된 작업이 없으면 None
    pub async fn entry_for(
        &self,
        period: LeaderboardPeriod,
        user_id: &str,
    ) -> Result<Option<LeaderboardEntryView>, AppError> {
        if let Some(cached) = self.cache.leaderboard_entry(period, user_id) {
            return Ok(cached);
        }
        let generation = self.cache.generation();
        let entry = db::get_leaderboard_entry_view(&self.pool, period.as_str(), user_id).await?;
        self.cache
            .put_leaderboard_entry(generation, period, user_id, entry.clone());
        Ok(entry)
    }
}

async fn rerank_in(conn: &mut SqliteConnection, period: LeaderboardPeriod) -> Result<usize, AppError> {
    let entries = db::list_period_entries(&mut *conn, period.as_str()).await?;
    let mut slots: Vec<RankSlot> = entries.into_iter().map(RankSlot::from).collect();
    assign_ranks(&mut slots);

    for slot in &slots {
        let rank = slot.rank.unwrap_or_default();
        db::update_entry_rank(&mut *conn, slot.seq, rank, slot.previous_rank, slot.rank_change)
            .await?;
    }
    Ok(slots.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(seq: i64, score: i64, rank: Option<i64>) -> RankSlot {
        RankSlot {
            seq,
            user_id: format!("user-{seq}"),
            score,
            rank,
            previous_rank: None,
            rank_change: 0,
        }
    }

    #[test]
    fn ranks_are_dense_and_sorted_by_score() {
        let mut slots = vec![slot(1, 100, None), slot(2, 300, None), slot(3, 200, None)];
        assign_ranks(&mut slots);

        let order: Vec<(i64, Option<i64>)> = slots.iter().map(|s| (s.seq, s.rank)).collect();
        assert_eq!(order, vec![(2, Some(1)), (3, Some(2)), (1, Some(3))]);
        assert!(slots.iter().all(|s| s.rank_change == 0 && s.previous_rank.is_none()));
    }

    #[test]
    fn ties_fall_back_to_creation_order() {
        let mut slots = vec![slot(7, 50, None), slot(3, 50, None), slot(5, 50, None)];
        assign_ranks(&mut slots);

        let seqs: Vec<i64> = slots.iter().map(|s| s.seq).collect();
        assert_eq!(seqs, vec![3, 5, 7]);
    }

    #[test]
    fn rank_change_is_previous_minus_current() {
        let mut slots = vec![slot(1, 100, Some(1)), slot(2, 500, Some(2)), slot(3, 50, None)];
        assign_ranks(&mut slots);

        let climber = slots.iter().find(|s| s.seq == 2).unwrap();
        assert_eq!((climber.rank, climber.previous_rank, climber.rank_change), (Some(1), Some(2), 1));

        let faller = slots.iter().find(|s| s.seq == 1).unwrap();
        assert_eq!((faller.rank, faller.previous_rank, faller.rank_change), (Some(2), Some(1), -1));

        let newcomer = slots.iter().find(|s| s.seq == 3).unwrap();
        assert_eq!((newcomer.rank, newcomer.previous_rank, newcomer.rank_change), (Some(3), None, 0));
    }

    #[test]
    fn rerank_without_score_changes_is_idempotent() {
        let mut slots: Vec<RankSlot> = (1..=6).map(|seq| slot(seq, (seq * 37) % 5 * 10, None)).collect();
        assign_ranks(&mut slots);
        let first: Vec<(i64, Option<i64>)> = slots.iter().map(|s| (s.seq, s.rank)).collect();

        assign_ranks(&mut slots);
        let second: Vec<(i64, Option<i64>)> = slots.iter().map(|s| (s.seq, s.rank)).collect();

        assert_eq!(first, second);
        assert!(slots.iter().all(|s| s.rank_change == 0 && s.previous_rank == s.rank));

        let mut ranks: Vec<i64> = slots.iter().filter_map(|s| s.rank).collect();
        ranks.sort_unstable();
        assert_eq!(ranks, (1..=6).collect::<Vec<_>>());
    }
}
