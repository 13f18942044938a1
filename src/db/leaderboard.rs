//! # 리더보드 데이터베이스 쿼리 모듈
//!
//! 쓰기 함수(`upsert_leaderboard_score`, `update_entry_rank`)는
//! 랭커(ranker)의 재정렬 트랜잭션 안에서만 호출됩니다.
//! 읽기 함수는 커밋된 순위만 보므로, 순위가 절반만 갱신된 상태를 읽는 일이 없습니다.

use crate::error::AppError;
use crate::models::{LeaderboardEntry, LeaderboardEntryView};
use sqlx::{SqliteExecutor, SqlitePool};

/// 사용자의 점수를 기록합니다. 새 항목은 rank = 0(미배정)으로 들어가고
/// 같은 트랜잭션 안의 재정렬에서 실제 순위를 받습니다.
pub async fn upsert_leaderboard_score(
    executor: impl SqliteExecutor<'_>,
    user_id: &str,
    period: &str,
    score: i64,
    now: &str,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO leaderboard_entries (user_id, period, score, rank, created_at, updated_at)
        VALUES (?, ?, ?, 0, ?, ?)
        ON CONFLICT(user_id, period) DO UPDATE
        SET score = excluded.score, updated_at = excluded.updated_at
        "#,
    )
    .bind(user_id)
    .bind(period)
    .bind(score)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(())
}

/// 기간의 모든 항목을 생성 순서대로 가져옵니다.
pub async fn list_period_entries(
    executor: impl SqliteExecutor<'_>,
    period: &str,
) -> Result<Vec<LeaderboardEntry>, AppError> {
    let entries = sqlx::query_as::<_, LeaderboardEntry>(
        r#"
        SELECT seq, user_id, period, score, rank, previous_rank, rank_change,
               created_at, updated_at
        FROM leaderboard_entries
        WHERE period = ?
        ORDER BY seq
        "#,
    )
    .bind(period)
    .fetch_all(executor)
    .await?;

    Ok(entries)
}

pub async fn update_entry_rank(
    executor: impl SqliteExecutor<'_>,
    seq: i64,
    rank: i64,
    previous_rank: Option<i64>,
    rank_change: i64,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        UPDATE leaderboard_entries
        SET rank = ?, previous_rank = ?, rank_change = ?
        WHERE seq = ?
        "#,
    )
    .bind(rank)
    .bind(previous_rank)
    .bind(rank_change)
    .bind(seq)
    .execute(executor)
    .await?;

    Ok(())
}

/// 순위 오름차순으로 한 페이지를 조회합니다.
///
/// 표시 이름이 없는 사용자는 ID 앞 8자리로 대신합니다.
pub async fn fetch_leaderboard_page(
    pool: &SqlitePool,
    period: &str,
    limit: i64,
    offset: i64,
) -> Result<Vec<LeaderboardEntryView>, AppError> {
    let entries = sqlx::query_as::<_, LeaderboardEntryView>(
        r#"
        SELECT e.rank, e.user_id,
               COALESCE(u.display_name, substr(e.user_id, 1, 8)) AS display_name,
               e.score, e.previous_rank, e.rank_change
        FROM leaderboard_entries e
        LEFT JOIN users u ON u.id = e.user_id
        WHERE e.period = ?
        ORDER BY e.rank ASC
        LIMIT ? OFFSET ?
        "#,
    )
    .bind(period)
    .bind(limit)
    .bind(offset)
    .fetch_all(pool)
    .await?;

    Ok(entries)
}

pub async fn count_leaderboard_entries(pool: &SqlitePool, period: &str) -> Result<i64, AppError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM leaderboard_entries WHERE period = ?")
            .bind(period)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

pub async fn get_leaderboard_entry_view(
    pool: &SqlitePool,
    period: &str,
    user_id: &str,
) -> Result<Option<LeaderboardEntryView>, AppError> {
    let entry = sqlx::query_as::<_, LeaderboardEntryView>(
        r#"
        SELECT e.rank, e.user_id,
               COALESCE(u.display_name, substr(e.user_id, 1, 8)) AS display_name,
               e.score, e.previous_rank, e.rank_change
        FROM leaderboard_entries e
        LEFT JOIN users u ON u.id = e.user_id
        WHERE e.period = ? AND e.user_id = ?
        "#,
    )
    .bind(period)
    .bind(user_id)
    .fetch_optional(pool)
    .await?;

    Ok(entry)
}
