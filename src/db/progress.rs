use crate::error::AppError;
use crate::models::UserProgress;
use sqlx::SqliteExecutor;

pub async fn get_progress(
    executor: impl SqliteExecutor<'_>,
    user_id: &str,
) -> Result<Option<UserProgress>, AppError> {
    let progress = sqlx::query_as::<_, UserProgress>(
        r#"
        SELECT user_id, level, experience, experience_to_next_level, total_jobs,
               optimized_jobs, total_improvement, average_improvement, average_quality,
               current_streak, longest_streak, last_activity_at, created_at, updated_at
        FROM user_progress
        WHERE user_id = ?
        "#,
    )
    .bind(user_id)
    .fetch_optional(executor)
    .await?;

    Ok(progress)
}

/// 진행도 한 행을 통째로 저장합니다 (없으면 생성, 있으면 덮어쓰기).
///
/// 원장이 계산한 결과를 그대로 기록할 뿐, 여기서 산술은 하지 않습니다.
pub async fn save_progress(
    executor: impl SqliteExecutor<'_>,
    progress: &UserProgress,
) -> Result<(), AppError> {
    sqlx::query(
        r#"
        INSERT INTO user_progress (
            user_id, level, experience, experience_to_next_level, total_jobs,
            optimized_jobs, total_improvement, average_improvement, average_quality,
            current_streak, longest_streak, last_activity_at, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(user_id) DO UPDATE SET
            level = excluded.level,
            experience = excluded.experience,
            experience_to_next_level = excluded.experience_to_next_level,
            total_jobs = excluded.total_jobs,
            optimized_jobs = excluded.optimized_jobs,
            total_improvement = excluded.total_improvement,
            average_improvement = excluded.average_improvement,
            average_quality = excluded.average_quality,
            current_streak = excluded.current_streak,
            longest_streak = excluded.longest_streak,
            last_activity_at = excluded.last_activity_at,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(&progress.user_id)
    .bind(progress.level)
    .bind(progress.experience)
    .bind(progress.experience_to_next_level)
    .bind(progress.total_jobs)
    .bind(progress.optimized_jobs)
    .bind(progress.total_improvement)
    .bind(progress.average_improvement)
    .bind(progress.average_quality)
    .bind(progress.current_streak)
    .bind(progress.longest_streak)
    .bind(&progress.last_activity_at)
    .bind(&progress.created_at)
    .bind(&progress.updated_at)
    .execute(executor)
    .await?;

    Ok(())
}

/// 진행도 행이 없으면 초기값(레벨 1, 경험치 0, 다음 레벨까지 100)으로 만듭니다.
///
/// 원장 트랜잭션의 첫 문장입니다. 쓰기로 시작해야 SQLite가 쓰기 잠금을
/// 먼저 잡으므로, 읽은 뒤 쓰기로 올리다가 SQLITE_BUSY로 실패하지 않습니다.
pub async fn ensure_progress(
    executor: impl SqliteExecutor<'_>,
    user_id: &str,
    now: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        INSERT INTO user_progress (user_id, created_at, updated_at)
        VALUES (?, ?, ?)
        ON CONFLICT(user_id) DO NOTHING
        "#,
    )
    .bind(user_id)
    .bind(now)
    .bind(now)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}
