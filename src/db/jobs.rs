//! # 분석 작업 데이터베이스 쿼리 모듈
//!
//! `analysis_jobs` 테이블의 생성, 상태 전이, 조회 쿼리입니다.
//!
//! ## 상태 전이와 조건부 UPDATE
//! ```text
//! insert_job()        → queued
//! mark_job_analyzing()  queued    → analyzing   (WHERE status = 'queued')
//! complete_job()        analyzing → completed   (WHERE status = 'analyzing')
//! fail_job()            analyzing → failed       (WHERE status = 'analyzing')
//! ```
//! `queued`에서 바로 `failed`로 가는 길은 없습니다. 분석을 시작하지 못한 작업은
//! `queued`로 남아 재시작 복구 때 다시 예약됩니다.
//! 모든 전이는 `WHERE status = ...` 조건이 붙은 UPDATE로 수행되므로,
//! 영향받은 행 수(rows_affected)가 0이면 "레코드가 없거나 이미 다른 상태"라는 뜻입니다.
//! 이렇게 해서 역방향 전이가 절대 일어나지 않습니다.

use crate::error::AppError;
use crate::models::{AnalysisJob, JobSummary};
use sqlx::{SqliteExecutor, SqlitePool};

/// 새 작업을 `queued` 상태로 생성합니다.
#[allow(clippy::too_many_arguments)]
pub async fn insert_job(
    pool: &SqlitePool,
    id: &str,
    user_id: &str,
    title: &str,
    language: &str,
    code: &str,
    line_count: i64,
    created_at: &str,
) -> Result<AnalysisJob, AppError> {
    sqlx::query(
        r#"
        INSERT INTO analysis_jobs (id, user_id, title, language, code, line_count, status, created_at)
        VALUES (?, ?, ?, ?, ?, ?, 'queued', ?)
        "#,
    )
    .bind(id)
    .bind(user_id)
    .bind(title)
    .bind(language)
    .bind(code)
    .bind(line_count)
    .bind(created_at)
    .execute(pool)
    .await?;

    get_job(pool, id)
        .await?
        .ok_or(AppError::Internal("Failed to retrieve created job".to_string()))
}

/// ID로 작업 하나를 조회합니다.
pub async fn get_job(
    executor: impl SqliteExecutor<'_>,
    id: &str,
) -> Result<Option<AnalysisJob>, AppError> {
    let job = sqlx::query_as::<_, AnalysisJob>(
        r#"
        SELECT id, user_id, title, language, code, line_count, status, result,
               error_message, processing_time_ms, created_at, started_at, completed_at
        FROM analysis_jobs
        WHERE id = ?
        "#,
    )
    .bind(id)
    .fetch_optional(executor)
    .await?;

    Ok(job)
}

/// 작업의 현재 상태 문자열만 조회합니다. (트랜잭션 안에서의 존재 확인용)
pub async fn get_job_status(
    executor: impl SqliteExecutor<'_>,
    id: &str,
) -> Result<Option<String>, AppError> {
    let row: Option<(String,)> = sqlx::query_as("SELECT status FROM analysis_jobs WHERE id = ?")
        .bind(id)
        .fetch_optional(executor)
        .await?;

    Ok(row.map(|(status,)| status))
}

/// 사용자의 최근 작업 목록 (최신순)
pub async fn list_jobs_for_user(
    pool: &SqlitePool,
    user_id: &str,
    limit: i64,
) -> Result<Vec<JobSummary>, AppError> {
    let jobs = sqlx::query_as::<_, JobSummary>(
        r#"
        SELECT id, title, language, line_count, status, created_at, completed_at
        FROM analysis_jobs
        WHERE user_id = ?
        ORDER BY created_at DESC, id DESC
        LIMIT ?
        "#,
    )
    .bind(user_id)
    .bind(limit)
    .fetch_all(pool)
    .await?;

    Ok(jobs)
}

/// 주어진 시각 이후 사용자가 만든 작업 수 (일일 할당량 계산용)
pub async fn count_jobs_since(
    pool: &SqlitePool,
    user_id: &str,
    since: &str,
) -> Result<i64, AppError> {
    let (count,): (i64,) =
        sqlx::query_as("SELECT COUNT(*) FROM analysis_jobs WHERE user_id = ? AND created_at >= ?")
            .bind(user_id)
            .bind(since)
            .fetch_one(pool)
            .await?;

    Ok(count)
}

/// 특정 상태의 작업 ID 목록 (재시작 복구용)
pub async fn list_job_ids_with_status(
    pool: &SqlitePool,
    status: &str,
) -> Result<Vec<String>, AppError> {
    let rows: Vec<(String,)> =
        sqlx::query_as("SELECT id FROM analysis_jobs WHERE status = ? ORDER BY created_at")
            .bind(status)
            .fetch_all(pool)
            .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// `queued → analyzing` 전이. 전이가 일어났으면 true.
pub async fn mark_job_analyzing(
    pool: &SqlitePool,
    id: &str,
    started_at: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = 'analyzing', started_at = ?
        WHERE id = ? AND status = 'queued'
        "#,
    )
    .bind(started_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `analyzing → completed` 전이. 결과와 처리 시간을 함께 기록합니다.
///
/// 원장 트랜잭션 안에서 호출되어 진행도 갱신과 함께 커밋됩니다.
pub async fn complete_job(
    executor: impl SqliteExecutor<'_>,
    id: &str,
    result_json: &str,
    processing_time_ms: i64,
    completed_at: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = 'completed', result = ?, processing_time_ms = ?, completed_at = ?
        WHERE id = ? AND status = 'analyzing'
        "#,
    )
    .bind(result_json)
    .bind(processing_time_ms)
    .bind(completed_at)
    .bind(id)
    .execute(executor)
    .await?;

    Ok(result.rows_affected() > 0)
}

/// `analyzing → failed` 전이
pub async fn fail_job(
    pool: &SqlitePool,
    id: &str,
    message: &str,
    processing_time_ms: Option<i64>,
    completed_at: &str,
) -> Result<bool, AppError> {
    let result = sqlx::query(
        r#"
        UPDATE analysis_jobs
        SET status = 'failed', error_message = ?, processing_time_ms = ?, completed_at = ?
        WHERE id = ? AND status = 'analyzing'
        "#,
    )
    .bind(message)
    .bind(processing_time_ms)
    .bind(completed_at)
    .bind(id)
    .execute(pool)
    .await?;

    Ok(result.rows_affected() > 0)
}
