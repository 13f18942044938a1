//! # 내 진행도 라우트
//!
//! - `GET /api/v1/progress` → 레벨, 경험치, 통계, 연속 기록 + 전체 기간 순위

use axum::{extract::State, Json};

use super::AppState;
use crate::clock::format_timestamp;
use crate::db;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::{LeaderboardPeriod, ProgressResponse, UserProgress};

/// 아직 완료된 작업이 없는 사용자에게는 초기 상태를 보여주되 저장하지는 않습니다.
pub async fn get_progress(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ProgressResponse>, AppError> {
    let progress = match state.cache.progress(&user.user_id) {
        Some(progress) => progress,
        None => {
            let generation = state.cache.generation();
            let progress = db::get_progress(&state.pool, &user.user_id)
                .await?
                .unwrap_or_else(|| {
                    UserProgress::new(&user.user_id, &format_timestamp(state.clock.now()))
                });
            state
                .cache
                .put_progress(generation, &user.user_id, progress.clone());
            progress
        }
    };

    // 순위는 다른 사용자의 완료로도 바뀌므로 리더보드 캐시에서 따로 읽습니다.
    let leaderboard = state
        .ranker
        .entry_for(LeaderboardPeriod::AllTime, &user.user_id)
        .await?;

    Ok(Json(ProgressResponse {
        progress,
        leaderboard,
    }))
}
