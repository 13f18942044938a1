//! # 리더보드 라우트
//!
//! - `GET /api/v1/leaderboard?period=all_time&page=1&page_size=20`
//!
//! 응답에는 요청자 본인의 항목이 항상 포함됩니다.
//! 페이지 밖에 있으면 목록 끝에 `is_current_user: true`로 덧붙습니다.

use axum::{
    extract::{Query, State},
    Json,
};

use super::AppState;
use crate::error::AppError;
use crate::middleware::auth::AuthUser;
use crate::models::{LeaderboardPage, LeaderboardPeriod, LeaderboardQuery};
use crate::services::ranker::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};

pub async fn get_leaderboard(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<LeaderboardQuery>,
) -> Result<Json<LeaderboardPage>, AppError> {
    let period = match query.period.as_deref() {
        None => LeaderboardPeriod::AllTime,
        Some(raw) => raw.parse().map_err(AppError::InvalidInput)?,
    };

    let page = query.page.unwrap_or(1);
    if page == 0 {
        return Err(AppError::InvalidInput("page starts at 1".to_string()));
    }
    let page_size = query.page_size.unwrap_or(DEFAULT_PAGE_SIZE);
    if !(1..=MAX_PAGE_SIZE).contains(&page_size) {
        return Err(AppError::InvalidInput(format!(
            "page_size must be between 1 and {MAX_PAGE_SIZE}"
        )));
    }

    let page = state
        .ranker
        .page(period, page, page_size, &user.user_id)
        .await?;
    Ok(Json(page))
}
