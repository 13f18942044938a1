//! # 사용자 진행도(UserProgress) 모델
//!
//! 사용자당 정확히 한 행이 있으며, 첫 작업이 완료될 때 생성됩니다.
//! 게임화 원장(ledger)만 이 값을 변경합니다.

use serde::{Deserialize, Serialize};

use super::LeaderboardEntryView;

/// `user_progress` 테이블 한 행
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct UserProgress {
    pub user_id: String,
    pub level: i64,
    pub experience: i64,
    pub experience_to_next_level: i64,
    pub total_jobs: i64,
    /// 개선율이 0보다 큰 작업 수
    pub optimized_jobs: i64,
    /// 개선율 누적 합계. 평균은 항상 이 값에서 다시 계산합니다.
    pub total_improvement: f64,
    pub average_improvement: f64,
    pub average_quality: f64,
    pub current_streak: i64,
    pub longest_streak: i64,
    pub last_activity_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

impl UserProgress {
    /// 아직 작업이 없는 사용자의 초기 상태 (레벨 1, 경험치 0, 다음 레벨까지 100)
    pub fn new(user_id: &str, now: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            level: 1,
            experience: 0,
            experience_to_next_level: 100,
            total_jobs: 0,
            optimized_jobs: 0,
            total_improvement: 0.0,
            average_improvement: 0.0,
            average_quality: 0.0,
            current_streak: 0,
            longest_streak: 0,
            last_activity_at: None,
            created_at: now.to_string(),
            updated_at: now.to_string(),
        }
    }
}

/// `GET /api/v1/progress` 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressResponse {
    pub progress: UserProgress,
    /// 전체 기간 리더보드 항목. 완료된 작업이 없으면 None
    pub leaderboard: Option<LeaderboardEntryView>,
}
