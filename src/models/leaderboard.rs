use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 랭킹 기간. 현재는 전체 기간(all-time)만 지원합니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeaderboardPeriod {
    AllTime,
}

impl LeaderboardPeriod {
    pub fn as_str(&self) -> &'static str {
        match self {
            LeaderboardPeriod::AllTime => "all_time",
        }
    }
}

impl fmt::Display for LeaderboardPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LeaderboardPeriod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "all_time" | "all-time" | "alltime" => Ok(LeaderboardPeriod::AllTime),
            other => Err(format!("unsupported leaderboard period: {other}")),
        }
    }
}

/// `leaderboard_entries` 테이블 한 행
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntry {
    /// 생성 순서. 동점일 때의 보조 정렬 키입니다.
    pub seq: i64,
    pub user_id: String,
    pub period: String,
    pub score: i64,
    pub rank: i64,
    pub previous_rank: Option<i64>,
    pub rank_change: i64,
    pub created_at: String,
    pub updated_at: String,
}

/// 리더보드 응답의 한 항목 (`users`와 조인한 표시 이름 포함)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct LeaderboardEntryView {
    pub rank: i64,
    pub user_id: String,
    pub display_name: String,
    pub score: i64,
    pub previous_rank: Option<i64>,
    pub rank_change: i64,
    /// 요청자 본인의 항목이면 true
    #[sqlx(default)]
    #[serde(default)]
    pub is_current_user: bool,
}

/// 캐시에 들어가는 페이지 본체 (요청자와 무관한 부분)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardSlice {
    pub entries: Vec<LeaderboardEntryView>,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub page: u32,
    pub page_size: u32,
    pub total: i64,
    pub has_more: bool,
}

/// `GET /api/v1/leaderboard` 응답
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LeaderboardPage {
    pub period: LeaderboardPeriod,
    pub entries: Vec<LeaderboardEntryView>,
    pub pagination: Pagination,
}

#[derive(Debug, Deserialize)]
pub struct LeaderboardQuery {
    pub period: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}
