//! # 데이터 모델 모듈
//!
//! 애플리케이션에서 사용하는 데이터 구조체(struct)들을 정의합니다.
//! - `job`: 분석 작업, 분석 결과, 제출/상태 요청·응답
//! - `progress`: 사용자별 누적 게임화 통계
//! - `leaderboard`: 리더보드 항목과 페이지 응답
//!
//! `pub use X::*;`로 재공개하여 `crate::models::UserProgress`처럼 짧게 접근합니다.

pub mod job;
pub mod leaderboard;
pub mod progress;

pub use job::*;
pub use leaderboard::*;
pub use progress::*;
