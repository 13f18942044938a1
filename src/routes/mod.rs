//! # 라우트 핸들러 모듈
//!
//! HTTP 요청을 처리하는 핸들러 함수들을 모아둔 모듈입니다.
//!
//! 각 하위 모듈:
//! - `jobs`: 작업 제출, 상태 폴링, 목록 (+ `AppState`)
//! - `leaderboard`: 리더보드 페이지
//! - `progress`: 내 진행도
//! - `health`: 서버 상태 확인

pub mod health;
pub mod jobs;
pub mod leaderboard;
pub mod progress;

// lib.rs에서 `routes::submit_job`처럼 바로 접근할 수 있게 재공개합니다.
pub use health::*;
pub use jobs::*;
pub use leaderboard::*;
pub use progress::*;
