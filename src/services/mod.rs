//! # 비즈니스 로직 모듈
//!
//! 라우트 핸들러와 DB 계층 사이의 로직을 담습니다.
//!
//! - `cache`: TTL + LRU 점수 캐시
//! - `analysis`: 외부 분석 API 클라이언트
//! - `fallback`: 로컬 결정적 폴백 분석
//! - `runner`: 작업 라이프사이클 (queued → analyzing → completed/failed)
//! - `ledger`: 경험치·레벨·연속 기록 원장
//! - `ranker`: 리더보드 재정렬과 페이지 조회
//! - `billing`: 작업 생성 허용 여부 판정

pub mod analysis;
pub mod billing;
pub mod cache;
pub mod fallback;
pub mod ledger;
pub mod ranker;
pub mod runner;

pub use analysis::{AnalysisError, AnalysisProvider, HttpAnalysisProvider};
pub use billing::{BillingGate, DailyQuotaGate, Unmetered};
pub use cache::ScoreCache;
pub use ledger::Ledger;
pub use ranker::Ranker;
pub use runner::JobRunner;
