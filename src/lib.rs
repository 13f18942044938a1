//! # CodeQuest 백엔드 라이브러리
//!
//! 코드 조각을 받아 비동기로 분석하고, 그 결과를 경험치·레벨·연속 기록과
//! 전역 리더보드에 반영하는 서비스입니다.
//!
//! 실행 파일(`main.rs`)과 통합 테스트(`tests/`)가 모두 `build_router()`로
//! 같은 라우터를 만듭니다.

pub mod clock;
pub mod config;
pub mod db;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;

use axum::{routing::get, Router};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

pub use routes::AppState;

/// API 라우터를 만듭니다. 모든 경로는 `/api/v1` 아래에 있습니다.
pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        // 작업 제출과 목록
        .route("/jobs", get(routes::list_jobs).post(routes::submit_job))
        // {id}는 URL 경로 파라미터 (Path<String>으로 추출)
        .route("/jobs/{id}", get(routes::get_job_status))
        .route("/leaderboard", get(routes::get_leaderboard))
        .route("/progress", get(routes::get_progress))
        // 헬스체크 (인증 없음)
        .route("/health", get(routes::health_check))
        .with_state(state);

    // 개발 환경 기준으로 모든 출처를 허용합니다.
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .nest("/api/v1", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
