//! # CodeQuest 웹 서버 진입점
//!
//! 이 파일이 수행하는 작업:
//! 1. 환경변수(.env) 로딩
//! 2. 로깅(tracing) 초기화
//! 3. SQLite 연결 풀 생성 + 마이그레이션
//! 4. 외부 분석 API 클라이언트 구성 (설정이 없으면 폴백 전용)
//! 5. 서비스 조립 (캐시, 랭커, 원장, 러너, 과금 게이트)
//! 6. 캐시 청소 작업 시작, 이전 실행에서 남은 작업 복구
//! 7. HTTP 서버 시작

use anyhow::Result; // anyhow::Result: 어떤 에러 타입이든 담을 수 있는 범용 Result 타입
use codequest::{
    build_router,
    clock::{Clock, SystemClock},
    config::Config,
    db,
    services::{AnalysisProvider, HttpAnalysisProvider},
    AppState,
};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    // ── 1단계: 환경변수 로딩 ──
    // .env 파일이 없어도 에러 없이 넘어갑니다.
    dotenvy::dotenv().ok();

    // ── 2단계: 로깅 초기화 ──
    // RUST_LOG가 없으면 codequest, tower_http, axum 모듈을 debug 레벨로 설정
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "codequest=debug,tower_http=debug,axum=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // ── 3단계: 설정 로딩 ──
    let config = Config::from_env()?;
    tracing::info!("Starting CodeQuest server on {}:{}", config.host, config.port);

    // ── 4단계: SQLite 연결 풀 + 마이그레이션 ──
    let pool = db::init_pool(&config.database_url).await?;

    // ── 5단계: 외부 분석 API ──
    // 설정이 없으면 None → 모든 작업이 로컬 폴백 분석으로 완료됩니다.
    let provider: Option<Arc<dyn AnalysisProvider>> = match &config.analysis {
        Some(api) => {
            tracing::info!(base_url = %api.base_url, model = %api.model, "external analysis enabled");
            Some(Arc::new(HttpAnalysisProvider::new(api.clone())) as Arc<dyn AnalysisProvider>)
        }
        None => {
            tracing::warn!("ANALYSIS_API_URL not set, every job will use fallback analysis");
            None
        }
    };

    // ── 6단계: 애플리케이션 상태 ──
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(pool, &config, provider, clock);

    // 만료 항목 청소는 요청 경로 밖에서 돌립니다.
    state.cache.spawn_sweeper(config.cache.sweep_interval);

    // 이전 실행에서 끝나지 못한 작업 정리
    state.runner.recover_interrupted_jobs().await?;

    // ── 7단계: 서버 시작 ──
    let app = build_router(state);
    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
