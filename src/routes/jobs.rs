//! # 분석 작업(Job) 라우트 핸들러
//!
//! ## 엔드포인트
//! - `POST /api/v1/jobs`      → 작업 제출 (202 Accepted, 분석은 백그라운드)
//! - `GET  /api/v1/jobs`      → 내 최근 작업 목록
//! - `GET  /api/v1/jobs/{id}` → 상태 폴링
//!
//! ## 폴링 프로토콜
//! 클라이언트는 원하는 주기로 `GET /jobs/{id}`를 반복 호출합니다.
//! 서버는 매 요청을 독립적으로 처리하며 기다리지 않습니다.
//! 끝난 작업은 더 바뀌지 않으므로 캐시에서 바로 응답합니다.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde_json::{json, Value};
use sqlx::SqlitePool;
use std::sync::Arc;
use uuid::Uuid;

use crate::{
    clock::{format_timestamp, Clock},
    config::Config,
    db,
    error::AppError,
    middleware::auth::AuthUser,
    models::*,
    services::{
        billing::{self, BillingGate},
        AnalysisProvider, JobRunner, Ledger, Ranker, ScoreCache,
    },
};

const MAX_TITLE_CHARS: usize = 200;
const MAX_LANGUAGE_CHARS: usize = 32;
const DEFAULT_LIST_LIMIT: u32 = 20;
const MAX_LIST_LIMIT: u32 = 100;

/// 애플리케이션 공유 상태
///
/// 모든 요청 핸들러가 `State(state): State<AppState>`로 접근합니다.
/// 안의 서비스들은 모두 내부적으로 `Arc`를 공유하므로 clone이 가볍습니다.
#[derive(Clone)]
pub struct AppState {
    /// SQLite 연결 풀 (내부적으로 Arc로 공유)
    pub pool: SqlitePool,
    /// Bearer 토큰 검증용 비밀키
    pub jwt_secret: String,
    /// 제출 코드 최대 길이 (문자 수)
    pub max_code_chars: usize,
    pub cache: ScoreCache,
    pub runner: JobRunner,
    pub ledger: Ledger,
    pub ranker: Ranker,
    pub billing: Arc<dyn BillingGate>,
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    /// 캐시 → 랭커 → 원장 → 러너 순서로 서비스를 조립합니다.
    ///
    /// `provider`가 None이면 모든 작업이 로컬 폴백 분석으로 처리됩니다.
    pub fn new(
        pool: SqlitePool,
        config: &Config,
        provider: Option<Arc<dyn AnalysisProvider>>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = ScoreCache::new(&config.cache, clock.clone());
        let ranker = Ranker::new(pool.clone(), cache.clone(), clock.clone());
        let ledger = Ledger::new(pool.clone(), ranker.clone(), cache.clone(), clock.clone())
            .with_deferred_backoff(config.deferred_rerank_backoff);
        let runner = JobRunner::new(
            pool.clone(),
            provider,
            ledger.clone(),
            clock.clone(),
            config.analysis_timeout,
        );
        let billing = billing::gate_for_quota(pool.clone(), config.daily_job_quota, clock.clone());

        Self {
            pool,
            jwt_secret: config.jwt_secret.clone(),
            max_code_chars: config.max_code_chars,
            cache,
            runner,
            ledger,
            ranker,
            billing,
            clock,
        }
    }
}

/// `POST /jobs` — 코드를 제출하고 작업 ID를 즉시 돌려받습니다.
///
/// 검증 → 과금 게이트 → 저장 → 백그라운드 예약 순서입니다.
/// 검증이나 게이트에서 거부되면 아무 상태도 만들지 않습니다.
///
/// # Extractor 순서
/// `Json`은 요청 본문을 소비하므로 항상 마지막 인자여야 합니다.
pub async fn submit_job(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<SubmitJobRequest>,
) -> Result<(StatusCode, Json<SubmitJobResponse>), AppError> {
    let code = req.code;
    if code.trim().is_empty() {
        return Err(AppError::InvalidInput("code must not be empty".to_string()));
    }
    // 바이트가 아니라 문자 수로 셉니다. (한글 주석 등 멀티바이트 문자)
    if code.chars().count() > state.max_code_chars {
        return Err(AppError::InvalidInput(format!(
            "code exceeds {} characters",
            state.max_code_chars
        )));
    }

    let language = req.language.trim().to_ascii_lowercase();
    if language.is_empty() || language.chars().count() > MAX_LANGUAGE_CHARS {
        return Err(AppError::InvalidInput("language is required".to_string()));
    }

    let title = req
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or("Untitled");
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(AppError::InvalidInput(format!(
            "title exceeds {MAX_TITLE_CHARS} characters"
        )));
    }

    if !state.billing.may_create_job(&user.user_id).await? {
        return Err(AppError::QuotaExceeded(
            "daily analysis quota reached".to_string(),
        ));
    }

    db::upsert_user(&state.pool, &user.user_id, &user.display_name()).await?;

    // UUIDv7: 시간순 정렬이 가능한 ID
    let job_id = Uuid::now_v7().to_string();
    let line_count = code.lines().count() as i64;
    let created_at = format_timestamp(state.clock.now());
    let job = db::insert_job(
        &state.pool,
        &job_id,
        &user.user_id,
        title,
        &language,
        &code,
        line_count,
        &created_at,
    )
    .await?;

    tracing::info!(job_id = %job.id, user_id = %user.user_id, %language, line_count, "job queued");
    state.runner.schedule(job.id.clone());

    Ok((
        StatusCode::ACCEPTED,
        Json(SubmitJobResponse {
            job_id: job.id,
            status: JobStatus::Queued,
        }),
    ))
}

/// `GET /jobs/{id}` — 작업 상태를 조회합니다.
///
/// 다른 사용자의 작업은 존재 여부를 드러내지 않도록 404로 응답합니다.
pub async fn get_job_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> Result<Json<JobView>, AppError> {
    if let Some(view) = state.cache.job(&id) {
        return if view.user_id == user.user_id {
            Ok(Json(view))
        } else {
            Err(AppError::NotFound)
        };
    }

    let job = db::get_job(&state.pool, &id)
        .await?
        .filter(|job| job.user_id == user.user_id)
        .ok_or(AppError::NotFound)?;

    let view = JobView::from_row(job).map_err(AppError::Internal)?;
    state.cache.put_job(&view);
    Ok(Json(view))
}

/// `GET /jobs?limit=20` — 최근 작업 목록 (최신순, 코드와 결과 본문 제외)
pub async fn list_jobs(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<ListJobsQuery>,
) -> Result<Json<Value>, AppError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_LIST_LIMIT)
        .clamp(1, MAX_LIST_LIMIT);
    let jobs = db::list_jobs_for_user(&state.pool, &user.user_id, i64::from(limit)).await?;
    Ok(Json(json!({ "jobs": jobs })))
}
