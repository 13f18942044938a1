//! # 분석 러너(Analysis Runner)
//!
//! 제출된 작업을 요청 경로 밖(`tokio::spawn`)에서 처리합니다.
//!
//! ## 처리 순서
//! 1. `queued → analyzing`
//! 2. 외부 분석 호출 (시간 제한). 실패·시간 초과·미설정이면 로컬 폴백
//! 3. 원장 반영 + 리더보드 재정렬 + `analyzing → completed`
//!    (`Ledger::apply_completion`, 한 트랜잭션)
//!
//! 폴링으로 `completed`를 본 클라이언트는 이미 갱신된 통계와 순위를 읽습니다.
//! 중간에 프로세스가 죽으면 셋 다 커밋되지 않은 채 `analyzing`으로 남고,
//! 복구 때 `failed`가 되어 원장에도 반영되지 않습니다.
//!
//! 외부 분석 실패는 작업 실패가 아닙니다. 작업이 `failed`가 되는 것은
//! 레코드가 사라지는 등 복구할 수 없는 내부 오류뿐입니다.

use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

use crate::clock::{format_timestamp, Clock};
use crate::db;
use crate::error::AppError;
use crate::models::{AnalysisJob, AnalysisResult, JobStatus};
use crate::services::analysis::{AnalysisError, AnalysisProvider};
use crate::services::fallback;
use crate::services::ledger::{CompletedJob, Ledger};

const INTERRUPTED_MESSAGE: &str = "interrupted by restart";

/// 재시작 복구 결과
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub rescheduled: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct JobRunner {
    pool: SqlitePool,
    provider: Option<Arc<dyn AnalysisProvider>>,
    ledger: Ledger,
    clock: Arc<dyn Clock>,
    timeout: Duration,
}

impl JobRunner {
    pub fn new(
        pool: SqlitePool,
        provider: Option<Arc<dyn AnalysisProvider>>,
        ledger: Ledger,
        clock: Arc<dyn Clock>,
        timeout: Duration,
    ) -> Self {
        Self {
            pool,
            provider,
            ledger,
            clock,
            timeout,
        }
    }

    /// 백그라운드에서 작업을 처리하도록 예약하고 즉시 반환합니다.
    pub fn schedule(&self, job_id: String) -> JoinHandle<()> {
        let runner = self.clone();
        tokio::spawn(async move { runner.run(&job_id).await })
    }

    /// 작업 하나를 끝까지 처리합니다. 에러는 작업의 `failed` 상태로만 남습니다.
    /// 분석을 시작하기 전에 난 에러라면 작업은 `queued`로 남습니다.
    pub async fn run(&self, job_id: &str) {
        let started = Instant::now();
        let Err(e) = self.process(job_id, started).await else {
            return;
        };

        tracing::error!(job_id, error = %e, "analysis job failed");
        let completed_at = format_timestamp(self.clock.now());
        match db::fail_job(
            &self.pool,
            job_id,
            &e.to_string(),
            Some(elapsed_ms(started)),
            &completed_at,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => tracing::warn!(job_id, "job not analyzing, leaving its status as is"),
            Err(db_error) => tracing::error!(job_id, error = %db_error, "could not mark job failed"),
        }
    }

    async fn process(&self, job_id: &str, started: Instant) -> Result<(), AppError> {
        let started_at = format_timestamp(self.clock.now());
        if !db::mark_job_analyzing(&self.pool, job_id, &started_at).await? {
            return match db::get_job_status(&self.pool, job_id).await? {
                None => Err(AppError::JobFailed(format!(
                    "job {job_id} disappeared before analysis"
                ))),
                Some(status) => {
                    tracing::debug!(job_id, %status, "job not queued, skipping");
                    Ok(())
                }
            };
        }

        let job = db::get_job(&self.pool, job_id)
            .await?
            .ok_or_else(|| AppError::JobFailed(format!("job {job_id} disappeared during analysis")))?;

        let result = self.analyze(&job).await;
        let result_json =
            serde_json::to_string(&result).map_err(|e| AppError::Internal(e.to_string()))?;
        let processing_time_ms = elapsed_ms(started);

        let completion = CompletedJob {
            job_id,
            user_id: &job.user_id,
            result: &result,
            result_json: &result_json,
            processing_time_ms,
        };
        match self.ledger.apply_completion(completion).await? {
            Some(outcome) => tracing::info!(
                job_id,
                user_id = %job.user_id,
                used_fallback = result.used_fallback,
                improvement = result.improvement_percentage,
                score = outcome.score,
                processing_time_ms,
                "analysis job completed"
            ),
            None => tracing::warn!(job_id, "job resolved elsewhere during analysis, result dropped"),
        }
        Ok(())
    }

    /// 외부 분석을 시도하고, 어떤 이유로든 실패하면 폴백 결과를 돌려줍니다.
    pub async fn analyze(&self, job: &AnalysisJob) -> AnalysisResult {
        let attempt = match &self.provider {
            None => Err(AnalysisError::NotConfigured),
            Some(provider) => {
                let call = provider.analyze(&job.code, &job.language, &job.title);
                match tokio::time::timeout(self.timeout, call).await {
                    Ok(outcome) => outcome,
                    Err(_) => Err(AnalysisError::Timeout),
                }
            }
        };

        match attempt {
            Ok(result) => result,
            Err(AnalysisError::NotConfigured) => {
                fallback::analyze_locally(&job.code, &job.language, AnalysisError::NotConfigured.reason())
            }
            Err(e) => {
                tracing::warn!(job_id = %job.id, reason = e.reason(), error = %e, "analysis degraded, using fallback");
                fallback::analyze_locally(&job.code, &job.language, e.reason())
            }
        }
    }

    /// 시작 시 호출합니다.
    ///
    /// - `analyzing`에 멈춘 작업: 상태를 되돌릴 수 없으므로 `failed`
    /// - `queued` 작업: 다시 예약
    pub async fn recover_interrupted_jobs(&self) -> Result<RecoveryReport, AppError> {
        let now = format_timestamp(self.clock.now());

        let stuck = db::list_job_ids_with_status(&self.pool, JobStatus::Analyzing.as_str()).await?;
        let mut report = RecoveryReport::default();
        for job_id in &stuck {
            if db::fail_job(&self.pool, job_id, INTERRUPTED_MESSAGE, None, &now).await? {
                report.failed += 1;
            }
        }

        let queued = db::list_job_ids_with_status(&self.pool, JobStatus::Queued.as_str()).await?;
        for job_id in queued {
            self.schedule(job_id);
            report.rescheduled += 1;
        }

        if report != RecoveryReport::default() {
            tracing::info!(
                rescheduled = report.rescheduled,
                failed = report.failed,
                "recovered jobs left over from previous run"
            );
        }
        Ok(report)
    }
}

fn elapsed_ms(started: Instant) -> i64 {
    i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX)
}
