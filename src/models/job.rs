//! # 분석 작업(Analysis Job) 모델 정의
//!
//! 사용자가 제출한 코드 조각 하나와 그 분석 라이프사이클을 나타냅니다.
//!
//! ## 상태 흐름
//! ```text
//! queued → analyzing → completed
//!                    ↘ failed
//! ```
//! 상태는 단조적입니다. `completed`나 `failed`에서 벗어나는 전이는 없습니다.
//! `result`는 상태가 `completed`일 때만 존재합니다 (DB CHECK 제약으로도 보장).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// 작업 상태
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Analyzing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Analyzing => "analyzing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    /// 더 이상 바뀌지 않는 상태인지 여부
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "queued" => Ok(JobStatus::Queued),
            "analyzing" => Ok(JobStatus::Analyzing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            other => Err(format!("unknown job status: {other}")),
        }
    }
}

/// `analysis_jobs` 테이블 한 행
///
/// `status`와 `result`는 DB에 문자열로 저장되므로 여기서도 String입니다.
/// 해석은 `JobView::from_row`에서 합니다.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct AnalysisJob {
    pub id: String,
    pub user_id: String,
    pub title: String,
    pub language: String,
    pub code: String,
    pub line_count: i64,
    pub status: String,
    /// 분석 결과 JSON (`AnalysisResult` 직렬화)
    pub result: Option<String>,
    pub error_message: Option<String>,
    pub processing_time_ms: Option<i64>,
    pub created_at: String,
    pub started_at: Option<String>,
    pub completed_at: Option<String>,
}

/// 구조화된 분석 결과
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// 개선 전 복잡도 추정 (예: "O(n^2)")
    pub original_complexity: String,
    /// 개선 후 복잡도 추정
    pub optimized_complexity: String,
    /// 0–100 개선율
    pub improvement_percentage: f64,
    pub suggestions: Vec<Suggestion>,
    /// 0–100 품질 점수
    pub quality_score: f64,
    /// 0–100 가독성 점수
    pub readability_score: f64,
    /// 재작성된 코드 (있을 때만)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub optimized_code: Option<String>,
    /// 로컬 폴백 분석으로 만들어진 결과인지 여부
    pub used_fallback: bool,
    /// 폴백 사유 (외부 분석 미설정, 시간 초과, 형식 오류 등)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Suggestion {
    /// performance, readability, style, correctness 등
    pub category: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// 작업 제출 요청 — `POST /api/v1/jobs`의 요청 본문
#[derive(Debug, Deserialize)]
pub struct SubmitJobRequest {
    pub title: Option<String>,
    pub language: String,
    pub code: String,
}

/// 작업 제출 응답. 분석을 기다리지 않고 즉시 반환됩니다.
#[derive(Debug, Serialize, Deserialize)]
pub struct SubmitJobResponse {
    pub job_id: String,
    pub status: JobStatus,
}

/// 상태 폴링 응답 — `GET /api/v1/jobs/{id}`
#[derive(Debug, Clone, Serialize)]
pub struct JobView {
    pub id: String,
    /// 소유권 확인용. 응답에는 내보내지 않습니다.
    #[serde(skip_serializing)]
    pub user_id: String,
    pub status: JobStatus,
    pub title: String,
    pub language: String,
    pub line_count: i64,
    pub created_at: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl JobView {
    pub fn from_row(job: AnalysisJob) -> Result<Self, String> {
        let status: JobStatus = job.status.parse()?;
        let result = match job.result.as_deref() {
            Some(raw) => Some(
                serde_json::from_str::<AnalysisResult>(raw)
                    .map_err(|e| format!("corrupt result for job {}: {}", job.id, e))?,
            ),
            None => None,
        };

        Ok(Self {
            id: job.id,
            user_id: job.user_id,
            status,
            title: job.title,
            language: job.language,
            line_count: job.line_count,
            created_at: job.created_at,
            completed_at: job.completed_at,
            processing_time_ms: job.processing_time_ms,
            result,
            error_message: job.error_message,
        })
    }
}

/// 작업 목록의 한 항목 (코드와 결과 본문은 제외)
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct JobSummary {
    pub id: String,
    pub title: String,
    pub language: String,
    pub line_count: i64,
    pub status: String,
    pub created_at: String,
    pub completed_at: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListJobsQuery {
    pub limit: Option<u32>,
}
