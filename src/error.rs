//! # 에러 처리 모듈
//!
//! 애플리케이션에서 클라이언트에게 보일 수 있는 모든 에러 타입을 정의합니다.
//!
//! 이 모듈의 핵심:
//! - `AppError` 열거형(enum): 모든 에러 종류를 하나의 타입으로 통합
//! - `IntoResponse` 구현: 에러를 HTTP 응답으로 자동 변환
//!
//! 외부 분석 API의 실패(`AnalysisError`)는 여기에 없습니다.
//! 그 실패는 러너(runner) 안에서 폴백 분석으로 흡수되어 작업 실패가 되지 않습니다.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// 애플리케이션에서 발생할 수 있는 모든 에러 종류
///
/// 핸들러에서 `Result<T, AppError>`를 반환하면,
/// Axum이 자동으로 `IntoResponse`를 호출하여 HTTP 응답으로 변환합니다.
#[derive(Debug, Error)]
pub enum AppError {
    /// 작업이 없거나 요청자 소유가 아님 (HTTP 404)
    #[error("Resource not found")]
    NotFound,

    /// 비어 있거나 너무 큰 제출물 등 잘못된 입력 (HTTP 400)
    /// 상태를 만들기 전에 거부되므로 수정 후 재제출하면 됩니다.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 요금제(billing gate)가 작업 생성을 거부함 (HTTP 429)
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// 복구할 수 없는 내부 오류로 작업이 실패함 (예: 작업 레코드가 사라짐)
    #[error("Job failed: {0}")]
    JobFailed(String),

    /// 서버 내부 오류 (HTTP 500)
    #[error("Internal error: {0}")]
    Internal(String),

    /// 데이터베이스 오류 (HTTP 500)
    /// #[from]: sqlx::Error → AppError::Database 자동 변환
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl IntoResponse for AppError {
    /// AppError를 HTTP 응답으로 변환합니다.
    ///
    /// 내부 에러(Database, Internal, JobFailed)는 실제 내용을 로그에만 기록하고,
    /// 클라이언트에는 일반적인 메시지만 반환합니다.
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            AppError::NotFound => (StatusCode::NOT_FOUND, "not_found", self.to_string()),
            AppError::InvalidInput(ref msg) => {
                (StatusCode::BAD_REQUEST, "invalid_input", msg.clone())
            }
            AppError::QuotaExceeded(ref msg) => {
                (StatusCode::TOO_MANY_REQUESTS, "quota_exceeded", msg.clone())
            }
            AppError::JobFailed(ref msg) => {
                tracing::error!("Job failed: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "job_failed",
                    "The job could not be processed".to_string(),
                )
            }
            AppError::Internal(ref msg) => {
                tracing::error!("Internal error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
            AppError::Database(ref e) => {
                tracing::error!("Database error: {}", e);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "database_error",
                    "A database error occurred".to_string(),
                )
            }
        };

        // 결과: { "error": { "code": "not_found", "message": "Resource not found" } }
        let body = Json(json!({
            "error": {
                "code": code,
                "message": message
            }
        }));

        (status, body).into_response()
    }
}
