//! # 헬스체크(Health Check) 핸들러
//!
//! ## 엔드포인트
//! - `GET /api/v1/health` → `{ "status": "ok", "cache": { ... } }`
//!
//! 인증 없이 호출할 수 있습니다. 로드밸런서와 모니터링용입니다.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use super::AppState;

/// `GET /health` — 서버 상태와 캐시 통계를 반환합니다.
///
/// 실패하지 않는 핸들러이므로 `Result`를 쓰지 않습니다.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "cache": {
            "entries": state.cache.len(),
            "hits": state.cache.hits(),
            "misses": state.cache.misses(),
        }
    }))
}
