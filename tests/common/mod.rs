//! Shared helpers for the integration tests.
//!
//! Every test gets its own SQLite file in a temp dir, a `ManualClock`
//! pinned to a fixed instant, and whatever analysis provider it asks for.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use chrono::{TimeZone, Utc};
use codequest::{
    build_router,
    clock::{Clock, ManualClock},
    config::{CacheConfig, Config},
    db,
    middleware::auth::create_access_token,
    models::{AnalysisResult, Suggestion},
    services::{AnalysisError, AnalysisProvider},
    AppState,
};
use serde_json::Value;
use sqlx::SqlitePool;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tower::util::ServiceExt; // for `oneshot`

pub const JWT_SECRET: &str = "integration-test-secret";

pub struct TestApp {
    pub state: AppState,
    pub pool: SqlitePool,
    pub clock: Arc<ManualClock>,
    _dir: TempDir,
}

pub struct TestAppBuilder {
    provider: Option<Arc<dyn AnalysisProvider>>,
    daily_job_quota: u32,
    max_code_chars: usize,
    analysis_timeout: Duration,
    deferred_rerank_backoff: Duration,
}

impl TestApp {
    pub fn builder() -> TestAppBuilder {
        TestAppBuilder {
            provider: None,
            daily_job_quota: 0,
            max_code_chars: 50_000,
            analysis_timeout: Duration::from_secs(15),
            deferred_rerank_backoff: Duration::from_millis(50),
        }
    }

    pub fn router(&self) -> Router {
        build_router(self.state.clone())
    }

    pub async fn request(
        &self,
        method: &str,
        uri: &str,
        user: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            let token = token_for(user);
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, json)
    }

    /// Submits a job and returns its id, asserting the 202 response.
    pub async fn submit(&self, user: &str, code: &str) -> String {
        let (status, body) = self
            .request(
                "POST",
                "/api/v1/jobs",
                Some(user),
                Some(serde_json::json!({
                    "title": "nested search",
                    "language": "rust",
                    "code": code,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED, "submit failed: {body}");
        assert_eq!(body["status"], "queued");
        body["job_id"].as_str().unwrap().to_string()
    }

    /// Polls the status endpoint until the job is completed or failed.
    pub async fn wait_for_terminal(&self, user: &str, job_id: &str) -> Value {
        let uri = format!("/api/v1/jobs/{job_id}");
        for _ in 0..500 {
            let (status, body) = self.request("GET", &uri, Some(user), None).await;
            assert_eq!(status, StatusCode::OK, "poll failed: {body}");
            if body["status"] == "completed" || body["status"] == "failed" {
                return body;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("job {job_id} never reached a terminal status");
    }
}

impl TestAppBuilder {
    pub fn provider(mut self, provider: impl AnalysisProvider + 'static) -> Self {
        let provider: Arc<dyn AnalysisProvider> = Arc::new(provider);
        self.provider = Some(provider);
        self
    }

    pub fn daily_job_quota(mut self, quota: u32) -> Self {
        self.daily_job_quota = quota;
        self
    }

    pub fn max_code_chars(mut self, max: usize) -> Self {
        self.max_code_chars = max;
        self
    }

    pub fn analysis_timeout(mut self, timeout: Duration) -> Self {
        self.analysis_timeout = timeout;
        self
    }

    pub fn deferred_rerank_backoff(mut self, backoff: Duration) -> Self {
        self.deferred_rerank_backoff = backoff;
        self
    }

    pub async fn build(self) -> TestApp {
        let dir = tempfile::tempdir().unwrap();
        let database_url = format!("sqlite://{}", dir.path().join("codequest.db").display());
        let pool = db::init_pool(&database_url).await.unwrap();

        let config = Config {
            database_url,
            jwt_secret: JWT_SECRET.to_string(),
            host: "127.0.0.1".to_string(),
            port: 0,
            analysis: None,
            analysis_timeout: self.analysis_timeout,
            max_code_chars: self.max_code_chars,
            daily_job_quota: self.daily_job_quota,
            cache: CacheConfig::default(),
            deferred_rerank_backoff: self.deferred_rerank_backoff,
        };

        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2026, 10, 18, 9, 0, 0).unwrap(),
        ));
        let state = AppState::new(
            pool.clone(),
            &config,
            self.provider,
            clock.clone() as Arc<dyn Clock>,
        );

        TestApp {
            state,
            pool,
            clock,
            _dir: dir,
        }
    }
}

pub fn token_for(user: &str) -> String {
    let name = format!("{user}-name");
    create_access_token(user, Some(&name), JWT_SECRET).unwrap()
}

pub fn analysis(improvement: f64, quality: f64) -> AnalysisResult {
    AnalysisResult {
        original_complexity: "O(n^2)".to_string(),
        optimized_complexity: "O(n)".to_string(),
        improvement_percentage: improvement,
        suggestions: vec![Suggestion {
            category: "performance".to_string(),
            message: "Index the inner collection with a HashSet".to_string(),
            line: Some(2),
        }],
        quality_score: quality,
        readability_score: 75.0,
        optimized_code: None,
        used_fallback: false,
        fallback_reason: None,
    }
}

/// Always answers with the same result.
pub struct FixedProvider(pub AnalysisResult);

#[async_trait]
impl AnalysisProvider for FixedProvider {
    fn name(&self) -> &str {
        "fixed"
    }

    async fn analyze(&self, _: &str, _: &str, _: &str) -> Result<AnalysisResult, AnalysisError> {
        Ok(self.0.clone())
    }
}

/// Answers only after the given delay.
pub struct SlowProvider(pub Duration);

#[async_trait]
impl AnalysisProvider for SlowProvider {
    fn name(&self) -> &str {
        "slow"
    }

    async fn analyze(&self, _: &str, _: &str, _: &str) -> Result<AnalysisResult, AnalysisError> {
        tokio::time::sleep(self.0).await;
        Ok(analysis(95.0, 95.0))
    }
}

/// Returns prose instead of JSON.
pub struct ChattyProvider;

#[async_trait]
impl AnalysisProvider for ChattyProvider {
    fn name(&self) -> &str {
        "chatty"
    }

    async fn analyze(&self, _: &str, _: &str, _: &str) -> Result<AnalysisResult, AnalysisError> {
        codequest::services::analysis::parse_model_output("Looks good to me!")
    }
}

pub const NESTED_LOOPS: &str = "fn pairs(items: &[i32]) -> usize {
    let mut count = 0;
    for a in items {
        for b in items {
            if a + b == 0 {
                count += 1;
            }
        }
    }
    count
}";
