//! HTTP-level tests driven through `build_router` with `oneshot`.
//!
//! Covers status codes and error envelopes, ownership checks,
//! the leaderboard "where am I" guarantee and the progress read.

mod common;

use axum::http::StatusCode;
use common::*;
use serde_json::json;

#[tokio::test]
async fn health_needs_no_token() {
    let app = TestApp::builder().build().await;

    let (status, body) = app.request("GET", "/api/v1/health", None, None).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert!(body["cache"]["entries"].is_u64());
}

#[tokio::test]
async fn missing_or_forged_token_is_unauthorized() {
    let app = TestApp::builder().build().await;

    let (status, body) = app.request("GET", "/api/v1/jobs", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "missing_token");

    let forged = codequest::middleware::auth::create_access_token("mallory", None, "wrong-secret")
        .unwrap();
    let request = axum::http::Request::builder()
        .uri("/api/v1/progress")
        .header("authorization", format!("Bearer {forged}"))
        .body(axum::body::Body::empty())
        .unwrap();
    let response = tower::ServiceExt::oneshot(app.router(), request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn empty_and_oversized_code_are_rejected_without_creating_jobs() {
    let app = TestApp::builder().max_code_chars(40).build().await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/jobs",
            Some("ivan"),
            Some(json!({ "language": "rust", "code": "   \n  " })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_input");

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/jobs",
            Some("ivan"),
            Some(json!({ "language": "rust", "code": "x".repeat(41) })),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "invalid_input");

    let (_, body) = app.request("GET", "/api/v1/jobs", Some("ivan"), None).await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn quota_denial_is_429_and_creates_nothing() {
    let app = TestApp::builder().daily_job_quota(2).build().await;

    app.submit("judy", "fn a() {}").await;
    app.submit("judy", "fn b() {}").await;

    let (status, body) = app
        .request(
            "POST",
            "/api/v1/jobs",
            Some("judy"),
            Some(json!({ "language": "rust", "code": "fn c() {}" })),
        )
        .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["error"]["code"], "quota_exceeded");

    let (_, body) = app.request("GET", "/api/v1/jobs", Some("judy"), None).await;
    assert_eq!(body["jobs"].as_array().unwrap().len(), 2);

    // A different user has their own allowance.
    app.submit("ken", "fn a() {}").await;

    // The window resets at UTC midnight.
    app.clock.advance(chrono::Duration::days(1));
    app.submit("judy", "fn d() {}").await;
}

#[tokio::test]
async fn other_users_job_looks_missing() {
    let app = TestApp::builder().build().await;

    let job_id = app.submit("liam", NESTED_LOOPS).await;
    app.wait_for_terminal("liam", &job_id).await;

    let uri = format!("/api/v1/jobs/{job_id}");
    let (status, body) = app.request("GET", &uri, Some("mia"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");

    let (status, _) = app
        .request("GET", "/api/v1/jobs/does-not-exist", Some("liam"), None)
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn completed_job_exposes_result_and_timing() {
    let app = TestApp::builder()
        .provider(FixedProvider(analysis(72.5, 88.0)))
        .build()
        .await;

    let job_id = app.submit("nora", NESTED_LOOPS).await;
    let job = app.wait_for_terminal("nora", &job_id).await;

    assert_eq!(job["id"], job_id.as_str());
    assert_eq!(job["title"], "nested search");
    assert_eq!(job["language"], "rust");
    assert_eq!(job["line_count"], 11);
    assert!(job["created_at"].is_string());
    assert!(job["processing_time_ms"].is_i64());
    assert_eq!(job["result"]["suggestions"][0]["category"], "performance");
    assert!(job.get("user_id").is_none());

    let (_, listing) = app.request("GET", "/api/v1/jobs?limit=5", Some("nora"), None).await;
    let jobs = listing["jobs"].as_array().unwrap();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["status"], "completed");
    assert!(jobs[0].get("code").is_none());
}

#[tokio::test]
async fn leaderboard_always_contains_the_caller() {
    let app = TestApp::builder()
        .provider(FixedProvider(analysis(80.0, 90.0)))
        .build()
        .await;

    for user in ["olga", "pete", "quinn"] {
        let id = app.submit(user, NESTED_LOOPS).await;
        app.wait_for_terminal(user, &id).await;
    }

    let (status, body) = app
        .request(
            "GET",
            "/api/v1/leaderboard?page=1&page_size=1",
            Some("quinn"),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["period"], "all_time");

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0]["user_id"], "olga");
    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[0]["is_current_user"], false);
    assert_eq!(entries[1]["user_id"], "quinn");
    assert_eq!(entries[1]["rank"], 3);
    assert_eq!(entries[1]["is_current_user"], true);
    assert_eq!(entries[1]["display_name"], "quinn-name");

    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["page_size"], 1);
    assert_eq!(body["pagination"]["total"], 3);
    assert_eq!(body["pagination"]["has_more"], true);

    // On the caller's own page nothing is appended.
    let (_, body) = app
        .request(
            "GET",
            "/api/v1/leaderboard?page=3&page_size=1",
            Some("quinn"),
            None,
        )
        .await;
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["is_current_user"], true);
    assert_eq!(body["pagination"]["has_more"], false);
}

#[tokio::test]
async fn leaderboard_rejects_unknown_period_and_bad_paging() {
    let app = TestApp::builder().build().await;

    for uri in [
        "/api/v1/leaderboard?period=weekly",
        "/api/v1/leaderboard?page=0",
        "/api/v1/leaderboard?page_size=500",
    ] {
        let (status, body) = app.request("GET", uri, Some("rosa"), None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
        assert_eq!(body["error"]["code"], "invalid_input");
    }

    let (status, _) = app
        .request("GET", "/api/v1/leaderboard?period=all-time", Some("rosa"), None)
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn progress_defaults_then_reflects_completed_work() {
    let app = TestApp::builder()
        .provider(FixedProvider(analysis(80.0, 90.0)))
        .build()
        .await;

    let (status, body) = app.request("GET", "/api/v1/progress", Some("sam"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["progress"]["level"], 1);
    assert_eq!(body["progress"]["experience"], 0);
    assert_eq!(body["progress"]["experience_to_next_level"], 100);
    assert!(body["leaderboard"].is_null());

    // The default view above is cached; completion must invalidate it.
    let id = app.submit("sam", NESTED_LOOPS).await;
    app.wait_for_terminal("sam", &id).await;

    let (_, body) = app.request("GET", "/api/v1/progress", Some("sam"), None).await;
    assert_eq!(body["progress"]["experience"], 50);
    assert_eq!(body["progress"]["total_jobs"], 1);
    assert_eq!(body["leaderboard"]["score"], 655);
    assert_eq!(body["leaderboard"]["rank"], 1);
}
