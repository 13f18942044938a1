//! # 데이터베이스 접근 계층 (Data Access Layer)
//!
//! 데이터베이스와 직접 상호작용하는 함수들을 모아둔 모듈입니다.
//! 서비스(services/)와 라우트 핸들러(routes/)가 이 모듈의 함수를 호출합니다.
//!
//! 각 하위 모듈:
//! - `jobs`: 분석 작업 생성/상태 전이/조회
//! - `progress`: 사용자 진행도 조회/저장
//! - `leaderboard`: 리더보드 점수·순위 저장과 페이지 조회
//! - `users`: 표시 이름 디렉토리
//!
//! 트랜잭션 안에서도 쓰이는 함수는 `&SqlitePool` 대신
//! `impl SqliteExecutor<'_>`를 받습니다. 풀(`&pool`)과
//! 트랜잭션 연결(`&mut *tx`) 모두 넘길 수 있습니다.

pub mod jobs;
pub mod leaderboard;
pub mod progress;
pub mod users;

pub use jobs::*;
pub use leaderboard::*;
pub use progress::*;
pub use users::*;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;

/// SQLite 연결 풀을 만들고 마이그레이션을 실행합니다.
///
/// - 파일이 없으면 새로 만듭니다.
/// - WAL 모드: 읽기 요청(상태 폴링)이 쓰기 트랜잭션(원장/랭킹 갱신)에 막히지 않습니다.
/// - busy_timeout: 동시에 끝난 작업들의 쓰기 경합을 잠시 기다립니다.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    tracing::info!("Running database migrations...");
    sqlx::migrate!("./migrations").run(&pool).await?;

    Ok(pool)
}
