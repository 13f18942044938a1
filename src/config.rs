//! # 애플리케이션 설정(Configuration) 모듈
//!
//! 환경변수에서 서버 설정값을 읽어오는 모듈입니다.
//! `.env` 파일이나 시스템 환경변수에서 값을 가져옵니다.
//!
//! 필수 항목:
//! - `DATABASE_URL`: SQLite 데이터베이스 경로
//! - `JWT_SECRET`: Bearer 토큰 검증용 비밀키
//!
//! 나머지(분석 API, 캐시, 할당량 등)는 모두 기본값이 있습니다.
//! `ANALYSIS_API_URL`이 없으면 모든 작업이 로컬 폴백 분석으로 처리됩니다.

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::services::cache::MIN_SWEEP_INTERVAL;

/// 애플리케이션 전체 설정을 담는 구조체
///
/// 서버 시작 시 환경변수에서 한 번 읽어온 후,
/// 애플리케이션 전체에서 공유됩니다.
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite 데이터베이스 URL (예: "sqlite:data/codequest.db")
    pub database_url: String,
    /// Bearer 토큰 서명 검증에 사용하는 비밀키
    pub jwt_secret: String,
    /// 서버가 바인딩할 호스트 주소 (기본값: "0.0.0.0")
    pub host: String,
    /// 서버 포트 번호 (기본값: 3000)
    pub port: u16,
    /// 외부 분석 API 설정. None이면 항상 폴백 분석을 사용합니다.
    pub analysis: Option<AnalysisApiConfig>,
    /// 외부 분석 호출의 최대 대기 시간 (기본값: 15초)
    pub analysis_timeout: Duration,
    /// 제출 코드의 최대 길이 (문자 수, 기본값: 50,000)
    pub max_code_chars: usize,
    /// 사용자당 하루(UTC) 작업 수 제한. 0이면 무제한
    pub daily_job_quota: u32,
    /// 캐시 설정
    pub cache: CacheConfig,
    /// 재정렬을 백그라운드로 미룬 뒤 n번째 재시도는 n × 이 값만큼 기다립니다 (기본값: 5초)
    pub deferred_rerank_backoff: Duration,
}

/// OpenAI 호환 분석 API 접속 정보
#[derive(Debug, Clone)]
pub struct AnalysisApiConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
}

/// 점수 캐시(Score Cache) 튜닝 값
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// 최대 상주 항목 수
    pub capacity: usize,
    /// 기본 항목 수명 (사용자 통계, 작업 상태)
    pub default_ttl: Duration,
    /// 리더보드 항목 수명. 재계산 비용이 커서 더 길게 둡니다.
    pub leaderboard_ttl: Duration,
    /// 백그라운드 청소 주기. 만료 후 이 시간이 더 지난 항목을 제거합니다.
    pub sweep_interval: Duration,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            capacity: 500,
            default_ttl: Duration::from_secs(30),
            leaderboard_ttl: Duration::from_secs(60),
            sweep_interval: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// 환경변수에서 설정값을 읽어 Config 인스턴스를 생성합니다.
    ///
    /// # 에러
    /// `DATABASE_URL`과 `JWT_SECRET`은 필수이며, 없으면 에러가 발생합니다.
    /// 숫자 설정값은 파싱에 실패하면 기본값을 사용합니다.
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = CacheConfig::default();

        // ANALYSIS_API_URL이 비어 있으면 외부 분석을 끈 것으로 간주합니다.
        let analysis = env::var("ANALYSIS_API_URL")
            .ok()
            .filter(|url| !url.trim().is_empty())
            .map(|base_url| AnalysisApiConfig {
                base_url: base_url.trim_end_matches('/').to_string(),
                api_key: env::var("ANALYSIS_API_KEY").ok().filter(|k| !k.is_empty()),
                model: env::var("ANALYSIS_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            });

        Ok(Self {
            database_url: env::var("DATABASE_URL")?,
            jwt_secret: env::var("JWT_SECRET")?,
            host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: parse_or("PORT", 3000),
            analysis,
            analysis_timeout: Duration::from_secs(parse_or("ANALYSIS_TIMEOUT_SECS", 15)),
            max_code_chars: parse_or("MAX_CODE_CHARS", 50_000),
            daily_job_quota: parse_or("DAILY_JOB_QUOTA", 25),
            cache: CacheConfig {
                capacity: parse_or("CACHE_CAPACITY", defaults.capacity),
                default_ttl: secs_or("CACHE_TTL_SECS", defaults.default_ttl),
                leaderboard_ttl: secs_or("LEADERBOARD_CACHE_TTL_SECS", defaults.leaderboard_ttl),
                sweep_interval: secs_or("CACHE_SWEEP_SECS", defaults.sweep_interval)
                    .max(MIN_SWEEP_INTERVAL),
            },
            deferred_rerank_backoff: Duration::from_millis(parse_or(
                "DEFERRED_RERANK_BACKOFF_MS",
                5_000,
            )),
        })
    }
}

/// 환경변수를 읽어 파싱하고, 없거나 형식이 틀리면 기본값을 반환합니다.
fn parse_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|raw| raw.trim().parse().ok())
        .unwrap_or(default)
}

fn secs_or(key: &str, default: Duration) -> Duration {
    Duration::from_secs(parse_or(key, default.as_secs()))
}
