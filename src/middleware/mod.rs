//! # 미들웨어 모듈
//!
//! - `auth`: Bearer 토큰을 검증해 `AuthUser`를 만드는 Extractor

pub mod auth;
