//! # 외부 분석 API 클라이언트
//!
//! 코드 분석을 수행하는 외부 모델을 `AnalysisProvider` 트레이트 뒤에 숨깁니다.
//! 운영에서는 OpenAI 호환 `/chat/completions` 엔드포인트를 호출하는
//! `HttpAnalysisProvider`를, 테스트에서는 고정 결과를 돌려주는 스텁을 씁니다.
//!
//! 여기서 나는 모든 실패(`AnalysisError`)는 러너에서 폴백 분석으로 흡수됩니다.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use thiserror::Error;

use crate::config::AnalysisApiConfig;
use crate::models::{AnalysisResult, Suggestion};

#[derive(Debug, Error)]
pub enum AnalysisError {
    #[error("analysis capability is not configured")]
    NotConfigured,
    #[error("analysis timed out")]
    Timeout,
    #[error("analysis request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("analysis service returned HTTP {0}")]
    Upstream(u16),
    #[error("malformed analysis output: {0}")]
    Malformed(String),
}

impl AnalysisError {
    /// 결과의 `fallback_reason`에 기록할 짧은 사유
    pub fn reason(&self) -> &'static str {
        match self {
            AnalysisError::NotConfigured => "not_configured",
            AnalysisError::Timeout => "timeout",
            AnalysisError::Http(_) => "unavailable",
            AnalysisError::Upstream(_) => "upstream_error",
            AnalysisError::Malformed(_) => "malformed_output",
        }
    }
}

/// 외부 분석 능력: `analyze(source, language, title) -> 구조화된 결과`
#[async_trait]
pub trait AnalysisProvider: Send + Sync {
    fn name(&self) -> &str;

    async fn analyze(
        &self,
        code: &str,
        language: &str,
        title: &str,
    ) -> Result<AnalysisResult, AnalysisError>;
}

const SYSTEM_PROMPT: &str = "You are a code optimization reviewer. Reply with a single JSON object \
and nothing else, using exactly these keys: original_complexity (string, big-O), \
optimized_complexity (string, big-O), improvement_percentage (number 0-100), \
suggestions (array of {category, message, line}), quality_score (number 0-100), \
readability_score (number 0-100), optimized_code (string or null).";

pub struct HttpAnalysisProvider {
    client: Client,
    config: AnalysisApiConfig,
}

impl HttpAnalysisProvider {
    pub fn new(config: AnalysisApiConfig) -> Self {
        Self {
            client: Client::new(),
            config,
        }
    }
}

#[async_trait]
impl AnalysisProvider for HttpAnalysisProvider {
    fn name(&self) -> &str {
        &self.config.model
    }

    async fn analyze(
        &self,
        code: &str,
        language: &str,
        title: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let mut request = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .json(&json!({
                "model": self.config.model,
                "temperature": 0,
                "response_format": { "type": "json_object" },
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    {
                        "role": "user",
                        "content": format!("Title: {title}\nLanguage: {language}\n\n```{language}\n{code}\n```"),
                    }
                ],
            }));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AnalysisError::Upstream(response.status().as_u16()));
        }

        let data = response.json::<serde_json::Value>().await?;
        let content = data["choices"][0]["message"]["content"]
            .as_str()
            .ok_or_else(|| AnalysisError::Malformed("missing choices[0].message.content".into()))?;

        parse_model_output(content)
    }
}

#[derive(Debug, Deserialize)]
struct ModelOutput {
    original_complexity: String,
    optimized_complexity: String,
    improvement_percentage: f64,
    #[serde(default)]
    suggestions: Vec<ModelSuggestion>,
    quality_score: f64,
    readability_score: f64,
    #[serde(default)]
    optimized_code: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ModelSuggestion {
    #[serde(default = "default_category")]
    category: String,
    message: String,
    #[serde(default)]
    line: Option<u32>,
}

fn default_category() -> String {
    "general".to_string()
}

/// 모델 응답 텍스트를 검증된 `AnalysisResult`로 바꿉니다.
///
/// 코드 펜스(```json ... ```)로 감싼 응답도 받아들입니다.
/// 점수가 숫자가 아니거나 0–100 범위를 벗어나면 형식 오류로 봅니다.
pub fn parse_model_output(content: &str) -> Result<AnalysisResult, AnalysisError> {
    let body = strip_code_fence(content);
    let output: ModelOutput =
        serde_json::from_str(body).map_err(|e| AnalysisError::Malformed(e.to_string()))?;

    for (field, value) in [
        ("improvement_percentage", output.improvement_percentage),
        ("quality_score", output.quality_score),
        ("readability_score", output.readability_score),
    ] {
        if !value.is_finite() || !(0.0..=100.0).contains(&value) {
            return Err(AnalysisError::Malformed(format!("{field} out of range: {value}")));
        }
    }
    if output.original_complexity.trim().is_empty() || output.optimized_complexity.trim().is_empty()
    {
        return Err(AnalysisError::Malformed("empty complexity estimate".into()));
    }

    Ok(AnalysisResult {
        original_complexity: output.original_complexity,
        optimized_complexity: output.optimized_complexity,
        improvement_percentage: output.improvement_percentage,
        suggestions: output
            .suggestions
            .into_iter()
            .filter(|s| !s.message.trim().is_empty())
            .map(|s| Suggestion {
                category: s.category,
                message: s.message,
                line: s.line,
            })
            .collect(),
        quality_score: output.quality_score,
        readability_score: output.readability_score,
        optimized_code: output.optimized_code.filter(|c| !c.trim().is_empty()),
        used_fallback: false,
        fallback_reason: None,
    })
}

fn strip_code_fence(content: &str) -> &str {
    let trimmed = content.trim();
    let Some(inner) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // 첫 줄의 언어 태그(json 등)를 건너뜁니다.
    let inner = inner.split_once('\n').map(|(_, rest)| rest).unwrap_or(inner);
    inner.trim_end().strip_suffix("```").unwrap_or(inner).trim()
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"{
        "original_complexity": "O(n^2)",
        "optimized_complexity": "O(n)",
        "improvement_percentage": 80,
        "suggestions": [{"category": "performance", "message": "Use a HashSet", "line": 3}],
        "quality_score": 90,
        "readability_score": 85,
        "optimized_code": "fn f() {}"
    }"#;

    #[test]
    fn parses_plain_json() {
        let result = parse_model_output(VALID).unwrap();
        assert_eq!(result.improvement_percentage, 80.0);
        assert_eq!(result.suggestions.len(), 1);
        assert_eq!(result.suggestions[0].line, Some(3));
        assert!(!result.used_fallback);
        assert_eq!(result.optimized_code.as_deref(), Some("fn f() {}"));
    }

    #[test]
    fn parses_fenced_json() {
        let fenced = format!("```json\n{VALID}\n```");
        assert!(parse_model_output(&fenced).is_ok());
    }

    #[test]
    fn rejects_out_of_range_scores() {
        let bad = VALID.replace("\"quality_score\": 90", "\"quality_score\": 140");
        assert!(matches!(
            parse_model_output(&bad),
            Err(AnalysisError::Malformed(_))
        ));
    }

    #[test]
    fn rejects_prose() {
        let err = parse_model_output("Sure! Your code looks great.").unwrap_err();
        assert_eq!(err.reason(), "malformed_output");
    }
}
