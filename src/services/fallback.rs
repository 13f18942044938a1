//! # 로컬 폴백 분석
//!
//! 외부 분석 API를 쓸 수 없을 때(미설정, 시간 초과, 형식 오류) 사용하는
//! 결정적(deterministic) 분석입니다. 같은 입력에는 언제나 같은 결과를 냅니다.
//!
//! 단순한 정적 신호만 봅니다:
//! - 반복문 중첩 깊이 (들여쓰기 기준) → 다항 복잡도
//! - 자기 자신을 호출하는 함수 → 지수 복잡도
//! - 긴 줄, TODO 표시, 주석 비율, 깊은 들여쓰기 → 품질/가독성 감점
//!
//! 결과에는 `used_fallback = true`와 사유가 붙어서
//! 하위 소비자가 "실제 분석"과 구분할 수 있습니다.

use crate::models::{AnalysisResult, Suggestion};

const LONG_LINE: usize = 100;
const TAB_WIDTH: usize = 4;

/// 코드에서 뽑아낸 정적 신호
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticSignals {
    pub line_count: usize,
    pub code_lines: usize,
    pub comment_lines: usize,
    /// 가장 깊은 반복문 중첩 (0 = 반복문 없음)
    pub max_loop_depth: usize,
    /// 가장 깊은 중첩 반복문이 시작된 줄 (1부터)
    pub deepest_loop_line: Option<u32>,
    pub recursive_functions: Vec<String>,
    pub first_recursive_line: Option<u32>,
    pub long_lines: usize,
    pub first_long_line: Option<u32>,
    pub todo_markers: usize,
    pub max_indent_level: usize,
    pub average_line_length: f64,
}

fn comment_prefixes(language: &str) -> &'static [&'static str] {
    match language.to_ascii_lowercase().as_str() {
        "python" | "py" | "ruby" | "rb" | "shell" | "bash" | "sh" | "r" | "perl" => &["#"],
        "sql" | "lua" | "haskell" | "hs" => &["--"],
        _ => &["//", "/*", "* ", "*/"],
    }
}

fn indent_width(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { TAB_WIDTH } else { 1 })
        .sum()
}

fn is_loop_line(trimmed: &str) -> bool {
    const STARTS: [&str; 10] = [
        "for ", "for(", "while ", "while(", "loop {", "loop{", "do {", "do{", "foreach", "until ",
    ];
    STARTS.iter().any(|kw| trimmed.starts_with(kw))
        || trimmed.contains(".forEach(")
        || trimmed.contains(".each do")
}

/// `fn name`, `def name`, `function name`, `func name` 형태의 정의에서 이름을 추출합니다.
fn defined_function(trimmed: &str) -> Option<String> {
    const KEYWORDS: [&str; 4] = ["fn ", "def ", "function ", "func "];
    let rest = trimmed
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    let start = KEYWORDS.iter().find_map(|kw| {
        rest.find(kw)
            .filter(|&idx| idx == 0 || !is_ident_char(rest.as_bytes()[idx - 1] as char))
            .map(|idx| idx + kw.len())
    })?;
    let name: String = rest[start..].chars().take_while(|c| is_ident_char(*c)).collect();
    (!name.is_empty()).then_some(name)
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

/// 줄 안에 `name(` 호출이 있는지 (다른 식별자의 일부가 아닌 경우만)
fn calls(line: &str, name: &str) -> bool {
    let needle = format!("{name}(");
    line.match_indices(&needle).any(|(idx, _)| {
        idx == 0
            || line[..idx]
                .chars()
                .next_back()
                .is_some_and(|c| !is_ident_char(c))
    })
}

pub fn collect_signals(code: &str, language: &str) -> StaticSignals {
    let prefixes = comment_prefixes(language);
    let lines: Vec<&str> = code.lines().collect();
    let mut signals = StaticSignals {
        line_count: lines.len(),
        ..StaticSignals::default()
    };

    let mut loop_stack: Vec<usize> = Vec::new();
    let mut total_len = 0usize;
    let mut indent_unit = usize::MAX;

    for (idx, raw) in lines.iter().enumerate() {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            continue;
        }
        let line_no = idx as u32 + 1;
        let indent = indent_width(raw);
        if indent > 0 {
            indent_unit = indent_unit.min(indent);
        }

        let upper = trimmed.to_ascii_uppercase();
        if upper.contains("TODO") || upper.contains("FIXME") {
            signals.todo_markers += 1;
        }
        if prefixes.iter().any(|p| trimmed.starts_with(p)) {
            signals.comment_lines += 1;
            continue;
        }

        signals.code_lines += 1;
        total_len += raw.chars().count();
        if raw.chars().count() > LONG_LINE {
            signals.long_lines += 1;
            signals.first_long_line.get_or_insert(line_no);
        }

        // 같거나 얕은 들여쓰기의 줄이 나오면 그 반복문은 닫힌 것으로 봅니다.
        while loop_stack.last().is_some_and(|&open| open >= indent) {
            loop_stack.pop();
        }
        if is_loop_line(trimmed) {
            loop_stack.push(indent);
            if loop_stack.len() > signals.max_loop_depth {
                signals.max_loop_depth = loop_stack.len();
                signals.deepest_loop_line = Some(line_no);
            }
        }

        if let Some(name) = defined_function(trimmed) {
            let body_call = lines
                .iter()
                .enumerate()
                .skip(idx + 1)
                .take_while(|(_, body)| body.trim().is_empty() || indent_width(body) > indent)
                .find(|(_, body)| calls(body, &name));
            if let Some((call_idx, _)) = body_call {
                signals.first_recursive_line.get_or_insert(call_idx as u32 + 1);
                signals.recursive_functions.push(name);
            }
        }
    }

    if indent_unit != usize::MAX {
        signals.max_indent_level = lines
            .iter()
            .filter(|l| !l.trim().is_empty())
            .map(|l| indent_width(l) / indent_unit)
            .max()
            .unwrap_or(0);
    }
    if signals.code_lines > 0 {
        signals.average_line_length = total_len as f64 / signals.code_lines as f64;
    }

    signals
}

fn power(depth: usize) -> String {
    match depth {
        0 => "O(1)".to_string(),
        1 => "O(n)".to_string(),
        d => format!("O(n^{d})"),
    }
}

/// 정적 신호로 최선의 추정 결과를 만듭니다.
pub fn analyze_locally(code: &str, language: &str, reason: &str) -> AnalysisResult {
    let signals = collect_signals(code, language);
    let mut suggestions = Vec::new();

    let recursive = !signals.recursive_functions.is_empty();
    let depth = signals.max_loop_depth;

    let (original, optimized, mut improvement) = if recursive {
        ("O(2^n)".to_string(), "O(n)".to_string(), 60.0)
    } else if depth >= 2 {
        (
            power(depth),
            power(depth - 1),
            (45.0 + 10.0 * (depth as f64 - 2.0)).min(75.0),
        )
    } else if depth == 1 {
        (power(1), power(1), 10.0)
    } else {
        (power(0), power(0), 0.0)
    };
    if recursive && depth >= 2 {
        improvement = 70.0;
    }

    if recursive {
        suggestions.push(Suggestion {
            category: "performance".to_string(),
            message: format!(
                "Recursive function `{}` may recompute subproblems; memoize results or convert it to an iterative loop",
                signals.recursive_functions.join("`, `")
            ),
            line: signals.first_recursive_line,
        });
    }
    if depth >= 2 {
        suggestions.push(Suggestion {
            category: "performance".to_string(),
            message: format!(
                "{depth} levels of nested loops; replace the inner scan with a hash map or set lookup"
            ),
            line: signals.deepest_loop_line,
        });
    }
    if signals.long_lines > 0 {
        suggestions.push(Suggestion {
            category: "readability".to_string(),
            message: format!(
                "{} line(s) exceed {LONG_LINE} characters; split long expressions",
                signals.long_lines
            ),
            line: signals.first_long_line,
        });
    }
    if signals.max_indent_level > 4 {
        suggestions.push(Suggestion {
            category: "readability".to_string(),
            message: "Deep indentation; extract nested blocks into helper functions or use early returns"
                .to_string(),
            line: None,
        });
    }
    if signals.todo_markers > 0 {
        suggestions.push(Suggestion {
            category: "maintainability".to_string(),
            message: format!("{} TODO/FIXME marker(s) left in the code", signals.todo_markers),
            line: None,
        });
    }
    if signals.code_lines > 20 && signals.comment_lines == 0 {
        suggestions.push(Suggestion {
            category: "style".to_string(),
            message: "No comments in a non-trivial snippet; document the intent of the main steps"
                .to_string(),
            line: None,
        });
    }

    AnalysisResult {
        original_complexity: original,
        optimized_complexity: optimized,
        improvement_percentage: improvement,
        suggestions,
        quality_score: quality_score(&signals),
        readability_score: readability_score(&signals),
        optimized_code: None,
        used_fallback: true,
        fallback_reason: Some(reason.to_string()),
    }
}

fn quality_score(signals: &StaticSignals) -> f64 {
    let mut score = 100.0;
    if signals.max_loop_depth >= 2 {
        score -= 10.0 * (signals.max_loop_depth as f64 - 1.0);
    }
    if !signals.recursive_functions.is_empty() {
        score -= 10.0;
    }
    score -= (2.0 * signals.long_lines as f64).min(20.0);
    score -= (2.0 * signals.todo_markers as f64).min(10.0);
    if signals.code_lines > 200 {
        score -= 10.0;
    }
    if signals.code_lines > 20 && signals.comment_lines == 0 {
        score -= 5.0;
    }
    f64::clamp(score, 0.0, 100.0)
}

fn readability_score(signals: &StaticSignals) -> f64 {
    let mut score = 100.0;
    if signals.average_line_length > 80.0 {
        score -= 20.0;
    } else if signals.average_line_length > 60.0 {
        score -= 10.0;
    }
    score -= (5.0 * signals.max_indent_level.saturating_sub(4) as f64).min(20.0);
    score -= (1.0 * signals.long_lines as f64).min(15.0);
    if signals.code_lines > 0 {
        let comment_ratio =
            signals.comment_lines as f64 / (signals.code_lines + signals.comment_lines) as f64;
        if comment_ratio >= 0.1 {
            score += 5.0;
        }
    }
    f64::clamp(score, 0.0, 100.0)
}
