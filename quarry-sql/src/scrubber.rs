//! SQL Scrubber
//!
//! Extracts a single candidate statement from raw oracle output. The oracle
//! is told to put its final answer after any reasoning, so the last
//! allow-listed segment wins. A parenthesis mismatch is treated as proof of
//! truncation and nothing is returned.

use once_cell::sync::Lazy;
use quarry_core::{CleanStatement, ErrorKind};
use regex::Regex;

/// Leading keywords a candidate statement may start with.
pub const ALLOWED_LEADING_KEYWORDS: &[&str] = &["SELECT", "SHOW", "WITH", "DESCRIBE", "DESC"];

static FENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"```[A-Za-z0-9_+-]*").expect("fence pattern is valid"));

static LEADING_KEYWORD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(SELECT|SHOW|WITH|DESCRIBE|DESC)\b").expect("keyword pattern is valid")
});

/// Why the scrubber produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrubRejection {
    /// No segment starts with an allow-listed keyword
    NoStatement,
    /// Opening and closing parenthesis counts differ
    Truncated { open: usize, close: usize },
}

impl ScrubRejection {
    pub fn error_kind(&self) -> ErrorKind {
        match self {
            Self::NoStatement => ErrorKind::UnsafeQuery,
            Self::Truncated { .. } => ErrorKind::QueryTruncated,
        }
    }

    /// Text fed back to the oracle on the next attempt.
    pub fn detail(&self) -> String {
        match self {
            Self::NoStatement => {
                "No SELECT, SHOW, WITH or DESCRIBE statement was found in the response".to_string()
            }
            Self::Truncated { open, close } => format!(
                "The query appears truncated: {} opening and {} closing parentheses",
                open, close
            ),
        }
    }
}

impl std::fmt::Display for ScrubRejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.detail())
    }
}

/// Extract the last allow-listed statement from `raw`, or say why not.
pub fn scrub_detailed(raw: &str) -> Result<CleanStatement, ScrubRejection> {
    let unfenced = FENCE.replace_all(raw, "");

    let candidate = split_statements(&unfenced)
        .into_iter()
        .filter_map(statement_body)
        .last()
        .ok_or(ScrubRejection::NoStatement)?;

    let open = candidate.matches('(').count();
    let close = candidate.matches(')').count();
    if open != close {
        tracing::debug!(open, close, "rejecting truncated candidate statement");
        return Err(ScrubRejection::Truncated { open, close });
    }

    Ok(CleanStatement::new(candidate))
}

/// Extract the last allow-listed statement from `raw`. `None` is a
/// rejection; see [`scrub_detailed`] for the reason.
pub fn scrub(raw: &str) -> Option<CleanStatement> {
    scrub_detailed(raw).ok()
}

/// Drop prose lines ahead of the first line that starts with an
/// allow-listed keyword. `None` when no such line exists.
fn statement_body(segment: &str) -> Option<String> {
    let lines: Vec<&str> = segment.lines().collect();
    let first = lines
        .iter()
        .position(|line| LEADING_KEYWORD.is_match(line.trim_start()))?;
    let body = lines[first..].join("\n");
    let body = body.trim();
    if body.is_empty() {
        None
    } else {
        Some(body.to_string())
    }
}

/// Split on `;` outside quoted runs.
fn split_statements(text: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut quote: Option<char> = None;
    let mut start = 0;
    let mut chars = text.char_indices().peekable();

    while let Some((i, c)) = chars.next() {
        match quote {
            Some(q) if c == q => {
                if chars.peek().map(|(_, n)| *n) == Some(q) {
                    chars.next();
                } else {
                    quote = None;
                }
            }
            Some('\'') if c == '\\' => {
                chars.next();
            }
            Some(_) => {}
            None => match c {
                '\'' | '"' | '`' => quote = Some(c),
                ';' => {
                    segments.push(&text[start..i]);
                    start = i + 1;
                }
                _ => {}
            },
        }
    }
    segments.push(&text[start..]);
    segments
}


#[cfg(test)]
mod prop_tests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(256))]

        #[test]
        fn prop_unbalanced_parens_never_scrub(
            body in "[a-z_ ,=0-9()]{0,40}",
        ) {
            let raw = format!("SELECT {}", body);
            if let Some(clean) = scrub(&raw) {
                let text = clean.as_str();
                prop_assert_eq!(text.matches('(').count(), text.matches(')').count());
            }
            let open = raw.matches('(').count();
            let close = raw.matches(')').count();
            if open != close {
                prop_assert!(scrub(&raw).is_none());
            }
        }

        #[test]
        fn prop_clean_statement_starts_with_allowed_keyword(raw in ".{0,80}") {
            if let Some(clean) = scrub(&raw) {
                let upper = clean.as_str().to_uppercase();
                prop_assert!(ALLOWED_LEADING_KEYWORDS.iter().any(|k| upper.starts_with(k)));
            }
        }
    }
}
