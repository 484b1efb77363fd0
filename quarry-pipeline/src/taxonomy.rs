//! Mapping of native driver errors onto the closed [`ErrorKind`] taxonomy.
//!
//! Rules are evaluated top to bottom. A rule matches on an exact native code
//! (PostgreSQL SQLSTATE or MySQL error number), a code prefix, or, when the
//! driver gave no usable code, a lowercase message fragment. The first match
//! wins; anything unmatched is `EXECUTION_ERROR`.

use once_cell::sync::Lazy;
use quarry_core::{DatabaseError, ErrorKind, QueryFailure};
use regex::Regex;

struct ErrorRule {
    kind: ErrorKind,
    codes: &'static [&'static str],
    code_prefixes: &'static [&'static str],
    messages: &'static [&'static str],
}

static RULES: &[ErrorRule] = &[
    ErrorRule {
        kind: ErrorKind::UnsafeQuery,
        codes: &["25006", "1792", "1290"],
        code_prefixes: &[],
        messages: &["read-only transaction", "read only transaction", "--read-only"],
    },
    ErrorRule {
        kind: ErrorKind::TableNotFound,
        codes: &["42P01", "1146", "1051"],
        code_prefixes: &[],
        messages: &["no such table", "unknown table"],
    },
    ErrorRule {
        kind: ErrorKind::GroupByError,
        codes: &["42803", "1055", "1056", "1140"],
        code_prefixes: &[],
        messages: &["group by", "only_full_group_by"],
    },
    ErrorRule {
        kind: ErrorKind::AccessDenied,
        codes: &["42501", "28000", "28P01", "1044", "1045", "1142", "1143", "1227", "1370"],
        code_prefixes: &[],
        messages: &["access denied", "permission denied", "command denied"],
    },
    ErrorRule {
        kind: ErrorKind::ConnectionError,
        codes: &["57P01", "57P02", "57P03", "53300", "1040", "2002", "2003", "2006", "2013"],
        code_prefixes: &["08"],
        messages: &[
            "connection refused",
            "connection reset",
            "connection closed",
            "server has gone away",
            "lost connection",
            "can't connect",
            "could not connect",
        ],
    },
    ErrorRule {
        kind: ErrorKind::LockTimeout,
        codes: &["40P01", "40001", "55P03", "57014", "1205", "1213", "3024"],
        code_prefixes: &[],
        messages: &[
            "lock wait timeout",
            "deadlock",
            "statement timeout",
            "lock timeout",
            "maximum statement execution time",
        ],
    },
    // Class 42 leftovers (undefined column, ambiguous reference, unknown
    // function) are compile-time rejections of the statement.
    ErrorRule {
        kind: ErrorKind::SyntaxError,
        codes: &["42601", "1064", "42703", "1054", "42702", "1052", "42883", "1305", "3065"],
        code_prefixes: &["42"],
        messages: &["syntax error", "error in your sql syntax"],
    },
];

static MISSING_TABLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(?i)(?:table|relation)\s+['"`]?([A-Za-z0-9_.$]+)['"`]?\s+(?:doesn't|does not) exist"#)
        .expect("missing table pattern is valid")
});

impl ErrorRule {
    fn matches_code(&self, code: &str) -> bool {
        self.codes.iter().any(|c| c.eq_ignore_ascii_case(code))
            || self.code_prefixes.iter().any(|p| code.starts_with(p))
    }

    fn matches_message(&self, message: &str) -> bool {
        self.messages.iter().any(|m| message.contains(m))
    }
}

fn kind_for_driver(code: Option<&str>, message: &str) -> ErrorKind {
    if let Some(code) = code {
        if let Some(rule) = RULES.iter().find(|r| r.matches_code(code)) {
            return rule.kind;
        }
    }

    if MISSING_TABLE.is_match(message) {
        return ErrorKind::TableNotFound;
    }
    let lowered = message.to_lowercase();
    RULES
        .iter()
        .find(|r| r.matches_message(&lowered))
        .map(|r| r.kind)
        .unwrap_or(ErrorKind::ExecutionError)
}

/// Name of the missing table in a driver message, schema prefix removed.
pub fn missing_table_name(message: &str) -> Option<String> {
    let captured = MISSING_TABLE.captures(message)?.get(1)?.as_str();
    captured.rsplit('.').next().map(str::to_string)
}

/// Classify a database collaborator error into exactly one failure.
pub fn classify_database_error(err: &DatabaseError) -> QueryFailure {
    let detail = err.to_string();
    match err {
        DatabaseError::ConnectionUnavailable { .. } | DatabaseError::PoolExhausted => {
            QueryFailure::new(ErrorKind::ConnectionError, detail)
        }
        DatabaseError::Driver { code, message } => {
            let kind = kind_for_driver(code.as_deref(), message);
            let failure = QueryFailure::new(kind, detail);
            match (kind, missing_table_name(message)) {
                (ErrorKind::TableNotFound, Some(table)) => failure
                    .with_user_message(format!("The table '{}' does not exist.", table)),
                _ => failure,
            }
        }
    }
}
