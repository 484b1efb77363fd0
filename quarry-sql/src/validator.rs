//! SQL Validator
//!
//! Judges a candidate statement: query type, read-only safety, referenced
//! tables, structural hazards and complexity tier. Pure and deterministic;
//! validating the same text twice yields the same report.

use crate::clause::{self, call_args, matching_paren};
use crate::lexer::{tokenize, Token, TokenKind};
use once_cell::sync::Lazy;
use quarry_core::{ComplexityTier, QueryType, ValidationReport};
use regex::Regex;

/// Whole-word keywords that make a statement unsafe, wherever they appear.
pub const DESTRUCTIVE_KEYWORDS: &[&str] = &[
    "DROP", "DELETE", "UPDATE", "INSERT", "ALTER", "TRUNCATE", "RENAME", "REPLACE", "EXEC",
    "EXECUTE", "CALL",
];

const READ_ONLY_LEADING: &[&str] = &["SELECT", "SHOW", "DESCRIBE", "DESC", "WITH"];

/// Functions whose argument list may contain a `FROM` that is not a table
/// reference, e.g. `EXTRACT(YEAR FROM created_at)`.
const FROM_TAKING_FUNCTIONS: &[&str] = &["EXTRACT", "TRIM", "SUBSTRING", "POSITION", "OVERLAY"];

/// Words that can follow a table reference and are never an alias.
const NON_ALIAS_WORDS: &[&str] = &[
    "WHERE", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "CROSS", "NATURAL", "ON", "USING",
    "GROUP", "ORDER", "LIMIT", "HAVING", "UNION", "INTERSECT", "EXCEPT", "WINDOW", "OFFSET",
    "FETCH", "FOR", "STRAIGHT_JOIN", "LATERAL", "USE", "FORCE", "IGNORE", "PARTITION",
    "TABLESAMPLE", "AS", "QUALIFY",
];

const TABLE_PREFIX_WORDS: &[&str] = &["LATERAL", "ONLY"];

static DESTRUCTIVE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"(?i)\b({})\b", DESTRUCTIVE_KEYWORDS.join("|")))
        .expect("destructive keyword pattern is valid")
});

/// Default threshold above which a LIMIT value produces a warning.
pub const DEFAULT_LARGE_LIMIT_WARNING: u64 = 10_000;

const HIGH_TABLE_COUNT_WARNING: &str = "High table join count - may impact performance";

/// Stateless validator carrying its warning thresholds.
#[derive(Debug, Clone)]
pub struct SqlValidator {
    large_limit_warning: u64,
}

impl Default for SqlValidator {
    fn default() -> Self {
        Self::new(DEFAULT_LARGE_LIMIT_WARNING)
    }
}

impl SqlValidator {
    pub fn new(large_limit_warning: u64) -> Self {
        Self {
            large_limit_warning,
        }
    }

    /// Validate a statement.
    ///
    /// Valid means: the query type is not `INVALID`, there are no
    /// structural errors, and the statement is read-only.
    pub fn validate(&self, sql: &str) -> ValidationReport {
        let sql = sql.trim();

        if sql.is_empty() {
            return ValidationReport {
                is_valid: false,
                query_type: QueryType::Invalid,
                is_read_only: false,
                referenced_tables: Vec::new(),
                structural_errors: vec!["Empty query".to_string()],
                warnings: Vec::new(),
                complexity_tier: ComplexityTier::Low,
            };
        }

        let tokens = tokenize(sql);
        let query_type = query_type_of(&tokens);
        let is_read_only = is_read_only_tokens(sql, &tokens);
        let referenced_tables = extract_tables_from_tokens(&tokens);
        let structural_errors = structural_errors(sql, &tokens);
        let complexity_tier = ComplexityTier::from_table_count(referenced_tables.len());

        let mut warnings = Vec::new();
        if complexity_tier == ComplexityTier::High {
            warnings.push(HIGH_TABLE_COUNT_WARNING.to_string());
        }
        if let Some(limit) = top_level_limit(&tokens) {
            if limit > self.large_limit_warning {
                warnings.push(format!(
                    "Large LIMIT value ({}) - consider pagination",
                    limit
                ));
            }
        }
        if let Some(warning) = distinct_order_by_hazard(&tokens) {
            warnings.push(warning);
        }

        let is_valid = query_type != QueryType::Invalid && structural_errors.is_empty() && is_read_only;

        tracing::debug!(
            query_type = query_type.as_str(),
            is_valid,
            is_read_only,
            tables = referenced_tables.len(),
            errors = structural_errors.len(),
            "validated statement"
        );

        ValidationReport {
            is_valid,
            query_type,
            is_read_only,
            referenced_tables,
            structural_errors,
            warnings,
            complexity_tier,
        }
    }
}

/// Query type by leading keyword. `WITH` is a read query.
pub fn query_type(sql: &str) -> QueryType {
    query_type_of(&tokenize(sql))
}

fn query_type_of(tokens: &[Token]) -> QueryType {
    match tokens.first() {
        Some(t) if t.is_any_word(&["SELECT", "WITH"]) => QueryType::Select,
        Some(t) if t.is_word("SHOW") => QueryType::Show,
        Some(t) if t.is_any_word(&["DESCRIBE", "DESC"]) => QueryType::Describe,
        _ => QueryType::Invalid,
    }
}

/// Read-only when the statement starts with an allow-listed keyword and no
/// destructive keyword appears as a whole word anywhere in the raw text,
/// string literals included.
pub fn is_read_only(sql: &str) -> bool {
    is_read_only_tokens(sql, &tokenize(sql))
}

fn is_read_only_tokens(sql: &str, tokens: &[Token]) -> bool {
    let leading_ok = tokens
        .first()
        .is_some_and(|t| t.is_any_word(READ_ONLY_LEADING));
    leading_ok && !DESTRUCTIVE.is_match(sql)
}

/// Tables referenced after `FROM`/`JOIN`, deduplicated case-insensitively in
/// order of first appearance. Subqueries, CTE names and `FROM` inside
/// `EXTRACT(... FROM ...)`-style calls are skipped.
pub fn extract_tables(sql: &str) -> Vec<String> {
    extract_tables_from_tokens(&tokenize(sql))
}

fn extract_tables_from_tokens(tokens: &[Token]) -> Vec<String> {
    let ctes = clause::cte_names(tokens);
    let mut tables: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        let lower = name.to_lowercase();
        if lower == "dual" || ctes.contains(&lower) {
            return;
        }
        if !tables.iter().any(|t| t.eq_ignore_ascii_case(name)) {
            tables.push(name.to_string());
        }
    };

    // true when the enclosing paren is a FROM-taking function call
    let mut paren_stack: Vec<bool> = Vec::new();

    for i in 0..tokens.len() {
        let tok = &tokens[i];
        match tok.kind {
            TokenKind::LParen => {
                let in_function = i > 0 && tokens[i - 1].is_any_word(FROM_TAKING_FUNCTIONS);
                paren_stack.push(in_function);
                continue;
            }
            TokenKind::RParen => {
                paren_stack.pop();
                continue;
            }
            _ => {}
        }

        let is_from = tok.is_word("FROM");
        if !(is_from || tok.is_word("JOIN")) {
            continue;
        }
        if is_from && paren_stack.last().copied().unwrap_or(false) {
            continue;
        }
        // IS [NOT] DISTINCT FROM
        if is_from && i > 0 && tokens[i - 1].is_word("DISTINCT") {
            continue;
        }

        let mut j = i + 1;
        loop {
            let Some((name, next)) = table_ref(tokens, j) else {
                break;
            };
            push(&name);
            j = skip_alias(tokens, next);
            if is_from && tokens.get(j).is_some_and(|t| t.kind == TokenKind::Comma) {
                j += 1;
            } else {
                break;
            }
        }
    }

    tables
}

/// Parse `[LATERAL|ONLY] name[.name[.name]]` at `at`. Returns the last name
/// part and the index after it. `None` for subqueries and non-identifiers.
fn table_ref(tokens: &[Token], mut at: usize) -> Option<(String, usize)> {
    while tokens.get(at).is_some_and(|t| t.is_any_word(TABLE_PREFIX_WORDS)) {
        at += 1;
    }
    let first = tokens.get(at)?;
    let mut name = first.ident()?.to_string();
    if matches!(first.kind, TokenKind::Word(_)) && first.is_any_word(NON_ALIAS_WORDS) {
        return None;
    }
    at += 1;
    while tokens.get(at).is_some_and(|t| t.kind == TokenKind::Dot) {
        match tokens.get(at + 1).and_then(Token::ident) {
            Some(part) => {
                name = part.to_string();
                at += 2;
            }
            None => break,
        }
    }
    Some((name, at))
}

fn skip_alias(tokens: &[Token], at: usize) -> usize {
    match tokens.get(at) {
        Some(t) if t.is_word("AS") => {
            if tokens.get(at + 1).and_then(Token::ident).is_some() {
                at + 2
            } else {
                at + 1
            }
        }
        Some(t) if matches!(t.kind, TokenKind::QuotedIdent(_)) => at + 1,
        Some(t) if matches!(t.kind, TokenKind::Word(_)) && !t.is_any_word(NON_ALIAS_WORDS) => {
            at + 1
        }
        _ => at,
    }
}

/// Hard structural problems that make a statement invalid.
pub fn detect_structural_errors(sql: &str) -> Vec<String> {
    structural_errors(sql, &tokenize(sql))
}

fn structural_errors(sql: &str, tokens: &[Token]) -> Vec<String> {
    let mut errors = Vec::new();

    let open = sql.matches('(').count();
    let close = sql.matches(')').count();
    if open != close {
        errors.push(format!(
            "Mismatched parentheses: {} opening, {} closing",
            open, close
        ));
    }

    for i in 0..tokens.len() {
        let is_call = tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::LParen);
        if !is_call {
            continue;
        }
        let tok = &tokens[i];
        if tok.is_word("CAST") && !cast_is_well_formed(tokens, i + 1) {
            errors.push("Malformed CAST(): expected CAST(expr AS type)".to_string());
        } else if tok.is_word("JSON_EXTRACT") && !json_extract_is_well_formed(tokens, i + 1) {
            errors.push(
                "Malformed JSON_EXTRACT(): expected a document and a '$'-rooted path literal"
                    .to_string(),
            );
        } else if tok.is_word("JSON_UNQUOTE") && !json_unquote_is_well_formed(tokens, i + 1) {
            errors.push("Malformed JSON_UNQUOTE(): expected exactly one argument".to_string());
        }
    }

    errors
}

/// `CAST(<expr> AS <type>)` with `AS` at the call's own depth.
fn cast_is_well_formed(tokens: &[Token], open: usize) -> bool {
    let Some(close) = matching_paren(tokens, open) else {
        return false;
    };
    let inner = &tokens[open + 1..close];
    let depth = clause::depths(inner);
    inner.iter().enumerate().any(|(k, t)| {
        depth[k] == 0
            && k > 0
            && t.is_word("AS")
            && inner.get(k + 1).is_some_and(|ty| matches!(ty.kind, TokenKind::Word(_)))
    })
}

fn json_extract_is_well_formed(tokens: &[Token], open: usize) -> bool {
    let Some(args) = call_args(tokens, open) else {
        return false;
    };
    if args.len() < 2 {
        return false;
    }
    args[1..].iter().all(|arg| {
        matches!(arg, [Token { kind: TokenKind::StringLit(path), .. }] if path.starts_with('$'))
    })
}

fn json_unquote_is_well_formed(tokens: &[Token], open: usize) -> bool {
    call_args(tokens, open).is_some_and(|args| args.len() == 1)
}

/// Top-level `LIMIT n` (or `LIMIT offset, n`) of the main query.
fn top_level_limit(tokens: &[Token]) -> Option<u64> {
    let depth = clause::depths(tokens);
    let at = (0..tokens.len()).rev().find(|&i| depth[i] == 0 && tokens[i].is_word("LIMIT"))?;
    let number = |t: Option<&Token>| match t.map(|t| &t.kind) {
        Some(TokenKind::Number(n)) => n.parse::<u64>().ok(),
        _ => None,
    };
    let first = number(tokens.get(at + 1))?;
    if tokens.get(at + 2).is_some_and(|t| t.kind == TokenKind::Comma) {
        return number(tokens.get(at + 3));
    }
    Some(first)
}

/// SELECT DISTINCT ordered by an expression that is not in the select list.
/// Strict engines reject this; it stays a warning since others accept it.
fn distinct_order_by_hazard(tokens: &[Token]) -> Option<String> {
    let select = clause::main_select(tokens)?;
    if !clause::is_distinct(select) {
        return None;
    }
    let order_items = clause::clause_items(select, "ORDER", "BY")?;
    let select_items = clause::select_items(select);

    let mut projected: Vec<String> = Vec::new();
    for item in &select_items {
        let (expr, alias) = split_alias(item);
        projected.push(clause::canonical(expr));
        if let Some(last) = expr.last().and_then(Token::ident) {
            projected.push(last.to_lowercase());
        }
        if let Some(alias) = alias {
            projected.push(alias.to_lowercase());
        }
    }

    for item in order_items {
        let expr = strip_sort_direction(item);
        if let [Token { kind: TokenKind::Number(n), .. }] = expr {
            if n.parse::<usize>().is_ok_and(|pos| pos >= 1 && pos <= select_items.len()) {
                continue;
            }
        }
        if projected.contains(&clause::canonical(expr)) {
            continue;
        }
        return Some(format!(
            "SELECT DISTINCT is ordered by `{}`, which is not in the select list - move the \
             expression into SELECT as a named alias, then ORDER BY that alias",
            clause::render(expr)
        ));
    }
    None
}

/// Split `expr [AS] alias` into the expression and alias.
pub(crate) fn split_alias(item: &[Token]) -> (&[Token], Option<&str>) {
    let depth = clause::depths(item);
    if let Some(k) = (0..item.len()).rev().find(|&k| depth[k] == 0 && item[k].is_word("AS")) {
        if k > 0 {
            return (&item[..k], item.get(k + 1).and_then(Token::ident));
        }
    }
    if item.len() >= 2 {
        let last = &item[item.len() - 1];
        let prev = &item[item.len() - 2];
        let prev_ends_expr = matches!(
            prev.kind,
            TokenKind::Word(_)
                | TokenKind::QuotedIdent(_)
                | TokenKind::RParen
                | TokenKind::Number(_)
                | TokenKind::StringLit(_)
        ) && !prev.is_any_word(&["CASE", "WHEN", "THEN", "ELSE", "AND", "OR", "NOT", "IS", "DISTINCT"]);
        let last_is_alias = last.ident().is_some() && !last.is_any_word(&["END", "NULL", "TRUE", "FALSE"]);
        if prev_ends_expr && last_is_alias {
            return (&item[..item.len() - 1], last.ident());
        }
    }
    (item, None)
}

fn strip_sort_direction(item: &[Token]) -> &[Token] {
    let mut end = item.len();
    while end > 1 && item[end - 1].is_any_word(&["ASC", "DESC", "FIRST", "LAST", "NULLS"]) {
        end -= 1;
    }
    &item[..end]
}
