//! Depth-aware helpers over token slices.
//!
//! None of this is a SQL parser. The helpers find the main query's clauses
//! by tracking parenthesis depth and splitting lists on top-level commas,
//! which is enough for the checks the validator and aggregation checker run.

use crate::lexer::{Token, TokenKind};

/// Keywords that end a SELECT list or a FROM/GROUP BY clause.
const CLAUSE_KEYWORDS: &[&str] = &[
    "FROM", "WHERE", "GROUP", "HAVING", "ORDER", "LIMIT", "OFFSET", "FETCH", "UNION",
    "INTERSECT", "EXCEPT", "WINDOW", "FOR", "INTO", "QUALIFY",
];

/// Set operators that end the main query's first branch.
const SET_OPERATORS: &[&str] = &["UNION", "INTERSECT", "EXCEPT"];

/// Aggregate function names, upper case.
pub const AGGREGATE_FUNCTIONS: &[&str] = &[
    "COUNT",
    "SUM",
    "AVG",
    "MIN",
    "MAX",
    "GROUP_CONCAT",
    "STRING_AGG",
    "ARRAY_AGG",
    "JSON_AGG",
    "JSONB_AGG",
    "JSON_ARRAYAGG",
    "JSON_OBJECTAGG",
    "BIT_AND",
    "BIT_OR",
    "BIT_XOR",
    "BOOL_AND",
    "BOOL_OR",
    "STDDEV",
    "STDDEV_POP",
    "STDDEV_SAMP",
    "VARIANCE",
    "VAR_POP",
    "VAR_SAMP",
];

/// Index of the `)` matching the `(` at `open`.
pub fn matching_paren(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(open) {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Parenthesis depth before each token.
pub fn depths(tokens: &[Token]) -> Vec<usize> {
    let mut depth = 0usize;
    tokens
        .iter()
        .map(|tok| match tok.kind {
            TokenKind::LParen => {
                let d = depth;
                depth += 1;
                d
            }
            TokenKind::RParen => {
                depth = depth.saturating_sub(1);
                depth
            }
            _ => depth,
        })
        .collect()
}

/// Split on commas at depth zero of the slice. Empty items are dropped.
pub fn split_top_level(tokens: &[Token]) -> Vec<&[Token]> {
    let mut items = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (i, tok) in tokens.iter().enumerate() {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Comma if depth == 0 => {
                if i > start {
                    items.push(&tokens[start..i]);
                }
                start = i + 1;
            }
            _ => {}
        }
    }
    if start < tokens.len() {
        items.push(&tokens[start..]);
    }
    items
}

/// Arguments of the call whose `(` is at `open`.
pub fn call_args(tokens: &[Token], open: usize) -> Option<Vec<&[Token]>> {
    let close = matching_paren(tokens, open)?;
    Some(split_top_level(&tokens[open + 1..close]))
}

/// Names introduced by a leading `WITH` clause, lower-cased.
pub fn cte_names(tokens: &[Token]) -> Vec<String> {
    let mut names = Vec::new();
    if !tokens.first().is_some_and(|t| t.is_word("WITH")) {
        return names;
    }

    let mut i = 1;
    if tokens.get(i).is_some_and(|t| t.is_word("RECURSIVE")) {
        i += 1;
    }

    while let Some(name) = tokens.get(i).and_then(Token::ident) {
        let name = name.to_lowercase();
        i += 1;
        // Optional column list
        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            match matching_paren(tokens, i) {
                Some(close) => i = close + 1,
                None => break,
            }
        }
        if !tokens.get(i).is_some_and(|t| t.is_word("AS")) {
            break;
        }
        i += 1;
        while tokens.get(i).is_some_and(|t| t.is_any_word(&["MATERIALIZED", "NOT"])) {
            i += 1;
        }
        if !tokens.get(i).is_some_and(|t| t.kind == TokenKind::LParen) {
            break;
        }
        names.push(name);
        match matching_paren(tokens, i) {
            Some(close) => i = close + 1,
            None => break,
        }
        if tokens.get(i).is_some_and(|t| t.kind == TokenKind::Comma) {
            i += 1;
        } else {
            break;
        }
    }

    names
}

/// The main query's first SELECT branch: from its `SELECT` up to a
/// top-level set operator or the end of input.
pub fn main_select(tokens: &[Token]) -> Option<&[Token]> {
    let depth = depths(tokens);
    let start = tokens
        .iter()
        .enumerate()
        .position(|(i, t)| depth[i] == 0 && t.is_word("SELECT"))?;
    let end = tokens
        .iter()
        .enumerate()
        .skip(start + 1)
        .find(|(i, t)| depth[*i] == 0 && (t.is_any_word(SET_OPERATORS) || t.kind == TokenKind::Semicolon))
        .map(|(i, _)| i)
        .unwrap_or(tokens.len());
    Some(&tokens[start..end])
}

/// Whether the main SELECT is `SELECT DISTINCT`.
pub fn is_distinct(select: &[Token]) -> bool {
    select.get(1).is_some_and(|t| t.is_word("DISTINCT"))
}

/// Items of the SELECT list of a slice produced by [`main_select`].
pub fn select_items(select: &[Token]) -> Vec<&[Token]> {
    let mut start = 1;
    while select
        .get(start)
        .is_some_and(|t| t.is_any_word(&["DISTINCT", "ALL", "DISTINCTROW", "SQL_NO_CACHE", "SQL_CALC_FOUND_ROWS", "STRAIGHT_JOIN", "HIGH_PRIORITY"]))
    {
        start += 1;
    }
    let end = clause_end(select, start);
    split_top_level(&select[start..end])
}

/// Items following the top-level keyword pair `first second`
/// (e.g. `GROUP BY`, `ORDER BY`). `None` when the clause is absent.
pub fn clause_items<'a>(select: &'a [Token], first: &str, second: &str) -> Option<Vec<&'a [Token]>> {
    let depth = depths(select);
    let at = (0..select.len().saturating_sub(1)).find(|&i| {
        depth[i] == 0 && select[i].is_word(first) && select[i + 1].is_word(second)
    })?;
    let start = at + 2;
    let end = clause_end(select, start);
    Some(split_top_level(&select[start..end]))
}

/// Tokens of the top-level HAVING clause.
pub fn having_clause(select: &[Token]) -> Option<&[Token]> {
    let depth = depths(select);
    let at = (0..select.len()).find(|&i| depth[i] == 0 && select[i].is_word("HAVING"))?;
    let end = clause_end(select, at + 1);
    Some(&select[at + 1..end])
}

/// First top-level clause keyword at or after `start`.
fn clause_end(tokens: &[Token], start: usize) -> usize {
    let mut depth = 0usize;
    for (i, tok) in tokens.iter().enumerate().skip(start) {
        match tok.kind {
            TokenKind::LParen => depth += 1,
            TokenKind::RParen => depth = depth.saturating_sub(1),
            TokenKind::Semicolon if depth == 0 => return i,
            _ if depth == 0 && tok.is_any_word(CLAUSE_KEYWORDS) => return i,
            _ => {}
        }
    }
    tokens.len()
}

/// Whether `tokens[open]` starts a parenthesized subquery.
fn opens_subquery(tokens: &[Token], open: usize) -> bool {
    tokens[open].kind == TokenKind::LParen
        && tokens
            .get(open + 1)
            .is_some_and(|t| t.is_any_word(&["SELECT", "WITH"]))
}

/// Whether the whole slice is one parenthesized subquery.
pub fn is_subquery(tokens: &[Token]) -> bool {
    !tokens.is_empty() && opens_subquery(tokens, 0) && matching_paren(tokens, 0) == Some(tokens.len() - 1)
}

/// Whether the slice contains an aggregate call (`NAME(`) in its own scope.
/// Parenthesized subqueries are skipped.
pub fn contains_aggregate(tokens: &[Token]) -> bool {
    let mut i = 0;
    while i < tokens.len() {
        if opens_subquery(tokens, i) {
            match matching_paren(tokens, i) {
                Some(close) => {
                    i = close + 1;
                    continue;
                }
                None => return false,
            }
        }
        if tokens[i].is_any_word(AGGREGATE_FUNCTIONS)
            && tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::LParen)
        {
            return true;
        }
        i += 1;
    }
    false
}

/// Whether the slice is a window function expression.
pub fn is_windowed(tokens: &[Token]) -> bool {
    tokens.iter().any(|t| t.is_word("OVER"))
}

/// Canonical text of a token slice: words upper-cased, identifiers
/// compared case-insensitively, no whitespace.
pub fn canonical(tokens: &[Token]) -> String {
    let mut out = String::new();
    for tok in tokens {
        match &tok.kind {
            TokenKind::Word(w) | TokenKind::QuotedIdent(w) => out.push_str(&w.to_lowercase()),
            other => out.push_str(&other.to_string()),
        }
    }
    out
}

/// Readable rendering of a token slice, preserving identifier case.
pub fn render(tokens: &[Token]) -> String {
    let mut out = String::new();
    let mut prev: Option<&TokenKind> = None;
    for tok in tokens {
        let glue = matches!(
            (prev, &tok.kind),
            (None, _)
                | (Some(TokenKind::Dot), _)
                | (Some(TokenKind::LParen), _)
                | (_, TokenKind::Dot)
                | (_, TokenKind::RParen)
                | (_, TokenKind::Comma)
                | (Some(TokenKind::Word(_)), TokenKind::LParen)
        );
        if !glue {
            out.push(' ');
        }
        match &tok.kind {
            TokenKind::Word(w) | TokenKind::QuotedIdent(w) => out.push_str(w),
            other => out.push_str(&other.to_string()),
        }
        prev = Some(&tok.kind);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::tokenize;

    #[test]
    fn test_split_top_level_respects_depth() {
        let toks = tokenize("a, COALESCE(b, c), d");
        let items = split_top_level(&toks);
        assert_eq!(items.len(), 3);
        assert_eq!(render(items[1]), "COALESCE(b, c)");
    }

    #[test]
    fn test_select_items_and_group_by() {
        let toks = tokenize("SELECT DISTINCT a, b AS x FROM t WHERE y = 1 GROUP BY a, b ORDER BY x");
        let select = main_select(&toks).unwrap();
        assert!(is_distinct(select));
        assert_eq!(select_items(select).len(), 2);
        let group = clause_items(select, "GROUP", "BY").unwrap();
        assert_eq!(group.iter().map(|g| render(g)).collect::<Vec<_>>(), vec!["a", "b"]);
        let order = clause_items(select, "ORDER", "BY").unwrap();
        assert_eq!(render(order[0]), "x");
    }

    #[test]
    fn test_main_select_skips_cte() {
        let toks = tokenize("WITH c AS (SELECT id FROM t) SELECT id FROM c UNION SELECT 1");
        let select = main_select(&toks).unwrap();
        assert_eq!(render(select), "SELECT id FROM c");
    }

    #[test]
    fn test_cte_names() {
        let toks = tokenize("WITH RECURSIVE a(x) AS (SELECT 1), `B` AS (SELECT 2) SELECT * FROM a, B");
        assert_eq!(cte_names(&toks), vec!["a".to_string(), "b".to_string()]);
    }

    #[test]
    fn test_group_by_inside_subquery_is_not_top_level() {
        let toks = tokenize("SELECT a FROM (SELECT a FROM t GROUP BY a) s");
        let select = main_select(&toks).unwrap();
        assert!(clause_items(select, "GROUP", "BY").is_none());
    }

    #[test]
    fn test_canonical_ignores_case_and_space() {
        let a = tokenize("u.Name");
        let b = tokenize("U . name");
        assert_eq!(canonical(&a), canonical(&b));
    }

    #[test]
    fn test_contains_aggregate() {
        assert!(contains_aggregate(&tokenize("ROUND(AVG(score), 2)")));
        assert!(!contains_aggregate(&tokenize("count + 1")));
    }

    #[test]
    fn test_contains_aggregate_skips_subqueries() {
        let item = tokenize("(SELECT COUNT(*) FROM marks m WHERE m.user_id = u.id) AS n");
        assert!(!contains_aggregate(&item));
        assert!(contains_aggregate(&tokenize("SUM(x) + (SELECT 1)")));
        assert!(is_subquery(&tokenize("(SELECT MAX(score) FROM marks)")));
        assert!(!is_subquery(&tokenize("(a + b)")));
        assert!(!is_subquery(&tokenize("(SELECT 1) + (SELECT 2)")));
    }
}
