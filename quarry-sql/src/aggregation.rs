//! Aggregation Compliance Checker
//!
//! Finds non-aggregated SELECT expressions missing from GROUP BY before the
//! engine rejects them at runtime under strict grouping rules.

use crate::clause::{self, matching_paren, AGGREGATE_FUNCTIONS};
use crate::lexer::{tokenize, Token, TokenKind};
use crate::validator::split_alias;
use quarry_core::AggregationCheck;

/// Check the main query's SELECT list against its GROUP BY list.
///
/// Only runs when an aggregate call appears in the top-level SELECT list or
/// HAVING clause; aggregates inside subqueries belong to their own scope.
/// Window functions, scalar subqueries, literals and `*` are exempt. A GROUP BY
/// entry may match by expression, bare column name, select alias or
/// 1-based position.
pub fn check_aggregation(sql: &str) -> AggregationCheck {
    let tokens = tokenize(sql);
    let Some(select) = clause::main_select(&tokens) else {
        return AggregationCheck::default();
    };

    let items = clause::select_items(select);
    let aggregated_select = items
        .iter()
        .any(|item| !clause::is_windowed(item) && clause::contains_aggregate(item));
    let aggregated_having = clause::having_clause(select).is_some_and(clause::contains_aggregate);
    if !(aggregated_select || aggregated_having) {
        return AggregationCheck::default();
    }

    let group_by = clause::clause_items(select, "GROUP", "BY").unwrap_or_default();
    let grouped: Vec<GroupKey> = group_by.iter().map(|g| GroupKey::from_tokens(g)).collect();

    let mut missing: Vec<String> = Vec::new();
    for (index, item) in items.iter().enumerate() {
        if is_exempt(item) {
            continue;
        }
        let (expr, alias) = split_alias(item);
        let inner = unwrap_functions(expr);
        if inner.is_empty() || inner.iter().all(Token::is_literal) {
            continue;
        }

        let covered = grouped.iter().any(|g| g.covers(index, expr, inner, alias));
        if !covered {
            let rendered = clause::render(inner);
            if !missing.contains(&rendered) {
                missing.push(rendered);
            }
        }
    }

    if !missing.is_empty() {
        tracing::debug!(missing = ?missing, "select list not covered by GROUP BY");
    }

    AggregationCheck {
        has_issue: !missing.is_empty(),
        missing_columns: missing,
    }
}

fn is_exempt(item: &[Token]) -> bool {
    if clause::is_windowed(item) || clause::contains_aggregate(item) {
        return true;
    }
    if clause::is_subquery(split_alias(item).0) {
        return true;
    }
    // `*` or `t.*`
    matches!(item.last().map(|t| &t.kind), Some(TokenKind::Star))
        && item.iter().all(|t| matches!(t.kind, TokenKind::Star | TokenKind::Dot | TokenKind::Word(_) | TokenKind::QuotedIdent(_)))
}

/// Strip single-argument function wrappers: `UPPER(TRIM(u.name))` becomes
/// `u.name`. Multi-argument calls are left intact.
fn unwrap_functions(mut expr: &[Token]) -> &[Token] {
    loop {
        let is_call = expr.len() >= 3
            && matches!(expr[0].kind, TokenKind::Word(_))
            && !expr[0].is_any_word(AGGREGATE_FUNCTIONS)
            && expr[1].kind == TokenKind::LParen
            && matching_paren(expr, 1) == Some(expr.len() - 1);
        if !is_call {
            return expr;
        }
        let args = clause::split_top_level(&expr[2..expr.len() - 1]);
        if args.len() != 1 {
            return expr;
        }
        expr = args[0];
    }
}

fn bare_column(expr: &[Token]) -> Option<String> {
    match expr {
        [only] => only.ident().map(str::to_lowercase),
        [.., dot, last] if dot.kind == TokenKind::Dot => last.ident().map(str::to_lowercase),
        _ => None,
    }
}

/// One GROUP BY entry in comparable forms.
struct GroupKey {
    canonical: String,
    unwrapped: String,
    column: Option<String>,
    position: Option<usize>,
}

impl GroupKey {
    fn from_tokens(tokens: &[Token]) -> Self {
        let position = match tokens {
            [Token {
                kind: TokenKind::Number(n),
                ..
            }] => n.parse::<usize>().ok(),
            _ => None,
        };
        let unwrapped = unwrap_functions(tokens);
        Self {
            canonical: clause::canonical(tokens),
            unwrapped: clause::canonical(unwrapped),
            column: bare_column(unwrapped),
            position,
        }
    }

    fn covers(&self, index: usize, expr: &[Token], inner: &[Token], alias: Option<&str>) -> bool {
        if self.position == Some(index + 1) {
            return true;
        }
        if self.canonical == clause::canonical(expr) || self.unwrapped == clause::canonical(inner) {
            return true;
        }
        if let Some(alias) = alias {
            if self.canonical == alias.to_lowercase() {
                return true;
            }
        }
        match (&self.column, bare_column(inner)) {
            (Some(group_col), Some(select_col)) => *group_col == select_col,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grouped_column_passes() {
        let check = check_aggregation("SELECT a, COUNT(*) FROM t GROUP BY a");
        assert!(!check.has_issue);
        assert!(check.missing_columns.is_empty());
    }

    #[test]
    fn test_ungrouped_column_is_reported() {
        let check = check_aggregation("SELECT a, b, COUNT(*) FROM t GROUP BY a");
        assert!(check.has_issue);
        assert_eq!(check.missing_columns, vec!["b".to_string()]);
    }

    #[test]
    fn test_no_aggregate_no_check() {
        let check = check_aggregation("SELECT a, b FROM t");
        assert!(!check.has_issue);
    }

    #[test]
    fn test_aggregate_without_group_by() {
        let check = check_aggregation("SELECT department, COUNT(*) FROM students");
        assert_eq!(check.missing_columns, vec!["department".to_string()]);
    }

    #[test]
    fn test_alias_and_wrapper_stripping() {
        let check = check_aggregation(
            "SELECT UPPER(u.name) AS student, ROUND(AVG(m.score), 2) avg_score \
             FROM users u JOIN marks m ON m.user_id = u.id GROUP BY u.name",
        );
        assert!(!check.has_issue, "{:?}", check.missing_columns);
    }

    #[test]
    fn test_group_by_alias_and_position() {
        assert!(!check_aggregation("SELECT d.name AS dept, COUNT(*) FROM d GROUP BY dept").has_issue);
        assert!(!check_aggregation("SELECT a, b, SUM(c) FROM t GROUP BY 1, 2").has_issue);
        assert!(check_aggregation("SELECT a, b, SUM(c) FROM t GROUP BY 1").has_issue);
    }

    #[test]
    fn test_qualified_names_match_bare() {
        let check = check_aggregation("SELECT u.college_id, COUNT(*) FROM users u GROUP BY college_id");
        assert!(!check.has_issue);
    }

    #[test]
    fn test_window_functions_and_literals_exempt() {
        let check = check_aggregation(
            "SELECT name, RANK() OVER (ORDER BY score DESC), 'x' AS tag, COUNT(*) OVER () FROM t",
        );
        assert!(!check.has_issue);
    }

    #[test]
    fn test_having_aggregate_triggers_check() {
        let check = check_aggregation("SELECT a, b FROM t GROUP BY a HAVING COUNT(*) > 1");
        assert_eq!(check.missing_columns, vec!["b".to_string()]);
    }

    #[test]
    fn test_subquery_aggregate_does_not_leak() {
        let check = check_aggregation(
            "SELECT name, score FROM marks WHERE score > (SELECT AVG(score) FROM marks)",
        );
        assert!(!check.has_issue);
    }

    #[test]
    fn test_correlated_subquery_column_is_its_own_scope() {
        let check = check_aggregation(
            "SELECT u.name, (SELECT COUNT(*) FROM marks m WHERE m.user_id = u.id) AS n FROM users u",
        );
        assert!(!check.has_issue, "{:?}", check.missing_columns);
        assert!(check.missing_columns.is_empty());
    }

    #[test]
    fn test_scalar_subquery_exempt_in_grouped_query() {
        let check = check_aggregation(
            "SELECT u.college_id, COUNT(*), (SELECT COUNT(*) FROM colleges) total \
             FROM users u GROUP BY u.college_id",
        );
        assert!(!check.has_issue, "{:?}", check.missing_columns);

        let check = check_aggregation(
            "SELECT u.name, u.college_id, (SELECT MAX(score) FROM marks) AS best, COUNT(*) \
             FROM users u GROUP BY u.college_id",
        );
        assert_eq!(check.missing_columns, vec!["u.name".to_string()]);
    }

    #[test]
    fn test_multi_arg_expression_must_match_whole() {
        let ok = check_aggregation("SELECT CONCAT(a, b), COUNT(*) FROM t GROUP BY CONCAT(a, b)");
        assert!(!ok.has_issue);
        let bad = check_aggregation("SELECT CONCAT(a, b), COUNT(*) FROM t GROUP BY a");
        assert_eq!(bad.missing_columns, vec!["CONCAT(a, b)".to_string()]);
    }
}
