//! Observability-only complexity scoring.

use crate::clause::AGGREGATE_FUNCTIONS;
use crate::lexer::{tokenize, TokenKind};
use quarry_core::ComplexityScore;

const SUBQUERY_WEIGHT: u32 = 3;
const JOIN_WEIGHT: u32 = 2;
const JSON_WEIGHT: u32 = 2;
const AGGREGATE_WEIGHT: u32 = 1;

/// Count subqueries, joins, JSON function calls and aggregate calls.
pub fn complexity_score(sql: &str) -> ComplexityScore {
    let tokens = tokenize(sql);
    let mut score = ComplexityScore::default();

    for (i, tok) in tokens.iter().enumerate() {
        let next_is_paren = tokens.get(i + 1).is_some_and(|t| t.kind == TokenKind::LParen);
        let prev_is_paren = i > 0 && tokens[i - 1].kind == TokenKind::LParen;

        if tok.is_word("SELECT") && prev_is_paren {
            score.subqueries += 1;
        } else if tok.is_word("JOIN") {
            score.joins += 1;
        } else if next_is_paren && tok.is_any_word(AGGREGATE_FUNCTIONS) {
            score.aggregates += 1;
        } else if next_is_paren
            && matches!(&tok.kind, TokenKind::Word(w) if w.to_ascii_uppercase().starts_with("JSON"))
        {
            score.json_functions += 1;
        } else if matches!(&tok.kind, TokenKind::Operator(op) if op == "->" || op == "->>") {
            score.json_functions += 1;
        }
    }

    score.score = score.subqueries * SUBQUERY_WEIGHT
        + score.joins * JOIN_WEIGHT
        + score.json_functions * JSON_WEIGHT
        + score.aggregates * AGGREGATE_WEIGHT;
    score
}
