//! Quarry SQL - Pure analysis stages
//!
//! Intent classification, oracle-output scrubbing, validation, aggregation
//! checks and complexity scoring. No I/O happens here.

pub mod aggregation;
pub mod classifier;
pub mod clause;
pub mod complexity;
pub mod lexer;
pub mod scrubber;
pub mod validator;

pub use aggregation::check_aggregation;
pub use classifier::{prompt_hint, IntentClassifier};
pub use complexity::complexity_score;
pub use scrubber::{scrub, scrub_detailed, ScrubRejection, ALLOWED_LEADING_KEYWORDS};
pub use validator::{
    detect_structural_errors, extract_tables, is_read_only, query_type, SqlValidator,
    DESTRUCTIVE_KEYWORDS,
};
