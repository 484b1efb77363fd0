//! Quarry Core - Data Types
//!
//! Questions, statements, reports and outcomes shared by every stage of the
//! query-safety pipeline. This crate performs no I/O.

pub mod config;
pub mod error;
pub mod identity;
pub mod outcome;
pub mod question;
pub mod report;
pub mod response;

pub use config::{QuarryConfig, MAX_ATTEMPT_BUDGET};
pub use error::{
    ConfigError, DatabaseError, DirectoryError, OracleError, QuarryError, QuarryResult,
};
pub use identity::{
    compute_content_hash, new_question_id, CallerIdentity, ContentHash, QuestionId, Role,
    RoleParseError, Timestamp,
};
pub use outcome::{
    ComplexityScore, ErrorKind, ExecutionOutcome, QueryFailure, QuerySuccess, Row,
};
pub use question::{ClassifiedIntent, IntentTag, Question, DEFAULT_MODEL};
pub use report::{
    AggregationCheck, CleanStatement, ComplexityTier, QueryType, TableCheck, ValidationReport,
};
pub use response::{DataQuality, ProcessResponse, Route, UserFacingError};
