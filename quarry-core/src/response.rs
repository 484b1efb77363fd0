//! What a caller receives after a question has been processed.

use crate::identity::QuestionId;
use crate::outcome::{ErrorKind, QueryFailure};
use crate::question::ClassifiedIntent;
use serde::{Deserialize, Serialize};

/// Coarse label summarizing trust in a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataQuality {
    /// First-attempt success with rows
    Complete,
    /// Success after one or more corrections
    Partial,
    /// Success with zero rows
    Empty,
    /// Attempt budget exhausted
    Failed,
}

impl DataQuality {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Complete => "complete",
            Self::Partial => "partial",
            Self::Empty => "empty",
            Self::Failed => "failed",
        }
    }
}

/// Which path the question took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    /// Full generate / validate / execute pipeline
    Database,
    /// No database needed; the hosting layer answers conversationally
    Conversational,
}

/// The user-safe part of a failure. Never carries technical detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserFacingError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&QueryFailure> for UserFacingError {
    fn from(failure: &QueryFailure) -> Self {
        Self {
            kind: failure.kind,
            message: failure.user_message.clone(),
        }
    }
}

/// Result of `process(question)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessResponse {
    pub question_id: QuestionId,
    pub route: Route,
    /// Rows as a JSON array on success, `null` otherwise
    pub answer_payload: serde_json::Value,
    pub row_count: usize,
    pub confidence: f32,
    pub data_quality: DataQuality,
    pub attempt_count: u8,
    pub intent: ClassifiedIntent,
    /// The statement that produced the rows
    pub sql: Option<String>,
    pub cached: bool,
    /// Last user-safe failure when the budget was exhausted
    pub error: Option<UserFacingError>,
}

impl ProcessResponse {
    pub fn is_success(&self) -> bool {
        self.route == Route::Database && self.data_quality != DataQuality::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_facing_error_drops_detail() {
        let failure = QueryFailure::new(ErrorKind::AccessDenied, "SELECT command denied to user 'x'@'10.0.0.1'");
        let user: UserFacingError = (&failure).into();
        assert_eq!(user.kind, ErrorKind::AccessDenied);
        assert!(!user.message.contains("10.0.0.1"));
    }

    #[test]
    fn test_data_quality_labels() {
        assert_eq!(DataQuality::Complete.as_str(), "complete");
        assert_eq!(
            serde_json::to_string(&DataQuality::Failed).unwrap(),
            "\"failed\""
        );
    }
}
