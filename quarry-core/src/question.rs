//! Questions and their classified intent.

use crate::identity::{new_question_id, CallerIdentity, QuestionId, Timestamp};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Model selector used when the caller does not name one.
pub const DEFAULT_MODEL: &str = "deepseek-chat";

/// A natural-language question. Immutable once constructed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Question {
    id: QuestionId,
    text: String,
    identity: CallerIdentity,
    model: String,
    asked_at: Timestamp,
}

impl Question {
    pub fn new(text: impl Into<String>, identity: CallerIdentity) -> Self {
        Self {
            id: new_question_id(),
            text: text.into(),
            identity,
            model: DEFAULT_MODEL.to_string(),
            asked_at: Utc::now(),
        }
    }

    /// Select the oracle model for this question.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn id(&self) -> QuestionId {
        self.id
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn identity(&self) -> &CallerIdentity {
        &self.identity
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn asked_at(&self) -> Timestamp {
        self.asked_at
    }
}

/// Intent bucket produced by the rule-based classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentTag {
    /// Answerable without the database
    GeneralKnowledge,
    /// Leaderboard / best-student queries
    TopPerformer,
    /// Assessment or test counts
    Assessment,
    /// COUNT(*) style queries
    SimpleCount,
    /// Side-by-side comparison across scopes
    Comparison,
    /// Over-time queries
    Trend,
    /// Everything else, full pipeline
    Complex,
}

impl IntentTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GeneralKnowledge => "general_knowledge",
            Self::TopPerformer => "top_performer",
            Self::Assessment => "assessment",
            Self::SimpleCount => "simple_count",
            Self::Comparison => "comparison",
            Self::Trend => "trend",
            Self::Complex => "complex",
        }
    }
}

impl std::fmt::Display for IntentTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying a question. Read-only after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedIntent {
    pub intent: IntentTag,
    /// Confidence of the rule engine (0.0 - 1.0)
    pub confidence: f32,
    /// Table the oracle should prefer
    pub table_hint: Option<String>,
    /// Short hint injected ahead of the question in the oracle prompt
    pub prompt_hint: Option<String>,
    pub metadata: BTreeMap<String, String>,
}

impl ClassifiedIntent {
    pub fn new(intent: IntentTag, confidence: f32) -> Self {
        Self {
            intent,
            confidence,
            table_hint: None,
            prompt_hint: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_table_hint(mut self, table: impl Into<String>) -> Self {
        self.table_hint = Some(table.into());
        self
    }

    pub fn with_prompt_hint(mut self, hint: impl Into<String>) -> Self {
        self.prompt_hint = Some(hint.into());
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::identity::Role;

    #[test]
    fn test_question_defaults() {
        let q = Question::new("how many students?", CallerIdentity::new(Role::Admin, "1"));
        assert_eq!(q.model(), DEFAULT_MODEL);
        assert_eq!(q.text(), "how many students?");
        assert_eq!(q.identity().role, Role::Admin);
    }

    #[test]
    fn test_question_ids_are_unique() {
        let id = CallerIdentity::new(Role::Admin, "1");
        let a = Question::new("q", id.clone());
        let b = Question::new("q", id);
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_intent_tag_serializes_snake_case() {
        let json = serde_json::to_string(&IntentTag::TopPerformer).unwrap();
        assert_eq!(json, "\"top_performer\"");
        assert_eq!(IntentTag::SimpleCount.to_string(), "simple_count");
    }
}
