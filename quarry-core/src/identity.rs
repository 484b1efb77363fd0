//! Identity types for questions and their callers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Question identifier using UUIDv7 for timestamp-sortable IDs.
pub type QuestionId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// SHA-256 digest used for cache keys and identity fingerprints.
pub type ContentHash = [u8; 32];

/// Generate a new UUIDv7 QuestionId (timestamp-sortable).
pub fn new_question_id() -> QuestionId {
    Uuid::now_v7()
}

/// Compute SHA-256 hash of content.
pub fn compute_content_hash(content: &[u8]) -> ContentHash {
    let mut hasher = Sha256::new();
    hasher.update(content);
    let result = hasher.finalize();
    let mut hash = [0u8; 32];
    hash.copy_from_slice(&result);
    hash
}

/// Role of the caller asking a question.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    CollegeAdmin,
    Staff,
    Trainer,
    ContentCreator,
    Student,
}

impl Role {
    /// Convert to database string representation.
    pub fn as_db_str(&self) -> &'static str {
        match self {
            Self::SuperAdmin => "super_admin",
            Self::Admin => "admin",
            Self::CollegeAdmin => "college_admin",
            Self::Staff => "staff",
            Self::Trainer => "trainer",
            Self::ContentCreator => "content_creator",
            Self::Student => "student",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self, RoleParseError> {
        match s {
            "super_admin" => Ok(Self::SuperAdmin),
            "admin" => Ok(Self::Admin),
            "college_admin" => Ok(Self::CollegeAdmin),
            "staff" => Ok(Self::Staff),
            "trainer" => Ok(Self::Trainer),
            "content_creator" => Ok(Self::ContentCreator),
            "student" => Ok(Self::Student),
            _ => Err(RoleParseError(s.to_string())),
        }
    }

    /// Any of the administrative roles.
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::SuperAdmin | Self::Admin | Self::CollegeAdmin)
    }
}

/// Error parsing Role from string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleParseError(pub String);

impl std::fmt::Display for RoleParseError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "invalid role: {}", self.0)
    }
}

impl std::error::Error for RoleParseError {}

/// Who is asking: role plus the scope identifiers (college, department,
/// batch, ...) that bound what the caller may see.
///
/// Two identities with the same role and user but different scopes are
/// different tenants as far as the result cache is concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CallerIdentity {
    pub role: Role,
    pub user_id: String,
    pub scope_ids: Vec<String>,
}

impl CallerIdentity {
    pub fn new(role: Role, user_id: impl Into<String>) -> Self {
        Self {
            role,
            user_id: user_id.into(),
            scope_ids: Vec::new(),
        }
    }

    /// Add a scope identifier.
    pub fn with_scope(mut self, scope_id: impl Into<String>) -> Self {
        self.scope_ids.push(scope_id.into());
        self
    }

    /// Stable digest of the identity.
    ///
    /// Scope order does not matter; fields are length-prefixed so that
    /// `("ab", "c")` and `("a", "bc")` cannot collide.
    pub fn fingerprint(&self) -> ContentHash {
        let mut scopes: Vec<&str> = self.scope_ids.iter().map(String::as_str).collect();
        scopes.sort_unstable();
        scopes.dedup();

        let mut buf = Vec::with_capacity(64);
        push_field(&mut buf, self.role.as_db_str());
        push_field(&mut buf, &self.user_id);
        for scope in scopes {
            push_field(&mut buf, scope);
        }
        compute_content_hash(&buf)
    }
}

fn push_field(buf: &mut Vec<u8>, field: &str) {
    buf.extend_from_slice(&(field.len() as u64).to_be_bytes());
    buf.extend_from_slice(field.as_bytes());
}
