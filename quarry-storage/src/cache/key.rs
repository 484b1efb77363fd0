//! Identity-scoped cache keys.
//!
//! A [`ResultCacheKey`] cannot be built without a [`CallerIdentity`]. Two
//! callers asking the same SQL under different roles or scopes get different
//! keys, so one tenant's rows can never be served to another.

use quarry_core::{compute_content_hash, CallerIdentity, ContentHash};
use std::fmt;

/// Separator between the statement and the identity fingerprint.
/// 0xFF never appears in valid UTF-8.
const SEPARATOR: u8 = 0xFF;

/// Cache key derived from a normalized statement and the caller's identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResultCacheKey {
    inner: KeyDigest,
}

/// Private so keys only come from [`ResultCacheKey::new`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct KeyDigest(ContentHash);

impl ResultCacheKey {
    pub fn new(sql: &str, identity: &CallerIdentity) -> Self {
        let normalized = normalize_sql(sql);
        let fingerprint = identity.fingerprint();

        let mut buf = Vec::with_capacity(normalized.len() + 1 + fingerprint.len());
        buf.extend_from_slice(normalized.as_bytes());
        buf.push(SEPARATOR);
        buf.extend_from_slice(&fingerprint);

        Self {
            inner: KeyDigest(compute_content_hash(&buf)),
        }
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.inner.0
    }
}

impl fmt::Display for ResultCacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.inner.0))
    }
}

/// Collapse whitespace runs outside quoted literals and drop a trailing
/// semicolon. Keyword case is left alone: `'Alice'` and `'alice'` are
/// different queries and the statement text is not parsed here.
pub fn normalize_sql(sql: &str) -> String {
    let mut out = String::with_capacity(sql.len());
    let mut quote: Option<char> = None;
    let mut pending_space = false;

    for c in sql.trim().chars() {
        match quote {
            Some(q) => {
                out.push(c);
                if c == q {
                    quote = None;
                }
            }
            None if c.is_whitespace() => pending_space = true,
            None => {
                if pending_space && !out.is_empty() {
                    out.push(' ');
                }
                pending_space = false;
                if matches!(c, '\'' | '"' | '`') {
                    quote = Some(c);
                }
                out.push(c);
            }
        }
    }

    while out.ends_with(';') {
        out.pop();
        let trimmed = out.trim_end().len();
        out.truncate(trimmed);
    }
    out
}
