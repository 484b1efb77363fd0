//! Table existence gate over a refreshable snapshot of live table names.

use crate::traits::TableDirectory;
use quarry_core::{DirectoryError, QuarryResult, TableCheck};
use std::collections::HashSet;
use std::sync::RwLock;

/// Cross-checks referenced tables against the last loaded snapshot.
///
/// Names are compared case-insensitively. Until the first successful
/// [`TableGate::refresh`] the gate rejects everything, unless it was built
/// with `allow_unloaded`.
#[derive(Debug)]
pub struct TableGate {
    snapshot: RwLock<Option<HashSet<String>>>,
    allow_unloaded: bool,
}

impl TableGate {
    pub fn new(allow_unloaded: bool) -> Self {
        Self {
            snapshot: RwLock::new(None),
            allow_unloaded,
        }
    }

    /// Gate preloaded with a fixed set of names.
    pub fn with_tables<I, S>(tables: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let gate = Self::new(false);
        gate.replace(tables.into_iter().map(|t| t.as_ref().to_lowercase()).collect());
        gate
    }

    /// Reload from the directory. On failure the previous snapshot stays.
    pub async fn refresh(&self, directory: &dyn TableDirectory) -> QuarryResult<usize> {
        let tables = match directory.list_tables().await {
            Ok(tables) => tables,
            Err(e) => {
                tracing::warn!(error = %e, "table refresh failed, keeping previous snapshot");
                return Err(e);
            }
        };

        let normalized: HashSet<String> = tables.iter().map(|t| t.to_lowercase()).collect();
        let count = normalized.len();
        if !self.replace(normalized) {
            return Err(DirectoryError::LockPoisoned.into());
        }
        tracing::info!(tables = count, "table snapshot refreshed");
        Ok(count)
    }

    fn replace(&self, tables: HashSet<String>) -> bool {
        match self.snapshot.write() {
            Ok(mut guard) => {
                *guard = Some(tables);
                true
            }
            Err(_) => {
                tracing::warn!("table snapshot lock poisoned");
                false
            }
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.snapshot.read().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Check every referenced table. `missing` keeps the caller's spelling.
    pub fn check(&self, tables: &[String]) -> TableCheck {
        let guard = match self.snapshot.read() {
            Ok(guard) => guard,
            Err(_) => {
                tracing::warn!("table snapshot lock poisoned, rejecting");
                return TableCheck {
                    valid: false,
                    missing: tables.to_vec(),
                };
            }
        };

        let Some(snapshot) = guard.as_ref() else {
            if self.allow_unloaded {
                return TableCheck::passed();
            }
            tracing::warn!("table snapshot not loaded, rejecting");
            return TableCheck {
                valid: false,
                missing: tables.to_vec(),
            };
        };

        let missing: Vec<String> = tables
            .iter()
            .filter(|t| !snapshot.contains(&t.to_lowercase()))
            .cloned()
            .collect();

        TableCheck {
            valid: missing.is_empty(),
            missing,
        }
    }

    /// Snapshot contents, sorted.
    pub fn available_tables(&self) -> Vec<String> {
        let guard = match self.snapshot.read() {
            Ok(guard) => guard,
            Err(_) => return Vec::new(),
        };
        let mut tables: Vec<String> = guard
            .as_ref()
            .map(|s| s.iter().cloned().collect())
            .unwrap_or_default();
        tables.sort();
        tables
    }
}
