//! Configuration types

use crate::error::{ConfigError, QuarryError, QuarryResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Hard upper bound on attempts per question.
pub const MAX_ATTEMPT_BUDGET: u8 = 3;

const DEFAULT_CACHE_TTL_SECS: u64 = 300;
const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;
const DEFAULT_CACHE_SWEEP_INTERVAL_SECS: u64 = 60;
const DEFAULT_TABLE_REFRESH_INTERVAL_SECS: u64 = 600;
const DEFAULT_ROW_LIMIT: usize = 1_000;
const DEFAULT_LARGE_LIMIT_WARNING: u64 = 10_000;
const DEFAULT_EMPTY_RESULT_PENALTY: f32 = 0.8;

/// Pipeline configuration.
///
/// Missing fields in a TOML document fall back to [`QuarryConfig::default`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuarryConfig {
    /// Generate/execute cycles per question, 1..=3
    pub attempt_budget: u8,
    /// Baseline confidence for a success on attempt 1, 2, 3
    pub attempt_confidence: [f32; 3],
    /// Multiplier applied when a successful result has zero rows
    pub empty_result_penalty: f32,

    #[serde(with = "duration_secs")]
    pub cache_ttl: Duration,
    pub cache_max_entries: usize,
    #[serde(with = "duration_secs")]
    pub cache_sweep_interval: Duration,

    #[serde(with = "duration_secs")]
    pub table_refresh_interval: Duration,
    /// Allow the table gate to pass while no snapshot has been loaded
    pub table_gate_allow_unloaded: bool,

    /// LIMIT appended to SELECTs without one; also caps materialized rows
    pub row_limit: usize,
    /// LIMIT values above this produce a pagination warning
    pub large_limit_warning: u64,
}

impl Default for QuarryConfig {
    fn default() -> Self {
        Self {
            attempt_budget: MAX_ATTEMPT_BUDGET,
            attempt_confidence: [1.0, 0.8, 0.6],
            empty_result_penalty: DEFAULT_EMPTY_RESULT_PENALTY,
            cache_ttl: Duration::from_secs(DEFAULT_CACHE_TTL_SECS),
            cache_max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            cache_sweep_interval: Duration::from_secs(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
            table_refresh_interval: Duration::from_secs(DEFAULT_TABLE_REFRESH_INTERVAL_SECS),
            table_gate_allow_unloaded: false,
            row_limit: DEFAULT_ROW_LIMIT,
            large_limit_warning: DEFAULT_LARGE_LIMIT_WARNING,
        }
    }
}

impl QuarryConfig {
    /// Create QuarryConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `QUARRY_ATTEMPT_BUDGET`: attempts per question, clamped to 1..=3 (default: 3)
    /// - `QUARRY_EMPTY_RESULT_PENALTY`: zero-row confidence multiplier (default: 0.8)
    /// - `QUARRY_CACHE_TTL_SECS`: result cache TTL (default: 300)
    /// - `QUARRY_CACHE_MAX_ENTRIES`: result cache capacity (default: 10000)
    /// - `QUARRY_CACHE_SWEEP_INTERVAL_SECS`: expired-entry sweep period (default: 60)
    /// - `QUARRY_TABLE_REFRESH_INTERVAL_SECS`: table snapshot refresh period (default: 600)
    /// - `QUARRY_TABLE_GATE_ALLOW_UNLOADED`: pass the gate before first load (default: false)
    /// - `QUARRY_ROW_LIMIT`: enforced LIMIT (default: 1000)
    /// - `QUARRY_LARGE_LIMIT_WARNING`: pagination warning threshold (default: 10000)
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let attempt_budget = env_parse("QUARRY_ATTEMPT_BUDGET")
            .unwrap_or(defaults.attempt_budget)
            .clamp(1, MAX_ATTEMPT_BUDGET);

        let empty_result_penalty =
            env_parse("QUARRY_EMPTY_RESULT_PENALTY").unwrap_or(defaults.empty_result_penalty);

        let cache_ttl = Duration::from_secs(
            env_parse("QUARRY_CACHE_TTL_SECS").unwrap_or(DEFAULT_CACHE_TTL_SECS),
        );

        let cache_max_entries =
            env_parse("QUARRY_CACHE_MAX_ENTRIES").unwrap_or(DEFAULT_CACHE_MAX_ENTRIES);

        let cache_sweep_interval = Duration::from_secs(
            env_parse("QUARRY_CACHE_SWEEP_INTERVAL_SECS")
                .unwrap_or(DEFAULT_CACHE_SWEEP_INTERVAL_SECS),
        );

        let table_refresh_interval = Duration::from_secs(
            env_parse("QUARRY_TABLE_REFRESH_INTERVAL_SECS")
                .unwrap_or(DEFAULT_TABLE_REFRESH_INTERVAL_SECS),
        );

        let table_gate_allow_unloaded = std::env::var("QUARRY_TABLE_GATE_ALLOW_UNLOADED")
            .ok()
            .map(|s| s.eq_ignore_ascii_case("true") || s == "1")
            .unwrap_or(false);

        let row_limit = env_parse("QUARRY_ROW_LIMIT").unwrap_or(DEFAULT_ROW_LIMIT);

        let large_limit_warning =
            env_parse("QUARRY_LARGE_LIMIT_WARNING").unwrap_or(DEFAULT_LARGE_LIMIT_WARNING);

        Self {
            attempt_budget,
            attempt_confidence: defaults.attempt_confidence,
            empty_result_penalty,
            cache_ttl,
            cache_max_entries,
            cache_sweep_interval,
            table_refresh_interval,
            table_gate_allow_unloaded,
            row_limit,
            large_limit_warning,
        }
    }

    /// Load from a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> QuarryResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    /// Returns Ok(()) if valid, Err(QuarryError::Config) if invalid.
    pub fn validate(&self) -> QuarryResult<()> {
        if self.attempt_budget == 0 || self.attempt_budget > MAX_ATTEMPT_BUDGET {
            return Err(invalid(
                "attempt_budget",
                self.attempt_budget,
                "attempt_budget must be between 1 and 3",
            ));
        }

        for (i, c) in self.attempt_confidence.iter().enumerate() {
            if !(0.0..=1.0).contains(c) {
                return Err(invalid(
                    &format!("attempt_confidence[{i}]"),
                    c,
                    "confidence must be between 0.0 and 1.0",
                ));
            }
        }

        if !(0.0..=1.0).contains(&self.empty_result_penalty) {
            return Err(invalid(
                "empty_result_penalty",
                self.empty_result_penalty,
                "empty_result_penalty must be between 0.0 and 1.0",
            ));
        }

        if self.cache_ttl.is_zero() {
            return Err(invalid(
                "cache_ttl",
                format!("{:?}", self.cache_ttl),
                "cache_ttl must be positive",
            ));
        }

        if self.cache_max_entries == 0 {
            return Err(invalid(
                "cache_max_entries",
                self.cache_max_entries,
                "cache_max_entries must be greater than 0",
            ));
        }

        if self.cache_sweep_interval.is_zero() {
            return Err(invalid(
                "cache_sweep_interval",
                format!("{:?}", self.cache_sweep_interval),
                "cache_sweep_interval must be positive",
            ));
        }

        if self.table_refresh_interval.is_zero() {
            return Err(invalid(
                "table_refresh_interval",
                format!("{:?}", self.table_refresh_interval),
                "table_refresh_interval must be positive",
            ));
        }

        if self.row_limit == 0 {
            return Err(invalid(
                "row_limit",
                self.row_limit,
                "row_limit must be greater than 0",
            ));
        }

        Ok(())
    }

    /// Budget clamped into 1..=3.
    pub fn effective_attempt_budget(&self) -> u8 {
        self.attempt_budget.clamp(1, MAX_ATTEMPT_BUDGET)
    }

    /// Confidence for a success on `attempt` (1-based), penalized when empty.
    ///
    /// `attempt` must lie in 1..=3. Release builds clamp anything outside
    /// that range onto the nearest slot; debug builds panic.
    pub fn confidence_for(&self, attempt: u8, empty: bool) -> f32 {
        debug_assert!(
            (1..=MAX_ATTEMPT_BUDGET).contains(&attempt),
            "attempt {} outside 1..={}",
            attempt,
            MAX_ATTEMPT_BUDGET
        );
        let idx = usize::from(attempt.clamp(1, MAX_ATTEMPT_BUDGET)) - 1;
        let baseline = self.attempt_confidence[idx];
        if empty {
            baseline * self.empty_result_penalty
        } else {
            baseline
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

fn invalid(field: &str, value: impl ToString, reason: &str) -> QuarryError {
    QuarryError::Config(ConfigError::InvalidValue {
        field: field.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    })
}

/// Durations as whole seconds in config documents.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = QuarryConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.attempt_budget, 3);
        assert_eq!(config.row_limit, 1_000);
    }

    #[test]
    fn test_validate_rejects_zero_budget() {
        let config = QuarryConfig {
            attempt_budget: 0,
            ..QuarryConfig::default()
        };
        let err = config.validate().unwrap_err();
        assert!(matches!(
            err,
            QuarryError::Config(ConfigError::InvalidValue { ref field, .. }) if field == "attempt_budget"
        ));
    }

    #[test]
    fn test_validate_rejects_penalty_out_of_range() {
        let config = QuarryConfig {
            empty_result_penalty: 1.5,
            ..QuarryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_ttl() {
        let config = QuarryConfig {
            cache_ttl: Duration::ZERO,
            ..QuarryConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_effective_budget_clamps() {
        let high = QuarryConfig {
            attempt_budget: 9,
            ..QuarryConfig::default()
        };
        assert_eq!(high.effective_attempt_budget(), 3);
        let low = QuarryConfig {
            attempt_budget: 0,
            ..QuarryConfig::default()
        };
        assert_eq!(low.effective_attempt_budget(), 1);
    }

    #[test]
    fn test_confidence_model() {
        let config = QuarryConfig::default();
        assert_eq!(config.confidence_for(1, false), 1.0);
        assert_eq!(config.confidence_for(2, false), 0.8);
        assert_eq!(config.confidence_for(3, false), 0.6);
        assert!((config.confidence_for(1, true) - 0.8).abs() < 1e-6);
        assert!((config.confidence_for(2, true) - 0.64).abs() < 1e-6);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "outside 1..=3")]
    fn test_confidence_for_rejects_attempt_past_budget() {
        QuarryConfig::default().confidence_for(4, false);
    }

    #[test]
    fn test_from_toml_partial_document() {
        let config = QuarryConfig::from_toml_str(
            r#"
            attempt_budget = 2
            cache_ttl = 30
            row_limit = 50
            "#,
        )
        .unwrap();
        assert_eq!(config.attempt_budget, 2);
        assert_eq!(config.cache_ttl, Duration::from_secs(30));
        assert_eq!(config.row_limit, 50);
        assert_eq!(config.cache_max_entries, DEFAULT_CACHE_MAX_ENTRIES);
    }

    #[test]
    fn test_from_toml_rejects_invalid() {
        assert!(QuarryConfig::from_toml_str("attempt_budget = 7").is_err());
        assert!(matches!(
            QuarryConfig::from_toml_str("row_limit = \"many\""),
            Err(QuarryError::Config(ConfigError::Parse { .. }))
        ));
    }
}
