//! Result cache with identity-scoped keys.
//!
//! [`ResultCacheKey`] cannot be constructed without a
//! [`CallerIdentity`](quarry_core::CallerIdentity), so identical SQL asked by
//! two tenants always lands in two different slots. Only successful outcomes
//! are stored.

pub mod key;
pub mod result_cache;
pub mod stats;

pub use key::{normalize_sql, ResultCacheKey};
pub use result_cache::ResultCache;
pub use stats::CacheStats;
