//! SQL oracle implementations
//!
//! Concrete [`SqlOracle`](crate::SqlOracle) backends. Only OpenAI-compatible
//! chat completion endpoints are provided; DeepSeek speaks the same API.

pub mod openai;

pub use openai::{OpenAiClient, OpenAiCompatibleOracle};

use quarry_core::{OracleError, QuarryError};

pub(crate) fn request_failed(provider: &str, message: impl Into<String>) -> QuarryError {
    OracleError::RequestFailed {
        provider: provider.to_string(),
        message: message.into(),
    }
    .into()
}

pub(crate) fn invalid_response(provider: &str, reason: impl Into<String>) -> QuarryError {
    OracleError::InvalidResponse {
        provider: provider.to_string(),
        reason: reason.into(),
    }
    .into()
}
