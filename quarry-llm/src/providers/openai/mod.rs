//! OpenAI-compatible provider implementation

pub mod client;
pub mod oracle;
pub mod types;

pub use client::OpenAiClient;
pub use oracle::OpenAiCompatibleOracle;
