//! SQL oracle backed by an OpenAI-compatible chat completion endpoint

use super::client::OpenAiClient;
use super::types::{CompletionRequest, CompletionResponse, Message};
use crate::providers::invalid_response;
use crate::SqlOracle;
use async_trait::async_trait;
use quarry_core::QuarryResult;

const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
const DEFAULT_MAX_TOKENS: i32 = 1024;

/// SQL oracle using chat completions.
pub struct OpenAiCompatibleOracle {
    client: OpenAiClient,
    model: String,
    max_tokens: i32,
}

impl OpenAiCompatibleOracle {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
            max_tokens: DEFAULT_MAX_TOKENS,
        }
    }

    /// DeepSeek's `deepseek-chat` model.
    pub fn deepseek(api_key: impl Into<String>) -> Self {
        Self::new(
            OpenAiClient::new("deepseek", DEEPSEEK_BASE_URL, api_key, 60),
            quarry_core::DEFAULT_MODEL,
        )
    }

    pub fn with_max_tokens(mut self, max_tokens: i32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// User message for one attempt. A retry carries the previous failure so
/// the model can correct it.
pub(crate) fn user_message(question: &str, prior_error: Option<&str>) -> String {
    match prior_error {
        None => question.to_string(),
        Some(error) => format!(
            "{}\n\nThe previous SQL attempt failed with this error:\n{}\n\
             Return a corrected read-only SQL query.",
            question, error
        ),
    }
}

#[async_trait]
impl SqlOracle for OpenAiCompatibleOracle {
    async fn complete(
        &self,
        system_context: &str,
        question: &str,
        prior_error: Option<&str>,
    ) -> QuarryResult<String> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(system_context),
                Message::user(user_message(question, prior_error)),
            ],
            max_tokens: Some(self.max_tokens),
            // Deterministic output for SQL
            temperature: Some(0.0),
        };

        let response: CompletionResponse =
            self.client.request("chat/completions", request).await?;

        if let Some(usage) = &response.usage {
            tracing::debug!(
                provider = self.client.provider(),
                model = %self.model,
                prompt_tokens = usage.prompt_tokens,
                total_tokens = usage.total_tokens,
                "oracle completion"
            );
        }

        let text = response
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| invalid_response(self.client.provider(), "No completion in response"))?;

        if text.trim().is_empty() {
            return Err(invalid_response(self.client.provider(), "Empty completion"));
        }
        Ok(text)
    }

    fn model_id(&self) -> &str {
        &self.model
    }
}

impl std::fmt::Debug for OpenAiCompatibleOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatibleOracle")
            .field("client", &self.client)
            .field("model", &self.model)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_attempt_message_is_question() {
        assert_eq!(user_message("how many users?", None), "how many users?");
    }

    #[test]
    fn test_retry_message_carries_error() {
        let msg = user_message("how many users?", Some("Table 'userz' doesn't exist"));
        assert!(msg.starts_with("how many users?"));
        assert!(msg.contains("Table 'userz' doesn't exist"));
    }

    #[test]
    fn test_deepseek_defaults() {
        let oracle = OpenAiCompatibleOracle::deepseek("key");
        assert_eq!(oracle.model_id(), "deepseek-chat");
    }
}
