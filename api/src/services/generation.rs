//! AI generation provider (chat completion)

use async_trait::async_trait;
use reson_agentic::providers::{GenerationConfig, GoogleGenAIClient, InferenceClient};
use reson_agentic::types::ChatMessage;
use reson_agentic::utils::ConversationMessage;
use thiserror::Error;

use crate::constants::FAST_MODEL;

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("generation provider error: {0}")]
    Provider(String),
    #[error("generation provider returned an empty completion")]
    Empty,
}

/// Model and output budget for one call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModelRoute {
    pub model: &'static str,
    pub max_tokens: u32,
}

/// A system prompt plus one user message in, completion text out
#[async_trait]
pub trait CompletionProvider: Send + Sync {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        route: ModelRoute,
    ) -> Result<String, GenerationError>;
}

#[derive(Clone)]
pub struct GeminiProvider {
    client: GoogleGenAIClient,
}

impl GeminiProvider {
    pub fn new(api_key: &str) -> Self {
        Self {
            client: GoogleGenAIClient::new(api_key, FAST_MODEL),
        }
    }
}

#[async_trait]
impl CompletionProvider for GeminiProvider {
    async fn complete(
        &self,
        system_prompt: &str,
        user_message: &str,
        route: ModelRoute,
    ) -> Result<String, GenerationError> {
        let mut messages = Vec::with_capacity(2);
        if !system_prompt.trim().is_empty() {
            messages.push(ConversationMessage::Chat(ChatMessage::system(
                system_prompt.to_string(),
            )));
        }
        messages.push(ConversationMessage::Chat(ChatMessage::user(
            user_message.to_string(),
        )));

        let config = GenerationConfig {
            model: route.model.to_string(),
            max_tokens: Some(route.max_tokens),
            temperature: Some(0.7),
            top_p: None,
            tools: None,
            native_tools: false,
            reasoning_effort: None,
            thinking_budget: None,
            output_schema: None,
            output_type_name: None,
        };

        let response = self
            .client
            .get_generation(&messages, &config)
            .await
            .map_err(|e| GenerationError::Provider(e.to_string()))?;

        Ok(response.content)
    }
}
