//! Draft generation: prompt assembly plus one provider call

use std::sync::Arc;

use super::prompt::{DraftRequest, build_user_message};
use crate::constants::{CAPABLE_MAX_TOKENS, CAPABLE_MODEL, FAST_MAX_TOKENS, FAST_MODEL};
use crate::services::generation::{CompletionProvider, GenerationError, ModelRoute};

/// Low ratings and reviews with photos go to the more capable model
pub fn route_for(rating: i32, has_images: bool) -> ModelRoute {
    if rating <= 2 || has_images {
        ModelRoute {
            model: CAPABLE_MODEL,
            max_tokens: CAPABLE_MAX_TOKENS,
        }
    } else {
        ModelRoute {
            model: FAST_MODEL,
            max_tokens: FAST_MAX_TOKENS,
        }
    }
}

#[derive(Clone)]
pub struct DraftGenerator {
    provider: Arc<dyn CompletionProvider>,
}

impl DraftGenerator {
    pub fn new(provider: Arc<dyn CompletionProvider>) -> Self {
        Self { provider }
    }

    pub async fn generate(
        &self,
        request: &DraftRequest,
        system_prompt: &str,
    ) -> Result<String, GenerationError> {
        let message = build_user_message(request);
        let route = route_for(request.rating, request.has_images());

        tracing::debug!(model = route.model, rating = request.rating, "Generating draft");

        let text = self
            .provider
            .complete(system_prompt, &message, route)
            .await?;

        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text.to_string())
    }
}
