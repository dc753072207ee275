//! Mock provider implementation for testing.

use super::{FinishReason, ImageInput, ProviderError, ProviderResponse, VisionProvider};
use async_trait::async_trait;
use std::sync::Mutex;

/// A call captured by [`MockVisionProvider`].
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub prompt: String,
    pub image: ImageInput,
}

/// Mock vision provider returning a scripted reply and recording every call.
pub struct MockVisionProvider {
    reply: Result<String, ProviderError>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl MockVisionProvider {
    pub fn replying(text: impl Into<String>) -> Self {
        Self {
            reply: Ok(text.into()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(error: ProviderError) -> Self {
        Self {
            reply: Err(error),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls
            .lock()
            .map(|calls| calls.clone())
            .unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|calls| calls.len()).unwrap_or(0)
    }
}

#[async_trait]
impl VisionProvider for MockVisionProvider {
    fn model(&self) -> &str {
        "mock-vision"
    }

    async fn generate(
        &self,
        prompt: &str,
        image: &ImageInput,
    ) -> Result<ProviderResponse, ProviderError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                prompt: prompt.to_string(),
                image: image.clone(),
            });
        }

        self.reply.clone().map(|text| ProviderResponse {
            input_tokens: estimate_tokens(prompt),
            output_tokens: estimate_tokens(&text),
            text,
            finish_reason: FinishReason::Complete,
        })
    }
}

/// Rough token count at four bytes per token.
fn estimate_tokens(text: &str) -> i32 {
    i32::try_from(text.len() / 4).unwrap_or(i32::MAX)
}
