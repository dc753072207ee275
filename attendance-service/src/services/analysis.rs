//! Screenshot analysis: prompt, single model call, answer cleanup.

use crate::config::AnalyzeSettings;
use crate::services::image::prepare_image;
use crate::services::metrics;
use crate::services::providers::{ProviderError, VisionProvider};
use image::ImageError;
use serde::{Deserialize, Serialize};
use service_core::error::AppError;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

pub const ANALYSIS_PROMPT: &str = concat!(
    "Analyze this Keka attendance timeline screenshot. ",
    "1. Check if there is an 'OUT missing' log indicating an active session. ",
    "2. If active, extract the exact time of the punch-in immediately above 'OUT missing'. ",
    "3. Extract the already completed 'Effective hours' shown at the top of the screen. ",
    "4. Output ONLY a raw JSON object with this exact structure (do not include markdown tags): ",
    "{\"lastPunchIn\": \"HH:MM:SS AM/PM\", \"syncedEffectiveHours\": \"Hh Mm\", \"isActiveSession\": true}"
);

pub const MISSING_KEY_MESSAGE: &str = "Server API key configuration error";
pub const LEGACY_MISSING_KEY_MESSAGE: &str = "Server configuration error: GEMINI_API_KEY not set";

/// Remove every ```` ```json ```` and ```` ``` ```` marker, then trim.
pub fn strip_markdown_fences(text: &str) -> String {
    text.replace("```json", "").replace("```", "").trim().to_string()
}

/// The answer shape the prompt asks for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AttendanceSnapshot {
    /// Absent or null when there is no open session.
    #[serde(default)]
    pub last_punch_in: Option<String>,
    pub synced_effective_hours: String,
    pub is_active_session: bool,
}

#[derive(Debug, Error)]
pub enum AnalyzeError {
    #[error("{0}")]
    NotConfigured(&'static str),

    #[error("{0}")]
    Decode(#[from] ImageError),

    #[error("{0}")]
    Upstream(#[from] ProviderError),

    #[error("Model response did not match the expected schema: {0}")]
    InvalidResponse(String),
}

impl AnalyzeError {
    /// Label for `analyze_requests_total`.
    pub fn outcome(&self) -> &'static str {
        match self {
            AnalyzeError::NotConfigured(_) => "not_configured",
            AnalyzeError::Decode(_) => "decode_error",
            AnalyzeError::Upstream(_) => "upstream_error",
            AnalyzeError::InvalidResponse(_) => "invalid_response",
        }
    }
}

impl From<AnalyzeError> for AppError {
    fn from(err: AnalyzeError) -> Self {
        match err {
            AnalyzeError::NotConfigured(message) => {
                AppError::ConfigError(anyhow::anyhow!(message))
            }
            AnalyzeError::InvalidResponse(_) => AppError::BadGateway(err.to_string()),
            AnalyzeError::Decode(_) | AnalyzeError::Upstream(_) => {
                AppError::InternalError(anyhow::Error::new(err))
            }
        }
    }
}

/// Runs one screenshot through the vision model.
///
/// Holds no per-request state; cloned into every handler via `AppState`.
#[derive(Clone)]
pub struct Analyzer {
    provider: Option<Arc<dyn VisionProvider>>,
    validate_response: bool,
    missing_key_message: &'static str,
}

impl Analyzer {
    pub fn new(provider: Option<Arc<dyn VisionProvider>>, settings: &AnalyzeSettings) -> Self {
        Self {
            provider,
            validate_response: settings.validate_response,
            missing_key_message: if settings.legacy_config_message {
                LEGACY_MISSING_KEY_MESSAGE
            } else {
                MISSING_KEY_MESSAGE
            },
        }
    }

    pub fn is_configured(&self) -> bool {
        self.provider.is_some()
    }

    pub fn ensure_configured(&self) -> Result<&Arc<dyn VisionProvider>, AnalyzeError> {
        self.provider
            .as_ref()
            .ok_or(AnalyzeError::NotConfigured(self.missing_key_message))
    }

    /// Decode `bytes`, ask the model once and return its cleaned answer.
    pub async fn analyze(&self, bytes: &[u8]) -> Result<String, AnalyzeError> {
        let provider = self.ensure_configured()?;

        let image = prepare_image(bytes)?;
        tracing::debug!(
            format = ?image.source_format,
            width = image.width,
            height = image.height,
            forwarded_mime = %image.input.mime_type,
            "Decoded uploaded screenshot"
        );

        let started = Instant::now();
        let response = provider.generate(ANALYSIS_PROMPT, &image.input).await?;
        metrics::record_provider_call(
            provider.model(),
            started.elapsed().as_secs_f64(),
            response.input_tokens,
            response.output_tokens,
        );

        tracing::info!(
            model = %provider.model(),
            input_tokens = response.input_tokens,
            output_tokens = response.output_tokens,
            finish_reason = ?response.finish_reason,
            "Model answered"
        );

        let cleaned = strip_markdown_fences(&response.text);

        if self.validate_response {
            serde_json::from_str::<AttendanceSnapshot>(&cleaned)
                .map_err(|e| AnalyzeError::InvalidResponse(e.to_string()))?;
        }

        Ok(cleaned)
    }
}
