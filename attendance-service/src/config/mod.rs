use secrecy::Secret;
use service_core::config as core_config;
use service_core::error::AppError;
use std::env;
use std::fmt::Display;
use std::str::FromStr;

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_GEMINI_TIMEOUT_SECS: u64 = 120;
/// 10MB, comfortably above a full-page screenshot.
const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct AttendanceConfig {
    pub common: core_config::Config,
    pub gemini: GeminiSettings,
    pub analyze: AnalyzeSettings,
    pub observability: ObservabilitySettings,
}

#[derive(Debug, Clone)]
pub struct GeminiSettings {
    /// `None` puts the service in degraded mode for its whole lifetime.
    pub api_key: Option<Secret<String>>,
    pub model: String,
    pub api_base: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone)]
pub struct AnalyzeSettings {
    pub max_upload_bytes: usize,
    /// Parse the model answer into `AttendanceSnapshot` before returning it.
    pub validate_response: bool,
    /// Report a missing key as "Server configuration error: GEMINI_API_KEY not set".
    pub legacy_config_message: bool,
}

#[derive(Debug, Clone)]
pub struct ObservabilitySettings {
    pub log_level: String,
    pub otlp_endpoint: Option<String>,
}

impl AttendanceConfig {
    /// Load `.env`, the shared listener settings and the service variables.
    pub fn load() -> Result<Self, AppError> {
        let common = core_config::Config::load()?;
        Self::from_lookup(common, |key| env::var(key).ok())
    }

    /// Build the service settings from an arbitrary variable source.
    pub fn from_lookup<F>(common: core_config::Config, lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_blank = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };

        Ok(AttendanceConfig {
            common,
            gemini: GeminiSettings {
                api_key: non_blank("GEMINI_API_KEY").map(Secret::new),
                model: non_blank("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.into()),
                api_base: non_blank("GEMINI_API_BASE")
                    .map(|base| base.trim_end_matches('/').to_string())
                    .unwrap_or_else(|| DEFAULT_GEMINI_API_BASE.into()),
                timeout_secs: parse_var(
                    "GEMINI_TIMEOUT_SECS",
                    non_blank("GEMINI_TIMEOUT_SECS"),
                    DEFAULT_GEMINI_TIMEOUT_SECS,
                )?,
            },
            analyze: AnalyzeSettings {
                max_upload_bytes: parse_var(
                    "ANALYZE_MAX_UPLOAD_BYTES",
                    non_blank("ANALYZE_MAX_UPLOAD_BYTES"),
                    DEFAULT_MAX_UPLOAD_BYTES,
                )?,
                validate_response: parse_flag(
                    "ANALYZE_VALIDATE_RESPONSE",
                    non_blank("ANALYZE_VALIDATE_RESPONSE"),
                )?,
                legacy_config_message: parse_flag(
                    "ANALYZE_LEGACY_CONFIG_MESSAGE",
                    non_blank("ANALYZE_LEGACY_CONFIG_MESSAGE"),
                )?,
            },
            observability: ObservabilitySettings {
                log_level: non_blank("LOG_LEVEL").unwrap_or_else(|| "info".into()),
                otlp_endpoint: non_blank("OTLP_ENDPOINT"),
            },
        })
    }
}

fn parse_var<T>(key: &str, raw: Option<String>, default: T) -> Result<T, AppError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e| {
            AppError::ConfigError(anyhow::anyhow!("{} has invalid value '{}': {}", key, raw, e))
        }),
    }
}

fn parse_flag(key: &str, raw: Option<String>) -> Result<bool, AppError> {
    match raw.as_deref().map(str::to_ascii_lowercase).as_deref() {
        None => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(AppError::ConfigError(anyhow::anyhow!(
            "{} must be a boolean, got '{}'",
            key,
            other
        ))),
    }
}
