use serde::Serialize;
use std::time::Duration;

pub const TEXT_API_KEY_VAR: &str = "GOOGLE_API_KEY";
pub const IMAGE_API_KEY_VAR: &str = "OPENAI_API_KEY";
pub const STOCK_PHOTO_KEY_VAR: &str = "UNSPLASH_ACCESS_KEY";

pub const DEFAULT_TEXT_MODEL: &str = "gemini-1.5-flash";
pub const DEFAULT_IMAGE_MODEL: &str = "dall-e-3";
pub const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_UNSPLASH_BASE_URL: &str = "https://api.unsplash.com";

/// Everything the upstream-facing operations need, built once at startup.
#[derive(Clone)]
pub struct ServiceConfig {
    pub text_api_key: Option<String>,
    pub image_api_key: Option<String>,
    pub stock_photo_key: Option<String>,
    pub text_model: String,
    pub image_model: String,
    pub gemini_base_url: String,
    pub openai_base_url: String,
    pub unsplash_base_url: String,
    /// Per-attempt bound for text and image generation.
    pub generation_timeout: Duration,
    /// Bound for the single stock-photo search.
    pub search_timeout: Duration,
    pub retry: RetryPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            text_api_key: None,
            image_api_key: None,
            stock_photo_key: None,
            text_model: DEFAULT_TEXT_MODEL.to_string(),
            image_model: DEFAULT_IMAGE_MODEL.to_string(),
            gemini_base_url: DEFAULT_GEMINI_BASE_URL.to_string(),
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            unsplash_base_url: DEFAULT_UNSPLASH_BASE_URL.to_string(),
            generation_timeout: Duration::from_secs(30),
            search_timeout: Duration::from_secs(5),
            retry: RetryPolicy::default(),
        }
    }
}

impl std::fmt::Debug for ServiceConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServiceConfig")
            .field("credentials", &self.credential_status())
            .field("text_model", &self.text_model)
            .field("image_model", &self.image_model)
            .field("generation_timeout", &self.generation_timeout)
            .field("search_timeout", &self.search_timeout)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl ServiceConfig {
    /// Reads the three credentials from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            text_api_key: non_blank(lookup(TEXT_API_KEY_VAR)),
            image_api_key: non_blank(lookup(IMAGE_API_KEY_VAR)),
            stock_photo_key: non_blank(lookup(STOCK_PHOTO_KEY_VAR)),
            ..Self::default()
        }
    }

    pub fn credential_status(&self) -> CredentialStatus {
        CredentialStatus {
            text_generation: self.text_api_key.is_some(),
            image_generation: self.image_api_key.is_some(),
            stock_photos: self.stock_photo_key.is_some(),
        }
    }
}

/// Blank values count as absent.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Which credentials are present. Never carries the secrets themselves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialStatus {
    pub text_generation: bool,
    pub image_generation: bool,
    pub stock_photos: bool,
}

/// Bounded exponential backoff for transient upstream failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(4),
        }
    }
}

impl RetryPolicy {
    pub const fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    /// Delay before retry number `retry` (0-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry).unwrap_or(u32::MAX);
        self.base_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}
