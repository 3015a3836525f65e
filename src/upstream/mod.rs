//! Clients for the three third-party APIs.
//!
//! Each upstream sits behind a trait so the operations in [`crate::service`]
//! can be exercised against fakes. The reqwest-backed implementations turn
//! HTTP statuses into [`ServiceError`] variants at the call site.

mod gemini;
mod openai;
mod retry;
mod unsplash;

pub use gemini::GeminiClient;
pub use openai::OpenAiImageClient;
pub use retry::with_retry;
pub use unsplash::UnsplashClient;

use crate::error::{BadRequest, ServiceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

const MAX_ERROR_BODY: usize = 300;

#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Sends one prompt and returns the model's text.
    async fn generate_text(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Requests one image and returns its URL.
    async fn generate_image(&self, prompt: &str) -> Result<String, ServiceError>;
}

#[async_trait]
pub trait PhotoSearch: Send + Sync {
    /// Searches stock photos; results lacking an image URL are dropped.
    async fn search_photos(&self, query: &str, per_page: u8) -> Result<Vec<StockPhoto>, ServiceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StockPhoto {
    pub regular_url: String,
    pub small_url: Option<String>,
    pub alt_description: Option<String>,
    pub photographer: String,
    pub username: String,
    pub profile_url: String,
}

pub(crate) fn transport_error(
    service: &'static str,
    timeout: Duration,
    bad_request: BadRequest,
    err: reqwest::Error,
) -> ServiceError {
    if err.is_timeout() {
        return ServiceError::Timeout { service, timeout };
    }
    match err.status() {
        Some(status) => {
            ServiceError::from_status(service, status.as_u16(), bad_request, err.to_string())
        }
        None => ServiceError::UpstreamFailure {
            service,
            status: None,
            message: err.to_string(),
        },
    }
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorBody>,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

/// Reads a non-success response into a classified error.
pub(crate) async fn status_error(
    service: &'static str,
    timeout: Duration,
    bad_request: BadRequest,
    response: reqwest::Response,
) -> ServiceError {
    let status = response.status().as_u16();
    let body = match response.text().await {
        Ok(body) => body,
        Err(err) => return transport_error(service, timeout, bad_request, err),
    };
    ServiceError::from_status(service, status, bad_request, error_message(status, &body))
}

/// Prefers the `{"error": {"message": ...}}` shape both generation APIs use.
fn error_message(status: u16, body: &str) -> String {
    if let Ok(ErrorEnvelope {
        error: Some(ErrorBody {
            message: Some(message),
        }),
    }) = serde_json::from_str::<ErrorEnvelope>(body)
    {
        return message;
    }
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return format!("HTTP {status}");
    }
    trimmed.chars().take(MAX_ERROR_BODY).collect()
}

fn trim_base(base_url: &str) -> &str {
    base_url.trim_end_matches('/')
}
