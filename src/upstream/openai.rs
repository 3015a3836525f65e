use super::{ImageGenerator, status_error, transport_error, trim_base};
use crate::error::{BadRequest, ServiceError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "OpenAI";
const BAD_REQUEST: BadRequest = BadRequest::ContentRejected;
const IMAGE_SIZE: &str = "1024x1024";
const IMAGE_QUALITY: &str = "standard";

/// OpenAI images API client; always asks for a single square image.
#[derive(Clone)]
pub struct OpenAiImageClient {
    http: reqwest::Client,
    api_key: String,
    model: String,
    base_url: String,
    timeout: Duration,
}

impl OpenAiImageClient {
    pub fn new(
        http: reqwest::Client,
        api_key: impl Into<String>,
        model: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            api_key: api_key.into(),
            model: model.into(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[derive(Serialize)]
struct GenerationRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u8,
    size: &'a str,
    quality: &'a str,
}

#[derive(Deserialize)]
struct GenerationResponse {
    #[serde(default)]
    data: Vec<GeneratedItem>,
}

#[derive(Deserialize)]
struct GeneratedItem {
    url: Option<String>,
}

#[async_trait]
impl ImageGenerator for OpenAiImageClient {
    async fn generate_image(&self, prompt: &str) -> Result<String, ServiceError> {
        let body = GenerationRequest {
            model: &self.model,
            prompt,
            n: 1,
            size: IMAGE_SIZE,
            quality: IMAGE_QUALITY,
        };
        debug!(model = %self.model, "Requesting illustration");
        let response = self
            .http
            .post(format!("{}/v1/images/generations", trim_base(&self.base_url)))
            .bearer_auth(&self.api_key)
            .timeout(self.timeout)
            .json(&body)
            .send()
            .await
            .map_err(|err| transport_error(SERVICE, self.timeout, BAD_REQUEST, err))?;
        if !response.status().is_success() {
            return Err(status_error(SERVICE, self.timeout, BAD_REQUEST, response).await);
        }
        let payload: GenerationResponse = response
            .json()
            .await
            .map_err(|err| transport_error(SERVICE, self.timeout, BAD_REQUEST, err))?;
        payload
            .data
            .into_iter()
            .next()
            .and_then(|item| item.url)
            .filter(|url| !url.trim().is_empty())
            .ok_or(ServiceError::UpstreamEmptyResult { service: SERVICE })
    }
}
