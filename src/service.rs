//! The three operations behind the HTTP API.

use crate::config::{RetryPolicy, ServiceConfig};
use crate::error::ServiceError;
use crate::fallback;
use crate::model::{
    Attribution, EtymologyAnalysis, FallbackReason, GeneratedImage, ImageResult,
};
use crate::normalize::normalize;
use crate::prompt::{etymology_prompt, illustration_prompt};
use crate::upstream::{
    GeminiClient, ImageGenerator, OpenAiImageClient, PhotoSearch, StockPhoto, TextGenerator,
    UnsplashClient, with_retry,
};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const TEXT_SERVICE: &str = "Gemini";
const IMAGE_SERVICE: &str = "OpenAI";
const PHOTOS_PER_SEARCH: u8 = 3;
/// Headroom over the client timeout before the resolver stops waiting itself.
const SEARCH_GRACE: Duration = Duration::from_millis(500);

/// Etymology, illustration and image search, wired to whichever upstreams
/// have credentials.
#[derive(Clone)]
pub struct EtymologyService {
    text: Option<Arc<dyn TextGenerator>>,
    images: Option<Arc<dyn ImageGenerator>>,
    photos: Option<Arc<dyn PhotoSearch>>,
    retry: RetryPolicy,
    search_timeout: Duration,
}

impl Default for EtymologyService {
    fn default() -> Self {
        Self {
            text: None,
            images: None,
            photos: None,
            retry: RetryPolicy::default(),
            search_timeout: ServiceConfig::default().search_timeout,
        }
    }
}

impl EtymologyService {
    /// Builds the reqwest-backed clients for every configured credential.
    pub fn from_config(config: &ServiceConfig, http: reqwest::Client) -> Self {
        let text = config.text_api_key.as_ref().map(|key| {
            Arc::new(GeminiClient::new(
                http.clone(),
                key.clone(),
                config.text_model.clone(),
                config.gemini_base_url.clone(),
                config.generation_timeout,
            )) as Arc<dyn TextGenerator>
        });
        let images = config.image_api_key.as_ref().map(|key| {
            Arc::new(OpenAiImageClient::new(
                http.clone(),
                key.clone(),
                config.image_model.clone(),
                config.openai_base_url.clone(),
                config.generation_timeout,
            )) as Arc<dyn ImageGenerator>
        });
        let photos = config.stock_photo_key.as_ref().map(|key| {
            Arc::new(UnsplashClient::new(
                http.clone(),
                key.clone(),
                config.unsplash_base_url.clone(),
                config.search_timeout,
            )) as Arc<dyn PhotoSearch>
        });
        Self {
            text,
            images,
            photos,
            retry: config.retry,
            search_timeout: config.search_timeout,
        }
    }

    pub fn with_text_generator(mut self, text: Arc<dyn TextGenerator>) -> Self {
        self.text = Some(text);
        self
    }

    pub fn with_image_generator(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = Some(images);
        self
    }

    pub fn with_photo_search(mut self, photos: Arc<dyn PhotoSearch>) -> Self {
        self.photos = Some(photos);
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_search_timeout(mut self, timeout: Duration) -> Self {
        self.search_timeout = timeout;
        self
    }

    /// Asks the text model for an etymology of `word` and normalizes the answer.
    pub async fn analyze(&self, word: &str) -> Result<EtymologyAnalysis, ServiceError> {
        let word = required_word(word)?;
        let text = self.text.as_ref().ok_or(ServiceError::Misconfigured {
            service: TEXT_SERVICE,
        })?;
        let prompt = etymology_prompt(word);
        let raw = with_retry(&self.retry, "etymology", || text.generate_text(&prompt)).await?;
        let data = normalize(word, &raw);
        info!(
            word,
            structured = data.has_structure(),
            raw_len = raw.len(),
            "Etymology analyzed"
        );
        Ok(EtymologyAnalysis {
            data,
            raw_response: raw,
        })
    }

    /// Generates one illustration for `word`, optionally steered by etymology text.
    pub async fn illustrate(
        &self,
        word: &str,
        etymology: Option<&str>,
    ) -> Result<GeneratedImage, ServiceError> {
        let word = required_word(word)?;
        let images = self.images.as_ref().ok_or(ServiceError::Misconfigured {
            service: IMAGE_SERVICE,
        })?;
        let prompt = illustration_prompt(word, etymology);
        let image_url =
            with_retry(&self.retry, "illustration", || images.generate_image(&prompt)).await?;
        if image_url.trim().is_empty() {
            return Err(ServiceError::UpstreamEmptyResult {
                service: IMAGE_SERVICE,
            });
        }
        info!(word, "Illustration generated");
        Ok(GeneratedImage { image_url, prompt })
    }

    /// Resolves an image for `word`/`query`. Never fails: every failure path
    /// ends in the compiled-in fallback table.
    pub async fn search_image(&self, word: Option<&str>, query: Option<&str>) -> ImageResult {
        let word = word.map(str::trim).filter(|w| !w.is_empty());
        let query = query.map(str::trim).filter(|q| !q.is_empty());
        if word.is_none() && query.is_none() {
            return fallback::default_image();
        }
        let search_word = word.unwrap_or("default");
        let search_query = match query {
            Some(query) => query.to_string(),
            None => fallback::search_query_for(search_word),
        };

        let Some(photos) = self.photos.as_ref() else {
            return fallback::image_for(search_word, FallbackReason::NoApiKey);
        };

        let search = photos.search_photos(&search_query, PHOTOS_PER_SEARCH);
        let reason = match tokio::time::timeout(self.search_timeout + SEARCH_GRACE, search).await {
            Ok(Ok(results)) if !results.is_empty() => {
                return from_stock_photo(pick_photo(results), &search_query);
            }
            Ok(Ok(_)) => FallbackReason::NoResults,
            Ok(Err(err)) => {
                warn!(query = %search_query, error = %err, "Stock photo search failed; using fallback");
                FallbackReason::UpstreamError
            }
            Err(_) => {
                warn!(query = %search_query, "Stock photo search overran its deadline; using fallback");
                FallbackReason::UpstreamError
            }
        };
        fallback::image_for(search_word, reason)
    }
}

fn required_word(word: &str) -> Result<&str, ServiceError> {
    let word = word.trim();
    if word.is_empty() {
        return Err(ServiceError::InvalidInput("word not provided".to_string()));
    }
    Ok(word)
}

/// Uniform pick among the first three results.
fn pick_photo(mut results: Vec<StockPhoto>) -> StockPhoto {
    let bound = results.len().min(PHOTOS_PER_SEARCH as usize);
    let index = rand::thread_rng().gen_range(0..bound);
    results.swap_remove(index)
}

fn from_stock_photo(photo: StockPhoto, query: &str) -> ImageResult {
    ImageResult {
        image_url: photo.regular_url,
        thumbnail_url: photo.small_url,
        description: photo.alt_description.unwrap_or_else(|| query.to_string()),
        attribution: Some(Attribution {
            photographer: photo.photographer,
            username: photo.username,
            profile_url: photo.profile_url,
        }),
        using_fallback: false,
        reason: None,
    }
}
