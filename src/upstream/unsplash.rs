use super::{PhotoSearch, StockPhoto, status_error, transport_error, trim_base};
use crate::error::{BadRequest, ServiceError};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

const SERVICE: &str = "Unsplash";
const BAD_REQUEST: BadRequest = BadRequest::Failure;

/// Unsplash photo search, landscape orientation only.
#[derive(Clone)]
pub struct UnsplashClient {
    http: reqwest::Client,
    access_key: String,
    base_url: String,
    timeout: Duration,
}

impl UnsplashClient {
    pub fn new(
        http: reqwest::Client,
        access_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            http,
            access_key: access_key.into(),
            base_url: base_url.into(),
            timeout,
        }
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<Photo>,
}

#[derive(Deserialize)]
struct Photo {
    urls: Option<PhotoUrls>,
    alt_description: Option<String>,
    user: Option<PhotoUser>,
}

#[derive(Deserialize)]
struct PhotoUrls {
    regular: Option<String>,
    small: Option<String>,
}

#[derive(Deserialize)]
struct PhotoUser {
    name: Option<String>,
    username: Option<String>,
    links: Option<UserLinks>,
}

#[derive(Deserialize)]
struct UserLinks {
    html: Option<String>,
}

impl Photo {
    fn into_stock_photo(self) -> Option<StockPhoto> {
        let urls = self.urls?;
        let regular_url = urls.regular.filter(|url| !url.is_empty())?;
        let (photographer, username, profile_url) = match self.user {
            Some(user) => (
                user.name.unwrap_or_default(),
                user.username.unwrap_or_default(),
                user.links.and_then(|links| links.html).unwrap_or_default(),
            ),
            None => Default::default(),
        };
        Some(StockPhoto {
            regular_url,
            small_url: urls.small.filter(|url| !url.is_empty()),
            alt_description: self.alt_description.filter(|text| !text.trim().is_empty()),
            photographer,
            username,
            profile_url,
        })
    }
}

#[async_trait]
impl PhotoSearch for UnsplashClient {
    async fn search_photos(&self, query: &str, per_page: u8) -> Result<Vec<StockPhoto>, ServiceError> {
        debug!(query, per_page, "Searching Unsplash");
        let per_page = per_page.to_string();
        let response = self
            .http
            .get(format!("{}/search/photos", trim_base(&self.base_url)))
            .query(&[
                ("query", query),
                ("per_page", per_page.as_str()),
                ("orientation", "landscape"),
            ])
            .header("Authorization", format!("Client-ID {}", self.access_key))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|err| transport_error(SERVICE, self.timeout, BAD_REQUEST, err))?;
        if !response.status().is_success() {
            return Err(status_error(SERVICE, self.timeout, BAD_REQUEST, response).await);
        }
        let payload: SearchResponse = response
            .json()
            .await
            .map_err(|err| transport_error(SERVICE, self.timeout, BAD_REQUEST, err))?;
        Ok(payload
            .results
            .into_iter()
            .filter_map(Photo::into_stock_photo)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upstream::testing;
    use axum::{Json, Router, extract::Query, http::HeaderMap, routing::get};
    use serde_json::json;
    use std::collections::HashMap;

    fn client(base: &str, timeout: Duration) -> UnsplashClient {
        UnsplashClient::new(reqwest::Client::new(), "access", base, timeout)
    }

    #[tokio::test]
    async fn sends_query_and_maps_photos() {
        let router = Router::new().route(
            "/search/photos",
            get(|headers: HeaderMap, Query(params): Query<HashMap<String, String>>| async move {
                assert_eq!(headers["authorization"], "Client-ID access");
                assert_eq!(params["query"], "ancient library");
                assert_eq!(params["per_page"], "3");
                assert_eq!(params["orientation"], "landscape");
                Json(json!({
                    "results": [
                        {
                            "urls": {"regular": "https://u/r1", "small": "https://u/s1"},
                            "alt_description": "scrolls",
                            "user": {"name": "Ana", "username": "ana", "links": {"html": "https://u/@ana"}}
                        },
                        {"urls": {"small": "https://u/s2"}},
                        {"urls": {"regular": "https://u/r3"}}
                    ]
                }))
            }),
        );
        let base = testing::spawn(router).await;
        let photos = client(&base, Duration::from_secs(5))
            .search_photos("ancient library", 3)
            .await
            .unwrap();
        assert_eq!(photos.len(), 2);
        assert_eq!(photos[0].regular_url, "https://u/r1");
        assert_eq!(photos[0].small_url.as_deref(), Some("https://u/s1"));
        assert_eq!(photos[0].photographer, "Ana");
        assert_eq!(photos[0].profile_url, "https://u/@ana");
        assert_eq!(photos[1].regular_url, "https://u/r3");
        assert!(photos[1].alt_description.is_none());
        assert!(photos[1].username.is_empty());
    }

    #[tokio::test]
    async fn unauthorized_is_an_upstream_failure() {
        let router = Router::new().route(
            "/search/photos",
            get(|| async { (axum::http::StatusCode::UNAUTHORIZED, "OAuth error") }),
        );
        let base = testing::spawn(router).await;
        let err = client(&base, Duration::from_secs(5))
            .search_photos("x", 3)
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ServiceError::UpstreamFailure { status: Some(401), .. }
        ));
    }
}
