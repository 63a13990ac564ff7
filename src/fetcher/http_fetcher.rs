use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, COOKIE};
use reqwest::Client;
use tracing::{debug, warn};

use crate::app::Result;
use crate::config::HttpConfig;
use crate::fetcher::{FetchRequest, FetchResult, Fetcher};

/// reqwest-backed fetcher shared by every site.
pub struct HttpFetcher {
    client: Client,
}

impl HttpFetcher {
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .gzip(true)
            .brotli(true)
            .user_agent(config.user_agent.as_str())
            .build()?;

        Ok(Self { client })
    }

    fn headers(request: &FetchRequest) -> HeaderMap {
        let mut headers = HeaderMap::new();
        let Some(cookie) = request.cookie_header() else {
            return headers;
        };

        match HeaderValue::from_str(&cookie) {
            Ok(value) => {
                headers.insert(COOKIE, value);
            }
            Err(_) => warn!("Dropping invalid cookie header for {}", request.url),
        }

        headers
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult> {
        let response = self
            .client
            .get(&request.url)
            .headers(Self::headers(request))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            debug!("{} answered {}", request.url, status);
            return Ok(FetchResult::ServerError {
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await?.to_vec();
        Ok(FetchResult::Content { body })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_headers_from_request() {
        let plain = FetchRequest::get("https://a.4cdn.org/g/threads.json");
        assert!(HttpFetcher::headers(&plain).is_empty());

        let request = plain.with_cookie("pass_id", "token");
        let headers = HttpFetcher::headers(&request);
        assert_eq!(headers.get(COOKIE).unwrap(), "pass_id=token");
        assert_eq!(headers.len(), 1);
    }

    #[test]
    fn test_invalid_header_values_are_dropped() {
        let request = FetchRequest::get("https://a.4cdn.org/").with_cookie("pass_id", "bad\nvalue");
        assert!(HttpFetcher::headers(&request).get(COOKIE).is_none());
    }
}
