pub mod http_fetcher;
pub mod parallel;

use async_trait::async_trait;

use crate::app::Result;

#[derive(Debug)]
pub enum FetchResult {
    /// New content fetched successfully
    Content { body: Vec<u8> },
    /// The server answered with a non-success status
    ServerError { status: u16 },
}

/// A GET request with optional cookies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FetchRequest {
    pub url: String,
    pub cookies: Vec<(String, String)>,
}

impl FetchRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.cookies.push((name.into(), value.into()));
        self
    }

    /// Value for a single `Cookie` header, if any cookies are set.
    pub fn cookie_header(&self) -> Option<String> {
        if self.cookies.is_empty() {
            return None;
        }

        Some(
            self.cookies
                .iter()
                .map(|(name, value)| format!("{}={}", name, value))
                .collect::<Vec<_>>()
                .join("; "),
        )
    }
}

impl From<&str> for FetchRequest {
    fn from(url: &str) -> Self {
        Self::get(url)
    }
}

impl From<&String> for FetchRequest {
    fn from(url: &String) -> Self {
        Self::get(url.as_str())
    }
}

impl From<String> for FetchRequest {
    fn from(url: String) -> Self {
        Self::get(url)
    }
}

#[async_trait]
pub trait Fetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResult>;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cookie_header() {
        assert_eq!(FetchRequest::get("https://a.4cdn.org/boards.json").cookie_header(), None);

        let request = FetchRequest::from("https://a.4cdn.org/boards.json")
            .with_cookie("pass_id", "abc")
            .with_cookie("pass_enabled", "1");
        assert_eq!(
            request.cookie_header().as_deref(),
            Some("pass_id=abc; pass_enabled=1")
        );
    }
}
