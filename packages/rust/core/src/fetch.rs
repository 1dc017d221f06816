//! Inbound page sources.
//!
//! The pipeline never fetches on its own; callers hand it markup obtained
//! through a [`PageSource`].

use std::future::Future;
use std::time::Duration;

use reqwest::Client;
use tracing::{debug, instrument};

use cloneforge_shared::{CloneForgeError, FetchConfig, Result};

/// Maximum number of redirects to follow.
const MAX_REDIRECTS: usize = 5;

/// Supplies raw markup for a URL.
pub trait PageSource: Send + Sync {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String>> + Send;
}

/// [`PageSource`] over plain HTTP(S).
#[derive(Debug, Clone)]
pub struct HttpPageSource {
    client: Client,
}

impl HttpPageSource {
    /// Build a client honoring the configured timeout and user agent.
    pub fn new(config: &FetchConfig) -> Result<Self> {
        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| CloneForgeError::Network(format!("client build: {e}")))?;
        Ok(Self { client })
    }
}

impl PageSource for HttpPageSource {
    #[instrument(skip(self), fields(url = %url))]
    async fn fetch(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| CloneForgeError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(CloneForgeError::Network(format!("{url}: HTTP {status}")));
        }

        let body = response
            .text()
            .await
            .map_err(|e| CloneForgeError::Network(format!("{url}: {e}")))?;
        debug!(bytes = body.len(), "page fetched");
        Ok(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> HttpPageSource {
        HttpPageSource::new(&FetchConfig {
            timeout_secs: 5,
            user_agent: "cloneforge-test".into(),
        })
        .unwrap()
    }

    #[tokio::test]
    async fn fetches_page_body() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::method("GET"))
            .and(wiremock::matchers::path("/tools/notion"))
            .and(wiremock::matchers::header("user-agent", "cloneforge-test"))
            .respond_with(wiremock::ResponseTemplate::new(200).set_body_string("<h1>Notion</h1>"))
            .mount(&server)
            .await;

        let body = source()
            .fetch(&format!("{}/tools/notion", server.uri()))
            .await
            .unwrap();
        assert_eq!(body, "<h1>Notion</h1>");
    }

    #[tokio::test]
    async fn http_errors_are_network_errors() {
        let server = wiremock::MockServer::start().await;
        wiremock::Mock::given(wiremock::matchers::path("/missing"))
            .respond_with(wiremock::ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = source()
            .fetch(&format!("{}/missing", server.uri()))
            .await
            .unwrap_err();
        assert!(matches!(err, CloneForgeError::Network(_)));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("404"));
    }
}
