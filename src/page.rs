//! Generic web page check: fetch a page and test a condition on its body.

use std::time::Duration;

use async_trait::async_trait;

use crate::fetch::FetchError;
use crate::model::CheckResult;

#[async_trait]
pub trait PageSource: Send + Sync {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError>;
}

pub struct HttpPageSource {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpPageSource {
    pub fn new(client: reqwest::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

#[async_trait]
impl PageSource for HttpPageSource {
    async fn fetch_page(&self, url: &str) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FetchError::Timeout(self.timeout)
                } else {
                    FetchError::Http(e)
                }
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status(status.as_u16()));
        }
        Ok(response.text().await?)
    }
}

/// What has to hold on the page for the check to fire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCondition {
    /// Fires once the body contains the text.
    TextPresent(String),
    /// No condition configured: never fires, reports the page title.
    Unconfigured,
}

impl PageCondition {
    pub fn evaluate(&self, body: &str) -> CheckResult {
        match self {
            PageCondition::TextPresent(text) => {
                if body.contains(text.as_str()) {
                    CheckResult::met(format!("Found text \"{text}\" on the page!"))
                } else {
                    CheckResult::not_met(format!("Text \"{text}\" not found yet"))
                }
            }
            PageCondition::Unconfigured => {
                let title = page_title(body).unwrap_or_default();
                CheckResult::not_met(format!("Waiting for condition... (Page title: {title})"))
            }
        }
    }
}

/// Contents of the first `<title>` element, trimmed.
pub fn page_title(body: &str) -> Option<String> {
    let lower = body.to_ascii_lowercase();
    let open = lower.find("<title")?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find("</title>")?;
    Some(body[start..end].trim().to_string())
}

/// A configured page check: where to look and what to look for.
pub struct PageCheck {
    pub url: String,
    pub condition: PageCondition,
    pub source: std::sync::Arc<dyn PageSource>,
}

impl PageCheck {
    pub async fn run(&self) -> CheckResult {
        tracing::debug!(url = %self.url, "checking page");
        match self.source.fetch_page(&self.url).await {
            Ok(body) => self.condition.evaluate(&body),
            Err(e) => {
                tracing::warn!(url = %self.url, "page check failed: {e}");
                CheckResult::failed(e.to_string())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct StaticPage(Result<&'static str, u16>);

    #[async_trait]
    impl PageSource for StaticPage {
        async fn fetch_page(&self, _url: &str) -> Result<String, FetchError> {
            match self.0 {
                Ok(body) => Ok(body.to_string()),
                Err(code) => Err(FetchError::Status(code)),
            }
        }
    }

    fn check(page: StaticPage, condition: PageCondition) -> PageCheck {
        PageCheck {
            url: "https://example.test/courts".into(),
            condition,
            source: Arc::new(page),
        }
    }

    #[test]
    fn title_extraction() {
        assert_eq!(
            page_title("<html><head><TITLE lang=\"en\"> Courts </TITLE></head></html>"),
            Some("Courts".to_string())
        );
        assert_eq!(page_title("<html></html>"), None);
    }

    #[tokio::test]
    async fn text_present_fires() {
        let c = check(
            StaticPage(Ok("<p>Court 3 available</p>")),
            PageCondition::TextPresent("available".into()),
        );
        let result = c.run().await;
        assert!(result.condition_met);
        assert!(result.message.unwrap().contains("available"));
    }

    #[tokio::test]
    async fn text_absent_waits() {
        let c = check(
            StaticPage(Ok("<p>Fully booked</p>")),
            PageCondition::TextPresent("available".into()),
        );
        let result = c.run().await;
        assert!(!result.condition_met);
        assert!(result.is_success());
    }

    #[tokio::test]
    async fn unconfigured_reports_title() {
        let c = check(
            StaticPage(Ok("<title>Squash Point</title>")),
            PageCondition::Unconfigured,
        );
        let result = c.run().await;
        assert!(!result.condition_met);
        assert_eq!(
            result.message.as_deref(),
            Some("Waiting for condition... (Page title: Squash Point)")
        );
    }

    #[tokio::test]
    async fn fetch_failure_is_reported_as_error() {
        let c = check(StaticPage(Err(503)), PageCondition::Unconfigured);
        let result = c.run().await;
        assert!(!result.condition_met);
        assert_eq!(result.error.as_deref(), Some("unexpected HTTP status 503"));
    }
}
