use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::time::Duration;

use crate::error::DriverError;
use crate::parser::types::WaitState;
use crate::runner::diagnostics::DiagnosticLog;
use crate::utils::config::RunConfig;

pub type DriverResult<T> = std::result::Result<T, DriverError>;

/// URL predicate used by `wait-for-url` and `assert-url`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UrlMatch {
    /// Substring match
    Contains(String),
    /// Exact match
    Equals(String),
}

impl UrlMatch {
    pub fn matches(&self, url: &str) -> bool {
        match self {
            UrlMatch::Contains(part) => url.contains(part.as_str()),
            UrlMatch::Equals(expected) => url == expected,
        }
    }
}

impl fmt::Display for UrlMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UrlMatch::Contains(s) => write!(f, "contain \"{}\"", s),
            UrlMatch::Equals(s) => write!(f, "equal \"{}\"", s),
        }
    }
}

/// A nested document (iframe content) inside a session
#[async_trait]
pub trait FrameContext: Send + Sync {
    /// Set the value of an input inside the frame
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;
}

/// Browser-driving capability used by the step executor
///
/// Every operation is bounded by the timeout the session was opened with.
/// Implementations report failures as [`DriverError`] so callers can tell a
/// timeout from a missing element without reading the message.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    /// Navigate to an absolute URL
    async fn goto(&self, url: &str) -> DriverResult<()>;

    /// Set the value of the element matching `selector`
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()>;

    /// Click the element matching `selector`
    async fn click(&self, selector: &str) -> DriverResult<()>;

    /// Click the first element whose text contains `text`
    ///
    /// Case sensitivity follows the driver's text matching.
    async fn click_text(&self, text: &str) -> DriverResult<()>;

    /// Wait until the current URL satisfies `expected`
    async fn wait_for_url(&self, expected: &UrlMatch) -> DriverResult<()>;

    /// Wait until the element matching `selector` reaches `state`
    async fn wait_for_selector(&self, selector: &str, state: WaitState) -> DriverResult<()>;

    /// Wait for an element matching `selector` whose text contains `text`
    async fn wait_for_text(&self, selector: &str, text: &str) -> DriverResult<()>;

    /// Suspend for a fixed duration
    async fn pause(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }

    /// Wait for an iframe to be attached and return its content document
    ///
    /// # Returns
    /// `None` when the element exists but has no accessible content frame
    async fn frame(&self, iframe_selector: &str) -> DriverResult<Option<Box<dyn FrameContext>>>;

    /// Get the text content of an element, `None` if it has none
    async fn text_content(&self, selector: &str) -> DriverResult<Option<String>>;

    /// Get the current page URL
    async fn current_url(&self) -> DriverResult<String>;

    /// Get the current page title
    async fn title(&self) -> DriverResult<String>;

    /// Capture the viewport to `path`
    async fn screenshot(&self, path: &Path) -> DriverResult<()>;

    /// Release the session and stop its event listeners
    async fn close(&self) -> DriverResult<()>;
}

/// Opens browser sessions for a run
#[async_trait]
pub trait SessionLauncher: Send + Sync {
    /// Open a session whose operations default to `config.timeout_ms`.
    ///
    /// Console messages and page errors observed while the session is open
    /// are appended to `diagnostics`.
    async fn open(
        &self,
        config: &RunConfig,
        diagnostics: DiagnosticLog,
    ) -> anyhow::Result<Box<dyn BrowserSession>>;
}
