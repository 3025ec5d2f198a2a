//! Scripted in-memory browser session for tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::traits::{BrowserSession, DriverResult, FrameContext, SessionLauncher, UrlMatch};
use crate::error::DriverError;
use crate::parser::types::WaitState;
use crate::runner::diagnostics::DiagnosticLog;
use crate::utils::config::RunConfig;

#[derive(Debug)]
struct MockState {
    url: String,
    title: String,
    title_fails: bool,
    screenshot_fails: bool,
    timeout_ms: u64,
    texts: HashMap<String, String>,
    values: HashMap<String, String>,
    missing: HashSet<String>,
    frame_available: bool,
    frame_failures: u32,
    frame_attempts: u32,
    calls: Vec<String>,
    pauses: Vec<Duration>,
    close_count: u32,
    opened_with: Option<RunConfig>,
}

impl Default for MockState {
    fn default() -> Self {
        Self {
            url: "about:blank".to_string(),
            title: String::new(),
            title_fails: false,
            screenshot_fails: false,
            timeout_ms: 15000,
            texts: HashMap::new(),
            values: HashMap::new(),
            missing: HashSet::new(),
            frame_available: true,
            frame_failures: 0,
            frame_attempts: 0,
            calls: Vec::new(),
            pauses: Vec::new(),
            close_count: 0,
            opened_with: None,
        }
    }
}

/// Clones share state, so a test can keep a handle to a session it gave away.
#[derive(Debug, Clone, Default)]
pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl MockSession {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap()
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }

    fn timeout(&self, target: &str) -> DriverError {
        DriverError::Timeout {
            target: target.to_string(),
            timeout_ms: self.state().timeout_ms,
        }
    }

    pub fn set_url(&self, url: &str) {
        self.state().url = url.to_string();
    }

    pub fn set_title(&self, title: &str) {
        self.state().title = title.to_string();
    }

    pub fn set_text(&self, selector: &str, text: &str) {
        self.state().texts.insert(selector.to_string(), text.to_string());
    }

    /// Operations on `selector` time out
    pub fn make_missing(&self, selector: &str) {
        self.state().missing.insert(selector.to_string());
    }

    pub fn fail_title(&self) {
        self.state().title_fails = true;
    }

    pub fn fail_screenshots(&self) {
        self.state().screenshot_fails = true;
    }

    pub fn without_frame_content(&self) {
        self.state().frame_available = false;
    }

    /// The first `count` fills inside a frame fail
    pub fn fail_frame_fills(&self, count: u32) {
        self.state().frame_failures = count;
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn pauses(&self) -> Vec<Duration> {
        self.state().pauses.clone()
    }

    pub fn frame_attempts(&self) -> u32 {
        self.state().frame_attempts
    }

    pub fn value_of(&self, selector: &str) -> Option<String> {
        self.state().values.get(selector).cloned()
    }

    pub fn close_count(&self) -> u32 {
        self.state().close_count
    }

    pub fn opened_with(&self) -> Option<RunConfig> {
        self.state().opened_with.clone()
    }
}

struct MockFrame {
    session: MockSession,
}

#[async_trait]
impl FrameContext for MockFrame {
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        let mut state = self.session.state();
        state.frame_attempts += 1;
        state.calls.push(format!("frame fill {}", selector));
        if state.frame_attempts <= state.frame_failures {
            return Err(DriverError::Other(format!(
                "Element is not editable (attempt {})",
                state.frame_attempts
            )));
        }
        state.values.insert(selector.to_string(), value.to_string());
        Ok(())
    }
}

#[async_trait]
impl BrowserSession for MockSession {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        self.record(format!("goto {}", url));
        if self.state().missing.contains(url) {
            return Err(DriverError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_REFUSED".to_string(),
            });
        }
        self.set_url(url);
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.record(format!("fill {}", selector));
        if self.state().missing.contains(selector) {
            return Err(self.timeout(selector));
        }
        self.state()
            .values
            .insert(selector.to_string(), value.to_string());
        Ok(())
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        self.record(format!("click {}", selector));
        if self.state().missing.contains(selector) {
            return Err(self.timeout(selector));
        }
        Ok(())
    }

    async fn click_text(&self, text: &str) -> DriverResult<()> {
        self.record(format!("click text={}", text));
        if self.state().missing.contains(text) {
            return Err(self.timeout(text));
        }
        Ok(())
    }

    async fn wait_for_url(&self, expected: &UrlMatch) -> DriverResult<()> {
        self.record(format!("wait-for-url {}", expected));
        let url = self.state().url.clone();
        if expected.matches(&url) {
            Ok(())
        } else {
            Err(self.timeout(&format!("URL to {}", expected)))
        }
    }

    async fn wait_for_selector(&self, selector: &str, state: WaitState) -> DriverResult<()> {
        self.record(format!("wait-for-selector {} {}", selector, state.as_str()));
        if self.state().missing.contains(selector) {
            return Err(self.timeout(selector));
        }
        Ok(())
    }

    async fn wait_for_text(&self, selector: &str, text: &str) -> DriverResult<()> {
        self.record(format!("wait-for-text {} {}", selector, text));
        let found = self
            .state()
            .texts
            .get(selector)
            .map(|t| t.contains(text))
            .unwrap_or(false);
        if found {
            Ok(())
        } else {
            Err(self.timeout(selector))
        }
    }

    async fn pause(&self, duration: Duration) {
        self.state().pauses.push(duration);
        tokio::time::sleep(duration).await;
    }

    async fn frame(&self, iframe_selector: &str) -> DriverResult<Option<Box<dyn FrameContext>>> {
        self.record(format!("frame {}", iframe_selector));
        if self.state().missing.contains(iframe_selector) {
            return Err(self.timeout(iframe_selector));
        }
        if !self.state().frame_available {
            return Ok(None);
        }
        Ok(Some(Box::new(MockFrame {
            session: self.clone(),
        })))
    }

    async fn text_content(&self, selector: &str) -> DriverResult<Option<String>> {
        self.record(format!("text-content {}", selector));
        if self.state().missing.contains(selector) {
            return Err(DriverError::NotFound {
                selector: selector.to_string(),
            });
        }
        Ok(self.state().texts.get(selector).cloned())
    }

    async fn current_url(&self) -> DriverResult<String> {
        Ok(self.state().url.clone())
    }

    async fn title(&self) -> DriverResult<String> {
        let state = self.state();
        if state.title_fails {
            return Err(DriverError::Other("Target page has been closed".to_string()));
        }
        Ok(state.title.clone())
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        self.record(format!("screenshot {}", path.display()));
        if self.state().screenshot_fails {
            return Err(DriverError::Other("screenshot failed".to_string()));
        }
        std::fs::write(path, b"\x89PNG").map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn close(&self) -> DriverResult<()> {
        self.state().close_count += 1;
        Ok(())
    }
}

/// Hands out a shared [`MockSession`] and replays scripted page events into the run's log
#[derive(Debug, Default)]
pub struct MockLauncher {
    pub session: MockSession,
    pub console: Vec<(String, String)>,
    pub page_errors: Vec<String>,
    pub fail_launch: bool,
    /// Simulated browser start-up time
    pub launch_delay: Duration,
}

impl MockLauncher {
    pub fn new(session: MockSession) -> Self {
        Self {
            session,
            ..Default::default()
        }
    }
}

#[async_trait]
impl SessionLauncher for MockLauncher {
    async fn open(
        &self,
        config: &RunConfig,
        diagnostics: DiagnosticLog,
    ) -> anyhow::Result<Box<dyn BrowserSession>> {
        tokio::time::sleep(self.launch_delay).await;
        if self.fail_launch {
            anyhow::bail!("Failed to launch browser");
        }
        {
            let mut state = self.session.state();
            state.opened_with = Some(config.clone());
            state.timeout_ms = config.timeout_ms;
        }
        for (kind, text) in &self.console {
            diagnostics.push_console(kind.as_str(), text.as_str());
        }
        for message in &self.page_errors {
            diagnostics.push_page_error(message.as_str());
        }
        Ok(Box::new(self.session.clone()))
    }
}
