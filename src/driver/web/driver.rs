//! Browser session backed by Playwright
//!
//! [`WebLauncher`] starts one browser per run. The resulting [`WebSession`]
//! owns the browser, its context and a single page, and forwards page
//! console messages and uncaught errors into the run's [`DiagnosticLog`]
//! until it is closed.

use anyhow::{Context, Result};
use async_trait::async_trait;
use colored::Colorize;
use futures::StreamExt;
use playwright::api::frame::FrameState;
use playwright::api::page::Event;
use playwright::api::{Browser, BrowserContext, Frame, Page, Viewport};
use playwright::Playwright;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::driver::traits::{
    BrowserSession, DriverResult, FrameContext, SessionLauncher, UrlMatch,
};
use crate::error::DriverError;
use crate::parser::types::WaitState;
use crate::runner::diagnostics::DiagnosticLog;
use crate::utils::config::RunConfig;

/// Environment variable naming a browser executable to launch
pub const BROWSER_PATH_ENV: &str = "FLOW_BROWSER_PATH";

/// Poll interval for URL waits
const URL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Web browser type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BrowserType {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl BrowserType {
    pub fn parse(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Some(BrowserType::Chromium),
            "firefox" => Some(BrowserType::Firefox),
            "webkit" => Some(BrowserType::Webkit),
            _ => None,
        }
    }
}

/// Launch options for a run's browser
#[derive(Debug, Clone)]
pub struct WebLauncherConfig {
    pub browser_type: BrowserType,
    pub headless: bool,
    /// Delay applied to every browser operation
    pub slow_mo_ms: u64,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub executable: Option<PathBuf>,
}

impl Default for WebLauncherConfig {
    fn default() -> Self {
        Self {
            browser_type: BrowserType::Chromium,
            headless: true,
            slow_mo_ms: 0,
            viewport_width: 1280,
            viewport_height: 720,
            executable: std::env::var(BROWSER_PATH_ENV).ok().map(PathBuf::from),
        }
    }
}

/// Opens Playwright sessions
#[derive(Debug, Clone, Default)]
pub struct WebLauncher {
    config: WebLauncherConfig,
}

impl WebLauncher {
    pub fn new(config: WebLauncherConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionLauncher for WebLauncher {
    async fn open(
        &self,
        run: &RunConfig,
        diagnostics: DiagnosticLog,
    ) -> Result<Box<dyn BrowserSession>> {
        let session = WebSession::launch(&self.config, run, diagnostics).await?;
        Ok(Box::new(session))
    }
}

/// One browser, one context, one page
pub struct WebSession {
    #[allow(dead_code)]
    playwright: Arc<Playwright>,
    browser: Arc<Browser>,
    #[allow(dead_code)]
    context: Arc<BrowserContext>,
    page: Arc<Mutex<Page>>,
    timeout_ms: u64,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl WebSession {
    pub async fn launch(
        config: &WebLauncherConfig,
        run: &RunConfig,
        diagnostics: DiagnosticLog,
    ) -> Result<Self> {
        let playwright = Playwright::initialize()
            .await
            .context("Failed to initialize Playwright")?;

        let browser = match config.browser_type {
            BrowserType::Chromium => launch_chromium_browser(&playwright.chromium(), config).await?,
            BrowserType::Firefox => playwright
                .firefox()
                .launcher()
                .headless(config.headless)
                .slowmo(config.slow_mo_ms as f64)
                .launch()
                .await
                .context("Failed to launch Firefox")?,
            BrowserType::Webkit => playwright
                .webkit()
                .launcher()
                .headless(config.headless)
                .slowmo(config.slow_mo_ms as f64)
                .launch()
                .await
                .context("Failed to launch WebKit")?,
        };

        let context = browser
            .context_builder()
            .build()
            .await
            .context("Failed to create browser context")?;
        context
            .set_default_timeout(run.timeout_ms.min(u32::MAX as u64) as u32)
            .await
            .context("Failed to set default timeout")?;

        let page = context.new_page().await.context("Failed to open page")?;
        page.set_viewport_size(Viewport {
            width: config.viewport_width as i32,
            height: config.viewport_height as i32,
        })
        .await?;

        let listener = spawn_page_listener(&page, diagnostics)?;

        Ok(Self {
            playwright: Arc::new(playwright),
            browser: Arc::new(browser),
            context: Arc::new(context),
            page: Arc::new(Mutex::new(page)),
            timeout_ms: run.timeout_ms,
            listener: std::sync::Mutex::new(Some(listener)),
        })
    }

    fn timeout(&self, target: impl Into<String>) -> DriverError {
        DriverError::Timeout {
            target: target.into(),
            timeout_ms: self.timeout_ms,
        }
    }

    /// Map a Playwright failure on `target` into a [`DriverError`]
    fn classify(&self, target: &str, error: impl Display) -> DriverError {
        let message = error.to_string();
        let lower = message.to_ascii_lowercase();
        if lower.contains("timeout") {
            self.timeout(target)
        } else if lower.contains("no node found")
            || lower.contains("failed to find element")
            || lower.contains("element is not attached")
        {
            DriverError::NotFound {
                selector: target.to_string(),
            }
        } else {
            DriverError::Other(message)
        }
    }

    fn stop_listener(&self) {
        let handle = self
            .listener
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.abort();
        }
    }
}

/// Feed console messages and page errors into `diagnostics` until aborted
fn spawn_page_listener(page: &Page, diagnostics: DiagnosticLog) -> Result<JoinHandle<()>> {
    let events = page
        .subscribe_event()
        .context("Failed to subscribe to page events")?;

    Ok(tokio::spawn(async move {
        futures::pin_mut!(events);
        while let Some(event) = events.next().await {
            match event {
                Ok(Event::Console(message)) => {
                    let kind = message.r#type().unwrap_or_else(|_| "log".to_string());
                    let text = message.text().unwrap_or_default();
                    diagnostics.push_console(kind, text);
                }
                Ok(Event::PageError { .. }) => {
                    diagnostics.push_page_error("Uncaught exception in page");
                }
                Ok(_) => {}
                Err(e) => log::debug!("Page event stream lagged: {}", e),
            }
        }
    }))
}

fn wait_state(state: WaitState) -> FrameState {
    match state {
        WaitState::Attached => FrameState::Attached,
        WaitState::Detached => FrameState::Detached,
        WaitState::Visible => FrameState::Visible,
        WaitState::Hidden => FrameState::Hidden,
    }
}

/// Content document of an iframe
struct WebFrame {
    frame: Frame,
    timeout_ms: u64,
}

#[async_trait]
impl FrameContext for WebFrame {
    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        self.frame
            .fill_builder(selector, value)
            .fill()
            .await
            .map_err(|e| {
                let message = e.to_string();
                if message.to_ascii_lowercase().contains("timeout") {
                    DriverError::Timeout {
                        target: selector.to_string(),
                        timeout_ms: self.timeout_ms,
                    }
                } else {
                    DriverError::Other(message)
                }
            })
    }
}

#[async_trait]
impl BrowserSession for WebSession {
    async fn goto(&self, url: &str) -> DriverResult<()> {
        let page = self.page.lock().await;
        page.goto_builder(url)
            .goto()
            .await
            .map_err(|e| match self.classify(url, &e) {
                DriverError::Other(message) => DriverError::Navigation {
                    url: url.to_string(),
                    message,
                },
                other => other,
            })?;
        Ok(())
    }

    async fn fill(&self, selector: &str, value: &str) -> DriverResult<()> {
        let page = self.page.lock().await;
        page.fill_builder(selector, value)
            .fill()
            .await
            .map_err(|e| self.classify(selector, e))
    }

    async fn click(&self, selector: &str) -> DriverResult<()> {
        let page = self.page.lock().await;
        page.click_builder(selector)
            .click()
            .await
            .map_err(|e| self.classify(selector, e))
    }

    async fn click_text(&self, text: &str) -> DriverResult<()> {
        let page = self.page.lock().await;
        let selector = format!("text={}", text);
        page.click_builder(&selector)
            .click()
            .await
            .map_err(|e| self.classify(&selector, e))
    }

    async fn wait_for_url(&self, expected: &UrlMatch) -> DriverResult<()> {
        let started = Instant::now();
        let limit = Duration::from_millis(self.timeout_ms);
        loop {
            let current = {
                let page = self.page.lock().await;
                page.url().map_err(|e| DriverError::Other(e.to_string()))?
            };
            if expected.matches(&current) {
                return Ok(());
            }
            if started.elapsed() >= limit {
                return Err(self.timeout(format!("URL to {}", expected)));
            }
            tokio::time::sleep(URL_POLL_INTERVAL).await;
        }
    }

    async fn wait_for_selector(&self, selector: &str, state: WaitState) -> DriverResult<()> {
        let page = self.page.lock().await;
        page.wait_for_selector_builder(selector)
            .state(wait_state(state))
            .timeout(self.timeout_ms as f64)
            .wait_for_selector()
            .await
            .map_err(|e| self.classify(selector, e))?;
        Ok(())
    }

    async fn wait_for_text(&self, selector: &str, text: &str) -> DriverResult<()> {
        let quoted = serde_json::to_string(text).map_err(|e| DriverError::Other(e.to_string()))?;
        let combined = format!("{}:has-text({})", selector, quoted);
        let page = self.page.lock().await;
        page.wait_for_selector_builder(&combined)
            .timeout(self.timeout_ms as f64)
            .wait_for_selector()
            .await
            .map_err(|e| self.classify(&combined, e))?;
        Ok(())
    }

    async fn frame(&self, iframe_selector: &str) -> DriverResult<Option<Box<dyn FrameContext>>> {
        let page = self.page.lock().await;
        let element = page
            .wait_for_selector_builder(iframe_selector)
            .state(FrameState::Attached)
            .timeout(self.timeout_ms as f64)
            .wait_for_selector()
            .await
            .map_err(|e| self.classify(iframe_selector, e))?
            .ok_or_else(|| DriverError::NotFound {
                selector: iframe_selector.to_string(),
            })?;

        let frame = element
            .content_frame()
            .await
            .map_err(|e| self.classify(iframe_selector, e))?;

        Ok(frame.map(|frame| {
            Box::new(WebFrame {
                frame,
                timeout_ms: self.timeout_ms,
            }) as Box<dyn FrameContext>
        }))
    }

    async fn text_content(&self, selector: &str) -> DriverResult<Option<String>> {
        let page = self.page.lock().await;
        page.text_content(selector, None)
            .await
            .map_err(|e| self.classify(selector, e))
    }

    async fn current_url(&self) -> DriverResult<String> {
        let page = self.page.lock().await;
        page.url().map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn title(&self) -> DriverResult<String> {
        let page = self.page.lock().await;
        page.title()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))
    }

    async fn screenshot(&self, path: &Path) -> DriverResult<()> {
        let page = self.page.lock().await;
        page.screenshot_builder()
            .path(path.to_path_buf())
            .screenshot()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))?;
        Ok(())
    }

    async fn close(&self) -> DriverResult<()> {
        self.stop_listener();
        self.browser
            .close()
            .await
            .map_err(|e| DriverError::Other(e.to_string()))
    }
}

impl Drop for WebSession {
    fn drop(&mut self) {
        self.stop_listener();
    }
}

/// Launch Chromium, preferring an explicit or installed browser executable
async fn launch_chromium_browser(
    chromium: &playwright::api::BrowserType,
    config: &WebLauncherConfig,
) -> Result<Browser> {
    let mut launcher = chromium
        .launcher()
        .headless(config.headless)
        .slowmo(config.slow_mo_ms as f64);

    let system_path = find_system_browser();
    if let Some(ref path) = config.executable {
        log::info!("Using browser from {}: {}", BROWSER_PATH_ENV, path.display());
        launcher = launcher.executable(path);
    } else if let Some(ref path) = system_path {
        log::info!("Using discovered browser: {}", path.display());
        launcher = launcher.executable(path);
    } else {
        println!(
            "{} No browser executable found. Attempting default launch...",
            "ℹ".blue()
        );
    }

    let args: Vec<String> = [
        "--no-sandbox",
        "--disable-setuid-sandbox",
        "--disable-dev-shm-usage",
        "--disable-gpu",
        "--ignore-certificate-errors",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    launcher = launcher.args(&args);

    launcher.launch().await.context("Failed to launch Chromium")
}

fn find_system_browser() -> Option<PathBuf> {
    let common_paths = [
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
        "/Applications/Microsoft Edge.app/Contents/MacOS/Microsoft Edge",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
    ];

    common_paths
        .iter()
        .map(Path::new)
        .find(|p| p.exists())
        .map(Path::to_path_buf)
}
