//! Failure diagnostics
//!
//! A [`DiagnosticLog`] is created by the runner for one run and handed to the
//! browser session, which appends console messages and page errors to it for
//! as long as the session is open. When a step fails the runner turns the
//! log plus the page state into a [`DiagnosticSnapshot`].

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::driver::traits::BrowserSession;
use crate::error::FailureCategory;
use crate::parser::types::Step;

/// Number of console entries kept in a snapshot
pub const SNAPSHOT_CONSOLE_LIMIT: usize = 20;

/// Console errors and warnings shown in the verbose dump
pub const DUMP_CONSOLE_LIMIT: usize = 10;

/// Page errors shown in the verbose dump
const DUMP_PAGE_ERROR_LIMIT: usize = 5;

/// Placeholder for page details that could not be read
pub const UNKNOWN: &str = "unknown";

/// A browser console message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleEntry {
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

impl ConsoleEntry {
    pub fn is_problem(&self) -> bool {
        matches!(self.kind.as_str(), "error" | "warning")
    }
}

#[derive(Debug, Default)]
struct Buffers {
    console: Vec<ConsoleEntry>,
    page_errors: Vec<String>,
}

/// Append-only console and page-error log shared with a session's listeners
#[derive(Debug, Clone, Default)]
pub struct DiagnosticLog {
    inner: Arc<Mutex<Buffers>>,
}

impl DiagnosticLog {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffers(&self) -> MutexGuard<'_, Buffers> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_console(&self, kind: impl Into<String>, text: impl Into<String>) {
        self.buffers().console.push(ConsoleEntry {
            kind: kind.into(),
            text: text.into(),
        });
    }

    pub fn push_page_error(&self, message: impl Into<String>) {
        self.buffers().page_errors.push(message.into());
    }

    /// The last `limit` console entries, oldest first
    pub fn recent_console(&self, limit: usize) -> Vec<ConsoleEntry> {
        let buffers = self.buffers();
        let start = buffers.console.len().saturating_sub(limit);
        buffers.console[start..].to_vec()
    }

    /// The last `limit` errors and warnings across the whole log, oldest first
    pub fn recent_problems(&self, limit: usize) -> Vec<ConsoleEntry> {
        let buffers = self.buffers();
        let mut problems: Vec<ConsoleEntry> = buffers
            .console
            .iter()
            .rev()
            .filter(|entry| entry.is_problem())
            .take(limit)
            .cloned()
            .collect();
        problems.reverse();
        problems
    }

    pub fn page_errors(&self) -> Vec<String> {
        self.buffers().page_errors.clone()
    }
}

/// Page state captured when a step fails
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiagnosticSnapshot {
    pub page_url: String,
    pub page_title: String,
    pub step_definition: Step,
    pub console_logs: Vec<ConsoleEntry>,
    pub page_errors: Vec<String>,
}

/// Build a snapshot for a failed step. Never fails.
pub async fn capture_snapshot(
    session: &dyn BrowserSession,
    step: &Step,
    log: &DiagnosticLog,
) -> DiagnosticSnapshot {
    let page = match (session.current_url().await, session.title().await) {
        (Ok(url), Ok(title)) => (url, title),
        (url, title) => {
            log::warn!(
                "Could not read page state: url={:?} title={:?}",
                url.err(),
                title.err()
            );
            (UNKNOWN.to_string(), UNKNOWN.to_string())
        }
    };

    DiagnosticSnapshot {
        page_url: page.0,
        page_title: page.1,
        step_definition: step.clone(),
        console_logs: log.recent_console(SNAPSHOT_CONSOLE_LIMIT),
        page_errors: log.page_errors(),
    }
}

/// Where the failure screenshot for step `index` (1-based) goes
pub fn failure_screenshot_path(dir: &Path, flow_name: Option<&str>, index: usize) -> PathBuf {
    let safe_name: String = flow_name
        .unwrap_or("flow")
        .chars()
        .map(|c| if matches!(c, '/' | '\\' | ':') { '_' } else { c })
        .collect();
    dir.join(format!("{}_step-{}.png", safe_name, index))
}

/// Save a screenshot of the failing page.
///
/// The caller treats an error as a warning; it never replaces the step error.
pub async fn capture_failure_screenshot(
    session: &dyn BrowserSession,
    dir: &Path,
    flow_name: Option<&str>,
    index: usize,
) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = failure_screenshot_path(dir, flow_name, index);
    session.screenshot(&path).await?;
    Ok(path)
}

/// Suggestions printed for a failure class
pub fn diagnosis_hints(category: FailureCategory) -> &'static [&'static str] {
    match category {
        FailureCategory::Timeout => &[
            "LIKELY CAUSE: Element not found on page",
            "CHECK: Is the selector correct? Is the element visible?",
            "TRY: Run with --headless=false to watch the browser",
        ],
        FailureCategory::NotFound => &[
            "LIKELY CAUSE: Text or element does not exist",
            "CHECK: Verify the page content matches expectations",
        ],
    }
}

/// Render the verbose debug dump for a failed step.
///
/// `console_problems` comes from [`DiagnosticLog::recent_problems`] so that
/// errors older than the snapshot window still show up.
pub fn render_debug_info(
    flow_path: &Path,
    snapshot: &DiagnosticSnapshot,
    console_problems: &[ConsoleEntry],
    category: Option<FailureCategory>,
) -> Vec<String> {
    let mut lines = vec![
        "--- DEBUG INFO ---".to_string(),
        format!("Flow file: {}", flow_path.display()),
        format!("Current URL: {}", snapshot.page_url),
        format!("Page title: {}", snapshot.page_title),
        String::new(),
        "Failed step definition:".to_string(),
    ];

    match serde_yaml::to_string(&snapshot.step_definition) {
        Ok(yaml) => lines.extend(yaml.lines().map(|l| format!("  {}", l))),
        Err(e) => lines.push(format!("  <unprintable step: {}>", e)),
    }

    lines.push("--- DIAGNOSIS ---".to_string());
    if let Some(category) = category {
        lines.extend(diagnosis_hints(category).iter().map(|s| s.to_string()));
    }

    let problems: Vec<&ConsoleEntry> = console_problems
        .iter()
        .filter(|entry| entry.is_problem())
        .collect();
    if !problems.is_empty() {
        lines.push(String::new());
        lines.push("--- BROWSER CONSOLE ERRORS ---".to_string());
        let start = problems.len().saturating_sub(DUMP_CONSOLE_LIMIT);
        for entry in &problems[start..] {
            lines.push(format!("[{}] {}", entry.kind, entry.text));
        }
    }

    if !snapshot.page_errors.is_empty() {
        lines.push(String::new());
        lines.push("--- PAGE ERRORS ---".to_string());
        let start = snapshot.page_errors.len().saturating_sub(DUMP_PAGE_ERROR_LIMIT);
        lines.extend(snapshot.page_errors[start..].iter().cloned());
    }

    lines.push(String::new());
    lines.push("TO FIX:".to_string());
    lines.push(format!(
        "- If selector is wrong: Update {}",
        flow_path.display()
    ));
    lines.push("- If page is wrong: Check your app's behavior".to_string());
    lines.push("- If runner is wrong: File an issue with the flow and this output".to_string());
    lines.push("------------------".to_string());
    lines
}
