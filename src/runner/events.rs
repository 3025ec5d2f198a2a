use colored::Colorize;
use std::path::PathBuf;
use tokio::sync::broadcast;

use super::diagnostics::{render_debug_info, ConsoleEntry, DiagnosticSnapshot};
use crate::error::FailureCategory;

/// Run events for real-time progress output
#[derive(Debug, Clone)]
pub enum RunEvent {
    RunStarted {
        flow_name: String,
        flow_path: PathBuf,
        env: String,
        base_url: String,
        headless: bool,
        step_count: usize,
    },
    StepStarted {
        index: usize,
        line: String,
    },
    StepPassed {
        index: usize,
        duration_ms: u64,
    },
    StepFailed {
        index: usize,
        step_type: String,
        error: String,
        duration_ms: u64,
    },
    ScreenshotSaved {
        path: String,
    },
    ScreenshotFailed {
        error: String,
    },
    Diagnostics {
        flow_path: PathBuf,
        snapshot: Box<DiagnosticSnapshot>,
        /// Recent errors and warnings from the whole console log
        console_problems: Vec<ConsoleEntry>,
        category: Option<FailureCategory>,
    },
    RunFinished {
        success: bool,
        duration_ms: u64,
    },
}

/// Event emitter for broadcasting run events
pub struct EventEmitter {
    sender: broadcast::Sender<RunEvent>,
}

impl EventEmitter {
    pub fn new() -> (Self, broadcast::Receiver<RunEvent>) {
        let (sender, receiver) = broadcast::channel(256);
        (Self { sender }, receiver)
    }

    pub fn emit(&self, event: RunEvent) {
        let _ = self.sender.send(event);
    }
}

impl Default for EventEmitter {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(256);
        Self { sender }
    }
}

/// Console event listener for printing real-time updates
pub struct ConsoleEventListener {
    verbose: bool,
}

impl ConsoleEventListener {
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }

    /// Print events until every emitter is dropped
    pub async fn listen(self, mut receiver: broadcast::Receiver<RunEvent>) {
        loop {
            match receiver.recv().await {
                Ok(event) => {
                    for line in self.render(&event) {
                        println!("{}", line);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    log::warn!("Progress output skipped {} events", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Lines printed for one event
    pub fn render(&self, event: &RunEvent) -> Vec<String> {
        match event {
            RunEvent::RunStarted {
                flow_name,
                env,
                base_url,
                headless,
                step_count,
                ..
            } => vec![
                format!(
                    "{} Running flow: {} ({} steps)",
                    "▶".green().bold(),
                    flow_name.white().bold(),
                    step_count
                ),
                format!("  Environment: {}", env.cyan()),
                format!("  Base URL: {}", base_url.cyan()),
                format!("  Headless: {}", headless),
                "---".dimmed().to_string(),
            ],

            RunEvent::StepStarted { line, .. } => vec![line.clone()],

            RunEvent::StepPassed { duration_ms, .. } => {
                vec![format!("  {} ({}ms)", "✓".green(), duration_ms)]
            }

            RunEvent::StepFailed {
                index,
                step_type,
                error,
                duration_ms,
            } => vec![
                format!("  {} ({}ms)", "✗".red(), duration_ms),
                format!(
                    "{} step {} ({}) - {}",
                    "ERROR:".red().bold(),
                    index,
                    step_type,
                    error
                ),
            ],

            RunEvent::ScreenshotSaved { path } => {
                vec![format!("  Screenshot saved to: {}", path.dimmed())]
            }

            RunEvent::ScreenshotFailed { error } => vec![format!(
                "  {} Failed to save screenshot: {}",
                "⚠".yellow(),
                error
            )],

            RunEvent::Diagnostics {
                flow_path,
                snapshot,
                console_problems,
                category,
            } => {
                if self.verbose {
                    render_debug_info(flow_path, snapshot, console_problems, *category)
                } else {
                    Vec::new()
                }
            }

            RunEvent::RunFinished {
                success,
                duration_ms,
            } => {
                let mut lines = vec!["---".dimmed().to_string()];
                if *success {
                    lines.push(format!(
                        "{} {}",
                        "✓".green().bold(),
                        "Flow completed successfully.".green()
                    ));
                } else {
                    lines.push(format!("{} {}", "✗".red().bold(), "Flow failed.".red()));
                }
                lines.push(format!("  Duration: {}ms", duration_ms));
                lines
            }
        }
    }
}
