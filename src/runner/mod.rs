pub mod diagnostics;
pub mod events;
pub mod executor;
pub mod state;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::driver::traits::{BrowserSession, SessionLauncher};
use crate::parser::types::Flow;
use crate::utils::config::RunConfig;
use diagnostics::{
    capture_failure_screenshot, capture_snapshot, DiagnosticLog, DUMP_CONSOLE_LIMIT,
};
use executor::{execute_step, format_step};

pub use events::*;
pub use state::*;

/// Default directory for failure screenshots
pub const DEFAULT_SCREENSHOT_DIR: &str = "screenshots";

/// Runs one flow against one browser session, stopping at the first failed step
pub struct FlowRunner {
    launcher: Box<dyn SessionLauncher>,
    emitter: EventEmitter,
    screenshot_dir: PathBuf,
    headless: bool,
}

impl FlowRunner {
    pub fn new(launcher: Box<dyn SessionLauncher>, emitter: EventEmitter) -> Self {
        Self {
            launcher,
            emitter,
            screenshot_dir: PathBuf::from(DEFAULT_SCREENSHOT_DIR),
            headless: true,
        }
    }

    pub fn with_screenshot_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.screenshot_dir = dir.into();
        self
    }

    /// Only shown in the run banner; the launcher owns browser options
    pub fn with_headless(mut self, headless: bool) -> Self {
        self.headless = headless;
        self
    }

    /// Execute `flow` and return its outcome.
    ///
    /// Step failures are part of the outcome. An error is returned only when
    /// the session cannot be opened.
    pub async fn run(
        &self,
        flow: &Flow,
        flow_path: &Path,
        config: &RunConfig,
        env: &str,
    ) -> Result<RunOutcome> {
        let source = flow_path.display().to_string();
        self.emitter.emit(RunEvent::RunStarted {
            flow_name: flow.label(&source),
            flow_path: flow_path.to_path_buf(),
            env: env.to_string(),
            base_url: config.base_url.clone(),
            headless: self.headless,
            step_count: flow.steps.len(),
        });

        let mut state = RunState::start(flow.steps.len());
        let log = DiagnosticLog::new();
        let session = self
            .launcher
            .open(config, log.clone())
            .await
            .context("Failed to open browser session")?;

        while let Some(index) = state.next_step() {
            let result = self
                .run_step(session.as_ref(), flow, flow_path, index, config, &log)
                .await;
            state.record(result);
        }

        if let Err(e) = session.close().await {
            log::warn!("Failed to close browser session: {}", e);
        }

        let outcome = state.finish(flow.name.clone(), env.to_string());
        self.emitter.emit(RunEvent::RunFinished {
            success: outcome.success,
            duration_ms: outcome.duration_ms(),
        });
        Ok(outcome)
    }

    async fn run_step(
        &self,
        session: &dyn BrowserSession,
        flow: &Flow,
        flow_path: &Path,
        index: usize,
        config: &RunConfig,
        log: &DiagnosticLog,
    ) -> StepResult {
        let step = &flow.steps[index];
        let number = index + 1;
        let step_type = step.kind.as_str();

        self.emitter.emit(RunEvent::StepStarted {
            index: number,
            line: format_step(step, index),
        });

        let started = Instant::now();
        let error = match execute_step(session, step, config).await {
            Ok(()) => {
                self.emitter.emit(RunEvent::StepPassed {
                    index: number,
                    duration_ms: started.elapsed().as_millis() as u64,
                });
                return StepResult::passed(number, step_type);
            }
            Err(e) => e,
        };

        self.emitter.emit(RunEvent::StepFailed {
            index: number,
            step_type: step_type.to_string(),
            error: error.to_string(),
            duration_ms: started.elapsed().as_millis() as u64,
        });

        let snapshot = capture_snapshot(session, step, log).await;

        let screenshot = match capture_failure_screenshot(
            session,
            &self.screenshot_dir,
            flow.name.as_deref(),
            number,
        )
        .await
        {
            Ok(path) => {
                let path = path.display().to_string();
                self.emitter.emit(RunEvent::ScreenshotSaved { path: path.clone() });
                Some(path)
            }
            Err(e) => {
                self.emitter.emit(RunEvent::ScreenshotFailed {
                    error: format!("{:#}", e),
                });
                None
            }
        };

        let absolute =
            std::fs::canonicalize(flow_path).unwrap_or_else(|_| flow_path.to_path_buf());
        self.emitter.emit(RunEvent::Diagnostics {
            flow_path: absolute,
            snapshot: Box::new(snapshot.clone()),
            console_problems: log.recent_problems(DUMP_CONSOLE_LIMIT),
            category: error.category(),
        });

        StepResult::failed(number, step_type, error.to_string(), screenshot, snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::mock::{MockLauncher, MockSession};
    use crate::parser::types::{Step, StepKind};
    use std::time::Duration;

    fn goto(path: &str) -> Step {
        let mut step = Step::new(StepKind::Goto);
        step.path = Some(path.to_string());
        step
    }

    fn click(selector: &str) -> Step {
        let mut step = Step::new(StepKind::Click);
        step.selector = Some(selector.to_string());
        step
    }

    fn flow(steps: Vec<Step>) -> Flow {
        Flow {
            name: Some("checkout".to_string()),
            config: None,
            steps,
        }
    }

    fn config() -> RunConfig {
        RunConfig {
            base_url: "https://shop.test".to_string(),
            timeout_ms: 5000,
        }
    }

    fn runner(launcher: MockLauncher, dir: &Path) -> FlowRunner {
        FlowRunner::new(Box::new(launcher), EventEmitter::default()).with_screenshot_dir(dir)
    }

    #[tokio::test]
    async fn test_all_steps_pass() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new();
        let runner = runner(MockLauncher::new(session.clone()), dir.path());

        let flow = flow(vec![goto("/"), click("#add"), goto("/cart")]);
        let outcome = runner
            .run(&flow, Path::new("checkout.yaml"), &config(), "staging")
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.env, "staging");
        assert_eq!(outcome.results.len(), 3);
        assert!(outcome.results.iter().all(StepResult::is_passed));
        assert_eq!(session.close_count(), 1);
        assert_eq!(session.opened_with(), Some(config()));
    }

    #[tokio::test]
    async fn test_halts_at_first_failure() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new();
        session.set_title("Shop");
        session.make_missing("#pay");
        let mut launcher = MockLauncher::new(session.clone());
        launcher.console = vec![("error".to_string(), "Stripe failed to load".to_string())];
        launcher.page_errors = vec!["TypeError: x is undefined".to_string()];
        let runner = runner(launcher, dir.path());

        let flow = flow(vec![goto("/"), click("#pay"), goto("/done"), goto("/after")]);
        let outcome = runner
            .run(&flow, Path::new("checkout.yaml"), &config(), "local")
            .await
            .unwrap();

        assert!(!outcome.success);
        assert_eq!(outcome.results.len(), 2);
        assert_eq!(session.close_count(), 1);
        assert!(!session.calls().contains(&"goto https://shop.test/done".to_string()));

        let failed = &outcome.results[1];
        assert_eq!(failed.index, 2);
        assert_eq!(failed.step_type, "click");
        assert_eq!(failed.status, StepStatus::Failed);

        let debug = failed.debug.as_ref().unwrap();
        assert_eq!(debug.page_url, "https://shop.test/");
        assert_eq!(debug.page_title, "Shop");
        assert_eq!(debug.step_definition, flow.steps[1]);
        assert_eq!(debug.console_logs[0].text, "Stripe failed to load");
        assert_eq!(debug.page_errors, vec!["TypeError: x is undefined"]);

        let shot = dir.path().join("checkout_step-2.png");
        assert_eq!(failed.screenshot.as_deref(), Some(shot.display().to_string().as_str()));
        assert!(shot.is_file());
    }

    #[tokio::test]
    async fn test_screenshot_failure_keeps_step_error() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new();
        session.fail_screenshots();
        let runner = runner(MockLauncher::new(session.clone()), dir.path());

        let flow = flow(vec![Step::new(StepKind::Unknown("hover".to_string()))]);
        let outcome = runner
            .run(&flow, Path::new("f.yaml"), &config(), "local")
            .await
            .unwrap();

        assert!(!outcome.success);
        let failed = &outcome.results[0];
        assert_eq!(failed.error.as_deref(), Some("Unknown step type: hover"));
        assert_eq!(failed.screenshot, None);
        assert_eq!(session.close_count(), 1);
    }

    #[tokio::test]
    async fn test_launch_failure_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = MockLauncher::new(MockSession::new());
        launcher.fail_launch = true;
        let runner = runner(launcher, dir.path());

        let result = runner
            .run(&flow(vec![goto("/")]), Path::new("f.yaml"), &config(), "local")
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_duration_includes_browser_launch() {
        let dir = tempfile::tempdir().unwrap();
        let mut launcher = MockLauncher::new(MockSession::new());
        launcher.launch_delay = Duration::from_millis(150);
        let runner = runner(launcher, dir.path());

        let outcome = runner
            .run(&flow(vec![goto("/")]), Path::new("f.yaml"), &config(), "local")
            .await
            .unwrap();
        assert!(outcome.duration >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_diagnostics_carry_errors_older_than_snapshot() {
        let dir = tempfile::tempdir().unwrap();
        let session = MockSession::new();
        session.make_missing("#pay");
        let mut launcher = MockLauncher::new(session);
        launcher.console = vec![("error".to_string(), "Stripe failed to load".to_string())];
        launcher
            .console
            .extend((0..20).map(|i| ("log".to_string(), format!("tick {}", i))));

        let (emitter, mut receiver) = EventEmitter::new();
        let runner = FlowRunner::new(Box::new(launcher), emitter).with_screenshot_dir(dir.path());
        let outcome = runner
            .run(&flow(vec![click("#pay")]), Path::new("f.yaml"), &config(), "local")
            .await
            .unwrap();

        let debug = outcome.results[0].debug.as_ref().unwrap();
        assert_eq!(debug.console_logs.len(), 20);
        assert!(debug.console_logs.iter().all(|entry| !entry.is_problem()));

        let mut problems = None;
        while let Ok(event) = receiver.try_recv() {
            if let RunEvent::Diagnostics {
                console_problems, ..
            } = event
            {
                problems = Some(console_problems);
            }
        }
        let problems = problems.unwrap();
        assert_eq!(problems.len(), 1);
        assert_eq!(problems[0].text, "Stripe failed to load");
    }

    #[tokio::test]
    async fn test_events_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (emitter, mut receiver) = EventEmitter::new();
        let runner = FlowRunner::new(Box::new(MockLauncher::new(MockSession::new())), emitter)
            .with_screenshot_dir(dir.path());

        runner
            .run(&flow(vec![goto("/")]), Path::new("f.yaml"), &config(), "local")
            .await
            .unwrap();

        assert!(matches!(receiver.try_recv(), Ok(RunEvent::RunStarted { step_count: 1, .. })));
        match receiver.try_recv() {
            Ok(RunEvent::StepStarted { index, line }) => {
                assert_eq!(index, 1);
                assert_eq!(line, "STEP 1: goto /");
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert!(matches!(receiver.try_recv(), Ok(RunEvent::StepPassed { index: 1, .. })));
        assert!(matches!(
            receiver.try_recv(),
            Ok(RunEvent::RunFinished { success: true, .. })
        ));
    }
}
