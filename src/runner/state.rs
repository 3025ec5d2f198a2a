use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::diagnostics::DiagnosticSnapshot;

/// Step execution status
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Passed,
    Failed,
}

/// Outcome of one executed step. Appended once, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StepResult {
    /// 1-based position in the flow
    pub index: usize,
    #[serde(rename = "type")]
    pub step_type: String,
    pub status: StepStatus,
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub screenshot: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<DiagnosticSnapshot>,
}

impl StepResult {
    pub fn passed(index: usize, step_type: &str) -> Self {
        Self {
            index,
            step_type: step_type.to_string(),
            status: StepStatus::Passed,
            error: None,
            screenshot: None,
            debug: None,
        }
    }

    pub fn failed(
        index: usize,
        step_type: &str,
        error: String,
        screenshot: Option<String>,
        debug: DiagnosticSnapshot,
    ) -> Self {
        Self {
            index,
            step_type: step_type.to_string(),
            status: StepStatus::Failed,
            error: Some(error),
            screenshot,
            debug: Some(debug),
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == StepStatus::Passed
    }
}

/// Orchestrator progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    /// Next step to execute (0-based)
    Running { next: usize },
    /// Halted at a failed step (0-based)
    StepFailed { index: usize },
    Completed,
}

/// Mutable run state owned by the orchestrator for the length of one run
#[derive(Debug)]
pub struct RunState {
    pub status: RunStatus,
    total_steps: usize,
    results: Vec<StepResult>,
    started_at: Instant,
}

impl RunState {
    pub fn start(total_steps: usize) -> Self {
        let status = if total_steps == 0 {
            RunStatus::Completed
        } else {
            RunStatus::Running { next: 0 }
        };
        Self {
            status,
            total_steps,
            results: Vec::with_capacity(total_steps),
            started_at: Instant::now(),
        }
    }

    /// Index of the step to execute, `None` once the run has stopped
    pub fn next_step(&self) -> Option<usize> {
        match self.status {
            RunStatus::Running { next } => Some(next),
            _ => None,
        }
    }

    /// Record the result of the current step and advance or halt
    pub fn record(&mut self, result: StepResult) {
        let RunStatus::Running { next } = self.status else {
            log::warn!("Ignoring result for step {} after run stopped", result.index);
            return;
        };

        self.status = if !result.is_passed() {
            RunStatus::StepFailed { index: next }
        } else if next + 1 >= self.total_steps {
            RunStatus::Completed
        } else {
            RunStatus::Running { next: next + 1 }
        };
        self.results.push(result);
    }

    pub fn finish(self, flow_name: Option<String>, env: String) -> RunOutcome {
        let success = self.status == RunStatus::Completed
            && self.results.iter().all(StepResult::is_passed);
        RunOutcome {
            flow_name,
            env,
            success,
            results: self.results,
            duration: self.started_at.elapsed(),
        }
    }
}

/// Aggregate outcome of one run
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub flow_name: Option<String>,
    pub env: String,
    pub results: Vec<StepResult>,
    pub success: bool,
    /// Wall-clock time from run start, browser launch included, to release
    pub duration: Duration,
}

impl RunOutcome {
    pub fn duration_ms(&self) -> u64 {
        self.duration.as_millis() as u64
    }
}
