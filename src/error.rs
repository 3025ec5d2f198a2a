//! Error types for flow runs.
//!
//! Startup failures stop the run before a browser session exists. Step
//! failures are values: the runner turns every one of them into a failed
//! [`StepResult`](crate::runner::state::StepResult).

use std::path::PathBuf;
use thiserror::Error;

use crate::driver::traits::UrlMatch;

/// Failures that prevent a run from starting.
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Flow file not found: {}", .0.display())]
    FlowNotFound(PathBuf),

    #[error("Flow file must be .yaml, .yml, or .json: {}", .0.display())]
    UnsupportedFormat(PathBuf),

    #[error("Failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid YAML in {}: {source}", .path.display())]
    Yaml {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid JSON in {}: {source}", .path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Failures reported by a browser session.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    #[error("Timeout {timeout_ms}ms exceeded while waiting for {target}")]
    Timeout { target: String, timeout_ms: u64 },

    #[error("Element not found: {selector}")]
    NotFound { selector: String },

    #[error("Navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("{0}")]
    Other(String),
}

/// Why a step failed.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StepError {
    #[error("{step} step requires {field}")]
    MissingField {
        step: &'static str,
        field: &'static str,
    },

    #[error("{step} step has invalid {field}: {value}")]
    InvalidField {
        step: &'static str,
        field: &'static str,
        value: String,
    },

    #[error("Failed to create {path}: {message}")]
    Filesystem { path: String, message: String },

    #[error("Expected text \"{expected}\" not found in {selector}")]
    TextMismatch {
        selector: String,
        expected: String,
        actual: Option<String>,
    },

    #[error("URL does not {expected}. Current: {actual}")]
    UrlMismatch { expected: UrlMatch, actual: String },

    #[error("Could not access frame content for {iframe_selector}")]
    FrameUnavailable { iframe_selector: String },

    #[error("Unknown step type: {0}")]
    UnknownStep(String),

    #[error(transparent)]
    Driver(#[from] DriverError),
}

/// Broad failure classes used for human-readable hints.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureCategory {
    Timeout,
    NotFound,
}

impl StepError {
    pub fn category(&self) -> Option<FailureCategory> {
        match self {
            StepError::Driver(DriverError::Timeout { .. }) => Some(FailureCategory::Timeout),
            StepError::Driver(DriverError::NotFound { .. })
            | StepError::TextMismatch { .. }
            | StepError::FrameUnavailable { .. } => Some(FailureCategory::NotFound),
            _ => None,
        }
    }

    /// Configuration errors never reach the driver.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            StepError::MissingField { .. } | StepError::InvalidField { .. }
        )
    }
}
