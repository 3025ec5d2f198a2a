use serde::{Deserialize, Serialize};

use crate::runner::state::{RunOutcome, StepResult};

/// Persisted summary of one run
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub flow_name: String,
    pub env: String,
    pub success: bool,
    pub duration_ms: u64,
    pub steps: Vec<StepResult>,
    pub timestamp: String,
}

impl RunReport {
    /// `flow_path` names the report when the flow has no name
    pub fn from_outcome(outcome: &RunOutcome, flow_path: &str) -> Self {
        Self {
            flow_name: outcome
                .flow_name
                .clone()
                .unwrap_or_else(|| flow_path.to_string()),
            env: outcome.env.clone(),
            success: outcome.success,
            duration_ms: outcome.duration_ms(),
            steps: outcome.results.clone(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}
