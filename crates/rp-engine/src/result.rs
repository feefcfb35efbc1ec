//! Immutable record of one playbook run.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::{
    Correlation, ExecutionContext, ExecutionStatus, LogEntry, StepResult, StepStatus,
};

/// Everything a run produced, serializable for audit storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub execution_id: Uuid,
    pub playbook_id: Uuid,
    pub playbook_name: String,
    pub correlation: Correlation,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub step_results: Vec<StepResult>,
    pub variables: HashMap<String, Value>,
    pub log: Vec<LogEntry>,
}

impl From<ExecutionContext> for ExecutionResult {
    fn from(ctx: ExecutionContext) -> Self {
        ExecutionResult {
            execution_id: ctx.execution_id,
            playbook_id: ctx.playbook_id,
            playbook_name: ctx.playbook_name,
            correlation: ctx.correlation,
            status: ctx.status,
            started_at: ctx.started_at,
            completed_at: ctx.completed_at,
            error: ctx.error,
            step_results: ctx.step_results,
            variables: ctx.variables,
            log: ctx.log,
        }
    }
}

impl ExecutionResult {
    pub fn is_completed(&self) -> bool {
        self.status == ExecutionStatus::Completed
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    pub fn duration_ms(&self) -> Option<i64> {
        self.completed_at
            .map(|end| end.signed_duration_since(self.started_at).num_milliseconds())
    }

    /// Human-readable rendering for terminals and case notes.
    pub fn summary(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!(
            "Playbook: {} ({})\n",
            self.playbook_name, self.playbook_id
        ));
        out.push_str(&format!("Execution: {}\n", self.execution_id));
        out.push_str(&format!("Status: {}", self.status));
        if let Some(error) = &self.error {
            out.push_str(&format!(" ({error})"));
        }
        out.push('\n');
        if let Some(ms) = self.duration_ms() {
            out.push_str(&format!("Duration: {ms}ms\n"));
        }
        out.push_str(&format!("Steps: {}\n", self.step_results.len()));
        for result in &self.step_results {
            let marker = match result.status {
                StepStatus::Completed => "ok",
                StepStatus::Failed => "FAILED",
            };
            match &result.error {
                Some(error) => out.push_str(&format!(
                    "  [{marker}] {} ({}ms): {error}\n",
                    result.step_id, result.duration_ms
                )),
                None => out.push_str(&format!(
                    "  [{marker}] {} ({}ms)\n",
                    result.step_id, result.duration_ms
                )),
            }
        }
        out
    }
}
