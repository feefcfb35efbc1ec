//! Per-run mutable execution state.
//!
//! The context owns everything a run accumulates: variable bindings,
//! ordered step results, and an append-only log. Once the run reaches a
//! terminal status the context refuses further mutation, so a finished
//! record can never be silently amended.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::playbook::Playbook;

/// Status of the run as a whole.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Created but not yet started.
    Pending,
    /// Steps are being executed.
    Running,
    /// At least one path reached a natural end.
    Completed,
    /// No path reached completion, or the playbook could not start.
    Failed,
    /// Stopped externally before finishing.
    Cancelled,
}

impl ExecutionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            ExecutionStatus::Pending => "pending",
            ExecutionStatus::Running => "running",
            ExecutionStatus::Completed => "completed",
            ExecutionStatus::Failed => "failed",
            ExecutionStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

/// Terminal status of a single step invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    /// The step finished and its successors may be followed.
    Completed,
    /// The step errored; traversal stops on this branch.
    Failed,
}

/// Severity of a run log entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogLevel {
    /// Detail useful when replaying a run.
    Debug,
    /// Normal progress.
    Info,
    /// Something degraded but the run continued.
    Warn,
    /// A step or the run failed.
    Error,
}

/// One entry in the run's append-only log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    /// When the entry was written.
    pub timestamp: DateTime<Utc>,
    /// Severity of the entry.
    pub level: LogLevel,
    /// Human-readable description.
    pub message: String,
    /// Step the entry relates to, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step_id: Option<String>,
    /// Structured context, e.g. the expression that failed to evaluate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
}

/// Outcome of a single step invocation, recorded exactly once per visit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    /// Id of the step that ran.
    pub step_id: String,
    /// How the invocation ended.
    pub status: StepStatus,
    /// What the step produced, absent for failed and pass-through steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<HashMap<String, Value>>,
    /// Error description when the step failed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// When dispatch began.
    pub started_at: DateTime<Utc>,
    /// When the result was produced.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration of the invocation.
    pub duration_ms: u64,
}

impl StepResult {
    pub fn completed(
        step_id: impl Into<String>,
        started_at: DateTime<Utc>,
        output: Option<HashMap<String, Value>>,
    ) -> Self {
        Self::finish(step_id, StepStatus::Completed, started_at, output, None)
    }

    pub fn failed(
        step_id: impl Into<String>,
        started_at: DateTime<Utc>,
        error: impl Into<String>,
    ) -> Self {
        Self::finish(step_id, StepStatus::Failed, started_at, None, Some(error.into()))
    }

    fn finish(
        step_id: impl Into<String>,
        status: StepStatus,
        started_at: DateTime<Utc>,
        output: Option<HashMap<String, Value>>,
        error: Option<String>,
    ) -> Self {
        let completed_at = Utc::now();
        let duration_ms = completed_at
            .signed_duration_since(started_at)
            .num_milliseconds()
            .max(0) as u64;
        StepResult {
            step_id: step_id.into(),
            status,
            output,
            error,
            started_at,
            completed_at,
            duration_ms,
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == StepStatus::Failed
    }
}

/// Identifiers correlating a run with the entity that triggered it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Correlation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub case_id: Option<String>,
}

impl Correlation {
    pub fn for_alert(alert_id: impl Into<String>) -> Self {
        Correlation {
            alert_id: Some(alert_id.into()),
            case_id: None,
        }
    }

    pub fn for_case(case_id: impl Into<String>) -> Self {
        Correlation {
            alert_id: None,
            case_id: Some(case_id.into()),
        }
    }
}

/// Mutable state of one playbook run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionContext {
    pub execution_id: Uuid,
    pub playbook_id: Uuid,
    pub playbook_name: String,
    pub correlation: Correlation,
    pub variables: HashMap<String, Value>,
    pub started_at: DateTime<Utc>,
    pub(crate) status: ExecutionStatus,
    pub(crate) completed_at: Option<DateTime<Utc>>,
    pub(crate) error: Option<String>,
    pub(crate) step_results: Vec<StepResult>,
    pub(crate) log: Vec<LogEntry>,
}

impl ExecutionContext {
    /// Start a run: seeds the caller's variables plus the bookkeeping
    /// bindings `playbook_name` and `started_at`, and writes the opening
    /// log entry.
    pub fn new(
        playbook: &Playbook,
        initial_variables: HashMap<String, Value>,
        correlation: Correlation,
    ) -> Self {
        let started_at = Utc::now();
        let mut variables = initial_variables;
        variables.insert(
            "playbook_name".to_string(),
            Value::String(playbook.name.clone()),
        );
        variables.insert(
            "started_at".to_string(),
            Value::String(started_at.to_rfc3339()),
        );
        let mut ctx = ExecutionContext {
            execution_id: Uuid::new_v4(),
            playbook_id: playbook.id,
            playbook_name: playbook.name.clone(),
            correlation,
            variables,
            started_at,
            status: ExecutionStatus::Running,
            completed_at: None,
            error: None,
            step_results: Vec::new(),
            log: Vec::new(),
        };
        ctx.log(
            LogLevel::Info,
            format!("starting playbook execution: {}", playbook.name),
            None,
            None,
        );
        ctx
    }

    pub fn status(&self) -> ExecutionStatus {
        self.status
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn step_results(&self) -> &[StepResult] {
        &self.step_results
    }

    pub fn step_result(&self, step_id: &str) -> Option<&StepResult> {
        self.step_results.iter().find(|r| r.step_id == step_id)
    }

    pub fn log_entries(&self) -> &[LogEntry] {
        &self.log
    }

    /// Append to the run log. Ignored once the run is terminal.
    pub fn log(
        &mut self,
        level: LogLevel,
        message: impl Into<String>,
        step_id: Option<&str>,
        payload: Option<Value>,
    ) {
        if self.status.is_terminal() {
            return;
        }
        self.log.push(LogEntry {
            timestamp: Utc::now(),
            level,
            message: message.into(),
            step_id: step_id.map(str::to_string),
            payload,
        });
    }

    pub fn set_variable(&mut self, key: impl Into<String>, value: Value) {
        if self.status.is_terminal() {
            return;
        }
        self.variables.insert(key.into(), value);
    }

    /// Record a step result and refresh the convenience bindings
    /// `<step_id>_result` and `last_step_result`.
    pub fn record_step_result(&mut self, result: StepResult) {
        if self.status.is_terminal() {
            return;
        }
        let output_value = match &result.output {
            Some(map) => Value::Object(map.clone().into_iter().collect()),
            None => Value::Null,
        };
        self.variables
            .insert(format!("{}_result", result.step_id), output_value.clone());
        self.variables
            .insert("last_step_result".to_string(), output_value);
        self.step_results.push(result);
    }

    /// Move the run to a terminal status. Later calls are no-ops.
    pub fn complete(&mut self, status: ExecutionStatus, error: Option<String>) {
        if self.status.is_terminal() {
            return;
        }
        let level = if status == ExecutionStatus::Completed {
            LogLevel::Info
        } else {
            LogLevel::Error
        };
        let message = match &error {
            Some(e) => format!("playbook execution {status}: {e}"),
            None => format!("playbook execution {status}"),
        };
        self.log(level, message, None, None);
        self.status = status;
        self.error = error;
        self.completed_at = Some(Utc::now());
    }
}
