//! Playbook graph model.
//!
//! A playbook is a flat list of [`Step`]s addressed by string id, with
//! edges expressed as successor id lists. The model is deliberately
//! permissive on load: unknown step types and dangling successor ids
//! deserialize fine and are handled at execution time. [`Playbook::validate`]
//! is the stricter check intended for the publish path.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

/// Lifecycle state of a playbook definition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlaybookStatus {
    Draft,
    Active,
    Disabled,
    Archived,
}

impl PlaybookStatus {
    /// Only active playbooks are eligible for execution.
    pub fn is_runnable(&self) -> bool {
        matches!(self, PlaybookStatus::Active)
    }
}

/// The kind of work a step performs.
///
/// Foreign definitions may carry types this engine does not know; those
/// deserialize to [`StepKind::Unknown`] and fail at dispatch rather than
/// at load.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Trigger,
    Action,
    Condition,
    Integration,
    Notification,
    Input,
    Output,
    #[serde(other)]
    Unknown,
}

impl StepKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StepKind::Trigger => "trigger",
            StepKind::Action => "action",
            StepKind::Condition => "condition",
            StepKind::Integration => "integration",
            StepKind::Notification => "notification",
            StepKind::Input => "input",
            StepKind::Output => "output",
            StepKind::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for StepKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Typed per-step configuration.
///
/// Which fields matter depends on the step kind: condition steps read
/// `condition` and the optional explicit branch targets, action-like
/// steps read `action` and `parameters`. Unused fields are simply
/// ignored by the dispatcher.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StepConfig {
    /// Boolean expression evaluated against the run's variables.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<String>,
    /// Step to jump to when the condition is true, overriding `next_steps`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub true_path: Option<String>,
    /// Step to jump to when the condition is false, overriding `next_steps`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub false_path: Option<String>,
    /// Registered action name for action-like steps.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Parameters handed to the collaborator and merged into the step output.
    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub parameters: HashMap<String, Value>,
}

impl StepConfig {
    pub fn condition(expression: impl Into<String>) -> Self {
        StepConfig {
            condition: Some(expression.into()),
            ..Default::default()
        }
    }

    pub fn action(name: impl Into<String>) -> Self {
        StepConfig {
            action: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn with_paths(
        mut self,
        true_path: impl Into<String>,
        false_path: impl Into<String>,
    ) -> Self {
        self.true_path = Some(true_path.into());
        self.false_path = Some(false_path.into());
        self
    }

    pub fn with_true_path(mut self, step_id: impl Into<String>) -> Self {
        self.true_path = Some(step_id.into());
        self
    }

    pub fn with_false_path(mut self, step_id: impl Into<String>) -> Self {
        self.false_path = Some(step_id.into());
        self
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

/// A single node in the playbook graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub id: String,
    pub name: String,
    pub kind: StepKind,
    #[serde(default)]
    pub config: StepConfig,
    /// Successor step ids, followed in order.
    #[serde(default)]
    pub next_steps: Vec<String>,
}

impl Step {
    pub fn new(id: impl Into<String>, name: impl Into<String>, kind: StepKind) -> Self {
        Step {
            id: id.into(),
            name: name.into(),
            kind,
            config: StepConfig::default(),
            next_steps: Vec::new(),
        }
    }

    pub fn with_config(mut self, config: StepConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_next(mut self, step_id: impl Into<String>) -> Self {
        self.next_steps.push(step_id.into());
        self
    }
}

/// An immutable playbook definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Playbook {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub status: PlaybookStatus,
    /// Label describing what fires this playbook, e.g. "alert.created".
    #[serde(default)]
    pub trigger_type: String,
    #[serde(default)]
    pub steps: Vec<Step>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Playbook {
    pub fn new(name: impl Into<String>) -> Self {
        let now = Utc::now();
        Playbook {
            id: Uuid::new_v4(),
            name: name.into(),
            description: String::new(),
            status: PlaybookStatus::Draft,
            trigger_type: String::new(),
            steps: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    pub fn with_status(mut self, status: PlaybookStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_trigger_type(mut self, trigger_type: impl Into<String>) -> Self {
        self.trigger_type = trigger_type.into();
        self
    }

    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Look up a step by id.
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The first trigger step, where execution begins.
    pub fn entry_step(&self) -> Option<&Step> {
        self.steps.iter().find(|s| s.kind == StepKind::Trigger)
    }

    /// Structural checks for the publish path.
    ///
    /// The runner tolerates everything reported here (a broken graph
    /// yields a failed run, not a panic), so callers decide whether
    /// issues block publication.
    pub fn validate(&self) -> Vec<ValidationIssue> {
        let mut issues = Vec::new();

        let mut seen: HashSet<&str> = HashSet::new();
        for step in &self.steps {
            if !seen.insert(step.id.as_str()) {
                issues.push(ValidationIssue::DuplicateStepId {
                    step_id: step.id.clone(),
                });
            }
        }

        if self.entry_step().is_none() {
            issues.push(ValidationIssue::MissingTrigger);
            return issues;
        }

        for step in &self.steps {
            for successor in &step.next_steps {
                if self.step(successor).is_none() {
                    issues.push(ValidationIssue::DanglingSuccessor {
                        step_id: step.id.clone(),
                        successor: successor.clone(),
                    });
                }
            }
            if step.kind == StepKind::Condition {
                if step.config.condition.is_none() {
                    issues.push(ValidationIssue::MissingCondition {
                        step_id: step.id.clone(),
                    });
                }
                for target in [&step.config.true_path, &step.config.false_path]
                    .into_iter()
                    .flatten()
                {
                    if self.step(target).is_none() {
                        issues.push(ValidationIssue::DanglingSuccessor {
                            step_id: step.id.clone(),
                            successor: target.clone(),
                        });
                    }
                }
            }
        }

        let reachable = self.reachable();
        for step in &self.steps {
            if !reachable.contains(step.id.as_str()) {
                issues.push(ValidationIssue::UnreachableStep {
                    step_id: step.id.clone(),
                });
            }
        }

        issues
    }

    fn reachable(&self) -> HashSet<&str> {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut queue: Vec<&str> = self
            .steps
            .iter()
            .filter(|s| s.kind == StepKind::Trigger)
            .map(|s| s.id.as_str())
            .collect();
        while let Some(id) = queue.pop() {
            if !visited.insert(id) {
                continue;
            }
            if let Some(step) = self.step(id) {
                queue.extend(step.next_steps.iter().map(String::as_str));
                if let Some(t) = &step.config.true_path {
                    queue.push(t.as_str());
                }
                if let Some(f) = &step.config.false_path {
                    queue.push(f.as_str());
                }
            }
        }
        visited
    }
}

/// A structural problem found by [`Playbook::validate`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationIssue {
    #[error("playbook has no trigger step")]
    MissingTrigger,
    #[error("duplicate step id '{step_id}'")]
    DuplicateStepId { step_id: String },
    #[error("step '{step_id}' references unknown step '{successor}'")]
    DanglingSuccessor { step_id: String, successor: String },
    #[error("step '{step_id}' is unreachable from any trigger")]
    UnreachableStep { step_id: String },
    #[error("condition step '{step_id}' has no condition expression")]
    MissingCondition { step_id: String },
}
